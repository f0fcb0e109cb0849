//! Selection Store operations and the SQLite implementation

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use rust_decimal::Decimal;
use std::path::Path;
use tracing::warn;

use super::records::{Record, RecordKey, RecordType, Selection};
use super::schema::create_tables;
use crate::error::{StoreError, StoreResult};
use crate::types::Outcome;

/// Key-value operations every pass relies on.
///
/// Partition key is `bet_date`, sort key is `bet_id`. Writes are idempotent
/// by primary key.
pub trait SelectionStore {
    /// Insert or overwrite a record.
    fn put_item(&self, record: &Record) -> StoreResult<()>;

    /// Fetch a record by key.
    fn get_item(&self, key: &RecordKey) -> StoreResult<Option<Record>>;

    /// Patch a stored selection in place. Returns `false` when the patch's
    /// condition did not hold and nothing was written.
    fn update_item(&self, key: &RecordKey, patch: &ItemPatch) -> StoreResult<bool>;

    /// All records in one partition, ordered by sort key.
    fn query(&self, bet_date: &str) -> StoreResult<Vec<Record>>;

    /// All records matching a filter, ordered by key.
    fn scan(&self, filter: &ScanFilter) -> StoreResult<Vec<Record>>;

    /// Selections stored for a race day.
    fn selections_for_date(&self, date: NaiveDate) -> StoreResult<Vec<Selection>> {
        Ok(self
            .query(&date.to_string())?
            .into_iter()
            .filter_map(Record::into_selection)
            .collect())
    }

    /// Selections matching a filter.
    fn scan_selections(&self, filter: &ScanFilter) -> StoreResult<Vec<Selection>> {
        let filter = ScanFilter {
            record_type: Some(RecordType::Selection),
            ..filter.clone()
        };
        Ok(self
            .scan(&filter)?
            .into_iter()
            .filter_map(Record::into_selection)
            .collect())
    }
}

/// Settlement fields written onto a selection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPatch {
    pub outcome: Option<Outcome>,
    pub profit_loss: Option<Decimal>,
    pub final_odds: Option<Decimal>,
    pub actual_winner: Option<String>,
    pub result_captured_at: Option<DateTime<Utc>>,
    pub show_in_ui: Option<bool>,
    pub recommended_bet: Option<bool>,
    /// Only apply while the stored outcome is still pending.
    pub require_pending: bool,
}

impl ItemPatch {
    pub fn apply(&self, selection: &mut Selection) {
        if let Some(outcome) = self.outcome {
            selection.outcome = outcome;
        }
        if let Some(pl) = self.profit_loss {
            selection.profit_loss = Some(pl);
        }
        if let Some(odds) = self.final_odds {
            selection.final_odds = Some(odds);
        }
        if let Some(ref winner) = self.actual_winner {
            selection.actual_winner = Some(winner.clone());
        }
        if let Some(at) = self.result_captured_at {
            selection.result_captured_at = Some(at);
        }
        if let Some(show) = self.show_in_ui {
            selection.show_in_ui = show;
        }
        if let Some(rec) = self.recommended_bet {
            selection.recommended_bet = rec;
        }
    }
}

/// Filter for `scan`. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanFilter {
    pub record_type: Option<RecordType>,
    pub horse: Option<String>,
    pub outcome: Option<Outcome>,
    /// `Some(true)` for settled rows only, `Some(false)` for pending only.
    pub settled: Option<bool>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

impl ScanFilter {
    pub fn selections() -> Self {
        Self {
            record_type: Some(RecordType::Selection),
            ..Default::default()
        }
    }

    pub fn horse(mut self, horse: &str) -> Self {
        self.horse = Some(horse.to_string());
        self
    }

    pub fn pending(mut self) -> Self {
        self.settled = Some(false);
        self
    }

    pub fn settled(mut self) -> Self {
        self.settled = Some(true);
        self
    }

    pub fn between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.from_date = Some(from);
        self.to_date = Some(to);
        self
    }

    fn to_sql(&self) -> (String, Vec<String>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        if let Some(rt) = self.record_type {
            values.push(rt.as_str().to_string());
            clauses.push(format!("record_type = ?{}", values.len()));
        }
        if let Some(ref horse) = self.horse {
            values.push(horse.clone());
            clauses.push(format!("horse = ?{}", values.len()));
        }
        if let Some(outcome) = self.outcome {
            values.push(outcome.as_str().to_string());
            clauses.push(format!("outcome = ?{}", values.len()));
        }
        match self.settled {
            Some(true) => clauses.push("outcome IS NOT NULL AND outcome <> 'pending'".to_string()),
            Some(false) => clauses.push("outcome = 'pending'".to_string()),
            None => {}
        }
        if let Some(from) = self.from_date {
            values.push(from.to_string());
            clauses.push(format!("bet_date >= ?{}", values.len()));
        }
        if let Some(to) = self.to_date {
            values.push(to.to_string());
            clauses.push(format!("bet_date <= ?{}", values.len()));
        }

        let mut sql = "SELECT bet_date, bet_id, body FROM records".to_string();
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY bet_date, bet_id");
        (sql, values)
    }
}

/// Selection Store backed by a SQLite file
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open the store, initializing the database if needed
    pub fn new(db_path: &Path) -> StoreResult<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!("{}: {}", parent.display(), e))
                })?;
            }
        }

        let conn = Connection::open(db_path)?;
        create_tables(&conn)?;

        Ok(Self { conn })
    }

    /// Create an in-memory store (for testing)
    #[cfg(test)]
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        create_tables(&conn)?;
        Ok(Self { conn })
    }

    /// Number of stored records of a type
    pub fn count(&self, record_type: RecordType) -> StoreResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE record_type = ?1",
            [record_type.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Decode row bodies, skipping any that no longer parse.
    fn decode_all(rows: Vec<(String, String, String)>) -> Vec<Record> {
        rows.into_iter()
            .filter_map(|(bet_date, bet_id, body)| match serde_json::from_str(&body) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping undecodable record {}/{}: {}", bet_date, bet_id, e);
                    None
                }
            })
            .collect()
    }
}

impl SelectionStore for SqliteStore {
    fn put_item(&self, record: &Record) -> StoreResult<()> {
        let key = record.key();
        let body = serde_json::to_string(record)?;
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO records
            (bet_date, bet_id, record_type, horse, outcome, body, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                key.bet_date,
                key.bet_id,
                record.record_type().as_str(),
                record.horse(),
                record.outcome().map(|o| o.as_str()),
                body,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_item(&self, key: &RecordKey) -> StoreResult<Option<Record>> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM records WHERE bet_date = ?1 AND bet_id = ?2",
                [&key.bet_date, &key.bet_id],
                |row| row.get(0),
            )
            .optional()?;

        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    fn update_item(&self, key: &RecordKey, patch: &ItemPatch) -> StoreResult<bool> {
        let tx = self.conn.unchecked_transaction()?;

        let mut selection = match self.get_item(key)? {
            Some(Record::Selection(s)) => s,
            Some(_) => {
                return Err(StoreError::NotASelection {
                    bet_date: key.bet_date.clone(),
                    bet_id: key.bet_id.clone(),
                })
            }
            None => {
                return Err(StoreError::NotFound {
                    bet_date: key.bet_date.clone(),
                    bet_id: key.bet_id.clone(),
                })
            }
        };

        if patch.require_pending && !selection.outcome.is_pending() {
            return Ok(false);
        }

        patch.apply(&mut selection);
        self.put_item(&Record::Selection(selection))?;
        tx.commit()?;
        Ok(true)
    }

    fn query(&self, bet_date: &str) -> StoreResult<Vec<Record>> {
        let mut stmt = self
            .conn
            .prepare("SELECT bet_date, bet_id, body FROM records WHERE bet_date = ?1 ORDER BY bet_id")?;

        let rows: Vec<(String, String, String)> = stmt
            .query_map([bet_date], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self::decode_all(rows))
    }

    fn scan(&self, filter: &ScanFilter) -> StoreResult<Vec<Record>> {
        let (sql, values) = filter.to_sql();
        let mut stmt = self.conn.prepare(&sql)?;

        let rows: Vec<(String, String, String)> = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self::decode_all(rows))
    }
}
