//! SQLite schema for the Selection Store
//!
//! Tables:
//! - records: every stored row, keyed by (bet_date, bet_id), with the
//!   variant in `record_type` and the full record as JSON in `body`

use rusqlite::{Connection, Result};

/// Create all tables in the database
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            bet_date TEXT NOT NULL,
            bet_id TEXT NOT NULL,
            record_type TEXT NOT NULL,
            horse TEXT,
            outcome TEXT,
            body TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (bet_date, bet_id)
        )
        "#,
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_type ON records(record_type)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_horse ON records(horse)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_outcome ON records(record_type, outcome)",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_create_tables() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();

        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name = 'records'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_create_tables_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        create_tables(&conn).unwrap();
    }
}
