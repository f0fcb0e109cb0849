//! Performance summary over surfaced bets.
//!
//! Only recommended selections count as bets. Void rows and rows still
//! pending are left out of the money columns.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::StoreResult;
use crate::store::{ScanFilter, Selection, SelectionStore};
use crate::types::Outcome;

/// A single settled bet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BetResult {
    pub bet_date: NaiveDate,
    pub race_time: DateTime<Utc>,
    pub course: String,
    pub horse: String,
    pub score: f64,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub odds: Option<Decimal>,
    pub stake: Decimal,
    pub profit: Decimal,
}

impl BetResult {
    pub fn returned(&self) -> Decimal {
        self.stake + self.profit
    }
}

/// Results for one race day.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DayResult {
    pub date: Option<NaiveDate>,
    pub num_bets: usize,
    pub num_wins: usize,
    pub total_staked: Decimal,
    pub total_returned: Decimal,
}

impl DayResult {
    pub fn profit(&self) -> Decimal {
        self.total_returned - self.total_staked
    }

    pub fn roi(&self) -> f64 {
        ratio(self.profit(), self.total_staked)
    }

    pub fn hit_rate(&self) -> f64 {
        if self.num_bets > 0 {
            self.num_wins as f64 / self.num_bets as f64
        } else {
            0.0
        }
    }
}

fn ratio(num: Decimal, den: Decimal) -> f64 {
    if den > Decimal::ZERO {
        (num / den).to_f64().unwrap_or(0.0)
    } else {
        0.0
    }
}

/// Aggregate results for a date range.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub bets: Vec<BetResult>,
    pub days: Vec<DayResult>,
    pub num_bets: usize,
    pub num_wins: usize,
    /// Surfaced picks not yet settled.
    pub pending: usize,
    pub total_staked: Decimal,
    pub total_returned: Decimal,
}

impl PerformanceReport {
    pub fn profit(&self) -> Decimal {
        self.total_returned - self.total_staked
    }

    pub fn roi(&self) -> f64 {
        ratio(self.profit(), self.total_staked)
    }

    pub fn hit_rate(&self) -> f64 {
        if self.num_bets > 0 {
            self.num_wins as f64 / self.num_bets as f64
        } else {
            0.0
        }
    }

    /// Largest fall from a running peak of cumulative profit, in race order.
    pub fn max_drawdown(&self) -> Decimal {
        let mut peak = Decimal::ZERO;
        let mut max_dd = Decimal::ZERO;
        let mut cumulative = Decimal::ZERO;

        for bet in &self.bets {
            cumulative += bet.profit;
            if cumulative > peak {
                peak = cumulative;
            }
            let dd = peak - cumulative;
            if dd > max_dd {
                max_dd = dd;
            }
        }
        max_dd
    }
}

/// Summarize recommended selections.
pub fn summarize(selections: &[Selection], from: Option<NaiveDate>, to: Option<NaiveDate>) -> PerformanceReport {
    let mut report = PerformanceReport {
        from,
        to,
        ..Default::default()
    };

    let mut surfaced: Vec<&Selection> = selections.iter().filter(|s| s.recommended_bet).collect();
    surfaced.sort_by(|a, b| a.race_time.cmp(&b.race_time).then(a.bet_id.cmp(&b.bet_id)));

    let mut days: BTreeMap<NaiveDate, DayResult> = BTreeMap::new();
    for s in surfaced {
        if s.outcome.is_pending() {
            report.pending += 1;
            continue;
        }
        if !s.outcome.is_resolved() {
            continue;
        }

        let bet = BetResult {
            bet_date: s.bet_date,
            race_time: s.race_time,
            course: s.course.clone(),
            horse: s.horse.clone(),
            score: s.score,
            outcome: s.outcome,
            odds: s.final_odds.or(s.odds),
            stake: s.stake,
            profit: s.profit_loss.unwrap_or_default(),
        };
        let won = bet.outcome == Outcome::Win;

        let day = days.entry(s.bet_date).or_insert_with(|| DayResult {
            date: Some(s.bet_date),
            ..Default::default()
        });
        day.num_bets += 1;
        day.total_staked += bet.stake;
        day.total_returned += bet.returned();

        report.num_bets += 1;
        report.total_staked += bet.stake;
        report.total_returned += bet.returned();
        if won {
            day.num_wins += 1;
            report.num_wins += 1;
        }
        report.bets.push(bet);
    }

    report.days = days.into_values().collect();
    report
}

/// Load recommended selections in a date range and summarize them.
pub fn performance_report(
    store: &dyn SelectionStore,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> StoreResult<PerformanceReport> {
    let filter = ScanFilter {
        from_date: from,
        to_date: to,
        ..ScanFilter::selections()
    };
    let selections = store.scan_selections(&filter)?;
    Ok(summarize(&selections, from, to))
}

/// Print a performance report in table format.
pub fn print_performance_table(report: &PerformanceReport) {
    println!("=== Performance ===");
    println!();
    match (report.from, report.to) {
        (Some(from), Some(to)) => println!("Range:         {} to {}", from, to),
        (Some(from), None) => println!("Range:         from {}", from),
        (None, Some(to)) => println!("Range:         up to {}", to),
        (None, None) => println!("Range:         all"),
    }
    println!("  Total Bets:    {}", report.num_bets);
    println!("  Total Wins:    {}", report.num_wins);
    println!("  Pending:       {}", report.pending);
    println!("  Hit Rate:      {:.2}%", report.hit_rate() * 100.0);
    println!("  Staked:        £{:.2}", report.total_staked);
    println!("  Returned:      £{:.2}", report.total_returned);
    println!("  Profit:        £{:.2}", report.profit());
    println!("  ROI:           {:.2}%", report.roi() * 100.0);
    println!("  Max Drawdown:  £{:.2}", report.max_drawdown());
    println!();

    if !report.days.is_empty() {
        println!("Daily Results:");
        println!(
            "  {:12} {:>6} {:>6} {:>10} {:>10}",
            "Date", "Bets", "Wins", "ROI", "Profit"
        );
        println!("  {}", "-".repeat(50));
        for day in &report.days {
            println!(
                "  {:12} {:>6} {:>6} {:>9.1}% {:>10.2}",
                day.date.map(|d| d.to_string()).unwrap_or_default(),
                day.num_bets,
                day.num_wins,
                day.roi() * 100.0,
                day.profit()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::records::fixtures::selection;
    use crate::store::{decimal, Record, SqliteStore};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, d).unwrap()
    }

    fn bet(d: u32, horse: &str, outcome: Outcome, profit: f64) -> Selection {
        let mut s = selection(day(d), "Kempton", horse, "1.1");
        s.recommended_bet = true;
        s.show_in_ui = true;
        s.outcome = outcome;
        if !outcome.is_pending() {
            s.profit_loss = Some(decimal(profit));
        }
        s
    }

    #[test]
    fn test_day_result_metrics() {
        let day = DayResult {
            date: Some(day(1)),
            num_bets: 10,
            num_wins: 1,
            total_staked: decimal(300.0),
            total_returned: decimal(360.0),
        };
        assert_eq!(day.profit(), decimal(60.0));
        assert!((day.roi() - 0.2).abs() < 1e-9);
        assert!((day.hit_rate() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_summarize_and_drawdown() {
        // +90, -30, -30, -30, +60 across two days
        let rows = vec![
            bet(1, "A", Outcome::Win, 90.0),
            bet(1, "B", Outcome::Loss, -30.0),
            bet(2, "C", Outcome::Loss, -30.0),
            bet(2, "D", Outcome::Loss, -30.0),
            bet(3, "E", Outcome::Win, 60.0),
            bet(3, "F", Outcome::Pending, 0.0),
            bet(3, "G", Outcome::Void, 0.0),
        ];
        let mut hidden = selection(day(3), "Kempton", "Hidden", "1.2");
        hidden.outcome = Outcome::Win;
        hidden.profit_loss = Some(decimal(120.0));

        let mut all = rows;
        all.push(hidden);
        let report = summarize(&all, None, None);

        assert_eq!(report.num_bets, 5);
        assert_eq!(report.num_wins, 2);
        assert_eq!(report.pending, 1);
        assert_eq!(report.total_staked, decimal(150.0));
        assert_eq!(report.profit(), decimal(60.0));
        assert!((report.roi() - 0.4).abs() < 1e-9);
        // Peak 90, trough 0
        assert_eq!(report.max_drawdown(), decimal(90.0));
        assert_eq!(report.days.len(), 3);
        assert_eq!(report.days[1].profit(), decimal(-60.0));
    }

    #[test]
    fn test_report_from_store_respects_range() {
        let store = SqliteStore::in_memory().unwrap();
        for s in [
            bet(1, "A", Outcome::Win, 90.0),
            bet(5, "B", Outcome::Loss, -30.0),
        ] {
            store.put_item(&Record::Selection(s)).unwrap();
        }

        let report = performance_report(&store, Some(day(2)), Some(day(6))).unwrap();
        assert_eq!(report.num_bets, 1);
        assert_eq!(report.profit(), decimal(-30.0));
    }
}
