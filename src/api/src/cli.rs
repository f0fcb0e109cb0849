//! CLI commands for surebet-api.
//!
//! Each subcommand is one named entry point an external scheduler invokes.
//! Exit status is non-zero only when the store or an input file cannot be
//! read.

use anyhow::{bail, Context};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::adjuster::{apply_report, AdjustOutcome};
use crate::calibration::{calibrate, print_report_table, CalibrationReport};
use crate::config::{AppConfig, ResultSourceKind};
use crate::features::{OpenMeteo, WeatherSource};
use crate::insights::track_insights_for_date;
use crate::performance::{performance_report, print_performance_table};
use crate::pipeline::{run_learning_pass, run_scoring_pass, run_settlement_pass, ScoringOptions};
use crate::scoring::WeightCache;
use crate::settlement::{BetfairResultSource, FileResultSource, ResultSource, SettleOptions};
use crate::store::SqliteStore;
use crate::types::{BetType, RaceSnapshot};

#[derive(Parser)]
#[command(name = "surebet-api")]
#[command(version, about = "Surebet: horse racing value-betting pipeline", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the read-only API server
    Serve {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Score a race snapshot and persist one selection per runner
    Score {
        /// Path to race snapshot JSON file
        #[arg(value_name = "SNAPSHOT")]
        snapshot: PathBuf,

        /// Output format (json, table)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Settle pending selections and update track insights
    Settle {
        /// Market results JSON file (overrides the configured source)
        #[arg(short, long, value_name = "FILE")]
        results: Option<PathBuf>,

        /// Output format (json, table)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Build a calibration report from settled selections
    Calibrate {
        /// Days of settled selections to include
        #[arg(short, long)]
        window_days: Option<i64>,

        /// Output format (json, table)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Apply a calibration report to the stored weights
    Adjust {
        /// Report file (defaults to the configured report path)
        #[arg(short, long, value_name = "FILE")]
        report: Option<PathBuf>,
    },

    /// Calibrate, write the report, and adjust weights
    Learn {
        /// Days of settled selections to include
        #[arg(short, long)]
        window_days: Option<i64>,
    },

    /// Show per-course winning patterns
    Insights {
        /// Only this course
        #[arg(short, long)]
        course: Option<String>,

        /// Race day (defaults to today)
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Output format (json, table)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// P&L summary over surfaced bets
    Report {
        /// First race day
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last race day
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Output format (json, table)
        #[arg(short, long, default_value = "table")]
        format: String,
    },
}

/// Open the Selection Store at the configured path.
pub fn open_store(config: &AppConfig) -> anyhow::Result<SqliteStore> {
    SqliteStore::new(Path::new(&config.store.path))
        .with_context(|| format!("Failed to open store at {}", config.store.path))
}

fn weather_source(config: &AppConfig) -> Option<OpenMeteo> {
    if !config.weather.enabled {
        info!("Weather lookups disabled");
        return None;
    }
    match OpenMeteo::new(&config.weather.base_url, config.weather.timeout_secs) {
        Ok(source) => Some(source),
        Err(e) => {
            warn!("Weather client unavailable, going defaults to Unknown: {}", e);
            None
        }
    }
}

fn result_source(config: &AppConfig, results: Option<PathBuf>) -> anyhow::Result<Box<dyn ResultSource>> {
    if let Some(path) = results {
        return Ok(Box::new(FileResultSource::new(path)));
    }
    match config.results.source {
        ResultSourceKind::File => Ok(Box::new(FileResultSource::new(&config.results.file))),
        ResultSourceKind::Betfair => {
            let (Some(app_key), Some(token)) = (&config.results.app_key, &config.results.session_token)
            else {
                bail!("Betfair results need results.app_key and results.session_token");
            };
            let source = BetfairResultSource::new(
                &config.results.betfair_url,
                app_key,
                token,
                config.results.timeout_secs,
            )
            .context("Failed to build Betfair client")?;
            if config.settlement.bet_type == BetType::EachWay {
                warn!("Betfair win markets carry no placings; each-way losers stay pending");
            }
            Ok(Box::new(source))
        }
    }
}

/// Score a race snapshot.
pub fn run_score(snapshot_path: PathBuf, format: String) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    let store = open_store(&config)?;

    let snapshot = RaceSnapshot::from_file(&snapshot_path)?;
    info!("Loaded {} races from {}", snapshot.races.len(), snapshot_path.display());

    let weights = WeightCache::new(config.scoring.weight_cache_ttl_secs)
        .get(&store)
        .context("Failed to load weights")?;
    let weather = weather_source(&config);
    let opts = ScoringOptions::from_config(&config);

    let summary = run_scoring_pass(
        &store,
        &snapshot,
        &weights,
        weather.as_ref().map(|w| w as &dyn WeatherSource),
        &opts,
        Utc::now(),
    )?;

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => {
            println!("=== Scoring Pass ===");
            println!();
            println!("  Races:             {}", summary.races);
            println!("  Runners:           {}", summary.runners);
            println!("  Analyzed:          {}", summary.analyzed);
            println!("  Picks:             {}", summary.picks);
            println!("  Recommended:       {}", summary.recommended);
            println!("  Too close to call: {}", summary.too_close_to_call);
            println!("  Failed validation: {}", summary.failed_validation);
            println!("  Written:           {}", summary.written);
            println!("  Kept (settled):    {}", summary.kept_settled);
            println!("  Write failures:    {}", summary.write_failures);
        }
    }
    Ok(())
}

/// Settle pending selections.
pub fn run_settle(results: Option<PathBuf>, format: String) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    let store = open_store(&config)?;
    let source = result_source(&config, results)?;

    let (summary, insights) = run_settlement_pass(
        &store,
        source.as_ref(),
        &SettleOptions::from_config(&config),
        Utc::now(),
    )?;

    match format.as_str() {
        "json" => {
            let json_output = serde_json::json!({
                "settlement": summary,
                "track_insights": insights,
            });
            println!("{}", serde_json::to_string_pretty(&json_output)?);
        }
        _ => {
            println!("=== Settlement ===");
            println!();
            println!("  Markets checked: {}", summary.markets_checked);
            println!("  Markets failed:  {}", summary.markets_failed);
            println!("  Settled:         {}", summary.settled);
            println!("  Wins:            {}", summary.wins);
            println!("  Placed:          {}", summary.placed);
            println!("  Losses:          {}", summary.losses);
            println!("  Void:            {}", summary.voided);
            println!("  Awaiting places: {}", summary.awaiting_placings);
            println!("  P&L:             £{:.2}", summary.profit_loss);
            if !insights.is_empty() {
                println!();
                println!("Track insights updated: {}", insights.len());
            }
        }
    }
    Ok(())
}

/// Build and write a calibration report.
pub fn run_calibrate(window_days: Option<i64>, format: String) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    let store = open_store(&config)?;
    let window_days = window_days.unwrap_or(config.calibration.window_days);

    let report = calibrate(&store, window_days, Utc::now())?;
    report.write(
        Path::new(&config.calibration.report_path),
        config.calibration.archive_dir.as_deref().map(Path::new),
    )?;
    info!("Report written to {}", config.calibration.report_path);

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_report_table(&report),
    }
    Ok(())
}

fn print_adjustment(outcome: &AdjustOutcome) {
    match outcome {
        AdjustOutcome::Applied(adjustment) => {
            println!("=== Weight Adjustment ===");
            println!();
            if adjustment.changes.is_empty() {
                println!("  No changes");
            }
            for change in &adjustment.changes {
                println!("  {}", change);
            }
        }
        AdjustOutcome::AlreadyApplied { fingerprint } => {
            println!("Report {} already applied; weights unchanged", fingerprint);
        }
    }
}

/// Apply a written report to the stored weights.
pub fn run_adjust(report_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    let store = open_store(&config)?;
    let path = report_path.unwrap_or_else(|| PathBuf::from(&config.calibration.report_path));

    let report = CalibrationReport::from_file(&path)?;
    let outcome = apply_report(&store, None, &report, Utc::now())?;
    print_adjustment(&outcome);
    Ok(())
}

/// Calibrate and adjust in one pass.
pub fn run_learn(window_days: Option<i64>) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    let store = open_store(&config)?;
    let window_days = window_days.unwrap_or(config.calibration.window_days);

    let (report, outcome) = run_learning_pass(
        &store,
        None,
        window_days,
        Path::new(&config.calibration.report_path),
        config.calibration.archive_dir.as_deref().map(Path::new),
        Utc::now(),
    )?;

    print_report_table(&report);
    println!();
    print_adjustment(&outcome);
    Ok(())
}

/// Show track insights for a day.
pub fn run_insights(course: Option<String>, date: Option<NaiveDate>, format: String) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    let store = open_store(&config)?;
    let date = date.unwrap_or_else(|| Utc::now().date_naive());

    let insights: Vec<_> = track_insights_for_date(&store, date)?
        .into_iter()
        .filter(|i| course.as_ref().map_or(true, |c| i.course.eq_ignore_ascii_case(c)))
        .collect();

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&insights)?),
        _ => {
            println!("=== Track Insights {} ===", date);
            println!();
            if insights.is_empty() {
                println!("  No settled races yet");
            }
            for insight in &insights {
                let boost = insight
                    .suggested_boost
                    .iter()
                    .map(|(f, b)| format!("{} +{}", f, b))
                    .collect::<Vec<_>>()
                    .join(", ");
                println!(
                    "  {:16} {:>3} races  {:18} {:>5.0}%  {}",
                    insight.course,
                    insight.races_analyzed,
                    insight.dominant_pattern.map(|p| p.as_str()).unwrap_or("-"),
                    insight.dominant_share * 100.0,
                    boost
                );
                for winner in &insight.recent_winners {
                    println!(
                        "      {} {} ({})",
                        winner.race_time.format("%H:%M"),
                        winner.horse,
                        winner.pattern.as_str()
                    );
                }
            }
        }
    }
    Ok(())
}

/// P&L summary over surfaced bets.
pub fn run_report(from: Option<NaiveDate>, to: Option<NaiveDate>, format: String) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    let store = open_store(&config)?;

    let report = performance_report(&store, from, to)?;

    match format.as_str() {
        "json" => {
            let json_output = serde_json::json!({
                "from": report.from,
                "to": report.to,
                "num_bets": report.num_bets,
                "num_wins": report.num_wins,
                "pending": report.pending,
                "hit_rate": report.hit_rate(),
                "total_staked": report.total_staked,
                "total_returned": report.total_returned,
                "profit": report.profit(),
                "roi": report.roi(),
                "max_drawdown": report.max_drawdown(),
                "days": report.days.iter().map(|d| serde_json::json!({
                    "date": d.date,
                    "num_bets": d.num_bets,
                    "num_wins": d.num_wins,
                    "hit_rate": d.hit_rate(),
                    "roi": d.roi(),
                    "profit": d.profit(),
                })).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&json_output)?);
        }
        _ => print_performance_table(&report),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::try_parse_from(["surebet-api", "score", "races.json"]).unwrap();
        assert!(matches!(cli.command, Commands::Score { ref snapshot, .. } if snapshot == Path::new("races.json")));

        let cli = Cli::try_parse_from(["surebet-api", "report", "--from", "2026-02-01", "--to", "2026-02-07"]).unwrap();
        match cli.command {
            Commands::Report { from, to, .. } => {
                assert_eq!(from, NaiveDate::from_ymd_opt(2026, 2, 1));
                assert_eq!(to, NaiveDate::from_ymd_opt(2026, 2, 7));
            }
            _ => panic!("expected report"),
        }

        let cli = Cli::try_parse_from(["surebet-api", "serve", "-H", "127.0.0.1", "-p", "9000"]).unwrap();
        assert!(matches!(cli.command, Commands::Serve { port: Some(9000), .. }));
    }

    #[test]
    fn test_bad_date_is_rejected() {
        assert!(Cli::try_parse_from(["surebet-api", "insights", "--date", "tomorrow"]).is_err());
    }

    #[test]
    fn test_results_flag_overrides_source() {
        let mut config = AppConfig::default();
        config.results.source = ResultSourceKind::Betfair;
        assert!(result_source(&config, Some(PathBuf::from("results.json"))).is_ok());
        // Betfair without credentials is a configuration error
        assert!(result_source(&config, None).is_err());
    }
}
