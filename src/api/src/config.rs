//! Configuration for the Surebet pipeline.

use serde::{Deserialize, Serialize};

use crate::types::BetType;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Selection Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String {
    "data/surebet.db".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Average winner odds used before enough winners have settled today
    #[serde(default = "default_avg_winner_odds")]
    pub avg_winner_odds: f64,
    /// Weight cache time-to-live in seconds
    #[serde(default = "default_weight_cache_ttl")]
    pub weight_cache_ttl_secs: i64,
}

fn default_avg_winner_odds() -> f64 {
    4.65
}

fn default_weight_cache_ttl() -> i64 {
    300
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            avg_winner_odds: default_avg_winner_odds(),
            weight_cache_ttl_secs: default_weight_cache_ttl(),
        }
    }
}

/// Weather source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_weather_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
}

fn default_true() -> bool {
    true
}

fn default_weather_url() -> String {
    "https://archive-api.open-meteo.com/v1/archive".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_lookback_days() -> i64 {
    3
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            base_url: default_weather_url(),
            timeout_secs: default_timeout_secs(),
            lookback_days: default_lookback_days(),
        }
    }
}

/// Settlement configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    #[serde(default = "default_stake")]
    pub stake: f64,
    /// Minutes after the off before a race is eligible for settlement
    #[serde(default = "default_settle_delay")]
    pub settle_delay_mins: i64,
    #[serde(default)]
    pub bet_type: BetType,
    #[serde(default = "default_place_fraction")]
    pub place_fraction: f64,
}

fn default_stake() -> f64 {
    30.0
}

fn default_settle_delay() -> i64 {
    60
}

fn default_place_fraction() -> f64 {
    0.2
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            stake: default_stake(),
            settle_delay_mins: default_settle_delay(),
            bet_type: BetType::default(),
            place_fraction: default_place_fraction(),
        }
    }
}

/// Where market results come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSourceKind {
    #[default]
    File,
    Betfair,
}

/// Market result source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsConfig {
    #[serde(default)]
    pub source: ResultSourceKind,
    #[serde(default = "default_results_file")]
    pub file: String,
    #[serde(default = "default_betfair_url")]
    pub betfair_url: String,
    #[serde(default)]
    pub app_key: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_results_file() -> String {
    "data/market_results.json".to_string()
}

fn default_betfair_url() -> String {
    "https://api.betfair.com/exchange/betting/rest/v1.0".to_string()
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            source: ResultSourceKind::default(),
            file: default_results_file(),
            betfair_url: default_betfair_url(),
            app_key: None,
            session_token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Calibration report configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    #[serde(default = "default_window_days")]
    pub window_days: i64,
    #[serde(default = "default_report_path")]
    pub report_path: String,
    /// Directory for dated archive copies; disabled when unset
    #[serde(default)]
    pub archive_dir: Option<String>,
}

fn default_window_days() -> i64 {
    7
}

fn default_report_path() -> String {
    "data/calibration_report.json".to_string()
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            report_path: default_report_path(),
            archive_dir: None,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub settlement: SettlementConfig,
    #[serde(default)]
    pub results: ResultsConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
}

impl AppConfig {
    /// Load configuration from environment and config file
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // Add config file if exists
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables (SUREBET_STORE__PATH, etc.)
            .add_source(
                config::Environment::with_prefix("SUREBET")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.scoring.avg_winner_odds, 4.65);
        assert_eq!(config.scoring.weight_cache_ttl_secs, 300);
        assert_eq!(config.settlement.stake, 30.0);
        assert_eq!(config.settlement.bet_type, BetType::Win);
        assert_eq!(config.calibration.window_days, 7);
        assert_eq!(config.results.source, ResultSourceKind::File);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml = r#"
            [settlement]
            stake = 10.0
            bet_type = "each_way"

            [results]
            source = "betfair"
        "#;
        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.settlement.stake, 10.0);
        assert_eq!(config.settlement.bet_type, BetType::EachWay);
        assert_eq!(config.settlement.settle_delay_mins, 60);
        assert_eq!(config.results.source, ResultSourceKind::Betfair);
        assert_eq!(config.weather.timeout_secs, 10);
    }
}
