//! Going inference.
//!
//! A declared going on the race card wins. Otherwise the going is inferred
//! from trailing rainfall blended with a seasonal bias. All-weather courses
//! are always Standard.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::error::FetchError;

/// Ground condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Going {
    Heavy,
    Soft,
    #[serde(rename = "Good-to-Soft")]
    GoodToSoft,
    Good,
    #[serde(rename = "Good-to-Firm")]
    GoodToFirm,
    Firm,
    Standard,
    #[serde(rename = "Standard-to-Slow")]
    StandardToSlow,
    Unknown,
}

impl Going {
    pub fn label(&self) -> &'static str {
        match self {
            Going::Heavy => "Heavy",
            Going::Soft => "Soft",
            Going::GoodToSoft => "Good-to-Soft",
            Going::Good => "Good",
            Going::GoodToFirm => "Good-to-Firm",
            Going::Firm => "Firm",
            Going::Standard => "Standard",
            Going::StandardToSlow => "Standard-to-Slow",
            Going::Unknown => "Unknown",
        }
    }

    /// Adjustment used when the going is declared rather than inferred.
    pub fn declared_adjustment(&self) -> i32 {
        match self {
            Going::Heavy => -10,
            Going::Soft => -5,
            Going::GoodToSoft => -2,
            Going::Good => 5,
            Going::GoodToFirm => 10,
            Going::Firm => 10,
            Going::Standard => 0,
            Going::StandardToSlow => -2,
            Going::Unknown => 0,
        }
    }

    /// Heavy or Soft ground.
    pub fn is_testing(&self) -> bool {
        matches!(self, Going::Heavy | Going::Soft)
    }

    /// Normalise a declared going string ("Good to Soft", "GD-SFT", "Std/Slow").
    pub fn from_declared(text: &str) -> Option<Self> {
        let norm: String = text
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphabetic() { c } else { ' ' })
            .collect();
        let words: Vec<&str> = norm
            .split_whitespace()
            .filter(|w| *w != "to")
            .map(canonical_word)
            .collect();
        match words.as_slice() {
            ["heavy", ..] => Some(Going::Heavy),
            ["soft", ..] => Some(Going::Soft),
            ["good", "soft", ..] | ["good", "yielding", ..] | ["yielding", ..] => {
                Some(Going::GoodToSoft)
            }
            ["good", "firm", ..] => Some(Going::GoodToFirm),
            ["good", ..] => Some(Going::Good),
            ["firm", ..] => Some(Going::Firm),
            ["standard", "slow", ..] | ["slow", ..] => Some(Going::StandardToSlow),
            ["standard", ..] => Some(Going::Standard),
            _ => None,
        }
    }
}

fn canonical_word(word: &str) -> &str {
    match word {
        "hvy" => "heavy",
        "sft" => "soft",
        "gd" => "good",
        "fm" | "frm" => "firm",
        "std" | "stand" => "standard",
        "slw" => "slow",
        other => other,
    }
}

impl fmt::Display for Going {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    Turf,
    AllWeather,
}

/// A course the going provider knows how to locate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Course {
    pub name: &'static str,
    pub lat: f64,
    pub lon: f64,
    pub surface: Surface,
}

const fn turf(name: &'static str, lat: f64, lon: f64) -> Course {
    Course {
        name,
        lat,
        lon,
        surface: Surface::Turf,
    }
}

const fn aw(name: &'static str, lat: f64, lon: f64) -> Course {
    Course {
        name,
        lat,
        lon,
        surface: Surface::AllWeather,
    }
}

pub const COURSES: &[Course] = &[
    turf("Carlisle", 54.89, -2.94),
    turf("Taunton", 51.02, -3.10),
    turf("Fairyhouse", 53.47, -6.45),
    aw("Wolverhampton", 52.59, -2.13),
    aw("Kempton", 51.42, -0.34),
    turf("Punchestown", 53.19, -6.63),
    turf("Ludlow", 52.37, -2.72),
    aw("Newcastle", 54.97, -1.62),
    turf("Sedgefield", 54.66, -1.43),
    aw("Southwell", 53.07, -0.87),
    aw("Lingfield", 51.17, -0.01),
    aw("Chelmsford City", 51.74, 0.47),
    aw("Dundalk", 54.02, -6.40),
    turf("Leopardstown", 53.27, -6.20),
    turf("Cheltenham", 51.92, -2.06),
    turf("Sandown", 51.37, -0.36),
    turf("Ascot", 51.41, -0.68),
    turf("Doncaster", 53.51, -1.11),
    turf("Haydock", 53.48, -2.62),
];

/// Look up a course by name, ignoring case and suffixes like "(IRE)".
pub fn find_course(name: &str) -> Option<&'static Course> {
    let lower = name.to_lowercase();
    let stripped = lower.split('(').next().unwrap_or("").trim();
    COURSES
        .iter()
        .find(|c| c.name.to_lowercase() == stripped)
        .or_else(|| {
            COURSES
                .iter()
                .find(|c| stripped.starts_with(&c.name.to_lowercase()))
        })
}

/// Bucket trailing rainfall into a going and its adjustment.
pub fn rainfall_bucket(rainfall_mm: f64) -> (Going, i32) {
    if rainfall_mm >= 20.0 {
        (Going::Heavy, -10)
    } else if rainfall_mm >= 10.0 {
        (Going::Soft, -5)
    } else if rainfall_mm >= 5.0 {
        (Going::GoodToSoft, -2)
    } else if rainfall_mm >= 2.0 {
        (Going::Good, 5)
    } else {
        (Going::GoodToFirm, 10)
    }
}

/// Seasonal bias by calendar month: wetter winters, firmer summers.
pub fn seasonal_adjustment(month: u32) -> i32 {
    match month {
        1 | 2 | 12 => -5,
        3 | 11 => -3,
        4 | 10 => -2,
        5 => 0,
        6 | 9 => 2,
        7 | 8 => 5,
        _ => 0,
    }
}

/// Map a blended adjustment back to a going label.
pub fn bucket_adjustment(adjustment: i32) -> Going {
    match adjustment {
        a if a <= -8 => Going::Heavy,
        a if a <= -4 => Going::Soft,
        a if a <= -1 => Going::GoodToSoft,
        a if a <= 3 => Going::Good,
        _ => Going::GoodToFirm,
    }
}

/// Blend rainfall and seasonal adjustments 70/30, truncating toward zero.
pub fn blend(rainfall_adj: i32, seasonal_adj: i32) -> i32 {
    (0.7 * rainfall_adj as f64 + 0.3 * seasonal_adj as f64).trunc() as i32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoingSource {
    Declared,
    Weather,
    AllWeather,
    Unavailable,
}

/// Output of the going provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoingAssessment {
    pub going: Going,
    pub adjustment: i32,
    pub surface: Option<Surface>,
    pub source: GoingSource,
    pub rainfall_mm: Option<f64>,
}

impl Default for GoingAssessment {
    fn default() -> Self {
        GoingAssessment::unknown(None)
    }
}

impl GoingAssessment {
    pub fn unknown(surface: Option<Surface>) -> Self {
        Self {
            going: Going::Unknown,
            adjustment: 0,
            surface,
            source: GoingSource::Unavailable,
            rainfall_mm: None,
        }
    }

    pub fn all_weather() -> Self {
        Self {
            going: Going::Standard,
            adjustment: 0,
            surface: Some(Surface::AllWeather),
            source: GoingSource::AllWeather,
            rainfall_mm: None,
        }
    }
}

/// Daily precipitation lookup.
pub trait WeatherSource {
    /// Daily precipitation totals (mm) between two dates inclusive.
    fn daily_precipitation(
        &self,
        lat: f64,
        lon: f64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<f64>, FetchError>;
}

/// Infer the going for a course on a date.
pub fn infer_going(
    course_name: &str,
    date: NaiveDate,
    declared: Option<&str>,
    weather: Option<&dyn WeatherSource>,
    lookback_days: i64,
) -> GoingAssessment {
    let course = find_course(course_name);

    if course.is_some_and(|c| c.surface == Surface::AllWeather) {
        return GoingAssessment::all_weather();
    }
    let surface = course.map(|c| c.surface);

    if let Some(going) = declared.and_then(Going::from_declared) {
        return GoingAssessment {
            going,
            adjustment: going.declared_adjustment(),
            surface,
            source: GoingSource::Declared,
            rainfall_mm: None,
        };
    }

    let (Some(course), Some(weather)) = (course, weather) else {
        debug!(course = course_name, "No location or weather source, going unknown");
        return GoingAssessment::unknown(surface);
    };

    let start = date - Duration::days(lookback_days);
    let rainfall = match weather.daily_precipitation(course.lat, course.lon, start, date) {
        Ok(days) => days.iter().sum::<f64>(),
        Err(e) => {
            warn!(course = course_name, error = %e, "Weather lookup failed, going unknown");
            return GoingAssessment::unknown(surface);
        }
    };

    let (_, rain_adj) = rainfall_bucket(rainfall);
    let adjustment = blend(rain_adj, seasonal_adjustment(date.month()));

    GoingAssessment {
        going: bucket_adjustment(adjustment),
        adjustment,
        surface,
        source: GoingSource::Weather,
        rainfall_mm: Some(rainfall),
    }
}

// ==================== Open-Meteo ====================

#[derive(Debug, Deserialize)]
struct ArchiveResponse {
    daily: ArchiveDaily,
}

#[derive(Debug, Deserialize)]
struct ArchiveDaily {
    #[serde(default)]
    precipitation_sum: Vec<Option<f64>>,
}

/// Open-Meteo historical weather archive.
pub struct OpenMeteo {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl OpenMeteo {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }
}

impl WeatherSource for OpenMeteo {
    fn daily_precipitation(
        &self,
        lat: f64,
        lon: f64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<f64>, FetchError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("latitude", lat.to_string()),
                ("longitude", lon.to_string()),
                ("start_date", start.to_string()),
                ("end_date", end.to_string()),
                ("daily", "precipitation_sum".to_string()),
                ("timezone", "Europe/London".to_string()),
            ])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                endpoint: self.base_url.clone(),
                status: status.as_u16(),
            });
        }

        let body: ArchiveResponse = response
            .json()
            .map_err(|e| FetchError::Malformed(e.to_string()))?;
        Ok(body.daily.precipitation_sum.into_iter().flatten().collect())
    }
}

#[cfg(test)]
pub(crate) mod stub {
    use super::*;

    /// Weather source returning fixed daily totals, or failing.
    pub struct FixedWeather(pub Option<Vec<f64>>);

    impl WeatherSource for FixedWeather {
        fn daily_precipitation(
            &self,
            _lat: f64,
            _lon: f64,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<f64>, FetchError> {
            self.0.clone().ok_or(FetchError::Timeout)
        }
    }
}
