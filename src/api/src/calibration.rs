//! Calibration report over settled selections.
//!
//! Predicted probabilities are binned into five equal-width bins and compared
//! with observed win rates. High-confidence losses and solid wins are mined
//! for recurring trainers, courses, odds bands and tags.

use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::error::StoreResult;
use crate::scoring::Factor;
use crate::store::{ScanFilter, Selection, SelectionStore};

/// Bin edges; the last bin is closed at 1.0.
const BIN_EDGES: [f64; 6] = [0.0, 0.2, 0.4, 0.6, 0.8, 1.0];
const MIN_BIN_SAMPLES: usize = 5;
const CALIBRATION_TOLERANCE: f64 = 0.1;

const FAILURE_MIN_PROBABILITY: f64 = 0.4;
const SUCCESS_MIN_PROBABILITY: f64 = 0.3;
const MIN_FAILURES: usize = 3;
const MIN_SUCCESSES: usize = 2;

/// Ratio band inside which the model counts as calibrated overall.
pub const RATIO_LOW: f64 = 0.85;
pub const RATIO_HIGH: f64 = 1.15;
const POOR_BRIER: f64 = 0.25;
const SWEET_SPOT_SHARE: f64 = 0.6;
const MAX_PRIORITY_ACTIONS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Calibrated,
    Overconfident,
    Underconfident,
    InsufficientData,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Calibrated => "CALIBRATED",
            Verdict::Overconfident => "OVERCONFIDENT",
            Verdict::Underconfident => "UNDERCONFIDENT",
            Verdict::InsufficientData => "INSUFFICIENT_DATA",
        }
    }
}

/// One probability bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBin {
    pub lower: f64,
    pub upper: f64,
    pub sample_size: usize,
    pub wins: usize,
    pub predicted_avg: f64,
    pub actual_rate: f64,
    pub verdict: Verdict,
    /// Summed positive factor points over this bin's losing selections.
    pub failing_factors: BTreeMap<Factor, f64>,
}

impl CalibrationBin {
    fn empty(index: usize) -> Self {
        Self {
            lower: BIN_EDGES[index],
            upper: BIN_EDGES[index + 1],
            sample_size: 0,
            wins: 0,
            predicted_avg: 0.0,
            actual_rate: 0.0,
            verdict: Verdict::InsufficientData,
            failing_factors: BTreeMap::new(),
        }
    }

    pub fn label(&self) -> String {
        format!("{:.1}-{:.1}", self.lower, self.upper)
    }

    /// The `n` factors with the most points among losing selections.
    pub fn top_failing_factors(&self, n: usize) -> Vec<Factor> {
        let mut factors: Vec<(Factor, f64)> =
            self.failing_factors.iter().map(|(f, p)| (*f, *p)).collect();
        factors.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        factors.into_iter().take(n).map(|(f, _)| f).collect()
    }
}

/// Index of the bin holding `p`.
pub fn bin_index(p: f64) -> usize {
    (0..BIN_EDGES.len() - 1)
        .find(|&i| p < BIN_EDGES[i + 1])
        .unwrap_or(BIN_EDGES.len() - 2)
}

/// Odds band used for pattern mining.
pub fn odds_band(odds: f64) -> &'static str {
    if odds < 3.0 {
        "<3.0"
    } else if odds < 4.0 {
        "3-4"
    } else if odds < 5.0 {
        "4-5"
    } else if odds < 6.0 {
        "5-6"
    } else if odds < 9.0 {
        "6-9"
    } else {
        "9+"
    }
}

fn is_sweet_spot_band(band: &str) -> bool {
    matches!(band, "3-4" | "4-5" | "5-6" | "6-9")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternDimension {
    Trainer,
    Course,
    OddsBand,
    Tag,
}

/// A recurring attribute among failures or successes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub dimension: PatternDimension,
    pub value: String,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendationKind {
    TrainerIssue,
    CourseIssue,
    TagFailing,
    TrainerSuccess,
    CourseSuccess,
    TagWorking,
    SweetSpotConfirmed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    #[serde(default)]
    pub subject: Option<String>,
    pub count: usize,
    pub action: String,
    pub reason: String,
}

/// Output of `calibrate`, written to disk for the weight adjuster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub generated_at: DateTime<Utc>,
    pub window_days: i64,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub sample_size: usize,
    pub wins: usize,
    pub expected_wins: f64,
    /// Actual over expected wins; below 1 means overconfident.
    #[serde(default)]
    pub ratio: Option<f64>,
    #[serde(default)]
    pub brier_score: Option<f64>,
    pub status: Verdict,
    pub bins: Vec<CalibrationBin>,
    pub failure_patterns: Vec<Pattern>,
    pub success_patterns: Vec<Pattern>,
    pub recommendations: Vec<Recommendation>,
    pub priority_actions: Vec<String>,
    #[serde(default)]
    pub fingerprint: String,
}

impl CalibrationReport {
    /// Hash of the report content, excluding the fingerprint itself.
    pub fn compute_fingerprint(&self) -> String {
        let mut unsigned = self.clone();
        unsigned.fingerprint.clear();
        let bytes = serde_json::to_vec(&unsigned).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }

    pub fn overconfident_bins(&self) -> impl Iterator<Item = &CalibrationBin> {
        self.bins
            .iter()
            .filter(|b| b.verdict == Verdict::Overconfident)
    }

    /// Tags named by TAG_WORKING recommendations.
    pub fn working_tags(&self) -> impl Iterator<Item = &str> {
        self.recommendations
            .iter()
            .filter(|r| r.kind == RecommendationKind::TagWorking)
            .filter_map(|r| r.subject.as_deref())
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read report {}", path.display()))?;
        let report = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse report {}", path.display()))?;
        Ok(report)
    }

    /// Write the report, plus a dated copy when an archive directory is set.
    pub fn write(&self, path: &Path, archive_dir: Option<&Path>) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, &content)
            .with_context(|| format!("Failed to write report {}", path.display()))?;

        if let Some(dir) = archive_dir {
            fs::create_dir_all(dir)?;
            let archived = dir.join(format!(
                "calibration_{}.json",
                self.generated_at.format("%Y%m%dT%H%M%S")
            ));
            fs::write(&archived, &content)
                .with_context(|| format!("Failed to archive report {}", archived.display()))?;
        }
        Ok(())
    }
}

fn verdict_for(sample_size: usize, predicted: f64, actual: f64) -> Verdict {
    if sample_size < MIN_BIN_SAMPLES {
        Verdict::InsufficientData
    } else if (actual - predicted).abs() <= CALIBRATION_TOLERANCE {
        Verdict::Calibrated
    } else if actual < predicted {
        Verdict::Overconfident
    } else {
        Verdict::Underconfident
    }
}

fn build_bins(samples: &[&Selection]) -> Vec<CalibrationBin> {
    let mut bins: Vec<CalibrationBin> = (0..BIN_EDGES.len() - 1).map(CalibrationBin::empty).collect();
    let mut prob_sums = vec![0.0; bins.len()];

    for s in samples {
        let p = s.probability();
        let i = bin_index(p);
        let bin = &mut bins[i];
        bin.sample_size += 1;
        prob_sums[i] += p;
        if s.is_win() {
            bin.wins += 1;
        } else {
            for (factor, points) in s.positive_factors() {
                *bin.failing_factors.entry(factor).or_insert(0.0) += points;
            }
        }
    }

    for (bin, sum) in bins.iter_mut().zip(prob_sums) {
        if bin.sample_size > 0 {
            bin.predicted_avg = sum / bin.sample_size as f64;
            bin.actual_rate = bin.wins as f64 / bin.sample_size as f64;
        }
        bin.verdict = verdict_for(bin.sample_size, bin.predicted_avg, bin.actual_rate);
    }
    bins
}

fn mine_patterns(samples: &[&Selection], min_count: usize) -> Vec<Pattern> {
    let mut counts: BTreeMap<(PatternDimension, String), usize> = BTreeMap::new();
    for s in samples {
        if let Some(trainer) = s.trainer.as_deref().filter(|t| !t.trim().is_empty()) {
            *counts.entry((PatternDimension::Trainer, trainer.to_string())).or_insert(0) += 1;
        }
        *counts.entry((PatternDimension::Course, s.course.clone())).or_insert(0) += 1;
        if let Some(odds) = s.effective_odds() {
            *counts
                .entry((PatternDimension::OddsBand, odds_band(odds).to_string()))
                .or_insert(0) += 1;
        }
        for tag in &s.tags {
            *counts.entry((PatternDimension::Tag, tag.clone())).or_insert(0) += 1;
        }
    }

    let mut patterns: Vec<Pattern> = counts
        .into_iter()
        .filter(|(_, count)| *count >= min_count)
        .map(|((dimension, value), count)| Pattern {
            dimension,
            value,
            count,
        })
        .collect();
    patterns.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then(a.dimension.cmp(&b.dimension))
            .then(a.value.cmp(&b.value))
    });
    patterns
}

fn recommendations(
    failure_patterns: &[Pattern],
    success_patterns: &[Pattern],
    successes: &[&Selection],
) -> Vec<Recommendation> {
    let mut recs = Vec::new();

    for p in failure_patterns {
        let (kind, action) = match p.dimension {
            PatternDimension::Trainer => (
                RecommendationKind::TrainerIssue,
                format!("Reduce confidence for trainer {} by 20%", p.value),
            ),
            PatternDimension::Course => (
                RecommendationKind::CourseIssue,
                format!("Review course-specific factors at {}", p.value),
            ),
            PatternDimension::Tag => (
                RecommendationKind::TagFailing,
                format!("Reduce confidence boost for '{}' tag", p.value),
            ),
            PatternDimension::OddsBand => continue,
        };
        recs.push(Recommendation {
            kind,
            subject: Some(p.value.clone()),
            count: p.count,
            action,
            reason: format!("{} high-confidence losses", p.count),
        });
    }

    for p in success_patterns {
        let (kind, action) = match p.dimension {
            PatternDimension::Trainer => (
                RecommendationKind::TrainerSuccess,
                format!("Maintain confidence for trainer {}", p.value),
            ),
            PatternDimension::Course => (
                RecommendationKind::CourseSuccess,
                format!("Track trainer and jockey patterns at {}", p.value),
            ),
            PatternDimension::Tag => (
                RecommendationKind::TagWorking,
                format!("Reinforce '{}' tag", p.value),
            ),
            PatternDimension::OddsBand => continue,
        };
        recs.push(Recommendation {
            kind,
            subject: Some(p.value.clone()),
            count: p.count,
            action,
            reason: format!("{} confident wins", p.count),
        });
    }

    let sweet_spot_wins = successes
        .iter()
        .filter_map(|s| s.effective_odds())
        .filter(|odds| is_sweet_spot_band(odds_band(*odds)))
        .count();
    if !successes.is_empty() && sweet_spot_wins as f64 >= successes.len() as f64 * SWEET_SPOT_SHARE {
        recs.push(Recommendation {
            kind: RecommendationKind::SweetSpotConfirmed,
            subject: None,
            count: sweet_spot_wins,
            action: "Continue focusing on the 3.0-9.0 odds range".to_string(),
            reason: format!(
                "{}/{} confident wins in the sweet spot",
                sweet_spot_wins,
                successes.len()
            ),
        });
    }
    recs
}

fn priority_actions(ratio: Option<f64>, brier: Option<f64>, recs: &[Recommendation]) -> Vec<String> {
    let mut actions = Vec::new();

    if let Some(rec) = recs
        .iter()
        .find(|r| r.kind == RecommendationKind::SweetSpotConfirmed)
    {
        actions.push(rec.action.clone());
    }
    match ratio {
        Some(r) if r < RATIO_LOW => actions.push(format!(
            "Reduce overall confidence by {:.0}%",
            (1.0 - r) * 100.0
        )),
        Some(r) if r > RATIO_HIGH => {
            actions.push("Increase overall confidence by 10-15%".to_string())
        }
        _ => {}
    }
    if brier.is_some_and(|b| b >= POOR_BRIER) {
        actions.push("Review selection criteria: focus on proven winners in the sweet spot".to_string());
    }

    let issues = recs.iter().filter(|r| {
        matches!(
            r.kind,
            RecommendationKind::TrainerIssue
                | RecommendationKind::CourseIssue
                | RecommendationKind::TagFailing
        )
    });
    actions.extend(issues.take(3).map(|r| r.action.clone()));
    actions.truncate(MAX_PRIORITY_ACTIONS);
    actions
}

/// Build a report from settled selections. Pending and void rows are ignored.
pub fn build_report(
    selections: &[Selection],
    window_days: i64,
    from_date: NaiveDate,
    to_date: NaiveDate,
    now: DateTime<Utc>,
) -> CalibrationReport {
    let samples: Vec<&Selection> = selections
        .iter()
        .filter(|s| s.outcome.is_resolved())
        .collect();

    let wins = samples.iter().filter(|s| s.is_win()).count();
    let expected_wins: f64 = samples.iter().map(|s| s.probability()).sum();
    let ratio = (expected_wins > 0.0).then(|| wins as f64 / expected_wins);
    let brier_score = (!samples.is_empty()).then(|| {
        samples
            .iter()
            .map(|s| {
                let outcome = if s.is_win() { 1.0 } else { 0.0 };
                (s.probability() - outcome).powi(2)
            })
            .sum::<f64>()
            / samples.len() as f64
    });

    let status = match ratio {
        None => Verdict::InsufficientData,
        Some(r) if r < RATIO_LOW => Verdict::Overconfident,
        Some(r) if r > RATIO_HIGH => Verdict::Underconfident,
        Some(_) => Verdict::Calibrated,
    };

    let failures: Vec<&Selection> = samples
        .iter()
        .filter(|s| !s.is_win() && s.probability() >= FAILURE_MIN_PROBABILITY)
        .copied()
        .collect();
    let successes: Vec<&Selection> = samples
        .iter()
        .filter(|s| s.is_win() && s.probability() >= SUCCESS_MIN_PROBABILITY)
        .copied()
        .collect();

    let failure_patterns = mine_patterns(&failures, MIN_FAILURES);
    let success_patterns = mine_patterns(&successes, MIN_SUCCESSES);
    let recommendations = recommendations(&failure_patterns, &success_patterns, &successes);
    let priority_actions = priority_actions(ratio, brier_score, &recommendations);

    let mut report = CalibrationReport {
        generated_at: now,
        window_days,
        from_date,
        to_date,
        sample_size: samples.len(),
        wins,
        expected_wins,
        ratio,
        brier_score,
        status,
        bins: build_bins(&samples),
        failure_patterns,
        success_patterns,
        recommendations,
        priority_actions,
        fingerprint: String::new(),
    };
    report.fingerprint = report.compute_fingerprint();
    report
}

/// Calibrate over the last `window_days` race days of settled selections,
/// today included.
pub fn calibrate(
    store: &dyn SelectionStore,
    window_days: i64,
    now: DateTime<Utc>,
) -> StoreResult<CalibrationReport> {
    let to_date = now.date_naive();
    let from_date = to_date - Duration::days((window_days - 1).max(0));
    let selections = store.scan_selections(&ScanFilter::selections().settled().between(from_date, to_date))?;

    let report = build_report(&selections, window_days, from_date, to_date, now);
    info!(
        "Calibration over {} samples ({} to {}): status {}, ratio {:?}, brier {:?}",
        report.sample_size,
        from_date,
        to_date,
        report.status.as_str(),
        report.ratio,
        report.brier_score
    );
    Ok(report)
}

/// Print a calibration report as a table.
pub fn print_report_table(report: &CalibrationReport) {
    println!("=== Calibration Report ===");
    println!();
    println!("Window:        {} to {}", report.from_date, report.to_date);
    println!("Samples:       {}", report.sample_size);
    println!("Wins:          {}", report.wins);
    println!("Expected wins: {:.2}", report.expected_wins);
    match report.ratio {
        Some(r) => println!("Ratio:         {:.3} ({})", r, report.status.as_str()),
        None => println!("Ratio:         n/a ({})", report.status.as_str()),
    }
    if let Some(brier) = report.brier_score {
        println!("Brier score:   {:.4}", brier);
    }
    println!();

    println!(
        "  {:10} {:>8} {:>10} {:>10}  {}",
        "Bin", "Samples", "Predicted", "Actual", "Verdict"
    );
    println!("  {}", "-".repeat(58));
    for bin in &report.bins {
        println!(
            "  {:10} {:>8} {:>9.1}% {:>9.1}%  {}",
            bin.label(),
            bin.sample_size,
            bin.predicted_avg * 100.0,
            bin.actual_rate * 100.0,
            bin.verdict.as_str()
        );
    }

    if !report.priority_actions.is_empty() {
        println!();
        println!("Priority actions:");
        for (i, action) in report.priority_actions.iter().enumerate() {
            println!("  {}. {}", i + 1, action);
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::store::records::fixtures::selection;
    use crate::types::Outcome;

    /// Settled selections with a fixed score: `wins` winners out of `n`.
    pub fn settled(n: usize, wins: usize, score: f64, date: NaiveDate) -> Vec<Selection> {
        (0..n)
            .map(|i| {
                let mut s = selection(date, "Kempton", &format!("Horse {}", i), &format!("1.{}", i));
                s.score = score;
                s.raw_score = score;
                s.outcome = if i < wins { Outcome::Win } else { Outcome::Loss };
                s.score_breakdown = BTreeMap::from([
                    (Factor::SweetSpot, 30.0),
                    (Factor::RecentWin, 25.0),
                    (Factor::TrainerReputation, 15.0),
                    (Factor::Consistency, 2.0),
                    (Factor::NoviceRacePenalty, -25.0),
                ]);
                s
            })
            .collect()
    }
}
