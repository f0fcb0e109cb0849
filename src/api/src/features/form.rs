//! Weighted form analysis.
//!
//! A form string is read recent-first: digits are finishing positions (`0` is
//! tenth or worse), `P`/`F`/`U` are non-completions, `-` and `/` separate
//! seasons and are skipped.

use serde::{Deserialize, Serialize};

/// Weights for the last three runs, most recent first.
const RUN_WEIGHTS: [f64; 3] = [0.50, 0.30, 0.20];

/// One run parsed from a form string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Run {
    /// Finishing position 1-9, or 0 for tenth or worse.
    Position(u8),
    /// Pulled up, fell or unseated.
    NonCompletion(char),
    /// Any other code (refused, brought down, ...).
    Other(char),
}

impl Run {
    fn parse(c: char) -> Option<Self> {
        match c {
            '-' | '/' => None,
            d if d.is_ascii_digit() => Some(Run::Position(d as u8 - b'0')),
            c if c.is_ascii_alphabetic() => {
                let upper = c.to_ascii_uppercase();
                if matches!(upper, 'P' | 'F' | 'U') {
                    Some(Run::NonCompletion(upper))
                } else {
                    Some(Run::Other(upper))
                }
            }
            _ => None,
        }
    }

    /// Points awarded to this run before weighting.
    pub fn score(&self) -> f64 {
        match self {
            Run::Position(1) => 100.0,
            Run::Position(2) => 60.0,
            Run::Position(3) => 40.0,
            Run::Position(4) => 20.0,
            Run::Position(5) => 10.0,
            Run::Position(6) => 5.0,
            Run::Position(7) => -10.0,
            Run::Position(8) => -15.0,
            Run::Position(9) => -20.0,
            Run::Position(_) => -30.0,
            Run::NonCompletion(_) => -40.0,
            Run::Other(_) => 0.0,
        }
    }

    pub fn is_win(&self) -> bool {
        matches!(self, Run::Position(1))
    }

    /// Finished first, second or third.
    pub fn is_good(&self) -> bool {
        matches!(self, Run::Position(1..=3))
    }

    /// Fifth or worse, counting tenth-or-worse.
    pub fn is_poor(&self) -> bool {
        matches!(self, Run::Position(0) | Run::Position(5..=9))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Consistency {
    Good,
    Moderate,
    Poor,
}

/// Result of `analyze_form`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormAnalysis {
    pub runs: Vec<Run>,
    /// Weighted score over the last three runs, in [-40, 100].
    pub weighted_score: f64,
    pub lto_winner: bool,
    /// Wins among the last three runs.
    pub recent_wins: u32,
    /// Wins anywhere in the form string.
    pub wins: u32,
    /// Seconds and thirds anywhere in the form string.
    pub places: u32,
    pub consistency: Consistency,
    pub details: Vec<String>,
}

impl FormAnalysis {
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Finished second at least once.
    pub fn has_second(&self) -> bool {
        self.runs.contains(&Run::Position(2))
    }

    /// Last three runs read (good, poor, good).
    pub fn is_bounce_back(&self) -> bool {
        matches!(
            self.runs.as_slice(),
            [a, b, c, ..] if a.is_good() && b.is_poor() && c.is_good()
        )
    }
}

/// Parse a form string into runs, most recent first.
pub fn parse_form(form: &str) -> Vec<Run> {
    form.chars().filter_map(Run::parse).collect()
}

/// Analyze a form string with heavy weighting on recent runs.
pub fn analyze_form(form: &str) -> FormAnalysis {
    let runs = parse_form(form);

    let mut weighted_score = 0.0;
    let mut details = Vec::new();
    for (run, weight) in runs.iter().zip(RUN_WEIGHTS) {
        let contribution = run.score() * weight;
        weighted_score += contribution;
        details.push(format!(
            "{:?} scored {} x {:.2} = {:.1}",
            run,
            run.score(),
            weight,
            contribution
        ));
    }

    let recent = &runs[..runs.len().min(3)];
    let recent_wins = recent.iter().filter(|r| r.is_win()).count() as u32;
    let recent_places = recent.iter().filter(|r| r.is_good()).count();
    let consistency = match recent_places {
        n if n >= 2 => Consistency::Good,
        1 => Consistency::Moderate,
        _ => Consistency::Poor,
    };

    let wins = runs.iter().filter(|r| r.is_win()).count() as u32;
    let places = runs
        .iter()
        .filter(|r| matches!(r, Run::Position(2) | Run::Position(3)))
        .count() as u32;

    FormAnalysis {
        lto_winner: runs.first().is_some_and(Run::is_win),
        runs,
        weighted_score,
        recent_wins,
        wins,
        places,
        consistency,
        details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_win() {
        let analysis = analyze_form("1");
        assert_eq!(analysis.weighted_score, 50.0);
        assert!(analysis.lto_winner);
        assert_eq!(analysis.recent_wins, 1);
        assert_eq!(analysis.consistency, Consistency::Moderate);
    }

    #[test]
    fn test_separators_skipped() {
        let analysis = analyze_form("1-2-1");
        assert_eq!(
            analysis.runs,
            vec![Run::Position(1), Run::Position(2), Run::Position(1)]
        );
        // 100*0.5 + 60*0.3 + 100*0.2
        assert!((analysis.weighted_score - 88.0).abs() < 1e-9);
        assert_eq!(analysis.wins, 2);
        assert_eq!(analysis.places, 1);
        assert_eq!(analysis.consistency, Consistency::Good);
    }

    #[test]
    fn test_only_last_three_weighted() {
        let analysis = analyze_form("0P/F111");
        // -30*0.5 + -40*0.3 + -40*0.2
        assert!((analysis.weighted_score - -35.0).abs() < 1e-9);
        assert_eq!(analysis.recent_wins, 0);
        assert_eq!(analysis.wins, 3);
        assert_eq!(analysis.consistency, Consistency::Poor);
        assert!(!analysis.lto_winner);
    }

    #[test]
    fn test_weighted_score_bounds() {
        assert_eq!(analyze_form("111").weighted_score, 100.0);
        assert!((analyze_form("PPP").weighted_score - -40.0).abs() < 1e-9);
        assert_eq!(analyze_form("").weighted_score, 0.0);
    }

    #[test]
    fn test_bounce_back() {
        assert!(analyze_form("271").is_bounce_back());
        assert!(analyze_form("1-0-3").is_bounce_back());
        assert!(!analyze_form("241").is_bounce_back());
        assert!(!analyze_form("2P1").is_bounce_back());
        assert!(!analyze_form("27").is_bounce_back());
    }

    #[test]
    fn test_lowercase_codes() {
        let runs = parse_form("pf-u");
        assert_eq!(
            runs,
            vec![
                Run::NonCompletion('P'),
                Run::NonCompletion('F'),
                Run::NonCompletion('U')
            ]
        );
    }
}
