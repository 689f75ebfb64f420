//! Fairness and comparative statistics over a batch of grade scores.
//!
//! Everything here is request scoped: a report describes the slice it was
//! computed from and nothing is cached between batches.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Recommendations attached to every fairness report.
pub const FAIRNESS_RECOMMENDATIONS: [&str; 3] = [
    "Use consistent rubric application",
    "Grade anonymously if possible",
    "Review outlier scores",
];

/// A potential grading-bias signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasFlag {
    InsufficientData,
    HighScoreVariance,
    ScoreClustering,
}

impl fmt::Display for BiasFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BiasFlag::InsufficientData => write!(f, "insufficient data"),
            BiasFlag::HighScoreVariance => write!(f, "high score variance"),
            BiasFlag::ScoreClustering => {
                write!(f, "score clustering - may need finer grading scale")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairnessReport {
    pub sample_size: usize,
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    pub coefficient_of_variation: f64,
    /// 0 to 1, higher is more consistent.
    pub fairness_score: f64,
    /// Lowest and highest score; `None` for an empty batch.
    pub range: Option<(f64, f64)>,
    pub potential_bias_flags: Vec<BiasFlag>,
    pub recommendations: Vec<String>,
}

fn mean(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

fn range(scores: &[f64]) -> Option<(f64, f64)> {
    let min = scores.iter().copied().reduce(f64::min)?;
    let max = scores.iter().copied().reduce(f64::max)?;
    Some((min, max))
}

/// Dispersion statistics for a batch of scores.
pub fn fairness(scores: &[f64]) -> FairnessReport {
    let recommendations = FAIRNESS_RECOMMENDATIONS.iter().map(|s| s.to_string()).collect();
    let mean = mean(scores);

    if scores.len() < 2 {
        return FairnessReport {
            sample_size: scores.len(),
            mean,
            std_dev: 0.0,
            coefficient_of_variation: 0.0,
            fairness_score: 1.0,
            range: range(scores),
            potential_bias_flags: vec![BiasFlag::InsufficientData],
            recommendations,
        };
    }

    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / scores.len() as f64;
    let std_dev = variance.sqrt();
    let cv = if mean > 0.0 { std_dev / mean } else { 0.0 };
    let fairness_score = (1.0 - cv.min(1.0)).max(0.0);

    let mut flags = Vec::new();
    if std_dev > 0.5 * mean {
        flags.push(BiasFlag::HighScoreVariance);
    }
    let distinct: BTreeSet<i64> = scores.iter().map(|s| s.round() as i64).collect();
    if distinct.len() < 3 {
        flags.push(BiasFlag::ScoreClustering);
    }

    FairnessReport {
        sample_size: scores.len(),
        mean,
        std_dev,
        coefficient_of_variation: cv,
        fairness_score,
        range: range(scores),
        potential_bias_flags: flags,
        recommendations,
    }
}

/// Band of a score's distance from the batch mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelativePerformance {
    SignificantlyAboveAverage,
    AboveAverage,
    Average,
    BelowAverage,
    SignificantlyBelowAverage,
}

impl RelativePerformance {
    /// Bands on `(score - mean) / mean * 100`. A zero mean counts as average.
    pub fn from_scores(score: f64, mean: f64) -> Self {
        let diff_percent = if mean > 0.0 {
            (score - mean) / mean * 100.0
        } else {
            0.0
        };
        if diff_percent > 20.0 {
            RelativePerformance::SignificantlyAboveAverage
        } else if diff_percent > 10.0 {
            RelativePerformance::AboveAverage
        } else if diff_percent > -10.0 {
            RelativePerformance::Average
        } else if diff_percent > -20.0 {
            RelativePerformance::BelowAverage
        } else {
            RelativePerformance::SignificantlyBelowAverage
        }
    }
}

impl fmt::Display for RelativePerformance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RelativePerformance::SignificantlyAboveAverage => "Significantly above average",
            RelativePerformance::AboveAverage => "Above average",
            RelativePerformance::Average => "Average",
            RelativePerformance::BelowAverage => "Below average",
            RelativePerformance::SignificantlyBelowAverage => "Significantly below average",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreVsAverage {
    Above,
    At,
    Below,
}

/// One submission's position within its batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparativeStanding {
    /// Share of the batch scoring strictly lower, times 100.
    pub percentile: f64,
    /// 1 + number of strictly greater scores. Ties share a rank.
    pub rank: usize,
    pub relative_performance: RelativePerformance,
    pub score_vs_average: ScoreVsAverage,
    /// Absolute distance from the batch mean.
    pub average_difference: f64,
}

/// Rank every submission in the batch against the others.
///
/// Standings come back in input order, one per entry, so repeated ids
/// keep their own standing.
pub fn compare(scores: &[(String, f64)]) -> Vec<(String, ComparativeStanding)> {
    let values: Vec<f64> = scores.iter().map(|(_, s)| *s).collect();
    let avg = mean(&values);
    let n = values.len() as f64;

    scores
        .iter()
        .map(|(id, score)| {
            let below = values.iter().filter(|s| *s < score).count();
            let above = values.iter().filter(|s| *s > score).count();
            let score_vs_average = if *score > avg {
                ScoreVsAverage::Above
            } else if *score < avg {
                ScoreVsAverage::Below
            } else {
                ScoreVsAverage::At
            };
            let standing = ComparativeStanding {
                percentile: below as f64 / n * 100.0,
                rank: above + 1,
                relative_performance: RelativePerformance::from_scores(*score, avg),
                score_vs_average,
                average_difference: (score - avg).abs(),
            };
            (id.clone(), standing)
        })
        .collect()
}
