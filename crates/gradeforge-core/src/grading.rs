//! Grading and scoring engine.
//!
//! `grade` walks the same tier ladder as generation: schema-guided grading
//! prompt, strict JSON-only prompt, freeform prompt read by the score
//! heuristic, then a manual-review placeholder. Only configuration errors
//! escape; every other failure ends in a deterministic [`GradeResult`].

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::error::{BackendError, ConfigurationError, ParseError, TierFailure};
use crate::model::Tier;
use crate::orchestrator::{invoke_backend, OrchestratorConfig};
use crate::parser::SchemaParser;
use crate::prompts::{
    critical_thinking_prompt, detailed_feedback_prompt, grading_prompt, improvements_prompt,
    personalized_feedback_prompt, quality_prompt,
};
use crate::records::{lenient, Assignment, LetterGrade, Rubric};
use crate::rubric::build_rubric;
use crate::statistics::{compare, fairness, ComparativeStanding, FairnessReport};
use crate::traits::TextBackend;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GradingConfig {
    /// Share of `max_score` given by the manual-review placeholder (0 to 1).
    pub fallback_fraction: f64,
    /// Share of `max_score` used by the text heuristic when no `a/b` score is found.
    pub heuristic_fraction: f64,
    /// Maximum concurrent gradings in a batch.
    pub parallelism: usize,
    /// Submission characters included in prompts.
    pub submission_excerpt_chars: usize,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            fallback_fraction: 0.0,
            heuristic_fraction: 0.7,
            parallelism: 4,
            submission_excerpt_chars: 2000,
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub criterion: String,
    pub score: f64,
    pub max_score: f64,
}

/// Descriptive band for a percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PerformanceLevel {
    Excellent,
    Good,
    Satisfactory,
    #[serde(rename = "Needs Improvement")]
    NeedsImprovement,
    Unsatisfactory,
}

impl PerformanceLevel {
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= 90.0 {
            PerformanceLevel::Excellent
        } else if percentage >= 80.0 {
            PerformanceLevel::Good
        } else if percentage >= 70.0 {
            PerformanceLevel::Satisfactory
        } else if percentage >= 60.0 {
            PerformanceLevel::NeedsImprovement
        } else {
            PerformanceLevel::Unsatisfactory
        }
    }
}

impl fmt::Display for PerformanceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PerformanceLevel::Excellent => "Excellent",
            PerformanceLevel::Good => "Good",
            PerformanceLevel::Satisfactory => "Satisfactory",
            PerformanceLevel::NeedsImprovement => "Needs Improvement",
            PerformanceLevel::Unsatisfactory => "Unsatisfactory",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub raw_score: f64,
    pub max_score: f64,
    /// Rounded to two decimals.
    pub percentage: f64,
    pub letter_grade: LetterGrade,
    pub performance_level: PerformanceLevel,
}

impl ScoreBreakdown {
    pub fn new(score: f64, max_score: f64) -> Self {
        let max_score = positive_max(max_score);
        let percentage = score / max_score * 100.0;
        Self {
            raw_score: score,
            max_score,
            percentage: (percentage * 100.0).round() / 100.0,
            letter_grade: LetterGrade::from_percentage(percentage),
            performance_level: PerformanceLevel::from_percentage(percentage),
        }
    }
}

/// Fields handed to the persistence collaborator for a graded submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionUpdate {
    pub score: f64,
    pub feedback: String,
    pub is_graded: bool,
    pub graded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeResult {
    /// Always within `[0, max_score]`.
    pub score: f64,
    pub max_score: f64,
    pub letter_grade: LetterGrade,
    pub feedback: String,
    pub ai_feedback: String,
    pub breakdown: Vec<CriterionScore>,
    pub strengths: Vec<String>,
    pub areas_of_improvement: Vec<String>,
    pub needs_manual_review: bool,
    /// Ladder tier that produced this result.
    pub source: Tier,
    pub graded_at: DateTime<Utc>,
}

impl GradeResult {
    fn scored(score: f64, max_score: f64, source: Tier) -> Self {
        let max_score = positive_max(max_score);
        let score = clamp_score(score, max_score);
        Self {
            score,
            max_score,
            letter_grade: LetterGrade::from_percentage(score / max_score * 100.0),
            feedback: String::new(),
            ai_feedback: String::new(),
            breakdown: Vec::new(),
            strengths: Vec::new(),
            areas_of_improvement: Vec::new(),
            needs_manual_review: false,
            source,
            graded_at: Utc::now(),
        }
    }

    /// Placeholder returned when every grading tier failed.
    pub fn manual_review(max_score: f64, fallback_fraction: f64) -> Self {
        let max_score = positive_max(max_score);
        let fraction = if fallback_fraction.is_finite() {
            fallback_fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            letter_grade: LetterGrade::NotAvailable,
            feedback: "Unable to grade automatically. Manual review required.".into(),
            ai_feedback: "Grading system encountered an error.".into(),
            needs_manual_review: true,
            ..Self::scored(fraction * max_score, max_score, Tier::StaticFallback)
        }
    }

    pub fn percentage(&self) -> f64 {
        self.score / self.max_score * 100.0
    }

    /// A placeholder keeps its N/A letter.
    pub fn score_breakdown(&self) -> ScoreBreakdown {
        let mut breakdown = ScoreBreakdown::new(self.score, self.max_score);
        if self.needs_manual_review {
            breakdown.letter_grade = self.letter_grade;
        }
        breakdown
    }

    /// A placeholder result is not marked graded.
    pub fn submission_update(&self) -> SubmissionUpdate {
        SubmissionUpdate {
            score: self.score,
            feedback: self.feedback.clone(),
            is_graded: !self.needs_manual_review,
            graded_at: self.graded_at,
        }
    }
}

fn positive_max(max_score: f64) -> f64 {
    if max_score.is_finite() && max_score > 0.0 {
        max_score
    } else {
        100.0
    }
}

fn clamp_score(score: f64, max_score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, max_score)
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------------
// Response decoding
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GradingPayload {
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    overall_score: Option<f64>,
    #[serde(default, deserialize_with = "breakdown_entries")]
    breakdown: Vec<BreakdownEntry>,
    #[serde(default, deserialize_with = "lenient::string_vec")]
    strengths: Vec<String>,
    #[serde(
        default,
        alias = "areas_for_improvement",
        deserialize_with = "lenient::string_vec"
    )]
    areas_of_improvement: Vec<String>,
    #[serde(default, alias = "detailed_feedback", deserialize_with = "lenient::string")]
    feedback: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    ai_feedback: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BreakdownEntry {
    #[serde(alias = "name", deserialize_with = "lenient::string")]
    criterion: String,
    #[serde(default, deserialize_with = "lenient::f64")]
    score: f64,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    max_score: Option<f64>,
}

fn breakdown_entries<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<BreakdownEntry>, D::Error> {
    match Value::deserialize(d)? {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect()),
        _ => Ok(Vec::new()),
    }
}

/// Hoist a grading object wrapped under an envelope key.
fn unwrap_grading_envelope(value: Value, envelope_keys: &[String]) -> Value {
    let Value::Object(mut map) = value else {
        return value;
    };
    if !map.contains_key("overall_score") {
        let wrapped = envelope_keys
            .iter()
            .find(|key| matches!(map.get(key.as_str()), Some(Value::Object(_))));
        if let Some(Value::Object(inner)) = wrapped.and_then(|key| map.remove(key.as_str())) {
            for (k, v) in inner {
                map.entry(k).or_insert(v);
            }
        }
    }
    Value::Object(map)
}

fn grade_from_json(
    raw: &str,
    rubric: &Rubric,
    tier: Tier,
    envelope_keys: &[String],
) -> Result<GradeResult, ParseError> {
    let value = unwrap_grading_envelope(SchemaParser::parse_value(raw)?, envelope_keys);
    let payload: GradingPayload =
        serde_json::from_value(value).map_err(|e| ParseError::GradingMismatch(e.to_string()))?;
    let Some(overall) = payload.overall_score else {
        return Err(ParseError::GradingMismatch(
            "missing numeric overall_score".into(),
        ));
    };

    let mut result = GradeResult::scored(overall, rubric.max_score, tier);
    result.breakdown = payload
        .breakdown
        .into_iter()
        .filter(|entry| !entry.criterion.trim().is_empty())
        .map(|entry| {
            let criterion = entry.criterion.trim().to_string();
            let max_score = entry
                .max_score
                .filter(|m| m.is_finite() && *m > 0.0)
                .or_else(|| {
                    rubric
                        .criteria
                        .iter()
                        .find(|c| c.name == criterion)
                        .map(|c| c.weight / 100.0 * rubric.max_score)
                })
                .unwrap_or(result.max_score);
            CriterionScore {
                score: clamp_score(entry.score, max_score),
                criterion,
                max_score,
            }
        })
        .collect();
    result.strengths = payload.strengths;
    result.areas_of_improvement = payload.areas_of_improvement;
    result.feedback = if payload.feedback.trim().is_empty() {
        "Graded automatically.".into()
    } else {
        payload.feedback.trim().to_string()
    };
    result.ai_feedback = payload
        .ai_feedback
        .unwrap_or_else(|| "AI grading completed.".into());
    Ok(result)
}

fn fraction_pattern() -> &'static Regex {
    static FRACTION: OnceLock<Regex> = OnceLock::new();
    FRACTION.get_or_init(|| {
        Regex::new(r"(\d+(?:\.\d+)?)\s*/\s*(\d+(?:\.\d+)?)").expect("fraction pattern is valid")
    })
}

/// Score freeform grading text.
///
/// The numerator of the first `a/b` fraction is taken as the score on the
/// `max_score` scale; the denominator is not used. Without a fraction the
/// score is `fallback_fraction * max_score`. Clamped to `[0, max_score]`.
pub fn heuristic_score(text: &str, max_score: f64, fallback_fraction: f64) -> f64 {
    let max_score = positive_max(max_score);
    let parsed = fraction_pattern()
        .captures(text)
        .and_then(|caps| caps.get(1)?.as_str().parse::<f64>().ok());
    clamp_score(parsed.unwrap_or(fallback_fraction * max_score), max_score)
}

fn grade_from_text(
    raw: &str,
    max_score: f64,
    heuristic_fraction: f64,
) -> Result<GradeResult, ParseError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(ParseError::NoStructuredData);
    }
    let score = heuristic_score(text, max_score, heuristic_fraction);
    let mut result = GradeResult::scored(score, max_score, Tier::HeuristicText);
    result.feedback = text.to_string();
    result.ai_feedback = "Automatically graded with fallback method.".into();
    result.breakdown = vec![CriterionScore {
        criterion: "Overall".into(),
        score: result.score,
        max_score: result.max_score,
    }];
    result.areas_of_improvement = vec!["Review assignment guidelines".into()];
    result.strengths = vec!["Submission completed".into()];
    Ok(result)
}

/// Split a backend error into a recoverable tier failure or a fatal one.
fn recoverable(error: BackendError) -> Result<TierFailure, ConfigurationError> {
    let failure = TierFailure::from(error);
    match failure.as_configuration_error() {
        Some(fatal) => Err(fatal),
        None => Ok(failure),
    }
}

// ---------------------------------------------------------------------------
// Comprehensive grading
// ---------------------------------------------------------------------------

/// Quality categories, in reporting order.
pub const QUALITY_CATEGORIES: [&str; 5] =
    ["completeness", "relevance", "depth", "originality", "structure"];

pub const BASIC_WEIGHT: f64 = 0.4;
pub const QUALITY_WEIGHT: f64 = 0.3;
pub const CRITICAL_THINKING_WEIGHT: f64 = 0.3;

/// Weighted 0-100 composite of a basic score and two 0-10 sub-scores.
/// The basic score is capped at 100. Rounded to one decimal.
pub fn composite_score(basic: f64, quality: f64, critical_thinking: f64) -> f64 {
    let composite = BASIC_WEIGHT * basic.min(100.0)
        + QUALITY_WEIGHT * quality * 10.0
        + CRITICAL_THINKING_WEIGHT * critical_thinking * 10.0;
    (composite * 10.0).round() / 10.0
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LearningInsights {
    pub strength_areas: Vec<String>,
    pub growth_areas: Vec<String>,
    pub learning_style_indicators: Vec<String>,
    pub recommended_resources: Vec<String>,
}

impl LearningInsights {
    pub fn derive(quality_breakdown: &BTreeMap<String, f64>, critical_thinking: f64) -> Self {
        let mut insights = Self::default();
        for category in QUALITY_CATEGORIES {
            match quality_breakdown.get(category) {
                Some(score) if *score >= 8.0 => insights.strength_areas.push(category.into()),
                Some(score) if *score <= 6.0 => insights.growth_areas.push(category.into()),
                _ => {}
            }
        }
        insights.learning_style_indicators.push(if critical_thinking >= 8.0 {
            "Analytical thinker".into()
        } else {
            "Benefit from structured frameworks".into()
        });
        if insights.growth_areas.iter().any(|a| a == "depth") {
            insights
                .recommended_resources
                .push("Deep analysis techniques guide".into());
        }
        if insights.growth_areas.iter().any(|a| a == "originality") {
            insights
                .recommended_resources
                .push("Developing original arguments workshop".into());
        }
        insights
    }
}

/// Improvement suggestions bucketed by position.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PriorityLevels {
    pub high: Vec<String>,
    pub medium: Vec<String>,
    pub low: Vec<String>,
}

impl PriorityLevels {
    /// The first three suggestions are high priority, the next three medium,
    /// the rest low.
    pub fn assign(suggestions: &[String]) -> Self {
        let mut levels = Self::default();
        for (i, suggestion) in suggestions.iter().enumerate() {
            let bucket = match i {
                0..=2 => &mut levels.high,
                3..=5 => &mut levels.medium,
                _ => &mut levels.low,
            };
            bucket.push(suggestion.clone());
        }
        levels
    }
}

/// Suggestions kept from a backend answer.
pub const MAX_SUGGESTIONS: usize = 10;
/// Lines this short are headings or filler, not suggestions.
const MIN_SUGGESTION_CHARS: usize = 20;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImprovementPlan {
    pub suggestions: Vec<String>,
    pub priority_levels: PriorityLevels,
}

impl ImprovementPlan {
    /// One suggestion per line longer than 20 characters, capped at
    /// [`MAX_SUGGESTIONS`].
    pub fn from_text(text: &str) -> Self {
        let suggestions: Vec<String> = text
            .lines()
            .filter(|line| !line.trim().is_empty() && line.chars().count() > MIN_SUGGESTION_CHARS)
            .map(|line| line.trim().to_string())
            .take(MAX_SUGGESTIONS)
            .collect();
        Self {
            priority_levels: PriorityLevels::assign(&suggestions),
            suggestions,
        }
    }
}

/// Stock phrases that often come from copied text.
pub const COMMON_PHRASES: [&str; 4] = [
    "in conclusion",
    "it is widely known that",
    "research has shown",
    "according to sources",
];

/// Scores above this deserve a manual look.
pub const PLAGIARISM_REVIEW_THRESHOLD: f64 = 0.3;

/// Deterministic copy-pattern screen. Not a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlagiarismCheck {
    /// 0.1 per warning.
    pub score: f64,
    pub warnings: Vec<String>,
    pub needs_review: bool,
}

/// Flag stock phrases and ragged line lengths in a submission.
pub fn detect_plagiarism_patterns(submission: &str) -> PlagiarismCheck {
    let lowered = submission.to_lowercase();
    let mut warnings: Vec<String> = COMMON_PHRASES
        .iter()
        .filter(|phrase| lowered.contains(*phrase))
        .map(|phrase| format!("Common phrase detected: '{phrase}'"))
        .collect();

    let line_lengths: HashSet<usize> = submission
        .split('\n')
        .map(|line| line.chars().count())
        .collect();
    if line_lengths.len() > 5 {
        warnings.push("Inconsistent formatting may indicate copying".into());
    }

    let score = warnings.len() as f64 / 10.0;
    PlagiarismCheck {
        score,
        needs_review: score > PLAGIARISM_REVIEW_THRESHOLD,
        warnings,
    }
}

/// Narrative feedback for a scored submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedFeedback {
    /// `None` when the backend gave no usable answer.
    pub detailed_feedback: Option<String>,
    pub score_breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComprehensiveGrade {
    pub basic: GradeResult,
    pub basic_score: f64,
    /// 0 to 10.
    pub quality_score: f64,
    pub quality_breakdown: BTreeMap<String, f64>,
    /// 0 to 10.
    pub critical_thinking_score: f64,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub composite_score: f64,
    pub learning_insights: LearningInsights,
    /// Freeform feedback built on the critical-thinking findings.
    pub personalized_feedback: Option<String>,
    /// Empty when the suggestion call failed.
    pub improvements: ImprovementPlan,
    pub plagiarism: PlagiarismCheck,
    /// Set when the basic grade or a scored sub-analysis fell back.
    pub needs_manual_review: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct QualityAnalysis {
    scores: BTreeMap<String, f64>,
    overall: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct CriticalThinking {
    score: f64,
    strengths: Vec<String>,
    weaknesses: Vec<String>,
}

fn ten_point(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    n.is_finite().then(|| n.clamp(0.0, 10.0))
}

fn parse_quality(raw: &str) -> Result<QualityAnalysis, ParseError> {
    let value = SchemaParser::parse_value(raw)?;
    let scores: BTreeMap<String, f64> = value
        .get("scores")
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| ten_point(v).map(|s| (k.to_lowercase(), s)))
                .collect()
        })
        .unwrap_or_default();
    let overall = value
        .get("overall_quality")
        .and_then(ten_point)
        .or_else(|| {
            (!scores.is_empty()).then(|| scores.values().sum::<f64>() / scores.len() as f64)
        })
        .ok_or_else(|| ParseError::GradingMismatch("missing overall_quality".into()))?;
    Ok(QualityAnalysis { scores, overall })
}

fn parse_critical_thinking(raw: &str) -> Result<CriticalThinking, ParseError> {
    let value = SchemaParser::parse_value(raw)?;
    let score = value
        .get("critical_thinking_score")
        .and_then(ten_point)
        .ok_or_else(|| ParseError::GradingMismatch("missing critical_thinking_score".into()))?;
    let texts = |key: &str| -> Vec<String> {
        value
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };
    Ok(CriticalThinking {
        score,
        strengths: texts("strengths"),
        weaknesses: texts("weaknesses"),
    })
}

fn parse_freeform(raw: &str) -> Result<String, ParseError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(ParseError::NoStructuredData);
    }
    Ok(text.to_string())
}

fn parse_improvements(raw: &str) -> Result<ImprovementPlan, ParseError> {
    Ok(ImprovementPlan::from_text(raw))
}

// ---------------------------------------------------------------------------
// Batch grading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSubmission {
    pub id: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub submission_id: String,
    pub grade: GradeResult,
    /// Present when the batch graded more than one submission.
    pub standing: Option<ComparativeStanding>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Graded submissions in input order.
    pub entries: Vec<BatchEntry>,
    /// Ids of submissions skipped for blank content.
    pub skipped: Vec<String>,
    pub fairness: FairnessReport,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct GradingEngine {
    backend: Arc<dyn TextBackend>,
    backend_config: OrchestratorConfig,
    config: GradingConfig,
}

impl GradingEngine {
    pub fn new(
        backend: Arc<dyn TextBackend>,
        backend_config: OrchestratorConfig,
        config: GradingConfig,
    ) -> Self {
        Self {
            backend,
            backend_config,
            config,
        }
    }

    pub fn config(&self) -> &GradingConfig {
        &self.config
    }

    /// Grade one submission against the assignment's rubric.
    #[tracing::instrument(skip_all, fields(assignment = %assignment.title))]
    pub async fn grade(
        &self,
        assignment: &Assignment,
        submission: &str,
    ) -> Result<GradeResult, ConfigurationError> {
        let rubric = build_rubric(assignment);

        for tier in Tier::LADDER {
            let Some(prompt) = grading_prompt(
                assignment,
                &rubric,
                submission,
                self.config.submission_excerpt_chars,
                tier,
            ) else {
                break;
            };

            let raw = match self.invoke(prompt).await {
                Ok(text) => text,
                Err(e) => {
                    let permanent = e.is_permanent();
                    let failure = recoverable(e)?;
                    tracing::warn!(%tier, "grading call failed: {failure}");
                    if permanent {
                        break;
                    }
                    continue;
                }
            };

            let parsed = match tier {
                Tier::HeuristicText => {
                    grade_from_text(&raw, rubric.max_score, self.config.heuristic_fraction)
                }
                _ => grade_from_json(&raw, &rubric, tier, &self.backend_config.envelope_keys),
            };
            match parsed {
                Ok(result) => {
                    tracing::info!(
                        %tier,
                        score = result.score,
                        max_score = result.max_score,
                        letter = %result.letter_grade,
                        "graded submission"
                    );
                    return Ok(result);
                }
                Err(e) => tracing::warn!(%tier, "unusable grading output: {e}"),
            }
        }

        tracing::warn!("all grading tiers failed, manual review required");
        Ok(GradeResult::manual_review(
            rubric.max_score,
            self.config.fallback_fraction,
        ))
    }

    async fn invoke(&self, prompt: String) -> Result<String, BackendError> {
        invoke_backend(self.backend.as_ref(), &self.backend_config, prompt).await
    }

    /// One backend call for a sub-analysis. Recoverable failures yield `None`.
    async fn analyze<T>(
        &self,
        label: &str,
        prompt: String,
        parse: fn(&str) -> Result<T, ParseError>,
    ) -> Result<Option<T>, ConfigurationError> {
        match self.invoke(prompt).await {
            Ok(raw) => match parse(&raw) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    tracing::warn!(analysis = label, "unusable analysis output: {e}");
                    Ok(None)
                }
            },
            Err(e) => {
                let failure = recoverable(e)?;
                tracing::warn!(analysis = label, "analysis call failed: {failure}");
                Ok(None)
            }
        }
    }

    /// Basic grade plus quality and critical-thinking sub-scores, improvement
    /// suggestions, personalized feedback and a copy-pattern screen.
    ///
    /// A failed scored sub-analysis contributes 0 and marks the grade for
    /// review. Failed suggestion or feedback calls leave those parts empty.
    #[tracing::instrument(skip_all, fields(assignment = %assignment.title))]
    pub async fn comprehensive_grade(
        &self,
        assignment: &Assignment,
        submission: &str,
    ) -> Result<ComprehensiveGrade, ConfigurationError> {
        let excerpt = self.config.submission_excerpt_chars;
        let rubric = build_rubric(assignment);
        let (basic, quality, critical, improvements) = tokio::join!(
            self.grade(assignment, submission),
            self.analyze(
                "quality",
                quality_prompt(assignment, submission, excerpt),
                parse_quality
            ),
            self.analyze(
                "critical_thinking",
                critical_thinking_prompt(assignment, submission, excerpt),
                parse_critical_thinking
            ),
            self.analyze(
                "improvements",
                improvements_prompt(&rubric, submission, excerpt),
                parse_improvements
            ),
        );
        let basic = basic?;
        let quality = quality?;
        let critical = critical?;
        let improvements = improvements?.unwrap_or_default();

        let needs_manual_review =
            basic.needs_manual_review || quality.is_none() || critical.is_none();
        let (quality_score, quality_breakdown) = quality
            .map(|q| (q.overall, q.scores))
            .unwrap_or_default();
        let (critical_thinking_score, strengths, weaknesses) = critical
            .map(|c| (c.score, c.strengths, c.weaknesses))
            .unwrap_or_default();

        let personalized_feedback = self
            .analyze(
                "personalized_feedback",
                personalized_feedback_prompt(submission, &strengths, &weaknesses, excerpt),
                parse_freeform,
            )
            .await?;
        let plagiarism = detect_plagiarism_patterns(submission);
        if plagiarism.needs_review {
            tracing::warn!(score = plagiarism.score, "submission matches copy patterns");
        }

        let composite = composite_score(basic.score, quality_score, critical_thinking_score);
        tracing::info!(composite, "comprehensive grade computed");

        Ok(ComprehensiveGrade {
            basic_score: basic.score,
            learning_insights: LearningInsights::derive(
                &quality_breakdown,
                critical_thinking_score,
            ),
            basic,
            quality_score,
            quality_breakdown,
            critical_thinking_score,
            strengths,
            weaknesses,
            composite_score: composite,
            personalized_feedback,
            improvements,
            plagiarism,
            needs_manual_review,
        })
    }

    /// Narrative feedback for a submission already scored at `score`.
    #[tracing::instrument(skip_all, fields(assignment = %assignment.title, score = score))]
    pub async fn generate_detailed_feedback(
        &self,
        assignment: &Assignment,
        submission: &str,
        score: f64,
    ) -> Result<DetailedFeedback, ConfigurationError> {
        let max_score = build_rubric(assignment).max_score;
        let prompt = detailed_feedback_prompt(
            assignment,
            submission,
            score,
            max_score,
            self.config.submission_excerpt_chars,
        );
        let detailed_feedback = self
            .analyze("detailed_feedback", prompt, parse_freeform)
            .await?;
        Ok(DetailedFeedback {
            detailed_feedback,
            score_breakdown: ScoreBreakdown::new(clamp_score(score, max_score), max_score),
        })
    }

    /// Grade a cohort concurrently, then compute standings and fairness.
    ///
    /// Blank submissions are skipped. Each grading is isolated by its own
    /// fallback, so one failure never blocks the rest.
    #[tracing::instrument(
        skip_all,
        fields(assignment = %assignment.title, submissions = submissions.len())
    )]
    pub async fn grade_batch(
        &self,
        assignment: &Assignment,
        submissions: &[BatchSubmission],
    ) -> Result<BatchReport, ConfigurationError> {
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
        let mut skipped = Vec::new();
        let mut futures = FuturesUnordered::new();

        for (index, submission) in submissions.iter().enumerate() {
            if submission.content.trim().is_empty() {
                tracing::debug!(submission = %submission.id, "skipping blank submission");
                skipped.push(submission.id.clone());
                continue;
            }
            let semaphore = Arc::clone(&semaphore);
            futures.push(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (index, self.grade(assignment, &submission.content).await)
            });
        }

        let mut graded: Vec<(usize, GradeResult)> = Vec::with_capacity(futures.len());
        while let Some((index, result)) = futures.next().await {
            graded.push((index, result?));
        }
        graded.sort_by_key(|(index, _)| *index);

        let scores: Vec<(String, f64)> = graded
            .iter()
            .map(|(index, grade)| (submissions[*index].id.clone(), grade.score))
            .collect();
        let values: Vec<f64> = scores.iter().map(|(_, s)| *s).collect();
        let standings: Vec<Option<ComparativeStanding>> = if scores.len() > 1 {
            compare(&scores)
                .into_iter()
                .map(|(_, standing)| Some(standing))
                .collect()
        } else {
            vec![None; scores.len()]
        };
        let fairness = fairness(&values);

        let entries = graded
            .into_iter()
            .zip(standings)
            .map(|((index, grade), standing)| BatchEntry {
                submission_id: submissions[index].id.clone(),
                grade,
                standing,
            })
            .collect();

        tracing::info!(
            fairness = fairness.fairness_score,
            skipped = skipped.len(),
            "batch graded"
        );
        Ok(BatchReport {
            entries,
            skipped,
            fairness,
        })
    }
}
