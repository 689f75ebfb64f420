//! Structured records produced by the generation ladder.
//!
//! Backend output is loosely typed: numbers arrive as strings, answers as
//! numbers, lists as objects. The `lenient` deserializers absorb those
//! variations so the schema check only fails on structurally wrong payloads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::ContentKind;

fn default_max_score() -> f64 {
    100.0
}

/// A generated question (assignment or test).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[serde(alias = "text", alias = "prompt", deserialize_with = "lenient::string")]
    pub question: String,
    #[serde(
        rename = "type",
        alias = "question_type",
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub question_type: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string_vec",
        skip_serializing_if = "Option::is_none"
    )]
    pub options: Option<Vec<String>>,
    #[serde(
        default,
        alias = "answer",
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub correct_answer: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub expected_answer: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub points: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub rubric: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub explanation: Option<String>,
}

impl Question {
    /// A question with only its text populated.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            question: text.into(),
            question_type: None,
            options: None,
            correct_answer: None,
            expected_answer: None,
            points: None,
            rubric: None,
            explanation: None,
        }
    }
}

/// An assignment. Also the input to rubric building and grading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub instructions: String,
    pub questions: Vec<Question>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub total_points: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_u32",
        skip_serializing_if = "Option::is_none"
    )]
    pub estimated_time: Option<u32>,
    #[serde(default, deserialize_with = "lenient::string_vec")]
    pub learning_objectives: Vec<String>,
    /// Maximum score for grading; must be positive.
    #[serde(default = "default_max_score")]
    pub max_score: f64,
}

impl Assignment {
    pub fn new(title: impl Into<String>, questions: Vec<Question>) -> Self {
        Self {
            id: None,
            title: title.into(),
            topic: None,
            description: String::new(),
            instructions: String::new(),
            questions,
            total_points: None,
            estimated_time: None,
            learning_objectives: Vec::new(),
            max_score: default_max_score(),
        }
    }
}

/// A generated test paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestPaper {
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub title: Option<String>,
    pub questions: Vec<Question>,
    #[serde(default, deserialize_with = "lenient::object")]
    pub answers: Map<String, Value>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_u32",
        skip_serializing_if = "Option::is_none"
    )]
    pub estimated_duration: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flashcard {
    #[serde(alias = "question", alias = "term", deserialize_with = "lenient::string")]
    pub front: String,
    #[serde(
        default,
        alias = "answer",
        alias = "definition",
        deserialize_with = "lenient::string"
    )]
    pub back: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub category: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub difficulty: String,
    #[serde(default, deserialize_with = "lenient::string_vec")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StudyPlan {
    #[serde(default, deserialize_with = "lenient::u32")]
    pub sessions: u32,
    #[serde(default, deserialize_with = "lenient::u32")]
    pub cards_per_session: u32,
    #[serde(default)]
    pub spaced_repetition: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlashcardSet {
    #[serde(default, deserialize_with = "lenient::string")]
    pub topic: String,
    pub flashcards: Vec<Flashcard>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub study_plan: Option<StudyPlan>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_u32",
        skip_serializing_if = "Option::is_none"
    )]
    pub estimated_study_time: Option<u32>,
}

/// Letter grade derived from a percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LetterGrade {
    A,
    B,
    C,
    D,
    F,
    #[serde(rename = "N/A")]
    NotAvailable,
}

impl LetterGrade {
    /// Fixed bands: A [90,100], B [80,90), C [70,80), D [60,70), F [0,60).
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= 90.0 {
            LetterGrade::A
        } else if percentage >= 80.0 {
            LetterGrade::B
        } else if percentage >= 70.0 {
            LetterGrade::C
        } else if percentage >= 60.0 {
            LetterGrade::D
        } else {
            LetterGrade::F
        }
    }
}

impl std::fmt::Display for LetterGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LetterGrade::A => write!(f, "A"),
            LetterGrade::B => write!(f, "B"),
            LetterGrade::C => write!(f, "C"),
            LetterGrade::D => write!(f, "D"),
            LetterGrade::F => write!(f, "F"),
            LetterGrade::NotAvailable => write!(f, "N/A"),
        }
    }
}

/// One row of the grading scale, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradeBand {
    pub letter: LetterGrade,
    pub min: f64,
    pub max: f64,
}

/// The fixed grading scale shared by every rubric.
pub fn standard_grading_scale() -> Vec<GradeBand> {
    vec![
        GradeBand { letter: LetterGrade::A, min: 90.0, max: 100.0 },
        GradeBand { letter: LetterGrade::B, min: 80.0, max: 90.0 },
        GradeBand { letter: LetterGrade::C, min: 70.0, max: 80.0 },
        GradeBand { letter: LetterGrade::D, min: 60.0, max: 70.0 },
        GradeBand { letter: LetterGrade::F, min: 0.0, max: 60.0 },
    ]
}

/// Descriptors for the four performance levels of a criterion.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceLevels {
    #[serde(
        rename = "Excellent",
        alias = "excellent",
        default,
        deserialize_with = "lenient::string"
    )]
    pub excellent: String,
    #[serde(rename = "Good", alias = "good", default, deserialize_with = "lenient::string")]
    pub good: String,
    #[serde(rename = "Fair", alias = "fair", default, deserialize_with = "lenient::string")]
    pub fair: String,
    #[serde(rename = "Poor", alias = "poor", default, deserialize_with = "lenient::string")]
    pub poor: String,
}

impl PerformanceLevels {
    pub fn generic() -> Self {
        Self {
            excellent: "Fully meets the criterion with no errors or omissions".into(),
            good: "Meets the criterion with minor errors or omissions".into(),
            fair: "Partially meets the criterion; several gaps".into(),
            poor: "Does not meet the criterion".into(),
        }
    }

    /// Fill blank descriptors from the generic set.
    pub fn filled(self) -> Self {
        let generic = Self::generic();
        let pick = |own: String, fallback: String| {
            if own.trim().is_empty() {
                fallback
            } else {
                own.trim().to_string()
            }
        };
        Self {
            excellent: pick(self.excellent, generic.excellent),
            good: pick(self.good, generic.good),
            fair: pick(self.fair, generic.fair),
            poor: pick(self.poor, generic.poor),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    #[serde(alias = "criterion", deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub description: String,
    /// Percentage weight, 0 to 100.
    #[serde(default, deserialize_with = "lenient::f64")]
    pub weight: f64,
    #[serde(default, alias = "levels")]
    pub performance_levels: PerformanceLevels,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment_reference: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub title: String,
    #[serde(default = "default_max_score", deserialize_with = "lenient::f64")]
    pub max_score: f64,
    pub criteria: Vec<Criterion>,
    #[serde(default = "standard_grading_scale")]
    pub grading_scale: Vec<GradeBand>,
}

impl Rubric {
    pub fn total_weight(&self) -> f64 {
        self.criteria.iter().map(|c| c.weight).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseStructure {
    #[serde(default, deserialize_with = "lenient::string")]
    pub title: String,
    #[serde(deserialize_with = "lenient::string_vec")]
    pub modules: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_vec")]
    pub learning_objectives: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_vec")]
    pub prerequisites: Vec<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_u32",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration_hours: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    #[serde(alias = "name", deserialize_with = "lenient::string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleContent {
    #[serde(default, alias = "title", deserialize_with = "lenient::string")]
    pub module_title: String,
    pub lessons: Vec<Lesson>,
    #[serde(default, deserialize_with = "lenient::string_vec")]
    pub activities: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_vec")]
    pub assessments: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_vec")]
    pub resources: Vec<String>,
}

/// A generated record, one variant per content kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructuredRecord {
    Assignment(Assignment),
    Test(TestPaper),
    FlashcardSet(FlashcardSet),
    Rubric(Rubric),
    CourseStructure(CourseStructure),
    Module(ModuleContent),
}

impl StructuredRecord {
    pub fn kind(&self) -> ContentKind {
        match self {
            StructuredRecord::Assignment(_) => ContentKind::Assignment,
            StructuredRecord::Test(_) => ContentKind::Test,
            StructuredRecord::FlashcardSet(_) => ContentKind::FlashcardSet,
            StructuredRecord::Rubric(_) => ContentKind::Rubric,
            StructuredRecord::CourseStructure(_) => ContentKind::CourseStructure,
            StructuredRecord::Module(_) => ContentKind::Module,
        }
    }

    /// Number of items in the record's primary collection.
    pub fn item_count(&self) -> usize {
        match self {
            StructuredRecord::Assignment(a) => a.questions.len(),
            StructuredRecord::Test(t) => t.questions.len(),
            StructuredRecord::FlashcardSet(f) => f.flashcards.len(),
            StructuredRecord::Rubric(r) => r.criteria.len(),
            StructuredRecord::CourseStructure(c) => c.modules.len(),
            StructuredRecord::Module(m) => m.lessons.len(),
        }
    }

    /// Primary text of every item, in order.
    pub fn item_texts(&self) -> Vec<&str> {
        match self {
            StructuredRecord::Assignment(a) => {
                a.questions.iter().map(|q| q.question.as_str()).collect()
            }
            StructuredRecord::Test(t) => t.questions.iter().map(|q| q.question.as_str()).collect(),
            StructuredRecord::FlashcardSet(f) => {
                f.flashcards.iter().map(|c| c.front.as_str()).collect()
            }
            StructuredRecord::Rubric(r) => r.criteria.iter().map(|c| c.name.as_str()).collect(),
            StructuredRecord::CourseStructure(c) => c.modules.iter().map(String::as_str).collect(),
            StructuredRecord::Module(m) => m.lessons.iter().map(|l| l.title.as_str()).collect(),
        }
    }
}

/// Tolerant field deserializers for backend output.
pub(crate) mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::{Map, Value};

    fn scalar_text(value: Value) -> Option<String> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(s),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Array(items) => {
                let parts: Vec<String> = items.into_iter().filter_map(scalar_text).collect();
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join("; "))
                }
            }
            Value::Object(map) => ["title", "name", "text", "module_title"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str).map(str::to_string))
                .or_else(|| Some(Value::Object(map).to_string())),
        }
    }

    fn number(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(scalar_text(Value::deserialize(d)?).unwrap_or_default())
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(scalar_text(Value::deserialize(d)?))
    }

    pub fn string_vec<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        match Value::deserialize(d)? {
            Value::Array(items) => Ok(items.into_iter().filter_map(scalar_text).collect()),
            Value::Null => Ok(Vec::new()),
            Value::String(s) => Ok(vec![s]),
            other => Err(serde::de::Error::custom(format!(
                "expected a list, found {other}"
            ))),
        }
    }

    pub fn opt_string_vec<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<Vec<String>>, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(None),
            Value::Array(items) => Ok(Some(items.into_iter().filter_map(scalar_text).collect())),
            Value::Object(map) => Ok(Some(map.into_values().filter_map(scalar_text).collect())),
            other => Ok(scalar_text(other).map(|s| vec![s])),
        }
    }

    pub fn f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(number(&Value::deserialize(d)?).unwrap_or(0.0))
    }

    pub fn opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(number(&Value::deserialize(d)?))
    }

    fn to_u32(x: f64) -> Option<u32> {
        x.is_finite().then(|| x.max(0.0).min(u32::MAX as f64).round() as u32)
    }

    pub fn u32<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        Ok(number(&Value::deserialize(d)?).and_then(to_u32).unwrap_or(0))
    }

    pub fn opt_u32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
        Ok(number(&Value::deserialize(d)?).and_then(to_u32))
    }

    pub fn object<'de, D: Deserializer<'de>>(d: D) -> Result<Map<String, Value>, D::Error> {
        match Value::deserialize(d)? {
            Value::Object(map) => Ok(map),
            Value::Array(items) => Ok(items
                .into_iter()
                .enumerate()
                .map(|(i, v)| ((i + 1).to_string(), v))
                .collect()),
            _ => Ok(Map::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn question_accepts_loose_types() {
        let q: Question = serde_json::from_value(json!({
            "question": "2 + 2?",
            "question_type": "multiple_choice",
            "options": [3, 4, "five"],
            "correct_answer": 4,
            "points": "5"
        }))
        .unwrap();
        assert_eq!(q.question_type.as_deref(), Some("multiple_choice"));
        assert_eq!(q.options, Some(vec!["3".into(), "4".into(), "five".into()]));
        assert_eq!(q.correct_answer.as_deref(), Some("4"));
        assert_eq!(q.points, Some(5.0));
    }

    #[test]
    fn expected_answer_list_is_joined() {
        let q: Question = serde_json::from_value(json!({
            "question": "Why?",
            "expected_answer": ["cause", "effect"]
        }))
        .unwrap();
        assert_eq!(q.expected_answer.as_deref(), Some("cause; effect"));
    }

    #[test]
    fn missing_collection_is_rejected() {
        let err = serde_json::from_value::<TestPaper>(json!({"title": "Quiz"}));
        assert!(err.is_err());
    }

    #[test]
    fn course_modules_accept_objects() {
        let c: CourseStructure = serde_json::from_value(json!({
            "title": "Rust",
            "modules": [{"title": "Ownership"}, "Traits", {"name": "Async"}]
        }))
        .unwrap();
        assert_eq!(c.modules, vec!["Ownership", "Traits", "Async"]);
    }

    #[test]
    fn criterion_reads_original_field_names() {
        let c: Criterion = serde_json::from_value(json!({
            "criterion": "Clarity",
            "weight": "25",
            "levels": {"Excellent": "Crisp", "poor": "Muddled"}
        }))
        .unwrap();
        assert_eq!(c.name, "Clarity");
        assert_eq!(c.weight, 25.0);
        assert_eq!(c.performance_levels.excellent, "Crisp");
        assert_eq!(c.performance_levels.poor, "Muddled");
    }

    #[test]
    fn letter_grade_bands() {
        assert_eq!(LetterGrade::from_percentage(100.0), LetterGrade::A);
        assert_eq!(LetterGrade::from_percentage(90.0), LetterGrade::A);
        assert_eq!(LetterGrade::from_percentage(89.99), LetterGrade::B);
        assert_eq!(LetterGrade::from_percentage(70.0), LetterGrade::C);
        assert_eq!(LetterGrade::from_percentage(60.0), LetterGrade::D);
        assert_eq!(LetterGrade::from_percentage(59.9), LetterGrade::F);
        assert_eq!(
            serde_json::to_string(&LetterGrade::NotAvailable).unwrap(),
            "\"N/A\""
        );
    }

    #[test]
    fn record_is_tagged_by_kind() {
        let record = StructuredRecord::CourseStructure(CourseStructure {
            title: "Intro".into(),
            modules: vec!["One".into()],
            learning_objectives: vec![],
            prerequisites: vec![],
            duration_hours: Some(3),
        });
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["kind"], "course_structure");
        let back: StructuredRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.item_texts(), vec!["One"]);
    }
}
