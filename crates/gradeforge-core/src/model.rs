//! Generation request model: content kinds, parameters, target schemas,
//! ladder tiers and the attempt log.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kinds of structured content the orchestrator can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Assignment,
    Test,
    FlashcardSet,
    Rubric,
    CourseStructure,
    Module,
}

impl ContentKind {
    pub const ALL: [ContentKind; 6] = [
        ContentKind::Assignment,
        ContentKind::Test,
        ContentKind::FlashcardSet,
        ContentKind::Rubric,
        ContentKind::CourseStructure,
        ContentKind::Module,
    ];

    /// Parameter that carries the requested item count for this kind.
    pub fn count_parameter(self) -> &'static str {
        match self {
            ContentKind::Assignment | ContentKind::Test => "num_questions",
            ContentKind::FlashcardSet => "num_flashcards",
            ContentKind::Rubric => "num_criteria",
            ContentKind::CourseStructure => "num_modules",
            ContentKind::Module => "num_lessons",
        }
    }

    /// Item count used when the request does not name one.
    pub fn default_count(self) -> usize {
        match self {
            ContentKind::Assignment => 5,
            ContentKind::Test => 10,
            ContentKind::FlashcardSet => 10,
            ContentKind::Rubric => 4,
            ContentKind::CourseStructure => 6,
            ContentKind::Module => 4,
        }
    }

    /// Human noun for one item, used in prompts.
    pub fn item_noun(self) -> &'static str {
        match self {
            ContentKind::Assignment | ContentKind::Test => "questions",
            ContentKind::FlashcardSet => "flashcards",
            ContentKind::Rubric => "grading criteria",
            ContentKind::CourseStructure => "module titles",
            ContentKind::Module => "lesson titles",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentKind::Assignment => write!(f, "assignment"),
            ContentKind::Test => write!(f, "test"),
            ContentKind::FlashcardSet => write!(f, "flashcard_set"),
            ContentKind::Rubric => write!(f, "rubric"),
            ContentKind::CourseStructure => write!(f, "course_structure"),
            ContentKind::Module => write!(f, "module"),
        }
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "assignment" => Ok(ContentKind::Assignment),
            "test" | "quiz" => Ok(ContentKind::Test),
            "flashcard_set" | "flashcards" => Ok(ContentKind::FlashcardSet),
            "rubric" => Ok(ContentKind::Rubric),
            "course_structure" | "course" => Ok(ContentKind::CourseStructure),
            "module" => Ok(ContentKind::Module),
            other => Err(format!("unknown content kind: {other}")),
        }
    }
}

/// A scalar request parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_count(&self) -> Option<usize> {
        match self {
            ParamValue::Int(n) if *n > 0 => usize::try_from(*n).ok(),
            ParamValue::Float(f) if f.is_finite() && *f >= 1.0 => Some(*f as usize),
            ParamValue::Text(s) => s.trim().parse().ok().filter(|n| *n > 0),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(n) => write!(f, "{n}"),
            ParamValue::Float(x) => write!(f, "{x}"),
            ParamValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl FromStr for ParamValue {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(b) = trimmed.parse::<bool>() {
            return Ok(ParamValue::Bool(b));
        }
        if let Ok(n) = trimmed.parse::<i64>() {
            return Ok(ParamValue::Int(n));
        }
        if let Ok(x) = trimmed.parse::<f64>() {
            return Ok(ParamValue::Float(x));
        }
        Ok(ParamValue::Text(trimmed.to_string()))
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Text(s)
    }
}

impl From<i64> for ParamValue {
    fn from(n: i64) -> Self {
        ParamValue::Int(n)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

/// Ordered so prompts render parameters deterministically.
pub type Parameters = BTreeMap<String, ParamValue>;

/// Requested item count: the kind's count parameter, then `num_items`, then the default.
pub fn requested_count(kind: ContentKind, params: &Parameters) -> usize {
    params
        .get(kind.count_parameter())
        .or_else(|| params.get("num_items"))
        .and_then(ParamValue::as_count)
        .unwrap_or_else(|| kind.default_count())
}

/// Question format requested for a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestFormat {
    TextBased,
    MultipleChoice,
    Unspecified,
}

impl TestFormat {
    pub const TEXT_BASED: &'static str = "text_based";
    pub const MULTIPLE_CHOICE: &'static str = "multiple_choice";

    /// Read the `test_type` parameter. Matching is by substring so
    /// "text", "Text-Based" and "multiple choice" all resolve.
    pub fn from_params(params: &Parameters) -> Self {
        let raw = params
            .get("test_type")
            .map(|v| v.to_string().to_lowercase())
            .unwrap_or_default();
        if raw.contains("text") {
            TestFormat::TextBased
        } else if raw.contains("multi") || raw.contains("choice") {
            TestFormat::MultipleChoice
        } else {
            TestFormat::Unspecified
        }
    }
}

/// One field in a target schema.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub type_hint: &'static str,
    pub required: bool,
    pub description: &'static str,
}

const fn field(
    name: &'static str,
    type_hint: &'static str,
    required: bool,
    description: &'static str,
) -> FieldSpec {
    FieldSpec {
        name,
        type_hint,
        required,
        description,
    }
}

/// Declared shape of a record, used to render format instructions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetSchema {
    pub kind: ContentKind,
    /// Top-level fields other than the item collection.
    pub fields: &'static [FieldSpec],
    /// Name of the item collection.
    pub collection: &'static str,
    /// Fields of each item. Empty when items are plain strings.
    pub item_fields: &'static [FieldSpec],
}

const QUESTION_FIELDS: &[FieldSpec] = &[
    field("question", "string", true, "the question text"),
    field("type", "string", false, "question format"),
    field("options", "array of strings", false, "answer options for multiple choice"),
    field("correct_answer", "string", false, "the correct option"),
    field("expected_answer", "string", false, "expected answer points for text questions"),
    field("points", "number", false, "points awarded for this question"),
    field("rubric", "string", false, "how the answer is scored"),
];

const ASSIGNMENT_FIELDS: &[FieldSpec] = &[
    field("title", "string", true, "assignment title"),
    field("description", "string", false, "short summary"),
    field("instructions", "string", false, "instructions for students"),
    field("total_points", "number", false, "total points available"),
    field("estimated_time", "integer", false, "estimated time in minutes"),
    field("learning_objectives", "array of strings", false, "learning objectives"),
];

const TEST_FIELDS: &[FieldSpec] = &[
    field("title", "string", false, "test title"),
    field("answers", "object", false, "answer key keyed by question number"),
    field("estimated_duration", "integer", false, "estimated duration in minutes"),
];

const FLASHCARD_SET_FIELDS: &[FieldSpec] = &[
    field("topic", "string", false, "flashcard set topic"),
    field(
        "study_plan",
        "object",
        false,
        "sessions, cards_per_session, spaced_repetition",
    ),
    field(
        "estimated_study_time",
        "integer",
        false,
        "estimated study time in minutes",
    ),
];

const FLASHCARD_FIELDS: &[FieldSpec] = &[
    field("front", "string", true, "question or concept"),
    field("back", "string", true, "answer or explanation"),
    field("category", "string", false, "category or topic"),
    field("difficulty", "string", false, "easy, medium or hard"),
    field("tags", "array of strings", false, "tags for organization"),
];

const RUBRIC_FIELDS: &[FieldSpec] = &[
    field("title", "string", false, "rubric title"),
    field("max_score", "number", false, "maximum score"),
];

const CRITERION_FIELDS: &[FieldSpec] = &[
    field("criterion", "string", true, "criterion name"),
    field("description", "string", false, "what the criterion measures"),
    field("weight", "number", true, "weight percentage; weights total 100"),
    field("levels", "object", false, "Excellent, Good, Fair and Poor descriptors"),
];

const COURSE_FIELDS: &[FieldSpec] = &[
    field("title", "string", true, "course title"),
    field("learning_objectives", "array of strings", false, "learning objectives"),
    field("prerequisites", "array of strings", false, "prerequisites"),
    field("duration_hours", "integer", false, "estimated duration in hours"),
];

const MODULE_FIELDS: &[FieldSpec] = &[
    field("module_title", "string", true, "module title"),
    field("activities", "array of strings", false, "learning activities"),
    field("assessments", "array of strings", false, "assessment methods"),
    field("resources", "array of strings", false, "learning resources"),
];

const NO_FIELDS: &[FieldSpec] = &[];

const LESSON_FIELDS: &[FieldSpec] = &[
    field("title", "string", true, "lesson title"),
    field("content", "string", false, "lesson content"),
];

impl TargetSchema {
    pub fn for_kind(kind: ContentKind) -> Self {
        let (fields, collection, item_fields) = match kind {
            ContentKind::Assignment => (ASSIGNMENT_FIELDS, "questions", QUESTION_FIELDS),
            ContentKind::Test => (TEST_FIELDS, "questions", QUESTION_FIELDS),
            ContentKind::FlashcardSet => (FLASHCARD_SET_FIELDS, "flashcards", FLASHCARD_FIELDS),
            ContentKind::Rubric => (RUBRIC_FIELDS, "criteria", CRITERION_FIELDS),
            ContentKind::CourseStructure => (COURSE_FIELDS, "modules", NO_FIELDS),
            ContentKind::Module => (MODULE_FIELDS, "lessons", LESSON_FIELDS),
        };
        TargetSchema {
            kind,
            fields,
            collection,
            item_fields,
        }
    }

    /// Machine-readable format instructions appended to schema-guided prompts.
    pub fn format_instructions(&self) -> String {
        let mut out =
            String::from("Return the result as a single JSON object with these fields:\n");
        for f in self.fields {
            out.push_str(&render_field(f, ""));
        }
        if self.item_fields.is_empty() {
            out.push_str(&format!(
                "- `{}` (array of strings, required)\n",
                self.collection
            ));
        } else {
            out.push_str(&format!(
                "- `{}` (array of objects, required). Each object has:\n",
                self.collection
            ));
            for f in self.item_fields {
                out.push_str(&render_field(f, "  "));
            }
        }
        out.push_str("Output ONLY valid JSON.");
        out
    }
}

fn render_field(f: &FieldSpec, indent: &str) -> String {
    let req = if f.required { "required" } else { "optional" };
    format!(
        "{indent}- `{}` ({}, {req}): {}\n",
        f.name, f.type_hint, f.description
    )
}

/// A request for generated content. Immutable once issued.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub id: Uuid,
    pub kind: ContentKind,
    pub topic: String,
    pub parameters: Parameters,
    pub schema: TargetSchema,
}

impl GenerationRequest {
    pub fn new(kind: ContentKind, topic: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            topic: topic.into(),
            parameters: Parameters::new(),
            schema: TargetSchema::for_kind(kind),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn requested_count(&self) -> usize {
        requested_count(self.kind, &self.parameters)
    }

    pub fn test_format(&self) -> TestFormat {
        TestFormat::from_params(&self.parameters)
    }

}

/// One level of the generation ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    SchemaGuided,
    StrictSchema,
    HeuristicText,
    StaticFallback,
}

impl Tier {
    /// Ladder order.
    pub const LADDER: [Tier; 4] = [
        Tier::SchemaGuided,
        Tier::StrictSchema,
        Tier::HeuristicText,
        Tier::StaticFallback,
    ];

    pub fn number(self) -> u8 {
        match self {
            Tier::SchemaGuided => 1,
            Tier::StrictSchema => 2,
            Tier::HeuristicText => 3,
            Tier::StaticFallback => 4,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Tier::SchemaGuided => "schema-guided",
            Tier::StrictSchema => "strict-schema",
            Tier::HeuristicText => "heuristic-text",
            Tier::StaticFallback => "static-fallback",
        };
        write!(f, "tier {} ({label})", self.number())
    }
}

/// Outcome of one ladder attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    ParseError,
    BackendError,
}

/// One entry of the per-request attempt log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationAttempt {
    pub tier: Tier,
    /// Backend text, when the backend answered.
    pub raw_text: Option<String>,
    pub outcome: AttemptOutcome,
    /// Error message for failed attempts.
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_kind_display_and_parse() {
        for kind in ContentKind::ALL {
            assert_eq!(kind.to_string().parse::<ContentKind>().unwrap(), kind);
        }
        assert_eq!("quiz".parse::<ContentKind>().unwrap(), ContentKind::Test);
        assert_eq!(
            "flashcards".parse::<ContentKind>().unwrap(),
            ContentKind::FlashcardSet
        );
        assert!("essay".parse::<ContentKind>().is_err());
    }

    #[test]
    fn param_value_parsing() {
        assert_eq!("true".parse::<ParamValue>().unwrap(), ParamValue::Bool(true));
        assert_eq!("12".parse::<ParamValue>().unwrap(), ParamValue::Int(12));
        assert_eq!("0.5".parse::<ParamValue>().unwrap(), ParamValue::Float(0.5));
        assert_eq!(
            "hard".parse::<ParamValue>().unwrap(),
            ParamValue::Text("hard".into())
        );
    }

    #[test]
    fn requested_count_prefers_kind_parameter() {
        let req = GenerationRequest::new(ContentKind::Test, "Graphs")
            .with_param("num_questions", 3)
            .with_param("num_items", 7);
        assert_eq!(req.requested_count(), 3);

        let req = GenerationRequest::new(ContentKind::FlashcardSet, "Graphs")
            .with_param("num_items", "7");
        assert_eq!(req.requested_count(), 7);

        let req =
            GenerationRequest::new(ContentKind::Rubric, "Graphs").with_param("num_criteria", 0);
        assert_eq!(req.requested_count(), 4);
    }

    #[test]
    fn test_format_from_params() {
        let req =
            GenerationRequest::new(ContentKind::Test, "t").with_param("test_type", "Text-Based");
        assert_eq!(req.test_format(), TestFormat::TextBased);
        let req = GenerationRequest::new(ContentKind::Test, "t")
            .with_param("test_type", "multiple choice");
        assert_eq!(req.test_format(), TestFormat::MultipleChoice);
        let req = GenerationRequest::new(ContentKind::Test, "t");
        assert_eq!(req.test_format(), TestFormat::Unspecified);
    }

    #[test]
    fn format_instructions_name_collection_and_required_fields() {
        let text = TargetSchema::for_kind(ContentKind::FlashcardSet).format_instructions();
        assert!(text.contains("`flashcards` (array of objects, required)"));
        assert!(text.contains("`front` (string, required)"));
        assert!(text.ends_with("Output ONLY valid JSON."));

        let text = TargetSchema::for_kind(ContentKind::CourseStructure).format_instructions();
        assert!(text.contains("`modules` (array of strings, required)"));
    }

    #[test]
    fn every_kind_has_a_static_schema() {
        for kind in ContentKind::ALL {
            let schema = TargetSchema::for_kind(kind);
            assert_eq!(schema.kind, kind);
            assert!(!schema.fields.is_empty(), "{kind}");
            assert!(!schema.collection.is_empty(), "{kind}");
        }
        let rubric = TargetSchema::for_kind(ContentKind::Rubric);
        assert_eq!(rubric.collection, "criteria");
        assert!(rubric.item_fields.iter().any(|f| f.name == "weight" && f.required));
    }

    #[test]
    fn tier_ladder_order() {
        let numbers: Vec<u8> = Tier::LADDER.iter().map(|t| t.number()).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert_eq!(Tier::HeuristicText.to_string(), "tier 3 (heuristic-text)");
    }
}
