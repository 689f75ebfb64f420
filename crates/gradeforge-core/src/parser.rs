//! Schema-validated parser and the free-text enumeration heuristic.

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::ParseError;
use crate::model::{ContentKind, TargetSchema};
use crate::normalize::{default_envelope_keys, unwrap_envelope};
use crate::records::{
    standard_grading_scale, Assignment, CourseStructure, Criterion, Flashcard, FlashcardSet,
    Lesson, ModuleContent, PerformanceLevels, Question, Rubric, StructuredRecord, TestPaper,
};
use crate::traits::extract_json_from_markdown;

/// Parses backend text into a typed record for a declared schema.
#[derive(Debug, Clone)]
pub struct SchemaParser {
    envelope_keys: Vec<String>,
}

impl Default for SchemaParser {
    fn default() -> Self {
        Self::new(default_envelope_keys())
    }
}

impl SchemaParser {
    pub fn new(envelope_keys: Vec<String>) -> Self {
        Self { envelope_keys }
    }

    /// Parse raw JSON text (markdown fences allowed) into a JSON value.
    ///
    /// Prose around the payload is rejected: a backend that chatters fails
    /// here and gets the stricter prompt on the next tier.
    pub fn parse_value(text: &str) -> Result<Value, ParseError> {
        let payload = extract_json_from_markdown(text);
        if !(payload.starts_with('{') || payload.starts_with('[')) {
            return Err(ParseError::NoStructuredData);
        }
        serde_json::from_str(payload).map_err(|e| ParseError::InvalidJson(e.to_string()))
    }

    /// Parse backend text into the record described by `schema`.
    pub fn parse(&self, text: &str, schema: &TargetSchema) -> Result<StructuredRecord, ParseError> {
        let value = unwrap_envelope(Self::parse_value(text)?, schema.kind, &self.envelope_keys);
        let kind = schema.kind;
        match kind {
            ContentKind::Assignment => decode(kind, value).map(StructuredRecord::Assignment),
            ContentKind::Test => decode(kind, value).map(StructuredRecord::Test),
            ContentKind::FlashcardSet => decode(kind, value).map(StructuredRecord::FlashcardSet),
            ContentKind::Rubric => decode(kind, value).map(StructuredRecord::Rubric),
            ContentKind::CourseStructure => {
                decode(kind, value).map(StructuredRecord::CourseStructure)
            }
            ContentKind::Module => decode(kind, value).map(StructuredRecord::Module),
        }
    }
}

fn decode<T: DeserializeOwned>(kind: ContentKind, value: Value) -> Result<T, ParseError> {
    serde_json::from_value(value).map_err(|e| ParseError::SchemaMismatch {
        kind,
        message: e.to_string(),
    })
}

fn enumeration_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| {
        Regex::new(r"^\s*\d+[.)]([^0-9].*)?$").expect("enumeration pattern is valid")
    })
}

/// Split free text into items on leading enumeration markers (`1.`, `2)`).
///
/// A line that starts with an integer followed by `.` or `)` begins a new
/// item; every following line up to the next marker belongs to it. Text
/// before the first marker is discarded.
pub fn split_enumerated(text: &str) -> Vec<String> {
    let marker = enumeration_marker();
    let mut items: Vec<Vec<&str>> = Vec::new();

    for line in text.lines() {
        if let Some(caps) = marker.captures(line) {
            let first = caps.get(1).map_or("", |m| m.as_str()).trim();
            items.push(vec![first]);
        } else if let Some(current) = items.last_mut() {
            current.push(line.trim());
        }
    }

    items
        .into_iter()
        .map(|lines| lines.join("\n").trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Build a minimal record from enumerated items. Only primary text is populated.
pub fn record_from_items(
    kind: ContentKind,
    topic: &str,
    items: Vec<String>,
) -> Result<StructuredRecord, ParseError> {
    if items.is_empty() {
        return Err(ParseError::NoEnumeratedItems);
    }
    let count = items.len();

    let record = match kind {
        ContentKind::Assignment => {
            let mut a = Assignment::new(
                format!("Assignment on {topic}"),
                items.into_iter().map(Question::from_text).collect(),
            );
            a.topic = Some(topic.to_string());
            a.instructions = "Answer all questions".to_string();
            StructuredRecord::Assignment(a)
        }
        ContentKind::Test => StructuredRecord::Test(TestPaper {
            title: None,
            questions: items.into_iter().map(Question::from_text).collect(),
            answers: Map::new(),
            estimated_duration: u32::try_from(count * 2).ok(),
        }),
        ContentKind::FlashcardSet => StructuredRecord::FlashcardSet(FlashcardSet {
            topic: topic.to_string(),
            flashcards: items
                .into_iter()
                .map(|front| Flashcard {
                    front,
                    back: String::new(),
                    category: String::new(),
                    difficulty: String::new(),
                    tags: Vec::new(),
                })
                .collect(),
            study_plan: None,
            estimated_study_time: None,
        }),
        ContentKind::Rubric => {
            let weight = 100.0 / count as f64;
            StructuredRecord::Rubric(Rubric {
                assignment_reference: None,
                title: format!("Rubric for {topic}"),
                max_score: 100.0,
                criteria: items
                    .into_iter()
                    .map(|name| Criterion {
                        name,
                        description: String::new(),
                        weight,
                        performance_levels: PerformanceLevels::default(),
                    })
                    .collect(),
                grading_scale: standard_grading_scale(),
            })
        }
        ContentKind::CourseStructure => StructuredRecord::CourseStructure(CourseStructure {
            title: format!("Course on {topic}"),
            modules: items,
            learning_objectives: Vec::new(),
            prerequisites: Vec::new(),
            duration_hours: None,
        }),
        ContentKind::Module => StructuredRecord::Module(ModuleContent {
            module_title: topic.to_string(),
            lessons: items
                .into_iter()
                .map(|title| Lesson {
                    title,
                    content: String::new(),
                })
                .collect(),
            activities: Vec::new(),
            assessments: Vec::new(),
            resources: Vec::new(),
        }),
    };
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(kind: ContentKind) -> TargetSchema {
        TargetSchema::for_kind(kind)
    }

    #[test]
    fn parse_fenced_test_payload() {
        let text = "```json\n{\"questions\": [{\"question\": \"What is ownership?\"}]}\n```";
        let record = SchemaParser::default().parse(text, &schema(ContentKind::Test)).unwrap();
        assert_eq!(record.kind(), ContentKind::Test);
        assert_eq!(record.item_texts(), vec!["What is ownership?"]);
    }

    #[test]
    fn parse_rejects_prose_preamble() {
        let text = "Sure! Here is your test: {\"questions\": []}";
        let err = SchemaParser::default().parse(text, &schema(ContentKind::Test)).unwrap_err();
        assert!(matches!(err, ParseError::NoStructuredData));
    }

    #[test]
    fn parse_rejects_malformed_json() {
        let err = SchemaParser::default()
            .parse("{\"questions\": [", &schema(ContentKind::Test))
            .unwrap_err();
        assert!(matches!(err, ParseError::InvalidJson(_)));
    }

    #[test]
    fn parse_rejects_wrong_shape() {
        let err = SchemaParser::default()
            .parse("{\"title\": \"no cards\"}", &schema(ContentKind::FlashcardSet))
            .unwrap_err();
        assert!(matches!(
            err,
            ParseError::SchemaMismatch {
                kind: ContentKind::FlashcardSet,
                ..
            }
        ));
    }

    #[test]
    fn parse_unwraps_envelopes() {
        let text = r#"{"data": {"flashcards": [{"front": "Term", "back": "Meaning"}]}}"#;
        let record = SchemaParser::default()
            .parse(text, &schema(ContentKind::FlashcardSet))
            .unwrap();
        assert_eq!(record.item_texts(), vec!["Term"]);
    }

    #[test]
    fn split_on_dot_and_paren_markers() {
        let text = "Here are some questions:\n1. What is a trait?\n2) Explain lifetimes.\n   \
                    Mention elision.\n3. Define Send.";
        let items = split_enumerated(text);
        assert_eq!(
            items,
            vec![
                "What is a trait?",
                "Explain lifetimes.\nMention elision.",
                "Define Send."
            ]
        );
    }

    #[test]
    fn split_ignores_decimals_and_preamble() {
        let text = "Intro line\n3.14 is not a marker\n1. Real item\n2.5 continues the item";
        assert_eq!(
            split_enumerated(text),
            vec!["Real item\n2.5 continues the item"]
        );
        assert!(split_enumerated("no numbers at all").is_empty());
    }

    #[test]
    fn heuristic_rubric_weights_split_evenly() {
        let record = record_from_items(
            ContentKind::Rubric,
            "Essays",
            vec!["Thesis".into(), "Evidence".into(), "Style".into(), "Mechanics".into()],
        )
        .unwrap();
        let StructuredRecord::Rubric(r) = record else {
            panic!("expected rubric");
        };
        assert!((r.total_weight() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn heuristic_requires_items() {
        assert!(matches!(
            record_from_items(ContentKind::Test, "x", vec![]),
            Err(ParseError::NoEnumeratedItems)
        ));
    }
}
