//! Record normalizer and coercer.
//!
//! Two stages: [`unwrap_envelope`] runs on the raw JSON payload before typed
//! decoding, [`normalize`] runs on the decoded record. `normalize` is pure and
//! idempotent.

use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::model::{requested_count, ContentKind, Parameters, TargetSchema, TestFormat};
use crate::records::{
    Assignment, CourseStructure, FlashcardSet, ModuleContent, Question, Rubric, StructuredRecord,
    TestPaper,
};

/// Envelope keys unwrapped when no allow-list is configured.
pub const DEFAULT_ENVELOPE_KEYS: &[&str] = &["test", "data", "result"];

pub fn default_envelope_keys() -> Vec<String> {
    DEFAULT_ENVELOPE_KEYS.iter().map(|k| k.to_string()).collect()
}

/// Hoist a payload wrapped under a known envelope key to the top level.
///
/// Checks each allow-listed key plus the content kind's own name, one level
/// deep. Top-level values win over wrapped ones. A bare array, or an array
/// under an envelope key, is read as the kind's item collection.
pub fn unwrap_envelope(payload: Value, kind: ContentKind, envelope_keys: &[String]) -> Value {
    let collection = TargetSchema::for_kind(kind).collection;

    let mut map = match payload {
        Value::Object(map) => map,
        Value::Array(items) => {
            let mut map = Map::new();
            map.insert(collection.to_string(), Value::Array(items));
            return Value::Object(map);
        }
        other => return other,
    };

    let kind_key = kind.to_string();
    let keys = envelope_keys
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(kind_key.as_str()));

    for key in keys {
        match map.get(key) {
            Some(Value::Object(_)) => {
                if let Some(Value::Object(inner)) = map.remove(key) {
                    for (k, v) in inner {
                        map.entry(k).or_insert(v);
                    }
                }
            }
            Some(Value::Array(_)) if !map.contains_key(collection) => {
                if let Some(items) = map.remove(key) {
                    map.insert(collection.to_string(), items);
                }
            }
            _ => {}
        }
    }

    Value::Object(map)
}

/// Enforce per-kind invariants on a decoded record.
///
/// Drops items with blank primary text, clamps numeric fields to be
/// non-negative, coerces test questions to the requested format and
/// truncates over-production to the requested count. Under-production is
/// accepted. An empty collection is a [`ValidationError`].
pub fn normalize(
    record: StructuredRecord,
    params: &Parameters,
) -> Result<StructuredRecord, ValidationError> {
    let kind = record.kind();
    let limit = requested_count(kind, params);

    let normalized = match record {
        StructuredRecord::Assignment(a) => {
            StructuredRecord::Assignment(normalize_assignment(a, limit))
        }
        StructuredRecord::Test(t) => {
            StructuredRecord::Test(normalize_test(t, TestFormat::from_params(params), limit))
        }
        StructuredRecord::FlashcardSet(f) => {
            StructuredRecord::FlashcardSet(normalize_flashcards(f, limit))
        }
        StructuredRecord::Rubric(r) => StructuredRecord::Rubric(normalize_rubric(r, limit)),
        StructuredRecord::CourseStructure(c) => {
            StructuredRecord::CourseStructure(normalize_course(c, limit))
        }
        StructuredRecord::Module(m) => StructuredRecord::Module(normalize_module(m, limit)),
    };

    if normalized.item_count() == 0 {
        return Err(ValidationError::EmptyItems { kind });
    }
    Ok(normalized)
}

fn non_negative(x: f64) -> f64 {
    if x.is_finite() && x > 0.0 {
        x
    } else {
        0.0
    }
}

fn positive_or_default(x: f64) -> f64 {
    if x.is_finite() && x > 0.0 {
        x
    } else {
        100.0
    }
}

fn trim_in_place(s: &mut String) {
    let trimmed = s.trim();
    if trimmed.len() != s.len() {
        *s = trimmed.to_string();
    }
}

fn clean_questions(questions: &mut Vec<Question>, limit: usize) {
    for q in questions.iter_mut() {
        trim_in_place(&mut q.question);
        q.points = q.points.map(non_negative);
    }
    questions.retain(|q| !q.question.is_empty());
    questions.truncate(limit);
}

fn normalize_assignment(mut a: Assignment, limit: usize) -> Assignment {
    clean_questions(&mut a.questions, limit);
    a.total_points = a.total_points.map(non_negative);
    a.max_score = positive_or_default(a.max_score);
    a
}

fn normalize_test(mut t: TestPaper, format: TestFormat, limit: usize) -> TestPaper {
    for q in t.questions.iter_mut() {
        coerce_question(q, format);
    }
    clean_questions(&mut t.questions, limit);
    t
}

/// Force a question into the requested test format.
pub fn coerce_question(q: &mut Question, format: TestFormat) {
    match format {
        TestFormat::TextBased => {
            let correct = q.correct_answer.take();
            let options = q.options.take();
            if let Some(answer) = correct.or_else(|| options.and_then(|o| o.into_iter().next())) {
                q.expected_answer = Some(answer);
            }
            q.question_type = Some(TestFormat::TEXT_BASED.to_string());
        }
        TestFormat::MultipleChoice => {
            let missing = q.options.as_ref().map_or(true, Vec::is_empty);
            if missing {
                if let Some(answer) = &q.correct_answer {
                    q.options = Some(vec![answer.clone()]);
                }
            }
            // Without any choice to offer the question is left untagged.
            if q.options.as_ref().is_some_and(|o| !o.is_empty()) {
                q.question_type = Some(TestFormat::MULTIPLE_CHOICE.to_string());
            } else if q.question_type.as_deref() == Some(TestFormat::MULTIPLE_CHOICE) {
                q.question_type = None;
            }
        }
        TestFormat::Unspecified => {}
    }
}

fn normalize_flashcards(mut f: FlashcardSet, limit: usize) -> FlashcardSet {
    for card in f.flashcards.iter_mut() {
        trim_in_place(&mut card.front);
        trim_in_place(&mut card.back);
    }
    f.flashcards.retain(|c| !c.front.is_empty());
    f.flashcards.truncate(limit);
    f
}

fn normalize_rubric(mut r: Rubric, limit: usize) -> Rubric {
    for c in r.criteria.iter_mut() {
        trim_in_place(&mut c.name);
        c.weight = non_negative(c.weight).min(100.0);
        c.performance_levels = std::mem::take(&mut c.performance_levels).filled();
    }
    r.criteria.retain(|c| !c.name.is_empty());
    r.criteria.truncate(limit);
    r.max_score = positive_or_default(r.max_score);
    r
}

fn normalize_course(mut c: CourseStructure, limit: usize) -> CourseStructure {
    for m in c.modules.iter_mut() {
        trim_in_place(m);
    }
    c.modules.retain(|m| !m.is_empty());
    c.modules.truncate(limit);
    c
}

fn normalize_module(mut m: ModuleContent, limit: usize) -> ModuleContent {
    for lesson in m.lessons.iter_mut() {
        trim_in_place(&mut lesson.title);
    }
    m.lessons.retain(|l| !l.title.is_empty());
    m.lessons.truncate(limit);
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ParamValue;
    use crate::records::{Criterion, Flashcard, PerformanceLevels};
    use serde_json::json;

    fn params(pairs: &[(&str, ParamValue)]) -> Parameters {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn mc_question(text: &str, options: &[&str], correct: Option<&str>) -> Question {
        Question {
            question_type: Some("multiple_choice".into()),
            options: Some(options.iter().map(|s| s.to_string()).collect()),
            correct_answer: correct.map(str::to_string),
            ..Question::from_text(text)
        }
    }

    fn test_record(questions: Vec<Question>) -> StructuredRecord {
        StructuredRecord::Test(TestPaper {
            title: None,
            questions,
            answers: Map::new(),
            estimated_duration: Some(20),
        })
    }

    #[test]
    fn text_based_strips_choice_fields() {
        let record = test_record(vec![
            mc_question("Capital of France?", &["Paris", "Rome"], Some("Paris")),
            mc_question("Largest planet?", &["Jupiter", "Mars"], None),
        ]);
        let p = params(&[("test_type", "text_based".into())]);

        let StructuredRecord::Test(t) = normalize(record, &p).unwrap() else {
            panic!("expected a test record");
        };
        for q in &t.questions {
            assert!(q.options.is_none());
            assert!(q.correct_answer.is_none());
            assert_eq!(q.question_type.as_deref(), Some("text_based"));
        }
        assert_eq!(t.questions[0].expected_answer.as_deref(), Some("Paris"));
        assert_eq!(t.questions[1].expected_answer.as_deref(), Some("Jupiter"));
    }

    #[test]
    fn multiple_choice_synthesizes_options() {
        let mut q = Question::from_text("2 + 2?");
        q.correct_answer = Some("4".into());
        let p = params(&[("test_type", "multiple_choice".into())]);

        let StructuredRecord::Test(t) = normalize(test_record(vec![q]), &p).unwrap() else {
            panic!("expected a test record");
        };
        assert_eq!(t.questions[0].options, Some(vec!["4".to_string()]));
        assert_eq!(t.questions[0].question_type.as_deref(), Some("multiple_choice"));
    }

    #[test]
    fn multiple_choice_without_choices_stays_untagged() {
        let bare = Question::from_text("Name a noble gas.");
        let claimed = mc_question("Name a metal.", &[], None);
        let mut essay = Question::from_text("Discuss bonding.");
        essay.question_type = Some("essay".into());
        let p = params(&[("test_type", "multiple_choice".into())]);

        let once = normalize(test_record(vec![bare, claimed, essay]), &p).unwrap();
        let StructuredRecord::Test(t) = &once else {
            panic!("expected a test record");
        };
        assert_eq!(t.questions[0].question_type, None);
        assert_eq!(t.questions[1].question_type, None);
        assert_eq!(t.questions[2].question_type.as_deref(), Some("essay"));
        assert_eq!(normalize(once.clone(), &p).unwrap(), once);
    }

    #[test]
    fn truncates_but_never_pads() {
        let many: Vec<Question> = (1..=6).map(|i| Question::from_text(format!("Q{i}"))).collect();
        let p = params(&[("num_questions", ParamValue::Int(4))]);
        let out = normalize(test_record(many), &p).unwrap();
        assert_eq!(out.item_count(), 4);
        assert_eq!(out.item_texts(), vec!["Q1", "Q2", "Q3", "Q4"]);

        let few = vec![Question::from_text("Only one")];
        let out = normalize(test_record(few), &p).unwrap();
        assert_eq!(out.item_count(), 1);
    }

    #[test]
    fn blank_items_are_dropped_and_empty_is_rejected() {
        let record = test_record(vec![Question::from_text("   "), Question::from_text("")]);
        let err = normalize(record, &Parameters::new()).unwrap_err();
        assert_eq!(err, ValidationError::EmptyItems { kind: ContentKind::Test });
    }

    #[test]
    fn negative_numbers_are_clamped() {
        let rubric = StructuredRecord::Rubric(Rubric {
            assignment_reference: None,
            title: "R".into(),
            max_score: -5.0,
            criteria: vec![Criterion {
                name: "Accuracy".into(),
                description: String::new(),
                weight: -10.0,
                performance_levels: PerformanceLevels::default(),
            }],
            grading_scale: crate::records::standard_grading_scale(),
        });
        let StructuredRecord::Rubric(r) = normalize(rubric, &Parameters::new()).unwrap() else {
            panic!("expected a rubric");
        };
        assert_eq!(r.criteria[0].weight, 0.0);
        assert_eq!(r.max_score, 100.0);
        assert!(!r.criteria[0].performance_levels.poor.is_empty());
    }

    #[test]
    fn normalize_is_idempotent() {
        let p = params(&[
            ("test_type", "text".into()),
            ("num_questions", ParamValue::Int(2)),
        ]);
        let mut q3 = mc_question("  third ", &["a"], None);
        q3.points = Some(-1.0);
        let record = test_record(vec![
            mc_question(" first", &["x", "y"], Some("y")),
            Question::from_text(""),
            q3,
            Question::from_text("fourth"),
        ]);

        let once = normalize(record, &p).unwrap();
        let twice = normalize(once.clone(), &p).unwrap();
        assert_eq!(once, twice);

        let cards = StructuredRecord::FlashcardSet(FlashcardSet {
            topic: "Rust".into(),
            flashcards: vec![Flashcard {
                front: " What is a borrow? ".into(),
                back: " A reference ".into(),
                category: String::new(),
                difficulty: String::new(),
                tags: vec![],
            }],
            study_plan: None,
            estimated_study_time: None,
        });
        let once = normalize(cards, &Parameters::new()).unwrap();
        assert_eq!(normalize(once.clone(), &Parameters::new()).unwrap(), once);
    }

    #[test]
    fn unwrap_hoists_test_envelope_preferring_top_level() {
        let payload = json!({
            "estimated_duration": 30,
            "test": {
                "questions": [{"question": "Q1"}],
                "estimated_duration": 99,
                "answers": {"1": "A"}
            }
        });
        let out = unwrap_envelope(payload, ContentKind::Test, &default_envelope_keys());
        assert_eq!(out["estimated_duration"], 30);
        assert_eq!(out["questions"][0]["question"], "Q1");
        assert_eq!(out["answers"]["1"], "A");
        assert!(out.get("test").is_none());
    }

    #[test]
    fn unwrap_data_and_result_wrappers() {
        let payload = json!({"result": {"questions": [{"question": "R"}]}});
        let out = unwrap_envelope(payload, ContentKind::Assignment, &default_envelope_keys());
        assert_eq!(out["questions"][0]["question"], "R");

        let payload = json!({"data": [{"front": "F", "back": "B"}]});
        let out = unwrap_envelope(payload, ContentKind::FlashcardSet, &default_envelope_keys());
        assert_eq!(out["flashcards"][0]["front"], "F");
    }

    #[test]
    fn unwrap_uses_kind_name_and_configured_keys_only() {
        let payload = json!({"flashcard_set": {"flashcards": []}});
        let out = unwrap_envelope(payload, ContentKind::FlashcardSet, &[]);
        assert!(out.get("flashcards").is_some());

        let payload = json!({"payload": {"questions": []}});
        let out = unwrap_envelope(payload.clone(), ContentKind::Test, &default_envelope_keys());
        assert_eq!(out, payload);
        let out = unwrap_envelope(payload, ContentKind::Test, &["payload".to_string()]);
        assert!(out.get("questions").is_some());
    }

    #[test]
    fn unwrap_is_one_level_deep() {
        let payload = json!({"data": {"result": {"questions": [{"question": "deep"}]}}});
        let out = unwrap_envelope(payload, ContentKind::Test, &["data".to_string()]);
        assert!(out.get("questions").is_none());
        assert!(out.get("result").is_some());
    }

    #[test]
    fn bare_array_becomes_collection() {
        let out = unwrap_envelope(json!(["Intro", "Advanced"]), ContentKind::CourseStructure, &[]);
        assert_eq!(out["modules"][1], "Advanced");
    }
}
