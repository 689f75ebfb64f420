//! Prompt builders for each ladder tier.

use crate::model::{ContentKind, GenerationRequest, TestFormat, Tier};
use crate::records::{Assignment, Rubric};

const STRICT_JSON_INSTRUCTIONS: &str =
    "YOU MUST RETURN A SINGLE, VALID JSON OBJECT AND NOTHING ELSE. \
Do NOT include any preamble, introduction, markdown, or explanatory text. ONLY the JSON.";

fn kind_phrase(kind: ContentKind) -> &'static str {
    match kind {
        ContentKind::Assignment => "an assignment",
        ContentKind::Test => "a test",
        ContentKind::FlashcardSet => "a set of flashcards for self-study",
        ContentKind::Rubric => "a grading rubric",
        ContentKind::CourseStructure => "a course structure",
        ContentKind::Module => "the content of a course module",
    }
}

fn base_prompt(request: &GenerationRequest) -> String {
    let mut out = format!(
        "Generate {} with the following specification:\n\nTopic: {}\n",
        kind_phrase(request.kind),
        request.topic
    );
    let count_key = request.kind.count_parameter();
    for (key, value) in &request.parameters {
        if key == count_key || key == "num_items" {
            continue;
        }
        out.push_str(&format!("{}: {value}\n", key.replace('_', " ")));
    }
    out.push_str(&format!(
        "Number of {}: {}\n",
        request.kind.item_noun(),
        request.requested_count()
    ));
    out
}

fn test_format_instructions(request: &GenerationRequest) -> Option<&'static str> {
    if request.kind != ContentKind::Test {
        return None;
    }
    match request.test_format() {
        TestFormat::TextBased => Some(
            "Every question MUST be text-based. Include `question` and `expected_answer` for each. \
DO NOT include `options` or `correct_answer`. Set `type` to `text_based`.",
        ),
        TestFormat::MultipleChoice => Some(
            "Every question MUST include `question`, `options` (array) and `correct_answer`. \
Set `type` to `multiple_choice`.",
        ),
        TestFormat::Unspecified => None,
    }
}

/// Prompt for a backend-calling generation tier.
///
/// Returns `None` for the static fallback, which never calls the backend.
pub fn generation_prompt(request: &GenerationRequest, tier: Tier) -> Option<String> {
    match tier {
        Tier::SchemaGuided => {
            let mut prompt = base_prompt(request);
            prompt.push('\n');
            if let Some(extra) = test_format_instructions(request) {
                prompt.push_str(extra);
                prompt.push('\n');
            }
            prompt.push_str(&request.schema.format_instructions());
            Some(prompt)
        }
        Tier::StrictSchema => {
            let mut prompt = base_prompt(request);
            prompt.push('\n');
            prompt.push_str(STRICT_JSON_INSTRUCTIONS);
            prompt.push('\n');
            if let Some(extra) = test_format_instructions(request) {
                prompt.push_str(extra);
                prompt.push('\n');
            }
            prompt.push_str(&request.schema.format_instructions());
            Some(prompt)
        }
        Tier::HeuristicText => Some(format!(
            "Generate {} {} about {}. Return a simple numbered list (1., 2., 3., ...), \
one entry per item, with any details on the lines below each entry. \
Do not include any introductory line.",
            request.requested_count(),
            request.kind.item_noun(),
            request.topic
        )),
        Tier::StaticFallback => None,
    }
}

/// Machine-readable instructions for the grading schema.
pub const GRADING_FORMAT_INSTRUCTIONS: &str = "\
Return the result as a single JSON object with these fields:
- `overall_score` (number, required): total score out of the maximum
- `breakdown` (array of objects, optional): each has `criterion` (string) and `score` (number)
- `strengths` (array of strings, optional)
- `areas_of_improvement` (array of strings, optional)
- `feedback` (string, required): detailed feedback for the student
Output ONLY valid JSON.";

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn grading_context(
    assignment: &Assignment,
    rubric: &Rubric,
    submission: &str,
    excerpt_chars: usize,
) -> String {
    let mut out = format!(
        "Grade the following assignment submission.\n\nAssignment: {}\n",
        assignment.title
    );
    for (i, q) in assignment.questions.iter().enumerate() {
        out.push_str(&format!("Question {}: {}\n", i + 1, q.question));
    }
    out.push_str("\nRubric:\n");
    for c in &rubric.criteria {
        out.push_str(&format!("- {} ({:.1}%): {}\n", c.name, c.weight, c.description));
    }
    out.push_str(&format!(
        "\nStudent submission:\n{}\n\nScore the submission out of {}.\n",
        truncate_chars(submission, excerpt_chars),
        rubric.max_score
    ));
    out
}

/// Prompt for one tier of the grading ladder.
pub fn grading_prompt(
    assignment: &Assignment,
    rubric: &Rubric,
    submission: &str,
    excerpt_chars: usize,
    tier: Tier,
) -> Option<String> {
    let context = grading_context(assignment, rubric, submission, excerpt_chars);
    match tier {
        Tier::SchemaGuided => Some(format!("{context}\n{GRADING_FORMAT_INSTRUCTIONS}")),
        Tier::StrictSchema => Some(format!(
            "{context}\n{STRICT_JSON_INSTRUCTIONS}\n{GRADING_FORMAT_INSTRUCTIONS}"
        )),
        Tier::HeuristicText => Some(format!(
            "{context}\nAnswer in plain text. State the overall score as `score/{}` \
on the first line, then give feedback.",
            rubric.max_score
        )),
        Tier::StaticFallback => None,
    }
}

/// Prompt for the submission quality sub-score (0-10 per category).
pub fn quality_prompt(assignment: &Assignment, submission: &str, excerpt_chars: usize) -> String {
    format!(
        "Analyze this submission against the assignment requirements.\n\n\
Assignment: {}\nInstructions: {}\nSubmission: {}\n\n\
Score each category from 0 to 10: completeness, relevance, depth, originality, structure.\n\
Return a single JSON object: {{\"scores\": {{\"completeness\": n, \"relevance\": n, \"depth\": n, \
\"originality\": n, \"structure\": n}}, \"overall_quality\": n}}. Output ONLY valid JSON.",
        assignment.title,
        assignment.instructions,
        truncate_chars(submission, excerpt_chars)
    )
}

/// Prompt for the critical-thinking sub-score (0-10).
pub fn critical_thinking_prompt(
    assignment: &Assignment,
    submission: &str,
    excerpt_chars: usize,
) -> String {
    let topic = assignment.topic.as_deref().unwrap_or(&assignment.title);
    format!(
        "Evaluate critical thinking in this submission about {topic}:\n\n{}\n\n\
Assess analysis depth, use of evidence, counterarguments, and whether conclusions are supported.\n\
Return a single JSON object: {{\"critical_thinking_score\": n (0-10), \"strengths\": [..], \
\"weaknesses\": [..]}}. Output ONLY valid JSON.",
        truncate_chars(submission, excerpt_chars)
    )
}

fn bullet_list(items: &[String], default: &str) -> String {
    if items.is_empty() {
        return format!("- {default}\n");
    }
    items.iter().map(|item| format!("- {item}\n")).collect()
}

/// Prompt for freeform feedback built on critical-thinking findings.
pub fn personalized_feedback_prompt(
    submission: &str,
    strengths: &[String],
    weaknesses: &[String],
    excerpt_chars: usize,
) -> String {
    format!(
        "Generate personalized feedback for the student.\n\n\
Submission excerpt:\n{}\n\nStudent strengths:\n{}Areas for improvement:\n{}\n\
Keep it specific, actionable and encouraging, linked to the learning objectives, \
with concrete next steps.\n\
Format as: Strengths, Areas to Improve, Specific Actions, Encouragement.",
        truncate_chars(submission, excerpt_chars),
        bullet_list(strengths, "Good effort"),
        bullet_list(weaknesses, "Depth of analysis"),
    )
}

/// Prompt for rubric-based improvement suggestions, one per line.
pub fn improvements_prompt(rubric: &Rubric, submission: &str, excerpt_chars: usize) -> String {
    let criteria: Vec<String> = rubric.criteria.iter().map(|c| c.name.clone()).collect();
    format!(
        "Suggest specific improvements for this submission based on the rubric.\n\n\
Rubric criteria:\n{}\nSubmission:\n{}\n\n\
For each criterion say what works, what could be improved and which actions to take. \
Put each suggestion on its own line, most important first.",
        bullet_list(&criteria, "Overall quality"),
        truncate_chars(submission, excerpt_chars),
    )
}

/// Prompt for narrative feedback on an already scored submission.
pub fn detailed_feedback_prompt(
    assignment: &Assignment,
    submission: &str,
    score: f64,
    max_score: f64,
    excerpt_chars: usize,
) -> String {
    format!(
        "Generate detailed feedback for this assignment submission.\n\n\
Assignment: {}\nSubmission:\n{}\nScore: {score}/{max_score}\n\n\
Provide an overall assessment, strengths, areas for improvement, specific examples \
from the submission, suggested next steps and recommended learning resources.",
        assignment.title,
        truncate_chars(submission, excerpt_chars),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Question;
    use crate::rubric::build_rubric;

    #[test]
    fn schema_guided_includes_format_and_type_instructions() {
        let request = GenerationRequest::new(ContentKind::Test, "Photosynthesis")
            .with_param("test_type", "text_based")
            .with_param("difficulty", "hard")
            .with_param("num_questions", 3);
        let prompt = generation_prompt(&request, Tier::SchemaGuided).unwrap();
        assert!(prompt.contains("Topic: Photosynthesis"));
        assert!(prompt.contains("difficulty: hard"));
        assert!(prompt.contains("Number of questions: 3"));
        assert!(prompt.contains("DO NOT include `options`"));
        assert!(prompt.contains("`questions` (array of objects, required)"));
        assert!(!prompt.contains("YOU MUST RETURN"));
    }

    #[test]
    fn strict_prompt_forbids_prose() {
        let request = GenerationRequest::new(ContentKind::Assignment, "Rust");
        let prompt = generation_prompt(&request, Tier::StrictSchema).unwrap();
        assert!(prompt.contains("YOU MUST RETURN A SINGLE, VALID JSON OBJECT"));
    }

    #[test]
    fn heuristic_prompt_asks_for_numbered_list() {
        let request = GenerationRequest::new(ContentKind::FlashcardSet, "Cells")
            .with_param("num_flashcards", 8);
        let prompt = generation_prompt(&request, Tier::HeuristicText).unwrap();
        assert!(prompt.starts_with("Generate 8 flashcards about Cells."));
        assert!(generation_prompt(&request, Tier::StaticFallback).is_none());
    }

    #[test]
    fn grading_prompt_truncates_submission() {
        let assignment = Assignment::new("Essay", vec![Question::from_text("Discuss")]);
        let rubric = build_rubric(&assignment);
        let long = "é".repeat(50);
        let prompt = grading_prompt(&assignment, &rubric, &long, 10, Tier::SchemaGuided).unwrap();
        assert!(prompt.contains(&"é".repeat(10)));
        assert!(!prompt.contains(&"é".repeat(11)));
        assert!(prompt.contains("`overall_score`"));
    }

    #[test]
    fn feedback_prompts_fall_back_to_defaults() {
        let prompt = personalized_feedback_prompt("essay", &[], &["No sources".into()], 100);
        assert!(prompt.contains("- Good effort"));
        assert!(prompt.contains("- No sources"));

        let assignment = Assignment::new("Essay", vec![Question::from_text("Discuss")]);
        let rubric = build_rubric(&assignment);
        let prompt = improvements_prompt(&rubric, "essay", 100);
        assert!(prompt.starts_with("Suggest specific improvements"));
        assert!(prompt.contains("- Q1: Discuss"));

        let prompt = detailed_feedback_prompt(&assignment, "essay", 72.5, 100.0, 100);
        assert!(prompt.contains("Score: 72.5/100"));
    }
}
