//! Deterministic rubric construction from an assignment.

use crate::records::{standard_grading_scale, Assignment, Criterion, PerformanceLevels, Rubric};

const CRITERION_TITLE_CHARS: usize = 50;

/// Criteria used when an assignment has no questions. Weights sum to 100.
const GENERIC_CRITERIA: [(&str, f64, &str); 4] = [
    ("Content Accuracy", 40.0, "Correctness of information and concepts"),
    ("Completeness", 20.0, "Thoroughness in addressing all requirements"),
    ("Clarity & Organization", 20.0, "Clear expression and logical structure"),
    ("Critical Thinking", 20.0, "Depth of analysis and original insights"),
];

/// Build the grading rubric for an assignment. No backend call.
///
/// One criterion per question, weighted `100 / N`; an assignment without
/// questions gets the fixed four-criterion rubric.
pub fn build_rubric(assignment: &Assignment) -> Rubric {
    let criteria = if assignment.questions.is_empty() {
        GENERIC_CRITERIA
            .iter()
            .map(|(name, weight, description)| Criterion {
                name: name.to_string(),
                description: description.to_string(),
                weight: *weight,
                performance_levels: PerformanceLevels::generic(),
            })
            .collect()
    } else {
        let weight = 100.0 / assignment.questions.len() as f64;
        assignment
            .questions
            .iter()
            .enumerate()
            .map(|(i, q)| {
                let text: String = q.question.trim().chars().take(CRITERION_TITLE_CHARS).collect();
                Criterion {
                    name: format!("Q{}: {text}", i + 1),
                    description: format!(
                        "Accuracy and completeness of the answer to question {}",
                        i + 1
                    ),
                    weight,
                    performance_levels: PerformanceLevels::generic(),
                }
            })
            .collect()
    };

    Rubric {
        assignment_reference: assignment.id.clone(),
        title: format!("Rubric for {}", assignment.title),
        max_score: if assignment.max_score.is_finite() && assignment.max_score > 0.0 {
            assignment.max_score
        } else {
            100.0
        },
        criteria,
        grading_scale: standard_grading_scale(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{LetterGrade, Question};

    #[test]
    fn four_questions_give_four_equal_criteria() {
        let assignment = Assignment::new(
            "Week 3",
            (1..=4).map(|i| Question::from_text(format!("Question {i}"))).collect(),
        );
        let rubric = build_rubric(&assignment);
        assert_eq!(rubric.criteria.len(), 4);
        for c in &rubric.criteria {
            assert_eq!(c.weight, 25.0);
            assert!(!c.performance_levels.poor.is_empty());
        }
        assert_eq!(rubric.criteria[0].name, "Q1: Question 1");
    }

    #[test]
    fn weights_sum_to_hundred_for_odd_counts() {
        let assignment = Assignment::new(
            "Odd",
            (0..7).map(|i| Question::from_text(format!("q{i}"))).collect(),
        );
        let rubric = build_rubric(&assignment);
        assert!((rubric.total_weight() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn long_question_titles_are_cut_at_fifty_chars() {
        let long = "x".repeat(80);
        let rubric = build_rubric(&Assignment::new("Long", vec![Question::from_text(long)]));
        assert_eq!(rubric.criteria[0].name, format!("Q1: {}", "x".repeat(50)));
    }

    #[test]
    fn no_questions_uses_generic_rubric() {
        let rubric = build_rubric(&Assignment::new("Essay", vec![]));
        let names: Vec<_> = rubric.criteria.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Content Accuracy",
                "Completeness",
                "Clarity & Organization",
                "Critical Thinking"
            ]
        );
        assert_eq!(rubric.total_weight(), 100.0);
        assert_eq!(rubric.grading_scale[0].letter, LetterGrade::A);
        assert_eq!(rubric.grading_scale.len(), 5);
    }
}
