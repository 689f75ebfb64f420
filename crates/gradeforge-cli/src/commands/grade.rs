//! The `gradeforge grade` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use gradeforge_core::grading::{
    BatchReport, BatchSubmission, ComprehensiveGrade, DetailedFeedback, GradeResult,
    GradingEngine,
};
use gradeforge_core::records::Assignment;
use gradeforge_providers::config::load_config_from;

use super::fairness::print_fairness;

pub struct GradeArgs {
    pub assignment: PathBuf,
    pub submission: Option<PathBuf>,
    pub batch: Option<PathBuf>,
    pub comprehensive: bool,
    pub detailed: bool,
    pub format: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub config: Option<PathBuf>,
}

/// Read an assignment from either a bare record or a `generate` result.
fn load_assignment(path: &Path) -> Result<Assignment> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read assignment: {}", path.display()))?;
    let mut value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse assignment JSON: {}", path.display()))?;
    if let Some(record) = value.get_mut("record").map(serde_json::Value::take) {
        value = record;
    }
    if let Some(kind) = value.get("kind").and_then(|k| k.as_str()) {
        anyhow::ensure!(
            kind == "assignment",
            "{} holds a {kind} record, not an assignment",
            path.display()
        );
    }
    serde_json::from_value(value)
        .with_context(|| format!("not a valid assignment: {}", path.display()))
}

fn load_batch(path: &Path) -> Result<Vec<BatchSubmission>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read batch: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse batch JSON: {}", path.display()))
}

pub async fn execute(args: GradeArgs) -> Result<()> {
    let assignment = load_assignment(&args.assignment)?;

    let config = load_config_from(args.config.as_deref())?;
    let backend = config.backend(args.provider.as_deref())?;
    let engine = GradingEngine::new(
        backend,
        config.orchestrator_config(args.model.as_deref()),
        config.grading_config(),
    );
    let json = args.format == "json";

    if let Some(batch_path) = &args.batch {
        let submissions = load_batch(batch_path)?;
        let report = engine.grade_batch(&assignment, &submissions).await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_batch(&report);
        }
        return Ok(());
    }

    let Some(submission_path) = &args.submission else {
        anyhow::bail!("either --submission or --batch is required");
    };
    let submission = std::fs::read_to_string(submission_path)
        .with_context(|| format!("failed to read submission: {}", submission_path.display()))?;

    let (basic, comprehensive) = if args.comprehensive {
        let grade = engine.comprehensive_grade(&assignment, &submission).await?;
        (grade.basic.clone(), Some(grade))
    } else {
        (engine.grade(&assignment, &submission).await?, None)
    };

    let detailed = if args.detailed && !basic.needs_manual_review {
        Some(
            engine
                .generate_detailed_feedback(&assignment, &submission, basic.score)
                .await?,
        )
    } else {
        None
    };

    if json {
        let output = serde_json::json!({
            "grade": basic,
            "comprehensive": comprehensive,
            "detailed_feedback": detailed,
            "submission_update": basic.submission_update(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_grade(&basic);
        if let Some(grade) = &comprehensive {
            print_comprehensive(grade);
        }
        if let Some(feedback) = &detailed {
            print_detailed(feedback);
        }
    }

    Ok(())
}

fn print_grade(grade: &GradeResult) {
    let breakdown = grade.score_breakdown();
    println!(
        "Score: {:.1}/{:.1} ({:.2}%)  Grade: {}  Level: {}",
        breakdown.raw_score,
        breakdown.max_score,
        breakdown.percentage,
        breakdown.letter_grade,
        breakdown.performance_level
    );
    println!("Graded via {}", grade.source);
    if grade.needs_manual_review {
        println!("Needs manual review");
    }

    if !grade.breakdown.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Criterion", "Score", "Max"]);
        for row in &grade.breakdown {
            table.add_row(vec![
                Cell::new(&row.criterion),
                Cell::new(format!("{:.1}", row.score)),
                Cell::new(format!("{:.1}", row.max_score)),
            ]);
        }
        println!("{table}");
    }

    if !grade.feedback.is_empty() {
        println!("\nFeedback:\n{}", grade.feedback);
    }
    for s in &grade.strengths {
        println!("  + {s}");
    }
    for a in &grade.areas_of_improvement {
        println!("  - {a}");
    }
}

fn print_comprehensive(grade: &ComprehensiveGrade) {
    let mut table = Table::new();
    table.set_header(vec!["Component", "Score"]);
    let rows = [
        ("Basic (0-100)", grade.basic_score),
        ("Quality (0-10)", grade.quality_score),
        ("Critical thinking (0-10)", grade.critical_thinking_score),
        ("Composite", grade.composite_score),
    ];
    for (component, score) in rows {
        table.add_row(vec![Cell::new(component), Cell::new(format!("{score:.1}"))]);
    }
    println!("\n{table}");

    let insights = &grade.learning_insights;
    if !insights.strength_areas.is_empty() {
        println!("Strength areas: {}", insights.strength_areas.join(", "));
    }
    if !insights.growth_areas.is_empty() {
        println!("Growth areas: {}", insights.growth_areas.join(", "));
    }
    for r in &insights.recommended_resources {
        println!("Recommended: {r}");
    }

    let levels = &grade.improvements.priority_levels;
    for (priority, suggestions) in [
        ("high", &levels.high),
        ("medium", &levels.medium),
        ("low", &levels.low),
    ] {
        for s in suggestions {
            println!("  [{priority}] {s}");
        }
    }
    if let Some(feedback) = &grade.personalized_feedback {
        println!("\nPersonalized feedback:\n{feedback}");
    }

    let plagiarism = &grade.plagiarism;
    println!("\nCopy-pattern score: {:.1}", plagiarism.score);
    for w in &plagiarism.warnings {
        println!("  ! {w}");
    }
    if plagiarism.needs_review {
        println!("Copy patterns warrant a manual look");
    }
    if grade.needs_manual_review {
        println!("Needs manual review");
    }
}

fn print_detailed(feedback: &DetailedFeedback) {
    match &feedback.detailed_feedback {
        Some(text) => println!("\nDetailed feedback:\n{text}"),
        None => println!("\nDetailed feedback unavailable"),
    }
}

fn print_batch(report: &BatchReport) {
    let mut table = Table::new();
    table.set_header(vec!["Submission", "Score", "Grade", "Rank", "Percentile", "Relative"]);
    for entry in &report.entries {
        let (rank, percentile, relative) = match &entry.standing {
            Some(s) => (
                s.rank.to_string(),
                format!("{:.1}", s.percentile),
                s.relative_performance.to_string(),
            ),
            None => ("-".into(), "-".into(), "-".into()),
        };
        table.add_row(vec![
            Cell::new(&entry.submission_id),
            Cell::new(format!("{:.1}", entry.grade.score)),
            Cell::new(entry.grade.letter_grade.to_string()),
            Cell::new(rank),
            Cell::new(percentile),
            Cell::new(relative),
        ]);
    }
    println!("{table}");

    if !report.skipped.is_empty() {
        println!("Skipped (blank): {}", report.skipped.join(", "));
    }
    print_fairness(&report.fairness);
}
