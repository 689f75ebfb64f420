//! The `gradeforge fairness` command.

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use gradeforge_core::statistics::{fairness, FairnessReport};

fn parse_scores(raw: &str) -> Result<Vec<f64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let score: f64 = s.parse().with_context(|| format!("invalid score '{s}'"))?;
            anyhow::ensure!(score.is_finite(), "invalid score '{s}'");
            Ok(score)
        })
        .collect()
}

pub fn execute(scores: &str, format: &str) -> Result<()> {
    let scores = parse_scores(scores)?;
    let report = fairness(&scores);

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_fairness(&report);
    }
    Ok(())
}

pub fn print_fairness(report: &FairnessReport) {
    let mut table = Table::new();
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec![Cell::new("Sample size"), Cell::new(report.sample_size)]);
    table.add_row(vec![Cell::new("Mean"), Cell::new(format!("{:.2}", report.mean))]);
    table.add_row(vec![Cell::new("Std dev"), Cell::new(format!("{:.3}", report.std_dev))]);
    table.add_row(vec![
        Cell::new("Coefficient of variation"),
        Cell::new(format!("{:.4}", report.coefficient_of_variation)),
    ]);
    table.add_row(vec![
        Cell::new("Fairness score"),
        Cell::new(format!("{:.3}", report.fairness_score)),
    ]);
    if let Some((low, high)) = report.range {
        table.add_row(vec![Cell::new("Range"), Cell::new(format!("{low:.1} - {high:.1}"))]);
    }
    println!("{table}");

    if report.potential_bias_flags.is_empty() {
        println!("No bias flags");
    } else {
        for flag in &report.potential_bias_flags {
            println!("Flag: {flag}");
        }
    }
    for r in &report.recommendations {
        println!("  * {r}");
    }
}
