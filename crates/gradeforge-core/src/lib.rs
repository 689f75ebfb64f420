//! gradeforge-core: structured content generation and grading.
//!
//! Turns unreliable free-text backend output into typed, validated records
//! through a tiered retry ladder, and grades submissions against
//! deterministic rubrics with fairness analytics over a batch.

pub mod error;
pub mod grading;
pub mod model;
pub mod normalize;
pub mod orchestrator;
pub mod parser;
pub mod prompts;
pub mod records;
pub mod rubric;
pub mod statistics;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;
