//! Generation orchestrator: the retry ladder.
//!
//! Each request walks [`Tier::LADDER`] in order. Backend-calling tiers feed
//! the schema parser (tiers 1 and 2) or the enumeration heuristic (tier 3)
//! and then the normalizer; the first tier that yields a valid record wins.
//! The static fallback never calls the backend and always succeeds, so the
//! only error a caller can see is a [`ConfigurationError`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BackendError, ConfigurationError, TierFailure, ValidationError};
use crate::model::{AttemptOutcome, ContentKind, GenerationAttempt, GenerationRequest, Tier};
use crate::normalize::{default_envelope_keys, normalize};
use crate::parser::{record_from_items, split_enumerated, SchemaParser};
use crate::prompts::generation_prompt;
use crate::records::{
    standard_grading_scale, Assignment, CourseStructure, Criterion, Flashcard, FlashcardSet,
    Lesson, ModuleContent, PerformanceLevels, Question, Rubric, StructuredRecord, StudyPlan,
    TestPaper,
};
use crate::traits::{InvokeRequest, TextBackend, DEFAULT_SYSTEM_PROMPT};

/// Immutable settings shared by every backend call.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Model identifier passed to the backend.
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Upper bound on a single backend call.
    pub backend_timeout: Duration,
    /// Wrapper keys unwrapped before typed decoding.
    pub envelope_keys: Vec<String>,
    /// Optional system prompt override.
    pub system_prompt: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: 0.3,
            max_tokens: 4096,
            backend_timeout: Duration::from_secs(60),
            envelope_keys: default_envelope_keys(),
            system_prompt: None,
        }
    }
}

/// Result of one generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    pub request_id: Uuid,
    pub record: StructuredRecord,
    /// The tier that produced `record`.
    pub tier: Tier,
    /// Every attempt in ladder order, ending with the winning one.
    pub attempts: Vec<GenerationAttempt>,
}

/// Send one prompt to the backend, bounded by the configured timeout.
pub(crate) async fn invoke_backend(
    backend: &dyn TextBackend,
    config: &OrchestratorConfig,
    prompt: String,
) -> Result<String, BackendError> {
    let request = InvokeRequest {
        model: config.model.clone(),
        prompt,
        system_prompt: Some(
            config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        ),
        max_tokens: config.max_tokens,
        temperature: config.temperature,
    };
    tracing::debug!(
        backend = backend.name(),
        prompt_chars = request.prompt.len(),
        "invoking backend"
    );

    match tokio::time::timeout(config.backend_timeout, backend.invoke(&request)).await {
        Ok(Ok(response)) => {
            tracing::debug!(
                response_chars = response.text.len(),
                latency_ms = response.latency_ms,
                "backend responded"
            );
            Ok(response.text)
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(BackendError::Timeout(config.backend_timeout.as_secs())),
    }
}

/// Drives the generation ladder against one backend.
pub struct Orchestrator {
    backend: Arc<dyn TextBackend>,
    parser: SchemaParser,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn TextBackend>, config: OrchestratorConfig) -> Self {
        Self {
            parser: SchemaParser::new(config.envelope_keys.clone()),
            backend,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Produce a record for `request`, falling back tier by tier.
    ///
    /// Backend, parse and validation failures are recorded in the attempt
    /// log and advance the ladder. A rejected credential stops the ladder.
    #[tracing::instrument(skip_all, fields(request_id = %request.id, kind = %request.kind))]
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<Generation, ConfigurationError> {
        let mut attempts = Vec::with_capacity(Tier::LADDER.len());

        for tier in Tier::LADDER {
            let Some(prompt) = generation_prompt(request, tier) else {
                break;
            };

            let raw = match invoke_backend(self.backend.as_ref(), &self.config, prompt).await {
                Ok(text) => text,
                Err(e) => {
                    let permanent = e.is_permanent();
                    let retry_after_ms = e.retry_after_ms();
                    let failure = TierFailure::from(e);
                    if let Some(fatal) = failure.as_configuration_error() {
                        tracing::error!(%tier, "backend rejected credentials: {fatal}");
                        return Err(fatal);
                    }
                    tracing::warn!(%tier, ?retry_after_ms, "backend call failed: {failure}");
                    attempts.push(GenerationAttempt {
                        tier,
                        raw_text: None,
                        outcome: AttemptOutcome::BackendError,
                        detail: Some(failure.to_string()),
                    });
                    // Later tiers hit the same backend and model.
                    if permanent {
                        break;
                    }
                    continue;
                }
            };

            match self.interpret(request, tier, &raw) {
                Ok(record) => {
                    tracing::info!(%tier, items = record.item_count(), "generation succeeded");
                    attempts.push(GenerationAttempt {
                        tier,
                        raw_text: Some(raw),
                        outcome: AttemptOutcome::Success,
                        detail: None,
                    });
                    return Ok(Generation {
                        request_id: request.id,
                        record,
                        tier,
                        attempts,
                    });
                }
                Err(failure) => {
                    tracing::warn!(%tier, "unusable backend output: {failure}");
                    attempts.push(GenerationAttempt {
                        tier,
                        raw_text: Some(raw),
                        outcome: AttemptOutcome::ParseError,
                        detail: Some(failure.to_string()),
                    });
                }
            }
        }

        tracing::warn!(topic = %request.topic, "all backend tiers failed, using static fallback");
        attempts.push(GenerationAttempt {
            tier: Tier::StaticFallback,
            raw_text: None,
            outcome: AttemptOutcome::Success,
            detail: None,
        });
        Ok(Generation {
            request_id: request.id,
            record: static_fallback(request),
            tier: Tier::StaticFallback,
            attempts,
        })
    }

    fn interpret(
        &self,
        request: &GenerationRequest,
        tier: Tier,
        raw: &str,
    ) -> Result<StructuredRecord, TierFailure> {
        let record = match tier {
            Tier::HeuristicText => {
                record_from_items(request.kind, &request.topic, split_enumerated(raw))?
            }
            _ => self.parser.parse(raw, &request.schema)?,
        };
        if record.kind() != request.kind {
            return Err(ValidationError::KindMismatch {
                expected: request.kind,
                found: record.kind(),
            }
            .into());
        }
        Ok(normalize(record, &request.parameters)?)
    }
}

/// Deterministic one-item record for a request. Never calls the backend.
pub fn static_fallback(request: &GenerationRequest) -> StructuredRecord {
    let topic = request.topic.trim();
    let template = fallback_template(request.kind, topic);
    normalize(template.clone(), &request.parameters).unwrap_or(template)
}

fn fallback_template(kind: ContentKind, topic: &str) -> StructuredRecord {
    match kind {
        ContentKind::Assignment => {
            let mut question = Question::from_text(format!("Explain {topic}"));
            question.question_type = Some("essay".into());
            question.points = Some(20.0);
            let mut a = Assignment::new(format!("Assignment on {topic}"), vec![question]);
            a.topic = Some(topic.to_string());
            a.instructions = "Complete all questions".into();
            a.total_points = Some(100.0);
            a.estimated_time = Some(60);
            a.learning_objectives = vec![format!("Understand {topic}")];
            StructuredRecord::Assignment(a)
        }
        ContentKind::Test => {
            let mut question =
                Question::from_text(format!("Explain the key concepts of {topic}."));
            question.expected_answer = Some(format!("A clear explanation of {topic}."));
            question.points = Some(10.0);
            StructuredRecord::Test(TestPaper {
                title: Some(format!("Test on {topic}")),
                questions: vec![question],
                answers: serde_json::Map::new(),
                estimated_duration: Some(2),
            })
        }
        ContentKind::FlashcardSet => StructuredRecord::FlashcardSet(FlashcardSet {
            topic: topic.to_string(),
            flashcards: vec![Flashcard {
                front: format!("What is {topic}?"),
                back: format!("Definition of {topic}"),
                category: "definition".into(),
                difficulty: "easy".into(),
                tags: vec!["basic".into()],
            }],
            study_plan: Some(StudyPlan {
                sessions: 3,
                cards_per_session: 10,
                spaced_repetition: true,
            }),
            estimated_study_time: Some(30),
        }),
        ContentKind::Rubric => StructuredRecord::Rubric(Rubric {
            assignment_reference: None,
            title: format!("Rubric for {topic}"),
            max_score: 100.0,
            criteria: vec![Criterion {
                name: format!("Understanding of {topic}"),
                description: "Accuracy and completeness of the work".into(),
                weight: 100.0,
                performance_levels: PerformanceLevels::generic(),
            }],
            grading_scale: standard_grading_scale(),
        }),
        ContentKind::CourseStructure => StructuredRecord::CourseStructure(CourseStructure {
            title: format!("Course on {topic}"),
            modules: vec![format!("Introduction to {topic}")],
            learning_objectives: vec![format!("Understand {topic}")],
            prerequisites: vec!["Basic knowledge".into()],
            duration_hours: Some(36),
        }),
        ContentKind::Module => StructuredRecord::Module(ModuleContent {
            module_title: topic.to_string(),
            lessons: vec![Lesson {
                title: "Introduction".into(),
                content: format!("Content for {topic}"),
            }],
            activities: vec!["Discussion".into(), "Exercise".into()],
            assessments: vec!["Quiz".into(), "Assignment".into()],
            resources: vec!["Textbook".into(), "Online materials".into()],
        }),
    }
}
