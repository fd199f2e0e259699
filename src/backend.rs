//! In-process `AssessmentApi`: issues generated tests and grades submissions
//! by replaying their keystroke logs, so a client-side evaluation is never
//! trusted on its own.

use std::collections::HashMap;
use std::sync::Mutex;

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::api::{
    AssessmentApi, CreateTestRequest, SubmitStatus, SubmitTestRequest, SubmitTestResponse,
};
use crate::definition::TestDefinition;
use crate::error::{AssessError, Result};
use crate::evaluation::{evaluate, EngineConfig, EvaluationInput};
use crate::integrity::FlagType;
use crate::keystroke::replay;
use crate::texts::{self, TextProfile};

#[derive(Debug)]
struct IssuedTest {
    definition: TestDefinition,
    graded: Option<SubmitTestResponse>,
}

#[derive(Debug, Default)]
pub struct LocalBackend {
    config: EngineConfig,
    tests: Mutex<HashMap<String, IssuedTest>>,
}

impl LocalBackend {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            tests: Mutex::new(HashMap::new()),
        }
    }

    /// Register a test with a caller-chosen reference text
    pub fn issue(&self, definition: TestDefinition) -> Result<TestDefinition> {
        definition.validate()?;
        let mut tests = self.lock();
        tests.insert(
            definition.id.clone(),
            IssuedTest {
                definition: definition.clone(),
                graded: None,
            },
        );
        Ok(definition)
    }

    pub fn definition(&self, test_id: &str) -> Option<TestDefinition> {
        self.lock().get(test_id).map(|t| t.definition.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, IssuedTest>> {
        // a poisoned map still holds valid data; keep serving it
        self.tests.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Opaque id for a newly issued test, `tt-` plus 12 random characters
pub fn new_test_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    let suffix: String = rng
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    format!("tt-{}", suffix.to_lowercase())
}

impl AssessmentApi for LocalBackend {
    fn create_test(&self, request: CreateTestRequest) -> Result<TestDefinition> {
        let rng = &mut rand::thread_rng();
        let reference_text = texts::generate(request.difficulty, rng)?;
        let profile = TextProfile::for_difficulty(request.difficulty);

        let definition = TestDefinition::new(
            new_test_id(rng),
            reference_text,
            request.difficulty,
            profile.time_limit_seconds,
        )
        .with_candidate(request.candidate());

        tracing::debug!(test_id = %definition.id, difficulty = %definition.difficulty, "test issued");
        self.issue(definition)
    }

    fn submit_test(&self, request: SubmitTestRequest) -> Result<SubmitTestResponse> {
        let mut tests = self.lock();
        let issued = tests
            .get_mut(&request.test_id)
            .ok_or_else(|| AssessError::UnknownTest(request.test_id.clone()))?;

        if let Some(graded) = &issued.graded {
            tracing::debug!(test_id = %request.test_id, "duplicate submission");
            return Ok(SubmitTestResponse {
                evaluation: graded.evaluation.clone(),
                status: SubmitStatus::Duplicate,
            });
        }

        let replayed = replay(&request.events)?;
        if replayed != request.typed_text {
            return Err(AssessError::Validation(
                "typed text does not match its keystroke log".into(),
            ));
        }

        let limit = issued.definition.time_limit_seconds as f64;
        if !request.duration_seconds.is_finite() || request.duration_seconds < 0.0 {
            return Err(AssessError::Validation("duration is not a valid number".into()));
        }
        // the log itself proves how long the candidate was typing
        let span = request
            .events
            .last()
            .map_or(0.0, |e| e.timestamp_ms as f64 / 1000.0);
        if request.duration_seconds < span {
            tracing::warn!(
                test_id = %request.test_id,
                claimed = request.duration_seconds,
                span,
                "duration shorter than keystroke log; using log span"
            );
        }
        let duration_seconds = request.duration_seconds.max(span).min(limit);
        // only the client knows about input it dropped
        let dropped_inputs = request
            .evaluation
            .as_ref()
            .map_or(0, |e| usize::from(e.integrity_flags.contains(&FlagType::InputDropped)));

        let (_, evaluation) = evaluate(
            EvaluationInput {
                reference: &issued.definition.reference_text,
                typed: &request.typed_text,
                events: &request.events,
                dropped_inputs,
                duration_seconds,
            },
            &self.config,
        );

        if let Some(client) = &request.evaluation {
            if (client.score - evaluation.score).abs() > 0.01 {
                tracing::warn!(
                    test_id = %request.test_id,
                    client_score = client.score,
                    server_score = evaluation.score,
                    "client evaluation disagrees with replay"
                );
            }
        }

        let response = SubmitTestResponse {
            evaluation,
            status: SubmitStatus::Accepted,
        };
        issued.graded = Some(response.clone());
        Ok(response)
    }
}
