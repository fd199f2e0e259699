use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::align::AlignmentResult;
use crate::api::SubmitTestRequest;
use crate::definition::TestDefinition;
use crate::error::{AssessError, Result};
use crate::evaluation::{evaluate, EngineConfig, EvaluationInput, EvaluationResult};
use crate::keystroke::{EventKind, KeystrokeEvent, Recorder};

/// Monotonic millisecond source. Deadlines are checked against this rather
/// than by counting ticks, so a stalled tick loop cannot extend a test.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Hand-driven clock for tests and replays. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "lowercase")]
pub enum SessionState {
    #[strum(serialize = "not started")]
    NotStarted,
    Running,
    Submitted,
    Expired,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Submitted | SessionState::Expired)
    }
}

/// One candidate's single attempt at one test.
///
/// Only two things change a session: appending keystrokes while it is
/// running, and the one transition into a terminal state, which is also when
/// it gets scored.
#[derive(Debug)]
pub struct TestSession<C: Clock = MonotonicClock> {
    definition: TestDefinition,
    config: EngineConfig,
    clock: C,
    state: SessionState,
    started_at_ms: Option<u64>,
    ended_at_ms: Option<u64>,
    recorder: Recorder,
    caret: usize,
    dropped_inputs: usize,
    alignment: Option<AlignmentResult>,
    evaluation: Option<EvaluationResult>,
}

impl TestSession<MonotonicClock> {
    pub fn with_defaults(definition: TestDefinition) -> Result<Self> {
        Self::new(definition, EngineConfig::default(), MonotonicClock::new())
    }
}

impl<C: Clock> TestSession<C> {
    pub fn new(definition: TestDefinition, config: EngineConfig, clock: C) -> Result<Self> {
        definition.validate()?;
        Ok(Self {
            definition,
            config,
            clock,
            state: SessionState::NotStarted,
            started_at_ms: None,
            ended_at_ms: None,
            recorder: Recorder::new(),
            caret: 0,
            dropped_inputs: 0,
            alignment: None,
            evaluation: None,
        })
    }

    pub fn definition(&self) -> &TestDefinition {
        &self.definition
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn events(&self) -> &[KeystrokeEvent] {
        self.recorder.events()
    }

    pub fn current_text(&self) -> String {
        self.recorder.text()
    }

    pub fn typed_len(&self) -> usize {
        self.recorder.len()
    }

    pub fn caret(&self) -> usize {
        self.caret
    }

    pub fn dropped_inputs(&self) -> usize {
        self.dropped_inputs
    }

    pub fn alignment(&self) -> Option<&AlignmentResult> {
        self.alignment.as_ref()
    }

    pub fn evaluation(&self) -> Option<&EvaluationResult> {
        self.evaluation.as_ref()
    }

    pub fn has_started(&self) -> bool {
        self.state != SessionState::NotStarted
    }

    pub fn has_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Milliseconds since `start()`, frozen once the session has ended
    pub fn elapsed_ms(&self) -> u64 {
        match (self.started_at_ms, self.ended_at_ms) {
            (Some(start), Some(end)) => end.saturating_sub(start),
            (Some(start), None) => self.clock.now_ms().saturating_sub(start),
            _ => 0,
        }
    }

    /// Time left before the deadline, while running
    pub fn remaining_ms(&self) -> Option<u64> {
        (self.state == SessionState::Running)
            .then(|| self.definition.time_limit_ms().saturating_sub(self.elapsed_ms()))
    }

    fn deadline_passed(&self) -> bool {
        self.elapsed_ms() >= self.definition.time_limit_ms()
    }

    pub fn start(&mut self) -> Result<()> {
        if self.state != SessionState::NotStarted {
            return Err(AssessError::InvalidStateTransition {
                from: self.state,
                operation: "start",
            });
        }
        self.started_at_ms = Some(self.clock.now_ms());
        self.state = SessionState::Running;
        tracing::info!(
            test_id = %self.definition.id,
            time_limit_s = self.definition.time_limit_seconds,
            "session started"
        );
        Ok(())
    }

    /// Append an already-stamped event. Only legal while running; anything
    /// else is dropped, counted, and reported as a state error.
    pub fn record_keystroke(&mut self, event: KeystrokeEvent) -> Result<()> {
        self.poll_deadline();
        if self.state != SessionState::Running {
            self.dropped_inputs += 1;
            tracing::warn!(
                test_id = %self.definition.id,
                state = %self.state,
                kind = %event.kind,
                "keystroke dropped"
            );
            return Err(AssessError::InvalidStateTransition {
                from: self.state,
                operation: "record a keystroke in",
            });
        }

        let caret = match event.kind {
            EventKind::Insert => event.caret_position + event.char_len(),
            EventKind::Delete | EventKind::Caret => event.caret_position,
        };
        self.recorder.record(event)?;
        self.caret = caret;
        Ok(())
    }

    fn stamp(&self) -> u64 {
        // never stamp earlier than the last accepted event
        self.elapsed_ms()
            .max(self.recorder.last_timestamp_ms().unwrap_or(0))
    }

    /// Insert `text` at the caret
    pub fn type_text(&mut self, text: &str) -> Result<()> {
        let event = KeystrokeEvent::insert(self.stamp(), self.caret, text);
        self.record_keystroke(event)
    }

    /// Remove the character before the caret. Nothing is recorded at the
    /// start of the text.
    pub fn backspace(&mut self) -> Result<()> {
        match self.caret.checked_sub(1).and_then(|i| self.recorder.char_at(i)) {
            Some(c) if self.state == SessionState::Running => {
                let event = KeystrokeEvent::delete(self.stamp(), self.caret - 1, c.to_string());
                self.record_keystroke(event)
            }
            _ => self.ensure_running("delete in"),
        }
    }

    /// Remove the character under the caret
    pub fn delete_forward(&mut self) -> Result<()> {
        match self.recorder.char_at(self.caret) {
            Some(c) if self.state == SessionState::Running => {
                let event = KeystrokeEvent::delete(self.stamp(), self.caret, c.to_string());
                self.record_keystroke(event)
            }
            _ => self.ensure_running("delete in"),
        }
    }

    /// Move the caret, clamped to the text. Recorded even though the text is
    /// unchanged.
    pub fn move_caret(&mut self, position: usize) -> Result<()> {
        let position = position.min(self.recorder.len());
        if position == self.caret && self.state == SessionState::Running {
            return Ok(());
        }
        let event = KeystrokeEvent::caret(self.stamp(), position);
        self.record_keystroke(event)
    }

    fn ensure_running(&mut self, operation: &'static str) -> Result<()> {
        self.poll_deadline();
        if self.state == SessionState::Running {
            return Ok(());
        }
        self.dropped_inputs += 1;
        Err(AssessError::InvalidStateTransition {
            from: self.state,
            operation,
        })
    }

    /// End the test early at the candidate's request. Past the deadline the
    /// session expires instead, is still scored, and the submit is refused.
    pub fn submit(&mut self) -> Result<&EvaluationResult> {
        if self.state != SessionState::Running {
            return Err(AssessError::InvalidStateTransition {
                from: self.state,
                operation: "submit",
            });
        }
        if self.deadline_passed() {
            self.finish(SessionState::Expired);
            return Err(AssessError::InvalidStateTransition {
                from: SessionState::Expired,
                operation: "submit",
            });
        }
        Ok(self.finish(SessionState::Submitted))
    }

    /// Close the session at its deadline and score whatever was typed
    pub fn expire(&mut self) -> Result<&EvaluationResult> {
        if self.state != SessionState::Running {
            return Err(AssessError::InvalidStateTransition {
                from: self.state,
                operation: "expire",
            });
        }
        if !self.deadline_passed() {
            return Err(AssessError::DeadlineNotReached {
                remaining_ms: self.remaining_ms().unwrap_or(0),
            });
        }
        Ok(self.finish(SessionState::Expired))
    }

    /// Tick hook: expire the session if its deadline has passed. Returns true
    /// when this call ended the session.
    pub fn poll_deadline(&mut self) -> bool {
        if self.state == SessionState::Running && self.deadline_passed() {
            self.finish(SessionState::Expired);
            return true;
        }
        false
    }

    fn finish(&mut self, terminal: SessionState) -> &EvaluationResult {
        let start = self.started_at_ms.unwrap_or(0);
        let limit = self.definition.time_limit_ms();
        let end = match terminal {
            SessionState::Expired => start + limit,
            _ => self.clock.now_ms().min(start + limit),
        };
        self.ended_at_ms = Some(end);
        self.state = terminal;

        let typed = self.recorder.text();
        let (alignment, result) = evaluate(
            EvaluationInput {
                reference: &self.definition.reference_text,
                typed: &typed,
                events: self.recorder.events(),
                dropped_inputs: self.dropped_inputs,
                duration_seconds: end.saturating_sub(start) as f64 / 1000.0,
            },
            &self.config,
        );

        tracing::info!(
            test_id = %self.definition.id,
            state = %terminal,
            wpm = result.wpm,
            accuracy = result.accuracy,
            flags = result.integrity_flags.len(),
            "session scored"
        );

        self.alignment = Some(alignment);
        self.evaluation.insert(result)
    }

    /// Payload for the backend, available once the session is terminal
    pub fn submission(&self) -> Option<SubmitTestRequest> {
        let evaluation = self.evaluation.clone()?;
        Some(SubmitTestRequest {
            test_id: self.definition.id.clone(),
            typed_text: self.recorder.text(),
            events: self.recorder.events().to_vec(),
            duration_seconds: evaluation.duration_seconds,
            evaluation: Some(evaluation),
        })
    }
}
