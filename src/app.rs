use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::error::AssessError;
use crate::input::{apply_key, apply_paste, InputAction};
use crate::runtime::AppEvent;
use crate::session::{Clock, MonotonicClock, TestSession};

/// What the front-end loop should do after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The session just reached a terminal state; hand off its submission
    Finished,
    Quit,
}

/// Front-end state: the live session plus whatever the results screen shows
/// about delivery.
#[derive(Debug)]
pub struct App<C: Clock = MonotonicClock> {
    pub session: TestSession<C>,
    pub delivery_note: Option<String>,
}

impl<C: Clock> App<C> {
    pub fn new(session: TestSession<C>) -> Self {
        Self {
            session,
            delivery_note: None,
        }
    }

    pub fn handle(&mut self, event: AppEvent) -> Flow {
        let was_finished = self.session.has_finished();

        let flow = match event {
            AppEvent::Tick => {
                self.session.poll_deadline();
                Flow::Continue
            }
            AppEvent::Resize => Flow::Continue,
            AppEvent::Paste(text) => {
                if !was_finished {
                    if let Err(e) = apply_paste(&mut self.session, &text) {
                        log_rejected_input(&e);
                    }
                }
                Flow::Continue
            }
            AppEvent::Key(key) if was_finished => results_key(key),
            AppEvent::Key(key) => match apply_key(&mut self.session, key) {
                Ok(InputAction::Continue) => Flow::Continue,
                Ok(InputAction::Quit) => Flow::Quit,
                Ok(InputAction::Submit) => {
                    if let Err(e) = self.session.submit() {
                        log_rejected_input(&e);
                    }
                    Flow::Continue
                }
                Err(e) => {
                    log_rejected_input(&e);
                    Flow::Continue
                }
            },
        };

        if !was_finished && self.session.has_finished() {
            return Flow::Finished;
        }
        flow
    }
}

fn results_key(key: KeyEvent) -> Flow {
    match key.code {
        KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q') => Flow::Quit,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Flow::Quit,
        _ => Flow::Continue,
    }
}

fn log_rejected_input(err: &AssessError) {
    match err {
        AssessError::InvalidStateTransition { .. } => tracing::debug!(error = %err, "input ignored"),
        _ => tracing::warn!(error = %err, "input rejected"),
    }
}
