//! Translates terminal input into session operations. The session never sees
//! crossterm types; everything arrives as a keystroke event.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::error::Result;
use crate::session::{Clock, SessionState, TestSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    Continue,
    /// Candidate asked to hand in the test
    Submit,
    Quit,
}

fn start_on_first_input<C: Clock>(session: &mut TestSession<C>) -> Result<()> {
    if session.state() == SessionState::NotStarted {
        session.start()?;
    }
    Ok(())
}

pub fn apply_key<C: Clock>(session: &mut TestSession<C>, key: KeyEvent) -> Result<InputAction> {
    if key.code == KeyCode::Esc
        || (key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c'))
    {
        return Ok(InputAction::Quit);
    }

    let editing = matches!(
        key.code,
        KeyCode::Backspace | KeyCode::Delete | KeyCode::Left | KeyCode::Right | KeyCode::Home | KeyCode::End
    );
    // nothing to edit yet; these must not count as dropped input
    if editing && session.state() == SessionState::NotStarted {
        return Ok(InputAction::Continue);
    }

    match key.code {
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            start_on_first_input(session)?;
            session.type_text(&c.to_string())?;
        }
        KeyCode::Enter => {
            if session.state() == SessionState::Running {
                return Ok(InputAction::Submit);
            }
        }
        KeyCode::Backspace => session.backspace()?,
        KeyCode::Delete => session.delete_forward()?,
        KeyCode::Left => session.move_caret(session.caret().saturating_sub(1))?,
        KeyCode::Right => session.move_caret(session.caret() + 1)?,
        KeyCode::Home => session.move_caret(0)?,
        KeyCode::End => session.move_caret(session.typed_len())?,
        _ => {}
    }
    Ok(InputAction::Continue)
}

/// A bracketed paste lands as one insert, which is what the paste check looks for
pub fn apply_paste<C: Clock>(session: &mut TestSession<C>, text: &str) -> Result<()> {
    let text: String = text
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    if text.is_empty() {
        return Ok(());
    }
    start_on_first_input(session)?;
    session.type_text(&text)
}
