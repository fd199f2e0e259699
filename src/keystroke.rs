use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What a single input event did to the typed text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Insert,
    Delete,
    /// Caret moved without changing the text (arrow keys, home/end)
    Caret,
}

/// One captured input event. Positions are character indices, not byte offsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeystrokeEvent {
    /// Milliseconds since the session started
    pub timestamp_ms: u64,
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Inserted text for `Insert`, removed text for `Delete`, empty for `Caret`
    pub text: String,
    pub caret_position: usize,
}

impl KeystrokeEvent {
    pub fn insert(timestamp_ms: u64, caret_position: usize, text: impl Into<String>) -> Self {
        Self {
            timestamp_ms,
            kind: EventKind::Insert,
            text: text.into(),
            caret_position,
        }
    }

    pub fn delete(timestamp_ms: u64, caret_position: usize, removed: impl Into<String>) -> Self {
        Self {
            timestamp_ms,
            kind: EventKind::Delete,
            text: removed.into(),
            caret_position,
        }
    }

    pub fn caret(timestamp_ms: u64, caret_position: usize) -> Self {
        Self {
            timestamp_ms,
            kind: EventKind::Caret,
            text: String::new(),
            caret_position,
        }
    }

    /// Number of characters this event inserts or removes
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn changes_text(&self) -> bool {
        self.kind != EventKind::Caret
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("event at {timestamp_ms} ms precedes the previous event at {last_ms} ms")]
    OutOfOrder { timestamp_ms: u64, last_ms: u64 },

    #[error("caret position {position} is outside the typed text (length {len})")]
    CaretOutOfRange { position: usize, len: usize },

    #[error("{kind} event carries no text")]
    EmptyText { kind: EventKind },

    #[error("caret event must not carry text")]
    CaretWithText,

    #[error("deleted text {claimed:?} does not match {actual:?} at position {position}")]
    DeleteMismatch {
        position: usize,
        claimed: String,
        actual: String,
    },
}

/// Append-only keystroke log together with the text it produces.
///
/// The log is the source of truth: the text is only ever changed by applying
/// an accepted event, so replaying `events()` always rebuilds `text()`.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    events: Vec<KeystrokeEvent>,
    text: Vec<char>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `event` against the current text, then append and apply it.
    /// A rejected event leaves the recorder untouched.
    pub fn record(&mut self, event: KeystrokeEvent) -> Result<(), RecordError> {
        if let Some(last) = self.events.last() {
            if event.timestamp_ms < last.timestamp_ms {
                return Err(RecordError::OutOfOrder {
                    timestamp_ms: event.timestamp_ms,
                    last_ms: last.timestamp_ms,
                });
            }
        }
        apply(&mut self.text, &event)?;
        self.events.push(event);
        Ok(())
    }

    pub fn events(&self) -> &[KeystrokeEvent] {
        &self.events
    }

    pub fn text(&self) -> String {
        self.text.iter().collect()
    }

    /// Length of the typed text in characters
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Character at `idx` of the typed text
    pub fn char_at(&self, idx: usize) -> Option<char> {
        self.text.get(idx).copied()
    }

    pub fn last_timestamp_ms(&self) -> Option<u64> {
        self.events.last().map(|e| e.timestamp_ms)
    }
}

/// Rebuild the typed text by applying `events` to an empty string
pub fn replay(events: &[KeystrokeEvent]) -> Result<String, RecordError> {
    let mut recorder = Recorder::new();
    for event in events {
        recorder.record(event.clone())?;
    }
    Ok(recorder.text())
}

fn apply(text: &mut Vec<char>, event: &KeystrokeEvent) -> Result<(), RecordError> {
    let position = event.caret_position;
    if position > text.len() {
        return Err(RecordError::CaretOutOfRange {
            position,
            len: text.len(),
        });
    }

    match event.kind {
        EventKind::Insert => {
            if event.text.is_empty() {
                return Err(RecordError::EmptyText { kind: event.kind });
            }
            text.splice(position..position, event.text.chars());
        }
        EventKind::Delete => {
            let count = event.char_len();
            if count == 0 {
                return Err(RecordError::EmptyText { kind: event.kind });
            }
            let end = position + count;
            if end > text.len() {
                return Err(RecordError::DeleteMismatch {
                    position,
                    claimed: event.text.clone(),
                    actual: text[position..].iter().collect(),
                });
            }
            if !text[position..end].iter().copied().eq(event.text.chars()) {
                return Err(RecordError::DeleteMismatch {
                    position,
                    claimed: event.text.clone(),
                    actual: text[position..end].iter().collect(),
                });
            }
            text.drain(position..end);
        }
        EventKind::Caret => {
            if !event.text.is_empty() {
                return Err(RecordError::CaretWithText);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    #[test]
    fn test_insert_appends_and_splices() {
        let mut rec = Recorder::new();
        rec.record(KeystrokeEvent::insert(0, 0, "hllo")).unwrap();
        rec.record(KeystrokeEvent::insert(10, 1, "e")).unwrap();

        assert_eq!(rec.text(), "hello");
        assert_eq!(rec.events().len(), 2);
    }

    #[test]
    fn test_delete_removes_matching_text() {
        let mut rec = Recorder::new();
        rec.record(KeystrokeEvent::insert(0, 0, "helxlo")).unwrap();
        rec.record(KeystrokeEvent::delete(5, 3, "x")).unwrap();

        assert_eq!(rec.text(), "hello");
    }

    #[test]
    fn test_delete_mismatch_is_rejected() {
        let mut rec = Recorder::new();
        rec.record(KeystrokeEvent::insert(0, 0, "abc")).unwrap();

        let err = rec.record(KeystrokeEvent::delete(1, 1, "x")).unwrap_err();
        assert_matches!(err, RecordError::DeleteMismatch { position: 1, .. });
        assert_eq!(rec.text(), "abc");
        assert_eq!(rec.events().len(), 1);
    }

    #[test]
    fn test_delete_past_end_is_rejected() {
        let mut rec = Recorder::new();
        rec.record(KeystrokeEvent::insert(0, 0, "ab")).unwrap();

        let err = rec.record(KeystrokeEvent::delete(1, 1, "bc")).unwrap_err();
        assert_matches!(err, RecordError::DeleteMismatch { .. });
    }

    #[test]
    fn test_caret_out_of_range() {
        let mut rec = Recorder::new();
        let err = rec.record(KeystrokeEvent::insert(0, 3, "a")).unwrap_err();
        assert_eq!(err, RecordError::CaretOutOfRange { position: 3, len: 0 });
    }

    #[test]
    fn test_out_of_order_timestamp() {
        let mut rec = Recorder::new();
        rec.record(KeystrokeEvent::insert(100, 0, "a")).unwrap();

        let err = rec.record(KeystrokeEvent::insert(50, 1, "b")).unwrap_err();
        assert_matches!(err, RecordError::OutOfOrder { timestamp_ms: 50, last_ms: 100 });
    }

    #[test]
    fn test_caret_events_are_kept_without_changing_text() {
        let mut rec = Recorder::new();
        rec.record(KeystrokeEvent::insert(0, 0, "ab")).unwrap();
        rec.record(KeystrokeEvent::caret(1, 0)).unwrap();
        rec.record(KeystrokeEvent::caret(2, 0)).unwrap();

        assert_eq!(rec.text(), "ab");
        assert_eq!(rec.events().len(), 3);
    }

    #[test]
    fn test_empty_insert_rejected() {
        let mut rec = Recorder::new();
        assert_matches!(
            rec.record(KeystrokeEvent::insert(0, 0, "")),
            Err(RecordError::EmptyText { kind: EventKind::Insert })
        );
    }

    #[test]
    fn test_multibyte_positions_are_characters() {
        let mut rec = Recorder::new();
        rec.record(KeystrokeEvent::insert(0, 0, "café")).unwrap();
        rec.record(KeystrokeEvent::delete(1, 3, "é")).unwrap();
        rec.record(KeystrokeEvent::insert(2, 3, "e")).unwrap();

        assert_eq!(rec.text(), "cafe");
    }

    #[test]
    fn test_event_wire_format() {
        let event = KeystrokeEvent::insert(42, 3, "a");
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["timestampMs"], 42);
        assert_eq!(json["type"], "INSERT");
        assert_eq!(json["caretPosition"], 3);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Type(String),
        Backspace,
        Left,
        Right,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            "[a-zé ]{1,3}".prop_map(Op::Type),
            Just(Op::Backspace),
            Just(Op::Left),
            Just(Op::Right),
        ]
    }

    proptest! {
        #[test]
        fn replay_rebuilds_the_recorded_text(ops in prop::collection::vec(op_strategy(), 0..60)) {
            let mut rec = Recorder::new();
            let mut caret = 0usize;
            for (i, op) in ops.into_iter().enumerate() {
                let ts = i as u64 * 7;
                match op {
                    Op::Type(s) => {
                        let n = s.chars().count();
                        rec.record(KeystrokeEvent::insert(ts, caret, s)).unwrap();
                        caret += n;
                    }
                    Op::Backspace if caret > 0 => {
                        let removed = rec.char_at(caret - 1).unwrap().to_string();
                        rec.record(KeystrokeEvent::delete(ts, caret - 1, removed)).unwrap();
                        caret -= 1;
                    }
                    Op::Left if caret > 0 => {
                        caret -= 1;
                        rec.record(KeystrokeEvent::caret(ts, caret)).unwrap();
                    }
                    Op::Right if caret < rec.len() => {
                        caret += 1;
                        rec.record(KeystrokeEvent::caret(ts, caret)).unwrap();
                    }
                    _ => {}
                }
            }
            prop_assert_eq!(replay(rec.events()).unwrap(), rec.text());
        }
    }
}
