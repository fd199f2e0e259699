use chrono::{DateTime, Local};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

use crate::api::{AssessmentApi, SubmitTestRequest, SubmitTestResponse};
use crate::app_dirs::AppDirs;
use crate::definition::TestDefinition;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    /// The backend refused the payload for a reason a retry cannot fix
    Rejected,
}

impl DeliveryStatus {
    fn from_column(value: &str) -> Self {
        match value {
            "delivered" => DeliveryStatus::Delivered,
            "rejected" => DeliveryStatus::Rejected,
            _ => DeliveryStatus::Pending,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutboxEntry {
    pub test_id: String,
    /// The test as issued, so a later run can deliver without the original backend state
    pub definition: TestDefinition,
    pub request: SubmitTestRequest,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub queued_at: DateTime<Local>,
}

#[derive(Debug, Default)]
pub struct DeliveryReport {
    pub delivered: Vec<(String, SubmitTestResponse)>,
    pub failed: Vec<(String, String)>,
}

/// Durable queue of evaluated submissions awaiting delivery.
///
/// A payload is written here before the first delivery attempt and stays
/// until the backend accepts it, so a failed submit never loses typed work.
#[derive(Debug)]
pub struct SubmissionOutbox {
    conn: Connection,
}

impl SubmissionOutbox {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    /// Outbox under the application state directory
    pub fn open_default() -> Result<Self> {
        let path = AppDirs::outbox_path().unwrap_or_else(|| PathBuf::from("keytest_outbox.db"));
        Self::open(path)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS outbox (
                test_id TEXT PRIMARY KEY,
                definition TEXT NOT NULL,
                payload TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                queued_at TEXT NOT NULL,
                delivered_at TEXT
            )
            "#,
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_outbox_status ON outbox(status)",
            [],
        )?;
        Ok(Self { conn })
    }

    /// Queue a payload. Returns false when this test is already queued; the
    /// first payload stands.
    pub fn enqueue(&self, definition: &TestDefinition, request: &SubmitTestRequest) -> Result<bool> {
        let definition = serde_json::to_string(definition)?;
        let payload = serde_json::to_string(request)?;
        let inserted = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO outbox (test_id, definition, payload, queued_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![request.test_id, definition, payload, Local::now().to_rfc3339()],
        )?;
        if inserted > 0 {
            tracing::debug!(test_id = %request.test_id, "submission queued");
        }
        Ok(inserted > 0)
    }

    pub fn get(&self, test_id: &str) -> Result<Option<OutboxEntry>> {
        let raw = self
            .conn
            .query_row(
                r#"
                SELECT test_id, definition, payload, status, attempts, last_error, queued_at
                FROM outbox WHERE test_id = ?1
                "#,
                [test_id],
                read_row,
            )
            .optional()?;
        raw.map(RawEntry::into_entry).transpose()
    }

    pub fn pending(&self) -> Result<Vec<OutboxEntry>> {
        self.by_status(DeliveryStatus::Pending)
    }

    pub fn by_status(&self, status: DeliveryStatus) -> Result<Vec<OutboxEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT test_id, definition, payload, status, attempts, last_error, queued_at
            FROM outbox WHERE status = ?1
            ORDER BY queued_at ASC
            "#,
        )?;
        let rows = stmt.query_map([status.to_string()], read_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.into_entry()?);
        }
        Ok(entries)
    }

    /// Try every pending payload once. Transport failures stay pending for
    /// the next run; other failures are parked as rejected.
    pub fn deliver_pending<A: AssessmentApi>(&self, api: &A) -> Result<DeliveryReport> {
        let mut report = DeliveryReport::default();

        for entry in self.pending()? {
            match api.submit_test(entry.request.clone()) {
                Ok(response) => {
                    self.conn.execute(
                        r#"
                        UPDATE outbox
                        SET status = 'delivered', attempts = attempts + 1,
                            last_error = NULL, delivered_at = ?2
                        WHERE test_id = ?1
                        "#,
                        params![entry.test_id, Local::now().to_rfc3339()],
                    )?;
                    tracing::info!(test_id = %entry.test_id, status = %response.status, "submission delivered");
                    report.delivered.push((entry.test_id, response));
                }
                Err(err) => {
                    let status = if err.is_retryable() {
                        DeliveryStatus::Pending
                    } else {
                        DeliveryStatus::Rejected
                    };
                    self.conn.execute(
                        r#"
                        UPDATE outbox
                        SET status = ?2, attempts = attempts + 1, last_error = ?3
                        WHERE test_id = ?1
                        "#,
                        params![entry.test_id, status.to_string(), err.to_string()],
                    )?;
                    tracing::warn!(test_id = %entry.test_id, error = %err, %status, "submission not delivered");
                    report.failed.push((entry.test_id, err.to_string()));
                }
            }
        }

        Ok(report)
    }
}

struct RawEntry {
    test_id: String,
    definition: String,
    payload: String,
    status: String,
    attempts: u32,
    last_error: Option<String>,
    queued_at: String,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok(RawEntry {
        test_id: row.get(0)?,
        definition: row.get(1)?,
        payload: row.get(2)?,
        status: row.get(3)?,
        attempts: row.get(4)?,
        last_error: row.get(5)?,
        queued_at: row.get(6)?,
    })
}

impl RawEntry {
    fn into_entry(self) -> Result<OutboxEntry> {
        let queued_at = match DateTime::parse_from_rfc3339(&self.queued_at) {
            Ok(dt) => dt.with_timezone(&Local),
            Err(e) => {
                tracing::warn!(
                    test_id = %self.test_id,
                    value = %self.queued_at,
                    error = %e,
                    "unreadable queued_at; using now"
                );
                Local::now()
            }
        };
        Ok(OutboxEntry {
            definition: serde_json::from_str(&self.definition)?,
            request: serde_json::from_str(&self.payload)?,
            status: DeliveryStatus::from_column(&self.status),
            test_id: self.test_id,
            attempts: self.attempts,
            last_error: self.last_error,
            queued_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{CreateTestRequest, SubmitStatus};
    use crate::backend::LocalBackend;
    use crate::definition::{Difficulty, TestDefinition};
    use crate::error::AssessError;
    use crate::keystroke::KeystrokeEvent;
    use std::cell::Cell;
    use tempfile::tempdir;

    /// Fails with a transport error a fixed number of times, then delegates
    struct FlakyApi {
        inner: LocalBackend,
        failures_left: Cell<u32>,
    }

    impl AssessmentApi for FlakyApi {
        fn create_test(&self, request: CreateTestRequest) -> Result<TestDefinition> {
            self.inner.create_test(request)
        }

        fn submit_test(&self, request: SubmitTestRequest) -> Result<SubmitTestResponse> {
            if self.failures_left.get() > 0 {
                self.failures_left.set(self.failures_left.get() - 1);
                return Err(AssessError::Network("connection reset".into()));
            }
            self.inner.submit_test(request)
        }
    }

    fn payload(test_id: &str) -> SubmitTestRequest {
        SubmitTestRequest {
            test_id: test_id.into(),
            typed_text: "hi".into(),
            events: vec![
                KeystrokeEvent::insert(0, 0, "h"),
                KeystrokeEvent::insert(130, 1, "i"),
            ],
            duration_seconds: 3.0,
            evaluation: None,
        }
    }

    fn definition() -> TestDefinition {
        TestDefinition::new("t-1", "hi", Difficulty::Easy, 30)
    }

    fn backend_with(test_id: &str) -> LocalBackend {
        let backend = LocalBackend::default();
        backend
            .issue(TestDefinition::new(test_id, "hi", Difficulty::Easy, 30))
            .unwrap();
        backend
    }

    #[test]
    fn test_enqueue_is_idempotent() {
        let outbox = SubmissionOutbox::open_in_memory().unwrap();
        assert!(outbox.enqueue(&definition(), &payload("t-1")).unwrap());
        assert!(!outbox.enqueue(&definition(), &payload("t-1")).unwrap());
        assert_eq!(outbox.pending().unwrap().len(), 1);
    }

    #[test]
    fn test_network_failure_keeps_payload_pending() {
        let outbox = SubmissionOutbox::open_in_memory().unwrap();
        outbox.enqueue(&definition(), &payload("t-1")).unwrap();
        let api = FlakyApi {
            inner: backend_with("t-1"),
            failures_left: Cell::new(2),
        };

        for attempt in 1..=2 {
            let report = outbox.deliver_pending(&api).unwrap();
            assert!(report.delivered.is_empty());
            assert_eq!(report.failed.len(), 1);
            let entry = outbox.get("t-1").unwrap().unwrap();
            assert_eq!(entry.status, DeliveryStatus::Pending);
            assert_eq!(entry.attempts, attempt);
            assert!(entry.last_error.unwrap().contains("connection reset"));
        }

        let report = outbox.deliver_pending(&api).unwrap();
        assert_eq!(report.delivered.len(), 1);
        assert_eq!(report.delivered[0].1.status, SubmitStatus::Accepted);

        let entry = outbox.get("t-1").unwrap().unwrap();
        assert_eq!(entry.status, DeliveryStatus::Delivered);
        assert_eq!(entry.request, payload("t-1"));
        assert!(outbox.pending().unwrap().is_empty());
    }

    #[test]
    fn test_non_retryable_failure_is_parked() {
        let outbox = SubmissionOutbox::open_in_memory().unwrap();
        outbox.enqueue(&definition(), &payload("unknown")).unwrap();

        let report = outbox.deliver_pending(&LocalBackend::default()).unwrap();
        assert_eq!(report.failed.len(), 1);
        assert!(outbox.pending().unwrap().is_empty());
        assert_eq!(outbox.by_status(DeliveryStatus::Rejected).unwrap().len(), 1);
    }

    #[test]
    fn test_outbox_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("outbox.db");
        {
            let outbox = SubmissionOutbox::open(&path).unwrap();
            outbox.enqueue(&definition(), &payload("t-7")).unwrap();
        }
        let outbox = SubmissionOutbox::open(&path).unwrap();
        let pending = outbox.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].test_id, "t-7");
        assert_eq!(pending[0].attempts, 0);
        assert_eq!(pending[0].definition, definition());
    }

    #[test]
    fn test_fresh_backend_can_take_stored_definitions() {
        let outbox = SubmissionOutbox::open_in_memory().unwrap();
        outbox.enqueue(&definition(), &payload("t-1")).unwrap();

        let backend = LocalBackend::default();
        for entry in outbox.pending().unwrap() {
            backend.issue(entry.definition).unwrap();
        }
        let report = outbox.deliver_pending(&backend).unwrap();
        assert_eq!(report.delivered.len(), 1);
        assert!(report.failed.is_empty());
    }

    #[test]
    fn test_missing_entry() {
        let outbox = SubmissionOutbox::open_in_memory().unwrap();
        assert!(outbox.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_unreadable_queued_at_still_loads() {
        let outbox = SubmissionOutbox::open_in_memory().unwrap();
        assert!(outbox.enqueue(&definition(), &payload("t-1")).unwrap());
        outbox
            .conn
            .execute("UPDATE outbox SET queued_at = 'yesterday' WHERE test_id = 't-1'", [])
            .unwrap();

        let before = Local::now();
        let entry = outbox.get("t-1").unwrap().unwrap();
        assert_eq!(entry.status, DeliveryStatus::Pending);
        assert!(entry.queued_at >= before);
        assert_eq!(outbox.pending().unwrap().len(), 1);
    }
}
