use serde::{Deserialize, Serialize};

use crate::definition::{CandidateInfo, Difficulty, TestDefinition};
use crate::error::Result;
use crate::evaluation::EvaluationResult;
use crate::keystroke::KeystrokeEvent;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTestRequest {
    pub difficulty: Difficulty,
    pub candidate_name: String,
    pub candidate_cpf: Option<String>,
    pub candidate_email: Option<String>,
    pub candidate_phone: Option<String>,
}

impl CreateTestRequest {
    pub fn candidate(&self) -> CandidateInfo {
        CandidateInfo {
            name: self.candidate_name.clone(),
            cpf: self.candidate_cpf.clone(),
            email: self.candidate_email.clone(),
            phone: self.candidate_phone.clone(),
        }
    }
}

/// Everything the backend needs to verify an attempt. Immutable once built,
/// so resending it after a failed delivery is safe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTestRequest {
    pub test_id: String,
    pub typed_text: String,
    pub events: Vec<KeystrokeEvent>,
    pub duration_seconds: f64,
    /// The client's own scoring, for comparison
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "lowercase")]
pub enum SubmitStatus {
    Accepted,
    /// Same test submitted again; the first evaluation stands
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTestResponse {
    pub evaluation: EvaluationResult,
    pub status: SubmitStatus,
}

/// A submission saved next to the text it was typed against, so it can be
/// scored again offline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedSubmission {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_seconds: Option<u64>,
    #[serde(flatten)]
    pub submission: SubmitTestRequest,
}

/// The two calls the engine makes to whatever issues and grades tests
pub trait AssessmentApi {
    fn create_test(&self, request: CreateTestRequest) -> Result<TestDefinition>;
    fn submit_test(&self, request: SubmitTestRequest) -> Result<SubmitTestResponse>;
}

impl<T: AssessmentApi + ?Sized> AssessmentApi for &T {
    fn create_test(&self, request: CreateTestRequest) -> Result<TestDefinition> {
        (**self).create_test(request)
    }

    fn submit_test(&self, request: SubmitTestRequest) -> Result<SubmitTestResponse> {
        (**self).submit_test(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_wire_format() {
        let json = r#"{
            "difficulty": "EASY",
            "candidateName": "Ana",
            "candidateCpf": "123.456.789-00",
            "candidateEmail": "ana@example.com",
            "candidatePhone": null
        }"#;
        let req: CreateTestRequest = serde_json::from_str(json).unwrap();

        assert_eq!(req.difficulty, Difficulty::Easy);
        let candidate = req.candidate();
        assert_eq!(candidate.name, "Ana");
        assert_eq!(candidate.cpf.as_deref(), Some("123.456.789-00"));
        assert!(candidate.phone.is_none());
    }

    #[test]
    fn test_submit_request_wire_format() {
        let req = SubmitTestRequest {
            test_id: "t-9".into(),
            typed_text: "hi".into(),
            events: vec![KeystrokeEvent::insert(0, 0, "h"), KeystrokeEvent::insert(90, 1, "i")],
            duration_seconds: 1.5,
            evaluation: None,
        };
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(json["testId"], "t-9");
        assert_eq!(json["events"][1]["caretPosition"], 1);
        assert!(json.get("evaluation").is_none());

        let back: SubmitTestRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn test_recorded_submission_is_flat() {
        let json = r#"{
            "referenceText": "hi",
            "testId": "t-3",
            "typedText": "hi",
            "events": [
                {"timestampMs": 0, "type": "INSERT", "text": "h", "caretPosition": 0},
                {"timestampMs": 140, "type": "INSERT", "text": "i", "caretPosition": 1}
            ],
            "durationSeconds": 2.0
        }"#;
        let recorded: RecordedSubmission = serde_json::from_str(json).unwrap();

        assert_eq!(recorded.reference_text.as_deref(), Some("hi"));
        assert!(recorded.time_limit_seconds.is_none());
        assert_eq!(recorded.submission.test_id, "t-3");
        assert_eq!(recorded.submission.events.len(), 2);
        assert!(recorded.submission.evaluation.is_none());
    }
}
