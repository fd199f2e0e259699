use serde::{Deserialize, Serialize};

use crate::error::{AssessError, Result};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
    strum_macros::Display, clap::ValueEnum,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateInfo {
    pub name: String,
    pub cpf: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// A typing test as issued by the backend. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDefinition {
    pub id: String,
    pub reference_text: String,
    pub difficulty: Difficulty,
    pub time_limit_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_info: Option<CandidateInfo>,
}

impl TestDefinition {
    pub fn new(
        id: impl Into<String>,
        reference_text: impl Into<String>,
        difficulty: Difficulty,
        time_limit_seconds: u64,
    ) -> Self {
        Self {
            id: id.into(),
            reference_text: reference_text.into(),
            difficulty,
            time_limit_seconds,
            candidate_info: None,
        }
    }

    pub fn with_candidate(mut self, candidate: CandidateInfo) -> Self {
        self.candidate_info = Some(candidate);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(AssessError::Validation("test id is empty".into()));
        }
        if self.reference_text.trim().is_empty() {
            return Err(AssessError::Validation("reference text is empty".into()));
        }
        if self.time_limit_seconds == 0 {
            return Err(AssessError::Validation(
                "time limit must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn time_limit_ms(&self) -> u64 {
        self.time_limit_seconds.saturating_mul(1000)
    }

    pub fn reference_len(&self) -> usize {
        self.reference_text.chars().count()
    }
}
