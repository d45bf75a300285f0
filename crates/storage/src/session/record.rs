use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use exam_core::model::{
    QuestionSelection, SelectedQuestions, SelectionMetadata, SessionId, TestState,
};

/// Format version written into every record.
pub const SESSION_FORMAT_VERSION: &str = "1";

/// Key the active attempt is stored under.
pub const SESSION_KEY: &str = "exam_session";

/// Bookkeeping that travels with a persisted attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecordMetadata {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_updated: DateTime<Utc>,
    pub save_count: u32,
}

/// Persisted shape of one exam attempt.
///
/// `checksum` covers the JSON serialisation of the record with `checksum`
/// itself set to the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub version: String,
    pub test_state: TestState,
    pub selected_questions: SelectedQuestions,
    pub selection_metadata: SelectionMetadata,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
    pub metadata: RecordMetadata,
    pub checksum: String,
}

impl SessionRecord {
    /// Builds an unsealed record (empty checksum).
    #[must_use]
    pub fn new(
        session_id: SessionId,
        test_state: TestState,
        selection: &QuestionSelection,
        expires_at: DateTime<Utc>,
        metadata: RecordMetadata,
    ) -> Self {
        Self {
            session_id,
            version: SESSION_FORMAT_VERSION.to_owned(),
            test_state,
            selected_questions: selection.questions.clone(),
            selection_metadata: selection.metadata.clone(),
            expires_at,
            metadata,
            checksum: String::new(),
        }
    }

    #[must_use]
    pub fn selection(&self) -> QuestionSelection {
        QuestionSelection {
            questions: self.selected_questions.clone(),
            metadata: self.selection_metadata.clone(),
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Time left before expiry, zero once expired.
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}
