use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::model::ids::QuestionId;
use crate::model::question::{Category, OPTION_COUNT};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TestStateError {
    #[error("attempt is already completed")]
    Completed,

    #[error("answer index {index} is out of range")]
    InvalidAnswerIndex { index: u8 },
}

//
// ─── SECTION ───────────────────────────────────────────────────────────────────
//

/// The three parts of the exam, in the order they are presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Anthem,
    History,
    Constitution,
}

impl Section {
    pub const ALL: [Section; 3] = [Section::Anthem, Section::History, Section::Constitution];
}

impl From<Category> for Section {
    fn from(category: Category) -> Self {
        match category {
            Category::History => Section::History,
            Category::Constitution => Section::Constitution,
        }
    }
}

//
// ─── TEST STATE ────────────────────────────────────────────────────────────────
//

/// Mutable state of one exam attempt.
///
/// Every mutation bumps `last_updated`; once `is_completed` is set the state rejects
/// further edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TestState {
    anthem_text: String,
    history_answers: BTreeMap<QuestionId, u8>,
    constitution_answers: BTreeMap<QuestionId, u8>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    start_time: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    last_updated: DateTime<Utc>,
    is_completed: bool,
    current_section: Section,
}

impl TestState {
    #[must_use]
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            anthem_text: String::new(),
            history_answers: BTreeMap::new(),
            constitution_answers: BTreeMap::new(),
            start_time: started_at,
            last_updated: started_at,
            is_completed: false,
            current_section: Section::Anthem,
        }
    }

    #[must_use]
    pub fn anthem_text(&self) -> &str {
        &self.anthem_text
    }

    #[must_use]
    pub fn answers(&self, category: Category) -> &BTreeMap<QuestionId, u8> {
        match category {
            Category::History => &self.history_answers,
            Category::Constitution => &self.constitution_answers,
        }
    }

    #[must_use]
    pub fn answer(&self, category: Category, id: QuestionId) -> Option<u8> {
        self.answers(category).get(&id).copied()
    }

    #[must_use]
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    #[must_use]
    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    #[must_use]
    pub fn current_section(&self) -> Section {
        self.current_section
    }

    /// Replaces the anthem transcription.
    ///
    /// # Errors
    ///
    /// Returns `TestStateError::Completed` once the attempt has been submitted.
    pub fn set_anthem_text(
        &mut self,
        text: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<(), TestStateError> {
        self.ensure_open()?;
        self.anthem_text = text.into();
        self.touch(at);
        Ok(())
    }

    /// Records (or overwrites) the chosen option for a question.
    ///
    /// # Errors
    ///
    /// Returns `TestStateError::InvalidAnswerIndex` for indexes outside `0..3`,
    /// or `TestStateError::Completed` once the attempt has been submitted.
    pub fn record_answer(
        &mut self,
        category: Category,
        id: QuestionId,
        index: u8,
        at: DateTime<Utc>,
    ) -> Result<(), TestStateError> {
        self.ensure_open()?;
        if usize::from(index) >= OPTION_COUNT {
            return Err(TestStateError::InvalidAnswerIndex { index });
        }
        let answers = match category {
            Category::History => &mut self.history_answers,
            Category::Constitution => &mut self.constitution_answers,
        };
        answers.insert(id, index);
        self.touch(at);
        Ok(())
    }

    /// Moves the attempt to another section.
    ///
    /// # Errors
    ///
    /// Returns `TestStateError::Completed` once the attempt has been submitted.
    pub fn set_current_section(
        &mut self,
        section: Section,
        at: DateTime<Utc>,
    ) -> Result<(), TestStateError> {
        self.ensure_open()?;
        self.current_section = section;
        self.touch(at);
        Ok(())
    }

    /// Freezes the state.
    ///
    /// # Errors
    ///
    /// Returns `TestStateError::Completed` if it was already frozen.
    pub fn complete(&mut self, at: DateTime<Utc>) -> Result<(), TestStateError> {
        self.ensure_open()?;
        self.is_completed = true;
        self.touch(at);
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), TestStateError> {
        if self.is_completed {
            Err(TestStateError::Completed)
        } else {
            Ok(())
        }
    }

    // Never move backwards: last-write-wins compares these timestamps.
    fn touch(&mut self, at: DateTime<Utc>) {
        if at > self.last_updated {
            self.last_updated = at;
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    #[test]
    fn answers_are_recorded_and_overwritten() {
        let now = fixed_now();
        let mut state = TestState::new(now);
        state
            .record_answer(Category::History, QuestionId::new(3), 1, now)
            .unwrap();
        state
            .record_answer(Category::History, QuestionId::new(3), 2, now)
            .unwrap();

        assert_eq!(state.answer(Category::History, QuestionId::new(3)), Some(2));
        assert_eq!(state.answers(Category::Constitution).len(), 0);
    }

    #[test]
    fn out_of_range_answer_is_rejected() {
        let mut state = TestState::new(fixed_now());
        let err = state
            .record_answer(Category::Constitution, QuestionId::new(1), 3, fixed_now())
            .unwrap_err();
        assert_eq!(err, TestStateError::InvalidAnswerIndex { index: 3 });
    }

    #[test]
    fn completed_state_rejects_edits() {
        let now = fixed_now();
        let mut state = TestState::new(now);
        state.complete(now).unwrap();

        assert_eq!(
            state.set_anthem_text("x", now),
            Err(TestStateError::Completed)
        );
        assert_eq!(state.complete(now), Err(TestStateError::Completed));
    }

    #[test]
    fn last_updated_never_moves_backwards() {
        let now = fixed_now();
        let mut state = TestState::new(now);
        state
            .set_anthem_text("a", now + Duration::seconds(10))
            .unwrap();
        state.set_anthem_text("ab", now).unwrap();
        assert_eq!(state.last_updated(), now + Duration::seconds(10));
    }

    #[test]
    fn serializes_with_camel_case_and_millis() {
        let now = fixed_now();
        let mut state = TestState::new(now);
        state
            .record_answer(Category::History, QuestionId::new(12), 0, now)
            .unwrap();

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["startTime"], serde_json::json!(1_700_000_000_000_i64));
        assert_eq!(json["historyAnswers"]["12"], serde_json::json!(0));
        assert_eq!(json["currentSection"], serde_json::json!("anthem"));

        let back: TestState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}
