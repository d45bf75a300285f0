use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::model::ids::QuestionId;

/// Number of answer options every multiple-choice question carries.
pub const OPTION_COUNT: usize = 3;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Structural problems found while loading the question bank or a persisted question set.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionBankError {
    #[error("question {id}: text cannot be empty")]
    EmptyText { id: QuestionId },

    #[error("question {id}: expected 3 options, got {count}")]
    OptionCount { id: QuestionId, count: usize },

    #[error("question {id}: option {index} is empty")]
    EmptyOption { id: QuestionId, index: usize },

    #[error("question {id}: options must be distinct")]
    DuplicateOption { id: QuestionId },

    #[error("question {id}: correct index {index} is out of range")]
    CorrectIndexOutOfRange { id: QuestionId, index: u8 },

    #[error("duplicate question id {id} in {category:?} pool")]
    DuplicateId { id: QuestionId, category: Category },

    #[error("question bank is not valid JSON: {0}")]
    Parse(String),
}

//
// ─── CATEGORY ──────────────────────────────────────────────────────────────────
//

/// Multiple-choice knowledge pools of the exam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    History,
    Constitution,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::History, Category::Constitution];
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A multiple-choice question with exactly three options.
///
/// `correct_index` always points at the option carrying the correct answer text,
/// including after the options have been shuffled for an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Question {
    id: QuestionId,
    text: String,
    options: [String; OPTION_COUNT],
    correct_index: u8,
}

impl Question {
    /// Builds a validated question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionBankError` if the text or any option is blank, options repeat,
    /// or `correct_index` does not address one of the three options.
    pub fn new(
        id: QuestionId,
        text: impl Into<String>,
        options: [String; OPTION_COUNT],
        correct_index: u8,
    ) -> Result<Self, QuestionBankError> {
        let question = Self {
            id,
            text: text.into(),
            options,
            correct_index,
        };
        question.validate()?;
        Ok(question)
    }

    /// Re-checks the structural invariants, e.g. after deserializing a persisted copy.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Question::new`].
    pub fn validate(&self) -> Result<(), QuestionBankError> {
        if self.text.trim().is_empty() {
            return Err(QuestionBankError::EmptyText { id: self.id });
        }
        for (index, option) in self.options.iter().enumerate() {
            if option.trim().is_empty() {
                return Err(QuestionBankError::EmptyOption { id: self.id, index });
            }
        }
        let distinct: HashSet<&str> = self.options.iter().map(String::as_str).collect();
        if distinct.len() != OPTION_COUNT {
            return Err(QuestionBankError::DuplicateOption { id: self.id });
        }
        if usize::from(self.correct_index) >= OPTION_COUNT {
            return Err(QuestionBankError::CorrectIndexOutOfRange {
                id: self.id,
                index: self.correct_index,
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn options(&self) -> &[String; OPTION_COUNT] {
        &self.options
    }

    #[must_use]
    pub fn correct_index(&self) -> u8 {
        self.correct_index
    }

    /// Text of the correct option.
    #[must_use]
    pub fn correct_option(&self) -> &str {
        &self.options[usize::from(self.correct_index)]
    }

    #[must_use]
    pub fn is_correct(&self, answer: u8) -> bool {
        answer == self.correct_index
    }

    /// Replaces the option layout, keeping `correct_index` on the original correct text.
    pub(crate) fn with_layout(&self, options: [String; OPTION_COUNT]) -> Self {
        let correct = self.correct_option();
        let correct_index = options
            .iter()
            .position(|option| option == correct)
            .and_then(|pos| u8::try_from(pos).ok())
            .unwrap_or(self.correct_index);
        Self {
            id: self.id,
            text: self.text.clone(),
            options,
            correct_index,
        }
    }
}

//
// ─── QUESTION BANK ─────────────────────────────────────────────────────────────
//

/// Raw question record as shipped in the static bank asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankQuestion {
    pub id: u32,
    pub text: String,
    pub options: Vec<String>,
    pub correct_index: u8,
    pub category: Category,
}

/// Immutable, validated question pools keyed by category.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QuestionBank {
    history: Vec<Question>,
    constitution: Vec<Question>,
}

impl QuestionBank {
    /// Validates raw records and splits them into per-category pools, preserving order.
    ///
    /// # Errors
    ///
    /// Returns the first `QuestionBankError` encountered.
    pub fn from_questions(
        records: impl IntoIterator<Item = BankQuestion>,
    ) -> Result<Self, QuestionBankError> {
        let mut bank = Self::default();
        let mut seen: HashSet<(Category, QuestionId)> = HashSet::new();

        for record in records {
            let id = QuestionId::new(record.id);
            let options: [String; OPTION_COUNT] =
                record
                    .options
                    .try_into()
                    .map_err(|options: Vec<String>| QuestionBankError::OptionCount {
                        id,
                        count: options.len(),
                    })?;
            let question = Question::new(id, record.text, options, record.correct_index)?;

            if !seen.insert((record.category, id)) {
                return Err(QuestionBankError::DuplicateId {
                    id,
                    category: record.category,
                });
            }

            match record.category {
                Category::History => bank.history.push(question),
                Category::Constitution => bank.constitution.push(question),
            }
        }

        Ok(bank)
    }

    /// Parses and validates a JSON array of bank records.
    ///
    /// # Errors
    ///
    /// Returns `QuestionBankError::Parse` for malformed JSON, otherwise the validation error.
    pub fn from_json(json: &str) -> Result<Self, QuestionBankError> {
        let records: Vec<BankQuestion> =
            serde_json::from_str(json).map_err(|err| QuestionBankError::Parse(err.to_string()))?;
        Self::from_questions(records)
    }

    #[must_use]
    pub fn pool(&self, category: Category) -> &[Question] {
        match category {
            Category::History => &self.history,
            Category::Constitution => &self.constitution,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.history.len() + self.constitution.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u32, category: Category) -> BankQuestion {
        BankQuestion {
            id,
            text: format!("Question {id}?"),
            options: vec!["A".into(), "B".into(), "C".into()],
            correct_index: 1,
            category,
        }
    }

    #[test]
    fn bank_splits_pools_in_order() {
        let bank = QuestionBank::from_questions(vec![
            record(1, Category::History),
            record(1, Category::Constitution),
            record(2, Category::History),
        ])
        .unwrap();

        let history: Vec<u32> = bank
            .pool(Category::History)
            .iter()
            .map(|q| q.id().value())
            .collect();
        assert_eq!(history, vec![1, 2]);
        assert_eq!(bank.pool(Category::Constitution).len(), 1);
        assert_eq!(bank.len(), 3);
    }

    #[test]
    fn duplicate_id_in_same_category_is_rejected() {
        let err = QuestionBank::from_questions(vec![
            record(5, Category::History),
            record(5, Category::History),
        ])
        .unwrap_err();
        assert!(matches!(err, QuestionBankError::DuplicateId { .. }));
    }

    #[test]
    fn wrong_option_count_is_rejected() {
        let mut bad = record(1, Category::History);
        bad.options.pop();
        let err = QuestionBank::from_questions(vec![bad]).unwrap_err();
        assert!(matches!(err, QuestionBankError::OptionCount { count: 2, .. }));
    }

    #[test]
    fn duplicate_options_are_rejected() {
        let mut bad = record(1, Category::History);
        bad.options = vec!["A".into(), "A".into(), "C".into()];
        let err = QuestionBank::from_questions(vec![bad]).unwrap_err();
        assert!(matches!(err, QuestionBankError::DuplicateOption { .. }));
    }

    #[test]
    fn correct_index_out_of_range_is_rejected() {
        let mut bad = record(1, Category::Constitution);
        bad.correct_index = 3;
        let err = QuestionBank::from_questions(vec![bad]).unwrap_err();
        assert!(matches!(
            err,
            QuestionBankError::CorrectIndexOutOfRange { index: 3, .. }
        ));
    }

    #[test]
    fn bank_parses_json_records() {
        let json = r#"[
            {"id": 1, "text": "Q?", "options": ["x", "y", "z"], "correctIndex": 2, "category": "history"},
            {"id": 9, "text": "K?", "options": ["a", "b", "c"], "correctIndex": 0, "category": "constitution"}
        ]"#;
        let bank = QuestionBank::from_json(json).unwrap();
        assert_eq!(bank.pool(Category::History)[0].correct_option(), "z");
        assert_eq!(bank.pool(Category::Constitution)[0].correct_option(), "a");

        assert!(matches!(
            QuestionBank::from_json("{not json"),
            Err(QuestionBankError::Parse(_))
        ));
    }

    #[test]
    fn relayout_tracks_correct_text() {
        let q = Question::new(
            QuestionId::new(1),
            "Q?",
            ["A".into(), "B".into(), "C".into()],
            1,
        )
        .unwrap();
        let moved = q.with_layout(["C".into(), "A".into(), "B".into()]);
        assert_eq!(moved.correct_index(), 2);
        assert_eq!(moved.correct_option(), "B");
    }
}
