use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::QuestionId;
use crate::model::question::{Category, Question, QuestionBankError};
use crate::model::test_state::TestState;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SelectionMismatch {
    #[error("{category:?} selection has {actual} questions, metadata lists {expected}")]
    Length {
        category: Category,
        expected: usize,
        actual: usize,
    },

    #[error("{category:?} question at position {position} does not match metadata")]
    Order { category: Category, position: usize },

    #[error("answer recorded for unselected {category:?} question {id}")]
    UnknownAnswer { category: Category, id: QuestionId },

    #[error(transparent)]
    Question(#[from] QuestionBankError),
}

/// How an attempt's questions were drawn. Written once at selection time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SelectionMetadata {
    seed: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    selected_at: DateTime<Utc>,
    history_ids: Vec<QuestionId>,
    constitution_ids: Vec<QuestionId>,
}

impl SelectionMetadata {
    #[must_use]
    pub fn new(
        seed: u64,
        selected_at: DateTime<Utc>,
        history_ids: Vec<QuestionId>,
        constitution_ids: Vec<QuestionId>,
    ) -> Self {
        Self {
            seed,
            selected_at,
            history_ids,
            constitution_ids,
        }
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub fn selected_at(&self) -> DateTime<Utc> {
        self.selected_at
    }

    #[must_use]
    pub fn selected_ids(&self, category: Category) -> &[QuestionId] {
        match category {
            Category::History => &self.history_ids,
            Category::Constitution => &self.constitution_ids,
        }
    }
}

/// The questions shown in one attempt, with their per-attempt option layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SelectedQuestions {
    history: Vec<Question>,
    constitution: Vec<Question>,
}

impl SelectedQuestions {
    #[must_use]
    pub fn new(history: Vec<Question>, constitution: Vec<Question>) -> Self {
        Self {
            history,
            constitution,
        }
    }

    #[must_use]
    pub fn questions(&self, category: Category) -> &[Question] {
        match category {
            Category::History => &self.history,
            Category::Constitution => &self.constitution,
        }
    }

    #[must_use]
    pub fn find(&self, category: Category, id: QuestionId) -> Option<&Question> {
        self.questions(category).iter().find(|q| q.id() == id)
    }

    #[must_use]
    pub fn ids(&self, category: Category) -> Vec<QuestionId> {
        self.questions(category).iter().map(Question::id).collect()
    }
}

/// Output of question selection: the questions plus how they were chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionSelection {
    pub questions: SelectedQuestions,
    pub metadata: SelectionMetadata,
}

impl QuestionSelection {
    /// Confirms a (possibly persisted) selection is self-consistent and that the
    /// attempt only holds answers for selected questions.
    ///
    /// # Errors
    ///
    /// Returns the first `SelectionMismatch` found.
    pub fn validate(&self, state: &TestState) -> Result<(), SelectionMismatch> {
        for category in Category::ALL {
            let questions = self.questions.questions(category);
            let expected = self.metadata.selected_ids(category);
            if questions.len() != expected.len() {
                return Err(SelectionMismatch::Length {
                    category,
                    expected: expected.len(),
                    actual: questions.len(),
                });
            }
            for (position, (question, id)) in questions.iter().zip(expected).enumerate() {
                question.validate()?;
                if question.id() != *id {
                    return Err(SelectionMismatch::Order { category, position });
                }
            }
            if let Some(id) = state
                .answers(category)
                .keys()
                .find(|id| self.questions.find(category, **id).is_none())
            {
                return Err(SelectionMismatch::UnknownAnswer { category, id: *id });
            }
        }
        Ok(())
    }
}
