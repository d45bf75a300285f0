//! Shared error types for the services crate.

use thiserror::Error;

use exam_core::model::{Category, QuestionId, TestStateError};
use exam_core::scoring::ScoreError;
use exam_core::selection::SelectionError;
use storage::session::SessionStoreError;

use crate::sessions::ControllerState;

/// Errors emitted by `SessionController`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ControllerError {
    #[error("{operation} is not allowed while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: ControllerState,
    },
    #[error("question {id} is not part of the {category:?} selection")]
    UnknownQuestion { category: Category, id: QuestionId },
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    TestState(#[from] TestStateError),
    #[error(transparent)]
    Score(#[from] ScoreError),
    #[error(transparent)]
    Store(#[from] SessionStoreError),
}
