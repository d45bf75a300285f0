use thiserror::Error;

use crate::config::ConfigError;
use crate::model::{QuestionBankError, SelectionMismatch, TestStateError};
use crate::scoring::ScoreError;
use crate::selection::SelectionError;

/// Any error raised by the exam core.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    QuestionBank(#[from] QuestionBankError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    SelectionMismatch(#[from] SelectionMismatch),
    #[error(transparent)]
    TestState(#[from] TestStateError),
    #[error(transparent)]
    Score(#[from] ScoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
