mod ids;
mod question;
mod selection;
mod test_state;

pub use ids::{ParseIdError, QuestionId, SessionId};
pub use question::{BankQuestion, Category, OPTION_COUNT, Question, QuestionBank, QuestionBankError};
pub use selection::{QuestionSelection, SelectedQuestions, SelectionMetadata, SelectionMismatch};
pub use test_state::{Section, TestState, TestStateError};
