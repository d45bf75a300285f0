#![forbid(unsafe_code)]

pub mod error;
pub mod logging;
pub mod sessions;

pub use exam_core::Clock;
pub use sessions as session;

pub use error::ControllerError;
pub use sessions::{
    AutoSave, ControllerState, ExamProgress, ExamResult, RecoveryChoice, SessionController,
    Submission,
};
