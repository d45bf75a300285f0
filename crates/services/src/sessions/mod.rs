mod autosave;
mod controller;
mod progress;

// Public API of the session subsystem.
pub use crate::error::ControllerError;
pub use autosave::AutoSave;
pub use controller::{ControllerState, ExamResult, RecoveryChoice, SessionController, Submission};
pub use progress::ExamProgress;
