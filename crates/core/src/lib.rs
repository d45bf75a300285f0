#![forbid(unsafe_code)]

pub mod anthem;
pub mod config;
pub mod error;
pub mod model;
pub mod random;
pub mod scoring;
pub mod selection;
pub mod time;

pub use anthem::{AnthemComparator, AnthemResult, compare_anthem};
pub use config::ExamConfig;
pub use error::Error;
pub use random::SeededRandom;
pub use scoring::{ScoreAggregator, ScoreResult, aggregate_score};
pub use selection::{QuestionPoolSelector, select_questions};
pub use time::Clock;
