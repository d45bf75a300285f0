#![forbid(unsafe_code)]

pub mod repository;
pub mod session;
pub mod sqlite;

pub use repository::{InMemoryKeyValueStore, KeyValueStore, StorageError, StorageEstimate};
pub use session::{LoadOutcome, SaveOutcome, SessionStore, SessionStoreError};
pub use sqlite::SqliteKeyValueStore;
