//! Checksummed, expiring persistence of the active exam attempt.

pub mod codec;
mod record;
mod store;

pub use codec::CodecError;
pub use record::{RecordMetadata, SESSION_FORMAT_VERSION, SESSION_KEY, SessionRecord};
pub use store::{
    ErrorKind, LoadOutcome, SaveOutcome, SaveReceipt, SessionInfo, SessionStore,
    SessionStoreError,
};
