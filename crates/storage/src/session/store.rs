use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use exam_core::config::ExamConfig;
use exam_core::model::{QuestionSelection, SessionId, TestState};
use exam_core::time::Clock;

use super::codec::{self, CodecError};
use super::record::{RecordMetadata, SESSION_FORMAT_VERSION, SESSION_KEY, SessionRecord};
use crate::repository::{KeyValueStore, StorageError, entry_size};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Coarse classification of [`SessionStoreError`], for state decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Integrity,
    Expiry,
    Quota,
    Serialization,
    Storage,
    NoSession,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionStoreError {
    #[error("session is invalid: {0}")]
    Validation(String),
    #[error("session checksum mismatch")]
    Integrity,
    #[error("session expired at {expired_at}")]
    Expired { expired_at: DateTime<Utc> },
    #[error("insufficient storage: {needed} bytes needed, {available} available")]
    Quota { needed: u64, available: u64 },
    #[error("session could not be decoded: {0}")]
    Serialization(String),
    #[error(transparent)]
    Storage(StorageError),
    #[error("no stored session")]
    NoSession,
}

impl SessionStoreError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionStoreError::Validation(_) => ErrorKind::Validation,
            SessionStoreError::Integrity => ErrorKind::Integrity,
            SessionStoreError::Expired { .. } => ErrorKind::Expiry,
            SessionStoreError::Quota { .. } => ErrorKind::Quota,
            SessionStoreError::Serialization(_) => ErrorKind::Serialization,
            SessionStoreError::Storage(_) => ErrorKind::Storage,
            SessionStoreError::NoSession => ErrorKind::NoSession,
        }
    }

    /// Whether discarding the stored record and starting over resolves the error.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Integrity | ErrorKind::Serialization
        )
    }

    /// Whether the in-memory attempt is still valid and the write can simply be
    /// retried later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Quota | ErrorKind::Storage)
    }
}

impl From<StorageError> for SessionStoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::QuotaExceeded { needed, available } => {
                SessionStoreError::Quota { needed, available }
            }
            other => SessionStoreError::Storage(other),
        }
    }
}

impl From<CodecError> for SessionStoreError {
    fn from(err: CodecError) -> Self {
        SessionStoreError::Serialization(err.to_string())
    }
}

//
// ─── OUTCOMES ──────────────────────────────────────────────────────────────────
//

/// What a successful write produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReceipt {
    pub session_id: SessionId,
    pub save_count: u32,
    pub bytes_written: usize,
    pub compressed: bool,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum SaveOutcome {
    Saved(SaveReceipt),
    /// The store already holds a newer snapshot of the same session; nothing was
    /// written.
    Stale {
        stored_last_updated: DateTime<Utc>,
        stored_save_count: u32,
    },
    Failed(SessionStoreError),
}

impl SaveOutcome {
    #[must_use]
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved(_))
    }

    #[must_use]
    pub fn receipt(&self) -> Option<&SaveReceipt> {
        match self {
            SaveOutcome::Saved(receipt) => Some(receipt),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(Box<SessionRecord>),
    Empty,
    Failed(SessionStoreError),
}

impl LoadOutcome {
    #[must_use]
    pub fn record(&self) -> Option<&SessionRecord> {
        match self {
            LoadOutcome::Loaded(record) => Some(&**record),
            _ => None,
        }
    }
}

/// Summary of the stored session, for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub save_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub remaining: Duration,
    pub size_bytes: usize,
    pub compressed: bool,
}

//
// ─── STORE ─────────────────────────────────────────────────────────────────────
//

/// Persists the active attempt with a checksum and an expiry.
pub struct SessionStore {
    kv: Arc<dyn KeyValueStore>,
    clock: Clock,
    ttl: Duration,
    compression_threshold: usize,
    key: String,
}

/// Saves retried against a value that keeps changing underneath before giving up.
const MAX_WRITE_ATTEMPTS: usize = 3;

/// A record that decoded and passed its checksum, with the bytes it came from.
struct Stored {
    record: SessionRecord,
    bytes: Vec<u8>,
}

impl Stored {
    fn size(&self) -> usize {
        self.bytes.len()
    }

    fn compressed(&self) -> bool {
        self.bytes.first() == Some(&codec::ENVELOPE_DEFLATE)
    }
}

/// Decodes a stored value for bookkeeping, ignoring it unless it is authentic.
fn trusted(bytes: &[u8]) -> Option<Stored> {
    let decoded = codec::decode(bytes).ok()?;
    if !decoded.is_authentic().unwrap_or(false) {
        debug!("ignoring unverifiable stored session");
        return None;
    }
    Some(Stored {
        record: decoded.into_record(),
        bytes: bytes.to_vec(),
    })
}

impl SessionStore {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>, config: &ExamConfig, clock: Clock) -> Self {
        Self {
            kv,
            clock,
            ttl: config.session_ttl(),
            compression_threshold: config.compression_threshold(),
            key: SESSION_KEY.to_owned(),
        }
    }

    /// Uses a different storage key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    pub fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Persists `test_state` and its question set.
    ///
    /// Reusing `session_id` continues the stored record (same creation time and
    /// expiry, `save_count + 1`); otherwise a new session is started with a fresh
    /// TTL. A snapshot older than the stored one for the same session is dropped
    /// as [`SaveOutcome::Stale`]; a session past its expiry is cleared and the
    /// save fails with `Expired`.
    ///
    /// The write only lands if the stored value is still the one the checks ran
    /// against, so concurrent saves never let an older snapshot replace a newer
    /// one.
    pub async fn save(
        &self,
        test_state: &TestState,
        selection: &QuestionSelection,
        session_id: Option<&SessionId>,
    ) -> SaveOutcome {
        match self.try_save(test_state, selection, session_id).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(kind = ?err.kind(), error = %err, "session save failed");
                SaveOutcome::Failed(err)
            }
        }
    }

    async fn try_save(
        &self,
        test_state: &TestState,
        selection: &QuestionSelection,
        session_id: Option<&SessionId>,
    ) -> Result<SaveOutcome, SessionStoreError> {
        selection
            .validate(test_state)
            .map_err(|err| SessionStoreError::Validation(err.to_string()))?;

        let session_id = session_id.copied().unwrap_or_else(SessionId::generate);
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let raw = self.kv.get(&self.key).await?;
            if let Some(outcome) = self
                .save_over(raw.as_deref(), test_state, selection, session_id)
                .await?
            {
                return Ok(outcome);
            }
            debug!(session_id = %session_id, "stored session changed during save, retrying");
        }
        Err(StorageError::Conflict {
            key: self.key.clone(),
        }
        .into())
    }

    /// One check-and-write round against the value read as `raw`.
    ///
    /// Returns `None` when the stored value changed before the write landed.
    async fn save_over(
        &self,
        raw: Option<&[u8]>,
        test_state: &TestState,
        selection: &QuestionSelection,
        session_id: SessionId,
    ) -> Result<Option<SaveOutcome>, SessionStoreError> {
        let now = self.clock.now();
        let existing = raw.and_then(trusted);
        let previous = existing
            .as_ref()
            .filter(|stored| stored.record.session_id == session_id);

        if let Some(stored) = previous {
            if stored.record.is_expired(now) {
                self.kv.remove(&self.key).await?;
                info!(session_id = %session_id, "save into expired session refused");
                return Err(SessionStoreError::Expired {
                    expired_at: stored.record.expires_at,
                });
            }

            let stored_last_updated = stored.record.test_state.last_updated();
            if test_state.last_updated() < stored_last_updated {
                debug!(
                    session_id = %session_id,
                    stored_save_count = stored.record.metadata.save_count,
                    "dropping stale session snapshot"
                );
                return Ok(Some(SaveOutcome::Stale {
                    stored_last_updated,
                    stored_save_count: stored.record.metadata.save_count,
                }));
            }
        }

        let (created_at, expires_at, save_count) = match previous {
            Some(stored) => (
                stored.record.metadata.created_at,
                stored.record.expires_at,
                stored.record.metadata.save_count.saturating_add(1),
            ),
            None => (now, self.deadline()?, 1),
        };

        let mut record = SessionRecord::new(
            session_id,
            test_state.clone(),
            selection,
            expires_at,
            RecordMetadata {
                created_at,
                last_updated: now,
                save_count,
            },
        );
        Ok(self.write(&mut record, raw).await?.map(SaveOutcome::Saved))
    }

    fn deadline(&self) -> Result<DateTime<Utc>, SessionStoreError> {
        self.clock.deadline(self.ttl).ok_or_else(|| {
            SessionStoreError::Validation(format!("session ttl {} is out of range", self.ttl))
        })
    }

    /// Seals, encodes, checks quota and swaps the new value in for `previous`.
    ///
    /// Returns `None` if the stored value no longer equals `previous`.
    async fn write(
        &self,
        record: &mut SessionRecord,
        previous: Option<&[u8]>,
    ) -> Result<Option<SaveReceipt>, SessionStoreError> {
        codec::seal(record)?;
        let encoded = codec::encode(record, self.compression_threshold)?;

        let estimate = self.kv.size_estimate().await?;
        if let Some(remaining) = estimate.remaining() {
            let existing_size = previous.map_or(0, |v| entry_size(&self.key, v));
            let available = remaining + existing_size;
            let needed = entry_size(&self.key, &encoded.bytes);
            if needed > available {
                return Err(SessionStoreError::Quota { needed, available });
            }
        }

        if !self
            .kv
            .compare_and_set(&self.key, previous, &encoded.bytes)
            .await?
        {
            return Ok(None);
        }

        info!(
            session_id = %record.session_id,
            save_count = record.metadata.save_count,
            bytes = encoded.bytes.len(),
            compressed = encoded.compressed,
            "session saved"
        );

        Ok(Some(SaveReceipt {
            session_id: record.session_id,
            save_count: record.metadata.save_count,
            bytes_written: encoded.bytes.len(),
            compressed: encoded.compressed,
            expires_at: record.expires_at,
        }))
    }

    /// Reads back the stored attempt.
    ///
    /// An expired record is removed and reported as `Expired`; a record that
    /// fails its checksum is reported as `Integrity` and never returned.
    pub async fn load(&self) -> LoadOutcome {
        match self.try_load().await {
            Ok(Some(stored)) => LoadOutcome::Loaded(Box::new(stored.record)),
            Ok(None) => LoadOutcome::Empty,
            Err(err) => {
                warn!(kind = ?err.kind(), error = %err, "session load failed");
                LoadOutcome::Failed(err)
            }
        }
    }

    async fn try_load(&self) -> Result<Option<Stored>, SessionStoreError> {
        let Some(bytes) = self.kv.get(&self.key).await? else {
            return Ok(None);
        };
        let decoded = codec::decode(&bytes)?;
        let record = &decoded.record;

        if record.version != SESSION_FORMAT_VERSION {
            return Err(SessionStoreError::Validation(format!(
                "unsupported format version {:?}",
                record.version
            )));
        }

        if record.is_expired(self.clock.now()) {
            self.kv.remove(&self.key).await?;
            info!(session_id = %record.session_id, "expired session cleared");
            return Err(SessionStoreError::Expired {
                expired_at: record.expires_at,
            });
        }

        if !decoded.is_authentic()? {
            return Err(SessionStoreError::Integrity);
        }

        record
            .selection()
            .validate(&record.test_state)
            .map_err(|err| SessionStoreError::Validation(err.to_string()))?;

        Ok(Some(Stored {
            record: decoded.into_record(),
            bytes,
        }))
    }

    /// Pushes the stored record's expiry to `now + ttl`.
    ///
    /// # Errors
    ///
    /// Returns `NoSession` if nothing is stored, `Storage` if the record changed
    /// while extending, or any load or write failure.
    pub async fn extend(&self) -> Result<SaveReceipt, SessionStoreError> {
        let stored = self.try_load().await?.ok_or(SessionStoreError::NoSession)?;
        let mut record = stored.record;
        let now = self.clock.now();
        record.expires_at = self.deadline()?;
        record.metadata.last_updated = now;
        record.metadata.save_count = record.metadata.save_count.saturating_add(1);

        let receipt = self
            .write(&mut record, Some(&stored.bytes))
            .await?
            .ok_or_else(|| StorageError::Conflict {
                key: self.key.clone(),
            })?;
        debug!(session_id = %receipt.session_id, expires_at = %receipt.expires_at, "session extended");
        Ok(receipt)
    }

    /// Removes the stored record, if any.
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreError::Storage` if the backend fails.
    pub async fn clear(&self) -> Result<(), SessionStoreError> {
        self.kv.remove(&self.key).await?;
        debug!("session cleared");
        Ok(())
    }

    /// Describes the stored session without returning its contents.
    ///
    /// # Errors
    ///
    /// Same failures as [`SessionStore::load`].
    pub async fn info(&self) -> Result<Option<SessionInfo>, SessionStoreError> {
        let Some(stored) = self.try_load().await? else {
            return Ok(None);
        };
        let record = &stored.record;
        Ok(Some(SessionInfo {
            session_id: record.session_id,
            save_count: record.metadata.save_count,
            created_at: record.metadata.created_at,
            last_updated: record.metadata.last_updated,
            expires_at: record.expires_at,
            remaining: record.remaining(self.clock.now()),
            size_bytes: stored.size(),
            compressed: stored.compressed(),
        }))
    }
}
