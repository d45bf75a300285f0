use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use exam_core::anthem::{AnthemComparator, AnthemResult};
use exam_core::config::ExamConfig;
use exam_core::model::{
    Category, QuestionBank, QuestionId, QuestionSelection, Section, SelectedQuestions, SessionId,
    TestState,
};
use exam_core::scoring::{
    EnabledSections, ScoreAggregator, ScoreResult, SectionResults, SectionTally, tally_section,
};
use exam_core::selection::select_questions;
use exam_core::time::Clock;
use storage::session::{
    ErrorKind, LoadOutcome, SaveOutcome, SaveReceipt, SessionRecord, SessionStore,
    SessionStoreError,
};

use super::autosave::AutoSave;
use super::progress::ExamProgress;
use crate::error::ControllerError;

/// Lifecycle of the attempt the controller owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ControllerState {
    Uninitialized,
    Loading,
    Active,
    /// A stored attempt failed its integrity check; waiting for the user to
    /// pick a [`RecoveryChoice`].
    Recovering,
    Expired,
    Errored,
    Completed,
}

/// How to leave [`ControllerState::Recovering`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryChoice {
    /// Begin a new attempt right away; the untrusted record is overwritten by
    /// its first save.
    StartFresh,
    /// Delete the untrusted record, then go through loading again.
    Discard,
}

/// Scored outcome of a submitted attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExamResult {
    pub anthem: Option<AnthemResult>,
    pub history: Option<SectionTally>,
    pub constitution: Option<SectionTally>,
    pub score: ScoreResult,
}

/// What `submit` produced: the result plus the final save.
#[derive(Debug)]
pub struct Submission {
    pub result: ExamResult,
    pub save: SaveOutcome,
}

/// Drives one exam attempt from loading to submission.
pub struct SessionController {
    store: SessionStore,
    bank: Arc<QuestionBank>,
    config: ExamConfig,
    comparator: AnthemComparator,
    aggregator: ScoreAggregator,
    enabled: EnabledSections,
    autosave: AutoSave,
    state: ControllerState,
    session_id: Option<SessionId>,
    selection: Option<QuestionSelection>,
    test_state: Option<TestState>,
    result: Option<ExamResult>,
    expires_at: Option<DateTime<Utc>>,
    superseded: bool,
    last_error: Option<ErrorKind>,
}

impl SessionController {
    #[must_use]
    pub fn new(store: SessionStore, bank: Arc<QuestionBank>, config: ExamConfig) -> Self {
        Self {
            comparator: AnthemComparator::new()
                .with_pass_threshold(config.anthem_pass_accuracy()),
            aggregator: ScoreAggregator::from_config(&config),
            autosave: AutoSave::new(config.autosave_debounce()),
            store,
            bank,
            config,
            enabled: EnabledSections::all(),
            state: ControllerState::Uninitialized,
            session_id: None,
            selection: None,
            test_state: None,
            result: None,
            expires_at: None,
            superseded: false,
            last_error: None,
        }
    }

    /// Restricts the attempt to some sections. Anything short of all three is
    /// a partial attempt and never certificate-eligible.
    #[must_use]
    pub fn with_enabled_sections(mut self, enabled: EnabledSections) -> Self {
        self.enabled = enabled;
        self
    }

    //
    // ─── ACCESSORS ─────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn state(&self) -> ControllerState {
        self.state
    }

    #[must_use]
    pub fn test_state(&self) -> Option<&TestState> {
        self.test_state.as_ref()
    }

    #[must_use]
    pub fn questions(&self) -> Option<&SelectedQuestions> {
        self.selection.as_ref().map(|s| &s.questions)
    }

    #[must_use]
    pub fn selection(&self) -> Option<&QuestionSelection> {
        self.selection.as_ref()
    }

    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    #[must_use]
    pub fn result(&self) -> Option<&ExamResult> {
        self.result.as_ref()
    }

    #[must_use]
    pub fn enabled_sections(&self) -> EnabledSections {
        self.enabled
    }

    /// Kind of the last persistence failure, if the most recent load or save failed.
    #[must_use]
    pub fn last_error(&self) -> Option<ErrorKind> {
        self.last_error
    }

    /// When the stored attempt expires, as of the last load or save.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Whether the last save found a newer snapshot of this session already
    /// stored and wrote nothing.
    #[must_use]
    pub fn is_superseded(&self) -> bool {
        self.superseded
    }

    #[must_use]
    pub fn has_pending_save(&self) -> bool {
        self.autosave.is_dirty()
    }

    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn clock_mut(&mut self) -> &mut Clock {
        self.store.clock_mut()
    }

    #[must_use]
    pub fn progress(&self) -> Option<ExamProgress> {
        let state = self.test_state.as_ref()?;
        let selection = self.selection.as_ref()?;
        let history = tally_section(
            selection.questions.questions(Category::History),
            state.answers(Category::History),
        );
        let constitution = tally_section(
            selection.questions.questions(Category::Constitution),
            state.answers(Category::Constitution),
        );
        Some(ExamProgress {
            history_answered: history.answered,
            history_total: history.total,
            constitution_answered: constitution.answered,
            constitution_total: constitution.total,
            anthem_chars: state.anthem_text().chars().count(),
            current_section: state.current_section(),
            is_complete: state.is_completed(),
        })
    }

    fn now(&self) -> DateTime<Utc> {
        self.store.clock().now()
    }

    fn transition(&mut self, to: ControllerState) {
        if self.state != to {
            info!(from = ?self.state, to = ?to, "controller state change");
            self.state = to;
        }
    }

    fn require(
        &self,
        operation: &'static str,
        allowed: &[ControllerState],
    ) -> Result<(), ControllerError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(ControllerError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    //
    // ─── LIFECYCLE ─────────────────────────────────────────────────────────────
    //

    /// Loads the stored attempt, or starts a new one when nothing is stored.
    ///
    /// `seed` only applies to a new attempt; `None` seeds from the clock.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::InvalidState` unless uninitialized, or
    /// `ControllerError::Selection` if the bank cannot supply a full attempt.
    pub async fn start(&mut self, seed: Option<u64>) -> Result<ControllerState, ControllerError> {
        self.require("start", &[ControllerState::Uninitialized])?;
        self.load_or_begin(seed).await
    }

    async fn load_or_begin(&mut self, seed: Option<u64>) -> Result<ControllerState, ControllerError> {
        self.transition(ControllerState::Loading);
        match self.store.load().await {
            LoadOutcome::Loaded(record) => {
                self.last_error = None;
                self.resume(*record)?;
            }
            LoadOutcome::Empty => {
                self.last_error = None;
                self.begin(seed).await?;
            }
            LoadOutcome::Failed(err) => self.fail_load(&err),
        }
        Ok(self.state)
    }

    fn resume(&mut self, record: SessionRecord) -> Result<(), ControllerError> {
        let selection = record.selection();
        self.session_id = Some(record.session_id);
        self.expires_at = Some(record.expires_at);
        self.superseded = false;
        self.autosave.mark_saved();
        debug!(
            session_id = %record.session_id,
            save_count = record.metadata.save_count,
            "resuming stored attempt"
        );
        if record.test_state.is_completed() {
            let result = self.score(&record.test_state, &selection)?;
            self.result = Some(result);
            self.selection = Some(selection);
            self.test_state = Some(record.test_state);
            self.transition(ControllerState::Completed);
        } else {
            self.result = None;
            self.selection = Some(selection);
            self.test_state = Some(record.test_state);
            self.transition(ControllerState::Active);
        }
        Ok(())
    }

    fn fail_load(&mut self, err: &SessionStoreError) {
        self.last_error = Some(err.kind());
        let next = if err.is_recoverable() {
            ControllerState::Recovering
        } else if err.kind() == ErrorKind::Expiry {
            ControllerState::Expired
        } else {
            ControllerState::Errored
        };
        warn!(kind = ?err.kind(), next = ?next, "stored attempt unusable");
        self.transition(next);
    }

    /// Draws a new question set and persists the empty attempt.
    async fn begin(&mut self, seed: Option<u64>) -> Result<SaveOutcome, ControllerError> {
        let now = self.now();
        let seed = seed.unwrap_or_else(|| self.store.clock().now_millis());
        let selection = match select_questions(&self.bank, &self.config, seed, now) {
            Ok(selection) => selection,
            Err(err) => {
                warn!(error = %err, "question selection failed");
                self.transition(ControllerState::Errored);
                return Err(err.into());
            }
        };
        info!(seed, "new attempt");

        self.session_id = Some(SessionId::generate());
        self.expires_at = None;
        self.selection = Some(selection);
        self.test_state = Some(TestState::new(now));
        self.result = None;
        self.autosave.mark_saved();
        self.transition(ControllerState::Active);
        Ok(self.persist().await)
    }

    /// Leaves `Recovering`.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::InvalidState` unless recovering, or any error
    /// from clearing storage or starting the new attempt.
    pub async fn resolve_recovery(
        &mut self,
        choice: RecoveryChoice,
        seed: Option<u64>,
    ) -> Result<ControllerState, ControllerError> {
        self.require("resolve_recovery", &[ControllerState::Recovering])?;
        self.last_error = None;
        match choice {
            RecoveryChoice::StartFresh => {
                self.begin(seed).await?;
                Ok(self.state)
            }
            RecoveryChoice::Discard => {
                self.store.clear().await?;
                self.load_or_begin(seed).await
            }
        }
    }

    /// Abandons whatever is current and starts over with a new question set.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::InvalidState` before `start`, or any error from
    /// clearing storage or selecting questions.
    pub async fn new_attempt(&mut self, seed: Option<u64>) -> Result<SaveOutcome, ControllerError> {
        self.require(
            "new_attempt",
            &[
                ControllerState::Active,
                ControllerState::Recovering,
                ControllerState::Expired,
                ControllerState::Errored,
                ControllerState::Completed,
            ],
        )?;
        self.store.clear().await?;
        self.last_error = None;
        self.begin(seed).await
    }

    //
    // ─── EDITS ─────────────────────────────────────────────────────────────────
    //

    fn edit<F>(&mut self, operation: &'static str, apply: F) -> Result<(), ControllerError>
    where
        F: FnOnce(&mut TestState, DateTime<Utc>) -> Result<(), ControllerError>,
    {
        self.require(operation, &[ControllerState::Active])?;
        let now = self.now();
        let state = self
            .test_state
            .as_mut()
            .ok_or(ControllerError::InvalidState {
                operation,
                state: self.state,
            })?;
        apply(state, now)?;
        self.autosave.mark_dirty(now);
        Ok(())
    }

    /// Replaces the anthem transcription.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::InvalidState` unless active.
    pub fn set_anthem_text(&mut self, text: impl Into<String>) -> Result<(), ControllerError> {
        let text = text.into();
        self.edit("set_anthem_text", |state, now| {
            Ok(state.set_anthem_text(text, now)?)
        })
    }

    /// Records the chosen option for a selected question.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::UnknownQuestion` for a question outside the
    /// attempt, `ControllerError::TestState` for an out-of-range index, or
    /// `ControllerError::InvalidState` unless active.
    pub fn answer(
        &mut self,
        category: Category,
        id: QuestionId,
        index: u8,
    ) -> Result<(), ControllerError> {
        let selected = self
            .selection
            .as_ref()
            .is_some_and(|s| s.questions.find(category, id).is_some());
        if self.state == ControllerState::Active && !selected {
            return Err(ControllerError::UnknownQuestion { category, id });
        }
        self.edit("answer", |state, now| {
            Ok(state.record_answer(category, id, index, now)?)
        })
    }

    /// Moves to another section.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::InvalidState` unless active.
    pub fn set_section(&mut self, section: Section) -> Result<(), ControllerError> {
        self.edit("set_section", |state, now| {
            Ok(state.set_current_section(section, now)?)
        })
    }

    //
    // ─── PERSISTENCE ───────────────────────────────────────────────────────────
    //

    async fn persist(&mut self) -> SaveOutcome {
        let (Some(state), Some(selection)) = (&self.test_state, &self.selection) else {
            return SaveOutcome::Failed(SessionStoreError::NoSession);
        };
        let outcome = self
            .store
            .save(state, selection, self.session_id.as_ref())
            .await;

        match &outcome {
            SaveOutcome::Saved(receipt) => {
                self.session_id = Some(receipt.session_id);
                self.expires_at = Some(receipt.expires_at);
                self.superseded = false;
                self.autosave.mark_saved();
                self.last_error = None;
            }
            SaveOutcome::Stale {
                stored_save_count, ..
            } => {
                // a newer snapshot is already stored; nothing left to write
                warn!(stored_save_count, "save superseded by a newer stored snapshot");
                self.superseded = true;
                self.autosave.mark_saved();
            }
            SaveOutcome::Failed(err) => {
                self.last_error = Some(err.kind());
                if err.is_retryable() {
                    let now = self.now();
                    self.autosave.mark_dirty(now);
                } else {
                    self.autosave.mark_saved();
                }
                if err.kind() == ErrorKind::Expiry {
                    self.transition(ControllerState::Expired);
                }
            }
        }
        outcome
    }

    /// Moves an active attempt whose deadline has passed to `Expired`, clearing
    /// the stored record. Returns the expiry as an error for the caller.
    async fn expire_if_due(&mut self) -> Option<SessionStoreError> {
        let clock = self.store.clock();
        let expired_at = self.expires_at.filter(|at| clock.has_passed(*at))?;
        if self.state != ControllerState::Active {
            return None;
        }
        if let Err(err) = self.store.clear().await {
            warn!(error = %err, "could not clear expired session");
        }
        info!(%expired_at, "attempt expired");
        self.last_error = Some(ErrorKind::Expiry);
        self.autosave.mark_saved();
        self.transition(ControllerState::Expired);
        Some(SessionStoreError::Expired { expired_at })
    }

    /// Flushes the pending auto-save once the debounce has elapsed, or expires
    /// the attempt once its deadline has passed.
    ///
    /// Returns `None` when nothing was due.
    pub async fn tick(&mut self) -> Option<SaveOutcome> {
        if let Some(err) = self.expire_if_due().await {
            return Some(SaveOutcome::Failed(err));
        }
        if self.state != ControllerState::Active || !self.autosave.due(self.now()) {
            return None;
        }
        Some(self.persist().await)
    }

    /// Saves immediately, superseding any pending auto-save.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::InvalidState` unless active or completed.
    pub async fn save_now(&mut self) -> Result<SaveOutcome, ControllerError> {
        self.require(
            "save_now",
            &[ControllerState::Active, ControllerState::Completed],
        )?;
        if let Some(err) = self.expire_if_due().await {
            return Ok(SaveOutcome::Failed(err));
        }
        Ok(self.persist().await)
    }

    /// Pushes the stored attempt's expiry out by a full TTL.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::InvalidState` unless active, or the store's
    /// failure. An attempt already past its deadline moves to `Expired`.
    pub async fn extend(&mut self) -> Result<SaveReceipt, ControllerError> {
        self.require("extend", &[ControllerState::Active])?;
        if let Some(err) = self.expire_if_due().await {
            return Err(err.into());
        }
        if self.autosave.is_dirty() {
            self.persist().await;
        }
        match self.store.extend().await {
            Ok(receipt) => {
                self.expires_at = Some(receipt.expires_at);
                Ok(receipt)
            }
            Err(err) => {
                self.last_error = Some(err.kind());
                if err.kind() == ErrorKind::Expiry {
                    self.transition(ControllerState::Expired);
                }
                Err(err.into())
            }
        }
    }

    //
    // ─── SUBMISSION ────────────────────────────────────────────────────────────
    //

    fn score(
        &self,
        state: &TestState,
        selection: &QuestionSelection,
    ) -> Result<ExamResult, ControllerError> {
        let anthem = self
            .enabled
            .anthem
            .then(|| self.comparator.compare_to_anthem(state.anthem_text()));
        let history = self.enabled.history.then(|| {
            tally_section(
                selection.questions.questions(Category::History),
                state.answers(Category::History),
            )
        });
        let constitution = self.enabled.constitution.then(|| {
            tally_section(
                selection.questions.questions(Category::Constitution),
                state.answers(Category::Constitution),
            )
        });

        let results = SectionResults {
            anthem: anthem.as_ref().map(|a| a.accuracy),
            history,
            constitution,
        };
        let score = self.aggregator.aggregate(&results, self.enabled)?;
        Ok(ExamResult {
            anthem,
            history,
            constitution,
            score,
        })
    }

    /// Scores the attempt, freezes it and writes it out.
    ///
    /// The attempt is `Completed` even if the final save fails or is superseded;
    /// the save outcome is reported alongside the result and a superseded save
    /// also shows in [`SessionController::is_superseded`].
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::InvalidState` unless active, a scoring error, or
    /// `ControllerError::Store` with `Expired` once the deadline has passed.
    pub async fn submit(&mut self) -> Result<Submission, ControllerError> {
        self.require("submit", &[ControllerState::Active])?;
        if let Some(err) = self.expire_if_due().await {
            return Err(err.into());
        }
        let (Some(state), Some(selection)) = (&self.test_state, &self.selection) else {
            return Err(ControllerError::InvalidState {
                operation: "submit",
                state: self.state,
            });
        };
        let result = self.score(state, selection)?;

        let now = self.now();
        if let Some(state) = self.test_state.as_mut() {
            state.complete(now)?;
        }
        self.result = Some(result.clone());
        self.transition(ControllerState::Completed);
        info!(
            passed = result.score.overall_passed,
            score = result.score.overall_score,
            partial = result.score.partial,
            "attempt submitted"
        );

        let save = self.persist().await;
        if !save.is_saved() {
            warn!(superseded = self.superseded, "submitted attempt was not stored");
        }
        Ok(Submission { result, save })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::BankQuestion;
    use exam_core::time::fixed_clock;
    use storage::repository::InMemoryKeyValueStore;

    fn bank() -> Arc<QuestionBank> {
        let mut records = Vec::new();
        for category in Category::ALL {
            for id in 1..=10 {
                records.push(BankQuestion {
                    id,
                    text: format!("{category:?} {id}?"),
                    options: vec!["a".into(), "b".into(), "c".into()],
                    correct_index: 0,
                    category,
                });
            }
        }
        Arc::new(QuestionBank::from_questions(records).unwrap())
    }

    fn controller() -> SessionController {
        let config = ExamConfig::default();
        let store = SessionStore::new(
            Arc::new(InMemoryKeyValueStore::new()),
            &config,
            fixed_clock(),
        );
        SessionController::new(store, bank(), config)
    }

    #[tokio::test]
    async fn edits_require_an_active_attempt() {
        let mut controller = controller();
        let err = controller.set_anthem_text("Dievs").unwrap_err();
        assert!(matches!(
            err,
            ControllerError::InvalidState {
                state: ControllerState::Uninitialized,
                ..
            }
        ));
        assert!(controller.submit().await.is_err());
        assert!(controller.new_attempt(None).await.is_err());
    }

    #[tokio::test]
    async fn start_on_empty_store_begins_fresh() {
        let mut controller = controller();
        let state = controller.start(Some(12345)).await.unwrap();
        assert_eq!(state, ControllerState::Active);
        assert!(controller.session_id().is_some());
        assert!(!controller.has_pending_save());

        let progress = controller.progress().unwrap();
        assert_eq!(progress.history_total, 10);
        assert_eq!(progress.constitution_total, 8);
        assert_eq!(progress.unanswered(), 18);
        assert_eq!(
            controller.selection().unwrap().metadata.seed(),
            12345
        );
    }

    #[tokio::test]
    async fn answering_an_unselected_question_fails() {
        let mut controller = controller();
        controller.start(Some(1)).await.unwrap();
        let err = controller
            .answer(Category::History, QuestionId::new(999), 0)
            .unwrap_err();
        assert!(matches!(err, ControllerError::UnknownQuestion { .. }));
        assert!(!controller.has_pending_save());
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let mut controller = controller();
        controller.start(Some(1)).await.unwrap();
        assert!(controller.start(Some(1)).await.is_err());
    }
}
