use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use exam_core::anthem::ANTHEM_TEXT;
use exam_core::config::ExamConfig;
use exam_core::model::{BankQuestion, Category, QuestionBank, Section};
use exam_core::scoring::EnabledSections;
use exam_core::time::fixed_clock;
use services::{Clock, ControllerError, ControllerState, RecoveryChoice, SessionController};
use storage::repository::{
    InMemoryKeyValueStore, KeyValueStore, StorageError, StorageEstimate,
};
use storage::session::{ErrorKind, SESSION_KEY, SaveOutcome, SessionStore};

fn bank() -> Arc<QuestionBank> {
    let mut records = Vec::new();
    for category in Category::ALL {
        for id in 1..=12 {
            records.push(BankQuestion {
                id,
                text: format!("{category:?} question {id}?"),
                options: vec![
                    format!("right {id}"),
                    format!("wrong {id}"),
                    format!("also wrong {id}"),
                ],
                correct_index: 0,
                category,
            });
        }
    }
    Arc::new(QuestionBank::from_questions(records).expect("bank"))
}

fn controller_on(kv: Arc<dyn KeyValueStore>, clock: Clock) -> SessionController {
    let config = ExamConfig::default();
    let store = SessionStore::new(kv, &config, clock);
    SessionController::new(store, bank(), config)
}

fn answer_everything_correctly(controller: &mut SessionController) {
    let selection = controller.selection().expect("selection").clone();
    for category in Category::ALL {
        for question in selection.questions.questions(category) {
            controller
                .answer(category, question.id(), question.correct_index())
                .unwrap();
        }
    }
}

async fn rewrite_stored(kv: &InMemoryKeyValueStore, from: &str, to: &str) {
    let bytes = kv.get(SESSION_KEY).await.unwrap().expect("stored session");
    let text = String::from_utf8(bytes).expect("plain json envelope");
    assert!(text.contains(from), "stored record lacks {from}");
    kv.set(SESSION_KEY, text.replacen(from, to, 1).as_bytes())
        .await
        .unwrap();
}

#[tokio::test]
async fn full_attempt_earns_certificate_and_reloads_completed() {
    let kv = InMemoryKeyValueStore::new();
    let mut controller = controller_on(Arc::new(kv.clone()), fixed_clock());
    assert_eq!(controller.start(Some(2024)).await.unwrap(), ControllerState::Active);

    controller.set_anthem_text(ANTHEM_TEXT).unwrap();
    answer_everything_correctly(&mut controller);
    controller.set_section(Section::Constitution).unwrap();

    let submission = controller.submit().await.unwrap();
    assert!(submission.save.is_saved());
    let score = &submission.result.score;
    assert!(score.overall_passed);
    assert!(score.certificate_eligible);
    assert!(!score.partial);
    assert!((submission.result.anthem.as_ref().unwrap().accuracy - 100.0).abs() < f64::EPSILON);
    assert_eq!(controller.state(), ControllerState::Completed);
    assert!(controller.set_anthem_text("late edit").is_err());

    let mut reopened = controller_on(Arc::new(kv), fixed_clock());
    assert_eq!(reopened.start(None).await.unwrap(), ControllerState::Completed);
    assert_eq!(reopened.session_id(), controller.session_id());
    assert_eq!(reopened.result().unwrap().score, submission.result.score);
    assert!(reopened.progress().unwrap().is_complete);
}

#[tokio::test]
async fn resumes_the_same_questions_after_restart() {
    let kv = InMemoryKeyValueStore::new();
    let mut first = controller_on(Arc::new(kv.clone()), fixed_clock());
    first.start(Some(7)).await.unwrap();
    first.set_anthem_text("Dievs, svētī").unwrap();
    first.save_now().await.unwrap();

    let mut second = controller_on(Arc::new(kv), fixed_clock());
    assert_eq!(second.start(Some(99)).await.unwrap(), ControllerState::Active);
    assert_eq!(second.questions(), first.questions());
    assert_eq!(second.test_state().unwrap().anthem_text(), "Dievs, svētī");
    assert_eq!(second.selection().unwrap().metadata.seed(), 7);
}

#[tokio::test]
async fn expired_attempt_is_reported_then_replaced() {
    let kv = InMemoryKeyValueStore::new();
    let mut first = controller_on(Arc::new(kv.clone()), fixed_clock());
    first.start(Some(1)).await.unwrap();

    let later = fixed_clock().advanced(Duration::hours(3));
    let mut second = controller_on(Arc::new(kv.clone()), later);
    assert_eq!(second.start(None).await.unwrap(), ControllerState::Expired);
    assert_eq!(second.last_error(), Some(ErrorKind::Expiry));
    assert!(kv.get(SESSION_KEY).await.unwrap().is_none());

    assert!(second.new_attempt(Some(2)).await.unwrap().is_saved());
    assert_eq!(second.state(), ControllerState::Active);
    assert_ne!(second.session_id(), first.session_id());
}

#[tokio::test]
async fn tampered_attempt_goes_through_recovery() {
    let kv = InMemoryKeyValueStore::new();
    let mut first = controller_on(Arc::new(kv.clone()), fixed_clock());
    first.start(Some(1)).await.unwrap();
    rewrite_stored(&kv, r#""anthemText":"""#, r#""anthemText":"forged""#).await;

    let mut second = controller_on(Arc::new(kv.clone()), fixed_clock());
    assert_eq!(second.start(None).await.unwrap(), ControllerState::Recovering);
    assert_eq!(second.last_error(), Some(ErrorKind::Integrity));
    assert!(second.test_state().is_none());
    assert!(second.set_anthem_text("nope").is_err());

    let state = second
        .resolve_recovery(RecoveryChoice::Discard, Some(5))
        .await
        .unwrap();
    assert_eq!(state, ControllerState::Active);
    assert_eq!(second.last_error(), None);
    assert_eq!(second.test_state().unwrap().anthem_text(), "");
    assert_ne!(second.session_id(), first.session_id());
}

#[tokio::test]
async fn start_fresh_overwrites_untrusted_record() {
    let kv = InMemoryKeyValueStore::new();
    let mut first = controller_on(Arc::new(kv.clone()), fixed_clock());
    first.start(Some(1)).await.unwrap();
    kv.set(SESSION_KEY, b"J{not json").await.unwrap();

    let mut second = controller_on(Arc::new(kv.clone()), fixed_clock());
    assert_eq!(second.start(None).await.unwrap(), ControllerState::Recovering);
    assert_eq!(second.last_error(), Some(ErrorKind::Serialization));

    second
        .resolve_recovery(RecoveryChoice::StartFresh, Some(3))
        .await
        .unwrap();
    assert_eq!(second.state(), ControllerState::Active);

    let mut third = controller_on(Arc::new(kv), fixed_clock());
    assert_eq!(third.start(None).await.unwrap(), ControllerState::Active);
    assert_eq!(third.session_id(), second.session_id());
}

#[tokio::test]
async fn unsupported_version_errors_until_new_attempt() {
    let kv = InMemoryKeyValueStore::new();
    let mut first = controller_on(Arc::new(kv.clone()), fixed_clock());
    first.start(Some(1)).await.unwrap();
    rewrite_stored(&kv, r#""version":"1""#, r#""version":"2""#).await;

    let mut second = controller_on(Arc::new(kv.clone()), fixed_clock());
    assert_eq!(second.start(None).await.unwrap(), ControllerState::Errored);
    assert_eq!(second.last_error(), Some(ErrorKind::Validation));
    assert!(
        second
            .resolve_recovery(RecoveryChoice::Discard, None)
            .await
            .is_err()
    );

    second.new_attempt(Some(8)).await.unwrap();
    assert_eq!(second.state(), ControllerState::Active);
}

#[tokio::test]
async fn tick_waits_for_the_debounce() {
    let kv = InMemoryKeyValueStore::new();
    let mut controller = controller_on(Arc::new(kv.clone()), fixed_clock());
    controller.start(Some(1)).await.unwrap();
    assert!(controller.tick().await.is_none());

    controller.set_anthem_text("Dievs").unwrap();
    assert!(controller.has_pending_save());
    controller.clock_mut().advance(Duration::seconds(1));
    assert!(controller.tick().await.is_none());

    controller.set_anthem_text("Dievs, svētī").unwrap();
    controller.clock_mut().advance(Duration::seconds(1));
    assert!(controller.tick().await.is_none());

    controller.clock_mut().advance(Duration::seconds(1));
    let outcome = controller.tick().await.expect("save due");
    assert_eq!(outcome.receipt().unwrap().save_count, 2);
    assert!(!controller.has_pending_save());
    assert!(controller.tick().await.is_none());

    let info = controller.store().info().await.unwrap().unwrap();
    assert_eq!(info.save_count, 2);
}

#[tokio::test]
async fn extend_pushes_expiry_out() {
    let kv = InMemoryKeyValueStore::new();
    let mut controller = controller_on(Arc::new(kv), fixed_clock());
    controller.start(Some(1)).await.unwrap();
    let before = controller.store().info().await.unwrap().unwrap().expires_at;

    controller.clock_mut().advance(Duration::minutes(90));
    let receipt = controller.extend().await.unwrap();
    assert_eq!(receipt.expires_at, before + Duration::minutes(90));

    controller.clock_mut().advance(Duration::minutes(60));
    let info = controller.store().info().await.unwrap().unwrap();
    assert_eq!(info.remaining, Duration::minutes(60));
}

#[tokio::test]
async fn partial_attempt_passes_but_is_not_eligible() {
    let kv = InMemoryKeyValueStore::new();
    let mut controller = controller_on(Arc::new(kv), fixed_clock())
        .with_enabled_sections(EnabledSections::only(&[Section::History]));
    controller.start(Some(11)).await.unwrap();
    answer_everything_correctly(&mut controller);

    let submission = controller.submit().await.unwrap();
    let result = submission.result;
    assert!(result.anthem.is_none());
    assert!(result.constitution.is_none());
    assert_eq!(result.history.unwrap().correct, 10);
    assert!(result.score.overall_passed);
    assert!(result.score.partial);
    assert!(!result.score.certificate_eligible);
}

#[tokio::test]
async fn failing_answers_do_not_pass() {
    let kv = InMemoryKeyValueStore::new();
    let mut controller = controller_on(Arc::new(kv), fixed_clock());
    controller.start(Some(11)).await.unwrap();
    controller.set_anthem_text(ANTHEM_TEXT).unwrap();

    let result = controller.submit().await.unwrap().result;
    assert_eq!(result.history.unwrap().answered, 0);
    assert!(!result.score.overall_passed);
    assert!(!result.score.certificate_eligible);
}

#[tokio::test]
async fn older_snapshot_from_a_second_controller_is_stale() {
    let kv = InMemoryKeyValueStore::new();
    let mut a = controller_on(Arc::new(kv.clone()), fixed_clock());
    a.start(Some(1)).await.unwrap();

    let mut b = controller_on(Arc::new(kv.clone()), fixed_clock().advanced(Duration::minutes(1)));
    b.start(None).await.unwrap();
    assert_eq!(b.session_id(), a.session_id());
    b.set_section(Section::History).unwrap();
    assert!(b.save_now().await.unwrap().is_saved());

    a.set_section(Section::Constitution).unwrap();
    let outcome = a.save_now().await.unwrap();
    assert!(matches!(outcome, SaveOutcome::Stale { stored_save_count: 2, .. }));
    assert!(!a.has_pending_save());
    assert!(a.is_superseded());

    let mut c = controller_on(Arc::new(kv), fixed_clock().advanced(Duration::minutes(2)));
    c.start(None).await.unwrap();
    assert_eq!(c.test_state().unwrap().current_section(), Section::History);
}

#[tokio::test]
async fn submit_over_a_newer_snapshot_reports_it_superseded() {
    let kv = InMemoryKeyValueStore::new();
    let mut a = controller_on(Arc::new(kv.clone()), fixed_clock());
    a.start(Some(1)).await.unwrap();
    a.set_anthem_text("Dievs").unwrap();

    let mut b = controller_on(Arc::new(kv.clone()), fixed_clock().advanced(Duration::minutes(1)));
    b.start(None).await.unwrap();
    b.set_anthem_text("Dievs, svētī Latviju").unwrap();
    assert!(b.save_now().await.unwrap().is_saved());
    assert!(!b.is_superseded());

    let submission = a.submit().await.unwrap();
    assert!(!submission.save.is_saved());
    assert!(matches!(submission.save, SaveOutcome::Stale { .. }));
    assert!(a.is_superseded());
    assert_eq!(a.state(), ControllerState::Completed);

    let mut c = controller_on(Arc::new(kv), fixed_clock().advanced(Duration::minutes(2)));
    assert_eq!(c.start(None).await.unwrap(), ControllerState::Active);
    assert_eq!(c.test_state().unwrap().anthem_text(), "Dievs, svētī Latviju");
}

#[tokio::test]
async fn tick_past_the_deadline_expires_the_attempt() {
    let kv = InMemoryKeyValueStore::new();
    let mut controller = controller_on(Arc::new(kv.clone()), fixed_clock());
    controller.start(Some(1)).await.unwrap();
    let deadline = controller.expires_at().expect("deadline after first save");
    controller.set_anthem_text("Dievs").unwrap();

    controller.clock_mut().advance(Duration::hours(2));
    assert_eq!(controller.state(), ControllerState::Active);
    assert!(controller.tick().await.unwrap().is_saved());

    controller.clock_mut().advance(Duration::seconds(1));
    let outcome = controller.tick().await.expect("expiry reported");
    let SaveOutcome::Failed(err) = outcome else {
        panic!("expected an expiry failure, got {outcome:?}");
    };
    assert_eq!(err.kind(), ErrorKind::Expiry);
    assert_eq!(controller.state(), ControllerState::Expired);
    assert_eq!(controller.last_error(), Some(ErrorKind::Expiry));
    assert_eq!(controller.expires_at(), Some(deadline));
    assert!(!controller.has_pending_save());
    assert!(kv.get(SESSION_KEY).await.unwrap().is_none());
    assert!(controller.tick().await.is_none());

    assert!(controller.new_attempt(Some(2)).await.unwrap().is_saved());
    assert_eq!(controller.state(), ControllerState::Active);
}

#[tokio::test]
async fn save_now_past_the_deadline_does_not_write() {
    let kv = InMemoryKeyValueStore::new();
    let mut controller = controller_on(Arc::new(kv.clone()), fixed_clock());
    controller.start(Some(1)).await.unwrap();
    controller.clock_mut().advance(Duration::hours(3));
    controller.set_anthem_text("Dievs").unwrap();

    let outcome = controller.save_now().await.unwrap();
    assert!(matches!(outcome, SaveOutcome::Failed(ref err) if err.kind() == ErrorKind::Expiry));
    assert_eq!(controller.state(), ControllerState::Expired);
    assert!(kv.get(SESSION_KEY).await.unwrap().is_none());
    assert!(controller.set_anthem_text("Dievs, svētī").is_err());
}

#[tokio::test]
async fn submit_and_extend_past_the_deadline_fail_with_expiry() {
    let kv = InMemoryKeyValueStore::new();
    let mut submitting = controller_on(Arc::new(kv.clone()), fixed_clock());
    submitting.start(Some(1)).await.unwrap();
    answer_everything_correctly(&mut submitting);
    submitting.clock_mut().advance(Duration::hours(3));

    let err = submitting.submit().await.unwrap_err();
    assert!(matches!(err, ControllerError::Store(ref e) if e.kind() == ErrorKind::Expiry));
    assert_eq!(submitting.state(), ControllerState::Expired);
    assert!(submitting.result().is_none());

    let mut extending = controller_on(Arc::new(kv.clone()), fixed_clock());
    extending.start(Some(1)).await.unwrap();
    extending.clock_mut().advance(Duration::hours(3));
    let err = extending.extend().await.unwrap_err();
    assert!(matches!(err, ControllerError::Store(ref e) if e.kind() == ErrorKind::Expiry));
    assert_eq!(extending.state(), ControllerState::Expired);
    assert!(kv.get(SESSION_KEY).await.unwrap().is_none());
}

#[tokio::test]
async fn quota_failure_keeps_the_save_pending() {
    let kv = InMemoryKeyValueStore::with_quota(64);
    let mut controller = controller_on(Arc::new(kv.clone()), fixed_clock());
    assert_eq!(controller.start(Some(1)).await.unwrap(), ControllerState::Active);
    assert_eq!(controller.last_error(), Some(ErrorKind::Quota));
    assert!(controller.has_pending_save());
    assert!(kv.get(SESSION_KEY).await.unwrap().is_none());
}

/// Reads succeed, writes always fail.
struct ReadOnlyStore(InMemoryKeyValueStore);

#[async_trait]
impl KeyValueStore for ReadOnlyStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.0.get(key).await
    }

    async fn set(&self, _key: &str, _value: &[u8]) -> Result<(), StorageError> {
        Err(StorageError::Connection("read-only".into()))
    }

    async fn compare_and_set(
        &self,
        _key: &str,
        _expected: Option<&[u8]>,
        _value: &[u8],
    ) -> Result<bool, StorageError> {
        Err(StorageError::Connection("read-only".into()))
    }

    async fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Connection("read-only".into()))
    }

    async fn size_estimate(&self) -> Result<StorageEstimate, StorageError> {
        self.0.size_estimate().await
    }
}

#[tokio::test]
async fn storage_failures_are_retried_after_the_debounce() {
    let mut controller = controller_on(
        Arc::new(ReadOnlyStore(InMemoryKeyValueStore::new())),
        fixed_clock(),
    );
    assert_eq!(controller.start(Some(1)).await.unwrap(), ControllerState::Active);
    assert_eq!(controller.last_error(), Some(ErrorKind::Storage));

    assert!(controller.tick().await.is_none());
    controller.clock_mut().advance(Duration::seconds(2));
    let outcome = controller.tick().await.expect("retry due");
    assert!(matches!(outcome, SaveOutcome::Failed(ref err) if err.is_retryable()));

    assert!(controller.new_attempt(None).await.is_err());
}
