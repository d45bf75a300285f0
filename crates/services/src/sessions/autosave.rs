use chrono::{DateTime, Duration, Utc};

/// Debounce policy for background saves.
///
/// Every edit pushes the deadline out by `debounce`; a save becomes due once the
/// attempt has been quiet that long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoSave {
    debounce: Duration,
    last_edit: Option<DateTime<Utc>>,
}

impl AutoSave {
    #[must_use]
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            last_edit: None,
        }
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Records an edit at `at`.
    pub fn mark_dirty(&mut self, at: DateTime<Utc>) {
        self.last_edit = Some(at);
    }

    /// Nothing left to write: the latest state was saved or superseded.
    pub fn mark_saved(&mut self) {
        self.last_edit = None;
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.last_edit.is_some()
    }

    #[must_use]
    pub fn due(&self, now: DateTime<Utc>) -> bool {
        self.last_edit
            .is_some_and(|edited| now - edited >= self.debounce)
    }

    /// When the pending save becomes due, if there is one and it is representable.
    #[must_use]
    pub fn due_at(&self) -> Option<DateTime<Utc>> {
        self.last_edit
            .and_then(|edited| edited.checked_add_signed(self.debounce))
    }
}
