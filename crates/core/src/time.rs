use chrono::{DateTime, Duration, Utc};

/// Wall clock for an exam attempt.
///
/// Session expiry, auto-save debounce and the default selection seed all read
/// the time through here. A `Pinned` clock only moves when told to.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    System,
    Pinned(DateTime<Utc>),
}

impl Clock {
    #[must_use]
    pub fn system() -> Self {
        Self::System
    }

    #[must_use]
    pub fn pinned(at: DateTime<Utc>) -> Self {
        Self::Pinned(at)
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Pinned(t) => *t,
        }
    }

    /// Unix milliseconds, clamped at zero. Seeds question selection when the
    /// caller gives no seed.
    #[must_use]
    pub fn now_millis(&self) -> u64 {
        u64::try_from(self.now().timestamp_millis()).unwrap_or(0)
    }

    /// `now + ttl`, or `None` when that is past the representable range.
    #[must_use]
    pub fn deadline(&self, ttl: Duration) -> Option<DateTime<Utc>> {
        self.now().checked_add_signed(ttl)
    }

    /// Whether `deadline` lies strictly in the past. A deadline equal to now
    /// has not passed yet.
    #[must_use]
    pub fn has_passed(&self, deadline: DateTime<Utc>) -> bool {
        self.now() > deadline
    }

    /// Moves a pinned clock forward, saturating at the end of the
    /// representable range. The system clock ignores this.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Pinned(t) = self {
            *t = t.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC);
        }
    }

    #[must_use]
    pub fn advanced(mut self, delta: Duration) -> Self {
        self.advance(delta);
        self
    }

    #[must_use]
    pub fn is_pinned(&self) -> bool {
        matches!(self, Clock::Pinned(_))
    }
}

/// Reference instant for deterministic attempts (2023-11-14T22:13:20Z).
pub const REFERENCE_TIMESTAMP: i64 = 1_700_000_000;

/// [`REFERENCE_TIMESTAMP`] as a `DateTime`.
///
/// # Panics
///
/// Panics if the reference timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(REFERENCE_TIMESTAMP, 0)
        .expect("reference timestamp should be valid")
}

/// A clock pinned at [`REFERENCE_TIMESTAMP`].
#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::pinned(fixed_now())
}
