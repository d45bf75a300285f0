use chrono::Duration;
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("history question count must be > 0")]
    InvalidHistoryCount,

    #[error("constitution question count must be > 0")]
    InvalidConstitutionCount,

    #[error("history pass count must be between 1 and {max}")]
    InvalidHistoryPassCount { max: usize },

    #[error("constitution pass count must be between 1 and {max}")]
    InvalidConstitutionPassCount { max: usize },

    #[error("anthem pass accuracy must be in (0, 100]")]
    InvalidAnthemPassAccuracy,

    #[error("session TTL must be positive and at most 30 days")]
    InvalidSessionTtl,

    #[error("auto-save debounce must be between zero and the session TTL")]
    InvalidAutosaveDebounce,

    #[error("environment variable {key} has unparsable value {raw:?}")]
    InvalidEnvValue { key: &'static str, raw: String },
}

//
// ─── CONFIG ────────────────────────────────────────────────────────────────────
//

pub const ENV_HISTORY_COUNT: &str = "EXAM_HISTORY_COUNT";
pub const ENV_CONSTITUTION_COUNT: &str = "EXAM_CONSTITUTION_COUNT";
pub const ENV_HISTORY_PASS: &str = "EXAM_HISTORY_PASS";
pub const ENV_CONSTITUTION_PASS: &str = "EXAM_CONSTITUTION_PASS";
pub const ENV_ANTHEM_PASS: &str = "EXAM_ANTHEM_PASS";
pub const ENV_SESSION_TTL_SECS: &str = "EXAM_SESSION_TTL_SECS";
pub const ENV_COMPRESSION_THRESHOLD: &str = "EXAM_COMPRESSION_THRESHOLD";
pub const ENV_AUTOSAVE_DEBOUNCE_MS: &str = "EXAM_AUTOSAVE_DEBOUNCE_MS";

/// Longest accepted session lifetime: 30 days.
pub const MAX_SESSION_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// Tunable constants of the exam engine.
///
/// Defaults describe the standard attempt: 10 history questions (7 to pass),
/// 8 constitution questions (5 to pass), anthem accuracy of at least 75%,
/// and a two hour session lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct ExamConfig {
    history_count: usize,
    constitution_count: usize,
    history_pass_count: usize,
    constitution_pass_count: usize,
    anthem_pass_accuracy: f64,
    session_ttl: Duration,
    compression_threshold: usize,
    autosave_debounce: Duration,
}

impl Default for ExamConfig {
    fn default() -> Self {
        Self {
            history_count: 10,
            constitution_count: 8,
            history_pass_count: 7,
            constitution_pass_count: 5,
            anthem_pass_accuracy: 75.0,
            session_ttl: Duration::hours(2),
            compression_threshold: 4 * 1024,
            autosave_debounce: Duration::seconds(2),
        }
    }
}

impl ExamConfig {
    /// Checks the cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns the first violated `ConfigError`.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.history_count == 0 {
            return Err(ConfigError::InvalidHistoryCount);
        }
        if self.constitution_count == 0 {
            return Err(ConfigError::InvalidConstitutionCount);
        }
        if self.history_pass_count == 0 || self.history_pass_count > self.history_count {
            return Err(ConfigError::InvalidHistoryPassCount {
                max: self.history_count,
            });
        }
        if self.constitution_pass_count == 0
            || self.constitution_pass_count > self.constitution_count
        {
            return Err(ConfigError::InvalidConstitutionPassCount {
                max: self.constitution_count,
            });
        }
        if !self.anthem_pass_accuracy.is_finite()
            || self.anthem_pass_accuracy <= 0.0
            || self.anthem_pass_accuracy > 100.0
        {
            return Err(ConfigError::InvalidAnthemPassAccuracy);
        }
        if self.session_ttl <= Duration::zero()
            || self.session_ttl > Duration::seconds(MAX_SESSION_TTL_SECS)
        {
            return Err(ConfigError::InvalidSessionTtl);
        }
        if self.autosave_debounce < Duration::zero() || self.autosave_debounce > self.session_ttl {
            return Err(ConfigError::InvalidAutosaveDebounce);
        }
        Ok(self)
    }

    /// Defaults overridden by `EXAM_*` environment variables.
    ///
    /// Unset or unparsable variables fall back to the default value.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`ExamConfig::from_env`] but reports unparsable values and invalid combinations.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvValue` or a validation error.
    pub fn try_from_env() -> Result<Self, ConfigError> {
        Self::try_from_lookup(|key| std::env::var(key).ok())
    }

    /// Lenient variant of [`ExamConfig::try_from_lookup`].
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lenient = |key: &str| lookup(key).filter(|raw| !raw.trim().is_empty());
        let mut candidate = Self::default();
        if let Some(v) = lenient(ENV_HISTORY_COUNT).and_then(|v| v.trim().parse().ok()) {
            candidate.history_count = v;
        }
        if let Some(v) = lenient(ENV_CONSTITUTION_COUNT).and_then(|v| v.trim().parse().ok()) {
            candidate.constitution_count = v;
        }
        if let Some(v) = lenient(ENV_HISTORY_PASS).and_then(|v| v.trim().parse().ok()) {
            candidate.history_pass_count = v;
        }
        if let Some(v) = lenient(ENV_CONSTITUTION_PASS).and_then(|v| v.trim().parse().ok()) {
            candidate.constitution_pass_count = v;
        }
        if let Some(v) = lenient(ENV_ANTHEM_PASS).and_then(|v| v.trim().parse().ok()) {
            candidate.anthem_pass_accuracy = v;
        }
        if let Some(v) = lenient(ENV_SESSION_TTL_SECS)
            .and_then(|v| v.trim().parse().ok())
            .and_then(Duration::try_seconds)
        {
            candidate.session_ttl = v;
        }
        if let Some(v) = lenient(ENV_COMPRESSION_THRESHOLD).and_then(|v| v.trim().parse().ok()) {
            candidate.compression_threshold = v;
        }
        if let Some(v) = lenient(ENV_AUTOSAVE_DEBOUNCE_MS)
            .and_then(|v| v.trim().parse().ok())
            .and_then(Duration::try_milliseconds)
        {
            candidate.autosave_debounce = v;
        }
        // An inconsistent combination falls back to defaults as a whole.
        candidate.validate().unwrap_or_default()
    }

    /// Builds a config from an arbitrary key lookup (the environment in production).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvValue` for unparsable values, or a validation error.
    pub fn try_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        fn duration(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &'static str,
            from: fn(i64) -> Option<Duration>,
        ) -> Result<Option<Duration>, ConfigError> {
            let Some(v) = parse::<i64>(lookup, key)? else {
                return Ok(None);
            };
            from(v).map(Some).ok_or_else(|| ConfigError::InvalidEnvValue {
                key,
                raw: v.to_string(),
            })
        }

        fn parse<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &'static str,
        ) -> Result<Option<T>, ConfigError> {
            match lookup(key) {
                None => Ok(None),
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map(Some)
                    .map_err(|_| ConfigError::InvalidEnvValue { key, raw }),
            }
        }

        let mut config = Self::default();
        if let Some(v) = parse(&lookup, ENV_HISTORY_COUNT)? {
            config.history_count = v;
        }
        if let Some(v) = parse(&lookup, ENV_CONSTITUTION_COUNT)? {
            config.constitution_count = v;
        }
        if let Some(v) = parse(&lookup, ENV_HISTORY_PASS)? {
            config.history_pass_count = v;
        }
        if let Some(v) = parse(&lookup, ENV_CONSTITUTION_PASS)? {
            config.constitution_pass_count = v;
        }
        if let Some(v) = parse(&lookup, ENV_ANTHEM_PASS)? {
            config.anthem_pass_accuracy = v;
        }
        if let Some(v) = duration(&lookup, ENV_SESSION_TTL_SECS, Duration::try_seconds)? {
            config.session_ttl = v;
        }
        if let Some(v) = parse(&lookup, ENV_COMPRESSION_THRESHOLD)? {
            config.compression_threshold = v;
        }
        if let Some(v) = duration(&lookup, ENV_AUTOSAVE_DEBOUNCE_MS, Duration::try_milliseconds)? {
            config.autosave_debounce = v;
        }
        config.validate()
    }

    #[must_use]
    pub fn with_question_counts(mut self, history: usize, constitution: usize) -> Self {
        self.history_count = history;
        self.constitution_count = constitution;
        self
    }

    #[must_use]
    pub fn with_pass_counts(mut self, history: usize, constitution: usize) -> Self {
        self.history_pass_count = history;
        self.constitution_pass_count = constitution;
        self
    }

    #[must_use]
    pub fn with_anthem_pass_accuracy(mut self, accuracy: f64) -> Self {
        self.anthem_pass_accuracy = accuracy;
        self
    }

    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_compression_threshold(mut self, bytes: usize) -> Self {
        self.compression_threshold = bytes;
        self
    }

    #[must_use]
    pub fn with_autosave_debounce(mut self, debounce: Duration) -> Self {
        self.autosave_debounce = debounce;
        self
    }

    #[must_use]
    pub fn history_count(&self) -> usize {
        self.history_count
    }

    #[must_use]
    pub fn constitution_count(&self) -> usize {
        self.constitution_count
    }

    #[must_use]
    pub fn history_pass_count(&self) -> usize {
        self.history_pass_count
    }

    #[must_use]
    pub fn constitution_pass_count(&self) -> usize {
        self.constitution_pass_count
    }

    #[must_use]
    pub fn anthem_pass_accuracy(&self) -> f64 {
        self.anthem_pass_accuracy
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    #[must_use]
    pub fn compression_threshold(&self) -> usize {
        self.compression_threshold
    }

    #[must_use]
    pub fn autosave_debounce(&self) -> Duration {
        self.autosave_debounce
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = ExamConfig::default().validate().unwrap();
        assert_eq!(config.history_count(), 10);
        assert_eq!(config.constitution_count(), 8);
        assert_eq!(config.history_pass_count(), 7);
        assert_eq!(config.constitution_pass_count(), 5);
        assert_eq!(config.session_ttl(), Duration::hours(2));
    }

    #[test]
    fn pass_count_above_section_size_is_rejected() {
        let err = ExamConfig::default()
            .with_pass_counts(11, 5)
            .validate()
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidHistoryPassCount { max: 10 });
    }

    #[test]
    fn anthem_threshold_must_be_a_percentage() {
        let err = ExamConfig::default()
            .with_anthem_pass_accuracy(120.0)
            .validate()
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidAnthemPassAccuracy);
    }

    #[test]
    fn lookup_overrides_defaults() {
        let config = ExamConfig::try_from_lookup(lookup_from(&[
            (ENV_SESSION_TTL_SECS, "600"),
            (ENV_HISTORY_COUNT, " 12 "),
        ]))
        .unwrap();
        assert_eq!(config.session_ttl(), Duration::minutes(10));
        assert_eq!(config.history_count(), 12);
        assert_eq!(config.constitution_count(), 8);
    }

    #[test]
    fn strict_lookup_reports_garbage() {
        let err =
            ExamConfig::try_from_lookup(lookup_from(&[(ENV_ANTHEM_PASS, "lots")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnvValue {
                key: ENV_ANTHEM_PASS,
                ..
            }
        ));
    }

    #[test]
    fn lenient_lookup_ignores_garbage_and_bad_combinations() {
        let config = ExamConfig::from_lookup(lookup_from(&[
            (ENV_ANTHEM_PASS, "lots"),
            (ENV_HISTORY_PASS, "80"),
        ]));
        assert_eq!(config, ExamConfig::default());
    }

    #[test]
    fn out_of_range_durations_fall_back_to_defaults() {
        let max = i64::MAX.to_string();
        let config = ExamConfig::from_lookup(lookup_from(&[
            (ENV_SESSION_TTL_SECS, max.as_str()),
            (ENV_AUTOSAVE_DEBOUNCE_MS, max.as_str()),
        ]));
        assert_eq!(config, ExamConfig::default());

        let config = ExamConfig::from_lookup(lookup_from(&[(ENV_SESSION_TTL_SECS, "31536000")]));
        assert_eq!(config.session_ttl(), Duration::hours(2));
    }

    #[test]
    fn strict_lookup_rejects_out_of_range_durations() {
        let max = i64::MAX.to_string();
        let err = ExamConfig::try_from_lookup(lookup_from(&[(ENV_SESSION_TTL_SECS, max.as_str())]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidEnvValue {
                key: ENV_SESSION_TTL_SECS,
                raw: max.clone(),
            }
        );

        let err =
            ExamConfig::try_from_lookup(lookup_from(&[(ENV_AUTOSAVE_DEBOUNCE_MS, max.as_str())]))
                .unwrap_err();
        assert_eq!(err, ConfigError::InvalidAutosaveDebounce);

        let err = ExamConfig::try_from_lookup(lookup_from(&[(ENV_SESSION_TTL_SECS, "2592001")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidSessionTtl);
    }

    #[test]
    fn debounce_longer_than_the_session_is_rejected() {
        let err = ExamConfig::default()
            .with_session_ttl(Duration::minutes(1))
            .with_autosave_debounce(Duration::minutes(2))
            .validate()
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidAutosaveDebounce);
    }
}
