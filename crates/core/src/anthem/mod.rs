//! Free-text anthem transcription scoring.
//!
//! Both texts are normalised, then compared position by position. Accuracy is
//! always measured against the reference length.

mod classify;
mod compare;
mod normalize;

use serde::{Deserialize, Serialize};

pub use classify::{
    ErrorCategory, ErrorExample, ErrorPattern, MAX_EXAMPLES, classify, classify_errors,
    is_punctuation,
};
pub use compare::{CharacterDiff, DiffKind, LineStat, LineStatus, round2};
pub use normalize::{base_letter, normalize};

/// Default pass mark, in percent.
pub const DEFAULT_PASS_ACCURACY: f64 = 75.0;

/// Reference text candidates are asked to reproduce.
pub const ANTHEM_TEXT: &str = "Dievs, svētī Latviju,
Mūs' dārgo tēviju,
Svētī jel Latviju,
Ak, svētī jel to!

Kur latvju meitas zied,
Kur latvju dēli dzied,
Laid mums tur laimē diet,
Mūs' Latvijā!";

/// Outcome of one comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthemResult {
    /// `correct_chars / total_chars * 100`, two decimals.
    pub accuracy: f64,
    pub passed: bool,
    pub correct_chars: usize,
    /// Normalised reference length.
    pub total_chars: usize,
    /// Normalised submission length.
    pub submitted_chars: usize,
    pub diffs: Vec<CharacterDiff>,
    pub lines: Vec<LineStat>,
    pub errors: Vec<ErrorPattern>,
}

/// Scores submissions against a reference text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnthemComparator {
    pass_threshold: f64,
}

impl Default for AnthemComparator {
    fn default() -> Self {
        Self {
            pass_threshold: DEFAULT_PASS_ACCURACY,
        }
    }
}

impl AnthemComparator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_pass_threshold(mut self, threshold: f64) -> Self {
        self.pass_threshold = threshold;
        self
    }

    #[must_use]
    pub fn pass_threshold(&self) -> f64 {
        self.pass_threshold
    }

    /// Compares `submitted` against `reference` after normalising both.
    #[must_use]
    pub fn compare(&self, submitted: &str, reference: &str) -> AnthemResult {
        let submitted = normalize(submitted);
        let reference = normalize(reference);
        let s: Vec<char> = submitted.chars().collect();
        let r: Vec<char> = reference.chars().collect();

        let correct_chars = compare::matching_positions(&s, &r);
        let accuracy = compare::percentage(correct_chars, r.len(), s.len());
        let diffs = compare::character_diffs(&s, &r);
        let errors = classify_errors(&diffs);

        AnthemResult {
            accuracy,
            passed: accuracy >= self.pass_threshold,
            correct_chars,
            total_chars: r.len(),
            submitted_chars: s.len(),
            lines: compare::line_stats(&submitted, &reference),
            diffs,
            errors,
        }
    }

    /// Compares against [`ANTHEM_TEXT`].
    #[must_use]
    pub fn compare_to_anthem(&self, submitted: &str) -> AnthemResult {
        self.compare(submitted, ANTHEM_TEXT)
    }
}

/// [`AnthemComparator::compare`] with the default pass mark.
#[must_use]
pub fn compare_anthem(submitted: &str, reference: &str) -> AnthemResult {
    AnthemComparator::default().compare(submitted, reference)
}
