use serde::{Deserialize, Serialize};

use super::compare::{CharacterDiff, DiffKind};
use super::normalize::base_letter;

/// Examples retained per bucket.
pub const MAX_EXAMPLES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    DiacriticMissing,
    CaseError,
    Punctuation,
    Spelling,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 4] = [
        ErrorCategory::DiacriticMissing,
        ErrorCategory::CaseError,
        ErrorCategory::Punctuation,
        ErrorCategory::Spelling,
    ];

    /// Fixed hint shown to the candidate for this kind of mistake.
    #[must_use]
    pub fn suggestion(self) -> &'static str {
        match self {
            ErrorCategory::DiacriticMissing => {
                "Pievērsiet uzmanību garumzīmēm un mīkstinājuma zīmēm (ā, ē, ī, ū, č, š, ž, ģ, ķ, ļ, ņ)."
            }
            ErrorCategory::CaseError => "Pārbaudiet lielo un mazo burtu lietojumu.",
            ErrorCategory::Punctuation => "Pārbaudiet pieturzīmes: komatus, punktus un izsaukuma zīmes.",
            ErrorCategory::Spelling => "Pārbaudiet vārdu pareizrakstību.",
        }
    }
}

/// One `actual → expected` sample of a classified mistake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorExample {
    pub position: usize,
    pub actual: char,
    pub expected: char,
}

/// A bucket of same-category mistakes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPattern {
    pub category: ErrorCategory,
    pub count: usize,
    pub examples: Vec<ErrorExample>,
    pub suggestion: String,
}

/// Punctuation for classification purposes: ASCII punctuation plus the
/// typographic quotes and dashes people paste in.
#[must_use]
pub fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation() || matches!(c, '‘' | '’' | '“' | '”' | '„' | '–' | '—' | '…' | '«' | '»')
}

/// Decides which bucket a substituted character belongs to.
#[must_use]
pub fn classify(expected: char, actual: char) -> ErrorCategory {
    if base_letter(expected) == Some(actual) {
        return ErrorCategory::DiacriticMissing;
    }
    if expected != actual && expected.to_lowercase().eq(actual.to_lowercase()) {
        return ErrorCategory::CaseError;
    }
    if is_punctuation(expected) || is_punctuation(actual) {
        return ErrorCategory::Punctuation;
    }
    ErrorCategory::Spelling
}

/// Buckets the `Incorrect` diffs. Only non-empty buckets are returned, in
/// [`ErrorCategory::ALL`] order.
#[must_use]
pub fn classify_errors(diffs: &[CharacterDiff]) -> Vec<ErrorPattern> {
    let mut patterns: Vec<ErrorPattern> = ErrorCategory::ALL
        .iter()
        .map(|&category| ErrorPattern {
            category,
            count: 0,
            examples: Vec::new(),
            suggestion: category.suggestion().to_owned(),
        })
        .collect();

    for diff in diffs.iter().filter(|d| d.kind == DiffKind::Incorrect) {
        let (Some(expected), Some(actual)) = (diff.expected, diff.actual) else {
            continue;
        };
        let category = classify(expected, actual);
        let Some(pattern) = patterns.iter_mut().find(|p| p.category == category) else {
            continue;
        };
        pattern.count += 1;
        if pattern.examples.len() < MAX_EXAMPLES {
            pattern.examples.push(ErrorExample {
                position: diff.position,
                actual,
                expected,
            });
        }
    }

    patterns.retain(|p| p.count > 0);
    patterns
}
