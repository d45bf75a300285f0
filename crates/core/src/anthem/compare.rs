use serde::{Deserialize, Serialize};

/// How a single position differs between reference and submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    /// The reference has a character here, the submission does not.
    Missing,
    /// The submission has a character past the end of the reference.
    Extra,
    /// Both have a character and they differ.
    Incorrect,
}

/// One mismatching position. `line` and `column` are 1-based and follow the
/// reference text's line breaks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterDiff {
    pub position: usize,
    pub expected: Option<char>,
    pub actual: Option<char>,
    pub kind: DiffKind,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    Matched,
    Partial,
    Missing,
    Extra,
}

/// Per-line comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineStat {
    pub line: usize,
    pub expected: String,
    pub actual: String,
    pub correct: usize,
    pub accuracy: f64,
    pub status: LineStatus,
}

/// Rounds to two decimal places.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `correct / reference_len * 100`, with an empty reference scoring 100 only
/// against an empty submission.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn percentage(correct: usize, reference_len: usize, submitted_len: usize) -> f64 {
    if reference_len == 0 {
        return if submitted_len == 0 { 100.0 } else { 0.0 };
    }
    round2(correct as f64 / reference_len as f64 * 100.0)
}

/// Number of positions where both texts carry the same character.
pub(crate) fn matching_positions(submitted: &[char], reference: &[char]) -> usize {
    submitted
        .iter()
        .zip(reference)
        .filter(|(actual, expected)| actual == expected)
        .count()
}

/// Sparse position-wise diff over `max(len(submitted), len(reference))` positions.
pub(crate) fn character_diffs(submitted: &[char], reference: &[char]) -> Vec<CharacterDiff> {
    let total = submitted.len().max(reference.len());
    let mut diffs = Vec::new();
    let mut line = 1_usize;
    let mut column = 1_usize;

    for position in 0..total {
        let expected = reference.get(position).copied();
        let actual = submitted.get(position).copied();

        let kind = match (expected, actual) {
            (Some(e), Some(a)) if e == a => None,
            (Some(_), Some(_)) => Some(DiffKind::Incorrect),
            (Some(_), None) => Some(DiffKind::Missing),
            (None, Some(_)) => Some(DiffKind::Extra),
            (None, None) => None,
        };

        if let Some(kind) = kind {
            diffs.push(CharacterDiff {
                position,
                expected,
                actual,
                kind,
                line,
                column,
            });
        }

        if expected == Some('\n') {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }

    diffs
}

/// Line-by-line scores. The denominator is always the reference line's length,
/// so a truncated line is penalised and a longer one cannot exceed 100%.
pub(crate) fn line_stats(submitted: &str, reference: &str) -> Vec<LineStat> {
    let expected_lines: Vec<&str> = reference.split('\n').collect();
    let actual_lines: Vec<&str> = submitted.split('\n').collect();
    let total = expected_lines.len().max(actual_lines.len());

    (0..total)
        .map(|index| {
            let expected = expected_lines.get(index).copied();
            let actual = actual_lines.get(index).copied();
            match (expected, actual) {
                (Some(expected), Some(actual)) => {
                    let e: Vec<char> = expected.chars().collect();
                    let a: Vec<char> = actual.chars().collect();
                    let correct = matching_positions(&a, &e);
                    let status = if expected == actual {
                        LineStatus::Matched
                    } else {
                        LineStatus::Partial
                    };
                    LineStat {
                        line: index + 1,
                        expected: expected.to_owned(),
                        actual: actual.to_owned(),
                        correct,
                        accuracy: percentage(correct, e.len(), a.len()),
                        status,
                    }
                }
                (Some(expected), None) => LineStat {
                    line: index + 1,
                    expected: expected.to_owned(),
                    actual: String::new(),
                    correct: 0,
                    accuracy: 0.0,
                    status: LineStatus::Missing,
                },
                (None, Some(actual)) => LineStat {
                    line: index + 1,
                    expected: String::new(),
                    actual: actual.to_owned(),
                    correct: 0,
                    accuracy: 0.0,
                    status: LineStatus::Extra,
                },
                (None, None) => unreachable!("index is below the longer line count"),
            }
        })
        .collect()
}
