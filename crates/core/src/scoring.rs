use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::anthem::round2;
use crate::config::ExamConfig;
use crate::model::{Question, QuestionId, Section};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ScoreError {
    #[error("no sections are enabled")]
    NoSectionsEnabled,
    #[error("section {0:?} is enabled but has no result")]
    MissingSection(Section),
    #[error("section {section:?} tally is inconsistent: {correct} correct, {answered} answered of {total}")]
    InvalidTally {
        section: Section,
        correct: usize,
        answered: usize,
        total: usize,
    },
    #[error("anthem accuracy {0} is outside 0..=100")]
    InvalidAccuracy(f64),
}

//
// ─── SECTION TALLIES ───────────────────────────────────────────────────────────
//

/// Raw count for one multiple-choice section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionTally {
    pub correct: usize,
    pub answered: usize,
    pub total: usize,
}

impl SectionTally {
    /// `correct / total * 100`, two decimals. An empty section scores 0.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        round2(self.correct as f64 / self.total as f64 * 100.0)
    }
}

/// Counts correct answers over `questions`. Unanswered questions count as wrong;
/// answers for ids outside `questions` are ignored.
#[must_use]
pub fn tally_section(questions: &[Question], answers: &BTreeMap<QuestionId, u8>) -> SectionTally {
    let mut tally = SectionTally {
        correct: 0,
        answered: 0,
        total: questions.len(),
    };
    for question in questions {
        if let Some(&answer) = answers.get(&question.id()) {
            tally.answered += 1;
            if question.is_correct(answer) {
                tally.correct += 1;
            }
        }
    }
    tally
}

//
// ─── INPUTS ────────────────────────────────────────────────────────────────────
//

/// Which sections an attempt covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnabledSections {
    pub anthem: bool,
    pub history: bool,
    pub constitution: bool,
}

impl Default for EnabledSections {
    fn default() -> Self {
        Self::all()
    }
}

impl EnabledSections {
    #[must_use]
    pub const fn all() -> Self {
        Self {
            anthem: true,
            history: true,
            constitution: true,
        }
    }

    #[must_use]
    pub fn only(sections: &[Section]) -> Self {
        Self {
            anthem: sections.contains(&Section::Anthem),
            history: sections.contains(&Section::History),
            constitution: sections.contains(&Section::Constitution),
        }
    }

    #[must_use]
    pub fn contains(&self, section: Section) -> bool {
        match section {
            Section::Anthem => self.anthem,
            Section::History => self.history,
            Section::Constitution => self.constitution,
        }
    }

    /// A full attempt covers every section; anything less is partial.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.anthem && self.history && self.constitution
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !(self.anthem || self.history || self.constitution)
    }

    pub fn iter(&self) -> impl Iterator<Item = Section> + '_ {
        Section::ALL.into_iter().filter(|s| self.contains(*s))
    }
}

/// Per-section raw results fed into [`ScoreAggregator::aggregate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionResults {
    /// Anthem accuracy in percent.
    pub anthem: Option<f64>,
    pub history: Option<SectionTally>,
    pub constitution: Option<SectionTally>,
}

//
// ─── OUTPUT ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SectionScore {
    pub section: Section,
    pub percentage: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub anthem: Option<SectionScore>,
    pub history: Option<SectionScore>,
    pub constitution: Option<SectionScore>,
    /// AND over enabled sections.
    pub overall_passed: bool,
    /// Mean of enabled sections' percentages, two decimals.
    pub overall_score: f64,
    pub certificate_eligible: bool,
    pub partial: bool,
}

impl ScoreResult {
    #[must_use]
    pub fn section(&self, section: Section) -> Option<&SectionScore> {
        match section {
            Section::Anthem => self.anthem.as_ref(),
            Section::History => self.history.as_ref(),
            Section::Constitution => self.constitution.as_ref(),
        }
    }
}

//
// ─── AGGREGATOR ────────────────────────────────────────────────────────────────
//

/// Turns section results into the final verdict using the configured pass marks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreAggregator {
    anthem_pass_accuracy: f64,
    history_pass_count: usize,
    constitution_pass_count: usize,
}

impl Default for ScoreAggregator {
    fn default() -> Self {
        Self::from_config(&ExamConfig::default())
    }
}

impl ScoreAggregator {
    #[must_use]
    pub fn from_config(config: &ExamConfig) -> Self {
        Self {
            anthem_pass_accuracy: config.anthem_pass_accuracy(),
            history_pass_count: config.history_pass_count(),
            constitution_pass_count: config.constitution_pass_count(),
        }
    }

    /// Scores the enabled sections.
    ///
    /// # Errors
    ///
    /// - `ScoreError::NoSectionsEnabled` for an empty `enabled` set.
    /// - `ScoreError::MissingSection` if an enabled section has no result.
    /// - `ScoreError::InvalidTally` / `InvalidAccuracy` for impossible inputs.
    pub fn aggregate(
        &self,
        results: &SectionResults,
        enabled: EnabledSections,
    ) -> Result<ScoreResult, ScoreError> {
        if enabled.is_empty() {
            return Err(ScoreError::NoSectionsEnabled);
        }

        let mut scores = Vec::with_capacity(3);
        for section in enabled.iter() {
            scores.push(self.score_section(section, results)?);
        }

        let overall_passed = scores.iter().all(|s| s.passed);
        #[allow(clippy::cast_precision_loss)]
        let overall_score =
            round2(scores.iter().map(|s| s.percentage).sum::<f64>() / scores.len() as f64);
        let partial = !enabled.is_full();

        let pick = |section: Section| scores.iter().find(|s| s.section == section).copied();

        Ok(ScoreResult {
            anthem: pick(Section::Anthem),
            history: pick(Section::History),
            constitution: pick(Section::Constitution),
            overall_passed,
            overall_score,
            certificate_eligible: overall_passed && !partial,
            partial,
        })
    }

    fn score_section(
        &self,
        section: Section,
        results: &SectionResults,
    ) -> Result<SectionScore, ScoreError> {
        match section {
            Section::Anthem => {
                let accuracy = results.anthem.ok_or(ScoreError::MissingSection(section))?;
                if !(0.0..=100.0).contains(&accuracy) {
                    return Err(ScoreError::InvalidAccuracy(accuracy));
                }
                Ok(SectionScore {
                    section,
                    percentage: round2(accuracy),
                    passed: accuracy >= self.anthem_pass_accuracy,
                })
            }
            Section::History => {
                let tally = results.history.ok_or(ScoreError::MissingSection(section))?;
                Self::score_tally(section, tally, self.history_pass_count)
            }
            Section::Constitution => {
                let tally = results
                    .constitution
                    .ok_or(ScoreError::MissingSection(section))?;
                Self::score_tally(section, tally, self.constitution_pass_count)
            }
        }
    }

    fn score_tally(
        section: Section,
        tally: SectionTally,
        pass_count: usize,
    ) -> Result<SectionScore, ScoreError> {
        if tally.correct > tally.answered || tally.answered > tally.total {
            return Err(ScoreError::InvalidTally {
                section,
                correct: tally.correct,
                answered: tally.answered,
                total: tally.total,
            });
        }
        Ok(SectionScore {
            section,
            percentage: tally.percentage(),
            passed: tally.correct >= pass_count,
        })
    }
}

/// [`ScoreAggregator::aggregate`] with default pass marks.
///
/// # Errors
///
/// See [`ScoreAggregator::aggregate`].
pub fn aggregate_score(
    results: &SectionResults,
    enabled: EnabledSections,
) -> Result<ScoreResult, ScoreError> {
    ScoreAggregator::default().aggregate(results, enabled)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
