use serde::Serialize;

use exam_core::model::Section;

/// Aggregated view of attempt progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExamProgress {
    pub history_answered: usize,
    pub history_total: usize,
    pub constitution_answered: usize,
    pub constitution_total: usize,
    pub anthem_chars: usize,
    pub current_section: Section,
    pub is_complete: bool,
}

impl ExamProgress {
    /// Multiple-choice questions still without an answer.
    #[must_use]
    pub fn unanswered(&self) -> usize {
        self.history_total.saturating_sub(self.history_answered)
            + self
                .constitution_total
                .saturating_sub(self.constitution_answered)
    }
}
