use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::ExamConfig;
use crate::model::{
    Category, OPTION_COUNT, Question, QuestionBank, QuestionSelection, SelectedQuestions,
    SelectionMetadata,
};
use crate::random::SeededRandom;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Selection was asked for more questions than the pool holds.
///
/// This is a configuration fault, not something a user can recover from.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SelectionError {
    #[error("cannot select {requested} questions from a pool of {available}")]
    InsufficientPool { requested: usize, available: usize },
}

//
// ─── SELECTOR ──────────────────────────────────────────────────────────────────
//

/// Picks a fixed-size subset of a pool and shuffles answer options, driven
/// entirely by a [`SeededRandom`].
pub struct QuestionPoolSelector<'a> {
    rng: &'a mut SeededRandom,
}

impl<'a> QuestionPoolSelector<'a> {
    #[must_use]
    pub fn new(rng: &'a mut SeededRandom) -> Self {
        Self { rng }
    }

    /// Shuffles the pool's index array and keeps the first `k` entries.
    ///
    /// # Errors
    ///
    /// Returns `SelectionError::InsufficientPool` if `k` exceeds the pool size.
    pub fn select<T: Clone>(&mut self, pool: &[T], k: usize) -> Result<Vec<T>, SelectionError> {
        if k > pool.len() {
            return Err(SelectionError::InsufficientPool {
                requested: k,
                available: pool.len(),
            });
        }
        let mut indices: Vec<usize> = (0..pool.len()).collect();
        self.rng.shuffle(&mut indices);
        Ok(indices
            .into_iter()
            .take(k)
            .map(|index| pool[index].clone())
            .collect())
    }

    /// Returns the question with its three options shuffled; `correct_index`
    /// follows the original correct text to its new position.
    #[must_use]
    pub fn shuffle_options(&mut self, question: &Question) -> Question {
        let mut layout: [String; OPTION_COUNT] = question.options().clone();
        self.rng.shuffle(&mut layout);
        question.with_layout(layout)
    }

    /// Selects `k` questions and shuffles each one's options, in draw order.
    ///
    /// # Errors
    ///
    /// Returns `SelectionError::InsufficientPool` if `k` exceeds the pool size.
    pub fn select_shuffled(
        &mut self,
        pool: &[Question],
        k: usize,
    ) -> Result<Vec<Question>, SelectionError> {
        let picked = self.select(pool, k)?;
        Ok(picked.iter().map(|q| self.shuffle_options(q)).collect())
    }
}

/// Draws a complete question set for one attempt.
///
/// History is drawn first, then constitution, from a single generator seeded with
/// `seed`, so the same seed always reproduces the same questions and option layouts.
///
/// # Errors
///
/// Returns `SelectionError::InsufficientPool` if either pool is smaller than its
/// configured count.
pub fn select_questions(
    bank: &QuestionBank,
    config: &ExamConfig,
    seed: u64,
    selected_at: DateTime<Utc>,
) -> Result<QuestionSelection, SelectionError> {
    let mut rng = SeededRandom::new(seed);
    let mut selector = QuestionPoolSelector::new(&mut rng);

    let history = selector.select_shuffled(bank.pool(Category::History), config.history_count())?;
    let constitution = selector.select_shuffled(
        bank.pool(Category::Constitution),
        config.constitution_count(),
    )?;

    let metadata = SelectionMetadata::new(
        seed,
        selected_at,
        history.iter().map(Question::id).collect(),
        constitution.iter().map(Question::id).collect(),
    );

    Ok(QuestionSelection {
        questions: SelectedQuestions::new(history, constitution),
        metadata,
    })
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
