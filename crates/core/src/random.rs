//! Deterministic pseudo-random source for question selection.
//!
//! A linear congruential generator with the classic `9301 / 49297 / 233280`
//! parameters. All state updates use integer arithmetic, so a given seed yields
//! the same draw sequence on every platform; selections are reproducible from the
//! seed stored in `SelectionMetadata`.

const MULTIPLIER: u64 = 9301;
const INCREMENT: u64 = 49_297;
const MODULUS: u64 = 233_280;

/// Seeded linear congruential generator.
///
/// # Examples
///
/// ```
/// # use exam_core::random::SeededRandom;
/// let mut a = SeededRandom::new(12345);
/// let mut b = SeededRandom::new(12345);
/// assert_eq!(a.next_f64(), b.next_f64());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeededRandom {
    seed: u64,
    state: u64,
}

impl SeededRandom {
    /// Creates a generator.
    ///
    /// The seed is reduced modulo 233280 up front; since the recurrence is taken
    /// modulo the same base this does not change the sequence, and it keeps the
    /// multiplication far from overflow for seeds such as Unix milliseconds.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            state: seed % MODULUS,
        }
    }

    /// The seed this generator was created with.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn step(&mut self) -> u64 {
        self.state = (self.state * MULTIPLIER + INCREMENT) % MODULUS;
        self.state
    }

    /// Next value in `[0, 1)`.
    #[allow(clippy::cast_precision_loss)]
    pub fn next_f64(&mut self) -> f64 {
        self.step() as f64 / MODULUS as f64
    }

    /// Next integer in `[min, max_exclusive)`.
    ///
    /// Equivalent to `min + floor(next() * (max_exclusive - min))`, computed without
    /// floating point. Returns `min` for an empty range.
    pub fn next_int(&mut self, min: usize, max_exclusive: usize) -> usize {
        let state = self.step();
        if max_exclusive <= min {
            return min;
        }
        let span = (max_exclusive - min) as u128;
        let offset = u128::from(state) * span / u128::from(MODULUS);
        // offset < span because state < MODULUS
        min + usize::try_from(offset).unwrap_or(0)
    }

    /// Shuffles a slice in place with Fisher–Yates, drawing once per position
    /// from the last index down to the first.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (0..items.len()).rev() {
            let j = self.next_int(0, i + 1);
            items.swap(i, j);
        }
    }
}

impl Iterator for SeededRandom {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        Some(self.next_f64())
    }
}
