//! Receiver-side choice of the next payload size directive.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Lower bound of the dynamic size range (clamped to the maximum).
pub const MIN_DYNAMIC_SIZE: usize = 50;

/// Picks the size the receiver announces with its next ack.
pub trait SizePolicy: Send {
    /// Return a size in `[min(MIN_DYNAMIC_SIZE, max_size), max_size]`.
    fn next_size(&mut self, max_size: usize) -> usize;
}

/// Uniformly random size within the allowed range.
#[derive(Debug)]
pub struct RandomSize {
    rng: StdRng,
}

impl RandomSize {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Reproducible sequence of sizes, for tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomSize {
    fn default() -> Self {
        Self::new()
    }
}

impl SizePolicy for RandomSize {
    fn next_size(&mut self, max_size: usize) -> usize {
        let low = MIN_DYNAMIC_SIZE.min(max_size);
        self.rng.random_range(low..=max_size)
    }
}

/// Always the same size, clamped to the maximum.
#[derive(Debug, Clone, Copy)]
pub struct FixedSize(pub usize);

impl SizePolicy for FixedSize {
    fn next_size(&mut self, max_size: usize) -> usize {
        self.0.clamp(1, max_size.max(1))
    }
}
