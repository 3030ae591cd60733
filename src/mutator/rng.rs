//! Seedable random number generation for mutations.
//!
//! A thin wrapper around a deterministic generator with inclusive
//! uniform draws. Mutation code never touches `rand` directly; routing
//! every draw through this type keeps training runs reproducible and
//! lets parallel workers derive independent sub-generators from a
//! parent seed.

use rand::rngs::StdRng;
use rand::{Rng as _, RngCore, SeedableRng};

/// Deterministic uniform generator.
#[derive(Debug)]
pub struct Rng {
    engine: StdRng,
}

impl Rng {
    /// A generator seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Rng {
            engine: StdRng::seed_from_u64(seed),
        }
    }

    /// Reset the generator to the state of a fresh `seed`.
    pub fn set_seed(&mut self, seed: u64) {
        self.engine = StdRng::seed_from_u64(seed);
    }

    /// Uniform integer in `[min, max]`, bounds included.
    pub fn get_u64(&mut self, min: u64, max: u64) -> u64 {
        debug_assert!(min <= max);
        self.engine.gen_range(min..=max)
    }

    /// Uniform integer in `[min, max]`, bounds included.
    pub fn get_i32(&mut self, min: i32, max: i32) -> i32 {
        debug_assert!(min <= max);
        self.engine.gen_range(min..=max)
    }

    /// Uniform double in `[min, max]`.
    pub fn get_double(&mut self, min: f64, max: f64) -> f64 {
        debug_assert!(min <= max);
        self.engine.gen_range(min..=max)
    }

    /// Uniform index in `[0, len)`; `len` must be non-zero.
    pub fn get_index(&mut self, len: usize) -> usize {
        debug_assert!(len > 0);
        self.get_u64(0, len as u64 - 1) as usize
    }

    /// Derive an independent generator from this one.
    ///
    /// The child's seed is this generator's next draw, so deriving `n`
    /// children advances the parent identically no matter where the
    /// children run.
    pub fn sub_rng(&mut self) -> Rng {
        Rng::new(self.engine.next_u64())
    }
}
