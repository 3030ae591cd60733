//! Evolutionary Mutators
//!
//! Everything stochastic in the engine lives here. Mutators edit lines,
//! programs and graphs while preserving their structural invariants,
//! and consult the archive so that new programs bid differently from
//! everything already seen.
//!
//! All randomness flows through a caller-supplied [`Rng`]: given the
//! same seed, parameters and starting state, a mutation pass is
//! reproducible, sequentially or in parallel.

pub mod line;
pub mod program;
pub mod rng;
pub mod tpg;

pub use rng::Rng;
