//! Behavioural Archive
//!
//! A bounded FIFO memory of program bids. Each recording associates a
//! program with the combined hash of the data it saw and the bid it
//! produced; the archive keeps one deep-cloned snapshot of the data
//! source vector per distinct combined hash, evicted as soon as no
//! recording references it.
//!
//! The mutators consult the archive to force behavioural diversity: a
//! freshly mutated program must produce bids that no archived program
//! already produced on the archived snapshots.

use std::collections::{HashMap, VecDeque};

use crate::data::DataHandler;
use crate::mutator::Rng;
use crate::program::{ProgramHandle, ProgramId};

/// Equivalence tolerance used when comparing bids against archived
/// results.
pub const BEHAVIOR_TOLERANCE: f64 = 1e-4;

/// One archived bid.
#[derive(Debug, Clone)]
pub struct Recording {
    /// Share of the program that produced the bid
    pub program: ProgramHandle,
    /// Combined hash of the data sources at recording time
    pub data_hash: u64,
    /// The recorded bid
    pub result: f64,
}

/// Bounded FIFO of recordings plus data snapshots.
pub struct Archive {
    max_size: usize,
    archiving_probability: f64,
    rng: Rng,
    recordings: VecDeque<Recording>,
    /// Deep-cloned data source vectors keyed by combined hash.
    data_handlers: HashMap<u64, Vec<DataHandler>>,
    /// Per-program `(hash, result)` pairs, oldest first.
    recordings_per_program: HashMap<ProgramId, VecDeque<(u64, f64)>>,
}

impl Archive {
    /// An archive holding at most `max_size` recordings, recording each
    /// offered bid with probability `archiving_probability`.
    pub fn new(max_size: usize, archiving_probability: f64) -> Self {
        Archive {
            max_size,
            archiving_probability,
            rng: Rng::new(0),
            recordings: VecDeque::new(),
            data_handlers: HashMap::new(),
            recordings_per_program: HashMap::new(),
        }
    }

    /// Reseed the internal recording-probability generator.
    pub fn set_random_seed(&mut self, seed: u64) {
        self.rng.set_seed(seed);
    }

    /// XOR-fold of the individual handler hashes.
    ///
    /// Commutative across handlers; each handler hash is itself an
    /// insertion-rotated fold seeded with the handler id, so two
    /// different source vectors with equal content still collide only
    /// if they share ids, which is exactly what snapshot replay needs.
    pub fn combined_hash(handlers: &[&DataHandler]) -> u64 {
        handlers
            .iter()
            .fold(0u64, |acc, handler| acc ^ handler.hash())
    }

    /// Offer a recording to the archive.
    ///
    /// Unless `forced`, the offer is dropped with probability
    /// `1 - archiving_probability`. An accepted recording snapshots the
    /// data sources (once per combined hash) and may evict the oldest
    /// recordings to stay within `max_size`; a snapshot is dropped with
    /// its last referencing recording.
    pub fn add_recording(
        &mut self,
        program: &ProgramHandle,
        handlers: &[&DataHandler],
        result: f64,
        forced: bool,
    ) {
        if !forced
            && self.archiving_probability < 1.0
            && self.rng.get_double(0.0, 1.0) >= self.archiving_probability
        {
            return;
        }

        let hash = Self::combined_hash(handlers);

        self.data_handlers.entry(hash).or_insert_with(|| {
            handlers.iter().map(|handler| (*handler).clone()).collect()
        });

        let program_id = program.read().id();
        self.recordings.push_back(Recording {
            program: program.clone(),
            data_hash: hash,
            result,
        });
        self.recordings_per_program
            .entry(program_id)
            .or_default()
            .push_back((hash, result));

        while self.recordings.len() > self.max_size {
            self.evict_oldest();
        }
    }

    fn evict_oldest(&mut self) {
        let Some(oldest) = self.recordings.pop_front() else {
            return;
        };

        let still_referenced = self
            .recordings
            .iter()
            .any(|recording| recording.data_hash == oldest.data_hash);
        if !still_referenced {
            self.data_handlers.remove(&oldest.data_hash);
        }

        let oldest_id = oldest.program.read().id();
        if let Some(per_program) = self.recordings_per_program.get_mut(&oldest_id) {
            per_program.pop_front();
            if per_program.is_empty() {
                self.recordings_per_program.remove(&oldest_id);
            }
        }
    }

    /// Whether the bids in `hashes_and_results` differ from every
    /// archived program's behaviour.
    ///
    /// An archived program is *equivalent* to the candidate when every
    /// one of its recordings whose hash appears in the query matches
    /// the queried result within `tau`, and at least one such overlap
    /// exists. Returns `false` as soon as one equivalent program is
    /// found.
    pub fn are_program_results_unique(
        &self,
        hashes_and_results: &HashMap<u64, f64>,
        tau: f64,
    ) -> bool {
        for recordings in self.recordings_per_program.values() {
            let mut is_identical = false;
            for (hash, result) in recordings {
                let Some(queried) = hashes_and_results.get(hash) else {
                    // No overlap on this snapshot, nothing to compare.
                    continue;
                };
                if (queried - result).abs() <= tau {
                    is_identical = true;
                } else {
                    is_identical = false;
                    break;
                }
            }
            if is_identical {
                return false;
            }
        }
        true
    }

    /// Recording `n`, oldest first.
    pub fn recording_at(&self, n: usize) -> Option<&Recording> {
        self.recordings.get(n)
    }

    pub fn nb_recordings(&self) -> usize {
        self.recordings.len()
    }

    pub fn nb_data_handlers(&self) -> usize {
        self.data_handlers.len()
    }

    /// Whether a snapshot exists for `hash`.
    pub fn has_data_handlers(&self, hash: u64) -> bool {
        self.data_handlers.contains_key(&hash)
    }

    /// All retained snapshots keyed by combined hash.
    pub fn data_handlers(&self) -> &HashMap<u64, Vec<DataHandler>> {
        &self.data_handlers
    }

    /// Drop every recording and snapshot.
    pub fn clear(&mut self) {
        self.recordings.clear();
        self.data_handlers.clear();
        self.recordings_per_program.clear();
    }
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("max_size", &self.max_size)
            .field("archiving_probability", &self.archiving_probability)
            .field("nb_recordings", &self.recordings.len())
            .field("nb_data_handlers", &self.data_handlers.len())
            .finish()
    }
}
