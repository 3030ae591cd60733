//! Learning Environment Interface
//!
//! The engine trains against a user-supplied environment: something
//! that exposes observable data sources, accepts discrete actions, and
//! scores an episode. The environment is an external collaborator; the
//! core only relies on this trait.

use crate::data::DataHandler;
use crate::error::{TangleError, TangleResult};

/// What a reset prepares the environment for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearningMode {
    Training,
    Validation,
    Testing,
}

/// A problem the engine can learn to act in.
///
/// Implementations must invalidate the hashes of any data source a
/// call to [`do_action`](Self::do_action) mutates (writing through
/// [`DataHandler::set_data_at`] or
/// [`PrimitiveArray::slots_mut`](crate::data::PrimitiveArray::slots_mut)
/// does this automatically): the archive keys its snapshots by those
/// hashes.
pub trait LearningEnvironment {
    /// Number of discrete actions the environment accepts.
    fn nb_actions(&self) -> u64;

    /// Reset the environment state for a new episode.
    fn reset(&mut self, seed: u64, mode: LearningMode);

    /// Execute one action; `action_id` must be below
    /// [`nb_actions`](Self::nb_actions).
    fn do_action(&mut self, action_id: u64) -> TangleResult<()>;

    /// Execute several simultaneous actions (multi-action
    /// environments). The default applies them sequentially.
    fn do_actions(&mut self, action_ids: &[u64]) -> TangleResult<()> {
        for action_id in action_ids {
            self.do_action(*action_id)?;
        }
        Ok(())
    }

    /// The observable data sources, in the order the environment was
    /// built with.
    fn data_sources(&self) -> Vec<&DataHandler>;

    /// Cumulative score of the current episode.
    fn score(&self) -> f64;

    /// Whether the episode is over.
    fn is_terminal(&self) -> bool;

    /// Whether [`clone_env`](Self::clone_env) returns a copy.
    fn is_copyable(&self) -> bool {
        false
    }

    /// An independent copy for parallel rollouts, when supported.
    fn clone_env(&self) -> Option<Box<dyn LearningEnvironment>> {
        None
    }
}

/// Guard helper for implementations: the out-of-range action error
/// every environment must raise.
pub fn check_action_id(action_id: u64, nb_actions: u64) -> TangleResult<()> {
    if action_id >= nb_actions {
        return Err(TangleError::OutOfRange {
            address: action_id as usize,
            space: nb_actions as usize,
        });
    }
    Ok(())
}
