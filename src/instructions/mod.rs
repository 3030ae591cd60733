//! Instruction Catalogue
//!
//! An instruction declares the types of its operands and computes one
//! `f64` from fetched operand values. Programs never reference
//! instructions directly: a line carries an index into the environment's
//! filtered [`Set`], and the execution engine fetches operands according
//! to the declared types before invoking [`Instruction::execute`].
//!
//! Uniqueness within a [`Set`] is by concrete Rust type: registering a
//! second instance of the same instruction type is a no-op. Closure
//! based instructions ([`Lambda2`](crate::instructions::Lambda2)) get a
//! distinct concrete type per closure, so several of them coexist.

pub mod arithmetic;

pub use arithmetic::{Add, Lambda2, MaxOfWindow, Mult, MultByConstant, Sub};

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::data::{OperandType, Value};

/// One operation of the instruction set.
///
/// `execute` must be pure: same operands, same result. Implementations
/// return `0.0` when handed operands that do not match their declared
/// types; the engine only produces matching operands, so that path is a
/// guard, not an interface.
pub trait Instruction: Any + Send + Sync {
    /// Ordered operand type tokens.
    fn operand_types(&self) -> &[OperandType];

    /// Number of operands consumed.
    fn nb_operands(&self) -> usize {
        self.operand_types().len()
    }

    /// Compute the result from fetched operand values.
    fn execute(&self, operands: &[Value]) -> f64;

    /// Short name used in diagnostics and logs.
    fn name(&self) -> &'static str;
}

/// Ordered, type-deduplicated list of instructions.
///
/// Instructions are shared (`Arc`) so that the filtered copy built by
/// an environment aliases the caller's instances.
#[derive(Clone, Default)]
pub struct Set {
    instructions: Vec<Arc<dyn Instruction>>,
}

impl Set {
    pub fn new() -> Self {
        Set {
            instructions: Vec::new(),
        }
    }

    /// Register an instruction; returns `false` if an instruction of
    /// the same concrete type is already present.
    pub fn add(&mut self, instruction: Arc<dyn Instruction>) -> bool {
        let new_type = (&*instruction as &dyn Any).type_id();
        let duplicate = self
            .instructions
            .iter()
            .any(|existing| (&**existing as &dyn Any).type_id() == new_type);
        if duplicate {
            return false;
        }
        self.instructions.push(instruction);
        true
    }

    /// Instruction at `index`, if any.
    pub fn instruction(&self, index: usize) -> Option<&Arc<dyn Instruction>> {
        self.instructions.get(index)
    }

    pub fn nb_instructions(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Largest operand count over all instructions; `0` when empty.
    pub fn max_nb_operands(&self) -> usize {
        self.instructions
            .iter()
            .map(|i| i.nb_operands())
            .max()
            .unwrap_or(0)
    }

    /// Iterate over the instructions in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Instruction>> {
        self.instructions.iter()
    }
}

impl fmt::Debug for Set {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.instructions.iter().map(|i| i.name()))
            .finish()
    }
}
