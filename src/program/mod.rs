//! Programs: ordered sequences of encoded lines.
//!
//! A program owns its lines, a per-line intron flag, and a constant
//! handler sized to the environment's `nb_constants`. Programs are
//! shared between graph edges through [`ProgramHandle`]; a program dies
//! when its last holder releases it.
//!
//! Intron analysis is the heart of this module: a line whose result can
//! never reach register 0 is an intron, and two programs behave
//! identically when their non-intron lines (and any constants they
//! read) match pairwise.

pub mod execution;
pub mod line;

pub use execution::ProgramExecutionEngine;
pub use line::{Line, Operand};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::data::{ConstantHandler, OperandType};
use crate::environment::Environment;
use crate::error::{TangleError, TangleResult};

/// Shared-ownership handle to a program.
///
/// Edges, the archive, and mutation work lists all hold clones of the
/// same handle; mutation locks it for writing, execution for reading.
pub type ProgramHandle = Arc<RwLock<Program>>;

static NEXT_PROGRAM_ID: AtomicU64 = AtomicU64::new(0);

/// Identity of a program, unique within the process.
///
/// Used by the archive to index recordings per program without keeping
/// the program borrowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(u64);

/// An ordered vector of lines plus intron flags and constants.
#[derive(Debug)]
pub struct Program {
    id: ProgramId,
    environment: Arc<Environment>,
    /// `(line, is_intron)` pairs in execution order.
    lines: Vec<(Line, bool)>,
    constants: ConstantHandler,
}

impl Program {
    /// An empty program bound to `env`.
    pub fn new(env: Arc<Environment>) -> Self {
        let constants = ConstantHandler::new(env.nb_constants());
        Program {
            id: ProgramId(NEXT_PROGRAM_ID.fetch_add(1, Ordering::Relaxed)),
            environment: env,
            lines: Vec::new(),
            constants,
        }
    }

    /// Wrap a program into a shared handle.
    pub fn into_handle(self) -> ProgramHandle {
        Arc::new(RwLock::new(self))
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    pub fn nb_lines(&self) -> usize {
        self.lines.len()
    }

    /// Append a zero-filled line and return it for initialization.
    pub fn add_new_line(&mut self) -> &mut Line {
        let index = self.lines.len();
        self.lines.push((Line::new(&self.environment), false));
        &mut self.lines[index].0
    }

    /// Insert a zero-filled line at `idx`; fails beyond `nb_lines`.
    pub fn add_new_line_at(&mut self, idx: usize) -> TangleResult<&mut Line> {
        if idx > self.lines.len() {
            return Err(TangleError::OutOfRange {
                address: idx,
                space: self.lines.len() + 1,
            });
        }
        self.lines.insert(idx, (Line::new(&self.environment), false));
        Ok(&mut self.lines[idx].0)
    }

    /// Remove the line at `idx`.
    pub fn remove_line(&mut self, idx: usize) -> TangleResult<()> {
        if idx >= self.lines.len() {
            return Err(TangleError::OutOfRange {
                address: idx,
                space: self.lines.len(),
            });
        }
        self.lines.remove(idx);
        Ok(())
    }

    /// Swap the lines at `idx0` and `idx1`.
    pub fn swap_lines(&mut self, idx0: usize, idx1: usize) -> TangleResult<()> {
        if idx0 >= self.lines.len() || idx1 >= self.lines.len() {
            return Err(TangleError::OutOfRange {
                address: idx0.max(idx1),
                space: self.lines.len(),
            });
        }
        self.lines.swap(idx0, idx1);
        Ok(())
    }

    pub fn line(&self, idx: usize) -> TangleResult<&Line> {
        self.lines
            .get(idx)
            .map(|(line, _)| line)
            .ok_or(TangleError::OutOfRange {
                address: idx,
                space: self.lines.len(),
            })
    }

    pub fn line_mut(&mut self, idx: usize) -> TangleResult<&mut Line> {
        let space = self.lines.len();
        self.lines
            .get_mut(idx)
            .map(|(line, _)| line)
            .ok_or(TangleError::OutOfRange {
                address: idx,
                space,
            })
    }

    /// Whether the line at `idx` is currently flagged as an intron.
    pub fn is_intron(&self, idx: usize) -> TangleResult<bool> {
        self.lines
            .get(idx)
            .map(|(_, intron)| *intron)
            .ok_or(TangleError::OutOfRange {
                address: idx,
                space: self.lines.len(),
            })
    }

    /// Clear every intron flag.
    pub fn clear_introns(&mut self) {
        for (_, intron) in &mut self.lines {
            *intron = false;
        }
    }

    /// Recompute intron flags and return the intron count.
    ///
    /// Walks the lines backwards, tracking the set of register indices
    /// whose future value still matters (initially `{0}`, the bid). A
    /// line writing into that set is useful: its destination leaves the
    /// set and every register its operands read enters it. Any other
    /// line is an intron.
    pub fn identify_introns(&mut self) -> usize {
        let env = Arc::clone(&self.environment);
        let registers = env.registers_template();
        let mut useful: std::collections::HashSet<usize> = std::collections::HashSet::new();
        useful.insert(0);

        let mut nb_introns = 0;
        for (line, intron) in self.lines.iter_mut().rev() {
            if useful.remove(&line.destination_index()) {
                *intron = false;
                if let Some(instruction) = env
                    .instruction_set()
                    .instruction(line.instruction_index())
                {
                    for (operand_idx, ty) in instruction.operand_types().iter().enumerate() {
                        let Some((source_index, location)) = line.operand(operand_idx) else {
                            continue;
                        };
                        if source_index != 0 {
                            continue;
                        }
                        // Register operand: every address the fetch
                        // touches becomes useful.
                        let space = registers.address_space(*ty);
                        if space == 0 {
                            continue;
                        }
                        let register_idx = location % space;
                        useful.extend(registers.addresses_accessed(*ty, register_idx));
                    }
                }
            } else {
                *intron = true;
                nb_introns += 1;
            }
        }

        nb_introns
    }

    /// Constant slot `idx`.
    pub fn constant_at(&self, idx: usize) -> TangleResult<i32> {
        self.constants
            .get_data_at(OperandType::Int, idx)
            .map(|v| v.as_int().unwrap_or_default())
    }

    /// Write constant slot `idx`.
    pub fn set_constant_at(&mut self, idx: usize, value: i32) -> TangleResult<()> {
        self.constants.set_data_at(OperandType::Int, idx, value)
    }

    /// The program's constant handler.
    pub fn constants(&self) -> &ConstantHandler {
        &self.constants
    }

    /// Whether this program and `other` compute the same bid on every
    /// input.
    ///
    /// Two read cursors advance over both programs, skipping introns;
    /// at each step the lines must be structurally equal and any
    /// constants they read must hold equal values. A leftover
    /// non-intron tail on either side means the behaviors differ.
    ///
    /// Intron flags must be up to date on both programs (the mutators
    /// re-run [`identify_introns`](Self::identify_introns) after every
    /// mutation batch).
    pub fn has_identical_behavior(&self, other: &Program) -> bool {
        let mut this_idx = self.next_non_intron(0);
        let mut other_idx = other.next_non_intron(0);

        while this_idx < self.nb_lines() && other_idx < other.nb_lines() {
            let this_line = &self.lines[this_idx].0;
            let other_line = &other.lines[other_idx].0;

            if this_line != other_line {
                return false;
            }

            if self.environment.nb_constants() > 0 && !self.constants_match(other, this_line) {
                return false;
            }

            this_idx = self.next_non_intron(this_idx + 1);
            other_idx = other.next_non_intron(other_idx + 1);
        }

        // Only one program may have non-intron lines left.
        this_idx >= self.nb_lines() && other_idx >= other.nb_lines()
    }

    /// Compare the constant values read by `line` in both programs.
    fn constants_match(&self, other: &Program, line: &Line) -> bool {
        let Some(instruction) = self
            .environment
            .instruction_set()
            .instruction(line.instruction_index())
        else {
            return true;
        };
        let nb_constants = self.environment.nb_constants();
        for operand_idx in 0..instruction.nb_operands() {
            let Some((source_index, location)) = line.operand(operand_idx) else {
                continue;
            };
            if source_index != 1 {
                continue;
            }
            // Locations are scaled at fetch time, compare what the
            // programs actually read.
            let slot = location % nb_constants;
            let this_constant = self.constants.slots().get(slot);
            let other_constant = other.constants.slots().get(slot);
            if this_constant != other_constant {
                return false;
            }
        }
        true
    }

    fn next_non_intron(&self, mut idx: usize) -> usize {
        while idx < self.lines.len() && self.lines[idx].1 {
            idx += 1;
        }
        idx
    }
}

impl Clone for Program {
    /// Deep copy with a fresh identity.
    ///
    /// The clone starts a new archive history: recordings of the
    /// original never apply to it.
    fn clone(&self) -> Self {
        Program {
            id: ProgramId(NEXT_PROGRAM_ID.fetch_add(1, Ordering::Relaxed)),
            environment: Arc::clone(&self.environment),
            lines: self.lines.clone(),
            constants: self.constants.clone(),
        }
    }
}
