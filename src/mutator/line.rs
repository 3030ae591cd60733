//! Line-level mutation operators.
//!
//! Lines are initialized and altered so that they are always *correct*:
//! the destination fits the register file, the instruction exists, and
//! every operand the instruction reads is routed to a data source that
//! can provide its type. Locations need no care beyond the global bound
//! since fetches scale them modulo the source's address space.

use std::collections::BTreeSet;

use crate::environment::Environment;
use crate::error::{TangleError, TangleResult};
use crate::instructions::Instruction;
use crate::mutator::Rng;
use crate::program::Line;

/// Initialize one operand pair of `line`.
///
/// When the operand is within the instruction's declared operands, the
/// data source is drawn by rejection among sources able to provide the
/// operand type (environment filtering guarantees one exists). Beyond
/// the declared operands any source is valid. With `force_change`, the
/// drawn source (or location) is guaranteed to differ from the current
/// one.
fn init_operand(
    env: &Environment,
    instruction: &dyn Instruction,
    line: &mut Line,
    operand_idx: usize,
    init_source: bool,
    init_location: bool,
    force_change: bool,
    rng: &mut Rng,
) -> TangleResult<()> {
    let (current_source, current_location) = line.operand(operand_idx).unwrap_or((0, 0));
    let nb_sources = env.nb_data_sources();

    let mut source_index = current_source;
    if init_source {
        if operand_idx < instruction.nb_operands() {
            // Typed operand: rejection-sample an untried source until a
            // compatible one comes up. When forcing a change and the
            // current source is the only compatible one, the operand
            // keeps it (environment filtering only guarantees one
            // compatible source, not two).
            let operand_type = instruction.operand_types()[operand_idx];
            let mut tried: BTreeSet<usize> = BTreeSet::new();
            if force_change {
                tried.insert(current_source);
            }
            let mut found = false;
            while !found && tried.len() < nb_sources {
                let mut candidate = rng.get_index(nb_sources - tried.len());
                // Shift past already-tried indices (ordered set).
                for tried_index in &tried {
                    if *tried_index <= candidate {
                        candidate += 1;
                    }
                }
                if env.data_sources()[candidate].can_handle(operand_type) {
                    source_index = candidate;
                    found = true;
                } else {
                    tried.insert(candidate);
                }
            }
        } else {
            // Unconstrained slot: any source goes.
            let mut candidate = rng.get_index(nb_sources - usize::from(force_change));
            if force_change && candidate >= current_source {
                candidate += 1;
            }
            source_index = candidate;
        }
    }

    let mut location = current_location;
    if init_location {
        let space = env.largest_address_space();
        if !(force_change && space == 1) {
            let mut candidate = rng.get_index(space - usize::from(force_change));
            if force_change && candidate >= current_location {
                candidate += 1;
            }
            location = candidate;
        }
    }

    line.set_operand(env, operand_idx, source_index, location)
}

fn fetch_instruction(
    env: &Environment,
    index: usize,
) -> TangleResult<std::sync::Arc<dyn Instruction>> {
    env.instruction_set()
        .instruction(index)
        .cloned()
        .ok_or(TangleError::OutOfRange {
            address: index,
            space: env.nb_instructions(),
        })
}

/// Overwrite `line` with a uniformly drawn correct line.
///
/// Draw order: destination, instruction, then every operand slot up to
/// `max_nb_operands` (source and location).
pub fn init_random_correct_line(
    env: &Environment,
    line: &mut Line,
    rng: &mut Rng,
) -> TangleResult<()> {
    let destination = rng.get_index(env.nb_registers());
    line.set_destination_index(env, destination)?;

    let instruction_index = rng.get_index(env.nb_instructions());
    line.set_instruction_index(env, instruction_index)?;
    let instruction = fetch_instruction(env, instruction_index)?;

    for operand_idx in 0..env.max_nb_operands() {
        init_operand(env, &*instruction, line, operand_idx, true, true, false, rng)?;
    }
    Ok(())
}

/// Alter one region of `line`, chosen with probability proportional to
/// its bit width in the line layout.
///
/// - instruction: a different instruction; operands whose source no
///   longer matches the new operand types are re-routed (locations are
///   kept, scaling absorbs range changes)
/// - destination: a different register
/// - operand source: a different type-compatible source, location kept
/// - operand location: a different location
pub fn alter_correct_line(env: &Environment, line: &mut Line, rng: &mut Rng) -> TangleResult<()> {
    let layout = env.line_layout();
    let selected_bit = rng.get_index(layout.total_bits);

    if selected_bit < layout.nb_instruction_bits {
        // Instruction index.
        let current = line.instruction_index();
        let mut new_index = rng.get_index(env.nb_instructions() - 1);
        if new_index >= current {
            new_index += 1;
        }
        line.set_instruction_index(env, new_index)?;

        // Re-route operands the new instruction cannot read anymore.
        let instruction = fetch_instruction(env, new_index)?;
        for operand_idx in 0..instruction.nb_operands() {
            let operand_type = instruction.operand_types()[operand_idx];
            let (source_index, _) = line.operand(operand_idx).unwrap_or((0, 0));
            let is_valid = env.data_sources()[source_index].can_handle(operand_type);
            if !is_valid {
                init_operand(env, &*instruction, line, operand_idx, true, false, true, rng)?;
            }
        }
    } else if selected_bit < layout.nb_instruction_bits + layout.nb_destination_bits {
        // Destination index. A single-register file leaves nothing to
        // change.
        if env.nb_registers() > 1 {
            let current = line.destination_index();
            let mut new_index = rng.get_index(env.nb_registers() - 1);
            if new_index >= current {
                new_index += 1;
            }
            line.set_destination_index(env, new_index)?;
        }
    } else {
        // Operand source or location.
        let operand_bit =
            selected_bit - (layout.nb_instruction_bits + layout.nb_destination_bits);
        let bits_per_operand = layout.nb_operand_source_bits + layout.nb_operand_location_bits;
        let operand_idx = operand_bit / bits_per_operand;
        let instruction = fetch_instruction(env, line.instruction_index())?;

        if operand_bit % bits_per_operand < layout.nb_operand_source_bits {
            init_operand(env, &*instruction, line, operand_idx, true, false, true, rng)?;
        } else {
            init_operand(env, &*instruction, line, operand_idx, false, true, true, rng)?;
        }
    }
    Ok(())
}
