//! Encoded program lines.
//!
//! A line is the tuple `(instruction_index, destination_index,
//! operands)` where each operand pairs a data source index with a raw
//! location. Locations are stored unscaled; they are reduced modulo the
//! source's address space at fetch time, which is why a location only
//! has to fit the environment's largest address space.

use crate::environment::Environment;
use crate::error::{TangleError, TangleResult};

/// One operand slot: `(data_source_index, location)`.
pub type Operand = (usize, usize);

/// A single encoded instruction of a program.
///
/// All fields are bounded by the environment the line was created for:
/// the checked setters reject indices outside the layout, so a stored
/// line is always structurally valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    instruction_index: usize,
    destination_index: usize,
    operands: Vec<Operand>,
}

impl Line {
    /// A zero-filled line shaped for `env` (all indices 0, one operand
    /// slot per `max_nb_operands`).
    pub fn new(env: &Environment) -> Self {
        Line {
            instruction_index: 0,
            destination_index: 0,
            operands: vec![(0, 0); env.max_nb_operands()],
        }
    }

    pub fn instruction_index(&self) -> usize {
        self.instruction_index
    }

    pub fn destination_index(&self) -> usize {
        self.destination_index
    }

    /// Operand slot `idx`, if within `max_nb_operands`.
    pub fn operand(&self, idx: usize) -> Option<Operand> {
        self.operands.get(idx).copied()
    }

    /// All operand slots.
    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    /// Set the instruction index; fails if it exceeds the filtered
    /// instruction count.
    pub fn set_instruction_index(&mut self, env: &Environment, index: usize) -> TangleResult<()> {
        if index >= env.nb_instructions() {
            return Err(TangleError::OutOfRange {
                address: index,
                space: env.nb_instructions(),
            });
        }
        self.instruction_index = index;
        Ok(())
    }

    /// Set the destination register index; fails beyond `nb_registers`.
    pub fn set_destination_index(&mut self, env: &Environment, index: usize) -> TangleResult<()> {
        if index >= env.nb_registers() {
            return Err(TangleError::OutOfRange {
                address: index,
                space: env.nb_registers(),
            });
        }
        self.destination_index = index;
        Ok(())
    }

    /// Set operand slot `idx`; the source index must name one of the
    /// environment's data sources and the location must fit the largest
    /// address space.
    pub fn set_operand(
        &mut self,
        env: &Environment,
        idx: usize,
        data_source_index: usize,
        location: usize,
    ) -> TangleResult<()> {
        if idx >= self.operands.len() {
            return Err(TangleError::OutOfRange {
                address: idx,
                space: self.operands.len(),
            });
        }
        if data_source_index >= env.nb_data_sources() {
            return Err(TangleError::OutOfRange {
                address: data_source_index,
                space: env.nb_data_sources(),
            });
        }
        if location >= env.largest_address_space() {
            return Err(TangleError::OutOfRange {
                address: location,
                space: env.largest_address_space(),
            });
        }
        self.operands[idx] = (data_source_index, location);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataHandler, PrimitiveArray};
    use crate::instructions::{Add, Mult, Set};
    use std::sync::Arc;

    fn env() -> Environment {
        let mut set = Set::new();
        set.add(Arc::new(Add::<f64>::new()));
        set.add(Arc::new(Mult::<f64>::new()));
        let source = DataHandler::from(PrimitiveArray::<f64>::new(24));
        Environment::new(&set, &[&source], 8, 0).unwrap()
    }

    #[test]
    fn test_new_line_is_zeroed() {
        let env = env();
        let line = Line::new(&env);
        assert_eq!(line.instruction_index(), 0);
        assert_eq!(line.destination_index(), 0);
        assert_eq!(line.operands(), &[(0, 0), (0, 0)]);
    }

    #[test]
    fn test_checked_setters() {
        let env = env();
        let mut line = Line::new(&env);

        line.set_instruction_index(&env, 1).unwrap();
        assert!(line.set_instruction_index(&env, 2).is_err());

        line.set_destination_index(&env, 7).unwrap();
        assert!(line.set_destination_index(&env, 8).is_err());

        line.set_operand(&env, 1, 1, 23).unwrap();
        assert_eq!(line.operand(1), Some((1, 23)));
        assert!(line.set_operand(&env, 2, 0, 0).is_err());
        assert!(line.set_operand(&env, 0, 2, 0).is_err());
        assert!(line.set_operand(&env, 0, 0, 24).is_err());
    }

    #[test]
    fn test_structural_equality() {
        let env = env();
        let mut a = Line::new(&env);
        let b = Line::new(&env);
        assert_eq!(a, b);
        a.set_operand(&env, 0, 1, 3).unwrap();
        assert_ne!(a, b);
    }
}
