//! Program Execution Engine
//!
//! Interprets a program line by line against a register file and the
//! live data sources, and returns register 0 as the program's bid.
//!
//! Execution cannot fail on operand bounds: every operand location is
//! reduced modulo the address space of its source for the operand's
//! type. A NaN instruction result is stored as `-inf`, which is
//! observable at the graph level (a NaN bid always loses).

use crate::data::{DataHandler, OperandType, PrimitiveArray, Value};
use crate::environment::Environment;
use crate::error::{TangleError, TangleResult};
use crate::program::Program;

/// Interpreter state for one program.
///
/// The engine owns its register file and keeps it across executions,
/// zeroing it before each run unless the environment enables memory
/// registers.
pub struct ProgramExecutionEngine<'a> {
    program: &'a Program,
    /// Live external sources, aligned with the environment's source
    /// indices after the virtual registers/constants.
    data: Vec<&'a DataHandler>,
    registers: PrimitiveArray<f64>,
}

impl<'a> ProgramExecutionEngine<'a> {
    /// Bind a program to live data sources.
    ///
    /// `data` must carry one handler per external source of the
    /// program's environment, in environment order, with matching
    /// address spaces. Archive snapshots and learning-environment
    /// sources both satisfy this by construction.
    pub fn new(program: &'a Program, data: &[&'a DataHandler]) -> TangleResult<Self> {
        let env = program.environment();
        let expected = env.nb_data_sources() - env.first_external_source();
        if data.len() != expected {
            return Err(TangleError::InvalidEnvironment(format!(
                "expected {expected} external data sources, got {}",
                data.len()
            )));
        }
        for (offset, handler) in data.iter().enumerate() {
            let template = &env.data_sources()[env.first_external_source() + offset];
            if handler.largest_address_space() != template.largest_address_space() {
                return Err(TangleError::InvalidEnvironment(format!(
                    "data source {offset} has address space {}, environment expects {}",
                    handler.largest_address_space(),
                    template.largest_address_space()
                )));
            }
        }
        Ok(ProgramExecutionEngine {
            program,
            data: data.to_vec(),
            registers: PrimitiveArray::new(env.nb_registers()),
        })
    }

    /// Run every line in order and return the bid in register 0.
    ///
    /// Intron lines are executed too; by construction they cannot
    /// change register 0.
    pub fn execute(&mut self) -> f64 {
        let program = self.program;
        let env = program.environment();
        if !env.use_memory_registers() {
            self.registers.reset();
        }

        for line_idx in 0..program.nb_lines() {
            self.execute_line(program, env, line_idx);
        }

        self.registers.slots()[0]
    }

    fn execute_line(&mut self, program: &'a Program, env: &Environment, line_idx: usize) {
        let Ok(line) = program.line(line_idx) else {
            return;
        };
        let Some(instruction) = env.instruction_set().instruction(line.instruction_index())
        else {
            return;
        };

        let mut operands = Vec::with_capacity(instruction.nb_operands());
        for (operand_idx, ty) in instruction.operand_types().iter().enumerate() {
            let Some((source_index, location)) = line.operand(operand_idx) else {
                return;
            };
            operands.push(self.fetch(env, *ty, source_index, location));
        }

        let result = instruction.execute(&operands);
        // NaN must lose every bid comparison downstream.
        let result = if result.is_nan() {
            f64::NEG_INFINITY
        } else {
            result
        };
        self.registers.slots_mut()[line.destination_index()] = result;
    }

    /// Scaled, unchecked operand fetch.
    fn fetch(
        &self,
        env: &Environment,
        ty: OperandType,
        source_index: usize,
        location: usize,
    ) -> Value {
        if source_index == 0 {
            self.registers.get_data_scaled(ty, location)
        } else if source_index == 1 && env.nb_constants() > 0 {
            self.program.constants().get_data_scaled(ty, location)
        } else {
            self.data[source_index - env.first_external_source()].get_data_scaled(ty, location)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::{Add, Lambda2, Set};
    use std::sync::Arc;

    fn env_and_source() -> (Arc<Environment>, DataHandler) {
        let mut set = Set::new();
        set.add(Arc::new(Add::<f64>::new()));
        set.add(Arc::new(Lambda2::new("div", |a, b| a / b)));
        let mut array = PrimitiveArray::<f64>::new(8);
        for (i, slot) in array.slots_mut().iter_mut().enumerate() {
            *slot = i as f64;
        }
        let source = DataHandler::from(array);
        let env = Arc::new(Environment::new(&set, &[&source], 4, 0).unwrap());
        (env, source)
    }

    fn set_line(
        program: &mut Program,
        instruction: usize,
        dest: usize,
        operands: [(usize, usize); 2],
    ) {
        let env = Arc::clone(program.environment());
        let line = program.add_new_line();
        line.set_instruction_index(&env, instruction).unwrap();
        line.set_destination_index(&env, dest).unwrap();
        line.set_operand(&env, 0, operands[0].0, operands[0].1).unwrap();
        line.set_operand(&env, 1, operands[1].0, operands[1].1).unwrap();
    }

    #[test]
    fn test_execute_simple_sum() {
        let (env, source) = env_and_source();
        let mut program = Program::new(env);
        // reg[1] = data[2] + data[3]; reg[0] = reg[1] + reg[1]
        set_line(&mut program, 0, 1, [(1, 2), (1, 3)]);
        set_line(&mut program, 0, 0, [(0, 1), (0, 1)]);

        let mut engine = ProgramExecutionEngine::new(&program, &[&source]).unwrap();
        assert_eq!(engine.execute(), 10.0);
        // Registers are zeroed between runs, same result again.
        assert_eq!(engine.execute(), 10.0);
    }

    #[test]
    fn test_location_scaling_wraps() {
        let (env, source) = env_and_source();
        let mut program = Program::new(env);
        // Locations beyond the source length wrap: data[9 % 8] = 1.0.
        set_line(&mut program, 0, 0, [(1, 9), (1, 2)]);

        let mut engine = ProgramExecutionEngine::new(&program, &[&source]).unwrap();
        assert_eq!(engine.execute(), 3.0);
    }

    #[test]
    fn test_register_location_scaling() {
        let (env, source) = env_and_source();
        let mut program = Program::new(env);
        // reg[1] = data[1] + data[1]; reg[0] = reg[5 % 4] + reg[5 % 4]
        set_line(&mut program, 0, 1, [(1, 1), (1, 1)]);
        set_line(&mut program, 0, 0, [(0, 5), (0, 5)]);

        let mut engine = ProgramExecutionEngine::new(&program, &[&source]).unwrap();
        assert_eq!(engine.execute(), 4.0);
    }

    #[test]
    fn test_nan_result_becomes_neg_infinity() {
        let (env, source) = env_and_source();
        let mut program = Program::new(env);
        // data[0] / data[0] = 0/0 = NaN -> stored as -inf.
        set_line(&mut program, 1, 0, [(1, 0), (1, 0)]);

        let mut engine = ProgramExecutionEngine::new(&program, &[&source]).unwrap();
        assert_eq!(engine.execute(), f64::NEG_INFINITY);
    }

    #[test]
    fn test_memory_registers_persist() {
        let mut set = Set::new();
        set.add(Arc::new(Add::<f64>::new()));
        set.add(Arc::new(Lambda2::new("one", |_, _| 1.0)));
        let source = DataHandler::from(PrimitiveArray::<f64>::new(4));
        let env = Arc::new(
            Environment::new(&set, &[&source], 4, 0)
                .unwrap()
                .with_memory_registers(true),
        );

        let mut program = Program::new(env);
        // reg[0] = reg[0] + (1, via lambda in reg[1] first)
        set_line(&mut program, 1, 1, [(1, 0), (1, 0)]);
        set_line(&mut program, 0, 0, [(0, 0), (0, 1)]);

        let mut engine = ProgramExecutionEngine::new(&program, &[&source]).unwrap();
        assert_eq!(engine.execute(), 1.0);
        // Register 0 carried over, the bid accumulates.
        assert_eq!(engine.execute(), 2.0);
    }

    #[test]
    fn test_mismatched_sources_rejected() {
        let (env, _) = env_and_source();
        let program = Program::new(env);
        let wrong = DataHandler::from(PrimitiveArray::<f64>::new(3));
        assert!(ProgramExecutionEngine::new(&program, &[&wrong]).is_err());
        assert!(ProgramExecutionEngine::new(&program, &[]).is_err());
    }

    #[test]
    fn test_only_declared_operands_are_fetched() {
        // A line encodes max_nb_operands slots, but the instruction
        // dictates how many are read. Windowed single-operand fetch.
        let mut set = Set::new();
        set.add(Arc::new(Add::<f64>::new()));
        set.add(Arc::new(crate::instructions::MaxOfWindow::<3>::new()));
        let mut array = PrimitiveArray::<f64>::new(8);
        array.slots_mut().copy_from_slice(&[0.0, 7.0, 1.0, 2.0, 3.0, 9.0, 4.0, 5.0]);
        let source = DataHandler::from(array);
        let env = Arc::new(Environment::new(&set, &[&source], 4, 0).unwrap());

        let mut program = Program::new(env);
        {
            let env = Arc::clone(program.environment());
            let line = program.add_new_line();
            line.set_instruction_index(&env, 1).unwrap();
            line.set_destination_index(&env, 0).unwrap();
            // Window of 3 starting at 3: max(2, 3, 9) = 9. The second
            // operand slot is junk the instruction never reads.
            line.set_operand(&env, 0, 1, 3).unwrap();
            line.set_operand(&env, 1, 1, 7).unwrap();
        }

        let mut engine = ProgramExecutionEngine::new(&program, &[&source]).unwrap();
        assert_eq!(engine.execute(), 9.0);
    }
}
