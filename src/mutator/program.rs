//! Program-level mutation operators.
//!
//! Single-step operators (delete, insert, swap, alter, constant
//! resample) leave intron flags stale; the top-level
//! [`mutate_program`] re-identifies introns once after the batch.

use crate::config::TrainingParameters;
use crate::error::TangleResult;
use crate::mutator::line::{alter_correct_line, init_random_correct_line};
use crate::mutator::Rng;
use crate::program::Program;

/// Reset `program` to a random draw of `1..=max_program_size` freshly
/// initialized lines, introns identified.
pub fn init_random_program(
    program: &mut Program,
    params: &TrainingParameters,
    rng: &mut Rng,
) -> TangleResult<()> {
    while program.nb_lines() > 0 {
        program.remove_line(0)?;
    }

    let nb_lines = rng.get_u64(1, params.prog.max_program_size as u64) as usize;
    while program.nb_lines() < nb_lines {
        insert_random_line(program, rng)?;
    }

    program.identify_introns();
    Ok(())
}

/// Delete a uniformly chosen line; refuses to empty the program.
pub fn delete_random_line(program: &mut Program, rng: &mut Rng) -> TangleResult<bool> {
    if program.nb_lines() <= 1 {
        return Ok(false);
    }
    let index = rng.get_index(program.nb_lines());
    program.remove_line(index)?;
    Ok(true)
}

/// Insert a freshly initialized line at a uniform position.
pub fn insert_random_line(program: &mut Program, rng: &mut Rng) -> TangleResult<()> {
    let env = std::sync::Arc::clone(program.environment());
    let index = rng.get_u64(0, program.nb_lines() as u64) as usize;
    let line = program.add_new_line_at(index)?;
    init_random_correct_line(&env, line, rng)
}

/// Swap two distinct uniformly chosen lines.
pub fn swap_random_lines(program: &mut Program, rng: &mut Rng) -> TangleResult<bool> {
    if program.nb_lines() < 2 {
        return Ok(false);
    }
    let first = rng.get_index(program.nb_lines());
    let mut second = rng.get_index(program.nb_lines() - 1);
    if second >= first {
        second += 1;
    }
    program.swap_lines(first, second)?;
    Ok(true)
}

/// Alter one region of a uniformly chosen line.
pub fn alter_random_line(program: &mut Program, rng: &mut Rng) -> TangleResult<bool> {
    if program.nb_lines() < 1 {
        return Ok(false);
    }
    let env = std::sync::Arc::clone(program.environment());
    let index = rng.get_index(program.nb_lines());
    let line = program.line_mut(index)?;
    alter_correct_line(&env, line, rng)?;
    Ok(true)
}

/// Resample one constant slot uniformly in the configured range.
pub fn alter_random_constant(
    program: &mut Program,
    params: &TrainingParameters,
    rng: &mut Rng,
) -> TangleResult<bool> {
    let nb_constants = program.environment().nb_constants();
    if nb_constants == 0 {
        return Ok(false);
    }
    let index = rng.get_index(nb_constants);
    let value = rng.get_i32(params.prog.min_const_value, params.prog.max_const_value);
    program.set_constant_at(index, value)?;
    Ok(true)
}

/// Apply the stochastic mutation batch to `program`.
///
/// Each operator triggers independently, in order: delete, add, alter
/// line, swap, alter constant. Introns are re-identified once if
/// anything ran. Returns whether any operator ran.
pub fn mutate_program(
    program: &mut Program,
    params: &TrainingParameters,
    rng: &mut Rng,
) -> TangleResult<bool> {
    let mut any_mutation = false;

    if program.nb_lines() > 1 && rng.get_double(0.0, 1.0) < params.prog.p_delete {
        any_mutation = true;
        delete_random_line(program, rng)?;
    }

    if program.nb_lines() < params.prog.max_program_size
        && rng.get_double(0.0, 1.0) < params.prog.p_add
    {
        any_mutation = true;
        insert_random_line(program, rng)?;
    }

    if rng.get_double(0.0, 1.0) < params.prog.p_mutate {
        any_mutation = true;
        alter_random_line(program, rng)?;
    }

    if rng.get_double(0.0, 1.0) < params.prog.p_swap {
        any_mutation = true;
        swap_random_lines(program, rng)?;
    }

    if program.environment().nb_constants() > 0
        && rng.get_double(0.0, 1.0) < params.prog.p_constant_mutation
    {
        any_mutation = true;
        alter_random_constant(program, params, rng)?;
    }

    if any_mutation {
        program.identify_introns();
    }

    Ok(any_mutation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataHandler, PrimitiveArray};
    use crate::environment::Environment;
    use crate::instructions::{Add, Mult, MultByConstant, Set};
    use std::sync::Arc;

    fn test_env(nb_constants: usize) -> Arc<Environment> {
        let mut set = Set::new();
        set.add(Arc::new(Add::<f64>::new()));
        set.add(Arc::new(Mult::<f64>::new()));
        set.add(Arc::new(Add::<i32>::new()));
        set.add(Arc::new(MultByConstant::new()));
        let doubles = DataHandler::from(PrimitiveArray::<f64>::new(24));
        let ints = DataHandler::from(PrimitiveArray::<i32>::new(32));
        Arc::new(Environment::new(&set, &[&doubles, &ints], 8, nb_constants).unwrap())
    }

    fn params() -> TrainingParameters {
        TrainingParameters::default()
    }

    #[test]
    fn test_init_random_program_bounds_and_determinism() {
        let env = test_env(0);
        let params = params();

        let build = |seed: u64| {
            let mut rng = Rng::new(seed);
            let mut program = Program::new(Arc::clone(&env));
            init_random_program(&mut program, &params, &mut rng).unwrap();
            program
        };

        for seed in 0..8 {
            let program = build(seed);
            assert!(program.nb_lines() >= 1);
            assert!(program.nb_lines() <= params.prog.max_program_size);
        }

        // Same seed, same structure.
        let a = build(0);
        let b = build(0);
        assert_eq!(a.nb_lines(), b.nb_lines());
        assert!(a.has_identical_behavior(&b));
    }

    #[test]
    fn test_reinit_replaces_previous_content() {
        let env = test_env(0);
        let params = params();
        let mut rng = Rng::new(0);
        let mut program = Program::new(Arc::clone(&env));
        init_random_program(&mut program, &params, &mut rng).unwrap();
        let first_len = program.nb_lines();

        init_random_program(&mut program, &params, &mut rng).unwrap();
        assert!(program.nb_lines() >= 1);
        assert!(program.nb_lines() <= params.prog.max_program_size);
        // The RNG moved on, an identical draw is not expected.
        let _ = first_len;
    }

    #[test]
    fn test_delete_refuses_last_line() {
        let env = test_env(0);
        let mut rng = Rng::new(0);
        let mut program = Program::new(Arc::clone(&env));
        insert_random_line(&mut program, &mut rng).unwrap();
        assert!(!delete_random_line(&mut program, &mut rng).unwrap());
        insert_random_line(&mut program, &mut rng).unwrap();
        assert!(delete_random_line(&mut program, &mut rng).unwrap());
        assert_eq!(program.nb_lines(), 1);
    }

    #[test]
    fn test_swap_needs_two_lines() {
        let env = test_env(0);
        let mut rng = Rng::new(0);
        let mut program = Program::new(Arc::clone(&env));
        assert!(!swap_random_lines(&mut program, &mut rng).unwrap());
        insert_random_line(&mut program, &mut rng).unwrap();
        assert!(!swap_random_lines(&mut program, &mut rng).unwrap());
        insert_random_line(&mut program, &mut rng).unwrap();
        assert!(swap_random_lines(&mut program, &mut rng).unwrap());
    }

    #[test]
    fn test_alter_constant_only_with_constants() {
        let params = params();
        let mut rng = Rng::new(0);

        let mut without = Program::new(test_env(0));
        assert!(!alter_random_constant(&mut without, &params, &mut rng).unwrap());

        let mut with = Program::new(test_env(4));
        assert!(alter_random_constant(&mut with, &params, &mut rng).unwrap());
        let values: Vec<i32> = (0..4).map(|i| with.constant_at(i).unwrap()).collect();
        assert!(values.iter().all(|v| {
            (params.prog.min_const_value..=params.prog.max_const_value).contains(v)
        }));
    }

    #[test]
    fn test_mutate_program_reidentifies_introns() {
        let env = test_env(0);
        let mut params = params();
        params.prog.p_delete = 1.0;
        params.prog.p_add = 1.0;
        params.prog.p_mutate = 1.0;
        params.prog.p_swap = 1.0;

        let mut rng = Rng::new(4);
        let mut program = Program::new(Arc::clone(&env));
        init_random_program(&mut program, &params, &mut rng).unwrap();

        assert!(mutate_program(&mut program, &params, &mut rng).unwrap());
        // Flags are coherent: recomputing them changes nothing.
        let flags: Vec<bool> = (0..program.nb_lines())
            .map(|i| program.is_intron(i).unwrap())
            .collect();
        program.identify_introns();
        let recomputed: Vec<bool> = (0..program.nb_lines())
            .map(|i| program.is_intron(i).unwrap())
            .collect();
        assert_eq!(flags, recomputed);
    }

    #[test]
    fn test_mutate_program_zero_probabilities_do_nothing() {
        let env = test_env(0);
        let mut params = params();
        params.prog.p_delete = 0.0;
        params.prog.p_add = 0.0;
        params.prog.p_mutate = 0.0;
        params.prog.p_swap = 0.0;
        params.prog.p_constant_mutation = 0.0;

        let mut rng = Rng::new(0);
        let mut program = Program::new(Arc::clone(&env));
        init_random_program(&mut program, &params, &mut rng).unwrap();
        let before = program.nb_lines();
        assert!(!mutate_program(&mut program, &params, &mut rng).unwrap());
        assert_eq!(program.nb_lines(), before);
    }
}
