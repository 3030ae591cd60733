//! Property-based tests of intron analysis and behavioural equality
//! (proptest).

use std::sync::Arc;

use proptest::prelude::*;

use tangle::config::TrainingParameters;
use tangle::data::{DataHandler, OperandType, PrimitiveArray};
use tangle::environment::Environment;
use tangle::instructions::{Add, Lambda2, MaxOfWindow, Mult, Set};
use tangle::mutator::program::{init_random_program, mutate_program};
use tangle::mutator::Rng;
use tangle::program::{Program, ProgramExecutionEngine};

fn build_env() -> Arc<Environment> {
    let mut set = Set::new();
    set.add(Arc::new(Add::<f64>::new()));
    set.add(Arc::new(Mult::<f64>::new()));
    set.add(Arc::new(Lambda2::new("sub", |a, b| a - b)));
    // Windowed reads exercise the multi-address intron accounting.
    set.add(Arc::new(MaxOfWindow::<4>::new()));
    let source = DataHandler::from(PrimitiveArray::<f64>::new(24));
    Arc::new(Environment::new(&set, &[&source], 8, 0).unwrap())
}

fn data_source(seed: u64) -> DataHandler {
    let mut array = PrimitiveArray::<f64>::new(24);
    let mut rng = Rng::new(seed);
    for slot in array.slots_mut() {
        *slot = rng.get_double(-10.0, 10.0);
    }
    DataHandler::from(array)
}

fn random_program(env: &Arc<Environment>, seed: u64) -> Program {
    let mut params = TrainingParameters::default();
    params.prog.max_program_size = 32;
    let mut rng = Rng::new(seed);
    let mut program = Program::new(Arc::clone(env));
    init_random_program(&mut program, &params, &mut rng).unwrap();
    program
}

fn bid(program: &Program, data: &DataHandler) -> f64 {
    let mut engine = ProgramExecutionEngine::new(program, &[data]).unwrap();
    engine.execute()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Removing any intron line leaves the bid unchanged on arbitrary
    /// inputs.
    #[test]
    fn prop_intron_removal_preserves_bid(
        program_seed in 0u64..500,
        data_seed in 0u64..500,
    ) {
        let env = build_env();
        let program = random_program(&env, program_seed);
        let data = data_source(data_seed);
        let reference = bid(&program, &data);

        for index in 0..program.nb_lines() {
            if program.is_intron(index).unwrap() {
                let mut trimmed = program.clone();
                trimmed.remove_line(index).unwrap();
                prop_assert_eq!(bid(&trimmed, &data), reference);
            }
        }
    }

    /// Behavioural equality is reflexive over clones and symmetric.
    #[test]
    fn prop_behavior_equality_reflexive_symmetric(
        seed_a in 0u64..500,
        seed_b in 0u64..500,
    ) {
        let env = build_env();
        let a = random_program(&env, seed_a);
        let b = random_program(&env, seed_b);

        prop_assert!(a.has_identical_behavior(&a.clone()));
        prop_assert!(b.has_identical_behavior(&b.clone()));
        prop_assert_eq!(a.has_identical_behavior(&b), b.has_identical_behavior(&a));
    }

    /// Programs that compare behaviourally equal produce equal bids.
    #[test]
    fn prop_equal_behavior_implies_equal_bid(
        program_seed in 0u64..200,
        mutation_seed in 0u64..200,
        data_seed in 0u64..200,
    ) {
        let env = build_env();
        let original = random_program(&env, program_seed);
        let mut mutated = original.clone();
        let mut rng = Rng::new(mutation_seed);
        let params = TrainingParameters::default();
        mutate_program(&mut mutated, &params, &mut rng).unwrap();

        if original.has_identical_behavior(&mutated) {
            let data = data_source(data_seed);
            prop_assert_eq!(bid(&original, &data), bid(&mutated, &data));
        }
    }

    /// Scaled fetches stay within bounds for arbitrary locations.
    #[test]
    fn prop_scaled_fetch_never_escapes(location in 0usize..10_000) {
        let array = PrimitiveArray::<f64>::new(24);
        let handler = DataHandler::from(array);
        // Any location lands on a valid scalar and window.
        let _ = handler.get_data_scaled(OperandType::Double, location);
        let _ = handler.get_data_scaled(OperandType::DoubleWindow(4), location);
    }
}
