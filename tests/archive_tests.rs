//! Archive behaviour through the execution path: recording, FIFO
//! eviction, snapshot lifetime, diversity checks.

use std::collections::HashMap;
use std::sync::Arc;

use tangle::archive::Archive;
use tangle::data::{DataHandler, OperandType, PrimitiveArray, Value};
use tangle::environment::Environment;
use tangle::instructions::{Add, Mult, Set};
use tangle::program::{Program, ProgramHandle};
use tangle::tpg::{TpgExecutionEngine, TpgGraph};

fn setup() -> (Arc<Environment>, DataHandler) {
    let mut set = Set::new();
    set.add(Arc::new(Add::<f64>::new()));
    set.add(Arc::new(Mult::<f64>::new()));
    let mut array = PrimitiveArray::<f64>::new(8);
    for (i, slot) in array.slots_mut().iter_mut().enumerate() {
        *slot = i as f64;
    }
    let source = DataHandler::from(array);
    let env = Arc::new(Environment::new(&set, &[&source], 4, 0).unwrap());
    (env, source)
}

fn bidder(env: &Arc<Environment>, a: usize, b: usize) -> ProgramHandle {
    let mut program = Program::new(Arc::clone(env));
    let line = program.add_new_line();
    line.set_instruction_index(env, 0).unwrap();
    line.set_destination_index(env, 0).unwrap();
    line.set_operand(env, 0, 1, a).unwrap();
    line.set_operand(env, 1, 1, b).unwrap();
    program.into_handle()
}

#[test]
fn test_recordings_follow_environment_data_changes() {
    // The same program recorded on successive environment states keys
    // one snapshot per distinct data content.
    let (env, mut source) = setup();
    let mut graph = TpgGraph::new(Arc::clone(&env));
    let team = graph.add_new_team();
    let a0 = graph.add_new_action(0);
    let a1 = graph.add_new_action(1);
    graph.add_new_edge(team, a0, bidder(&env, 0, 1)).unwrap();
    graph.add_new_edge(team, a1, bidder(&env, 2, 3)).unwrap();

    let mut archive = Archive::new(32, 1.0);

    for step in 0..3 {
        // The environment mutates its observable data between steps.
        source
            .set_data_at(OperandType::Double, 0, Value::Double(f64::from(step) * 10.0))
            .unwrap();
        let mut engine = TpgExecutionEngine::with_archive(&graph, &[&source], &mut archive);
        engine.execute_from_root(team).unwrap();
    }

    // Two recordings per traversal, one snapshot per distinct state.
    assert_eq!(archive.nb_recordings(), 6);
    assert_eq!(archive.nb_data_handlers(), 3);

    // Bids recorded for the first step reflect the data at that time:
    // data[0] was 0.0, so the first edge bid 0 + 1.
    assert_eq!(archive.recording_at(0).unwrap().result, 1.0);
    // On the last step data[0] was 20.0.
    assert_eq!(archive.recording_at(4).unwrap().result, 21.0);
}

#[test]
fn test_eviction_keeps_most_recent_and_prunes_snapshots() {
    let (env, mut source) = setup();
    let program = bidder(&env, 0, 1);
    let mut archive = Archive::new(3, 1.0);

    let mut hashes = Vec::new();
    for step in 0..5 {
        source
            .set_data_at(OperandType::Double, 7, Value::Double(f64::from(step)))
            .unwrap();
        hashes.push(Archive::combined_hash(&[&source]));
        archive.add_recording(&program, &[&source], f64::from(step), false);
    }

    // Capacity 3: the two oldest recordings and their snapshots are
    // gone, the three youngest remain in order.
    assert_eq!(archive.nb_recordings(), 3);
    let results: Vec<f64> = (0..3)
        .map(|i| archive.recording_at(i).unwrap().result)
        .collect();
    assert_eq!(results, vec![2.0, 3.0, 4.0]);
    assert_eq!(archive.nb_data_handlers(), 3);
    assert!(!archive.has_data_handlers(hashes[0]));
    assert!(!archive.has_data_handlers(hashes[1]));
    for hash in &hashes[2..] {
        assert!(archive.has_data_handlers(*hash));
    }
}

#[test]
fn test_uniqueness_across_multiple_programs() {
    let (env, mut source) = setup();
    let first = bidder(&env, 0, 1);
    let second = bidder(&env, 2, 3);
    let mut archive = Archive::new(16, 1.0);

    let mut hashes = Vec::new();
    for step in 0..2 {
        source
            .set_data_at(OperandType::Double, 6, Value::Double(f64::from(step)))
            .unwrap();
        hashes.push(Archive::combined_hash(&[&source]));
        archive.add_recording(&first, &[&source], 1.0 + f64::from(step), false);
        archive.add_recording(&second, &[&source], 5.0 - f64::from(step), false);
    }

    // Matching `first` on both snapshots: not unique.
    let query: HashMap<u64, f64> = [(hashes[0], 1.0), (hashes[1], 2.0)].into();
    assert!(!archive.are_program_results_unique(&query, 0.0));

    // Matching `second`: not unique either.
    let query: HashMap<u64, f64> = [(hashes[0], 5.0), (hashes[1], 4.0)].into();
    assert!(!archive.are_program_results_unique(&query, 0.0));

    // Mixing the two programs' rows matches neither completely.
    let query: HashMap<u64, f64> = [(hashes[0], 1.0), (hashes[1], 4.0)].into();
    assert!(archive.are_program_results_unique(&query, 0.0));

    // A partial overlap that matches every overlapping row of `first`
    // is still equivalent to it.
    let query: HashMap<u64, f64> = [(hashes[1], 2.0)].into();
    assert!(!archive.are_program_results_unique(&query, 0.0));
}

#[test]
fn test_snapshot_replay_reproduces_bids() {
    // Bids recomputed from archived snapshots equal the recorded bids,
    // even after the live data moved on.
    let (env, mut source) = setup();
    let program = bidder(&env, 0, 5);
    let mut archive = Archive::new(8, 1.0);

    source
        .set_data_at(OperandType::Double, 0, Value::Double(3.0))
        .unwrap();
    let recorded_bid = {
        let guard = program.read();
        let mut engine =
            tangle::program::ProgramExecutionEngine::new(&guard, &[&source]).unwrap();
        engine.execute()
    };
    archive.add_recording(&program, &[&source], recorded_bid, false);
    let hash = Archive::combined_hash(&[&source]);

    // Live data changes afterwards.
    source
        .set_data_at(OperandType::Double, 0, Value::Double(99.0))
        .unwrap();

    let snapshot = &archive.data_handlers()[&hash];
    let refs: Vec<&DataHandler> = snapshot.iter().collect();
    let replayed = {
        let guard = program.read();
        let mut engine = tangle::program::ProgramExecutionEngine::new(&guard, &refs).unwrap();
        engine.execute()
    };
    assert_eq!(replayed, recorded_bid);
    assert_eq!(replayed, 3.0 + 5.0);
}
