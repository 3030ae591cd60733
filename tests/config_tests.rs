//! Parameter-file loading: TOML, JSON, defaults and unknown keys.

use std::io::Write;

use tangle::config::TrainingParameters;

fn write_temp(extension: &str, content: &str) -> tempfile::TempPath {
    let mut file = tempfile::Builder::new()
        .suffix(extension)
        .tempfile()
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.into_temp_path()
}

#[test]
fn test_load_toml_file() {
    let path = write_temp(
        ".toml",
        r#"
archive_size = 20
archiving_probability = 0.25
nb_registers = 16
nb_program_constants = 4

[tpg]
nb_actions = 6
nb_roots = 42
force_program_behavior_change_on_mutation = true

[prog]
max_program_size = 48
min_const_value = -100
max_const_value = 100
"#,
    );

    let params = TrainingParameters::from_file(&path).unwrap();
    assert_eq!(params.archive_size, 20);
    assert_eq!(params.archiving_probability, 0.25);
    assert_eq!(params.nb_registers, 16);
    assert_eq!(params.nb_program_constants, 4);
    assert_eq!(params.tpg.nb_actions, 6);
    assert_eq!(params.tpg.nb_roots, 42);
    assert!(params.tpg.force_program_behavior_change_on_mutation);
    assert_eq!(params.prog.max_program_size, 48);
    assert_eq!(params.prog.min_const_value, -100);
    assert_eq!(params.prog.max_const_value, 100);

    // Untouched keys keep their defaults.
    assert_eq!(params.nb_threads, 1);
    assert_eq!(params.prog.p_mutate, 1.0);
}

#[test]
fn test_load_json_file() {
    let path = write_temp(
        ".json",
        r#"{
  "nb_registers": 12,
  "use_memory_registers": true,
  "tpg": {"nb_roots": 9, "p_edge_deletion": 0.3},
  "prog": {"p_swap": 0.0}
}"#,
    );

    let params = TrainingParameters::from_file(&path).unwrap();
    assert_eq!(params.nb_registers, 12);
    assert!(params.use_memory_registers);
    assert_eq!(params.tpg.nb_roots, 9);
    assert_eq!(params.tpg.p_edge_deletion, 0.3);
    assert_eq!(params.prog.p_swap, 0.0);
    assert_eq!(params.prog.max_program_size, 96);
}

#[test]
fn test_unknown_keys_are_ignored() {
    // Agent- or experiment-level keys the core does not know must not
    // break loading.
    let path = write_temp(
        ".json",
        r#"{
  "nb_registers": 8,
  "experiment_name": "cartpole-v7",
  "tpg": {"nb_roots": 5, "fancy_future_option": 3},
  "prog": {"p_add": 0.9, "legacy_knob": false}
}"#,
    );

    let params = TrainingParameters::from_file(&path).unwrap();
    assert_eq!(params.nb_registers, 8);
    assert_eq!(params.tpg.nb_roots, 5);
    assert_eq!(params.prog.p_add, 0.9);
}

#[test]
fn test_malformed_file_is_an_error() {
    let path = write_temp(".toml", "this = is not [ valid");
    assert!(TrainingParameters::from_file(&path).is_err());

    let missing = std::path::Path::new("/nonexistent/tangle-params.toml");
    assert!(TrainingParameters::from_file(missing).is_err());
}
