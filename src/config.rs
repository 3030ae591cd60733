//! Training Parameters
//!
//! Provides hierarchical parameter loading from:
//! - tangle.toml (default configuration)
//! - JSON parameter files (training campaigns)
//! - Environment variables (TANGLE_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # tangle.toml
//! archive_size = 50
//! nb_registers = 8
//!
//! [tpg]
//! nb_roots = 100
//! p_edge_deletion = 0.7
//!
//! [prog]
//! max_program_size = 96
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! TANGLE_NB_REGISTERS=16
//! TANGLE_TPG__NB_ROOTS=200
//! ```
//!
//! Unknown keys are ignored with a warning so that parameter files can
//! carry agent- or experiment-level settings the core does not read.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use crate::error::{TangleError, TangleResult};

/// Graph shape and graph mutation probabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TpgParameters {
    /// Number of actions of the learning environment
    #[serde(default = "default_nb_actions")]
    pub nb_actions: usize,

    /// Number of root teams regenerated every generation
    #[serde(default = "default_nb_roots")]
    pub nb_roots: usize,

    /// Upper bound on outgoing edges at initialization
    #[serde(default = "default_max_init_outgoing_edges")]
    pub max_init_outgoing_edges: usize,

    /// Upper bound on outgoing edges during mutation
    #[serde(default = "default_max_outgoing_edges")]
    pub max_outgoing_edges: usize,

    #[serde(default = "default_p_edge_deletion")]
    pub p_edge_deletion: f64,

    #[serde(default = "default_p_edge_addition")]
    pub p_edge_addition: f64,

    #[serde(default = "default_p_program_mutation")]
    pub p_program_mutation: f64,

    #[serde(default = "default_p_edge_destination_change")]
    pub p_edge_destination_change: f64,

    #[serde(default = "default_p_edge_destination_is_action")]
    pub p_edge_destination_is_action: f64,

    /// Loop program mutation until the bids differ from every archived
    /// behaviour
    #[serde(default)]
    pub force_program_behavior_change_on_mutation: bool,
}

/// Program shape and program mutation probabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramParameters {
    /// Upper bound on the number of lines of a program
    #[serde(default = "default_max_program_size")]
    pub max_program_size: usize,

    #[serde(default = "default_p_delete")]
    pub p_delete: f64,

    #[serde(default = "default_p_add")]
    pub p_add: f64,

    #[serde(default = "default_p_mutate")]
    pub p_mutate: f64,

    #[serde(default = "default_p_swap")]
    pub p_swap: f64,

    #[serde(default = "default_p_constant_mutation")]
    pub p_constant_mutation: f64,

    /// Probability for the agent to create a program from scratch
    /// instead of cloning (agent-level, carried opaquely)
    #[serde(default)]
    pub p_new_program: f64,

    /// Lower bound of the constant draw range
    #[serde(default = "default_min_const_value")]
    pub min_const_value: i32,

    /// Upper bound of the constant draw range
    #[serde(default = "default_max_const_value")]
    pub max_const_value: i32,
}

/// All parameters driving training, mutation included.
///
/// Keys the core treats as opaque (generation counts, evaluation
/// schedules, validation) are still recognized and carried so that one
/// parameter file can configure the whole training stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingParameters {
    /// Archive capacity
    #[serde(default = "default_archive_size")]
    pub archive_size: usize,

    /// Probability of recording an edge evaluation into the archive
    #[serde(default = "default_archiving_probability")]
    pub archiving_probability: f64,

    /// Agent-level: rollouts per policy evaluation
    #[serde(default = "default_nb_iterations_per_policy_evaluation")]
    pub nb_iterations_per_policy_evaluation: u64,

    /// Agent-level: action budget per evaluation
    #[serde(default = "default_max_nb_actions_per_eval")]
    pub max_nb_actions_per_eval: u64,

    /// Agent-level: evaluation budget per policy
    #[serde(default = "default_max_nb_evaluation_per_policy")]
    pub max_nb_evaluation_per_policy: u64,

    /// Agent-level: number of generations
    #[serde(default = "default_nb_generations")]
    pub nb_generations: u64,

    /// Agent-level: rollouts grouped into one job
    #[serde(default = "default_nb_iterations_per_job")]
    pub nb_iterations_per_job: u64,

    /// Agent-level: share of worst roots decimated per generation
    #[serde(default = "default_ratio_deleted_roots")]
    pub ratio_deleted_roots: f64,

    /// Register file size of the environment
    #[serde(default = "default_nb_registers")]
    pub nb_registers: usize,

    /// Constant slots per program
    #[serde(default)]
    pub nb_program_constants: usize,

    /// Keep register content between program executions
    #[serde(default)]
    pub use_memory_registers: bool,

    /// Multi-action branching factor; `0` means single-action
    #[serde(default)]
    pub nb_edges_activable: usize,

    /// `<= 1` sequential; `> 1` parallel program-behaviour mutation
    #[serde(default = "default_nb_threads")]
    pub nb_threads: usize,

    /// Agent-level: evaluate on validation rollouts too
    #[serde(default)]
    pub do_validation: bool,

    #[serde(default)]
    pub tpg: TpgParameters,

    #[serde(default)]
    pub prog: ProgramParameters,
}

// Default value functions
fn default_archive_size() -> usize { 50 }
fn default_archiving_probability() -> f64 { 0.05 }
fn default_nb_iterations_per_policy_evaluation() -> u64 { 1 }
fn default_max_nb_actions_per_eval() -> u64 { 1000 }
fn default_max_nb_evaluation_per_policy() -> u64 { 1000 }
fn default_nb_generations() -> u64 { 100 }
fn default_nb_iterations_per_job() -> u64 { 1 }
fn default_ratio_deleted_roots() -> f64 { 0.5 }
fn default_nb_registers() -> usize { 8 }
fn default_nb_threads() -> usize { 1 }
fn default_nb_actions() -> usize { 2 }
fn default_nb_roots() -> usize { 100 }
fn default_max_init_outgoing_edges() -> usize { 3 }
fn default_max_outgoing_edges() -> usize { 5 }
fn default_p_edge_deletion() -> f64 { 0.7 }
fn default_p_edge_addition() -> f64 { 0.7 }
fn default_p_program_mutation() -> f64 { 0.2 }
fn default_p_edge_destination_change() -> f64 { 0.1 }
fn default_p_edge_destination_is_action() -> f64 { 0.5 }
fn default_max_program_size() -> usize { 96 }
fn default_p_delete() -> f64 { 0.5 }
fn default_p_add() -> f64 { 0.5 }
fn default_p_mutate() -> f64 { 1.0 }
fn default_p_swap() -> f64 { 1.0 }
fn default_p_constant_mutation() -> f64 { 0.5 }
fn default_min_const_value() -> i32 { -10 }
fn default_max_const_value() -> i32 { 10 }

impl Default for TpgParameters {
    fn default() -> Self {
        TpgParameters {
            nb_actions: default_nb_actions(),
            nb_roots: default_nb_roots(),
            max_init_outgoing_edges: default_max_init_outgoing_edges(),
            max_outgoing_edges: default_max_outgoing_edges(),
            p_edge_deletion: default_p_edge_deletion(),
            p_edge_addition: default_p_edge_addition(),
            p_program_mutation: default_p_program_mutation(),
            p_edge_destination_change: default_p_edge_destination_change(),
            p_edge_destination_is_action: default_p_edge_destination_is_action(),
            force_program_behavior_change_on_mutation: false,
        }
    }
}

impl Default for ProgramParameters {
    fn default() -> Self {
        ProgramParameters {
            max_program_size: default_max_program_size(),
            p_delete: default_p_delete(),
            p_add: default_p_add(),
            p_mutate: default_p_mutate(),
            p_swap: default_p_swap(),
            p_constant_mutation: default_p_constant_mutation(),
            p_new_program: 0.0,
            min_const_value: default_min_const_value(),
            max_const_value: default_max_const_value(),
        }
    }
}

impl Default for TrainingParameters {
    fn default() -> Self {
        TrainingParameters {
            archive_size: default_archive_size(),
            archiving_probability: default_archiving_probability(),
            nb_iterations_per_policy_evaluation: default_nb_iterations_per_policy_evaluation(),
            max_nb_actions_per_eval: default_max_nb_actions_per_eval(),
            max_nb_evaluation_per_policy: default_max_nb_evaluation_per_policy(),
            nb_generations: default_nb_generations(),
            nb_iterations_per_job: default_nb_iterations_per_job(),
            ratio_deleted_roots: default_ratio_deleted_roots(),
            nb_registers: default_nb_registers(),
            nb_program_constants: 0,
            use_memory_registers: false,
            nb_edges_activable: 0,
            nb_threads: default_nb_threads(),
            do_validation: false,
            tpg: TpgParameters::default(),
            prog: ProgramParameters::default(),
        }
    }
}

/// Keys recognized at the top level.
const KNOWN_TOP_LEVEL: &[&str] = &[
    "archive_size",
    "archiving_probability",
    "nb_iterations_per_policy_evaluation",
    "max_nb_actions_per_eval",
    "max_nb_evaluation_per_policy",
    "nb_generations",
    "nb_iterations_per_job",
    "ratio_deleted_roots",
    "nb_registers",
    "nb_program_constants",
    "use_memory_registers",
    "nb_edges_activable",
    "nb_threads",
    "do_validation",
    "tpg",
    "prog",
];

const KNOWN_TPG: &[&str] = &[
    "nb_actions",
    "nb_roots",
    "max_init_outgoing_edges",
    "max_outgoing_edges",
    "p_edge_deletion",
    "p_edge_addition",
    "p_program_mutation",
    "p_edge_destination_change",
    "p_edge_destination_is_action",
    "force_program_behavior_change_on_mutation",
];

const KNOWN_PROG: &[&str] = &[
    "max_program_size",
    "p_delete",
    "p_add",
    "p_mutate",
    "p_swap",
    "p_constant_mutation",
    "p_new_program",
    "min_const_value",
    "max_const_value",
];

impl TrainingParameters {
    /// Load parameters from default locations.
    ///
    /// Merges in order:
    /// 1. tangle.toml (base configuration)
    /// 2. Environment variables (TANGLE_* prefix)
    pub fn load() -> TangleResult<Self> {
        Figment::new()
            .merge(Toml::file("tangle.toml"))
            .merge(Env::prefixed("TANGLE_").split("__"))
            .extract()
            .map_err(|e| TangleError::Configuration(e.to_string()))
    }

    /// Load parameters from a specific TOML or JSON file.
    ///
    /// Unknown keys are ignored with a warning.
    pub fn from_file<P: AsRef<Path>>(path: P) -> TangleResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| TangleError::Configuration(format!("{}: {e}", path.display())))?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let value: serde_json::Value = if is_json {
            serde_json::from_str(&raw)
                .map_err(|e| TangleError::Configuration(format!("{}: {e}", path.display())))?
        } else {
            let parsed: toml::Value = toml::from_str(&raw)
                .map_err(|e| TangleError::Configuration(format!("{}: {e}", path.display())))?;
            serde_json::to_value(parsed)
                .map_err(|e| TangleError::Configuration(e.to_string()))?
        };

        warn_unknown_keys(&value);

        serde_json::from_value(value)
            .map_err(|e| TangleError::Configuration(format!("{}: {e}", path.display())))
    }
}

/// Warn about keys the core does not recognize.
fn warn_unknown_keys(value: &serde_json::Value) {
    let Some(top) = value.as_object() else {
        return;
    };
    for key in top.keys() {
        if !KNOWN_TOP_LEVEL.contains(&key.as_str()) {
            warn!(key = key.as_str(), "unknown parameter key ignored");
        }
    }
    for (section, known) in [("tpg", KNOWN_TPG), ("prog", KNOWN_PROG)] {
        if let Some(table) = top.get(section).and_then(serde_json::Value::as_object) {
            for key in table.keys() {
                if !known.contains(&key.as_str()) {
                    warn!(
                        section,
                        key = key.as_str(),
                        "unknown parameter key ignored"
                    );
                }
            }
        }
    }
}
