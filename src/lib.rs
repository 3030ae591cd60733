//! # Tangle
//!
//! A reinforcement-learning engine that evolves **Tangled Program
//! Graphs** (TPGs): populations of small register-machine programs
//! arranged in a directed graph whose leaves are discrete actions.
//! Training repeatedly executes the graph against a learning
//! environment, records program bids into a behavioural archive, and
//! regenerates root teams through stochastic mutation.
//!
//! ## Architecture
//!
//! ```text
//! Environment (line layout, filtered instruction set)
//!     ↓
//! Program (lines + constants, intron analysis)
//!     ↓
//! ProgramExecutionEngine  → bid = register[0]
//!     ↓
//! TpgGraph + TpgExecutionEngine → root-to-action path
//!     ↓                      ↘ bids recorded
//! Mutators (line / program / TPG)  ←  Archive (diversity pressure)
//! ```
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//! use tangle::config::TrainingParameters;
//! use tangle::data::{DataHandler, PrimitiveArray};
//! use tangle::environment::Environment;
//! use tangle::instructions::{Add, Mult, Set};
//! use tangle::mutator::tpg::populate_tpg;
//! use tangle::mutator::Rng;
//! use tangle::tpg::{TpgGraph, TpgExecutionEngine};
//! use tangle::archive::Archive;
//!
//! // An environment over one observable data source.
//! let mut instructions = Set::new();
//! instructions.add(Arc::new(Add::<f64>::new()));
//! instructions.add(Arc::new(Mult::<f64>::new()));
//! let sensors = DataHandler::from(PrimitiveArray::<f64>::new(16));
//! let env = Arc::new(Environment::new(&instructions, &[&sensors], 8, 0).unwrap());
//!
//! // Populate a graph with mutated root teams.
//! let mut params = TrainingParameters::default();
//! params.tpg.nb_actions = 2;
//! params.tpg.max_init_outgoing_edges = 2;
//! params.tpg.nb_roots = 6;
//! let mut graph = TpgGraph::new(Arc::clone(&env));
//! let mut archive = Archive::new(params.archive_size, params.archiving_probability);
//! let mut rng = Rng::new(0);
//! populate_tpg(&mut graph, &archive, &params, &mut rng, &[0, 1], 1).unwrap();
//!
//! // Execute from the first root down to an action.
//! let root = graph.root_ids()[0];
//! let mut engine = TpgExecutionEngine::with_archive(&graph, &[&sensors], &mut archive);
//! let path = engine.execute_from_root(root).unwrap();
//! assert!(graph.vertex(*path.last().unwrap()).unwrap().is_action());
//! ```

pub mod archive;
pub mod config;
pub mod data;
pub mod dot;
pub mod environment;
pub mod error;
pub mod instructions;
pub mod learn;
pub mod mutator;
pub mod program;
pub mod tpg;

// Re-export the types most callers touch.
pub use archive::{Archive, Recording, BEHAVIOR_TOLERANCE};
pub use config::{ProgramParameters, TpgParameters, TrainingParameters};
pub use data::{ConstantHandler, DataHandler, OperandType, PrimitiveArray, Value};
pub use environment::{Environment, LineLayout};
pub use error::{TangleError, TangleResult};
pub use instructions::{Instruction, Set};
pub use learn::{LearningEnvironment, LearningMode};
pub use mutator::Rng;
pub use program::{Line, Program, ProgramExecutionEngine, ProgramHandle, ProgramId};
pub use tpg::{Edge, EdgeId, TpgExecutionEngine, TpgGraph, Vertex, VertexId, VertexKind};
