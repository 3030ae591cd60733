//! Tangled Program Graphs
//!
//! A TPG is a directed graph of *teams* (interior vertices) and
//! *actions* (leaves). Edges carry shared references to bidding
//! programs; executing the graph from a root repeatedly evaluates the
//! outgoing edges of the current team and follows the highest bid until
//! an action is reached.
//!
//! ```text
//! TpgGraph (arena)
//!   |-- Vertex (Team | Action), incoming/outgoing edge id lists
//!   `-- Edge   (source, destination, ProgramHandle)
//! ```
//!
//! The graph owns vertices and edges exclusively and hands out stable
//! ids; programs are the only shared pieces.

pub mod execution;
pub mod graph;

pub use execution::TpgExecutionEngine;
pub use graph::{Edge, EdgeId, TpgGraph, Vertex, VertexId, VertexKind};
