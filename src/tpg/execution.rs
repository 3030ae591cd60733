//! Graph Execution Engine
//!
//! Walks a TPG from a root vertex to an action. At each team, every
//! outgoing edge whose destination has not been visited yet is
//! evaluated by running its program against the live data sources; the
//! edge with the highest bid wins and the walk follows it. Visited
//! teams are excluded so cycles cannot trap the walk; a well-formed
//! graph always reaches an action.

use std::collections::HashSet;

use crate::archive::Archive;
use crate::data::DataHandler;
use crate::error::{TangleError, TangleResult};
use crate::program::ProgramExecutionEngine;
use crate::tpg::{EdgeId, TpgGraph, VertexId};

/// One traversal context over a graph and its live data sources.
pub struct TpgExecutionEngine<'a> {
    graph: &'a TpgGraph,
    data: Vec<&'a DataHandler>,
    archive: Option<&'a mut Archive>,
}

impl<'a> TpgExecutionEngine<'a> {
    /// An engine without behavioural recording.
    pub fn new(graph: &'a TpgGraph, data: &[&'a DataHandler]) -> Self {
        TpgExecutionEngine {
            graph,
            data: data.to_vec(),
            archive: None,
        }
    }

    /// An engine that records edge bids into `archive` (subject to the
    /// archive's own recording probability).
    pub fn with_archive(
        graph: &'a TpgGraph,
        data: &[&'a DataHandler],
        archive: &'a mut Archive,
    ) -> Self {
        TpgExecutionEngine {
            graph,
            data: data.to_vec(),
            archive: Some(archive),
        }
    }

    /// Run the edge's program and return its bid.
    pub fn evaluate_edge(&mut self, edge_id: EdgeId) -> TangleResult<f64> {
        let graph = self.graph;
        let edge = graph.edge(edge_id)?;
        let program = edge.program();
        let bid = {
            let guard = program.read();
            let mut engine = ProgramExecutionEngine::new(&guard, &self.data)?;
            engine.execute()
        };
        if let Some(archive) = self.archive.as_deref_mut() {
            archive.add_recording(program, &self.data, bid, false);
        }
        Ok(bid)
    }

    /// Evaluate the team's outgoing edges and return the best one.
    ///
    /// Edges leading into `excluded` are skipped entirely. On equal
    /// bids the edge evaluated later wins. Fails with
    /// [`NoReachableEdge`](TangleError::NoReachableEdge) when every
    /// destination is excluded, which only happens on a malformed
    /// graph: every cycle must have an action exit.
    pub fn evaluate_team(
        &mut self,
        team_id: VertexId,
        excluded: &HashSet<VertexId>,
    ) -> TangleResult<EdgeId> {
        let candidates: Vec<EdgeId> = self
            .graph
            .vertex(team_id)?
            .outgoing()
            .iter()
            .filter(|edge_id| {
                self.graph
                    .edge(**edge_id)
                    .map(|edge| !excluded.contains(&edge.destination()))
                    .unwrap_or(false)
            })
            .copied()
            .collect();

        let mut best: Option<(EdgeId, f64)> = None;
        for edge_id in candidates {
            let bid = self.evaluate_edge(edge_id)?;
            // The program engine stores NaN results as -inf, so bids
            // here are always comparable.
            let bid = if bid.is_nan() { f64::NEG_INFINITY } else { bid };
            best = match best {
                Some((_, best_bid)) if bid < best_bid => best,
                _ => Some((edge_id, bid)),
            };
        }

        best.map(|(edge_id, _)| edge_id)
            .ok_or(TangleError::NoReachableEdge)
    }

    /// Walk the graph from `root` until an action is reached.
    ///
    /// Returns the visited vertices in order, `root` first and the
    /// chosen action last. Each visited team joins the excluded set, so
    /// the walk terminates on any graph.
    pub fn execute_from_root(&mut self, root: VertexId) -> TangleResult<Vec<VertexId>> {
        let mut path = vec![root];
        let mut excluded: HashSet<VertexId> = HashSet::new();
        excluded.insert(root);

        let mut current = root;
        while self.graph.vertex(current)?.is_team() {
            let best_edge = self.evaluate_team(current, &excluded)?;
            let destination = self.graph.edge(best_edge)?.destination();
            path.push(destination);
            excluded.insert(destination);
            current = destination;
        }

        Ok(path)
    }
}
