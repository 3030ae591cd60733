//! Graph arena: vertices, edges, and their ownership rules.
//!
//! Vertices and edges live in id-indexed maps with separate insertion
//! order lists, so iteration (roots, edge candidates, team evaluation)
//! is deterministic. Incoming/outgoing lists on vertices store edge
//! ids, never owning handles; every edit maintains both endpoint lists
//! symmetrically.

use std::collections::HashMap;
use std::sync::Arc;

use crate::environment::Environment;
use crate::error::{TangleError, TangleResult};
use crate::program::ProgramHandle;

/// Stable identifier of a vertex within its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(u64);

/// Stable identifier of an edge within its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(u64);

/// The two vertex variants of a TPG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexKind {
    /// Interior vertex with outgoing bidding edges
    Team,
    /// Leaf vertex naming an environment action
    Action {
        action_id: u64,
        /// Secondary discriminator used by multi-action environments
        action_class: Option<u64>,
    },
}

impl VertexKind {
    pub fn is_team(&self) -> bool {
        matches!(self, VertexKind::Team)
    }

    pub fn is_action(&self) -> bool {
        matches!(self, VertexKind::Action { .. })
    }
}

/// A vertex and its incident edge lists.
#[derive(Debug)]
pub struct Vertex {
    id: VertexId,
    kind: VertexKind,
    outgoing: Vec<EdgeId>,
    incoming: Vec<EdgeId>,
}

impl Vertex {
    pub fn id(&self) -> VertexId {
        self.id
    }

    pub fn kind(&self) -> VertexKind {
        self.kind
    }

    pub fn is_team(&self) -> bool {
        self.kind.is_team()
    }

    pub fn is_action(&self) -> bool {
        self.kind.is_action()
    }

    /// Action id when this vertex is an action.
    pub fn action_id(&self) -> Option<u64> {
        match self.kind {
            VertexKind::Action { action_id, .. } => Some(action_id),
            VertexKind::Team => None,
        }
    }

    /// Outgoing edges in insertion order (the evaluation order).
    pub fn outgoing(&self) -> &[EdgeId] {
        &self.outgoing
    }

    /// Incoming edges in insertion order.
    pub fn incoming(&self) -> &[EdgeId] {
        &self.incoming
    }

    /// A vertex with no incoming edge is a root.
    pub fn is_root(&self) -> bool {
        self.incoming.is_empty()
    }
}

/// A directed edge carrying its bidding program.
#[derive(Debug)]
pub struct Edge {
    id: EdgeId,
    source: VertexId,
    destination: VertexId,
    program: ProgramHandle,
}

impl Edge {
    pub fn id(&self) -> EdgeId {
        self.id
    }

    pub fn source(&self) -> VertexId {
        self.source
    }

    pub fn destination(&self) -> VertexId {
        self.destination
    }

    /// The shared program whose bid ranks this edge.
    pub fn program(&self) -> &ProgramHandle {
        &self.program
    }
}

/// Exclusive owner of the vertices and edges of one TPG.
#[derive(Debug)]
pub struct TpgGraph {
    environment: Arc<Environment>,
    vertices: HashMap<VertexId, Vertex>,
    vertex_order: Vec<VertexId>,
    edges: HashMap<EdgeId, Edge>,
    edge_order: Vec<EdgeId>,
    next_vertex_id: u64,
    next_edge_id: u64,
}

impl TpgGraph {
    /// An empty graph over `env`.
    pub fn new(env: Arc<Environment>) -> Self {
        TpgGraph {
            environment: env,
            vertices: HashMap::new(),
            vertex_order: Vec::new(),
            edges: HashMap::new(),
            edge_order: Vec::new(),
            next_vertex_id: 0,
            next_edge_id: 0,
        }
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    fn insert_vertex(&mut self, kind: VertexKind) -> VertexId {
        let id = VertexId(self.next_vertex_id);
        self.next_vertex_id += 1;
        self.vertices.insert(
            id,
            Vertex {
                id,
                kind,
                outgoing: Vec::new(),
                incoming: Vec::new(),
            },
        );
        self.vertex_order.push(id);
        id
    }

    /// Add a new team vertex.
    pub fn add_new_team(&mut self) -> VertexId {
        self.insert_vertex(VertexKind::Team)
    }

    /// Add a new action vertex for `action_id`.
    pub fn add_new_action(&mut self, action_id: u64) -> VertexId {
        self.insert_vertex(VertexKind::Action {
            action_id,
            action_class: None,
        })
    }

    /// Add a new action vertex with a class discriminator.
    pub fn add_new_action_with_class(&mut self, action_id: u64, action_class: u64) -> VertexId {
        self.insert_vertex(VertexKind::Action {
            action_id,
            action_class: Some(action_class),
        })
    }

    /// The vertex behind `id`; fails when it is not in the graph.
    pub fn vertex(&self, id: VertexId) -> TangleResult<&Vertex> {
        self.vertices.get(&id).ok_or_else(|| {
            TangleError::InvalidGraphOperation(format!("vertex {id:?} is not in the graph"))
        })
    }

    /// The edge behind `id`; fails when it is not in the graph.
    pub fn edge(&self, id: EdgeId) -> TangleResult<&Edge> {
        self.edges.get(&id).ok_or_else(|| {
            TangleError::InvalidGraphOperation(format!("edge {id:?} is not in the graph"))
        })
    }

    pub fn nb_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn nb_edges(&self) -> usize {
        self.edges.len()
    }

    /// Vertex ids in insertion order.
    pub fn vertex_ids(&self) -> &[VertexId] {
        &self.vertex_order
    }

    /// Edge ids in insertion order.
    pub fn edge_ids(&self) -> &[EdgeId] {
        &self.edge_order
    }

    /// Team ids in insertion order.
    pub fn team_ids(&self) -> Vec<VertexId> {
        self.vertex_order
            .iter()
            .filter(|id| self.vertices[*id].is_team())
            .copied()
            .collect()
    }

    /// Action ids in insertion order.
    pub fn action_ids(&self) -> Vec<VertexId> {
        self.vertex_order
            .iter()
            .filter(|id| self.vertices[*id].is_action())
            .copied()
            .collect()
    }

    /// Roots (no incoming edge) in insertion order.
    pub fn root_ids(&self) -> Vec<VertexId> {
        self.vertex_order
            .iter()
            .filter(|id| self.vertices[*id].is_root())
            .copied()
            .collect()
    }

    /// Add an edge from `source` to `destination` sharing `program`.
    ///
    /// Fails when either endpoint is missing or when `source` is an
    /// action (actions accept incoming edges only).
    pub fn add_new_edge(
        &mut self,
        source: VertexId,
        destination: VertexId,
        program: ProgramHandle,
    ) -> TangleResult<EdgeId> {
        if self.vertex(source)?.is_action() {
            return Err(TangleError::InvalidGraphOperation(
                "an action cannot have outgoing edges".to_string(),
            ));
        }
        self.vertex(destination)?;

        let id = EdgeId(self.next_edge_id);
        self.next_edge_id += 1;
        self.edges.insert(
            id,
            Edge {
                id,
                source,
                destination,
                program,
            },
        );
        self.edge_order.push(id);
        if let Some(vertex) = self.vertices.get_mut(&source) {
            vertex.outgoing.push(id);
        }
        if let Some(vertex) = self.vertices.get_mut(&destination) {
            vertex.incoming.push(id);
        }
        Ok(id)
    }

    /// Remove an edge, releasing its program share.
    pub fn remove_edge(&mut self, id: EdgeId) -> TangleResult<()> {
        let edge = self.edges.remove(&id).ok_or_else(|| {
            TangleError::InvalidGraphOperation(format!("edge {id:?} is not in the graph"))
        })?;
        self.edge_order.retain(|e| *e != id);
        if let Some(vertex) = self.vertices.get_mut(&edge.source) {
            vertex.outgoing.retain(|e| *e != id);
        }
        if let Some(vertex) = self.vertices.get_mut(&edge.destination) {
            vertex.incoming.retain(|e| *e != id);
        }
        Ok(())
    }

    /// Remove a vertex and every incident edge.
    pub fn remove_vertex(&mut self, id: VertexId) -> TangleResult<()> {
        let incident: Vec<EdgeId> = {
            let vertex = self.vertex(id)?;
            vertex
                .outgoing
                .iter()
                .chain(vertex.incoming.iter())
                .copied()
                .collect()
        };
        for edge in incident {
            // A self-loop appears in both lists; the second removal is
            // a no-op.
            let _ = self.remove_edge(edge);
        }
        self.vertices.remove(&id);
        self.vertex_order.retain(|v| *v != id);
        Ok(())
    }

    /// Duplicate a vertex and its outgoing edges.
    ///
    /// The clone has the same kind (and action id), and one new edge
    /// per outgoing edge of the original, pointing at the original
    /// destinations and sharing the original programs. Incoming edges
    /// are not duplicated, so the clone starts as a root.
    pub fn clone_vertex(&mut self, id: VertexId) -> TangleResult<VertexId> {
        let (kind, outgoing) = {
            let vertex = self.vertex(id)?;
            (vertex.kind, vertex.outgoing.clone())
        };
        let clone_id = self.insert_vertex(kind);
        for edge_id in outgoing {
            let (destination, program) = {
                let edge = self.edge(edge_id)?;
                (edge.destination, Arc::clone(edge.program()))
            };
            self.add_new_edge(clone_id, destination, program)?;
        }
        Ok(clone_id)
    }

    /// Rewire the source of an edge; the new source must be a team in
    /// the graph.
    pub fn set_edge_source(&mut self, id: EdgeId, new_source: VertexId) -> TangleResult<()> {
        if self.vertex(new_source)?.is_action() {
            return Err(TangleError::InvalidGraphOperation(
                "an action cannot have outgoing edges".to_string(),
            ));
        }
        let old_source = self.edge(id)?.source;
        if let Some(vertex) = self.vertices.get_mut(&old_source) {
            vertex.outgoing.retain(|e| *e != id);
        }
        if let Some(vertex) = self.vertices.get_mut(&new_source) {
            vertex.outgoing.push(id);
        }
        if let Some(edge) = self.edges.get_mut(&id) {
            edge.source = new_source;
        }
        Ok(())
    }

    /// Rewire the destination of an edge to any vertex in the graph.
    pub fn set_edge_destination(&mut self, id: EdgeId, new_destination: VertexId) -> TangleResult<()> {
        self.vertex(new_destination)?;
        let old_destination = self.edge(id)?.destination;
        if let Some(vertex) = self.vertices.get_mut(&old_destination) {
            vertex.incoming.retain(|e| *e != id);
        }
        if let Some(vertex) = self.vertices.get_mut(&new_destination) {
            vertex.incoming.push(id);
        }
        if let Some(edge) = self.edges.get_mut(&id) {
            edge.destination = new_destination;
        }
        Ok(())
    }

    /// Replace the program an edge bids with.
    pub fn set_edge_program(&mut self, id: EdgeId, program: ProgramHandle) -> TangleResult<()> {
        let edge = self.edges.get_mut(&id).ok_or_else(|| {
            TangleError::InvalidGraphOperation(format!("edge {id:?} is not in the graph"))
        })?;
        edge.program = program;
        Ok(())
    }

    /// Remove every vertex and edge.
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.vertex_order.clear();
        self.edges.clear();
        self.edge_order.clear();
    }
}
