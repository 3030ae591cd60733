//! Graph-level mutation operators and root population.
//!
//! Teams are mutated by deleting, duplicating and rewiring outgoing
//! edges; every program cloned for mutation is collected into a work
//! list whose behaviours are then mutated, possibly in parallel,
//! against the archive.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rayon::prelude::*;

use crate::archive::{Archive, BEHAVIOR_TOLERANCE};
use crate::config::TrainingParameters;
use crate::data::DataHandler;
use crate::error::{TangleError, TangleResult};
use crate::mutator::program::{init_random_program, mutate_program};
use crate::mutator::Rng;
use crate::program::{Program, ProgramExecutionEngine, ProgramHandle};
use crate::tpg::{EdgeId, TpgGraph, Vertex, VertexId};

/// Bound on the archive-uniqueness mutation loop.
///
/// Nothing guarantees that a behaviour absent from the archive is
/// reachable by single-step mutations; the loop accepts the last
/// mutation once the bound is hit.
const MAX_BEHAVIOR_MUTATIONS: usize = 500;

/// Build a fresh random TPG into `graph`.
///
/// Creates one team and one action per entry of `action_ids` plus
/// `2 * nb_actions` randomly initialized programs, each permanently
/// routed to action `i % nb_actions`. A deterministic backbone first
/// connects every team to two distinct actions through two distinct
/// programs, using each program exactly once; random extra edges then
/// grow teams up to `max_init_outgoing_edges`, preferring the least
/// used programs and never repeating an action (hence a program) on a
/// team.
pub fn init_random_tpg(
    graph: &mut TpgGraph,
    params: &TrainingParameters,
    rng: &mut Rng,
    action_ids: &[u64],
) -> TangleResult<()> {
    let nb_actions = action_ids.len();
    if nb_actions < 2 {
        return Err(TangleError::ParameterMisconfiguration(format!(
            "a TPG needs at least 2 actions, got {nb_actions}"
        )));
    }
    let max_init = params.tpg.max_init_outgoing_edges;
    if max_init < 2 || max_init > nb_actions {
        return Err(TangleError::ParameterMisconfiguration(format!(
            "max_init_outgoing_edges must be in [2, {nb_actions}], got {max_init}"
        )));
    }

    graph.clear();
    let env = Arc::clone(graph.environment());

    let actions: Vec<VertexId> = action_ids
        .iter()
        .map(|id| graph.add_new_action(*id))
        .collect();
    let teams: Vec<VertexId> = (0..nb_actions).map(|_| graph.add_new_team()).collect();

    // Program i bids for action i % nb_actions, for good.
    let mut programs: Vec<(ProgramHandle, usize)> = Vec::with_capacity(2 * nb_actions);
    for i in 0..2 * nb_actions {
        let mut program = Program::new(Arc::clone(&env));
        init_random_program(&mut program, params, rng)?;
        programs.push((program.into_handle(), i % nb_actions));
    }

    let mut usage = vec![0usize; programs.len()];
    let mut team_actions: Vec<HashSet<usize>> = vec![HashSet::new(); teams.len()];

    // Backbone: team t gets programs 2t and 2t+1, reaching actions t
    // and t+1 mod nb_actions. Every program is used exactly once.
    for (i, (program, action_idx)) in programs.iter().enumerate() {
        let team_idx = i / 2;
        graph.add_new_edge(teams[team_idx], actions[*action_idx], Arc::clone(program))?;
        usage[i] += 1;
        team_actions[team_idx].insert(*action_idx);
    }

    // Random growth towards max_init_outgoing_edges.
    for (team_idx, team) in teams.iter().enumerate() {
        let target = rng.get_u64(2, max_init as u64) as usize;
        while graph.vertex(*team)?.outgoing().len() < target {
            let mut candidates: Vec<usize> = (0..programs.len())
                .filter(|i| !team_actions[team_idx].contains(&programs[*i].1))
                .collect();
            if candidates.is_empty() {
                break;
            }
            let min_usage = candidates
                .iter()
                .map(|i| usage[*i])
                .min()
                .unwrap_or_default();
            candidates.retain(|i| usage[*i] == min_usage);
            let pick = candidates[rng.get_index(candidates.len())];

            let (program, action_idx) = &programs[pick];
            graph.add_new_edge(*team, actions[*action_idx], Arc::clone(program))?;
            usage[pick] += 1;
            team_actions[team_idx].insert(*action_idx);
        }
    }

    Ok(())
}

/// Remove a uniformly chosen outgoing edge of `team`.
pub fn remove_random_edge(
    graph: &mut TpgGraph,
    team: VertexId,
    rng: &mut Rng,
) -> TangleResult<()> {
    let outgoing = graph.vertex(team)?.outgoing().to_vec();
    if outgoing.is_empty() {
        return Err(TangleError::InvalidGraphOperation(
            "cannot remove an edge from a team without outgoing edges".to_string(),
        ));
    }
    let edge = outgoing[rng.get_index(outgoing.len())];
    graph.remove_edge(edge)
}

/// Give `team` a new outgoing edge duplicated from a pre-existing one.
///
/// The duplicate keeps the original's destination and shares its
/// program; only the source changes. Candidates already outgoing from
/// `team` (or gone from the graph) are excluded. Returns `false` when
/// no candidate remains.
pub fn add_random_edge(
    graph: &mut TpgGraph,
    team: VertexId,
    pre_existing_edges: &[EdgeId],
    rng: &mut Rng,
) -> TangleResult<bool> {
    let candidates: Vec<EdgeId> = pre_existing_edges
        .iter()
        .filter(|id| {
            graph
                .edge(**id)
                .map(|edge| edge.source() != team)
                .unwrap_or(false)
        })
        .copied()
        .collect();
    if candidates.is_empty() {
        return Ok(false);
    }

    let template = candidates[rng.get_index(candidates.len())];
    let (destination, program) = {
        let edge = graph.edge(template)?;
        (edge.destination(), Arc::clone(edge.program()))
    };
    graph.add_new_edge(team, destination, program)?;
    Ok(true)
}

/// Rewire an edge to a randomly chosen candidate destination.
///
/// An action is picked with probability `p_edge_destination_is_action`,
/// a team otherwise; an empty bucket falls back to the other one. The
/// new destination may equal the current one.
pub fn mutate_edge_destination(
    graph: &mut TpgGraph,
    edge: EdgeId,
    team_candidates: &[VertexId],
    action_candidates: &[VertexId],
    params: &TrainingParameters,
    rng: &mut Rng,
) -> TangleResult<()> {
    let prefer_action =
        rng.get_double(0.0, 1.0) < params.tpg.p_edge_destination_is_action;
    let bucket = match (prefer_action, action_candidates.is_empty(), team_candidates.is_empty()) {
        (true, false, _) | (false, _, true) => action_candidates,
        (false, _, false) | (true, true, false) => team_candidates,
        (true, true, true) => {
            return Err(TangleError::ParameterMisconfiguration(
                "no destination candidate for edge mutation".to_string(),
            ))
        }
    };
    if bucket.is_empty() {
        return Err(TangleError::ParameterMisconfiguration(
            "no destination candidate for edge mutation".to_string(),
        ));
    }
    let destination = bucket[rng.get_index(bucket.len())];
    graph.set_edge_destination(edge, destination)
}

/// Prepare the mutation of one outgoing edge.
///
/// The edge's program is cloned into a fresh shared handle (the
/// original stays with whichever other edges hold it), the clone is
/// queued in `new_programs` for a later behaviour pass, and the edge
/// destination changes with probability `p_edge_destination_change`.
pub fn mutate_outgoing_edge(
    graph: &mut TpgGraph,
    edge: EdgeId,
    team_candidates: &[VertexId],
    action_candidates: &[VertexId],
    new_programs: &mut Vec<ProgramHandle>,
    params: &TrainingParameters,
    rng: &mut Rng,
) -> TangleResult<()> {
    let clone = {
        let edge_ref = graph.edge(edge)?;
        let guard = edge_ref.program().read();
        guard.clone()
    }
    .into_handle();
    graph.set_edge_program(edge, Arc::clone(&clone))?;
    new_programs.push(clone);

    if rng.get_double(0.0, 1.0) < params.tpg.p_edge_destination_change {
        mutate_edge_destination(graph, edge, team_candidates, action_candidates, params, rng)?;
    }
    Ok(())
}

/// Distinct destinations currently reachable from `team`.
fn distinct_destinations(graph: &TpgGraph, team: VertexId) -> TangleResult<usize> {
    let vertex = graph.vertex(team)?;
    let mut destinations: HashSet<VertexId> = HashSet::new();
    for edge_id in vertex.outgoing() {
        destinations.insert(graph.edge(*edge_id)?.destination());
    }
    Ok(destinations.len())
}

/// Mutate a team's outgoing edge set.
///
/// Successively: stochastically delete edges (never below two edges or
/// two distinct destinations), stochastically duplicate a pre-existing
/// edge onto the team, then queue each surviving edge's program for
/// behaviour mutation with probability `p_program_mutation`.
pub fn mutate_tpg_team(
    graph: &mut TpgGraph,
    team: VertexId,
    pre_existing_teams: &[VertexId],
    pre_existing_actions: &[VertexId],
    pre_existing_edges: &[EdgeId],
    new_programs: &mut Vec<ProgramHandle>,
    params: &TrainingParameters,
    rng: &mut Rng,
) -> TangleResult<()> {
    // 1. Edge deletion.
    while rng.get_double(0.0, 1.0) < params.tpg.p_edge_deletion {
        if graph.vertex(team)?.outgoing().len() <= 2
            || distinct_destinations(graph, team)? <= 2
        {
            break;
        }
        remove_random_edge(graph, team, rng)?;
    }

    // 2. Edge addition.
    if rng.get_double(0.0, 1.0) < params.tpg.p_edge_addition
        && graph.vertex(team)?.outgoing().len() < params.tpg.max_outgoing_edges
    {
        add_random_edge(graph, team, pre_existing_edges, rng)?;
    }

    // 3. Program mutation on the surviving edges.
    let outgoing = graph.vertex(team)?.outgoing().to_vec();
    for edge in outgoing {
        if rng.get_double(0.0, 1.0) < params.tpg.p_program_mutation {
            mutate_outgoing_edge(
                graph,
                edge,
                pre_existing_teams,
                pre_existing_actions,
                new_programs,
                params,
                rng,
            )?;
        }
    }
    Ok(())
}

/// Run `program` against every archived data snapshot and collect its
/// bids keyed by combined hash.
fn bids_on_archive(program: &ProgramHandle, archive: &Archive) -> TangleResult<HashMap<u64, f64>> {
    let mut results = HashMap::with_capacity(archive.nb_data_handlers());
    let guard = program.read();
    for (hash, handlers) in archive.data_handlers() {
        let refs: Vec<&DataHandler> = handlers.iter().collect();
        let mut engine = ProgramExecutionEngine::new(&guard, &refs)?;
        results.insert(*hash, engine.execute());
    }
    Ok(results)
}

/// Mutate a program until its bids differ from every archived
/// behaviour.
///
/// Each round applies [`mutate_program`] until it reports an actual
/// mutation. When `force_program_behavior_change_on_mutation` is off,
/// one mutation suffices; otherwise the program is re-bid on all
/// archived snapshots and mutation continues until
/// [`Archive::are_program_results_unique`] accepts it (or the safety
/// bound is hit).
pub fn mutate_program_behavior_against_archive(
    program: &ProgramHandle,
    params: &TrainingParameters,
    archive: &Archive,
    rng: &mut Rng,
) -> TangleResult<()> {
    for _ in 0..MAX_BEHAVIOR_MUTATIONS {
        let mutated = {
            let mut guard = program.write();
            mutate_program(&mut guard, params, rng)?
        };
        if !mutated {
            continue;
        }
        if !params.tpg.force_program_behavior_change_on_mutation {
            break;
        }
        let bids = bids_on_archive(program, archive)?;
        if archive.are_program_results_unique(&bids, BEHAVIOR_TOLERANCE) {
            break;
        }
    }
    Ok(())
}

/// Mutate the behaviours of a batch of freshly cloned programs.
///
/// Every program receives a sub-generator deterministically derived
/// from `rng` in list order, so the outcome is identical whether the
/// batch runs sequentially (`max_threads <= 1`) or on a thread pool.
/// Workers read the archive and write only their own program.
pub fn mutate_new_program_behaviors(
    max_threads: usize,
    programs: &[ProgramHandle],
    rng: &mut Rng,
    params: &TrainingParameters,
    archive: &Archive,
) -> TangleResult<()> {
    let generators: Vec<Rng> = programs.iter().map(|_| rng.sub_rng()).collect();

    if max_threads <= 1 {
        for (program, mut generator) in programs.iter().zip(generators) {
            mutate_program_behavior_against_archive(program, params, archive, &mut generator)?;
        }
        return Ok(());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(max_threads)
        .build()
        .map_err(|e| TangleError::Configuration(e.to_string()))?;
    pool.install(|| {
        programs
            .par_iter()
            .zip(generators.into_par_iter())
            .try_for_each(|(program, mut generator)| {
                mutate_program_behavior_against_archive(program, params, archive, &mut generator)
            })
    })
}

/// Regenerate root teams until the graph carries `nb_roots` roots.
///
/// A graph without any root team is first rebuilt from scratch. Each
/// missing root is a mutated clone of a uniformly chosen existing root
/// team (root actions are never templates); candidate destinations and
/// duplicate-edge templates are the vertices and edges that predate
/// this population pass. All programs cloned along the way get their
/// behaviour mutated at the end, with up to `max_threads` workers.
pub fn populate_tpg(
    graph: &mut TpgGraph,
    archive: &Archive,
    params: &TrainingParameters,
    rng: &mut Rng,
    action_ids: &[u64],
    max_threads: usize,
) -> TangleResult<()> {
    let has_root_team = graph
        .root_ids()
        .iter()
        .any(|id| graph.vertex(*id).map(Vertex::is_team).unwrap_or(false));
    if !has_root_team {
        init_random_tpg(graph, params, rng, action_ids)?;
    }

    let pre_existing_teams = graph.team_ids();
    let pre_existing_actions = graph.action_ids();
    let pre_existing_edges = graph.edge_ids().to_vec();

    let mut new_programs: Vec<ProgramHandle> = Vec::new();
    loop {
        let roots = graph.root_ids();
        if roots.len() >= params.tpg.nb_roots {
            break;
        }
        let root_teams: Vec<VertexId> = roots
            .iter()
            .filter(|id| graph.vertex(**id).map(Vertex::is_team).unwrap_or(false))
            .copied()
            .collect();
        let template = root_teams[rng.get_index(root_teams.len())];
        let clone = graph.clone_vertex(template)?;
        mutate_tpg_team(
            graph,
            clone,
            &pre_existing_teams,
            &pre_existing_actions,
            &pre_existing_edges,
            &mut new_programs,
            params,
            rng,
        )?;
    }

    tracing::debug!(
        new_programs = new_programs.len(),
        nb_roots = graph.root_ids().len(),
        "population pass complete"
    );
    mutate_new_program_behaviors(max_threads, &new_programs, rng, params, archive)
}
