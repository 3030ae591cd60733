//! Graph exchange in DOT form.
//!
//! Graphs are written as renderable `digraph`s that double as the
//! serialization format:
//!
//! ```text
//! T<id>                     team vertex
//! A<id>  label="<actionId>" action vertex
//! P<id>  [...] //c0|c1|...| program vertex, constants in the comment
//! I<id>  label="..."        program payload, one encoded line per
//!                           `&#92;n`-separated chunk:
//!                           instr|dest&src0|loc0#src1|loc1...
//! T<a> -> P<p> -> T<b>      edge through its program
//! T<a> -> P<p> -> A<b>
//! ```
//!
//! A program referenced by several edges is written once and shared
//! again on import. Import rebuilds a graph over a provided
//! environment; everything a graph owns (topology, program lines,
//! constants) survives the round-trip.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use regex::Regex;

use crate::environment::Environment;
use crate::error::{TangleError, TangleResult};
use crate::program::{Program, ProgramHandle};
use crate::tpg::{TpgGraph, VertexId};

/// Literal separator between encoded lines inside a label.
const LINE_SEPARATOR: &str = "&#92;n";

/// Render `graph` as a DOT string.
pub fn export_to_string(graph: &TpgGraph) -> String {
    let mut out = String::new();
    out.push_str("digraph{\n");
    out.push_str("\tgraph[pad = \"0.212, 0.055\" bgcolor = lightgray]\n");
    out.push_str("\tnode[shape=circle style = filled label = \"\"]\n");

    // Dot-local numbering, stable across exports of the same graph.
    let mut team_numbers: HashMap<VertexId, usize> = HashMap::new();
    let mut action_numbers: HashMap<VertexId, usize> = HashMap::new();
    for id in graph.vertex_ids() {
        let Ok(vertex) = graph.vertex(*id) else {
            continue;
        };
        if vertex.is_team() {
            let number = team_numbers.len();
            team_numbers.insert(*id, number);
            let _ = writeln!(out, "\t\tT{number} [fillcolor=\"#1199bb\"]");
        } else {
            let number = action_numbers.len();
            action_numbers.insert(*id, number);
            let _ = writeln!(
                out,
                "\t\tA{number} [fillcolor=\"#ff3366\" shape=box margin=0.03 width=0 height=0 label=\"{}\"]",
                vertex.action_id().unwrap_or_default()
            );
        }
    }

    // One P/I pair per distinct program.
    let mut program_numbers: HashMap<*const parking_lot::RwLock<Program>, usize> =
        HashMap::new();
    for edge_id in graph.edge_ids() {
        let Ok(edge) = graph.edge(*edge_id) else {
            continue;
        };
        let key = Arc::as_ptr(edge.program());
        if program_numbers.contains_key(&key) {
            continue;
        }
        let number = program_numbers.len();
        program_numbers.insert(key, number);

        let program = edge.program().read();
        let constants = serialize_constants(&program);
        let _ = writeln!(
            out,
            "\t\tP{number} [fillcolor=\"#cccccc\" shape=point]{constants}"
        );
        let _ = writeln!(out, "\t\tP{number} -> I{number}[style=invis]");
        let _ = writeln!(
            out,
            "\t\tI{number} [shape=box style=invis label=\"{}\"]",
            serialize_lines(&program)
        );
    }

    for edge_id in graph.edge_ids() {
        let Ok(edge) = graph.edge(*edge_id) else {
            continue;
        };
        let source = team_numbers.get(&edge.source()).copied().unwrap_or_default();
        let program = program_numbers
            .get(&Arc::as_ptr(edge.program()))
            .copied()
            .unwrap_or_default();
        let destination = match team_numbers.get(&edge.destination()) {
            Some(number) => format!("T{number}"),
            None => format!(
                "A{}",
                action_numbers
                    .get(&edge.destination())
                    .copied()
                    .unwrap_or_default()
            ),
        };
        let _ = writeln!(out, "\t\tT{source} -> P{program} -> {destination}");
    }

    // Rank roots together for rendering.
    out.push_str("\t\t{ rank= same ");
    for root in graph.root_ids() {
        if let Some(number) = team_numbers.get(&root) {
            let _ = write!(out, "T{number} ");
        }
    }
    out.push_str("}\n}\n");
    out
}

/// Write `graph` as DOT into `path`.
pub fn export_to_file<P: AsRef<Path>>(graph: &TpgGraph, path: P) -> TangleResult<()> {
    std::fs::write(path.as_ref(), export_to_string(graph)).map_err(|e| {
        TangleError::Configuration(format!("{}: {e}", path.as_ref().display()))
    })
}

fn serialize_constants(program: &Program) -> String {
    let slots = program.constants().slots();
    if slots.is_empty() {
        return String::new();
    }
    let mut out = String::from(" //");
    for value in slots {
        let _ = write!(out, "{value}|");
    }
    out
}

fn serialize_lines(program: &Program) -> String {
    let mut out = String::new();
    for index in 0..program.nb_lines() {
        let Ok(line) = program.line(index) else {
            continue;
        };
        let _ = write!(out, "{}|{}&", line.instruction_index(), line.destination_index());
        let operands: Vec<String> = line
            .operands()
            .iter()
            .map(|(source, location)| format!("{source}|{location}"))
            .collect();
        out.push_str(&operands.join("#"));
        out.push_str(LINE_SEPARATOR);
    }
    out
}

/// Patterns of the vertex, payload and edge statements.
struct DotPatterns {
    team: Regex,
    action: Regex,
    program: Regex,
    instruction: Regex,
    link: Regex,
    edge: Regex,
}

impl DotPatterns {
    fn new() -> TangleResult<Self> {
        let build = |pattern: &str| {
            Regex::new(pattern).map_err(|e| TangleError::Configuration(e.to_string()))
        };
        Ok(DotPatterns {
            team: build(r"^\s*T(\d+) \[")?,
            action: build(r#"^\s*A(\d+) \[.*label="(\d+)"\]"#)?,
            program: build(r"^\s*P(\d+) \[[^\]]*\](?: //(.*))?$")?,
            instruction: build(r#"^\s*I(\d+) \[.*label="(.*)"\]"#)?,
            link: build(r"^\s*P(\d+) -> I(\d+)")?,
            edge: build(r"^\s*T(\d+) -> P(\d+) -> ([TA])(\d+)")?,
        })
    }
}

fn parse_number(text: &str) -> TangleResult<usize> {
    text.trim()
        .parse::<usize>()
        .map_err(|e| TangleError::Configuration(format!("malformed number '{text}': {e}")))
}

/// Rebuild a graph from its DOT form over `env`.
///
/// The environment must match the one the graph was exported from
/// (same instruction count, register file, sources); the checked line
/// setters reject anything out of bounds.
pub fn import_from_string(source: &str, env: Arc<Environment>) -> TangleResult<TpgGraph> {
    let patterns = DotPatterns::new()?;
    let mut graph = TpgGraph::new(Arc::clone(&env));

    let mut teams: HashMap<usize, VertexId> = HashMap::new();
    let mut actions: HashMap<usize, VertexId> = HashMap::new();
    let mut programs: HashMap<usize, ProgramHandle> = HashMap::new();
    let mut instruction_of_program: HashMap<usize, usize> = HashMap::new();

    // First pass: declarations.
    for line in source.lines() {
        if let Some(captures) = patterns.edge.captures(line) {
            // Edge statements also match the link pattern; handled in
            // the second pass.
            let _ = captures;
            continue;
        }
        if let Some(captures) = patterns.team.captures(line) {
            let number = parse_number(&captures[1])?;
            teams.entry(number).or_insert_with(|| graph.add_new_team());
        } else if let Some(captures) = patterns.action.captures(line) {
            let number = parse_number(&captures[1])?;
            let action_id = parse_number(&captures[2])? as u64;
            actions
                .entry(number)
                .or_insert_with(|| graph.add_new_action(action_id));
        } else if let Some(captures) = patterns.program.captures(line) {
            let number = parse_number(&captures[1])?;
            let mut program = Program::new(Arc::clone(&env));
            if let Some(constants) = captures.get(2) {
                parse_constants(constants.as_str(), &mut program)?;
            }
            programs.insert(number, program.into_handle());
        } else if let Some(captures) = patterns.link.captures(line) {
            let program_number = parse_number(&captures[1])?;
            let instruction_number = parse_number(&captures[2])?;
            instruction_of_program.insert(instruction_number, program_number);
        }
    }

    // Second pass: program payloads and edges (they may reference any
    // declaration).
    for line in source.lines() {
        if let Some(captures) = patterns.edge.captures(line) {
            let team_number = parse_number(&captures[1])?;
            let program_number = parse_number(&captures[2])?;
            let destination_number = parse_number(&captures[4])?;

            let source_vertex = *teams.get(&team_number).ok_or_else(|| {
                TangleError::Configuration(format!("edge references unknown team T{team_number}"))
            })?;
            let destination = match &captures[3] {
                "T" => *teams.get(&destination_number).ok_or_else(|| {
                    TangleError::Configuration(format!(
                        "edge references unknown team T{destination_number}"
                    ))
                })?,
                _ => *actions.get(&destination_number).ok_or_else(|| {
                    TangleError::Configuration(format!(
                        "edge references unknown action A{destination_number}"
                    ))
                })?,
            };
            let program = programs.get(&program_number).ok_or_else(|| {
                TangleError::Configuration(format!(
                    "edge references unknown program P{program_number}"
                ))
            })?;
            graph.add_new_edge(source_vertex, destination, Arc::clone(program))?;
        } else if let Some(captures) = patterns.instruction.captures(line) {
            if patterns.link.is_match(line) {
                continue;
            }
            let instruction_number = parse_number(&captures[1])?;
            let Some(program_number) = instruction_of_program.get(&instruction_number) else {
                continue;
            };
            let Some(program) = programs.get(program_number) else {
                continue;
            };
            parse_lines(&captures[2], &env, &mut program.write())?;
        }
    }

    for program in programs.values() {
        program.write().identify_introns();
    }

    Ok(graph)
}

/// Read a graph from a DOT file.
pub fn import_from_file<P: AsRef<Path>>(
    path: P,
    env: Arc<Environment>,
) -> TangleResult<TpgGraph> {
    let source = std::fs::read_to_string(path.as_ref()).map_err(|e| {
        TangleError::Configuration(format!("{}: {e}", path.as_ref().display()))
    })?;
    import_from_string(&source, env)
}

fn parse_constants(text: &str, program: &mut Program) -> TangleResult<()> {
    for (index, chunk) in text.split('|').enumerate() {
        let chunk = chunk.trim();
        if chunk.is_empty() {
            continue;
        }
        let value: i32 = chunk.parse().map_err(|e| {
            TangleError::Configuration(format!("malformed constant '{chunk}': {e}"))
        })?;
        program.set_constant_at(index, value)?;
    }
    Ok(())
}

fn parse_lines(label: &str, env: &Environment, program: &mut Program) -> TangleResult<()> {
    for chunk in label.split(LINE_SEPARATOR) {
        if chunk.is_empty() {
            continue;
        }
        let (instruction, rest) = chunk.split_once('|').ok_or_else(|| {
            TangleError::Configuration(format!("malformed line chunk '{chunk}'"))
        })?;
        let (destination, operands) = rest.split_once('&').ok_or_else(|| {
            TangleError::Configuration(format!("malformed line chunk '{chunk}'"))
        })?;

        let line = program.add_new_line();
        line.set_instruction_index(env, parse_number(instruction)?)?;
        line.set_destination_index(env, parse_number(destination)?)?;

        for (operand_idx, operand) in operands.split('#').enumerate() {
            let (source_index, location) = operand.split_once('|').ok_or_else(|| {
                TangleError::Configuration(format!("malformed operand '{operand}'"))
            })?;
            line.set_operand(
                env,
                operand_idx,
                parse_number(source_index)?,
                parse_number(location)?,
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainingParameters;
    use crate::data::{DataHandler, PrimitiveArray};
    use crate::instructions::{Add, Mult, Set};
    use crate::mutator::tpg::init_random_tpg;
    use crate::mutator::Rng;

    fn test_env(nb_constants: usize) -> Arc<Environment> {
        let mut set = Set::new();
        set.add(Arc::new(Add::<f64>::new()));
        set.add(Arc::new(Mult::<f64>::new()));
        let source = DataHandler::from(PrimitiveArray::<f64>::new(24));
        Arc::new(Environment::new(&set, &[&source], 8, nb_constants).unwrap())
    }

    fn random_graph(env: &Arc<Environment>, seed: u64) -> TpgGraph {
        let mut graph = TpgGraph::new(Arc::clone(env));
        let mut params = TrainingParameters::default();
        params.tpg.nb_actions = 4;
        params.tpg.max_init_outgoing_edges = 3;
        let mut rng = Rng::new(seed);
        init_random_tpg(&mut graph, &params, &mut rng, &[0, 1, 2, 3]).unwrap();
        graph
    }

    #[test]
    fn test_export_mentions_every_element() {
        let env = test_env(0);
        let graph = random_graph(&env, 0);
        let dot = export_to_string(&graph);

        assert!(dot.starts_with("digraph{"));
        for team in 0..4 {
            assert!(dot.contains(&format!("T{team} [")));
        }
        for action in 0..4 {
            assert!(dot.contains(&format!("A{action} [")));
        }
        assert!(dot.contains(LINE_SEPARATOR));
        assert!(dot.contains("{ rank= same "));
    }

    #[test]
    fn test_roundtrip_preserves_topology_and_programs() {
        let env = test_env(0);
        let graph = random_graph(&env, 3);
        let dot = export_to_string(&graph);

        let imported = import_from_string(&dot, Arc::clone(&env)).unwrap();
        assert_eq!(imported.nb_vertices(), graph.nb_vertices());
        assert_eq!(imported.nb_edges(), graph.nb_edges());
        assert_eq!(imported.team_ids().len(), graph.team_ids().len());
        assert_eq!(imported.action_ids().len(), graph.action_ids().len());
        assert_eq!(imported.root_ids().len(), graph.root_ids().len());

        // Edges pair up: same source/destination numbering and
        // behaviourally identical programs, in export order.
        for (original_id, imported_id) in
            graph.edge_ids().iter().zip(imported.edge_ids().iter())
        {
            let original = graph.edge(*original_id).unwrap();
            let copy = imported.edge(*imported_id).unwrap();
            assert_eq!(
                graph.vertex(original.destination()).unwrap().action_id(),
                imported.vertex(copy.destination()).unwrap().action_id()
            );
            assert!(original
                .program()
                .read()
                .has_identical_behavior(&copy.program().read()));
        }

        // Shared programs stay shared.
        let count_distinct = |g: &TpgGraph| {
            let mut seen: Vec<*const parking_lot::RwLock<Program>> = Vec::new();
            for id in g.edge_ids() {
                let ptr = Arc::as_ptr(g.edge(*id).unwrap().program());
                if !seen.contains(&ptr) {
                    seen.push(ptr);
                }
            }
            seen.len()
        };
        assert_eq!(count_distinct(&graph), count_distinct(&imported));

        // A second export is textually identical.
        assert_eq!(dot, export_to_string(&imported));
    }

    #[test]
    fn test_roundtrip_preserves_constants() {
        let env = test_env(3);
        let mut graph = TpgGraph::new(Arc::clone(&env));
        let team = graph.add_new_team();
        let action = graph.add_new_action(7);

        let mut program = Program::new(Arc::clone(&env));
        program.set_constant_at(0, -5).unwrap();
        program.set_constant_at(1, 12).unwrap();
        let line = program.add_new_line();
        line.set_instruction_index(&env, 1).unwrap();
        line.set_destination_index(&env, 0).unwrap();
        line.set_operand(&env, 0, 0, 3).unwrap();
        line.set_operand(&env, 1, 2, 9).unwrap();
        graph
            .add_new_edge(team, action, program.into_handle())
            .unwrap();

        let dot = export_to_string(&graph);
        assert!(dot.contains("//-5|12|0|"));

        let imported = import_from_string(&dot, Arc::clone(&env)).unwrap();
        let edge = imported.edge(imported.edge_ids()[0]).unwrap();
        let program = edge.program().read();
        assert_eq!(program.constant_at(0).unwrap(), -5);
        assert_eq!(program.constant_at(1).unwrap(), 12);
        assert_eq!(program.constant_at(2).unwrap(), 0);
        let line = program.line(0).unwrap();
        assert_eq!(line.instruction_index(), 1);
        assert_eq!(line.operands(), &[(0, 3), (2, 9)]);

        // The action id survives.
        assert_eq!(
            imported
                .vertex(edge.destination())
                .unwrap()
                .action_id(),
            Some(7)
        );
    }

    #[test]
    fn test_import_rejects_corrupt_payload() {
        let env = test_env(0);
        let dot = concat!(
            "digraph{\n",
            "\t\tT0 [fillcolor=\"#1199bb\"]\n",
            "\t\tA0 [fillcolor=\"#ff3366\" shape=box margin=0.03 width=0 height=0 label=\"0\"]\n",
            "\t\tP0 [fillcolor=\"#cccccc\" shape=point]\n",
            "\t\tP0 -> I0[style=invis]\n",
            "\t\tI0 [shape=box style=invis label=\"banana\"]\n",
            "\t\tT0 -> P0 -> A0\n",
            "}\n",
        );
        assert!(import_from_string(dot, env).is_err());
    }
}
