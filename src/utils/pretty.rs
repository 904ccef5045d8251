//! Human-readable rendering of pipeline plans.
//!
//! Plain-text listing for terminals and a DOT emitter for the staged
//! component graph (components colored per owning stage, queues as
//! labeled edges).

use crate::codegen::PipelineProgram;
use crate::graph::component::LoopDag;
use crate::transform::stages::StageAssignment;
use std::fmt::Write as _;

/// Render the plan as an indented text listing.
pub fn print_plan(program: &PipelineProgram) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "pipeline: {} stages, {} queues, {} env slots",
        program.stage_count(), program.queue_count(), program.environment.len());

    for handle in &program.stage_table {
        let _ = writeln!(out, "  {}:", handle.stage);
        let owned: Vec<String> = handle.owned.iter().map(|c| c.to_string()).collect();
        let _ = writeln!(out, "    owned:  [{}]", owned.join(", "));
        if !handle.cloned.is_empty() {
            let cloned: Vec<String> = handle.cloned.iter().map(|c| c.to_string()).collect();
            let _ = writeln!(out, "    cloned: [{}]", cloned.join(", "));
        }
        for &q in &handle.produces {
            let queue = &program.queues[q.index()];
            let _ = writeln!(out, "    push {} -> {} ({} bits)", q, queue.to, queue.bits);
        }
        for &q in &handle.consumes {
            let queue = &program.queues[q.index()];
            let _ = writeln!(out, "    pop  {} <- {} ({} bits)", q, queue.from, queue.bits);
        }
    }

    if !program.environment.is_empty() {
        let _ = writeln!(out, "  environment:");
        for (i, slot) in program.environment.slots().iter().enumerate() {
            let _ = writeln!(out, "    [{}] {} ({:?})", i, slot.value, slot.kind);
        }
    }
    out
}

/// Emit the staged component graph in DOT format. Each stage becomes a
/// cluster; dependence edges are labeled with their kind and carried
/// value.
pub fn dot_staged_dag(dag: &LoopDag, assignment: &StageAssignment) -> String {
    let mut out = String::from("digraph pipeline {\n  rankdir=TB;\n  node [shape=box];\n");

    let mut by_stage: Vec<Vec<String>> = Vec::new();
    for c in dag.component_ids() {
        if let Some(stage) = assignment.stage_of(c) {
            if by_stage.len() <= stage.index() {
                by_stage.resize(stage.index() + 1, Vec::new());
            }
            by_stage[stage.index()].push(format!("\"{}\";", c));
        }
    }
    for (i, members) in by_stage.iter().enumerate() {
        let _ = writeln!(out, "  subgraph cluster_{} {{", i);
        let _ = writeln!(out, "    label=\"stage{}\";", i);
        for m in members {
            let _ = writeln!(out, "    {}", m);
        }
        let _ = writeln!(out, "  }}");
    }

    for edge in dag.graph.edges() {
        let src = dag.component_at(edge.src);
        let dst = dag.component_at(edge.dst);
        let label = match edge.attrs.value {
            Some(v) => format!("{} {}", edge.attrs.kind.short_name(), v),
            None => edge.attrs.kind.short_name().to_string(),
        };
        let _ = writeln!(out, "  \"{}\" -> \"{}\" [label=\"{}\"];", src, dst, label);
    }

    out.push_str("}\n");
    out
}
