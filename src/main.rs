//! LoopPipe Command Line Interface
//!
//! Usage:
//!   looppipe [OPTIONS] <input-file>
//!   looppipe --help
//!
//! Examples:
//!   looppipe loop.json                  # Plan and print the pipeline
//!   looppipe --emit=dot loop.json       # Staged component DAG as DOT
//!   looppipe --dispatch -vv loop.json   # Dry-run the dispatch sequence
//!
//! The input file describes one loop: its instruction-level dependence
//! graph, the component decomposition, the stage partition, clonability,
//! liveness and value bit-widths.

use clap::{Parser, ValueEnum};
use looppipe::codegen::dispatch::NoExchange;
use looppipe::prelude::*;
use looppipe::utils::{dot_staged_dag, print_plan};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::fs;
use anyhow::{Context, Result, bail};
use log::{info, debug};
use serde::Deserialize;

/// LoopPipe - Decoupled Software Pipelining Framework
#[derive(Parser, Debug)]
#[command(name = "looppipe")]
#[command(author = "LoopPipe Contributors")]
#[command(version)]
#[command(about = "Plan pipeline stages for a partitioned loop dependence graph", long_about = None)]
struct Cli {
    /// Input file describing the loop (JSON)
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Output file (defaults to stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// What to emit
    #[arg(long, default_value = "plan")]
    emit: EmitKind,

    /// Maximum supported queue bit-width
    #[arg(long, default_value_t = 64)]
    max_queue_bits: u64,

    /// Disable clonable-producer propagation
    #[arg(long)]
    no_cloning: bool,

    /// Dry-run the copy-in / dispatch / copy-out sequence with a
    /// printing dispatcher
    #[arg(long)]
    dispatch: bool,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress warnings)
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EmitKind {
    /// Text listing of stages, queues and environment
    Plan,
    /// Staged component DAG in DOT format
    Dot,
    /// One-line-per-stage summary
    Summary,
    /// Machine-readable summary (JSON)
    Json,
}

/// JSON description of one loop.
#[derive(Debug, Deserialize)]
struct LoopSpec {
    /// Instructions, indexed by position
    instructions: Vec<InstrSpec>,
    /// Instruction-level dependence edges
    edges: Vec<EdgeSpec>,
    /// Component decomposition: member instruction indices per component
    components: Vec<Vec<u32>>,
    /// Depth-ordered stage partition: component indices per subset
    partition: Vec<Vec<u32>>,
    /// Components safe to duplicate
    #[serde(default)]
    clonable: Vec<u32>,
    /// Values live into the loop region
    #[serde(default)]
    live_ins: Vec<u32>,
    /// Values live out of the loop region
    #[serde(default)]
    live_outs: Vec<u32>,
    /// Bit-width per value
    #[serde(default)]
    widths: HashMap<u32, u64>,
}

#[derive(Debug, Deserialize)]
struct InstrSpec {
    name: String,
    #[serde(default)]
    defines: Option<u32>,
    #[serde(default)]
    effectful: bool,
}

#[derive(Debug, Deserialize)]
struct EdgeSpec {
    src: u32,
    dst: u32,
    kind: DepKind,
    #[serde(default)]
    value: Option<u32>,
}

/// Dry-run dispatcher: prints what the runtime would be asked to do.
struct PrintDispatcher;

impl StageDispatcher for PrintDispatcher {
    fn dispatch(
        &mut self,
        environment: &mut Environment,
        queue_widths: &[u64],
        stage_table: &[StageHandle],
        stage_count: usize,
        queue_count: usize,
    ) -> Result<(), String> {
        println!(
            "dispatch(env[{}], widths[{}], stages[{}], {}, {})",
            environment.len(), queue_widths.len(), stage_table.len(),
            stage_count, queue_count
        );
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        log::LevelFilter::Error
    } else {
        match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    info!("LoopPipe v{}", looppipe::VERSION);
    debug!("Input file: {:?}", cli.input);

    let source = fs::read_to_string(&cli.input)
        .with_context(|| format!("Failed to read input file: {:?}", cli.input))?;
    let spec: LoopSpec = serde_json::from_str(&source)
        .with_context(|| "Failed to parse loop description")?;

    let (dag, partition, clonable, widths, liveness) = build_inputs(&spec)?;

    let config = PipelineConfig {
        max_queue_bits: cli.max_queue_bits,
        propagate_clonables: !cli.no_cloning,
        verbosity: cli.verbose,
    };
    debug!("Pipeline config: {:?}", config);

    let transform = PipelineTransform::new(config);
    let outcome = if cli.dispatch {
        transform.apply(
            &dag, &partition, &clonable, &widths, &liveness,
            &mut NoExchange, &mut PrintDispatcher,
        )
    } else {
        transform.plan(&dag, &partition, &clonable, &widths, &liveness)
    };

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) if e.is_internal() => {
            bail!("internal consistency failure (defect in partition input): {}", e)
        }
        Err(e) => bail!("loop not pipelinable: {}", e),
    };

    let rendered = match cli.emit {
        EmitKind::Plan => print_plan(&outcome.program),
        EmitKind::Dot => dot_staged_dag(&dag, &outcome.assignment),
        EmitKind::Summary => outcome.summary.to_string(),
        EmitKind::Json => serde_json::to_string_pretty(&outcome.summary)? + "\n",
    };
    write_output(&cli.output, &rendered)?;

    Ok(())
}

fn build_inputs(
    spec: &LoopSpec,
) -> Result<(LoopDag, Partition, BTreeSet<ComponentId>, HashMap<ValueId, u64>, Liveness)> {
    let mut graph: DepGraph<Instr> = DepGraph::new();
    let mut nodes = Vec::with_capacity(spec.instructions.len());
    for instr in &spec.instructions {
        nodes.push(graph.add_node(Instr {
            name: instr.name.clone(),
            defines: instr.defines.map(ValueId),
            effectful: instr.effectful,
        }));
    }

    for edge in &spec.edges {
        let src = *nodes.get(edge.src as usize)
            .with_context(|| format!("edge source {} out of range", edge.src))?;
        let dst = *nodes.get(edge.dst as usize)
            .with_context(|| format!("edge destination {} out of range", edge.dst))?;
        graph.add_edge(src, dst, EdgeAttrs {
            kind: edge.kind,
            value: edge.value.map(ValueId),
        });
    }

    let membership: Vec<Vec<NodeId>> = spec.components.iter()
        .map(|members| {
            members.iter()
                .map(|&i| {
                    nodes.get(i as usize).copied()
                        .with_context(|| format!("component member {} out of range", i))
                })
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<Vec<_>>>()?;
    let dag = LoopDag::derive(&graph, &membership);

    let partition = Partition::new(
        spec.partition.iter()
            .map(|subset| subset.iter().map(|&c| ComponentId(c)).collect())
            .collect(),
    );
    let clonable: BTreeSet<ComponentId> =
        spec.clonable.iter().map(|&c| ComponentId(c)).collect();
    let widths: HashMap<ValueId, u64> =
        spec.widths.iter().map(|(&v, &w)| (ValueId(v), w)).collect();
    let liveness = Liveness {
        live_ins: spec.live_ins.iter().map(|&v| ValueId(v)).collect(),
        live_outs: spec.live_outs.iter().map(|&v| ValueId(v)).collect(),
    };

    Ok((dag, partition, clonable, widths, liveness))
}

fn write_output(path: &Option<PathBuf>, content: &str) -> Result<()> {
    match path {
        Some(path) => fs::write(path, content)
            .with_context(|| format!("Failed to write output file: {:?}", path))?,
        None => print!("{}", content),
    }
    Ok(())
}
