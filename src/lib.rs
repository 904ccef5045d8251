//! # LoopPipe - Decoupled Software Pipelining Framework
//!
//! The automatic-parallelization core of a loop-transformation compiler:
//! it converts a sequential loop's instruction-level dependence graph
//! into concurrently executable pipeline stages and generates the
//! dispatch contract an external runtime uses to run them in parallel.
//!
//! ## Architecture
//!
//! ```text
//! graph + partition → StageBuilder → ClonablePropagation
//!                   → (EnvironmentBuilder | QueueAllocator)
//!                   → PipelineCodeGenerator → one dispatch call
//! ```
//!
//! The dependence graph, its component (SCC) decomposition and the
//! depth-ordered partition are computed upstream; the runtime scheduler
//! that actually executes the stages lives downstream behind the
//! [`codegen::StageDispatcher`] trait. Everything in between is this
//! crate: stage construction, clonable-producer duplication,
//! shared-environment and queue allocation, and the all-or-nothing
//! emission of the stage and queue-size tables.
//!
//! ## Example
//!
//! ```rust,ignore
//! use looppipe::prelude::*;
//!
//! let dag = LoopDag::derive(&instr_graph, &components);
//! let partition = Partition::new(subsets);
//! let transform = PipelineTransform::new(PipelineConfig::default());
//! let outcome = transform.apply(
//!     &dag, &partition, &clonability, &widths, &liveness,
//!     &mut exchange, &mut dispatcher,
//! )?;
//! println!("{}", outcome.summary);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod graph;
pub mod partition;
pub mod transform;
pub mod codegen;
pub mod utils;

// Re-export commonly used types
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::graph::{
        Component, ComponentId, DepGraph, DepKind, EdgeAttrs, EdgeId,
        Instr, LoopDag, NodeId, ValueId,
    };
    pub use crate::partition::Partition;
    pub use crate::transform::{
        Clonability, ClonablePropagation, Environment, EnvironmentBuilder,
        Liveness, PipelineOutcome, PipelineSummary, PipelineTransform,
        Queue, QueueAllocator, QueueId, Stage, StageAssignment,
        StageBuilder, StageId, StageSet, WidthResolver,
    };
    pub use crate::codegen::{
        EnvironmentExchange, PipelineCodeGenerator, PipelineProgram,
        StageDispatcher, StageHandle,
    };
    pub use crate::utils::errors::*;
    pub use crate::PipelineConfig;
}

use crate::codegen::dispatch::{EnvironmentExchange, StageDispatcher};
use crate::graph::component::LoopDag;
use crate::partition::Partition;
use crate::transform::clonable::Clonability;
use crate::transform::environment::Liveness;
use crate::transform::queues::WidthResolver;
use crate::transform::{PipelineOutcome, PipelineTransform};
use crate::utils::errors::PipeResult;

/// Configuration for the pipelining transformation.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum supported queue bit-width; wider values reject the
    /// transformation
    pub max_queue_bits: u64,
    /// Duplicate clonable producers into consuming stages instead of
    /// communicating their values
    pub propagate_clonables: bool,
    /// Verbosity level (0-3)
    pub verbosity: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_queue_bits: 64,
            propagate_clonables: true,
            verbosity: 1,
        }
    }
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Plan a pipeline for one loop with default configuration, without
/// dispatching it.
pub fn plan_loop(
    dag: &LoopDag,
    partition: &Partition,
    clonability: &dyn Clonability,
    widths: &dyn WidthResolver,
    liveness: &Liveness,
) -> PipeResult<PipelineOutcome> {
    PipelineTransform::new(PipelineConfig::default())
        .plan(dag, partition, clonability, widths, liveness)
}

/// Pipeline one loop with default configuration: plan, copy live-ins
/// in, dispatch, copy live-outs back out.
pub fn pipeline_loop(
    dag: &LoopDag,
    partition: &Partition,
    clonability: &dyn Clonability,
    widths: &dyn WidthResolver,
    liveness: &Liveness,
    exchange: &mut dyn EnvironmentExchange,
    dispatcher: &mut dyn StageDispatcher,
) -> PipeResult<PipelineOutcome> {
    PipelineTransform::new(PipelineConfig::default())
        .apply(dag, partition, clonability, widths, liveness, exchange, dispatcher)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_queue_bits, 64);
        assert!(config.propagate_clonables);
    }
}
