//! Pipeline artifact emission.
//!
//! The final phase packages the staged loop into the exact contract the
//! external runtime consumes: a stage table in partition order, a
//! queue-size table in discovery order, and the shared environment,
//! handed over in one blocking dispatch call. Stages are typed units of
//! work rather than raw routine addresses; the index alignments and the
//! argument order of the dispatch call are unchanged ABI.

pub mod dispatch;

pub use dispatch::{EnvironmentExchange, PipelineCodeGenerator, StageDispatcher};

use crate::graph::component::ComponentId;
use crate::transform::environment::Environment;
use crate::transform::queues::{Queue, QueueId};
use crate::transform::stages::StageId;
use serde::{Serialize, Deserialize};

/// One entry of the stage table: everything the dispatcher needs to run
/// one stage as a unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageHandle {
    /// The stage this entry stands for; entry index == stage index
    pub stage: StageId,
    /// Components the stage owns, in subset order
    pub owned: Vec<ComponentId>,
    /// Components duplicated into the stage
    pub cloned: Vec<ComponentId>,
    /// Queues this stage produces into, in discovery order
    pub produces: Vec<QueueId>,
    /// Queues this stage consumes from, in discovery order
    pub consumes: Vec<QueueId>,
}

/// The complete, cross-checked pipeline handed to the dispatcher.
#[derive(Debug, Clone)]
pub struct PipelineProgram {
    /// Shared live-value storage
    pub environment: Environment,
    /// Bit-width of queue i, index-aligned with the runtime's queue
    /// instances
    pub queue_widths: Vec<u64>,
    /// Stage table, index-aligned with partition order
    pub stage_table: Vec<StageHandle>,
    /// The allocated queues, for inspection; `queue_widths[i]` is
    /// `queues[i].bits`
    pub queues: Vec<Queue>,
}

impl PipelineProgram {
    /// Number of stages.
    pub fn stage_count(&self) -> usize {
        self.stage_table.len()
    }

    /// Number of queues.
    pub fn queue_count(&self) -> usize {
        self.queue_widths.len()
    }
}
