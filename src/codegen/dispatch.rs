//! Pipeline assembly and the dispatch call.
//!
//! Emission is all-or-nothing: every artifact is built and cross-checked
//! before the dispatcher hears anything, and any failure leaves the loop
//! untransformed with no partial pipeline observable anywhere. Copy-in
//! of live-ins happens before the dispatch call and copy-out of
//! live-outs after it, both through the caller's exchange contract.

use crate::codegen::{PipelineProgram, StageHandle};
use crate::graph::component::LoopDag;
use crate::transform::environment::{Environment, EnvironmentBuilder, Liveness};
use crate::transform::queues::{Queue, QueueAllocator, WidthResolver};
use crate::transform::stages::StageSet;
use crate::utils::errors::{CodegenError, CodegenErrorKind, PipeResult, PipelineError};
use log::{debug, info};

/// The external runtime's entry point. The dispatcher creates one
/// execution context per stage, allocates queue buffers sized per the
/// width table, runs every stage concurrently, and returns only once all
/// stages complete. There is no cancellation: an aborted stage is a
/// fatal failure of the generated program.
pub trait StageDispatcher {
    /// Run the pipeline to completion. Blocking.
    fn dispatch(
        &mut self,
        environment: &mut Environment,
        queue_widths: &[u64],
        stage_table: &[StageHandle],
        stage_count: usize,
        queue_count: usize,
    ) -> Result<(), String>;
}

/// The caller's copy-in/copy-out contract around the parallel region.
pub trait EnvironmentExchange {
    /// Write every live-in value into its environment slot. Runs before
    /// the dispatch call.
    fn populate_live_ins(&mut self, env: &mut Environment) -> Result<(), String>;

    /// Read every live-out value back out of the environment. Runs
    /// after the dispatch call returns.
    fn propagate_live_outs(&mut self, env: &Environment) -> Result<(), String>;
}

/// A no-op exchange for loops with an empty environment, and for tests.
pub struct NoExchange;

impl EnvironmentExchange for NoExchange {
    fn populate_live_ins(&mut self, _env: &mut Environment) -> Result<(), String> {
        Ok(())
    }
    fn propagate_live_outs(&mut self, _env: &Environment) -> Result<(), String> {
        Ok(())
    }
}

/// Assembles the pipeline artifacts and emits the dispatch call.
pub struct PipelineCodeGenerator {
    max_queue_bits: u64,
}

impl PipelineCodeGenerator {
    /// Create a generator; `max_queue_bits` bounds supported queue
    /// widths.
    pub fn new(max_queue_bits: u64) -> Self {
        Self { max_queue_bits }
    }

    /// Build the stage table, queue-size table and environment from the
    /// staged loop. Nothing is dispatched; the result is a complete,
    /// internally consistent pipeline or an error.
    pub fn generate(
        &self,
        dag: &LoopDag,
        stages: &StageSet,
        liveness: &Liveness,
        widths: &dyn WidthResolver,
    ) -> PipeResult<PipelineProgram> {
        if stages.is_empty() {
            return Err(CodegenError {
                message: "no stages to dispatch".to_string(),
                kind: CodegenErrorKind::EmptyPipeline,
            }.into());
        }

        let environment = EnvironmentBuilder::build(liveness)?;
        let queues = QueueAllocator::new(self.max_queue_bits)
            .allocate(dag, stages, widths)?;
        let stage_table = self.build_stage_table(stages, &queues);
        let queue_widths: Vec<u64> = queues.iter().map(|q| q.bits).collect();

        let program = PipelineProgram { environment, queue_widths, stage_table, queues };
        self.check_tables(&program, stages)?;

        debug!(
            "pipeline assembled: {} stages, {} queues, {} env slots",
            program.stage_count(), program.queue_count(), program.environment.len()
        );
        Ok(program)
    }

    /// Run the full emission: copy-in, the single blocking dispatch
    /// call, copy-out. Arguments to the dispatcher are, in order: the
    /// environment, the queue-size table, the stage table, the stage
    /// count, and the queue count.
    pub fn emit(
        &self,
        program: &mut PipelineProgram,
        exchange: &mut dyn EnvironmentExchange,
        dispatcher: &mut dyn StageDispatcher,
    ) -> PipeResult<()> {
        exchange.populate_live_ins(&mut program.environment)
            .map_err(PipelineError::Dispatch)?;

        info!(
            "dispatching pipeline: {} stages, {} queues",
            program.stage_count(), program.queue_count()
        );
        let (stage_count, queue_count) = (program.stage_count(), program.queue_count());
        dispatcher.dispatch(
            &mut program.environment,
            &program.queue_widths,
            &program.stage_table,
            stage_count,
            queue_count,
        ).map_err(PipelineError::Dispatch)?;

        exchange.propagate_live_outs(&program.environment)
            .map_err(PipelineError::Dispatch)?;
        Ok(())
    }

    fn build_stage_table(&self, stages: &StageSet, queues: &[Queue]) -> Vec<StageHandle> {
        stages.iter().map(|stage| {
            let produces = queues.iter()
                .filter(|q| q.from == stage.id)
                .map(|q| q.id)
                .collect();
            let consumes = queues.iter()
                .filter(|q| q.to == stage.id)
                .map(|q| q.id)
                .collect();
            StageHandle {
                stage: stage.id,
                owned: stage.owned.clone(),
                cloned: stage.cloned.iter().copied().collect(),
                produces,
                consumes,
            }
        }).collect()
    }

    fn check_tables(&self, program: &PipelineProgram, stages: &StageSet) -> Result<(), CodegenError> {
        if program.stage_table.len() != stages.len() {
            return Err(CodegenError {
                message: format!(
                    "stage table has {} entries for {} stages",
                    program.stage_table.len(), stages.len()
                ),
                kind: CodegenErrorKind::StageTableMismatch,
            });
        }
        if program.queue_widths.len() != program.queues.len() {
            return Err(CodegenError {
                message: format!(
                    "queue-size table has {} entries for {} queues",
                    program.queue_widths.len(), program.queues.len()
                ),
                kind: CodegenErrorKind::QueueTableMismatch,
            });
        }
        // Entry i of the stage table must stand for stage i.
        for (i, handle) in program.stage_table.iter().enumerate() {
            if handle.stage.index() != i {
                return Err(CodegenError {
                    message: format!(
                        "stage table entry {} holds {}", i, handle.stage
                    ),
                    kind: CodegenErrorKind::StageTableMismatch,
                });
            }
        }
        Ok(())
    }
}
