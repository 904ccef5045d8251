//! The pipelining transformation.
//!
//! `PipelineTransform` drives the phases exactly once per loop, one way:
//! partition validation → stage construction → clonable propagation →
//! environment and queue allocation → artifact emission and the dispatch
//! call. All per-loop state (stages, assignment map, environment,
//! queues) is owned by the transformation's result and torn down with
//! it; nothing is global.

pub mod stages;
pub mod clonable;
pub mod environment;
pub mod queues;

pub use stages::{Stage, StageAssignment, StageBuilder, StageId, StageSet};
pub use clonable::{Clonability, ClonablePropagation};
pub use environment::{EnvSlot, Environment, EnvironmentBuilder, Liveness, SlotKind};
pub use queues::{Queue, QueueAllocator, QueueId, WidthResolver};

use crate::codegen::{PipelineCodeGenerator, PipelineProgram};
use crate::codegen::dispatch::{EnvironmentExchange, StageDispatcher};
use crate::graph::component::LoopDag;
use crate::utils::errors::PipeResult;
use crate::partition::Partition;
use crate::PipelineConfig;
use log::{debug, info};
use serde::{Serialize, Deserialize};

/// Per-stage line of a [`PipelineSummary`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSummary {
    /// The stage
    pub stage: StageId,
    /// Number of owned components
    pub owned: usize,
    /// Number of cloned components
    pub cloned: usize,
    /// Queues produced into
    pub produces: usize,
    /// Queues consumed from
    pub consumes: usize,
}

/// Summary of one pipelining transformation, for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Number of stages (= partition subsets)
    pub num_stages: usize,
    /// Number of inter-stage queues
    pub num_queues: usize,
    /// Number of environment slots
    pub num_env_slots: usize,
    /// Total components cloned across all stages (with multiplicity)
    pub num_cloned: usize,
    /// Per-stage breakdown, in partition order
    pub stages: Vec<StageSummary>,
}

impl std::fmt::Display for PipelineSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Pipeline Summary:")?;
        writeln!(f, "  Stages: {}", self.num_stages)?;
        writeln!(f, "  Queues: {}", self.num_queues)?;
        writeln!(f, "  Environment slots: {}", self.num_env_slots)?;
        writeln!(f, "  Cloned components: {}", self.num_cloned)?;
        for s in &self.stages {
            writeln!(
                f,
                "    {}: {} owned, {} cloned, pushes {}, pops {}",
                s.stage, s.owned, s.cloned, s.produces, s.consumes
            )?;
        }
        Ok(())
    }
}

/// The result of pipelining one loop.
#[derive(Debug)]
pub struct PipelineOutcome {
    /// The emitted pipeline
    pub program: PipelineProgram,
    /// Component→stage placement, for downstream passes
    pub assignment: StageAssignment,
    /// Diagnostic summary
    pub summary: PipelineSummary,
}

/// The pipelining transformation for one loop.
pub struct PipelineTransform {
    config: PipelineConfig,
}

impl PipelineTransform {
    /// Create a transformation with the given configuration.
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Build the pipeline artifacts without dispatching. All
    /// invariant checks run; on any error nothing is emitted and the
    /// loop is left untransformed.
    pub fn plan(
        &self,
        dag: &LoopDag,
        partition: &Partition,
        clonability: &dyn Clonability,
        widths: &dyn WidthResolver,
        liveness: &Liveness,
    ) -> PipeResult<PipelineOutcome> {
        partition.validate(dag)?;
        debug!("partition valid: {} subsets over {} components",
            partition.len(), dag.component_count());

        let mut stages = StageBuilder::build(dag, partition)?;
        if self.config.propagate_clonables {
            ClonablePropagation::run(dag, &mut stages, clonability);
        }

        let generator = PipelineCodeGenerator::new(self.config.max_queue_bits);
        let program = generator.generate(dag, &stages, liveness, widths)?;
        let summary = summarize(&program);
        info!(
            "loop pipelined into {} stages with {} queues",
            summary.num_stages, summary.num_queues
        );

        Ok(PipelineOutcome {
            program,
            assignment: stages.assignment,
            summary,
        })
    }

    /// Plan the pipeline and, if every artifact checks out, run the
    /// copy-in / dispatch / copy-out sequence. The dispatcher blocks
    /// until all stages complete.
    pub fn apply(
        &self,
        dag: &LoopDag,
        partition: &Partition,
        clonability: &dyn Clonability,
        widths: &dyn WidthResolver,
        liveness: &Liveness,
        exchange: &mut dyn EnvironmentExchange,
        dispatcher: &mut dyn StageDispatcher,
    ) -> PipeResult<PipelineOutcome> {
        let mut outcome = self.plan(dag, partition, clonability, widths, liveness)?;
        let generator = PipelineCodeGenerator::new(self.config.max_queue_bits);
        generator.emit(&mut outcome.program, exchange, dispatcher)?;
        Ok(outcome)
    }
}

fn summarize(program: &PipelineProgram) -> PipelineSummary {
    let stages: Vec<StageSummary> = program.stage_table.iter().map(|h| StageSummary {
        stage: h.stage,
        owned: h.owned.len(),
        cloned: h.cloned.len(),
        produces: h.produces.len(),
        consumes: h.consumes.len(),
    }).collect();

    PipelineSummary {
        num_stages: program.stage_count(),
        num_queues: program.queue_count(),
        num_env_slots: program.environment.len(),
        num_cloned: stages.iter().map(|s| s.cloned).sum(),
        stages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::component::ComponentId;
    use crate::graph::dg::{EdgeAttrs, ValueId};
    use std::collections::HashMap;

    fn ids(v: &[u32]) -> Vec<ComponentId> {
        v.iter().map(|&i| ComponentId(i)).collect()
    }

    fn widths() -> HashMap<ValueId, u64> {
        (0..4).map(|i| (ValueId(i), 32)).collect()
    }

    #[test]
    fn test_plan_reports_summary() {
        let dag = LoopDag::from_component_edges(3, &[
            (ComponentId(0), ComponentId(1), EdgeAttrs::flow(ValueId(0))),
            (ComponentId(1), ComponentId(2), EdgeAttrs::flow(ValueId(1))),
        ]);
        let partition = Partition::new(vec![ids(&[0]), ids(&[1]), ids(&[2])]);
        let transform = PipelineTransform::new(PipelineConfig::default());

        let outcome = transform
            .plan(&dag, &partition, &(|_: ComponentId| false), &widths(), &Liveness::default())
            .unwrap();

        assert_eq!(outcome.summary.num_stages, 3);
        assert_eq!(outcome.summary.num_queues, 2);
        assert_eq!(outcome.assignment.stage_of(ComponentId(2)), Some(StageId(2)));
        let text = outcome.summary.to_string();
        assert!(text.contains("Stages: 3"));
    }

    #[test]
    fn test_clone_propagation_togglable() {
        let dag = LoopDag::from_component_edges(2, &[
            (ComponentId(0), ComponentId(1), EdgeAttrs::flow(ValueId(0))),
        ]);
        let partition = Partition::new(vec![ids(&[0]), ids(&[1])]);
        let clonable = |_c: ComponentId| true;

        let on = PipelineTransform::new(PipelineConfig::default())
            .plan(&dag, &partition, &clonable, &widths(), &Liveness::default())
            .unwrap();
        assert_eq!(on.summary.num_queues, 0);
        assert_eq!(on.summary.num_cloned, 1);

        let config = PipelineConfig { propagate_clonables: false, ..Default::default() };
        let off = PipelineTransform::new(config)
            .plan(&dag, &partition, &clonable, &widths(), &Liveness::default())
            .unwrap();
        assert_eq!(off.summary.num_queues, 1);
        assert_eq!(off.summary.num_cloned, 0);
    }

    #[test]
    fn test_invalid_partition_emits_nothing() {
        let dag = LoopDag::from_component_edges(2, &[
            (ComponentId(0), ComponentId(1), EdgeAttrs::flow(ValueId(0))),
        ]);
        // C1 missing from every subset.
        let partition = Partition::new(vec![ids(&[0])]);
        let transform = PipelineTransform::new(PipelineConfig::default());
        let err = transform
            .plan(&dag, &partition, &(|_: ComponentId| false), &widths(), &Liveness::default())
            .unwrap_err();
        assert!(err.is_internal());
    }
}
