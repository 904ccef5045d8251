//! Stage construction from a partitioned component set.
//!
//! One stage per partition subset, created in depth order. Every
//! component of a subset is owned by that subset's stage; the reverse
//! component→stage index is kept for downstream passes. The builder
//! cross-checks its own postconditions and reports any mismatch as an
//! internal-consistency failure, since that indicates a defect in the
//! upstream partition rather than a property of the input loop.

use crate::graph::component::{ComponentId, LoopDag};
use crate::partition::Partition;
use crate::utils::errors::{StageError, StageErrorKind};
use serde::{Serialize, Deserialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identifier of a pipeline stage: its index in partition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StageId(pub u32);

impl StageId {
    pub fn index(&self) -> usize { self.0 as usize }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage{}", self.0)
    }
}

/// One unit of concurrent execution.
#[derive(Debug, Clone)]
pub struct Stage {
    /// The stage's identifier (= its partition subset index)
    pub id: StageId,
    /// Components this stage owns, in subset order. Owned sets are
    /// pairwise disjoint across stages and cover the component set.
    pub owned: Vec<ComponentId>,
    /// Components duplicated into this stage instead of communicated.
    /// Unconstrained in overlap: a component may be cloned into many
    /// stages.
    pub cloned: BTreeSet<ComponentId>,
}

impl Stage {
    fn new(id: StageId, owned: Vec<ComponentId>) -> Self {
        Self { id, owned, cloned: BTreeSet::new() }
    }

    /// Whether the stage owns the component.
    pub fn owns(&self, c: ComponentId) -> bool {
        self.owned.contains(&c)
    }

    /// Whether the component executes in this stage at all, as owner
    /// or as a clone.
    pub fn executes(&self, c: ComponentId) -> bool {
        self.owns(c) || self.cloned.contains(&c)
    }
}

/// Component→stage reverse index, queried by downstream passes needing
/// per-component placement.
#[derive(Debug, Clone)]
pub struct StageAssignment {
    stage_of: Vec<Option<StageId>>,
}

impl StageAssignment {
    fn with_capacity(n: usize) -> Self {
        Self { stage_of: vec![None; n] }
    }

    /// The stage owning the component.
    pub fn stage_of(&self, c: ComponentId) -> Option<StageId> {
        self.stage_of.get(c.index()).copied().flatten()
    }
}

/// The stages of one loop, in partition order, plus the reverse index.
#[derive(Debug, Clone)]
pub struct StageSet {
    /// Stages in partition order
    pub stages: Vec<Stage>,
    /// Component→stage reverse index
    pub assignment: StageAssignment,
}

impl StageSet {
    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether there are no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Iterate over stages in partition order.
    pub fn iter(&self) -> impl Iterator<Item = &Stage> {
        self.stages.iter()
    }
}

/// Builds stages from a validated partition.
pub struct StageBuilder;

impl StageBuilder {
    /// Turn the depth-ordered partition into stages, recording component
    /// ownership. Postconditions: exactly one stage per subset, and
    /// every component of the loop owned by exactly one stage.
    pub fn build(dag: &LoopDag, partition: &Partition) -> Result<StageSet, StageError> {
        let mut stages = Vec::with_capacity(partition.len());
        let mut assignment = StageAssignment::with_capacity(dag.component_count());

        for (i, subset) in partition.iter() {
            let id = StageId(i as u32);
            for &c in subset {
                let slot = assignment.stage_of.get_mut(c.index())
                    .ok_or_else(|| StageError {
                        message: format!("partition names unknown component {}", c),
                        kind: StageErrorKind::UnknownComponent,
                    })?;
                if let Some(prev) = *slot {
                    return Err(StageError {
                        message: format!(
                            "component {} assigned to {} and {}", c, prev, id
                        ),
                        kind: StageErrorKind::DoubleAssigned,
                    });
                }
                *slot = Some(id);
            }
            stages.push(Stage::new(id, subset.to_vec()));
        }

        if stages.len() != partition.len() {
            return Err(StageError {
                message: format!(
                    "built {} stages for {} partition subsets",
                    stages.len(), partition.len()
                ),
                kind: StageErrorKind::CountMismatch,
            });
        }

        for c in dag.component_ids() {
            if assignment.stage_of(c).is_none() {
                return Err(StageError {
                    message: format!("component {} owned by no stage", c),
                    kind: StageErrorKind::Unassigned,
                });
            }
        }

        Ok(StageSet { stages, assignment })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::dg::{EdgeAttrs, ValueId};

    fn chain(n: usize) -> LoopDag {
        let edges: Vec<_> = (1..n)
            .map(|i| (
                ComponentId(i as u32 - 1),
                ComponentId(i as u32),
                EdgeAttrs::flow(ValueId(i as u32 - 1)),
            ))
            .collect();
        LoopDag::from_component_edges(n, &edges)
    }

    fn ids(v: &[u32]) -> Vec<ComponentId> {
        v.iter().map(|&i| ComponentId(i)).collect()
    }

    #[test]
    fn test_one_stage_per_subset() {
        let dag = chain(4);
        let partition = Partition::new(vec![ids(&[0, 1]), ids(&[2]), ids(&[3])]);
        let set = StageBuilder::build(&dag, &partition).unwrap();

        assert_eq!(set.len(), 3);
        assert_eq!(set.stages[0].owned, ids(&[0, 1]));
        assert_eq!(set.stages[1].owned, ids(&[2]));
        assert!(set.stages.iter().all(|s| s.cloned.is_empty()));
    }

    #[test]
    fn test_reverse_index() {
        let dag = chain(4);
        let partition = Partition::new(vec![ids(&[0, 1]), ids(&[2]), ids(&[3])]);
        let set = StageBuilder::build(&dag, &partition).unwrap();

        assert_eq!(set.assignment.stage_of(ComponentId(0)), Some(StageId(0)));
        assert_eq!(set.assignment.stage_of(ComponentId(1)), Some(StageId(0)));
        assert_eq!(set.assignment.stage_of(ComponentId(2)), Some(StageId(1)));
        assert_eq!(set.assignment.stage_of(ComponentId(3)), Some(StageId(2)));
    }

    #[test]
    fn test_owned_sets_cover_and_are_disjoint() {
        let dag = chain(5);
        let partition = Partition::new(vec![ids(&[0]), ids(&[1, 2]), ids(&[3, 4])]);
        let set = StageBuilder::build(&dag, &partition).unwrap();

        let mut seen = std::collections::BTreeSet::new();
        for stage in set.iter() {
            for &c in &stage.owned {
                assert!(seen.insert(c), "component {} owned twice", c);
            }
        }
        assert_eq!(seen.len(), dag.component_count());
    }

    #[test]
    fn test_unassigned_component_rejected() {
        let dag = chain(3);
        let partition = Partition::new(vec![ids(&[0]), ids(&[1])]);
        let err = StageBuilder::build(&dag, &partition).unwrap_err();
        assert_eq!(err.kind, StageErrorKind::Unassigned);
    }

    #[test]
    fn test_double_assignment_rejected() {
        let dag = chain(3);
        let partition = Partition::new(vec![ids(&[0, 1]), ids(&[1, 2])]);
        let err = StageBuilder::build(&dag, &partition).unwrap_err();
        assert_eq!(err.kind, StageErrorKind::DoubleAssigned);
    }
}
