//! Externally supplied component partitions.
//!
//! The partitioning heuristic runs upstream; this crate consumes its
//! result: an ordered sequence of disjoint component subsets, one per
//! future pipeline stage, ordered by depth in the component DAG. The
//! partition is validated before anything is built from it: a broken
//! partition is a defect in the partitioner, and the transformation
//! refuses to run past one.

use crate::graph::component::{ComponentId, LoopDag};
use crate::utils::errors::{PartitionError, PartitionErrorKind};
use serde::{Serialize, Deserialize};
use std::collections::HashMap;

/// An ordered sequence of disjoint component subsets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partition {
    subsets: Vec<Vec<ComponentId>>,
}

impl Partition {
    /// Create a partition from depth-ordered subsets.
    pub fn new(subsets: Vec<Vec<ComponentId>>) -> Self {
        Self { subsets }
    }

    /// Number of subsets (= number of pipeline stages).
    pub fn len(&self) -> usize {
        self.subsets.len()
    }

    /// Whether the partition has no subsets.
    pub fn is_empty(&self) -> bool {
        self.subsets.is_empty()
    }

    /// The subsets, in depth order.
    pub fn subsets(&self) -> &[Vec<ComponentId>] {
        &self.subsets
    }

    /// Iterate over (subset index, subset) pairs in depth order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[ComponentId])> {
        self.subsets.iter().enumerate().map(|(i, s)| (i, s.as_slice()))
    }

    /// Validate the partition against the loop's component graph.
    ///
    /// Checks the full contract: no empty partition, no empty subset,
    /// every component of the graph in exactly one subset, no unknown
    /// components, and subset order consistent with the component DAG
    /// (a producer never sits in a later subset than its consumer).
    pub fn validate(&self, dag: &LoopDag) -> Result<(), PartitionError> {
        if self.subsets.is_empty() {
            return Err(PartitionError {
                message: "partition has no subsets; loop not pipelinable".to_string(),
                kind: PartitionErrorKind::Empty,
            });
        }

        let mut subset_of: HashMap<ComponentId, usize> = HashMap::new();
        for (i, subset) in self.subsets.iter().enumerate() {
            if subset.is_empty() {
                return Err(PartitionError {
                    message: format!("subset {} is empty", i),
                    kind: PartitionErrorKind::EmptySubset,
                });
            }
            for &c in subset {
                if !dag.contains(c) {
                    return Err(PartitionError {
                        message: format!("subset {} names unknown component {}", i, c),
                        kind: PartitionErrorKind::UnknownComponent,
                    });
                }
                if let Some(prev) = subset_of.insert(c, i) {
                    return Err(PartitionError {
                        message: format!(
                            "component {} assigned to subsets {} and {}", c, prev, i
                        ),
                        kind: PartitionErrorKind::DuplicateComponent,
                    });
                }
            }
        }

        for c in dag.component_ids() {
            if !subset_of.contains_key(&c) {
                return Err(PartitionError {
                    message: format!("component {} appears in no subset", c),
                    kind: PartitionErrorKind::MissingComponent,
                });
            }
        }

        // A dependence edge must never point from a later subset into an
        // earlier one; equal subsets are fine (the dependence stays
        // inside one stage).
        for edge in dag.graph.edges() {
            let src = subset_of[&dag.component_at(edge.src)];
            let dst = subset_of[&dag.component_at(edge.dst)];
            if src > dst {
                return Err(PartitionError {
                    message: format!(
                        "dependence {} -> {} runs from subset {} back to subset {}",
                        dag.component_at(edge.src), dag.component_at(edge.dst), src, dst
                    ),
                    kind: PartitionErrorKind::OrderViolation,
                });
            }
        }

        Ok(())
    }
}
