//! Inter-stage communication queue allocation.
//!
//! Every true cross-stage dependence that survives clonable propagation
//! is backed by exactly one queue with FIFO, blocking producer/consumer
//! semantics at run time; that per-edge program order is what makes the
//! concurrent pipeline observe the sequential loop's semantics. A
//! dependence whose producer component was cloned into the consumer's
//! stage needs no queue: the consumer recomputes the value locally.
//!
//! Queue discovery order is part of the ABI contract with the runtime:
//! index i of the emitted size table must correspond to the i-th queue
//! instance the dispatcher materializes. The order here is fixed as
//! stages in partition order, owned components in subset order, incoming
//! edges in handle order.

use crate::graph::component::{ComponentId, LoopDag};
use crate::graph::dg::{DepKind, EdgeId, ValueId};
use crate::transform::stages::{StageId, StageSet};
use crate::utils::errors::{QueueError, QueueErrorKind};
use serde::{Serialize, Deserialize};
use std::fmt;

/// Identifier of a queue: its index in discovery order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QueueId(pub u32);

impl QueueId {
    pub fn index(&self) -> usize { self.0 as usize }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

/// One bounded FIFO channel backing one cross-stage dependence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Queue {
    /// The queue's identifier (= discovery index)
    pub id: QueueId,
    /// Producing stage
    pub from: StageId,
    /// Consuming stage
    pub to: StageId,
    /// The value carried, if the dependence carries one; a control
    /// dependence transports a synchronization token instead
    pub value: Option<ValueId>,
    /// Bit-width of the carried value (1 for tokens)
    pub bits: u64,
    /// The component-graph edge this queue backs
    pub edge: EdgeId,
}

/// Resolves a value to the bit-width of its type. Supplied by the
/// caller, which knows the loop's type system.
pub trait WidthResolver {
    /// The bit-width of the value's type, or `None` if unknown.
    fn bit_width(&self, value: ValueId) -> Option<u64>;
}

impl<F: Fn(ValueId) -> Option<u64>> WidthResolver for F {
    fn bit_width(&self, value: ValueId) -> Option<u64> {
        self(value)
    }
}

impl WidthResolver for std::collections::HashMap<ValueId, u64> {
    fn bit_width(&self, value: ValueId) -> Option<u64> {
        self.get(&value).copied()
    }
}

/// Bit-width of the synchronization token a value-less dependence
/// transports.
const TOKEN_BITS: u64 = 1;

/// Allocates one queue per surviving cross-stage dependence edge.
pub struct QueueAllocator {
    max_bits: u64,
}

impl QueueAllocator {
    /// Create an allocator with the given maximum supported queue width.
    pub fn new(max_bits: u64) -> Self {
        Self { max_bits }
    }

    /// Walk the staged component graph and allocate queues in discovery
    /// order. A width the resolver cannot produce, a zero width, or a
    /// width above the supported maximum rejects the transformation;
    /// nothing is ever truncated.
    pub fn allocate(
        &self,
        dag: &LoopDag,
        stages: &StageSet,
        widths: &dyn WidthResolver,
    ) -> Result<Vec<Queue>, QueueError> {
        let mut queues = Vec::new();

        for stage in stages.iter() {
            for &consumer in &stage.owned {
                let node = dag.node_of(consumer);
                for edge_id in dag.graph.incoming_edges(node) {
                    let edge = dag.graph.edge(edge_id);
                    let producer = dag.component_at(edge.src);

                    let from = match stages.assignment.stage_of(producer) {
                        Some(s) if s == stage.id => continue, // intra-stage
                        Some(s) => s,
                        None => continue, // unpartitioned producers cannot occur past validation
                    };

                    // A producer cloned into this stage is recomputed
                    // locally; the dependence needs no queue.
                    if stage.cloned.contains(&producer) {
                        continue;
                    }

                    let bits = self.queue_width(edge.attrs.kind, edge.attrs.value, widths)?;
                    queues.push(Queue {
                        id: QueueId(queues.len() as u32),
                        from,
                        to: stage.id,
                        value: edge.attrs.value,
                        bits,
                        edge: edge_id,
                    });
                }
            }
        }

        Ok(queues)
    }

    fn queue_width(
        &self,
        kind: DepKind,
        value: Option<ValueId>,
        widths: &dyn WidthResolver,
    ) -> Result<u64, QueueError> {
        let bits = match value {
            Some(v) => widths.bit_width(v).ok_or_else(|| QueueError {
                message: format!("no bit-width known for communicated value {}", v),
                kind: QueueErrorKind::UnresolvedWidth,
            })?,
            None if kind.carries_value() => {
                return Err(QueueError {
                    message: "flow dependence carries no value".to_string(),
                    kind: QueueErrorKind::MissingValue,
                });
            }
            None => TOKEN_BITS,
        };

        if bits == 0 {
            return Err(QueueError {
                message: "zero-width value cannot be communicated".to_string(),
                kind: QueueErrorKind::UnsupportedWidth,
            });
        }
        if bits > self.max_bits {
            return Err(QueueError {
                message: format!(
                    "value width {} exceeds supported queue width {}", bits, self.max_bits
                ),
                kind: QueueErrorKind::UnsupportedWidth,
            });
        }
        Ok(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::dg::EdgeAttrs;
    use crate::partition::Partition;
    use crate::transform::clonable::ClonablePropagation;
    use crate::transform::stages::StageBuilder;
    use std::collections::{BTreeSet, HashMap};

    fn ids(v: &[u32]) -> Vec<ComponentId> {
        v.iter().map(|&i| ComponentId(i)).collect()
    }

    fn chain() -> LoopDag {
        LoopDag::from_component_edges(3, &[
            (ComponentId(0), ComponentId(1), EdgeAttrs::flow(ValueId(0))),
            (ComponentId(1), ComponentId(2), EdgeAttrs::flow(ValueId(1))),
        ])
    }

    fn widths32() -> HashMap<ValueId, u64> {
        (0..8).map(|i| (ValueId(i), 32)).collect()
    }

    #[test]
    fn test_one_queue_per_cross_stage_edge() {
        let dag = chain();
        let stages = StageBuilder::build(
            &dag,
            &Partition::new(vec![ids(&[0]), ids(&[1]), ids(&[2])]),
        ).unwrap();

        let queues = QueueAllocator::new(64)
            .allocate(&dag, &stages, &widths32())
            .unwrap();

        assert_eq!(queues.len(), 2);
        assert_eq!((queues[0].from, queues[0].to), (StageId(0), StageId(1)));
        assert_eq!((queues[1].from, queues[1].to), (StageId(1), StageId(2)));
        assert!(queues.iter().all(|q| q.bits == 32));
    }

    #[test]
    fn test_intra_stage_edges_allocate_nothing() {
        let dag = chain();
        let stages = StageBuilder::build(
            &dag,
            &Partition::new(vec![ids(&[0, 1]), ids(&[2])]),
        ).unwrap();

        let queues = QueueAllocator::new(64)
            .allocate(&dag, &stages, &widths32())
            .unwrap();
        assert_eq!(queues.len(), 1);
        assert_eq!(queues[0].value, Some(ValueId(1)));
    }

    #[test]
    fn test_cloned_producer_eliminates_queue() {
        let dag = chain();
        let mut stages = StageBuilder::build(
            &dag,
            &Partition::new(vec![ids(&[0]), ids(&[1]), ids(&[2])]),
        ).unwrap();
        let clonable: BTreeSet<_> = [ComponentId(0)].into_iter().collect();
        ClonablePropagation::run(&dag, &mut stages, &clonable);

        let queues = QueueAllocator::new(64)
            .allocate(&dag, &stages, &widths32())
            .unwrap();

        // C0 -> C1 is recomputed inside stage 1; only C1 -> C2 remains.
        assert_eq!(queues.len(), 1);
        assert_eq!(queues[0].value, Some(ValueId(1)));
        assert_eq!(queues[0].id, QueueId(0));
    }

    #[test]
    fn test_discovery_order_is_deterministic() {
        // Two producers feeding one consumer stage plus a control edge.
        let dag = LoopDag::from_component_edges(3, &[
            (ComponentId(0), ComponentId(2), EdgeAttrs::flow(ValueId(0))),
            (ComponentId(1), ComponentId(2), EdgeAttrs::flow(ValueId(1))),
            (ComponentId(0), ComponentId(2), EdgeAttrs::control()),
        ]);
        let stages = StageBuilder::build(
            &dag,
            &Partition::new(vec![ids(&[0]), ids(&[1]), ids(&[2])]),
        ).unwrap();

        let alloc = QueueAllocator::new(64);
        let a = alloc.allocate(&dag, &stages, &widths32()).unwrap();
        let b = alloc.allocate(&dag, &stages, &widths32()).unwrap();

        let order_a: Vec<EdgeId> = a.iter().map(|q| q.edge).collect();
        let order_b: Vec<EdgeId> = b.iter().map(|q| q.edge).collect();
        assert_eq!(order_a, order_b);

        // Edge handle order within the consumer: flow v0, flow v1, token.
        assert_eq!(a.len(), 3);
        assert_eq!(a[0].value, Some(ValueId(0)));
        assert_eq!(a[1].value, Some(ValueId(1)));
        assert_eq!(a[2].value, None);
        assert_eq!(a[2].bits, 1);
    }

    #[test]
    fn test_excessive_width_rejected() {
        let dag = chain();
        let stages = StageBuilder::build(
            &dag,
            &Partition::new(vec![ids(&[0]), ids(&[1]), ids(&[2])]),
        ).unwrap();

        let mut widths = widths32();
        widths.insert(ValueId(1), 128);
        let err = QueueAllocator::new(64)
            .allocate(&dag, &stages, &widths)
            .unwrap_err();
        assert_eq!(err.kind, QueueErrorKind::UnsupportedWidth);
    }

    #[test]
    fn test_unresolved_width_rejected() {
        let dag = chain();
        let stages = StageBuilder::build(
            &dag,
            &Partition::new(vec![ids(&[0]), ids(&[1]), ids(&[2])]),
        ).unwrap();

        let widths: HashMap<ValueId, u64> = [(ValueId(0), 32)].into_iter().collect();
        let err = QueueAllocator::new(64)
            .allocate(&dag, &stages, &widths)
            .unwrap_err();
        assert_eq!(err.kind, QueueErrorKind::UnresolvedWidth);
    }
}
