//! Clonable-producer propagation.
//!
//! Cross-stage synchronization is expensive; a cheap, effect-free
//! producer component is better duplicated into the consuming stage than
//! communicated through a queue. For each stage independently, this pass
//! walks backwards from the stage's owned components over incoming
//! dependence edges and pulls every reachable clonable producer into the
//! stage's `cloned` set. Expansion stops at the first non-clonable
//! producer on a path; its own producers stay unexplored through that
//! path. The visited set is per stage, so the same component may be
//! cloned into several stages.
//!
//! This is a filtered reachability closure over a finite graph with a
//! visited-once frontier, so it terminates, and membership is boolean,
//! so traversal order cannot change the result.

use crate::graph::component::{ComponentId, LoopDag};
use crate::transform::stages::StageSet;
use std::collections::{BTreeSet, VecDeque};

/// The external clonability test: true only for components whose
/// duplication multiplies no externally observable effect (no effectful
/// writes or calls). Supplied by the upstream loop analysis.
pub trait Clonability {
    /// Whether the component is safe to duplicate across stages.
    fn can_clone(&self, c: ComponentId) -> bool;
}

impl<F: Fn(ComponentId) -> bool> Clonability for F {
    fn can_clone(&self, c: ComponentId) -> bool {
        self(c)
    }
}

impl Clonability for BTreeSet<ComponentId> {
    fn can_clone(&self, c: ComponentId) -> bool {
        self.contains(&c)
    }
}

/// Per-stage clonable propagation pass.
pub struct ClonablePropagation;

impl ClonablePropagation {
    /// Populate each stage's `cloned` set. Runs once per stage over the
    /// component graph; idempotent.
    pub fn run(dag: &LoopDag, stages: &mut StageSet, clonability: &dyn Clonability) {
        for stage in &mut stages.stages {
            let mut visited: BTreeSet<ComponentId> = BTreeSet::new();
            let mut frontier: VecDeque<ComponentId> = VecDeque::new();

            for &c in &stage.owned {
                frontier.push_back(c);
            }

            let mut cloned = BTreeSet::new();
            while let Some(c) = frontier.pop_front() {
                let node = dag.node_of(c);
                for edge_id in dag.graph.incoming_edges(node) {
                    let producer = dag.component_at(dag.graph.edge(edge_id).src);
                    if !visited.insert(producer) {
                        continue;
                    }
                    if !clonability.can_clone(producer) {
                        continue;
                    }
                    cloned.insert(producer);
                    frontier.push_back(producer);
                }
            }

            // Owned components never count as clones of themselves, even
            // when a cycle at component level reaches back into the
            // stage.
            for &c in &stage.owned {
                cloned.remove(&c);
            }
            stage.cloned = cloned;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::dg::{EdgeAttrs, ValueId};
    use crate::partition::Partition;
    use crate::transform::stages::StageBuilder;

    fn ids(v: &[u32]) -> Vec<ComponentId> {
        v.iter().map(|&i| ComponentId(i)).collect()
    }

    fn staged(dag: &LoopDag, subsets: Vec<Vec<ComponentId>>) -> StageSet {
        StageBuilder::build(dag, &Partition::new(subsets)).unwrap()
    }

    /// C0 -> C1 -> C2, one stage each.
    fn chain() -> LoopDag {
        LoopDag::from_component_edges(3, &[
            (ComponentId(0), ComponentId(1), EdgeAttrs::flow(ValueId(0))),
            (ComponentId(1), ComponentId(2), EdgeAttrs::flow(ValueId(1))),
        ])
    }

    #[test]
    fn test_no_clonables_no_clones() {
        let dag = chain();
        let mut stages = staged(&dag, vec![ids(&[0]), ids(&[1]), ids(&[2])]);
        ClonablePropagation::run(&dag, &mut stages, &(|_: ComponentId| false));
        assert!(stages.stages.iter().all(|s| s.cloned.is_empty()));
    }

    #[test]
    fn test_direct_producer_cloned() {
        let dag = chain();
        let mut stages = staged(&dag, vec![ids(&[0]), ids(&[1]), ids(&[2])]);
        let clonable: BTreeSet<_> = [ComponentId(0)].into_iter().collect();
        ClonablePropagation::run(&dag, &mut stages, &clonable);

        assert!(stages.stages[1].cloned.contains(&ComponentId(0)));
        // C0 does not reach stage 2 through clonable components only:
        // the path goes through C1, which is not clonable.
        assert!(stages.stages[2].cloned.is_empty());
        // A stage never clones its own components.
        assert!(stages.stages[0].cloned.is_empty());
    }

    #[test]
    fn test_propagates_through_clonable_chain() {
        let dag = chain();
        let mut stages = staged(&dag, vec![ids(&[0]), ids(&[1]), ids(&[2])]);
        let clonable: BTreeSet<_> = [ComponentId(0), ComponentId(1)].into_iter().collect();
        ClonablePropagation::run(&dag, &mut stages, &clonable);

        // Stage 2 reaches C1 directly and C0 through the clonable C1.
        assert_eq!(stages.stages[2].cloned, clonable);
        assert_eq!(
            stages.stages[1].cloned,
            [ComponentId(0)].into_iter().collect::<BTreeSet<_>>()
        );
    }

    #[test]
    fn test_stops_at_non_clonable_producer() {
        // C0 -> C1 -> C3 and C2 -> C3; C0 and C2 clonable, C1 not.
        let dag = LoopDag::from_component_edges(4, &[
            (ComponentId(0), ComponentId(1), EdgeAttrs::flow(ValueId(0))),
            (ComponentId(1), ComponentId(3), EdgeAttrs::flow(ValueId(1))),
            (ComponentId(2), ComponentId(3), EdgeAttrs::flow(ValueId(2))),
        ]);
        let mut stages = staged(&dag, vec![ids(&[0, 1, 2]), ids(&[3])]);
        let clonable: BTreeSet<_> = [ComponentId(0), ComponentId(2)].into_iter().collect();
        ClonablePropagation::run(&dag, &mut stages, &clonable);

        let cloned = &stages.stages[1].cloned;
        assert!(cloned.contains(&ComponentId(2)));
        // C0 only reaches the stage through non-clonable C1.
        assert!(!cloned.contains(&ComponentId(0)));
        assert!(!cloned.contains(&ComponentId(1)));
    }

    #[test]
    fn test_idempotent() {
        let dag = chain();
        let mut stages = staged(&dag, vec![ids(&[0]), ids(&[1]), ids(&[2])]);
        let clonable: BTreeSet<_> = [ComponentId(0), ComponentId(1)].into_iter().collect();

        ClonablePropagation::run(&dag, &mut stages, &clonable);
        let first: Vec<BTreeSet<ComponentId>> =
            stages.stages.iter().map(|s| s.cloned.clone()).collect();

        ClonablePropagation::run(&dag, &mut stages, &clonable);
        let second: Vec<BTreeSet<ComponentId>> =
            stages.stages.iter().map(|s| s.cloned.clone()).collect();

        assert_eq!(first, second);
    }

    #[test]
    fn test_per_stage_visited_scope() {
        // C0 feeds both C1 and C2, which sit in different stages; the
        // clonable C0 is duplicated into both independently.
        let dag = LoopDag::from_component_edges(3, &[
            (ComponentId(0), ComponentId(1), EdgeAttrs::flow(ValueId(0))),
            (ComponentId(0), ComponentId(2), EdgeAttrs::flow(ValueId(0))),
        ]);
        let mut stages = staged(&dag, vec![ids(&[0]), ids(&[1]), ids(&[2])]);
        let clonable: BTreeSet<_> = [ComponentId(0)].into_iter().collect();
        ClonablePropagation::run(&dag, &mut stages, &clonable);

        assert!(stages.stages[1].cloned.contains(&ComponentId(0)));
        assert!(stages.stages[2].cloned.contains(&ComponentId(0)));
    }
}
