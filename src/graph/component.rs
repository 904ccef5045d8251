//! Dependence components (SCCs) and the component-level graph.
//!
//! The upstream analysis decomposes the instruction-level dependence
//! graph into strongly connected components and hands the decomposition
//! to this crate. Here we model a component as an atomic scheduling unit
//! and derive the component-level graph the partitioner and pipeliner
//! operate on. Instructions may form cycles; the derived component graph
//! of a valid decomposition is acyclic, which is the decomposition's
//! contract, not something this module re-proves.

use crate::graph::dg::{DepGraph, EdgeAttrs, NodeId, ValueId};
use serde::{Serialize, Deserialize};
use std::collections::HashMap;
use std::fmt;

/// A unique identifier for a dependence component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentId(pub u32);

impl ComponentId {
    pub fn new(id: u32) -> Self { Self(id) }

    /// Index into component-ordered storage.
    pub fn index(&self) -> usize { self.0 as usize }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// The minimal instruction payload the loop front-end hands over.
///
/// The substrate stays generic; this is just the payload shape this
/// crate's callers use at the instruction level. The pipeliner reads
/// nothing from it beyond the defined value and the effect marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instr {
    /// Human-readable name for diagnostics
    pub name: String,
    /// The value this instruction defines, if any
    pub defines: Option<ValueId>,
    /// Whether the instruction has an externally observable side effect
    /// (memory write, call). Effectful instructions make their component
    /// unsafe to duplicate.
    pub effectful: bool,
}

impl Instr {
    /// A pure instruction defining `value`.
    pub fn pure(name: impl Into<String>, value: ValueId) -> Self {
        Self { name: name.into(), defines: Some(value), effectful: false }
    }

    /// An effectful instruction (store, call).
    pub fn effectful(name: impl Into<String>, defines: Option<ValueId>) -> Self {
        Self { name: name.into(), defines, effectful: true }
    }
}

/// A maximal set of mutually dependent instruction nodes, scheduled
/// atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    /// The component's identifier (its index in the decomposition)
    pub id: ComponentId,
    /// Member instruction nodes
    pub members: Vec<NodeId>,
}

impl Component {
    pub fn new(id: ComponentId, members: Vec<NodeId>) -> Self {
        Self { id, members }
    }

    /// Whether the component consists of a single instruction.
    pub fn is_trivial(&self) -> bool {
        self.members.len() == 1
    }
}

/// The component-level view of one loop: the components themselves plus
/// the derived component graph.
///
/// Each cross-component instruction dependence survives as one component
/// edge, so every value that must flow between components is visible to
/// the queue allocator. Intra-component edges are dropped.
pub struct LoopDag {
    /// The derived component-level dependence graph. Node payloads are
    /// component ids; node handles are *not* component ids.
    pub graph: DepGraph<ComponentId>,
    /// The components, indexed by `ComponentId`
    pub components: Vec<Component>,
    node_of: Vec<NodeId>,
}

impl LoopDag {
    /// Derive the component graph from an instruction-level graph and a
    /// node→component assignment. `membership[i]` lists the member nodes
    /// of component `i`; every instruction node must appear in exactly
    /// one component (the decomposition's contract; unassigned nodes
    /// are simply invisible at component level).
    pub fn derive(instr_graph: &DepGraph<Instr>, membership: &[Vec<NodeId>]) -> Self {
        let mut graph: DepGraph<ComponentId> = DepGraph::new();
        let mut components = Vec::with_capacity(membership.len());
        let mut node_of = Vec::with_capacity(membership.len());
        let mut component_of: HashMap<NodeId, ComponentId> = HashMap::new();

        for (i, members) in membership.iter().enumerate() {
            let id = ComponentId(i as u32);
            for &m in members {
                component_of.insert(m, id);
            }
            components.push(Component::new(id, members.clone()));
            node_of.push(graph.add_node(id));
        }

        // Collapse instruction edges to component edges, dropping the
        // intra-component ones. Edge iteration is in handle order, so the
        // derived edge handles are deterministic.
        for edge in instr_graph.edges() {
            let (Some(&src), Some(&dst)) =
                (component_of.get(&edge.src), component_of.get(&edge.dst))
            else {
                continue;
            };
            if src == dst {
                continue;
            }
            graph.add_edge(node_of[src.index()], node_of[dst.index()], edge.attrs);
        }

        Self { graph, components, node_of }
    }

    /// Build a component-level loop directly (components as opaque
    /// units, edges given at component level). Used by callers that
    /// already operate on a component graph, and by tests.
    pub fn from_component_edges(
        n_components: usize,
        edges: &[(ComponentId, ComponentId, EdgeAttrs)],
    ) -> Self {
        let mut graph: DepGraph<ComponentId> = DepGraph::new();
        let mut components = Vec::with_capacity(n_components);
        let mut node_of = Vec::with_capacity(n_components);
        for i in 0..n_components {
            let id = ComponentId(i as u32);
            components.push(Component::new(id, Vec::new()));
            node_of.push(graph.add_node(id));
        }
        for &(src, dst, attrs) in edges {
            graph.add_edge(node_of[src.index()], node_of[dst.index()], attrs);
        }
        Self { graph, components, node_of }
    }

    /// Number of components.
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// The graph node standing for a component.
    pub fn node_of(&self, id: ComponentId) -> NodeId {
        self.node_of[id.index()]
    }

    /// The component a graph node stands for.
    pub fn component_at(&self, node: NodeId) -> ComponentId {
        *self.graph.node(node)
    }

    /// Iterate over all component ids in decomposition order.
    pub fn component_ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.components.iter().map(|c| c.id)
    }

    /// Whether the id names a component of this loop.
    pub fn contains(&self, id: ComponentId) -> bool {
        id.index() < self.components.len()
    }
}
