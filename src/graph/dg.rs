//! Generic dependence graph substrate.
//!
//! A directed multigraph over arbitrary node payloads, used both at the
//! instruction level and at the component (SCC) level. Nodes and edges
//! live in arenas and are addressed by stable handles; removing a node
//! leaves a hole rather than reshuffling surviving handles, so handles
//! held by other passes stay valid for the lifetime of the graph.
//!
//! Edges are shared, not owned, by their endpoints: each endpoint holds
//! the edge handle in an incident set, and detaching from one side does
//! not implicitly detach from the other. `remove_edge` and `remove_node`
//! erase from both sides, so no dangling handle survives them. Cycles are
//! permitted; they are exactly why components exist.

use serde::{Serialize, Deserialize};
use std::collections::BTreeSet;
use std::fmt;

/// A stable handle to a node in a [`DepGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A stable handle to an edge in a [`DepGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub u32);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// An opaque identifier for a program value produced inside or outside
/// the loop. Values are numbered by the front-end; the pipeliner never
/// inspects them beyond identity and the caller's width resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Kind of dependence an edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepKind {
    /// Read-after-write (true/flow dependence)
    Flow,
    /// Write-after-read (anti dependence)
    Anti,
    /// Write-after-write (output dependence)
    Output,
    /// Control dependence
    Control,
}

impl DepKind {
    /// Short name for diagnostics.
    pub fn short_name(&self) -> &'static str {
        match self {
            DepKind::Flow => "RAW",
            DepKind::Anti => "WAR",
            DepKind::Output => "WAW",
            DepKind::Control => "CTL",
        }
    }

    /// Whether this dependence communicates a produced value (as opposed
    /// to a pure ordering/synchronization constraint).
    pub fn carries_value(&self) -> bool {
        matches!(self, DepKind::Flow)
    }
}

/// Attributes attached to a dependence edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeAttrs {
    /// The kind of dependence
    pub kind: DepKind,
    /// The value the dependence carries, if any. Control dependences
    /// carry none; a flow dependence always names the produced value.
    pub value: Option<ValueId>,
}

impl EdgeAttrs {
    /// A flow dependence carrying the given value.
    pub fn flow(value: ValueId) -> Self {
        Self { kind: DepKind::Flow, value: Some(value) }
    }

    /// A control dependence (no carried value).
    pub fn control() -> Self {
        Self { kind: DepKind::Control, value: None }
    }

    /// An ordering-only memory dependence of the given kind.
    pub fn ordering(kind: DepKind) -> Self {
        Self { kind, value: None }
    }
}

struct NodeSlot<T> {
    payload: T,
    incoming: BTreeSet<EdgeId>,
    outgoing: BTreeSet<EdgeId>,
}

struct EdgeSlot {
    src: NodeId,
    dst: NodeId,
    attrs: EdgeAttrs,
}

/// A borrowed view of one edge.
#[derive(Debug, Clone, Copy)]
pub struct EdgeRef {
    /// The edge's handle
    pub id: EdgeId,
    /// Source (producing) node
    pub src: NodeId,
    /// Destination (consuming) node
    pub dst: NodeId,
    /// Edge attributes
    pub attrs: EdgeAttrs,
}

/// A directed dependence multigraph over payloads of type `T`.
pub struct DepGraph<T> {
    nodes: Vec<Option<NodeSlot<T>>>,
    edges: Vec<Option<EdgeSlot>>,
}

impl<T> Default for DepGraph<T> {
    fn default() -> Self { Self::new() }
}

impl<T> DepGraph<T> {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self { nodes: Vec::new(), edges: Vec::new() }
    }

    /// Add a node with the given payload.
    pub fn add_node(&mut self, payload: T) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(NodeSlot {
            payload,
            incoming: BTreeSet::new(),
            outgoing: BTreeSet::new(),
        }));
        id
    }

    /// Add a directed edge from `src` to `dst`, attaching it to both
    /// endpoints' incident sets.
    pub fn add_edge(&mut self, src: NodeId, dst: NodeId, attrs: EdgeAttrs) -> EdgeId {
        debug_assert!(self.contains_node(src) && self.contains_node(dst));
        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(Some(EdgeSlot { src, dst, attrs }));
        self.node_slot_mut(src).outgoing.insert(id);
        self.node_slot_mut(dst).incoming.insert(id);
        id
    }

    fn node_slot(&self, id: NodeId) -> &NodeSlot<T> {
        self.nodes[id.0 as usize].as_ref().expect("stale node handle")
    }

    fn node_slot_mut(&mut self, id: NodeId) -> &mut NodeSlot<T> {
        self.nodes[id.0 as usize].as_mut().expect("stale node handle")
    }

    /// Whether the handle refers to a live node.
    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.get(id.0 as usize).map_or(false, Option::is_some)
    }

    /// Whether the handle refers to a live edge.
    pub fn contains_edge(&self, id: EdgeId) -> bool {
        self.edges.get(id.0 as usize).map_or(false, Option::is_some)
    }

    /// The payload of a node.
    pub fn node(&self, id: NodeId) -> &T {
        &self.node_slot(id).payload
    }

    /// Mutable access to a node's payload.
    pub fn node_mut(&mut self, id: NodeId) -> &mut T {
        &mut self.node_slot_mut(id).payload
    }

    /// A view of one edge.
    pub fn edge(&self, id: EdgeId) -> EdgeRef {
        let slot = self.edges[id.0 as usize].as_ref().expect("stale edge handle");
        EdgeRef { id, src: slot.src, dst: slot.dst, attrs: slot.attrs }
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    /// Number of live edges.
    pub fn edge_count(&self) -> usize {
        self.edges.iter().filter(|e| e.is_some()).count()
    }

    /// Iterate over live node handles in handle order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().enumerate()
            .filter(|(_, n)| n.is_some())
            .map(|(i, _)| NodeId(i as u32))
    }

    /// Iterate over live edges in handle order.
    pub fn edges(&self) -> impl Iterator<Item = EdgeRef> + '_ {
        self.edges.iter().enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|slot| EdgeRef {
                id: EdgeId(i as u32),
                src: slot.src,
                dst: slot.dst,
                attrs: slot.attrs,
            }))
    }

    /// Incoming edge handles of a node, in handle order.
    pub fn incoming_edges(&self, id: NodeId) -> impl Iterator<Item = EdgeId> + '_ {
        self.node_slot(id).incoming.iter().copied()
    }

    /// Outgoing edge handles of a node, in handle order.
    pub fn outgoing_edges(&self, id: NodeId) -> impl Iterator<Item = EdgeId> + '_ {
        self.node_slot(id).outgoing.iter().copied()
    }

    /// All edge handles incident to a node, outgoing then incoming.
    pub fn connected_edges(&self, id: NodeId) -> Vec<EdgeId> {
        let slot = self.node_slot(id);
        slot.outgoing.iter().chain(slot.incoming.iter()).copied().collect()
    }

    /// Number of incoming edges.
    pub fn in_degree(&self, id: NodeId) -> usize {
        self.node_slot(id).incoming.len()
    }

    /// Number of outgoing edges.
    pub fn out_degree(&self, id: NodeId) -> usize {
        self.node_slot(id).outgoing.len()
    }

    /// Total number of incident edges.
    pub fn degree(&self, id: NodeId) -> usize {
        let slot = self.node_slot(id);
        slot.incoming.len() + slot.outgoing.len()
    }

    /// Detach an edge from whichever incident set of `node` references
    /// it. The edge itself stays live and the opposite endpoint still
    /// references it; use [`DepGraph::remove_edge`] for full deletion.
    pub fn detach_edge(&mut self, node: NodeId, edge: EdgeId) {
        let slot = self.node_slot_mut(node);
        if !slot.outgoing.remove(&edge) {
            slot.incoming.remove(&edge);
        }
    }

    /// Fully delete an edge: erase it from both endpoint sets and free
    /// its slot. The handle becomes stale.
    pub fn remove_edge(&mut self, edge: EdgeId) {
        if let Some(slot) = self.edges[edge.0 as usize].take() {
            if self.contains_node(slot.src) {
                self.node_slot_mut(slot.src).outgoing.remove(&edge);
            }
            if self.contains_node(slot.dst) {
                self.node_slot_mut(slot.dst).incoming.remove(&edge);
            }
        }
    }

    /// Remove a node and every edge referencing it, from both sides.
    /// No dangling edge handle survives this.
    pub fn remove_node(&mut self, node: NodeId) {
        let incident = self.connected_edges(node);
        for edge in incident {
            self.remove_edge(edge);
        }
        self.nodes[node.0 as usize] = None;
    }

    /// Remove every edge connecting `a` and `b`, in both directions.
    /// Used when two components are merged or a dependence is elided.
    pub fn remove_edges_between(&mut self, a: NodeId, b: NodeId) {
        let doomed: Vec<EdgeId> = self.connected_edges(a).into_iter()
            .filter(|&e| {
                let r = self.edge(e);
                (r.src == a && r.dst == b) || (r.src == b && r.dst == a)
            })
            .collect();
        for edge in doomed {
            self.remove_edge(edge);
        }
    }

    /// All edges from `a` to `b`, in handle order.
    pub fn edges_between(&self, a: NodeId, b: NodeId) -> Vec<EdgeId> {
        self.outgoing_edges(a)
            .filter(|&e| self.edge(e).dst == b)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> (DepGraph<&'static str>, [NodeId; 4]) {
        // a -> b -> d, a -> c -> d
        let mut g = DepGraph::new();
        let a = g.add_node("a");
        let b = g.add_node("b");
        let c = g.add_node("c");
        let d = g.add_node("d");
        g.add_edge(a, b, EdgeAttrs::flow(ValueId(0)));
        g.add_edge(a, c, EdgeAttrs::flow(ValueId(0)));
        g.add_edge(b, d, EdgeAttrs::flow(ValueId(1)));
        g.add_edge(c, d, EdgeAttrs::flow(ValueId(2)));
        (g, [a, b, c, d])
    }

    #[test]
    fn test_degrees() {
        let (g, [a, b, _, d]) = diamond();
        assert_eq!(g.out_degree(a), 2);
        assert_eq!(g.in_degree(a), 0);
        assert_eq!(g.degree(b), 2);
        assert_eq!(g.in_degree(d), 2);
        assert_eq!(g.node_count(), 4);
        assert_eq!(g.edge_count(), 4);
    }

    #[test]
    fn test_remove_node_removes_both_sides() {
        let (mut g, [a, b, c, d]) = diamond();
        g.remove_node(b);

        assert!(!g.contains_node(b));
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.out_degree(a), 1);
        assert_eq!(g.in_degree(d), 1);

        // Surviving handles unaffected
        assert_eq!(*g.node(c), "c");
        for e in g.edges() {
            assert!(e.src != b && e.dst != b);
        }
    }

    #[test]
    fn test_detach_is_one_sided() {
        let mut g = DepGraph::new();
        let a = g.add_node(0u32);
        let b = g.add_node(1u32);
        let e = g.add_edge(a, b, EdgeAttrs::control());

        g.detach_edge(a, e);
        assert_eq!(g.out_degree(a), 0);
        // Opposite side still references the edge
        assert_eq!(g.in_degree(b), 1);
        assert!(g.contains_edge(e));

        g.detach_edge(b, e);
        assert_eq!(g.in_degree(b), 0);
    }

    #[test]
    fn test_remove_edges_between() {
        let mut g = DepGraph::new();
        let a = g.add_node(0u32);
        let b = g.add_node(1u32);
        let c = g.add_node(2u32);
        g.add_edge(a, b, EdgeAttrs::flow(ValueId(0)));
        g.add_edge(a, b, EdgeAttrs::ordering(DepKind::Anti));
        g.add_edge(b, a, EdgeAttrs::control());
        g.add_edge(a, c, EdgeAttrs::control());

        g.remove_edges_between(a, b);
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.edges_between(a, c).len(), 1);
        assert_eq!(g.degree(b), 0);
    }

    #[test]
    fn test_cycles_permitted() {
        let mut g = DepGraph::new();
        let a = g.add_node(0u32);
        let b = g.add_node(1u32);
        g.add_edge(a, b, EdgeAttrs::flow(ValueId(0)));
        g.add_edge(b, a, EdgeAttrs::flow(ValueId(1)));
        assert_eq!(g.in_degree(a), 1);
        assert_eq!(g.out_degree(a), 1);
    }

    #[test]
    fn test_handles_stable_across_removal() {
        let (mut g, [a, _, c, d]) = diamond();
        let before: Vec<NodeId> = g.nodes().collect();
        g.remove_node(a);
        let after: Vec<NodeId> = g.nodes().collect();
        assert_eq!(after.len(), before.len() - 1);
        assert!(after.contains(&c) && after.contains(&d));
    }

    #[test]
    fn test_incident_order_is_handle_order() {
        let mut g = DepGraph::new();
        let a = g.add_node(0u32);
        let b = g.add_node(1u32);
        let e1 = g.add_edge(a, b, EdgeAttrs::flow(ValueId(0)));
        let e2 = g.add_edge(a, b, EdgeAttrs::flow(ValueId(1)));
        let e3 = g.add_edge(a, b, EdgeAttrs::control());
        let incoming: Vec<EdgeId> = g.incoming_edges(b).collect();
        assert_eq!(incoming, vec![e1, e2, e3]);
    }
}
