//! Dependence graph substrate and component model.

pub mod dg;
pub mod component;

pub use dg::{DepGraph, DepKind, EdgeAttrs, EdgeId, EdgeRef, NodeId, ValueId};
pub use component::{Component, ComponentId, Instr, LoopDag};
