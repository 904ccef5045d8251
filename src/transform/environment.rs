//! Shared live-value environment.
//!
//! One contiguous block per transformed loop holds every value that is
//! live across the parallel region's boundary: live-ins (defined outside
//! the loop, read by at least one stage) and live-outs (defined inside,
//! read after the region). Slots are addressed by a stable index that is
//! part of the ABI with the runtime: live-ins first in caller order,
//! then live-outs in caller order.
//!
//! The environment is shared read/write across all stages with no
//! locking of its own; access ordering is guaranteed only by the channel
//! graph. It is written before stage execution (copy-in) and read after
//! (copy-out), never concurrently mutated during execution.

use crate::graph::dg::ValueId;
use crate::utils::errors::{EnvironmentError, EnvironmentErrorKind};
use serde::{Serialize, Deserialize};
use std::collections::HashMap;

/// Whether a slot holds a live-in or a live-out value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotKind {
    /// Defined outside the loop, read inside
    LiveIn,
    /// Defined inside the loop, read after it
    LiveOut,
}

/// Metadata of one environment slot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EnvSlot {
    /// The value stored in this slot
    pub value: ValueId,
    /// Live-in or live-out
    pub kind: SlotKind,
}

/// The live-in/live-out sets of one loop region, in the caller's order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Liveness {
    /// Values defined outside the loop and read by at least one stage
    pub live_ins: Vec<ValueId>,
    /// Values defined inside the loop and read after the region
    pub live_outs: Vec<ValueId>,
}

/// The shared environment block of one transformed loop.
#[derive(Debug, Clone)]
pub struct Environment {
    slots: Vec<EnvSlot>,
    index: HashMap<ValueId, usize>,
    data: Vec<u64>,
}

impl Environment {
    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the environment has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot metadata in index order.
    pub fn slots(&self) -> &[EnvSlot] {
        &self.slots
    }

    /// The stable slot index of a value.
    pub fn slot_of(&self, value: ValueId) -> Option<usize> {
        self.index.get(&value).copied()
    }

    /// Store a value's bits into its slot.
    pub fn store(&mut self, value: ValueId, bits: u64) -> Result<(), EnvironmentError> {
        let slot = self.slot_of(value).ok_or_else(|| EnvironmentError {
            message: format!("value {} has no environment slot", value),
            kind: EnvironmentErrorKind::UnknownValue,
        })?;
        self.data[slot] = bits;
        Ok(())
    }

    /// Load a value's bits from its slot.
    pub fn load(&self, value: ValueId) -> Result<u64, EnvironmentError> {
        let slot = self.slot_of(value).ok_or_else(|| EnvironmentError {
            message: format!("value {} has no environment slot", value),
            kind: EnvironmentErrorKind::UnknownValue,
        })?;
        Ok(self.data[slot])
    }

    /// Raw slot access by index, for the runtime side of the ABI.
    pub fn load_slot(&self, slot: usize) -> u64 {
        self.data[slot]
    }

    /// Raw slot store by index, for the runtime side of the ABI.
    pub fn store_slot(&mut self, slot: usize, bits: u64) {
        self.data[slot] = bits;
    }
}

/// Builds the environment block from the loop's liveness sets.
pub struct EnvironmentBuilder;

impl EnvironmentBuilder {
    /// Allocate one slot per live-in and live-out value. Registering the
    /// same value twice is an internal-consistency failure: the upstream
    /// liveness analysis must hand over disjoint, duplicate-free sets.
    pub fn build(liveness: &Liveness) -> Result<Environment, EnvironmentError> {
        let mut slots = Vec::with_capacity(liveness.live_ins.len() + liveness.live_outs.len());
        let mut index = HashMap::new();

        let registrations = liveness.live_ins.iter().map(|&v| (v, SlotKind::LiveIn))
            .chain(liveness.live_outs.iter().map(|&v| (v, SlotKind::LiveOut)));

        for (value, kind) in registrations {
            if index.insert(value, slots.len()).is_some() {
                return Err(EnvironmentError {
                    message: format!("value {} registered for two slots", value),
                    kind: EnvironmentErrorKind::DuplicateSlot,
                });
            }
            slots.push(EnvSlot { value, kind });
        }

        let data = vec![0; slots.len()];
        Ok(Environment { slots, index, data })
    }
}
