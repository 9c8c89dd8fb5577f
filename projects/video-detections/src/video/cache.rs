//! Direct-mapped frame cache.
//!
//! Frame `i` may only ever live in slot `i % capacity`. Storing overwrites the
//! slot unconditionally and a lookup only hits when the slot holds exactly the
//! requested index, so two indices `capacity` apart can never be cached at the
//! same time. Callers size the cache for their access locality (at least one
//! batch for the detection pipeline).

use super::Frame;
use crate::error::{SequenceError, SequenceResult};

/// One cache slot.
#[derive(Debug, Clone)]
pub enum CacheSlot<F = Frame> {
    Empty,
    Occupied { index: usize, frame: F },
}

impl<F> CacheSlot<F> {
    pub fn index(&self) -> Option<usize> {
        match self {
            CacheSlot::Empty => None,
            CacheSlot::Occupied { index, .. } => Some(*index),
        }
    }
}

#[derive(Debug)]
pub struct FrameCache<F = Frame> {
    slots: Vec<CacheSlot<F>>,
}

impl<F> FrameCache<F> {
    pub fn new(capacity: usize) -> SequenceResult<Self> {
        if capacity == 0 {
            return Err(SequenceError::InvalidCapacity);
        }
        let slots = (0..capacity).map(|_| CacheSlot::Empty).collect();
        Ok(Self { slots })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn slot_of(&self, index: usize) -> usize {
        index % self.slots.len()
    }

    pub fn lookup(&self, index: usize) -> Option<&F> {
        match &self.slots[self.slot_of(index)] {
            CacheSlot::Occupied { index: stored, frame } if *stored == index => Some(frame),
            _ => None,
        }
    }

    pub fn store(&mut self, index: usize, frame: F) {
        let slot = self.slot_of(index);
        self.slots[slot] = CacheSlot::Occupied { index, frame };
    }

    pub fn slot(&self, slot: usize) -> Option<&CacheSlot<F>> {
        self.slots.get(slot)
    }

    /// Indices currently resident, in slot order.
    pub fn resident(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots.iter().filter_map(CacheSlot::index)
    }
}
