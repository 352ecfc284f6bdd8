//! In-flight request slot accounting
//!
//! The backend owns a fixed set of request slots; this pool tracks which of
//! them currently carry live work. During warm-up the backend hands out idle
//! slots that have never run, and those must not be mistaken for completed
//! requests: only a slot the pool has marked busy yields a result worth
//! rendering.

/// Bookkeeping for one backend request slot.
#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    /// Whether a request is currently in flight on this slot
    in_use: bool,
    /// Input index the in-flight request was fed from
    source_index: usize,
}

/// Tracks which backend slots carry in-flight work and what was fed to them.
#[derive(Debug)]
pub struct SlotPool {
    slots: Vec<Slot>,
}

impl SlotPool {
    /// Create a pool with `count` idle slots.
    pub fn new(count: usize) -> Self {
        Self {
            slots: vec![Slot::default(); count],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether the slot has a request in flight.
    pub fn is_in_use(&self, slot: usize) -> bool {
        self.slots[slot].in_use
    }

    /// Input index the slot's in-flight request was fed from.
    pub fn source_index(&self, slot: usize) -> usize {
        self.slots[slot].source_index
    }

    /// Mark a slot busy with work fed from `source_index`.
    ///
    /// The slot must currently be idle; issuing over a live request would
    /// lose its result.
    pub fn issue(&mut self, slot: usize, source_index: usize) {
        debug_assert!(!self.slots[slot].in_use, "slot {slot} already in flight");
        self.slots[slot] = Slot {
            in_use: true,
            source_index,
        };
    }

    /// Return a completed slot to the idle state.
    pub fn release(&mut self, slot: usize) {
        debug_assert!(self.slots[slot].in_use, "slot {slot} was not in flight");
        self.slots[slot].in_use = false;
    }

    /// Number of requests currently in flight.
    pub fn in_flight(&self) -> usize {
        self.slots.iter().filter(|s| s.in_use).count()
    }
}

/// Round `target` up to the next multiple of `batch`.
///
/// Completion counters advance in whole batches, so the effective iteration
/// count must be batch-aligned or the run would never hit its target exactly.
pub fn round_up_to_batch(target: u64, batch: u64) -> u64 {
    debug_assert!(batch > 0);
    target.div_ceil(batch) * batch
}
