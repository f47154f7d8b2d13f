// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! A call activation's local-variable storage: one [`vellum_value::LocalSlot`]
//! per lvid assigned during `parse_init`.

use vellum_value::{LocalSlot, Value};

/// The index `parse_init` assigns a local variable, unique within one
/// activation (program top level, or one closure body).
pub type Lvid = usize;

/// The storage for one running activation. Closures pre-populate the slots
/// for their captured variables (by cloning the captor's `LocalSlot`,
/// preserving identity) before filling the remaining slots fresh.
#[derive(Debug)]
pub struct Frame {
    slots: Vec<LocalSlot>,
}

impl Frame {
    /// Creates a frame with `count` fresh `Nothing`-valued slots.
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self {
            slots: (0..count).map(|_| LocalSlot::new(Value::Nothing)).collect(),
        }
    }

    /// Creates a frame whose first `prefix.len()` slots are exactly
    /// `prefix` (typically a closure's captured slots plus bound
    /// parameters), extended with fresh `Nothing` slots up to `total`.
    #[must_use]
    pub fn from_prefix(prefix: Vec<LocalSlot>, total: usize) -> Self {
        let mut slots = prefix;
        slots.resize_with(total, || LocalSlot::new(Value::Nothing));
        Self { slots }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The slot for `lvid`. Panics on an out-of-range id: that is a
    /// `parse_init` bug (an lvid never resolved against this frame's own
    /// activation), not a reachable runtime condition.
    #[must_use]
    pub fn slot(&self, lvid: Lvid) -> &LocalSlot {
        &self.slots[lvid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_frame_slots_default_to_nothing() {
        let frame = Frame::new(3);
        assert!(matches!(frame.slot(0).peek(), Value::Nothing));
        assert_eq!(frame.len(), 3);
    }

    #[test]
    fn test_from_prefix_preserves_captured_identity() {
        let captured = LocalSlot::new(Value::Int(9));
        let frame = Frame::from_prefix(vec![captured.clone()], 2);
        assert!(frame.slot(0).ptr_eq(&captured));
        assert!(matches!(frame.slot(1).peek(), Value::Nothing));
    }
}
