// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! The `{unlocked, held, deleted}` state machine shared by every lock
//! primitive (spec §4.4.1), built on [`vellum_core::fsm::FiniteStateMachine`].

use std::collections::HashMap;

use vellum_core::fsm::FiniteStateMachine;

/// The common state of any lock primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveState {
    Unlocked,
    Held,
    Deleted,
}

/// The common triggers driving [`PrimitiveState`] transitions. Concrete
/// primitives track re-entrancy counts, reader tables, etc. alongside the FSM
/// rather than encoding them as additional states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTrigger {
    Acquire,
    Release,
    Delete,
}

fn transition_table() -> HashMap<(PrimitiveState, PrimitiveTrigger), PrimitiveState> {
    use PrimitiveState::{Deleted, Held, Unlocked};
    use PrimitiveTrigger::{Acquire, Delete, Release};

    let mut table = HashMap::new();
    table.insert((Unlocked, Acquire), Held);
    // Re-entrant/multi-holder acquire (RMutex re-entry, an additional RwLock
    // reader, ...) keeps the primitive Held; concrete primitives guard this
    // transition behind their own re-entrancy check before calling it.
    table.insert((Held, Acquire), Held);
    table.insert((Held, Release), Unlocked);
    table.insert((Unlocked, Delete), Deleted);
    table.insert((Held, Delete), Deleted);
    table
}

/// Builds a fresh FSM initialized to `Unlocked` with the shared transition
/// table.
#[must_use]
pub fn new_fsm() -> FiniteStateMachine<PrimitiveState, PrimitiveTrigger> {
    FiniteStateMachine::new(
        PrimitiveState::Unlocked,
        transition_table(),
        |t| format!("{t:?}"),
        |s| format!("{s:?}"),
    )
}
