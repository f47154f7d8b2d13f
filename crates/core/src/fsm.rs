// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Defines a generic finite-state machine (FSM).
//!
//! The FSM operates on a state-transition table of `(state, trigger) -> state`
//! tuples. The intended use case is to ensure correct state transitions as
//! well as holding a deterministic state value; `vellum-sync` builds each
//! lock primitive's `{unlocked, held, deleted}` state machine on top of it.
//!
//! # References
//!
//! <https://en.wikipedia.org/wiki/Finite-state_machine>

use std::{collections::HashMap, error::Error, fmt, hash::Hash};

/// Error representing an invalid trigger for the current state.
#[derive(Debug)]
pub struct InvalidStateTrigger {
    /// The current state as a string.
    pub current_state: String,
    /// The trigger as a string.
    pub trigger: String,
}

impl fmt::Display for InvalidStateTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid state transition: {} -> {}",
            self.current_state, self.trigger
        )
    }
}

impl Error for InvalidStateTrigger {}

/// A generic finite-state machine.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use vellum_core::fsm::FiniteStateMachine;
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// enum State { Idle, Running, Stopped }
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// enum Trigger { Start, Stop }
///
/// let mut table = HashMap::new();
/// table.insert((State::Idle, Trigger::Start), State::Running);
/// table.insert((State::Running, Trigger::Stop), State::Stopped);
///
/// let mut fsm = FiniteStateMachine::new(
///     State::Idle,
///     table,
///     |t| format!("{t:?}"),
///     |s| format!("{s:?}"),
/// );
///
/// fsm.trigger(Trigger::Start);
/// assert_eq!(fsm.state_string(), "Running");
/// ```
pub struct FiniteStateMachine<S, T>
where
    S: Copy + Eq + Hash,
    T: Copy + Eq + Hash,
{
    state: S,
    state_transition_table: HashMap<(S, T), S>,
    state_parser: fn(S) -> String,
    trigger_parser: fn(T) -> String,
}

impl<S, T> fmt::Debug for FiniteStateMachine<S, T>
where
    S: Copy + Eq + Hash + fmt::Debug,
    T: Copy + Eq + Hash + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FiniteStateMachine")
            .field("state", &self.state)
            .field("state_transition_table", &self.state_transition_table)
            .finish_non_exhaustive()
    }
}

impl<S, T> FiniteStateMachine<S, T>
where
    S: Copy + Eq + Hash,
    T: Copy + Eq + Hash,
{
    /// Creates a new finite-state machine.
    ///
    /// # Panics
    ///
    /// Panics if `state_transition_table` is empty.
    pub fn new(
        initial_state: S,
        state_transition_table: HashMap<(S, T), S>,
        trigger_parser: fn(T) -> String,
        state_parser: fn(S) -> String,
    ) -> Self {
        assert!(
            !state_transition_table.is_empty(),
            "state_transition_table cannot be empty"
        );

        Self {
            state: initial_state,
            state_transition_table,
            trigger_parser,
            state_parser,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> S {
        self.state
    }

    /// Returns the current state rendered via the state parser.
    pub fn state_string(&self) -> String {
        (self.state_parser)(self.state)
    }

    /// Returns whether `trigger` is a valid transition from the current state.
    pub fn can_trigger(&self, trigger: T) -> bool {
        self.state_transition_table
            .contains_key(&(self.state, trigger))
    }

    /// Attempts the transition for `trigger`, returning the new state on success
    /// without panicking on an invalid trigger.
    pub fn try_trigger(&mut self, trigger: T) -> Result<S, InvalidStateTrigger> {
        match self.state_transition_table.get(&(self.state, trigger)) {
            Some(&next_state) => {
                self.state = next_state;
                Ok(next_state)
            }
            None => Err(InvalidStateTrigger {
                current_state: self.state_string(),
                trigger: (self.trigger_parser)(trigger),
            }),
        }
    }

    /// Processes the FSM with the given trigger.
    ///
    /// # Panics
    ///
    /// Panics if the state/trigger combination is not found in the transition
    /// table. Callers for whom an invalid trigger is a reachable runtime
    /// condition (not a logic bug) should call [`Self::try_trigger`] instead.
    pub fn trigger(&mut self, trigger: T) {
        self.try_trigger(trigger).unwrap_or_else(|e| panic!("{e}"));
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum TestState {
        Initialized,
        Running,
        Stopped,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum TestTrigger {
        Start,
        Stop,
    }

    #[fixture]
    fn state_transition_table() -> HashMap<(TestState, TestTrigger), TestState> {
        let mut table = HashMap::new();
        table.insert(
            (TestState::Initialized, TestTrigger::Start),
            TestState::Running,
        );
        table.insert((TestState::Running, TestTrigger::Stop), TestState::Stopped);
        table
    }

    #[fixture]
    fn fsm(
        state_transition_table: HashMap<(TestState, TestTrigger), TestState>,
    ) -> FiniteStateMachine<TestState, TestTrigger> {
        FiniteStateMachine::new(
            TestState::Initialized,
            state_transition_table,
            |t| format!("{t:?}"),
            |s| format!("{s:?}"),
        )
    }

    #[rstest]
    fn test_initial_state(fsm: FiniteStateMachine<TestState, TestTrigger>) {
        assert_eq!(fsm.state(), TestState::Initialized);
    }

    #[rstest]
    fn test_valid_multiple_transitions(mut fsm: FiniteStateMachine<TestState, TestTrigger>) {
        fsm.trigger(TestTrigger::Start);
        assert_eq!(fsm.state(), TestState::Running);
        fsm.trigger(TestTrigger::Stop);
        assert_eq!(fsm.state(), TestState::Stopped);
    }

    #[rstest]
    fn test_try_trigger_invalid_does_not_panic(mut fsm: FiniteStateMachine<TestState, TestTrigger>) {
        let err = fsm.try_trigger(TestTrigger::Stop).unwrap_err();
        assert_eq!(err.current_state, "Initialized");
        assert_eq!(fsm.state(), TestState::Initialized);
    }

    #[rstest]
    #[should_panic(expected = "invalid state transition: Initialized -> Stop")]
    fn test_invalid_transition_panics(mut fsm: FiniteStateMachine<TestState, TestTrigger>) {
        fsm.trigger(TestTrigger::Stop);
    }
}
