// src/runtime/fsm.rs

//! Shared failure path for the socket, endpoint, pipe and session machines.
//!
//! Every machine matches exhaustively on `(state, event)`. Pairs that have no
//! transition end up here: the process state is no longer trustworthy, so
//! the event is logged and the thread panics.

use std::fmt::Debug;

#[track_caller]
#[cold]
pub(crate) fn bad_transition(machine: &'static str, state: impl Debug, event: impl Debug) -> ! {
  tracing::error!(machine, state = ?state, event = ?event, "Unexpected event for state machine");
  panic!("{machine}: unexpected event {event:?} in state {state:?}");
}

#[track_caller]
#[cold]
pub(crate) fn bad_action(machine: &'static str, state: impl Debug, action: &'static str) -> ! {
  tracing::error!(machine, state = ?state, action, "Illegal action for state machine");
  panic!("{machine}: illegal action '{action}' in state {state:?}");
}
