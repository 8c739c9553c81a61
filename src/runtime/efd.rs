// src/runtime/efd.rs

use crate::error::{NanoError, NanoResult};

use parking_lot::{Condvar, Mutex};
use std::time::Instant;

#[derive(Debug, Default)]
struct EfdState {
  signalled: bool,
  stopped: bool,
  /// Bumped by `interrupt`; waiters compare against the value they started with.
  interrupts: u64,
}

/// Readiness primitive a blocked `send` or `recv` sleeps on.
///
/// The socket signals it while the protocol can make progress in that
/// direction and unsignals it otherwise. Waiting does not consume the
/// signal. Once stopped, every waiter (current and future) fails with
/// `BadHandle`.
#[derive(Debug, Default)]
pub(crate) struct Efd {
  state: Mutex<EfdState>,
  cond: Condvar,
}

impl Efd {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  pub(crate) fn signal(&self) {
    let mut state = self.state.lock();
    if !state.signalled {
      state.signalled = true;
      self.cond.notify_all();
    }
  }

  pub(crate) fn unsignal(&self) {
    self.state.lock().signalled = false;
  }

  #[cfg(test)]
  pub(crate) fn is_signalled(&self) -> bool {
    self.state.lock().signalled
  }

  /// Permanently wakes every waiter with `BadHandle`.
  pub(crate) fn stop(&self) {
    let mut state = self.state.lock();
    state.stopped = true;
    self.cond.notify_all();
  }

  /// Wakes the threads currently waiting with `Interrupted`.
  pub(crate) fn interrupt(&self) {
    let mut state = self.state.lock();
    state.interrupts = state.interrupts.wrapping_add(1);
    self.cond.notify_all();
  }

  /// Blocks until signalled, stopped, interrupted or past `deadline`.
  pub(crate) fn wait(&self, deadline: Option<Instant>) -> NanoResult<()> {
    let mut state = self.state.lock();
    let entered_at = state.interrupts;
    loop {
      if state.stopped {
        return Err(NanoError::BadHandle);
      }
      if state.interrupts != entered_at {
        return Err(NanoError::Interrupted);
      }
      if state.signalled {
        return Ok(());
      }
      match deadline {
        Some(deadline) => {
          if self.cond.wait_until(&mut state, deadline).timed_out() {
            // One last look: the signal may have raced the timeout.
            return if state.stopped {
              Err(NanoError::BadHandle)
            } else if state.signalled {
              Ok(())
            } else {
              Err(NanoError::TimedOut)
            };
          }
        }
        None => self.cond.wait(&mut state),
      }
    }
  }
}
