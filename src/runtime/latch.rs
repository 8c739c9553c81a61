// src/runtime/latch.rs

use crate::error::{NanoError, NanoResult};

use parking_lot::{Condvar, Mutex};

#[derive(Debug)]
struct LatchState {
  count: usize,
  interrupts: u64,
}

/// Blocking count-down latch.
///
/// `close` uses two of these with a count of one: one posted by the socket
/// machine when it reaches `Fini`, one posted when the last hold is released.
#[derive(Debug)]
pub(crate) struct CountDownLatch {
  state: Mutex<LatchState>,
  cond: Condvar,
}

impl CountDownLatch {
  /// Creates a new latch initialized with the given count.
  pub fn new(count: usize) -> Self {
    Self {
      state: Mutex::new(LatchState { count, interrupts: 0 }),
      cond: Condvar::new(),
    }
  }

  /// Decrements the count, releasing all waiting threads at zero.
  pub fn count_down(&self) {
    let mut state = self.state.lock();
    assert!(state.count > 0, "latch counted down past zero");
    state.count -= 1;
    if state.count == 0 {
      self.cond.notify_all();
    }
  }

  /// Blocks until the count reaches zero.
  pub fn await_(&self) {
    let mut state = self.state.lock();
    while state.count > 0 {
      self.cond.wait(&mut state);
    }
  }

  /// Like `await_`, but gives up with `Interrupted` if `interrupt` is called
  /// while waiting.
  pub fn await_interruptible(&self) -> NanoResult<()> {
    let mut state = self.state.lock();
    let entered_at = state.interrupts;
    while state.count > 0 {
      if state.interrupts != entered_at {
        return Err(NanoError::Interrupted);
      }
      self.cond.wait(&mut state);
    }
    Ok(())
  }

  pub fn interrupt(&self) {
    let mut state = self.state.lock();
    state.interrupts = state.interrupts.wrapping_add(1);
    self.cond.notify_all();
  }

  #[cfg(test)]
  pub fn get_count(&self) -> usize {
    self.state.lock().count
  }
}
