// src/protocol/patterns/priolist.rs

use crate::pipe::PipeId;

use std::collections::VecDeque;

/// Number of priority levels; 1 is the highest.
pub(crate) const PRIORITIES: usize = 16;

/// Active pipes grouped by priority, round-robin within a level.
///
/// The front of the highest non-empty level is the current pipe.
#[derive(Debug, Default)]
pub(crate) struct PrioList {
  slots: [VecDeque<PipeId>; PRIORITIES],
  current: Option<usize>,
}

impl PrioList {
  /// Makes `pipe` eligible at `priority` (1..=16).
  pub fn activate(&mut self, pipe: PipeId, priority: u8) {
    let index = slot_index(priority);
    if self.slots[index].contains(&pipe) {
      return;
    }
    self.slots[index].push_back(pipe);
    if self.current.map_or(true, |current| index < current) {
      self.current = Some(index);
    }
  }

  /// Forgets `pipe`, whether or not it is currently eligible.
  pub fn remove(&mut self, pipe: PipeId) {
    for slot in self.slots.iter_mut() {
      if let Some(pos) = slot.iter().position(|p| *p == pipe) {
        slot.remove(pos);
        break;
      }
    }
    self.refresh();
  }

  pub fn is_active(&self) -> bool {
    self.current.is_some()
  }

  /// The pipe to use next.
  pub fn pipe(&self) -> Option<PipeId> {
    self.current.and_then(|index| self.slots[index].front().copied())
  }

  /// Moves past the current pipe. With `release` the pipe also stops being
  /// eligible until activated again.
  pub fn advance(&mut self, release: bool) {
    let Some(index) = self.current else {
      return;
    };
    if let Some(pipe) = self.slots[index].pop_front() {
      if !release {
        self.slots[index].push_back(pipe);
      }
    }
    self.refresh();
  }

  /// Priority of the current pipe.
  pub fn priority(&self) -> Option<u8> {
    self.current.map(|index| (index + 1) as u8)
  }

  fn refresh(&mut self) {
    self.current = self.slots.iter().position(|slot| !slot.is_empty());
  }
}

fn slot_index(priority: u8) -> usize {
  assert!(
    (1..=PRIORITIES as u8).contains(&priority),
    "priority {priority} out of range"
  );
  (priority - 1) as usize
}

#[cfg(test)]
mod tests {
  use super::*;

  fn pipe(sid: u64) -> PipeId {
    PipeId { eid: 0, sid }
  }

  #[test]
  fn round_robin_within_priority() {
    let mut list = PrioList::default();
    list.activate(pipe(1), 8);
    list.activate(pipe(2), 8);
    assert_eq!(list.pipe(), Some(pipe(1)));
    list.advance(false);
    assert_eq!(list.pipe(), Some(pipe(2)));
    list.advance(false);
    assert_eq!(list.pipe(), Some(pipe(1)));
  }

  #[test]
  fn higher_priority_wins_until_released() {
    let mut list = PrioList::default();
    list.activate(pipe(1), 8);
    list.activate(pipe(2), 2);
    assert_eq!(list.pipe(), Some(pipe(2)));
    assert_eq!(list.priority(), Some(2));
    list.advance(false);
    assert_eq!(list.pipe(), Some(pipe(2)));
    list.advance(true);
    assert_eq!(list.pipe(), Some(pipe(1)));
    assert_eq!(list.priority(), Some(8));
  }

  #[test]
  fn remove_and_empty() {
    let mut list = PrioList::default();
    list.activate(pipe(1), 1);
    list.activate(pipe(1), 1);
    list.remove(pipe(1));
    assert!(!list.is_active());
    assert_eq!(list.pipe(), None);
    list.advance(true);
    assert_eq!(list.priority(), None);
  }
}
