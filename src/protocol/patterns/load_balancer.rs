// src/protocol/patterns/load_balancer.rs

use crate::message::Msg;
use crate::pipe::{PipeId, PipeStatus};
use crate::protocol::patterns::PrioList;
use crate::protocol::{PipeIo, SendError};

use std::collections::HashMap;

/// Sends each message to exactly one writable pipe: the highest send
/// priority first, round-robin within a priority level.
#[derive(Debug, Default)]
pub(crate) struct LoadBalancer {
  pipes: HashMap<PipeId, u8>,
  writable: PrioList,
}

impl LoadBalancer {
  pub fn add(&mut self, pipe: PipeId, sndprio: u8) {
    self.pipes.insert(pipe, sndprio);
    tracing::trace!(?pipe, sndprio, "LoadBalancer added pipe");
  }

  pub fn remove(&mut self, pipe: PipeId) {
    if self.pipes.remove(&pipe).is_some() {
      self.writable.remove(pipe);
      tracing::trace!(?pipe, "LoadBalancer removed pipe");
    }
  }

  /// The pipe can take another message.
  pub fn pipe_out(&mut self, pipe: PipeId) {
    if let Some(&sndprio) = self.pipes.get(&pipe) {
      self.writable.activate(pipe, sndprio);
    }
  }

  pub fn can_send(&self) -> bool {
    self.writable.is_active()
  }

  pub fn priority(&self) -> Option<u8> {
    self.writable.priority()
  }

  pub fn send(&mut self, msg: Msg, pipes: &mut dyn PipeIo) -> Result<(), SendError> {
    let Some(pipe) = self.writable.pipe() else {
      return Err(SendError::Again(msg));
    };
    match pipes.send(pipe, msg) {
      Ok(status) => {
        self.writable.advance(status == PipeStatus::Release);
        Ok(())
      }
      Err(e) => {
        self.writable.advance(true);
        Err(SendError::Failed(e))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::protocol::testing::{pipe, MemPipes};

  #[test]
  fn round_robin_between_equal_priorities() {
    let mut lb = LoadBalancer::default();
    let mut pipes = MemPipes::default();
    for sid in 1..=2 {
      lb.add(pipe(sid), 8);
      lb.pipe_out(pipe(sid));
    }
    for body in [b"1", b"2", b"3"] {
      lb.send(Msg::from_static(body), &mut pipes).unwrap();
    }
    assert_eq!(pipes.sent_to(pipe(1)), vec![b"1".to_vec(), b"3".to_vec()]);
    assert_eq!(pipes.sent_to(pipe(2)), vec![b"2".to_vec()]);
  }

  #[test]
  fn busy_pipes_hand_the_message_back() {
    let mut lb = LoadBalancer::default();
    let mut pipes = MemPipes::default();
    lb.add(pipe(1), 8);
    lb.pipe_out(pipe(1));
    pipes.releasing.push(pipe(1));

    lb.send(Msg::from_static(b"first"), &mut pipes).unwrap();
    assert!(!lb.can_send());
    match lb.send(Msg::from_static(b"second"), &mut pipes) {
      Err(SendError::Again(msg)) => assert_eq!(msg.body(), b"second"),
      other => panic!("expected Again, got {:?}", other),
    }
  }

  #[test]
  fn prefers_higher_priority() {
    let mut lb = LoadBalancer::default();
    let mut pipes = MemPipes::default();
    lb.add(pipe(1), 9);
    lb.add(pipe(2), 3);
    lb.pipe_out(pipe(1));
    lb.pipe_out(pipe(2));
    assert_eq!(lb.priority(), Some(3));
    lb.send(Msg::from_static(b"x"), &mut pipes).unwrap();
    assert_eq!(pipes.sent_to(pipe(2)).len(), 1);
    lb.remove(pipe(2));
    assert_eq!(lb.priority(), Some(9));
  }
}
