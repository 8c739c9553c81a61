// src/protocol/pipeline.rs

use crate::error::{NanoError, NanoResult};
use crate::message::Msg;
use crate::pipe::{PipeId, PipeOptions};
use crate::protocol::patterns::{FairQueue, LoadBalancer};
use crate::protocol::{PipeIo, Protocol, Readiness, SendError};

/// PUSH: each message goes to one PULL peer, load-balanced.
#[derive(Debug, Default)]
pub(crate) struct Push {
  lb: LoadBalancer,
}

impl Push {
  pub fn new() -> Self {
    Self::default()
  }
}

impl Protocol for Push {
  fn add(&mut self, pipe: PipeId, options: &PipeOptions) -> NanoResult<()> {
    self.lb.add(pipe, options.sndprio);
    Ok(())
  }

  fn remove(&mut self, pipe: PipeId) {
    self.lb.remove(pipe);
  }

  // PULL never sends, so there is nothing to read.
  fn pipe_in(&mut self, _pipe: PipeId) {}

  fn pipe_out(&mut self, pipe: PipeId) {
    self.lb.pipe_out(pipe);
  }

  fn events(&self) -> Readiness {
    if self.lb.can_send() {
      Readiness::OUT
    } else {
      Readiness::empty()
    }
  }

  fn send(&mut self, msg: Msg, pipes: &mut dyn PipeIo) -> Result<(), SendError> {
    self.lb.send(msg, pipes)
  }

  fn recv(&mut self, _pipes: &mut dyn PipeIo) -> NanoResult<Msg> {
    Err(NanoError::NotSupported("PUSH"))
  }

  fn send_priority(&self) -> Option<u8> {
    self.lb.priority()
  }
}

/// PULL: fair-queues messages from all PUSH peers.
#[derive(Debug, Default)]
pub(crate) struct Pull {
  fq: FairQueue,
}

impl Pull {
  pub fn new() -> Self {
    Self::default()
  }
}

impl Protocol for Pull {
  fn add(&mut self, pipe: PipeId, options: &PipeOptions) -> NanoResult<()> {
    self.fq.add(pipe, options.rcvprio);
    Ok(())
  }

  fn remove(&mut self, pipe: PipeId) {
    self.fq.remove(pipe);
  }

  fn pipe_in(&mut self, pipe: PipeId) {
    self.fq.pipe_in(pipe);
  }

  fn pipe_out(&mut self, _pipe: PipeId) {}

  fn events(&self) -> Readiness {
    if self.fq.can_recv() {
      Readiness::IN
    } else {
      Readiness::empty()
    }
  }

  fn send(&mut self, _msg: Msg, _pipes: &mut dyn PipeIo) -> Result<(), SendError> {
    Err(SendError::Failed(NanoError::NotSupported("PULL")))
  }

  fn recv(&mut self, pipes: &mut dyn PipeIo) -> NanoResult<Msg> {
    self.fq.recv(pipes).map(|(msg, _)| msg)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::protocol::testing::{options, pipe, MemPipes};

  #[test]
  fn push_reports_priority_of_next_pipe() {
    let mut push = Push::new();
    let mut pipes = MemPipes::default();
    push.add(pipe(1), &options(4, 8)).unwrap();
    assert_eq!(push.events(), Readiness::empty());
    push.pipe_out(pipe(1));
    assert_eq!(push.send_priority(), Some(4));
    push.send(Msg::from_static(b"job"), &mut pipes).unwrap();
    assert_eq!(pipes.sent_to(pipe(1)), vec![b"job".to_vec()]);
  }

  #[test]
  fn pull_reads_from_readable_pipes() {
    let mut pull = Pull::new();
    let mut pipes = MemPipes::default();
    pull.add(pipe(1), &options(8, 8)).unwrap();
    assert_eq!(pull.recv(&mut pipes), Err(NanoError::WouldBlock));
    pipes.push_inbound(pipe(1), b"work");
    pull.pipe_in(pipe(1));
    assert_eq!(pull.events(), Readiness::IN);
    assert_eq!(pull.recv(&mut pipes).unwrap().body(), b"work");
  }
}
