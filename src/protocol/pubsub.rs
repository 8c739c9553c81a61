// src/protocol/pubsub.rs

use crate::error::{NanoError, NanoResult};
use crate::message::Msg;
use crate::pipe::{PipeId, PipeOptions};
use crate::protocol::patterns::{Distributor, FairQueue, SubscriptionTrie};
use crate::protocol::{PipeIo, Protocol, Readiness, SendError};
use crate::socket::options::{SUB_SUBSCRIBE, SUB_UNSUBSCRIBE};

/// PUB: every message goes to every subscriber that can take it right now.
#[derive(Debug, Default)]
pub(crate) struct Pub {
  dist: Distributor,
}

impl Pub {
  pub fn new() -> Self {
    Self::default()
  }
}

impl Protocol for Pub {
  fn add(&mut self, pipe: PipeId, _options: &PipeOptions) -> NanoResult<()> {
    self.dist.add(pipe);
    Ok(())
  }

  fn remove(&mut self, pipe: PipeId) {
    self.dist.remove(pipe);
  }

  fn pipe_in(&mut self, _pipe: PipeId) {}

  fn pipe_out(&mut self, pipe: PipeId) {
    self.dist.pipe_out(pipe);
  }

  /// Publishing never blocks; slow subscribers miss messages instead.
  fn events(&self) -> Readiness {
    Readiness::OUT
  }

  fn send(&mut self, msg: Msg, pipes: &mut dyn PipeIo) -> Result<(), SendError> {
    self.dist.send(msg, None, pipes);
    Ok(())
  }

  fn recv(&mut self, _pipes: &mut dyn PipeIo) -> NanoResult<Msg> {
    Err(NanoError::NotSupported("PUB"))
  }
}

/// SUB: receives from all publishers, keeping only subscribed topics.
#[derive(Debug, Default)]
pub(crate) struct Sub {
  fq: FairQueue,
  trie: SubscriptionTrie,
}

impl Sub {
  pub fn new() -> Self {
    Self::default()
  }
}

impl Protocol for Sub {
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
    Err(SendError::Failed(NanoError::NotSupported("SUB")))
  }

  fn recv(&mut self, pipes: &mut dyn PipeIo) -> NanoResult<Msg> {
    loop {
      let (msg, pipe) = self.fq.recv(pipes)?;
      if self.trie.matches(msg.body()) {
        return Ok(msg);
      }
      tracing::trace!(?pipe, size = msg.size(), "SUB dropping unsubscribed message");
    }
  }

  fn set_option(&mut self, level: i32, option: i32, value: &[u8]) -> NanoResult<()> {
    match option {
      SUB_SUBSCRIBE => {
        self.trie.subscribe(value);
        Ok(())
      }
      SUB_UNSUBSCRIBE => {
        if self.trie.unsubscribe(value) {
          Ok(())
        } else {
          Err(NanoError::InvalidArgument("not subscribed to topic".into()))
        }
      }
      _ => Err(NanoError::NoSuchOption { level, option }),
    }
  }
}
