// src/protocol/patterns/fair_queue.rs

use crate::error::{NanoError, NanoResult};
use crate::message::Msg;
use crate::pipe::{PipeId, PipeStatus};
use crate::protocol::patterns::PrioList;
use crate::protocol::PipeIo;

use std::collections::HashMap;

/// Reads from readable pipes in priority order, round-robin within a
/// priority level.
#[derive(Debug, Default)]
pub(crate) struct FairQueue {
  /// Receive priority of every attached pipe.
  pipes: HashMap<PipeId, u8>,
  readable: PrioList,
}

impl FairQueue {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add(&mut self, pipe: PipeId, rcvprio: u8) {
    self.pipes.insert(pipe, rcvprio);
    tracing::trace!(?pipe, rcvprio, "FairQueue added pipe");
  }

  pub fn remove(&mut self, pipe: PipeId) {
    if self.pipes.remove(&pipe).is_some() {
      self.readable.remove(pipe);
      tracing::trace!(?pipe, "FairQueue removed pipe");
    }
  }

  /// The pipe has data to read.
  pub fn pipe_in(&mut self, pipe: PipeId) {
    if let Some(&rcvprio) = self.pipes.get(&pipe) {
      self.readable.activate(pipe, rcvprio);
    }
  }

  pub fn can_recv(&self) -> bool {
    self.readable.is_active()
  }

  /// Reads one message and reports which pipe it came from.
  pub fn recv(&mut self, pipes: &mut dyn PipeIo) -> NanoResult<(Msg, PipeId)> {
    let pipe = self.readable.pipe().ok_or(NanoError::WouldBlock)?;
    match pipes.recv(pipe) {
      Ok((msg, status)) => {
        self.readable.advance(status == PipeStatus::Release);
        Ok((msg, pipe))
      }
      Err(e) => {
        self.readable.advance(true);
        Err(e)
      }
    }
  }
}
