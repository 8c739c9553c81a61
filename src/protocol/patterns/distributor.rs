// src/protocol/patterns/distributor.rs

use crate::message::Msg;
use crate::pipe::{PipeId, PipeStatus};
use crate::protocol::PipeIo;

use std::collections::HashSet;

/// Fans a message out to every writable pipe.
///
/// Pipes that are busy when a message is distributed simply miss it.
#[derive(Debug, Default)]
pub(crate) struct Distributor {
  peers: HashSet<PipeId>,
  writable: Vec<PipeId>,
}

impl Distributor {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add(&mut self, pipe: PipeId) {
    if self.peers.insert(pipe) {
      tracing::trace!(?pipe, "Distributor added pipe");
    }
  }

  pub fn remove(&mut self, pipe: PipeId) {
    if self.peers.remove(&pipe) {
      self.writable.retain(|p| *p != pipe);
      tracing::trace!(?pipe, "Distributor removed pipe");
    }
  }

  pub fn pipe_out(&mut self, pipe: PipeId) {
    if self.peers.contains(&pipe) && !self.writable.contains(&pipe) {
      self.writable.push(pipe);
    }
  }

  /// Sends a bulk copy of `msg` to each writable pipe except `exclude`.
  /// Returns how many pipes took a copy.
  pub fn send(&mut self, msg: Msg, exclude: Option<PipeId>, pipes: &mut dyn PipeIo) -> usize {
    let mut delivered = 0;
    let targets: Vec<PipeId> = self.writable.iter().copied().filter(|p| Some(*p) != exclude).collect();
    for pipe in targets {
      match pipes.send(pipe, msg.bulk_copy()) {
        Ok(PipeStatus::Done) => delivered += 1,
        Ok(PipeStatus::Release) => {
          delivered += 1;
          self.writable.retain(|p| *p != pipe);
        }
        Err(e) => {
          tracing::debug!(?pipe, error = %e, "Distributor dropping pipe after send failure");
          self.writable.retain(|p| *p != pipe);
        }
      }
    }
    tracing::trace!(delivered, "Distributor sent message");
    delivered
  }
}
