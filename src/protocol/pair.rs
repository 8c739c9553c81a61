// src/protocol/pair.rs

use crate::error::{NanoError, NanoResult};
use crate::message::Msg;
use crate::pipe::{PipeId, PipeOptions, PipeStatus};
use crate::protocol::{PipeIo, Protocol, Readiness, SendError};

/// PAIR: exactly one peer at a time.
///
/// A second pipe is refused, which makes the session that tried to attach it
/// disconnect instead of going active.
#[derive(Debug, Default)]
pub(crate) struct Pair {
  pipe: Option<PipeId>,
  readable: bool,
  writable: bool,
}

impl Pair {
  pub fn new() -> Self {
    Self::default()
  }
}

impl Protocol for Pair {
  fn add(&mut self, pipe: PipeId, _options: &PipeOptions) -> NanoResult<()> {
    if let Some(existing) = self.pipe {
      tracing::debug!(?pipe, ?existing, "PAIR refusing second pipe");
      return Err(NanoError::AlreadyConnected);
    }
    self.pipe = Some(pipe);
    Ok(())
  }

  fn remove(&mut self, pipe: PipeId) {
    if self.pipe == Some(pipe) {
      *self = Self::default();
    }
  }

  fn pipe_in(&mut self, pipe: PipeId) {
    if self.pipe == Some(pipe) {
      self.readable = true;
    }
  }

  fn pipe_out(&mut self, pipe: PipeId) {
    if self.pipe == Some(pipe) {
      self.writable = true;
    }
  }

  fn events(&self) -> Readiness {
    let mut events = Readiness::empty();
    events.set(Readiness::IN, self.readable);
    events.set(Readiness::OUT, self.writable);
    events
  }

  fn send(&mut self, msg: Msg, pipes: &mut dyn PipeIo) -> Result<(), SendError> {
    let pipe = match self.pipe {
      Some(pipe) if self.writable => pipe,
      _ => return Err(SendError::Again(msg)),
    };
    match pipes.send(pipe, msg) {
      Ok(status) => {
        self.writable = status == PipeStatus::Done;
        Ok(())
      }
      Err(e) => {
        self.writable = false;
        Err(SendError::Failed(e))
      }
    }
  }

  fn recv(&mut self, pipes: &mut dyn PipeIo) -> NanoResult<Msg> {
    let pipe = match self.pipe {
      Some(pipe) if self.readable => pipe,
      _ => return Err(NanoError::WouldBlock),
    };
    match pipes.recv(pipe) {
      Ok((msg, status)) => {
        self.readable = status == PipeStatus::Done;
        Ok(msg)
      }
      Err(e) => {
        self.readable = false;
        Err(e)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::protocol::testing::{options, pipe, MemPipes};

  #[test]
  fn second_pipe_is_refused() {
    let mut pair = Pair::new();
    pair.add(pipe(1), &options(8, 8)).unwrap();
    assert_eq!(pair.add(pipe(2), &options(8, 8)), Err(NanoError::AlreadyConnected));
    pair.remove(pipe(1));
    pair.add(pipe(2), &options(8, 8)).unwrap();
  }

  #[test]
  fn send_waits_for_pipe_out() {
    let mut pair = Pair::new();
    let mut pipes = MemPipes::default();
    pair.add(pipe(1), &options(8, 8)).unwrap();
    assert!(matches!(pair.send(Msg::from_static(b"x"), &mut pipes), Err(SendError::Again(_))));
    pair.pipe_out(pipe(1));
    assert_eq!(pair.events(), Readiness::OUT);
    pipes.releasing.push(pipe(1));
    pair.send(Msg::from_static(b"x"), &mut pipes).unwrap();
    assert_eq!(pair.events(), Readiness::empty());
  }
}
