// src/protocol/mod.rs

//! Scalability protocols: the per-socket policy deciding which pipe a
//! message goes to and which pipe the next message is read from.
//!
//! Protocol objects live inside the socket's context and are only ever
//! called with its lock held. They never talk to transports directly;
//! pipes are driven through the `PipeIo` the socket passes in.

pub(crate) mod bus;
pub(crate) mod pair;
pub(crate) mod patterns;
pub(crate) mod pipeline;
pub(crate) mod pubsub;

use crate::error::{NanoError, NanoResult};
use crate::message::Msg;
use crate::pipe::{PipeId, PipeOptions, PipeStatus};
use crate::socket::types::{Domain, SocketType};

use bitflags::bitflags;

bitflags! {
  /// What the protocol can do right now without blocking.
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
  pub(crate) struct Readiness: u8 {
    const IN = 0b01;
    const OUT = 0b10;
  }
}

/// Access to the socket's pipes, keyed by `PipeId`.
pub(crate) trait PipeIo {
  fn send(&mut self, pipe: PipeId, msg: Msg) -> NanoResult<PipeStatus>;
  fn recv(&mut self, pipe: PipeId) -> NanoResult<(Msg, PipeStatus)>;
}

/// Why a protocol did not take a message.
#[derive(Debug)]
pub(crate) enum SendError {
  /// No pipe can take it right now; the message is handed back.
  Again(Msg),
  Failed(NanoError),
}

impl From<NanoError> for SendError {
  fn from(e: NanoError) -> Self {
    SendError::Failed(e)
  }
}

pub(crate) trait Protocol: Send {
  /// A new pipe attached. Refusing it fails the session's handshake.
  fn add(&mut self, pipe: PipeId, options: &PipeOptions) -> NanoResult<()>;
  fn remove(&mut self, pipe: PipeId);
  /// The pipe can be read again.
  fn pipe_in(&mut self, pipe: PipeId);
  /// The pipe can be written again.
  fn pipe_out(&mut self, pipe: PipeId);
  fn events(&self) -> Readiness;
  fn send(&mut self, msg: Msg, pipes: &mut dyn PipeIo) -> Result<(), SendError>;
  fn recv(&mut self, pipes: &mut dyn PipeIo) -> NanoResult<Msg>;

  fn set_option(&mut self, level: i32, option: i32, _value: &[u8]) -> NanoResult<()> {
    Err(NanoError::NoSuchOption { level, option })
  }

  fn get_option(&self, level: i32, option: i32) -> NanoResult<Vec<u8>> {
    Err(NanoError::NoSuchOption { level, option })
  }

  /// The socket is closing and every endpoint has stopped.
  fn stop(&mut self) {}

  /// Teardown continues until this reports completion.
  fn poll_stopped(&mut self) -> bool {
    true
  }

  /// Priority of the pipe the next send would use.
  fn send_priority(&self) -> Option<u8> {
    None
  }
}

/// Instantiates the protocol for a socket type.
pub(crate) fn create(domain: Domain, socket_type: SocketType) -> Box<dyn Protocol> {
  match socket_type {
    SocketType::Pair => Box::new(pair::Pair::new()),
    SocketType::Push => Box::new(pipeline::Push::new()),
    SocketType::Pull => Box::new(pipeline::Pull::new()),
    SocketType::Pub => Box::new(pubsub::Pub::new()),
    SocketType::Sub => Box::new(pubsub::Sub::new()),
    SocketType::Bus => Box::new(bus::Bus::new(domain)),
  }
}

#[cfg(test)]
pub(crate) mod testing {
  //! In-memory `PipeIo` for protocol unit tests.

  use super::*;
  use std::collections::{HashMap, VecDeque};

  #[derive(Default)]
  pub(crate) struct MemPipes {
    pub inbound: HashMap<PipeId, VecDeque<Msg>>,
    pub outbound: HashMap<PipeId, Vec<Msg>>,
    /// Pipes whose next send/recv answers `Release`.
    pub releasing: Vec<PipeId>,
  }

  impl MemPipes {
    pub(crate) fn push_inbound(&mut self, pipe: PipeId, body: &'static [u8]) {
      self.inbound.entry(pipe).or_default().push_back(Msg::from_static(body));
    }

    pub(crate) fn sent_to(&self, pipe: PipeId) -> Vec<Vec<u8>> {
      self
        .outbound
        .get(&pipe)
        .map(|msgs| msgs.iter().map(|m| m.body().to_vec()).collect())
        .unwrap_or_default()
    }

    fn status(&self, pipe: PipeId) -> PipeStatus {
      if self.releasing.contains(&pipe) {
        PipeStatus::Release
      } else {
        PipeStatus::Done
      }
    }
  }

  impl PipeIo for MemPipes {
    fn send(&mut self, pipe: PipeId, msg: Msg) -> NanoResult<PipeStatus> {
      self.outbound.entry(pipe).or_default().push(msg);
      Ok(self.status(pipe))
    }

    fn recv(&mut self, pipe: PipeId) -> NanoResult<(Msg, PipeStatus)> {
      let msg = self
        .inbound
        .get_mut(&pipe)
        .and_then(|q| q.pop_front())
        .ok_or(NanoError::WouldBlock)?;
      Ok((msg, self.status(pipe)))
    }
  }

  pub(crate) fn pipe(sid: u64) -> PipeId {
    PipeId { eid: 1, sid }
  }

  pub(crate) fn options(sndprio: u8, rcvprio: u8) -> PipeOptions {
    PipeOptions {
      sndprio,
      rcvprio,
      ipv4only: true,
    }
  }
}
