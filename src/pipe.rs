// src/pipe.rs

//! The bridge between one transport session and the socket's protocol.
//!
//! A session owns a `PipeBase`. While the pipe is active it is registered
//! with the protocol under its `PipeId`, and the protocol drives it through
//! `PipeIo` (see `protocol`). The in and out halves each allow one operation
//! in flight; a transport that completes asynchronously reports back through
//! `sent` / `received`, which makes the pipe usable again.

use crate::error::NanoResult;
use crate::message::Msg;
use crate::runtime::fsm;
use crate::runtime::{Event, EventQueue, SocketEvent};
use crate::transport::{Eid, EpEnv, Sid};

/// Identifies a pipe within its socket: owning endpoint plus session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct PipeId {
  pub eid: Eid,
  pub sid: Sid,
}

/// Options copied from the socket when the endpoint is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PipeOptions {
  pub sndprio: u8,
  pub rcvprio: u8,
  pub ipv4only: bool,
}

/// Outcome of a successful pipe operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PipeStatus {
  /// Completed; the pipe may be driven again right away.
  Done,
  /// Accepted, but the pipe may not be driven again until the transport
  /// signals completion (`PipeOut` / `PipeIn`).
  Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PipeState {
  Idle,
  Active,
  Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InState {
  Idle,
  Receiving,
  Received,
  Async,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutState {
  Idle,
  Sending,
  Sent,
  Async,
}

#[derive(Debug)]
pub(crate) struct PipeBase {
  id: PipeId,
  state: PipeState,
  in_state: InState,
  out_state: OutState,
  options: PipeOptions,
}

impl PipeBase {
  pub(crate) fn new(id: PipeId, options: PipeOptions) -> Self {
    Self {
      id,
      state: PipeState::Idle,
      in_state: InState::Async,
      out_state: OutState::Idle,
      options,
    }
  }

  pub(crate) fn is_active(&self) -> bool {
    self.state == PipeState::Active
  }

  /// Registers the pipe with the protocol. On success the pipe is writable
  /// and waits for the transport to report inbound data.
  pub(crate) fn start(&mut self, env: &mut EpEnv<'_>) -> NanoResult<()> {
    if self.state != PipeState::Idle {
      fsm::bad_action("pipe", self.state, "start");
    }
    self.in_state = InState::Async;
    self.out_state = OutState::Idle;
    if let Err(e) = env.protocol.add(self.id, &self.options) {
      tracing::debug!(pipe = ?self.id, error = %e, "Protocol refused pipe");
      self.state = PipeState::Failed;
      return Err(e);
    }
    self.state = PipeState::Active;
    env.stats.current_connections += 1;
    tracing::trace!(pipe = ?self.id, "Pipe started");
    env.queue.raise(Event::Socket(SocketEvent::PipeOut(self.id)));
    Ok(())
  }

  /// Detaches the pipe from the protocol. Safe to call in any state.
  pub(crate) fn stop(&mut self, env: &mut EpEnv<'_>) {
    if self.state == PipeState::Active {
      env.protocol.remove(self.id);
      env.queue.cancel_pipe(self.id);
      env.stats.current_connections -= 1;
      tracing::trace!(pipe = ?self.id, "Pipe stopped");
    }
    self.state = PipeState::Idle;
  }

  /// Transport: inbound data is available again.
  pub(crate) fn received(&mut self, queue: &mut EventQueue) {
    match self.in_state {
      InState::Receiving => self.in_state = InState::Received,
      InState::Async => {
        self.in_state = InState::Idle;
        if self.is_active() {
          queue.raise(Event::Socket(SocketEvent::PipeIn(self.id)));
        }
      }
      state => fsm::bad_action("pipe", state, "received"),
    }
  }

  /// Transport: the outstanding send completed.
  pub(crate) fn sent(&mut self, queue: &mut EventQueue) {
    match self.out_state {
      OutState::Sending => self.out_state = OutState::Sent,
      OutState::Async => {
        self.out_state = OutState::Idle;
        if self.is_active() {
          queue.raise(Event::Socket(SocketEvent::PipeOut(self.id)));
        }
      }
      state => fsm::bad_action("pipe", state, "sent"),
    }
  }

  fn begin_send(&mut self) {
    match self.out_state {
      OutState::Idle => self.out_state = OutState::Sending,
      state => fsm::bad_action("pipe", state, "send"),
    }
  }

  fn end_send(&mut self, result: NanoResult<()>) -> NanoResult<PipeStatus> {
    if let Err(e) = result {
      self.out_state = OutState::Idle;
      return Err(e);
    }
    match self.out_state {
      OutState::Sent => {
        self.out_state = OutState::Idle;
        Ok(PipeStatus::Done)
      }
      OutState::Sending => {
        self.out_state = OutState::Async;
        Ok(PipeStatus::Release)
      }
      state => fsm::bad_action("pipe", state, "complete send"),
    }
  }

  fn begin_recv(&mut self) {
    match self.in_state {
      InState::Idle => self.in_state = InState::Receiving,
      state => fsm::bad_action("pipe", state, "recv"),
    }
  }

  fn end_recv(&mut self, result: NanoResult<Msg>) -> NanoResult<(Msg, PipeStatus)> {
    let msg = match result {
      Ok(msg) => msg,
      Err(e) => {
        self.in_state = InState::Idle;
        return Err(e);
      }
    };
    match self.in_state {
      InState::Received => {
        self.in_state = InState::Idle;
        Ok((msg, PipeStatus::Done))
      }
      InState::Receiving => {
        self.in_state = InState::Async;
        Ok((msg, PipeStatus::Release))
      }
      state => fsm::bad_action("pipe", state, "complete recv"),
    }
  }
}

/// Implemented by transport sessions that own a `PipeBase`.
pub(crate) trait PipeTransport {
  fn pipe_mut(&mut self) -> &mut PipeBase;

  /// Hands the message to the transport. Calls `PipeBase::sent` before
  /// returning if the send completed synchronously.
  fn transport_send(&mut self, msg: Msg, queue: &mut EventQueue) -> NanoResult<()>;

  /// Takes the next inbound message. Calls `PipeBase::received` before
  /// returning if more data is immediately available.
  fn transport_recv(&mut self, queue: &mut EventQueue) -> NanoResult<Msg>;
}

/// Sends one message through a session's pipe.
pub(crate) fn send(session: &mut impl PipeTransport, msg: Msg, queue: &mut EventQueue) -> NanoResult<PipeStatus> {
  session.pipe_mut().begin_send();
  let result = session.transport_send(msg, queue);
  session.pipe_mut().end_send(result)
}

/// Receives one message through a session's pipe.
pub(crate) fn recv(session: &mut impl PipeTransport, queue: &mut EventQueue) -> NanoResult<(Msg, PipeStatus)> {
  session.pipe_mut().begin_recv();
  let result = session.transport_recv(queue);
  session.pipe_mut().end_recv(result)
}
