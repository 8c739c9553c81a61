// src/endpoint.rs

//! Endpoint: one `bind` or `connect` of a socket.
//!
//! The endpoint wraps the transport object produced for its address and
//! walks `Idle -> Active -> Stopping -> Idle`. It reports the final step to
//! the socket with `SocketEvent::EndpointStopped`; the socket then drops it.

use crate::error::{NanoError, NanoResult};
use crate::message::Msg;
use crate::pipe::{PipeOptions, PipeStatus};
use crate::protocol::Protocol;
use crate::runtime::fsm;
use crate::runtime::{EndpointEvent, Envelope, Event, EventQueue, SocketEvent, TransportEvent};
use crate::socket::options::SocketOptions;
use crate::socket::stats::Statistics;
use crate::socket::types::SocketType;
use crate::transport::{address, Eid, EpEnv, Sid, TransportEndpoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EndpointState {
  Idle,
  Active,
  Stopping,
}

/// Socket state lent to an endpoint for the duration of one call.
pub(crate) struct SocketParts<'a> {
  pub socket_type: SocketType,
  pub protocol: &'a mut dyn Protocol,
  pub queue: &'a mut EventQueue,
  pub stats: &'a mut Statistics,
  pub options: &'a SocketOptions,
  pub next_sid: &'a mut Sid,
}

impl SocketParts<'_> {
  fn env<'b>(&'b mut self, eid: Eid, pipe_options: PipeOptions, error: &'b mut Option<NanoError>) -> EpEnv<'b> {
    EpEnv::new(
      eid,
      self.socket_type,
      &mut *self.protocol,
      &mut *self.queue,
      &mut *self.stats,
      self.options,
      pipe_options,
      error,
      &mut *self.next_sid,
    )
  }
}

pub(crate) struct Endpoint {
  eid: Eid,
  addr: String,
  bind: bool,
  state: EndpointState,
  transport: Box<dyn TransportEndpoint>,
  /// Snapshot of the socket's pipe options when the endpoint was created.
  pipe_options: PipeOptions,
  /// Last asynchronous failure; counted in `CURRENT_EP_ERRORS` while set.
  error: Option<NanoError>,
}

impl Endpoint {
  /// Resolves `addr` and asks its transport to bind or connect.
  ///
  /// Failures here are synchronous and leave nothing behind.
  pub(crate) fn create(eid: Eid, addr: &str, bind: bool, parts: &mut SocketParts<'_>) -> NanoResult<Self> {
    let (transport, address) = address::parse(addr)?;
    let pipe_options = parts.options.pipe_options();
    let mut error = None;
    let result = {
      let mut env = parts.env(eid, pipe_options, &mut error);
      if bind {
        transport.bind(address, &mut env)
      } else {
        transport.connect(address, &mut env)
      }
    };
    let transport = match result {
      Ok(transport) => transport,
      Err(e) => {
        if bind {
          parts.stats.bind_errors += 1;
        }
        tracing::debug!(eid, addr = %addr, bind, error = %e, "Endpoint creation failed");
        return Err(e);
      }
    };
    Ok(Self {
      eid,
      addr: addr.to_string(),
      bind,
      state: EndpointState::Idle,
      transport,
      pipe_options,
      error,
    })
  }

  pub(crate) fn eid(&self) -> Eid {
    self.eid
  }

  pub(crate) fn addr(&self) -> &str {
    &self.addr
  }

  pub(crate) fn is_bind(&self) -> bool {
    self.bind
  }

  pub(crate) fn state(&self) -> EndpointState {
    self.state
  }

  pub(crate) fn handle(&mut self, event: EndpointEvent, parts: &mut SocketParts<'_>) {
    let Endpoint {
      eid,
      addr,
      state,
      transport,
      pipe_options,
      error,
      ..
    } = self;
    match (*state, event) {
      (EndpointState::Idle, EndpointEvent::Start) => {
        *state = EndpointState::Active;
        tracing::debug!(eid = *eid, addr = %addr, "Endpoint started");
      }
      (EndpointState::Active, EndpointEvent::Stop) => {
        *state = EndpointState::Stopping;
        tracing::debug!(eid = *eid, addr = %addr, "Endpoint stopping");
        transport.stop(&mut parts.env(*eid, *pipe_options, error));
      }
      (EndpointState::Stopping, EndpointEvent::TransportStopped) => {
        *state = EndpointState::Idle;
        parts.env(*eid, *pipe_options, error).clear_error();
        tracing::debug!(eid = *eid, addr = %addr, "Endpoint stopped");
        parts.queue.raise(Event::Socket(SocketEvent::EndpointStopped(*eid)));
      }
      (state, event) => fsm::bad_transition("endpoint", state, event),
    }
  }

  pub(crate) fn transport_event(&mut self, event: TransportEvent, parts: &mut SocketParts<'_>) {
    self
      .transport
      .handle(event, &mut parts.env(self.eid, self.pipe_options, &mut self.error));
  }

  pub(crate) fn deliver(&mut self, envelope: Envelope, parts: &mut SocketParts<'_>) {
    self
      .transport
      .deliver(envelope, &mut parts.env(self.eid, self.pipe_options, &mut self.error));
  }

  pub(crate) fn pipe_send(&mut self, sid: Sid, msg: Msg, queue: &mut EventQueue) -> NanoResult<PipeStatus> {
    self.transport.pipe_send(sid, msg, queue)
  }

  pub(crate) fn pipe_recv(&mut self, sid: Sid, queue: &mut EventQueue) -> NanoResult<(Msg, PipeStatus)> {
    self.transport.pipe_recv(sid, queue)
  }
}
