// src/transport/mod.rs

//! Transport interface.
//!
//! A transport turns an address into an endpoint object living inside the
//! socket's context. Endpoint objects own sessions, sessions own pipes, and
//! everything they do to the socket goes through the `EpEnv` handed to them.

pub(crate) mod address;
#[cfg(feature = "inproc")]
pub(crate) mod inproc;

use crate::error::{NanoError, NanoResult};
use crate::message::Msg;
use crate::pipe::{PipeOptions, PipeStatus};
use crate::protocol::Protocol;
use crate::runtime::{Envelope, EventQueue, PeerAddr, TransportEvent};
use crate::socket::options::SocketOptions;
use crate::socket::stats::Statistics;
use crate::socket::types::SocketType;

/// Identifies an endpoint within its socket; returned by `bind`/`connect`.
pub type EndpointId = u32;
pub(crate) type Eid = EndpointId;
/// Identifies a session within its socket. Never reused.
pub(crate) type Sid = u64;

/// The slice of the socket an endpoint object may touch while it handles an
/// event.
pub(crate) struct EpEnv<'a> {
  pub eid: Eid,
  pub socket_type: SocketType,
  pub protocol: &'a mut dyn Protocol,
  pub queue: &'a mut EventQueue,
  pub stats: &'a mut Statistics,
  pub options: &'a SocketOptions,
  pub pipe_options: PipeOptions,
  error: &'a mut Option<NanoError>,
  next_sid: &'a mut Sid,
}

impl<'a> EpEnv<'a> {
  #[allow(clippy::too_many_arguments)]
  pub(crate) fn new(
    eid: Eid,
    socket_type: SocketType,
    protocol: &'a mut dyn Protocol,
    queue: &'a mut EventQueue,
    stats: &'a mut Statistics,
    options: &'a SocketOptions,
    pipe_options: PipeOptions,
    error: &'a mut Option<NanoError>,
    next_sid: &'a mut Sid,
  ) -> Self {
    Self {
      eid,
      socket_type,
      protocol,
      queue,
      stats,
      options,
      pipe_options,
      error,
      next_sid,
    }
  }

  pub(crate) fn next_sid(&mut self) -> Sid {
    *self.next_sid += 1;
    *self.next_sid
  }

  pub(crate) fn session_addr(&self, sid: Sid) -> PeerAddr {
    PeerAddr::session(self.queue.me().clone(), self.eid, sid)
  }

  /// Records an asynchronous endpoint failure. The endpoint keeps running.
  pub(crate) fn set_error(&mut self, error: NanoError) {
    if crate::global::print_errors() {
      tracing::warn!(eid = self.eid, error = %error, "Endpoint error");
    } else {
      tracing::debug!(eid = self.eid, error = %error, "Endpoint error");
    }
    if self.error.is_none() {
      self.stats.current_ep_errors += 1;
    }
    *self.error = Some(error);
  }

  pub(crate) fn clear_error(&mut self) {
    if self.error.take().is_some() {
      self.stats.current_ep_errors -= 1;
    }
  }
}

/// Transport-specific socket options, one set per socket and transport.
pub(crate) trait OptionSet: Send {
  fn set(&mut self, option: i32, value: &[u8]) -> NanoResult<()>;
  fn get(&self, option: i32) -> NanoResult<Vec<u8>>;
}

pub(crate) trait Transport: Send + Sync {
  /// URL scheme, e.g. `inproc`.
  fn name(&self) -> &'static str;
  /// Negative option level reserved for this transport.
  fn id(&self) -> i32;

  /// Called when the first socket of the process is created.
  fn init(&self) {}
  /// Called when the last socket of the process is closed.
  fn term(&self) {}

  fn bind(&self, addr: &str, env: &mut EpEnv<'_>) -> NanoResult<Box<dyn TransportEndpoint>>;
  fn connect(&self, addr: &str, env: &mut EpEnv<'_>) -> NanoResult<Box<dyn TransportEndpoint>>;

  fn option_set(&self) -> Option<Box<dyn OptionSet>> {
    None
  }
}

/// The transport half of an endpoint.
pub(crate) trait TransportEndpoint: Send {
  /// Starts tearing down. Completion is reported by raising
  /// `EndpointEvent::TransportStopped` for `env.eid`.
  fn stop(&mut self, env: &mut EpEnv<'_>);
  /// Notifications raised by this endpoint's own sessions.
  fn handle(&mut self, event: TransportEvent, env: &mut EpEnv<'_>);
  /// A command from another socket addressed to this endpoint or one of
  /// its sessions.
  fn deliver(&mut self, envelope: Envelope, env: &mut EpEnv<'_>);

  fn pipe_send(&mut self, sid: Sid, msg: Msg, queue: &mut EventQueue) -> NanoResult<PipeStatus>;
  fn pipe_recv(&mut self, sid: Sid, queue: &mut EventQueue) -> NanoResult<(Msg, PipeStatus)>;
}

static TRANSPORTS: &[&dyn Transport] = &[
  #[cfg(feature = "inproc")]
  &inproc::InprocTransport,
];

pub(crate) fn transports() -> &'static [&'static dyn Transport] {
  TRANSPORTS
}

pub(crate) fn find(scheme: &str) -> Option<&'static dyn Transport> {
  TRANSPORTS.iter().copied().find(|t| t.name() == scheme)
}

pub(crate) fn find_by_id(id: i32) -> Option<&'static dyn Transport> {
  TRANSPORTS.iter().copied().find(|t| t.id() == id)
}
