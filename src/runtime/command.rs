// src/runtime/command.rs

use crate::message::Msg;
use crate::pipe::PipeId;
use crate::socket::SocketShared;
use crate::transport::{Eid, Sid};

use std::fmt;
use std::sync::Weak;

/// Events raised inside one socket context and consumed by the same context.
#[derive(Debug)]
pub(crate) enum Event {
  Socket(SocketEvent),
  Endpoint(Eid, EndpointEvent),
  Transport(Eid, TransportEvent),
}

/// Inputs of the socket machine. `Start` and `Stop` are invoked directly;
/// the rest are raised through the event queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SocketEvent {
  Start,
  Stop,
  PipeIn(PipeId),
  PipeOut(PipeId),
  EndpointStopped(Eid),
  ProtocolStopped,
}

/// Inputs of the endpoint machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EndpointEvent {
  Start,
  Stop,
  TransportStopped,
}

/// Notifications from a transport's sessions to the transport object that
/// owns them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransportEvent {
  /// The session lost its peer and tore its pipe down.
  SessionDisconnected(Sid),
  /// The session finished stopping and may be dropped.
  SessionStopped(Sid),
}

/// Commands exchanged between peer sessions living in different socket
/// contexts. Message bodies travel inside `Sent`.
#[derive(Debug)]
pub(crate) enum PeerCommand {
  Connect,
  Ready,
  Accepted,
  Sent(Msg),
  Received,
  Disconnect,
}

impl PeerCommand {
  pub(crate) fn name(&self) -> &'static str {
    match self {
      PeerCommand::Connect => "Connect",
      PeerCommand::Ready => "Ready",
      PeerCommand::Accepted => "Accepted",
      PeerCommand::Sent(_) => "Sent",
      PeerCommand::Received => "Received",
      PeerCommand::Disconnect => "Disconnect",
    }
  }
}

/// Address of an endpoint (`sid == None`) or of one of its sessions.
#[derive(Clone)]
pub(crate) struct PeerAddr {
  pub socket: Weak<SocketShared>,
  pub eid: Eid,
  pub sid: Option<Sid>,
}

impl PeerAddr {
  pub(crate) fn endpoint(socket: Weak<SocketShared>, eid: Eid) -> Self {
    Self { socket, eid, sid: None }
  }

  pub(crate) fn session(socket: Weak<SocketShared>, eid: Eid, sid: Sid) -> Self {
    Self {
      socket,
      eid,
      sid: Some(sid),
    }
  }
}

impl PartialEq for PeerAddr {
  fn eq(&self, other: &Self) -> bool {
    Weak::ptr_eq(&self.socket, &other.socket) && self.eid == other.eid && self.sid == other.sid
  }
}

impl Eq for PeerAddr {}

impl fmt::Debug for PeerAddr {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PeerAddr")
      .field("socket", &self.socket.upgrade().map(|s| s.handle()))
      .field("eid", &self.eid)
      .field("sid", &self.sid)
      .finish()
  }
}

/// A command in flight to another context's inbox.
#[derive(Debug)]
pub(crate) struct Envelope {
  pub to: PeerAddr,
  pub from: PeerAddr,
  pub cmd: PeerCommand,
}
