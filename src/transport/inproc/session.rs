// src/transport/inproc/session.rs

use crate::error::{NanoError, NanoResult};
use crate::message::{Msg, MsgQueue};
use crate::pipe::{PipeBase, PipeId, PipeTransport};
use crate::runtime::fsm;
use crate::runtime::{Event, EventQueue, PeerAddr, PeerCommand, TransportEvent};
use crate::transport::{EpEnv, Sid};

const MACHINE: &str = "inproc session";

/// Which kind of endpoint owns the session; decides the statistics it feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Role {
  Listener,
  Connector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
  Idle,
  /// `Connect` posted to the peer endpoint, waiting for `Ready`.
  Connecting,
  /// `Ready` posted to the peer session, waiting for `Accepted`.
  Ready,
  Active,
  /// Lost the peer. Only stale commands can still arrive.
  Disconnected,
  /// Posted `Disconnect`, waiting for the peer to acknowledge it.
  StoppingPeer,
  Stopped,
}

/// One side of an in-process connection.
///
/// Messages arrive as `Sent` commands and wait in `inbound` until the
/// protocol reads them. Each one is acknowledged with `Received`, which
/// completes the peer's outstanding pipe send. A message that does not fit
/// in `inbound` is parked and acknowledged only once room frees up, so a
/// slow reader stalls its peer instead of losing data.
pub(super) struct Session {
  sid: Sid,
  role: Role,
  state: State,
  me: PeerAddr,
  peer: Option<PeerAddr>,
  pipe: PipeBase,
  inbound: MsgQueue,
  deferred: Option<Msg>,
  sending: bool,
  in_progress: bool,
}

impl Session {
  pub(super) fn new(role: Role, env: &mut EpEnv<'_>) -> Self {
    let sid = env.next_sid();
    Self {
      sid,
      role,
      state: State::Idle,
      me: env.session_addr(sid),
      peer: None,
      pipe: PipeBase::new(PipeId { eid: env.eid, sid }, env.pipe_options),
      inbound: MsgQueue::new(env.options.rcvbuf),
      deferred: None,
      sending: false,
      in_progress: false,
    }
  }

  pub(super) fn sid(&self) -> Sid {
    self.sid
  }

  pub(super) fn is_idle(&self) -> bool {
    self.state == State::Idle
  }

  pub(super) fn is_stopping(&self) -> bool {
    matches!(self.state, State::StoppingPeer | State::Stopped)
  }

  /// Dials the endpoint at `target`.
  pub(super) fn connect(&mut self, target: PeerAddr, env: &mut EpEnv<'_>) {
    if self.state != State::Idle {
      fsm::bad_action(MACHINE, self.state, "connect");
    }
    tracing::trace!(sid = self.sid, ?target, "Inproc session connecting");
    env.queue.post(&target, &self.me, PeerCommand::Connect);
    self.state = State::Connecting;
    self.begin_handshake(env);
  }

  /// Answers a `Connect` that arrived at the owning endpoint.
  pub(super) fn accept(&mut self, peer: PeerAddr, env: &mut EpEnv<'_>) {
    if self.state != State::Idle {
      fsm::bad_action(MACHINE, self.state, "accept");
    }
    tracing::trace!(sid = self.sid, ?peer, "Inproc session accepting");
    env.queue.post(&peer, &self.me, PeerCommand::Ready);
    self.peer = Some(peer);
    self.state = State::Ready;
    self.begin_handshake(env);
  }

  pub(super) fn deliver(&mut self, from: PeerAddr, cmd: PeerCommand, env: &mut EpEnv<'_>) {
    tracing::trace!(sid = self.sid, state = ?self.state, cmd = cmd.name(), "Inproc session command");
    let from_peer = self.peer.as_ref() == Some(&from);
    match (self.state, cmd) {
      (State::Connecting, PeerCommand::Ready) => {
        self.peer = Some(from);
        if self.activate(env) {
          self.post_peer(PeerCommand::Accepted, env.queue);
        }
      }
      (State::Connecting, PeerCommand::Disconnect) => {
        tracing::debug!(sid = self.sid, "Inproc connection refused");
        self.abandon(env);
      }
      (State::Ready, PeerCommand::Accepted) if from_peer => {
        self.activate(env);
      }
      (State::Ready, PeerCommand::Disconnect) if from_peer => {
        self.post_peer(PeerCommand::Disconnect, env.queue);
        self.abandon(env);
      }
      (State::Active, PeerCommand::Sent(msg)) if from_peer => self.enqueue(msg, env.queue),
      (State::Active, PeerCommand::Received) if from_peer => {
        if !self.sending {
          fsm::bad_transition(MACHINE, self.state, "Received without a send in flight");
        }
        self.sending = false;
        self.pipe.sent(env.queue);
      }
      (State::Active, PeerCommand::Disconnect) if from_peer => {
        tracing::debug!(sid = self.sid, "Inproc peer disconnected");
        self.pipe.stop(env);
        self.post_peer(PeerCommand::Disconnect, env.queue);
        env.stats.broken_connections += 1;
        self.disconnected(env);
      }
      (
        State::Disconnected,
        PeerCommand::Ready | PeerCommand::Accepted | PeerCommand::Sent(_) | PeerCommand::Received | PeerCommand::Disconnect,
      ) => {
        tracing::trace!(sid = self.sid, "Ignoring stale command on disconnected session");
      }
      (State::StoppingPeer, PeerCommand::Disconnect) if from_peer => self.finish(env),
      (
        State::StoppingPeer,
        PeerCommand::Ready | PeerCommand::Accepted | PeerCommand::Sent(_) | PeerCommand::Received | PeerCommand::Disconnect,
      ) => {
        tracing::trace!(sid = self.sid, "Ignoring command while waiting for peer to acknowledge stop");
      }
      (state, cmd) => fsm::bad_transition(MACHINE, state, cmd.name()),
    }
  }

  /// Starts stopping. Completion is raised as `SessionStopped`.
  pub(super) fn stop(&mut self, env: &mut EpEnv<'_>) {
    match self.state {
      State::Idle | State::Connecting | State::Disconnected => {
        self.end_handshake(env);
        self.finish(env);
      }
      State::Ready => {
        self.end_handshake(env);
        self.post_peer(PeerCommand::Disconnect, env.queue);
        self.state = State::StoppingPeer;
      }
      State::Active => {
        self.pipe.stop(env);
        self.post_peer(PeerCommand::Disconnect, env.queue);
        self.state = State::StoppingPeer;
      }
      State::StoppingPeer | State::Stopped => fsm::bad_action(MACHINE, self.state, "stop"),
    }
  }

  fn begin_handshake(&mut self, env: &mut EpEnv<'_>) {
    if self.role == Role::Connector {
      self.in_progress = true;
      env.stats.inprogress_connections += 1;
    }
  }

  fn end_handshake(&mut self, env: &mut EpEnv<'_>) {
    if std::mem::take(&mut self.in_progress) {
      env.stats.inprogress_connections -= 1;
    }
  }

  /// Attaches the pipe to the protocol. A refused pipe ends the connection.
  fn activate(&mut self, env: &mut EpEnv<'_>) -> bool {
    self.end_handshake(env);
    match self.pipe.start(env) {
      Ok(()) => {
        match self.role {
          Role::Connector => env.stats.established_connections += 1,
          Role::Listener => env.stats.accepted_connections += 1,
        }
        env.clear_error();
        self.state = State::Active;
        tracing::debug!(eid = env.eid, sid = self.sid, role = ?self.role, "Inproc session established");
        true
      }
      Err(e) => {
        match self.role {
          Role::Connector => env.stats.connect_errors += 1,
          Role::Listener => env.stats.accept_errors += 1,
        }
        env.stats.dropped_connections += 1;
        tracing::debug!(eid = env.eid, sid = self.sid, error = %e, "Inproc session refused by protocol");
        self.pipe.stop(env);
        self.post_peer(PeerCommand::Disconnect, env.queue);
        self.disconnected(env);
        false
      }
    }
  }

  /// The handshake will never complete.
  fn abandon(&mut self, env: &mut EpEnv<'_>) {
    self.end_handshake(env);
    env.stats.dropped_connections += 1;
    self.disconnected(env);
  }

  fn disconnected(&mut self, env: &mut EpEnv<'_>) {
    self.state = State::Disconnected;
    self.sending = false;
    env
      .queue
      .raise(Event::Transport(env.eid, TransportEvent::SessionDisconnected(self.sid)));
  }

  fn finish(&mut self, env: &mut EpEnv<'_>) {
    self.state = State::Stopped;
    tracing::trace!(sid = self.sid, "Inproc session stopped");
    env
      .queue
      .raise(Event::Transport(env.eid, TransportEvent::SessionStopped(self.sid)));
  }

  fn post_peer(&self, cmd: PeerCommand, queue: &mut EventQueue) {
    if let Some(peer) = &self.peer {
      queue.post(peer, &self.me, cmd);
    }
  }

  fn enqueue(&mut self, msg: Msg, queue: &mut EventQueue) {
    if self.deferred.is_some() {
      fsm::bad_transition(MACHINE, self.state, "Sent while a message is parked");
    }
    let was_empty = self.inbound.is_empty();
    match self.inbound.send(msg) {
      Ok(()) => {
        if was_empty {
          self.pipe.received(queue);
        }
        self.post_peer(PeerCommand::Received, queue);
      }
      Err(msg) => {
        tracing::trace!(sid = self.sid, queued = self.inbound.len(), "Inbound queue full, parking message");
        self.deferred = Some(msg);
      }
    }
  }
}

impl PipeTransport for Session {
  fn pipe_mut(&mut self) -> &mut PipeBase {
    &mut self.pipe
  }

  fn transport_send(&mut self, msg: Msg, queue: &mut EventQueue) -> NanoResult<()> {
    if self.state != State::Active {
      return Err(NanoError::ConnectionReset);
    }
    self.sending = true;
    self.post_peer(PeerCommand::Sent(msg.flatten()), queue);
    Ok(())
  }

  fn transport_recv(&mut self, queue: &mut EventQueue) -> NanoResult<Msg> {
    let Some(msg) = self.inbound.recv() else {
      fsm::bad_action(MACHINE, self.state, "recv from an empty queue");
    };
    if let Some(parked) = self.deferred.take() {
      match self.inbound.send(parked) {
        Ok(()) => self.post_peer(PeerCommand::Received, queue),
        Err(parked) => self.deferred = Some(parked),
      }
    }
    if !self.inbound.is_empty() {
      self.pipe.received(queue);
    }
    Ok(msg)
  }
}
