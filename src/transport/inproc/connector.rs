// src/transport/inproc/connector.rs

use super::session::{Role, Session};
use super::Registration;
use crate::error::NanoResult;
use crate::message::Msg;
use crate::pipe::{self, PipeStatus};
use crate::runtime::fsm;
use crate::runtime::{EndpointEvent, Envelope, Event, EventQueue, PeerAddr, PeerCommand, TransportEvent};
use crate::transport::{EpEnv, Sid, TransportEndpoint};

const MACHINE: &str = "inproc connector";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
  /// Waiting for a listener to appear.
  Disconnected,
  Active,
  Stopping,
}

/// Connecting side of an in-process address: at most one live session.
///
/// When that session loses its peer it is retired and replaced by a fresh
/// idle one, so a later bind of the same name can connect again. A listener
/// that dials in before the old peer's disconnect has landed waits in
/// `parked` and is accepted as soon as the connector is free.
pub(super) struct InprocConnector {
  registration: Registration,
  state: State,
  session: Option<Session>,
  retired: Vec<Session>,
  parked: Option<PeerAddr>,
}

impl InprocConnector {
  pub(super) fn new(registration: Registration, env: &mut EpEnv<'_>) -> Self {
    Self {
      registration,
      state: State::Disconnected,
      session: Some(Session::new(Role::Connector, env)),
      retired: Vec::new(),
      parked: None,
    }
  }

  /// Connects to a listener that was already bound.
  pub(super) fn dial(&mut self, binder: &Registration, env: &mut EpEnv<'_>) {
    if self.state != State::Disconnected {
      fsm::bad_action(MACHINE, self.state, "dial");
    }
    if let Some(session) = self.session.as_mut() {
      session.connect(binder.endpoint(), env);
      self.state = State::Active;
    }
  }

  fn accept(&mut self, listener: PeerAddr, env: &mut EpEnv<'_>) {
    match self.session.as_mut() {
      Some(session) if session.is_idle() => {
        tracing::debug!(eid = env.eid, sid = session.sid(), "Inproc connector reached by listener");
        session.accept(listener, env);
        self.state = State::Active;
      }
      _ => fsm::bad_action(MACHINE, self.state, "accept without an idle session"),
    }
  }

  /// Refuses a listener on behalf of this endpoint.
  fn refuse(&self, listener: PeerAddr, env: &mut EpEnv<'_>) {
    env.queue.bounce(Envelope {
      to: self.registration.endpoint(),
      from: listener,
      cmd: PeerCommand::Connect,
    });
  }

  fn session_mut(&mut self, sid: Sid) -> Option<&mut Session> {
    self
      .session
      .iter_mut()
      .chain(self.retired.iter_mut())
      .find(|s| s.sid() == sid)
  }

  fn check_stopped(&self, env: &mut EpEnv<'_>) {
    if self.state == State::Stopping && self.session.is_none() && self.retired.is_empty() {
      tracing::debug!(eid = env.eid, addr = %self.registration.addr, "Inproc connector stopped");
      env
        .queue
        .raise(Event::Endpoint(env.eid, EndpointEvent::TransportStopped));
    }
  }
}

impl TransportEndpoint for InprocConnector {
  fn stop(&mut self, env: &mut EpEnv<'_>) {
    if self.state == State::Stopping {
      fsm::bad_action(MACHINE, self.state, "stop");
    }
    self.state = State::Stopping;
    super::disconnect(&self.registration);
    if let Some(listener) = self.parked.take() {
      self.refuse(listener, env);
    }
    if let Some(session) = self.session.as_mut().filter(|s| !s.is_stopping()) {
      session.stop(env);
    }
    self.check_stopped(env);
  }

  fn handle(&mut self, event: TransportEvent, env: &mut EpEnv<'_>) {
    match event {
      TransportEvent::SessionDisconnected(sid) => {
        let current = self.session.as_ref().is_some_and(|s| s.sid() == sid);
        if !current || self.state == State::Stopping {
          tracing::trace!(eid = env.eid, sid, "Ignoring disconnect of retired session");
          return;
        }
        let fresh = Session::new(Role::Connector, env);
        if let Some(mut old) = self.session.replace(fresh) {
          old.stop(env);
          self.retired.push(old);
        }
        self.state = State::Disconnected;
        tracing::debug!(eid = env.eid, addr = %self.registration.addr, "Inproc connector lost its listener");
        if let Some(listener) = self.parked.take() {
          self.accept(listener, env);
        }
      }
      TransportEvent::SessionStopped(sid) => {
        if self.session.as_ref().is_some_and(|s| s.sid() == sid) {
          self.session = None;
        } else {
          self.retired.retain(|s| s.sid() != sid);
        }
        self.check_stopped(env);
      }
    }
  }

  fn deliver(&mut self, envelope: Envelope, env: &mut EpEnv<'_>) {
    let Envelope { to, from, cmd } = envelope;
    let Some(sid) = to.sid else {
      match (self.state, cmd) {
        (State::Disconnected, PeerCommand::Connect) => self.accept(from, env),
        // A name has one listener, so a new one means the old one unbound
        // and its disconnect is still on the way.
        (State::Active, PeerCommand::Connect) => {
          tracing::debug!(eid = env.eid, "Inproc connector still attached, holding new listener");
          if let Some(stale) = self.parked.replace(from) {
            self.refuse(stale, env);
          }
        }
        (State::Stopping, PeerCommand::Connect) => {
          tracing::debug!(eid = env.eid, "Inproc connector stopping, refusing listener");
          self.refuse(from, env);
        }
        (_, PeerCommand::Disconnect) => {
          tracing::trace!(eid = env.eid, "Ignoring disconnect addressed to connector");
        }
        (state, cmd) => fsm::bad_transition(MACHINE, state, cmd.name()),
      }
      return;
    };
    match self.session_mut(sid) {
      Some(session) => session.deliver(from, cmd, env),
      None => env.queue.bounce(Envelope { to, from, cmd }),
    }
  }

  fn pipe_send(&mut self, sid: Sid, msg: Msg, queue: &mut EventQueue) -> NanoResult<PipeStatus> {
    let state = self.state;
    match self.session_mut(sid) {
      Some(session) => pipe::send(session, msg, queue),
      None => fsm::bad_action(MACHINE, state, "send on unknown pipe"),
    }
  }

  fn pipe_recv(&mut self, sid: Sid, queue: &mut EventQueue) -> NanoResult<(Msg, PipeStatus)> {
    let state = self.state;
    match self.session_mut(sid) {
      Some(session) => pipe::recv(session, queue),
      None => fsm::bad_action(MACHINE, state, "recv on unknown pipe"),
    }
  }
}
