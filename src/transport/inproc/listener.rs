// src/transport/inproc/listener.rs

use super::session::{Role, Session};
use super::Registration;
use crate::error::NanoResult;
use crate::message::Msg;
use crate::pipe::{self, PipeStatus};
use crate::runtime::fsm;
use crate::runtime::{EndpointEvent, Envelope, Event, EventQueue, PeerCommand, TransportEvent};
use crate::transport::{EpEnv, Sid, TransportEndpoint};

const MACHINE: &str = "inproc listener";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
  Active,
  Stopping,
}

/// Bound side of an in-process address. Every client gets its own session.
pub(super) struct InprocListener {
  registration: Registration,
  state: State,
  sessions: Vec<Session>,
}

impl InprocListener {
  pub(super) fn new(registration: Registration) -> Self {
    Self {
      registration,
      state: State::Active,
      sessions: Vec::new(),
    }
  }

  /// Reaches out to a connector that registered before this bind.
  pub(super) fn dial(&mut self, connector: &Registration, env: &mut EpEnv<'_>) {
    let mut session = Session::new(Role::Listener, env);
    session.connect(connector.endpoint(), env);
    self.sessions.push(session);
  }

  fn session_mut(&mut self, sid: Sid) -> Option<&mut Session> {
    self.sessions.iter_mut().find(|s| s.sid() == sid)
  }

  fn check_stopped(&self, env: &mut EpEnv<'_>) {
    if self.state == State::Stopping && self.sessions.is_empty() {
      tracing::debug!(eid = env.eid, addr = %self.registration.addr, "Inproc listener stopped");
      env
        .queue
        .raise(Event::Endpoint(env.eid, EndpointEvent::TransportStopped));
    }
  }
}

impl TransportEndpoint for InprocListener {
  fn stop(&mut self, env: &mut EpEnv<'_>) {
    if self.state != State::Active {
      fsm::bad_action(MACHINE, self.state, "stop");
    }
    self.state = State::Stopping;
    super::unbind(&self.registration);
    for session in self.sessions.iter_mut().filter(|s| !s.is_stopping()) {
      session.stop(env);
    }
    self.check_stopped(env);
  }

  fn handle(&mut self, event: TransportEvent, env: &mut EpEnv<'_>) {
    match event {
      TransportEvent::SessionDisconnected(sid) => {
        if let Some(session) = self.session_mut(sid).filter(|s| !s.is_stopping()) {
          session.stop(env);
        }
      }
      TransportEvent::SessionStopped(sid) => {
        self.sessions.retain(|s| s.sid() != sid);
        self.check_stopped(env);
      }
    }
  }

  fn deliver(&mut self, envelope: Envelope, env: &mut EpEnv<'_>) {
    let Envelope { to, from, cmd } = envelope;
    let Some(sid) = to.sid else {
      match (self.state, cmd) {
        (State::Active, PeerCommand::Connect) => {
          let mut session = Session::new(Role::Listener, env);
          tracing::debug!(eid = env.eid, sid = session.sid(), "Inproc listener accepting client");
          session.accept(from, env);
          self.sessions.push(session);
        }
        (State::Stopping, PeerCommand::Connect) => env.queue.bounce(Envelope {
          to,
          from,
          cmd: PeerCommand::Connect,
        }),
        (_, PeerCommand::Disconnect) => {
          tracing::trace!(eid = env.eid, "Ignoring disconnect addressed to listener");
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

#[cfg(test)]
mod tests {
  use super::*;
  use crate::runtime::PeerAddr;
  use crate::transport::inproc::testing::Harness;
  use std::sync::Weak;

  fn listener(h: &mut Harness) -> InprocListener {
    InprocListener::new(Registration::new("listener-test", &h.env()))
  }

  fn client() -> PeerAddr {
    PeerAddr::session(Weak::new(), 4, 40)
  }

  fn to_endpoint(cmd: PeerCommand) -> Envelope {
    Envelope {
      to: PeerAddr::endpoint(Weak::new(), 1),
      from: client(),
      cmd,
    }
  }

  #[test]
  fn each_client_gets_a_session() {
    let mut h = Harness::new(1024);
    let mut listener = listener(&mut h);
    listener.deliver(to_endpoint(PeerCommand::Connect), &mut h.env());
    assert_eq!(listener.sessions.len(), 1);
    listener.deliver(
      Envelope {
        to: PeerAddr::session(Weak::new(), 1, 1),
        from: client(),
        cmd: PeerCommand::Accepted,
      },
      &mut h.env(),
    );
    assert_eq!(h.stats.accepted_connections, 1);
    assert_eq!(h.stats.current_connections, 1);
  }

  #[test]
  fn stopping_listener_takes_no_clients() {
    let mut h = Harness::new(1024);
    let mut listener = listener(&mut h);
    listener.stop(&mut h.env());
    assert!(matches!(
      h.drain().as_slice(),
      [Event::Endpoint(1, EndpointEvent::TransportStopped)]
    ));
    listener.deliver(to_endpoint(PeerCommand::Connect), &mut h.env());
    assert!(listener.sessions.is_empty());
    assert_eq!(h.stats.accepted_connections, 0);
  }

  #[test]
  #[should_panic(expected = "inproc listener: illegal action 'stop' in state Stopping")]
  fn stopping_twice_is_fatal() {
    let mut h = Harness::new(1024);
    let mut listener = listener(&mut h);
    listener.stop(&mut h.env());
    listener.stop(&mut h.env());
  }

  #[test]
  #[should_panic(expected = "inproc listener: unexpected event \"Ready\" in state Active")]
  fn handshake_reply_at_the_endpoint_is_fatal() {
    let mut h = Harness::new(1024);
    let mut listener = listener(&mut h);
    listener.deliver(to_endpoint(PeerCommand::Ready), &mut h.env());
  }

  #[test]
  #[should_panic(expected = "inproc listener: illegal action 'send on unknown pipe' in state Active")]
  fn send_on_unknown_pipe_is_fatal() {
    let mut h = Harness::new(1024);
    let mut listener = listener(&mut h);
    let _ = listener.pipe_send(9, Msg::from_static(b"x"), &mut h.queue);
  }
}
