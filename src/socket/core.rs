// src/socket/core.rs

use crate::endpoint::{Endpoint, EndpointState, SocketParts};
use crate::error::{NanoError, NanoResult};
use crate::global::Handle;
use crate::message::Msg;
use crate::pipe::{PipeId, PipeStatus};
use crate::protocol::{PipeIo, Protocol, Readiness, SendError};
use crate::runtime::fsm;
use crate::runtime::{EndpointEvent, Envelope, Event, EventQueue, MailboxReceiver, SocketEvent};
use crate::socket::options::{self, SocketOptions};
use crate::socket::stats::{Statistic, Statistics};
use crate::socket::types::{Domain, SocketType};
use crate::socket::SocketShared;
use crate::transport::{self, Eid, OptionSet, Sid};

use std::collections::HashMap;
use std::sync::Weak;

/// Lifecycle of a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum SocketState {
  Init = 0,
  Active = 1,
  /// Waiting for every endpoint to finish stopping.
  StoppingEndpoints = 2,
  /// Waiting for the protocol to finish stopping.
  Stopping = 3,
  Fini = 4,
}

impl SocketState {
  pub(crate) fn from_u8(v: u8) -> Self {
    match v {
      0 => SocketState::Init,
      1 => SocketState::Active,
      2 => SocketState::StoppingEndpoints,
      3 => SocketState::Stopping,
      _ => SocketState::Fini,
    }
  }
}

/// Everything guarded by the socket's lock.
pub(crate) struct SocketCore {
  handle: Handle,
  state: SocketState,
  domain: Domain,
  socket_type: SocketType,
  protocol: Box<dyn Protocol>,
  queue: EventQueue,
  stats: Statistics,
  options: SocketOptions,
  endpoints: Vec<Endpoint>,
  /// Endpoints removed by `shutdown` or `close` that are still stopping.
  stopping: Vec<Endpoint>,
  next_eid: Eid,
  next_sid: Sid,
  option_sets: HashMap<i32, Box<dyn OptionSet>>,
  efds_stopped: bool,
  fini_signalled: bool,
}

impl SocketCore {
  pub(crate) fn new(
    me: Weak<SocketShared>,
    handle: Handle,
    domain: Domain,
    socket_type: SocketType,
    protocol: Box<dyn Protocol>,
  ) -> Self {
    Self {
      handle,
      state: SocketState::Init,
      domain,
      socket_type,
      protocol,
      queue: EventQueue::new(me),
      stats: Statistics::default(),
      options: SocketOptions::new(handle.index().to_string()),
      endpoints: Vec::new(),
      stopping: Vec::new(),
      next_eid: 1,
      next_sid: 0,
      option_sets: HashMap::new(),
      efds_stopped: false,
      fini_signalled: false,
    }
  }

  #[cfg(test)]
  pub(crate) fn state(&self) -> SocketState {
    self.state
  }

  pub(crate) fn options(&self) -> &SocketOptions {
    &self.options
  }

  /// The socket machine.
  pub(crate) fn handle(&mut self, event: SocketEvent) {
    tracing::trace!(socket_handle = %self.handle, state = ?self.state, ?event, "Socket event");
    match (self.state, event) {
      (SocketState::Init, SocketEvent::Start) => self.state = SocketState::Active,
      (SocketState::Active, SocketEvent::Stop) => self.stop_endpoints(),
      (SocketState::Active | SocketState::StoppingEndpoints, SocketEvent::PipeIn(pipe)) => self.protocol.pipe_in(pipe),
      (SocketState::Active | SocketState::StoppingEndpoints, SocketEvent::PipeOut(pipe)) => {
        self.protocol.pipe_out(pipe)
      }
      (SocketState::Stopping | SocketState::Fini, SocketEvent::PipeIn(_) | SocketEvent::PipeOut(_)) => {
        tracing::trace!(socket_handle = %self.handle, "Discarding pipe readiness after shutdown");
      }
      (SocketState::Active, SocketEvent::EndpointStopped(eid)) => self.remove_stopped(eid),
      (SocketState::StoppingEndpoints, SocketEvent::EndpointStopped(eid)) => {
        self.remove_stopped(eid);
        if self.stopping.is_empty() {
          self.stop_protocol();
        }
      }
      (SocketState::Stopping, SocketEvent::ProtocolStopped) => self.finish(),
      (state, event) => fsm::bad_transition("socket", state, event),
    }
  }

  fn stop_endpoints(&mut self) {
    tracing::debug!(
      socket_handle = %self.handle,
      endpoints = self.endpoints.len(),
      stopping = self.stopping.len(),
      "Socket stopping endpoints"
    );
    self.state = SocketState::StoppingEndpoints;
    let eids: Vec<Eid> = self.endpoints.iter().map(Endpoint::eid).collect();
    self.stopping.append(&mut self.endpoints);
    for eid in eids {
      self.with_endpoint(eid, |ep, parts| ep.handle(EndpointEvent::Stop, parts));
    }
    if self.stopping.is_empty() {
      self.stop_protocol();
    }
  }

  fn remove_stopped(&mut self, eid: Eid) {
    let before = self.stopping.len();
    self.stopping.retain(|ep| ep.eid() != eid);
    if self.stopping.len() == before {
      fsm::bad_transition("socket", self.state, SocketEvent::EndpointStopped(eid));
    }
  }

  fn stop_protocol(&mut self) {
    self.state = SocketState::Stopping;
    self.protocol.stop();
    if self.protocol.poll_stopped() {
      self.finish();
    } else {
      tracing::debug!(socket_handle = %self.handle, "Waiting for protocol to stop");
    }
  }

  fn finish(&mut self) {
    self.state = SocketState::Fini;
    tracing::debug!(socket_handle = %self.handle, "Socket stopped");
  }

  /// Runs `f` against an endpoint from either list, lending it the rest of
  /// the socket.
  fn with_endpoint<R>(&mut self, eid: Eid, f: impl FnOnce(&mut Endpoint, &mut SocketParts<'_>) -> R) -> Option<R> {
    let SocketCore {
      socket_type,
      protocol,
      queue,
      stats,
      options,
      endpoints,
      stopping,
      next_sid,
      ..
    } = self;
    let ep = endpoints
      .iter_mut()
      .chain(stopping.iter_mut())
      .find(|ep| ep.eid() == eid)?;
    let mut parts = SocketParts {
      socket_type: *socket_type,
      protocol: protocol.as_mut(),
      queue,
      stats,
      options,
      next_sid,
    };
    Some(f(ep, &mut parts))
  }

  fn has_endpoint(&self, eid: Eid) -> bool {
    self.endpoints.iter().chain(self.stopping.iter()).any(|ep| ep.eid() == eid)
  }

  fn dispatch(&mut self, event: Event) {
    match event {
      Event::Socket(event) => self.handle(event),
      Event::Endpoint(eid, event) => {
        if self
          .with_endpoint(eid, |ep, parts| ep.handle(event, parts))
          .is_none()
        {
          fsm::bad_transition("socket", self.state, Event::Endpoint(eid, event));
        }
      }
      Event::Transport(eid, event) => {
        if self
          .with_endpoint(eid, |ep, parts| ep.transport_event(event, parts))
          .is_none()
        {
          fsm::bad_transition("socket", self.state, Event::Transport(eid, event));
        }
      }
    }
  }

  fn deliver(&mut self, envelope: Envelope) {
    let eid = envelope.to.eid;
    if self.has_endpoint(eid) {
      self.with_endpoint(eid, move |ep, parts| ep.deliver(envelope, parts));
    } else {
      tracing::trace!(socket_handle = %self.handle, eid, cmd = envelope.cmd.name(), "No such endpoint");
      self.queue.bounce(envelope);
    }
  }

  /// Drains local events and the inbox until both are empty.
  pub(crate) fn process(&mut self, inbox: &MailboxReceiver) {
    loop {
      while let Some(event) = self.queue.pop() {
        self.dispatch(event);
      }
      if self.state == SocketState::Stopping && self.protocol.poll_stopped() {
        self.queue.raise(Event::Socket(SocketEvent::ProtocolStopped));
        continue;
      }
      match inbox.try_recv() {
        Ok(envelope) => self.deliver(envelope),
        Err(_) => break,
      }
    }
  }

  /// Publishes the outcome of a context visit to the threads outside it.
  pub(crate) fn leave(&mut self, shared: &SocketShared) {
    shared.publish_state(self.state);
    match self.state {
      SocketState::Init => {}
      SocketState::Active => {
        let events = self.protocol.events();
        if events.contains(Readiness::IN) {
          shared.rcvfd.signal();
        } else {
          shared.rcvfd.unsignal();
        }
        if events.contains(Readiness::OUT) {
          shared.sndfd.signal();
        } else {
          shared.sndfd.unsignal();
        }
      }
      SocketState::StoppingEndpoints | SocketState::Stopping | SocketState::Fini => {
        if !self.efds_stopped {
          self.efds_stopped = true;
          shared.sndfd.stop();
          shared.rcvfd.stop();
        }
        if self.state == SocketState::Fini && !self.fini_signalled {
          self.fini_signalled = true;
          shared.termsem.count_down();
        }
      }
    }
  }

  pub(crate) fn take_touched(&mut self) -> Vec<std::sync::Arc<SocketShared>> {
    self.queue.take_touched()
  }

  fn check_active(&self) -> NanoResult<()> {
    match self.state {
      SocketState::Active => Ok(()),
      _ => Err(NanoError::BadHandle),
    }
  }

  pub(crate) fn add_endpoint(&mut self, addr: &str, bind: bool) -> NanoResult<Eid> {
    self.check_active()?;
    let eid = self.next_eid;
    let mut parts = SocketParts {
      socket_type: self.socket_type,
      protocol: self.protocol.as_mut(),
      queue: &mut self.queue,
      stats: &mut self.stats,
      options: &self.options,
      next_sid: &mut self.next_sid,
    };
    let mut ep = Endpoint::create(eid, addr, bind, &mut parts)?;
    ep.handle(EndpointEvent::Start, &mut parts);
    self.next_eid += 1;
    tracing::debug!(
      socket_handle = %self.handle,
      eid,
      addr = %ep.addr(),
      bind = ep.is_bind(),
      "Endpoint added"
    );
    self.endpoints.push(ep);
    Ok(eid)
  }

  pub(crate) fn shutdown(&mut self, eid: Eid) -> NanoResult<()> {
    self.check_active()?;
    let pos = self
      .endpoints
      .iter()
      .position(|ep| ep.eid() == eid && ep.state() == EndpointState::Active)
      .ok_or_else(|| NanoError::InvalidArgument(format!("no endpoint with id {}", eid)))?;
    let ep = self.endpoints.remove(pos);
    tracing::debug!(socket_handle = %self.handle, eid, addr = %ep.addr(), "Shutting down endpoint");
    self.stopping.push(ep);
    self.with_endpoint(eid, |ep, parts| ep.handle(EndpointEvent::Stop, parts));
    Ok(())
  }

  /// One send attempt. A message the protocol could not place comes back in
  /// `SendError::Again`.
  pub(crate) fn try_send(&mut self, msg: Msg) -> Result<(), SendError> {
    self.check_active()?;
    let size = msg.size();
    let mut pipes = PipeRouter {
      endpoints: &mut self.endpoints,
      stopping: &mut self.stopping,
      queue: &mut self.queue,
    };
    self.protocol.send(msg, &mut pipes)?;
    self.stats.record_sent(size);
    self.stats.current_snd_priority = self.protocol.send_priority();
    Ok(())
  }

  /// One receive attempt; `WouldBlock` when nothing is readable.
  pub(crate) fn try_recv(&mut self) -> NanoResult<Msg> {
    self.check_active()?;
    let mut pipes = PipeRouter {
      endpoints: &mut self.endpoints,
      stopping: &mut self.stopping,
      queue: &mut self.queue,
    };
    let msg = self.protocol.recv(&mut pipes)?;
    self.stats.record_received(msg.size());
    Ok(msg)
  }

  pub(crate) fn set_option(&mut self, level: i32, option: i32, value: &[u8]) -> NanoResult<()> {
    self.check_active()?;
    match level {
      options::SOL_SOCKET => match option {
        options::DOMAIN | options::PROTOCOL => Err(NanoError::NoSuchOption { level, option }),
        _ => self.options.set(option, value),
      },
      level if level > 0 => self.protocol.set_option(level, option, value),
      level => self.option_set(level, option)?.set(option, value),
    }
  }

  pub(crate) fn get_option(&mut self, level: i32, option: i32) -> NanoResult<Vec<u8>> {
    self.check_active()?;
    match level {
      options::SOL_SOCKET => match option {
        options::DOMAIN => Ok(self.domain.id().to_ne_bytes().to_vec()),
        options::PROTOCOL => Ok(self.socket_type.id().to_ne_bytes().to_vec()),
        _ => self.options.get(option),
      },
      level if level > 0 => self.protocol.get_option(level, option),
      level => self.option_set(level, option)?.get(option),
    }
  }

  /// The option set of the transport owning `level`, created on first use.
  fn option_set(&mut self, level: i32, option: i32) -> NanoResult<&mut Box<dyn OptionSet>> {
    use std::collections::hash_map::Entry;
    match self.option_sets.entry(level) {
      Entry::Occupied(entry) => Ok(entry.into_mut()),
      Entry::Vacant(entry) => {
        let set = transport::find_by_id(level)
          .and_then(|t| t.option_set())
          .ok_or(NanoError::NoSuchOption { level, option })?;
        Ok(entry.insert(set))
      }
    }
  }

  pub(crate) fn statistic(&self, stat: Statistic) -> u64 {
    self.stats.get(stat)
  }
}

/// Routes the protocol's pipe operations to the endpoint owning each pipe.
struct PipeRouter<'a> {
  endpoints: &'a mut Vec<Endpoint>,
  stopping: &'a mut Vec<Endpoint>,
  queue: &'a mut EventQueue,
}

impl PipeRouter<'_> {
  fn endpoint<'e>(endpoints: &'e mut [Endpoint], stopping: &'e mut [Endpoint], pipe: PipeId) -> Option<&'e mut Endpoint> {
    endpoints
      .iter_mut()
      .chain(stopping.iter_mut())
      .find(|ep| ep.eid() == pipe.eid)
  }
}

impl PipeIo for PipeRouter<'_> {
  fn send(&mut self, pipe: PipeId, msg: Msg) -> NanoResult<PipeStatus> {
    match Self::endpoint(self.endpoints, self.stopping, pipe) {
      Some(ep) => ep.pipe_send(pipe.sid, msg, self.queue),
      None => fsm::bad_action("socket", pipe, "send on a pipe of an unknown endpoint"),
    }
  }

  fn recv(&mut self, pipe: PipeId) -> NanoResult<(Msg, PipeStatus)> {
    match Self::endpoint(self.endpoints, self.stopping, pipe) {
      Some(ep) => ep.pipe_recv(pipe.sid, self.queue),
      None => fsm::bad_action("socket", pipe, "recv on a pipe of an unknown endpoint"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::protocol::testing::options as pipe_options;
  use std::sync::atomic::{AtomicBool, Ordering};
  use std::sync::Arc;

  /// Protocol whose stop completes only once `release` is set.
  struct SlowStop {
    release: Arc<AtomicBool>,
  }

  impl Protocol for SlowStop {
    fn add(&mut self, _pipe: PipeId, _options: &crate::pipe::PipeOptions) -> NanoResult<()> {
      Ok(())
    }
    fn remove(&mut self, _pipe: PipeId) {}
    fn pipe_in(&mut self, _pipe: PipeId) {}
    fn pipe_out(&mut self, _pipe: PipeId) {}
    fn events(&self) -> Readiness {
      Readiness::empty()
    }
    fn send(&mut self, msg: Msg, _pipes: &mut dyn PipeIo) -> Result<(), SendError> {
      Err(SendError::Again(msg))
    }
    fn recv(&mut self, _pipes: &mut dyn PipeIo) -> NanoResult<Msg> {
      Err(NanoError::WouldBlock)
    }
    fn poll_stopped(&mut self) -> bool {
      self.release.load(Ordering::SeqCst)
    }
  }

  fn slow_socket() -> (Arc<SocketShared>, Arc<AtomicBool>) {
    let release = Arc::new(AtomicBool::new(false));
    let protocol = Box::new(SlowStop {
      release: release.clone(),
    });
    let socket = SocketShared::with_protocol(Handle::new(0, 0), Domain::Sp, SocketType::Pair, protocol);
    (socket, release)
  }

  #[test]
  fn deferred_protocol_stop_holds_socket_in_stopping() {
    let (socket, release) = slow_socket();
    socket.stop();
    assert_eq!(socket.with_ctx(|core| core.state()), SocketState::Stopping);
    assert_eq!(socket.termsem.get_count(), 1);

    release.store(true, Ordering::SeqCst);
    assert_eq!(socket.with_ctx(|core| core.state()), SocketState::Fini);
    assert_eq!(socket.termsem.get_count(), 0);
  }

  #[test]
  fn stopping_socket_refuses_operations() {
    let (socket, _release) = slow_socket();
    socket.stop();
    assert_eq!(socket.with_ctx(|core| core.try_recv()), Err(NanoError::BadHandle));
    assert_eq!(
      socket.with_ctx(|core| core.add_endpoint("inproc://refused", true)),
      Err(NanoError::BadHandle)
    );
  }

  #[test]
  #[should_panic(expected = "socket: unexpected event ProtocolStopped in state Active")]
  fn protocol_stopped_while_active_is_fatal() {
    let (socket, _release) = slow_socket();
    socket.with_ctx(|core| core.handle(SocketEvent::ProtocolStopped));
  }

  #[test]
  #[should_panic(expected = "socket: unexpected event Start in state Active")]
  fn double_start_is_fatal() {
    let (socket, _release) = slow_socket();
    socket.with_ctx(|core| core.handle(SocketEvent::Start));
  }

  #[test]
  fn read_only_and_routed_options() {
    let (socket, _release) = slow_socket();
    socket.with_ctx(|core| {
      assert_eq!(
        core.get_option(options::SOL_SOCKET, options::PROTOCOL).unwrap(),
        16i32.to_ne_bytes().to_vec()
      );
      assert_eq!(
        core.set_option(options::SOL_SOCKET, options::DOMAIN, &2i32.to_ne_bytes()),
        Err(NanoError::NoSuchOption {
          level: options::SOL_SOCKET,
          option: options::DOMAIN
        })
      );
      // No transport owns level -99.
      assert_eq!(
        core.get_option(-99, 1),
        Err(NanoError::NoSuchOption { level: -99, option: 1 })
      );
      assert!(core.options().pipe_options() == pipe_options(8, 8));
    });
  }
}
