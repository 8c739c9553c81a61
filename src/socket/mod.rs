// src/socket/mod.rs

//! The socket: a protocol, its endpoints and the context that serialises
//! every state machine event for them.
//!
//! All mutable state lives in `SocketCore` behind one lock. A thread enters
//! the context with `with_ctx`, which drains pending events before and after
//! running its closure. Commands posted to other sockets while inside are
//! processed by the same thread right after it has left, one socket at a
//! time, so no thread ever holds two socket locks.

pub(crate) mod core;
pub mod options;
pub mod stats;
pub mod types;

pub(crate) use self::core::{SocketCore, SocketState};

use crate::error::{NanoError, NanoResult};
use crate::global::Handle;
use crate::message::{Flags, Msg};
use crate::protocol::{self, Protocol, SendError};
use crate::runtime::{mailbox, CountDownLatch, Efd, MailboxReceiver, MailboxSender, SocketEvent};
use crate::transport::Eid;
use stats::Statistic;
use types::{Domain, SocketType};

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub(crate) struct SocketShared {
  handle: Handle,
  socket_type: SocketType,
  core: Mutex<SocketCore>,
  mailbox_tx: MailboxSender,
  mailbox_rx: MailboxReceiver,
  pub(crate) sndfd: Efd,
  pub(crate) rcvfd: Efd,
  /// Posted once when the socket machine reaches `Fini`.
  pub(crate) termsem: CountDownLatch,
  /// Posted once when the last hold is released.
  pub(crate) relesem: CountDownLatch,
  /// `SocketState` as of the last context exit, readable without the lock.
  phase: AtomicU8,
  /// Starts at one: the registry's own hold.
  holds: AtomicUsize,
  /// Set once by `close`; no hold is granted afterwards.
  closing: AtomicBool,
}

impl SocketShared {
  pub(crate) fn new(handle: Handle, domain: Domain, socket_type: SocketType) -> Arc<Self> {
    Self::with_protocol(handle, domain, socket_type, protocol::create(domain, socket_type))
  }

  pub(crate) fn with_protocol(
    handle: Handle,
    domain: Domain,
    socket_type: SocketType,
    protocol: Box<dyn Protocol>,
  ) -> Arc<Self> {
    let (mailbox_tx, mailbox_rx) = mailbox();
    let socket = Arc::new_cyclic(|me| Self {
      handle,
      socket_type,
      core: Mutex::new(SocketCore::new(me.clone(), handle, domain, socket_type, protocol)),
      mailbox_tx,
      mailbox_rx,
      sndfd: Efd::new(),
      rcvfd: Efd::new(),
      termsem: CountDownLatch::new(1),
      relesem: CountDownLatch::new(1),
      phase: AtomicU8::new(SocketState::Init as u8),
      holds: AtomicUsize::new(1),
      closing: AtomicBool::new(false),
    });
    socket.with_ctx(|core| core.handle(SocketEvent::Start));
    socket
  }

  pub(crate) fn handle(&self) -> Handle {
    self.handle
  }

  pub(crate) fn socket_type(&self) -> SocketType {
    self.socket_type
  }

  pub(crate) fn mailbox(&self) -> &MailboxSender {
    &self.mailbox_tx
  }

  pub(crate) fn phase(&self) -> SocketState {
    SocketState::from_u8(self.phase.load(Ordering::Acquire))
  }

  pub(crate) fn publish_state(&self, state: SocketState) {
    self.phase.store(state as u8, Ordering::Release);
  }

  /// Runs `f` inside the socket's context.
  pub(crate) fn with_ctx<R>(&self, f: impl FnOnce(&mut SocketCore) -> R) -> R {
    let mut core = self.core.lock();
    core.process(&self.mailbox_rx);
    let result = f(&mut core);
    core.process(&self.mailbox_rx);
    core.leave(self);
    let touched = core.take_touched();
    drop(core);
    pump(touched);
    result
  }

  /// Takes a hold if the socket is still open. Callers serialise this
  /// against `begin_close` through the registry lock.
  pub(crate) fn try_hold(&self) -> bool {
    if self.closing.load(Ordering::Acquire) || !matches!(self.phase(), SocketState::Init | SocketState::Active) {
      return false;
    }
    self.holds.fetch_add(1, Ordering::AcqRel);
    true
  }

  /// Takes the closer's hold and refuses every later one. False if the
  /// socket is already closing.
  pub(crate) fn begin_close(&self) -> bool {
    if !self.try_hold() {
      return false;
    }
    self.closing.store(true, Ordering::Release);
    true
  }

  pub(crate) fn release(&self) {
    let prev = self
      .holds
      .fetch_update(Ordering::AcqRel, Ordering::Acquire, |holds| holds.checked_sub(1));
    match prev {
      Ok(1) => self.relesem.count_down(),
      Ok(_) => {}
      Err(_) => {
        tracing::error!(socket_handle = %self.handle, "Hold released twice");
        panic!("socket {}: released more holds than taken", self.handle);
      }
    }
  }

  pub(crate) fn holds(&self) -> usize {
    self.holds.load(Ordering::Acquire)
  }

  /// Starts the stop machine. Blocked senders and receivers fail with
  /// `BadHandle` from here on.
  pub(crate) fn stop(&self) {
    self.with_ctx(|core| core.handle(SocketEvent::Stop));
  }

  /// Wakes every thread blocked on this socket with `Interrupted`.
  pub(crate) fn interrupt(&self) {
    tracing::debug!(socket_handle = %self.handle, "Interrupting blocked callers");
    self.sndfd.interrupt();
    self.rcvfd.interrupt();
    self.termsem.interrupt();
    self.relesem.interrupt();
  }

  pub(crate) fn add_endpoint(&self, addr: &str, bind: bool) -> NanoResult<Eid> {
    self.with_ctx(|core| core.add_endpoint(addr, bind))
  }

  pub(crate) fn shutdown(&self, eid: Eid) -> NanoResult<()> {
    self.with_ctx(|core| core.shutdown(eid))
  }

  pub(crate) fn send(&self, mut msg: Msg, flags: Flags) -> NanoResult<()> {
    if !self.socket_type.can_send() {
      return Err(NanoError::NotSupported("socket cannot send"));
    }
    let timeout = self.with_ctx(|core| core.options().sndtimeo);
    let deadline = deadline(timeout);
    loop {
      match self.with_ctx(|core| core.try_send(msg)) {
        Ok(()) => return Ok(()),
        Err(SendError::Failed(e)) => return Err(e),
        Err(SendError::Again(back)) => msg = back,
      }
      if flags.contains(Flags::DONTWAIT) {
        return Err(NanoError::WouldBlock);
      }
      tracing::trace!(socket_handle = %self.handle, "Send blocked, waiting for a writable pipe");
      self.sndfd.wait(deadline)?;
    }
  }

  pub(crate) fn recv(&self, flags: Flags) -> NanoResult<Msg> {
    if !self.socket_type.can_recv() {
      return Err(NanoError::NotSupported("socket cannot receive"));
    }
    let timeout = self.with_ctx(|core| core.options().rcvtimeo);
    let deadline = deadline(timeout);
    loop {
      match self.with_ctx(|core| core.try_recv()) {
        Err(NanoError::WouldBlock) => {}
        result => return result,
      }
      if flags.contains(Flags::DONTWAIT) {
        return Err(NanoError::WouldBlock);
      }
      tracing::trace!(socket_handle = %self.handle, "Recv blocked, waiting for a readable pipe");
      self.rcvfd.wait(deadline)?;
    }
  }

  pub(crate) fn set_option(&self, level: i32, option: i32, value: &[u8]) -> NanoResult<()> {
    self.with_ctx(|core| core.set_option(level, option, value))
  }

  pub(crate) fn get_option(&self, level: i32, option: i32) -> NanoResult<Vec<u8>> {
    self.with_ctx(|core| core.get_option(level, option))
  }

  pub(crate) fn statistic(&self, stat: Statistic) -> u64 {
    self.with_ctx(|core| core.statistic(stat))
  }
}

fn deadline(timeout: Option<Duration>) -> Option<Instant> {
  timeout.map(|t| Instant::now() + t)
}

/// Processes the inboxes of sockets that received commands, and of any
/// sockets their handlers post to in turn.
fn pump(mut pending: Vec<Arc<SocketShared>>) {
  while let Some(socket) = pending.pop() {
    let mut core = socket.core.lock();
    core.process(&socket.mailbox_rx);
    core.leave(&socket);
    for next in core.take_touched() {
      if !pending.iter().any(|p| Arc::ptr_eq(p, &next)) {
        pending.push(next);
      }
    }
  }
}
