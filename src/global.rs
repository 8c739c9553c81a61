// src/global.rs

//! Process-wide socket registry.
//!
//! Sockets are addressed by `Handle`: a slot index plus the slot's
//! generation, so a handle left over from a closed socket never reaches
//! the socket that later reuses its slot. Every public call takes a hold on
//! the socket for its duration; `close` waits for all holds to be released
//! before the slot is freed.

use crate::error::{NanoError, NanoResult};
use crate::socket::types::{Domain, SocketType};
use crate::socket::SocketShared;
use crate::transport;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Maximum number of sockets open at once.
pub const MAX_SOCKETS: usize = 512;

/// Environment variable that raises endpoint errors to `warn` level.
const PRINT_ERRORS_ENV: &str = "NN_PRINT_ERRORS";

/// Identifies an open socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
  index: u16,
  generation: u32,
}

impl Handle {
  pub(crate) fn new(index: u16, generation: u32) -> Self {
    Self { index, generation }
  }

  /// Slot number; also the default `SOCKET_NAME`.
  pub fn index(&self) -> usize {
    self.index as usize
  }
}

impl fmt::Display for Handle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}#{}", self.index, self.generation)
  }
}

#[derive(Default)]
struct Slot {
  generation: u32,
  socket: Option<Arc<SocketShared>>,
}

#[derive(Default)]
struct Registry {
  slots: Vec<Slot>,
  free: Vec<u16>,
  count: usize,
  /// Set by `term`; new sockets are refused until `init`.
  terminating: bool,
}

impl Registry {
  fn lookup(&self, handle: Handle) -> NanoResult<&Arc<SocketShared>> {
    self
      .slots
      .get(handle.index())
      .filter(|slot| slot.generation == handle.generation)
      .and_then(|slot| slot.socket.as_ref())
      .ok_or(NanoError::BadHandle)
  }
}

static REGISTRY: Lazy<Mutex<Registry>> = Lazy::new(|| Mutex::new(Registry::default()));

/// Held by `term` for its whole run so `init` can wait it out.
static TERM_LOCK: Mutex<()> = parking_lot::const_mutex(());

static PRINT_ERRORS: AtomicBool = AtomicBool::new(false);

pub(crate) fn print_errors() -> bool {
  PRINT_ERRORS.load(Ordering::Relaxed)
}

/// A counted reference that keeps the socket from being freed.
pub(crate) struct SocketHold {
  socket: Arc<SocketShared>,
}

impl Deref for SocketHold {
  type Target = SocketShared;

  fn deref(&self) -> &SocketShared {
    &self.socket
  }
}

impl Drop for SocketHold {
  fn drop(&mut self) {
    self.socket.release();
  }
}

pub(crate) fn create_socket(domain: Domain, socket_type: SocketType) -> NanoResult<Handle> {
  register(domain, socket_type, |handle| SocketShared::new(handle, domain, socket_type))
}

fn register(
  domain: Domain,
  socket_type: SocketType,
  make: impl FnOnce(Handle) -> Arc<SocketShared>,
) -> NanoResult<Handle> {
  let mut registry = REGISTRY.lock();
  if registry.terminating {
    return Err(NanoError::Terminating);
  }
  if registry.count >= MAX_SOCKETS {
    return Err(NanoError::TooManySockets);
  }
  if registry.count == 0 {
    start_library();
  }

  let index = match registry.free.pop() {
    Some(index) => index,
    None => {
      registry.slots.push(Slot::default());
      (registry.slots.len() - 1) as u16
    }
  };
  let generation = registry.slots[index as usize].generation;
  let handle = Handle::new(index, generation);
  let socket = make(handle);
  registry.slots[index as usize].socket = Some(socket);
  registry.count += 1;
  tracing::debug!(
    socket_handle = %handle,
    domain = ?domain,
    socket_type = socket_type.name(),
    "Socket created"
  );
  Ok(handle)
}

fn start_library() {
  let print = std::env::var_os(PRINT_ERRORS_ENV).is_some_and(|v| !v.is_empty());
  PRINT_ERRORS.store(print, Ordering::Relaxed);
  for transport in transport::transports() {
    transport.init();
  }
  tracing::debug!(print_errors = print, "Library initialised");
}

fn stop_library() {
  for transport in transport::transports() {
    transport.term();
  }
  tracing::debug!("Library shut down, no sockets left");
}

/// Takes a hold on an open socket.
pub(crate) fn hold(handle: Handle) -> NanoResult<SocketHold> {
  let registry = REGISTRY.lock();
  let socket = registry.lookup(handle)?;
  if !socket.try_hold() {
    return Err(NanoError::BadHandle);
  }
  Ok(SocketHold { socket: socket.clone() })
}

/// Stops the socket and waits until it can be freed.
///
/// On `Interrupted` the teardown carries on in the background and the
/// handle is already unusable.
pub(crate) fn close(handle: Handle) -> NanoResult<()> {
  let socket = {
    let registry = REGISTRY.lock();
    let socket = registry.lookup(handle)?.clone();
    if !socket.begin_close() {
      return Err(NanoError::BadHandle);
    }
    socket
  };
  // Stopping reaches into peer sockets, so it runs outside the registry lock.
  socket.stop();
  // The registry's hold and the one just taken.
  socket.release();
  socket.release();
  tracing::debug!(socket_handle = %handle, holds = socket.holds(), "Closing socket");

  let waited = socket
    .termsem
    .await_interruptible()
    .and_then(|()| socket.relesem.await_interruptible());
  if let Err(e) = waited {
    tracing::debug!(socket_handle = %handle, "Close interrupted, finishing in the background");
    let reaper = socket.clone();
    std::thread::Builder::new()
      .name(format!("rnano-reaper-{}", handle.index()))
      .spawn(move || {
        reaper.termsem.await_();
        reaper.relesem.await_();
        free(handle, &reaper);
      })
      .map_err(|spawn_err| NanoError::Internal(spawn_err.to_string()))?;
    return Err(e);
  }
  free(handle, &socket);
  Ok(())
}

fn free(handle: Handle, socket: &SocketShared) {
  // Barrier: whoever is still inside the context leaves before the slot goes.
  socket.with_ctx(|_| ());
  let mut registry = REGISTRY.lock();
  let slot = &mut registry.slots[handle.index()];
  slot.socket = None;
  slot.generation = slot.generation.wrapping_add(1);
  registry.free.push(handle.index);
  registry.count -= 1;
  tracing::debug!(
    socket_handle = %handle,
    socket_type = socket.socket_type().name(),
    remaining = registry.count,
    "Socket closed"
  );
  if registry.count == 0 {
    stop_library();
  }
}

/// Wakes every thread blocked on the socket with `Interrupted`.
pub(crate) fn interrupt(handle: Handle) -> NanoResult<()> {
  let socket = REGISTRY.lock().lookup(handle)?.clone();
  socket.interrupt();
  Ok(())
}

/// Re-enables socket creation after `term`.
pub(crate) fn init() {
  let _term = TERM_LOCK.lock();
  REGISTRY.lock().terminating = false;
}

/// Refuses new sockets and closes every open one.
pub(crate) fn term() {
  let _term = TERM_LOCK.lock();
  let handles: Vec<Handle> = {
    let mut registry = REGISTRY.lock();
    registry.terminating = true;
    registry
      .slots
      .iter()
      .filter_map(|slot| slot.socket.as_ref())
      .map(|socket| socket.handle())
      .collect()
  };
  tracing::debug!(sockets = handles.len(), "Terminating library");
  for handle in handles {
    match close(handle) {
      Ok(()) | Err(NanoError::BadHandle) => {}
      Err(e) => tracing::debug!(socket_handle = %handle, error = %e, "Close during term failed"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::message::{Flags, Msg};
  use crate::pipe::{PipeId, PipeOptions};
  use crate::protocol::{PipeIo, Protocol, Readiness, SendError};
  use std::time::Duration;

  #[test]
  fn stale_handles_are_rejected() {
    let handle = create_socket(Domain::Sp, SocketType::Pair).unwrap();
    close(handle).unwrap();
    assert!(matches!(hold(handle), Err(NanoError::BadHandle)));
    assert_eq!(close(handle), Err(NanoError::BadHandle));

    let reused = create_socket(Domain::Sp, SocketType::Pair).unwrap();
    assert!(matches!(hold(handle), Err(NanoError::BadHandle)));
    close(reused).unwrap();
  }

  #[test]
  fn holds_are_balanced() {
    let handle = create_socket(Domain::Sp, SocketType::Push).unwrap();
    {
      let first = hold(handle).unwrap();
      let second = hold(handle).unwrap();
      assert_eq!(first.holds(), 3);
      drop(second);
      assert_eq!(first.holds(), 2);
    }
    assert_eq!(hold(handle).unwrap().holds(), 2);
    close(handle).unwrap();
  }

  #[test]
  fn close_waits_for_outstanding_holds() {
    let handle = create_socket(Domain::Sp, SocketType::Pull).unwrap();
    let held = hold(handle).unwrap();
    let closer = std::thread::spawn(move || close(handle));
    std::thread::sleep(std::time::Duration::from_millis(50));
    assert!(!closer.is_finished());
    // Operations on the stopping socket fail but the hold keeps it alive.
    assert_eq!(held.recv(Flags::DONTWAIT), Err(NanoError::BadHandle));
    drop(held);
    assert_eq!(closer.join().unwrap(), Ok(()));
  }

  #[test]
  fn interrupted_close_finishes_in_background() {
    let handle = create_socket(Domain::Sp, SocketType::Pair).unwrap();
    let held = hold(handle).unwrap();
    let closer = std::thread::spawn(move || close(handle));
    std::thread::sleep(std::time::Duration::from_millis(50));
    held.interrupt();
    assert_eq!(closer.join().unwrap(), Err(NanoError::Interrupted));
    assert!(matches!(hold(handle), Err(NanoError::BadHandle)));
    drop(held);
  }

  #[test]
  #[should_panic(expected = "released more holds than taken")]
  fn over_release_is_fatal() {
    let socket = SocketShared::new(Handle::new(u16::MAX, 0), Domain::Sp, SocketType::Pair);
    socket.release();
    socket.release();
  }

  /// Pair-like protocol that checks, while the socket stops, whether the
  /// registry is free for other callers.
  struct RegistryCheck {
    registry_free: Arc<AtomicBool>,
  }

  impl Protocol for RegistryCheck {
    fn add(&mut self, _pipe: PipeId, _options: &PipeOptions) -> NanoResult<()> {
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
    fn stop(&mut self) {
      let free = REGISTRY.try_lock_for(Duration::from_secs(1)).is_some();
      self.registry_free.store(free, Ordering::SeqCst);
    }
  }

  #[test]
  fn close_stops_the_socket_outside_the_registry_lock() {
    let registry_free = Arc::new(AtomicBool::new(false));
    let protocol = RegistryCheck {
      registry_free: registry_free.clone(),
    };
    let handle = register(Domain::Sp, SocketType::Pair, |handle| {
      SocketShared::with_protocol(handle, Domain::Sp, SocketType::Pair, Box::new(protocol))
    })
    .unwrap();
    close(handle).unwrap();
    assert!(registry_free.load(Ordering::SeqCst));
  }

  #[test]
  fn a_closing_socket_grants_no_new_holds() {
    let handle = create_socket(Domain::Sp, SocketType::Pull).unwrap();
    let held = hold(handle).unwrap();
    let closer = std::thread::spawn(move || close(handle));
    std::thread::sleep(Duration::from_millis(50));
    assert!(matches!(hold(handle), Err(NanoError::BadHandle)));
    assert_eq!(close(handle), Err(NanoError::BadHandle));
    drop(held);
    assert_eq!(closer.join().unwrap(), Ok(()));
  }

  #[test]
  fn send_on_receive_only_socket_is_unsupported() {
    let handle = create_socket(Domain::Sp, SocketType::Sub).unwrap();
    let socket = hold(handle).unwrap();
    assert!(matches!(
      socket.send(Msg::from_static(b"x"), Flags::DONTWAIT),
      Err(NanoError::NotSupported(_))
    ));
    drop(socket);
    close(handle).unwrap();
  }
}
