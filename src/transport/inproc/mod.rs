// src/transport/inproc/mod.rs

//! In-process transport.
//!
//! Bound and connecting endpoints register by name in a process-wide
//! registry. Whichever side arrives second dials the other: it creates a
//! session and posts `Connect` to the peer endpoint, which accepts with a
//! session of its own. From then on the two sessions talk only through
//! peer commands.

mod connector;
mod listener;
mod session;
#[cfg(test)]
mod testing;

use crate::error::{NanoError, NanoResult};
use crate::runtime::PeerAddr;
use crate::socket::types::SocketType;
use crate::socket::SocketShared;
use crate::transport::{Eid, EpEnv, Transport, TransportEndpoint};

use connector::InprocConnector;
use listener::InprocListener;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Weak;

/// Option level of the in-process transport.
pub(crate) const INPROC: i32 = -1;

pub(crate) struct InprocTransport;

impl Transport for InprocTransport {
  fn name(&self) -> &'static str {
    "inproc"
  }

  fn id(&self) -> i32 {
    INPROC
  }

  fn term(&self) {
    let registry = REGISTRY.lock();
    tracing::debug!(
      bound = registry.bound.len(),
      connecting = registry.connecting.len(),
      "Inproc transport terminated"
    );
  }

  fn bind(&self, addr: &str, env: &mut EpEnv<'_>) -> NanoResult<Box<dyn TransportEndpoint>> {
    let registration = Registration::new(addr, env);
    let connectors = bind(registration.clone())?;
    tracing::debug!(eid = env.eid, addr = %addr, waiting = connectors.len(), "Inproc endpoint bound");
    let mut listener = InprocListener::new(registration);
    for connector in &connectors {
      listener.dial(connector, env);
    }
    Ok(Box::new(listener))
  }

  fn connect(&self, addr: &str, env: &mut EpEnv<'_>) -> NanoResult<Box<dyn TransportEndpoint>> {
    let registration = Registration::new(addr, env);
    let mut connector = InprocConnector::new(registration.clone(), env);
    match connect(registration) {
      Lookup::Found(binder) => connector.dial(&binder, env),
      Lookup::Incompatible(bound_type) => env.set_error(NanoError::InvalidArgument(format!(
        "'{}' is bound by an incompatible {} socket",
        addr,
        bound_type.name()
      ))),
      Lookup::Missing => tracing::debug!(eid = env.eid, addr = %addr, "Inproc connect pending, no listener yet"),
    }
    Ok(Box::new(connector))
  }
}

/// One endpoint in the name registry.
#[derive(Debug, Clone)]
pub(super) struct Registration {
  addr: String,
  socket: Weak<SocketShared>,
  eid: Eid,
  socket_type: SocketType,
}

impl Registration {
  fn new(addr: &str, env: &EpEnv<'_>) -> Self {
    Self {
      addr: addr.to_string(),
      socket: env.queue.me().clone(),
      eid: env.eid,
      socket_type: env.socket_type,
    }
  }

  pub(super) fn endpoint(&self) -> PeerAddr {
    PeerAddr::endpoint(self.socket.clone(), self.eid)
  }

  fn is(&self, other: &Registration) -> bool {
    Weak::ptr_eq(&self.socket, &other.socket) && self.eid == other.eid
  }

  /// Both sides must accept each other.
  fn compatible(&self, other: &Registration) -> bool {
    self.socket_type.is_peer(other.socket_type) && other.socket_type.is_peer(self.socket_type)
  }
}

#[derive(Default)]
struct Registry {
  bound: HashMap<String, Registration>,
  connecting: Vec<Registration>,
}

static REGISTRY: Lazy<Mutex<Registry>> = Lazy::new(|| Mutex::new(Registry::default()));

enum Lookup {
  Found(Registration),
  Incompatible(SocketType),
  Missing,
}

/// Registers a listener. Returns the compatible connectors already waiting
/// for this name; the listener dials each of them.
fn bind(registration: Registration) -> NanoResult<Vec<Registration>> {
  let mut registry = REGISTRY.lock();
  if registry.bound.contains_key(&registration.addr) {
    return Err(NanoError::AddrInUse(format!("inproc://{}", registration.addr)));
  }
  let waiting = registry
    .connecting
    .iter()
    .filter(|c| c.addr == registration.addr && c.compatible(&registration))
    .cloned()
    .collect();
  registry.bound.insert(registration.addr.clone(), registration);
  Ok(waiting)
}

/// Registers a connector and reports the listener it should dial, if any.
fn connect(registration: Registration) -> Lookup {
  let mut registry = REGISTRY.lock();
  let lookup = match registry.bound.get(&registration.addr) {
    Some(binder) if binder.compatible(&registration) => Lookup::Found(binder.clone()),
    Some(binder) => Lookup::Incompatible(binder.socket_type),
    None => Lookup::Missing,
  };
  registry.connecting.push(registration);
  lookup
}

fn unbind(registration: &Registration) {
  let mut registry = REGISTRY.lock();
  if registry
    .bound
    .get(&registration.addr)
    .is_some_and(|bound| bound.is(registration))
  {
    registry.bound.remove(&registration.addr);
  }
}

fn disconnect(registration: &Registration) {
  REGISTRY.lock().connecting.retain(|c| !c.is(registration));
}
