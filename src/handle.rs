// src/handle.rs

use crate::error::{NanoError, NanoResult};
use crate::global::Handle;
use crate::message::{Flags, Msg};
use crate::socket::options::SOL_SOCKET;
use crate::socket::stats::Statistic;
use crate::socket::types::{Domain, SocketType};
use crate::transport::EndpointId;

use std::sync::Arc;

/// An owned socket. Closed when dropped; inside a tokio runtime the close
/// runs on a separate thread so the dropping worker never waits on it.
#[derive(Debug)]
pub struct Socket {
  handle: Handle,
  closed: bool,
}

impl Socket {
  pub fn new(domain: Domain, socket_type: SocketType) -> NanoResult<Self> {
    Ok(Self {
      handle: crate::socket(domain, socket_type)?,
      closed: false,
    })
  }

  pub fn handle(&self) -> Handle {
    self.handle
  }

  pub fn bind(&self, addr: &str) -> NanoResult<EndpointId> {
    crate::bind(self.handle, addr)
  }

  pub fn connect(&self, addr: &str) -> NanoResult<EndpointId> {
    crate::connect(self.handle, addr)
  }

  pub fn shutdown(&self, endpoint: EndpointId) -> NanoResult<()> {
    crate::shutdown(self.handle, endpoint)
  }

  pub fn send(&self, buf: &[u8], flags: Flags) -> NanoResult<usize> {
    crate::send(self.handle, buf, flags)
  }

  pub fn recv(&self, buf: &mut [u8], flags: Flags) -> NanoResult<usize> {
    crate::recv(self.handle, buf, flags)
  }

  pub fn send_msg(&self, msg: Msg, flags: Flags) -> NanoResult<usize> {
    crate::send_msg(self.handle, msg, flags)
  }

  pub fn recv_msg(&self, flags: Flags) -> NanoResult<Msg> {
    crate::recv_msg(self.handle, flags)
  }

  /// Sets a socket-level option from its raw byte representation.
  pub fn set_option_raw(&self, option: i32, value: &[u8]) -> NanoResult<()> {
    crate::setsockopt(self.handle, SOL_SOCKET, option, value)
  }

  pub fn get_option_raw(&self, option: i32) -> NanoResult<Vec<u8>> {
    crate::getsockopt(self.handle, SOL_SOCKET, option)
  }

  /// Sets an integer option at any level.
  pub fn set_int_option(&self, level: i32, option: i32, value: i32) -> NanoResult<()> {
    crate::setsockopt(self.handle, level, option, &value.to_ne_bytes())
  }

  pub fn get_int_option(&self, level: i32, option: i32) -> NanoResult<i32> {
    let raw = crate::getsockopt(self.handle, level, option)?;
    let bytes: [u8; 4] = raw
      .as_slice()
      .try_into()
      .map_err(|_| NanoError::InvalidArgument(format!("option {} is not an integer", option)))?;
    Ok(i32::from_ne_bytes(bytes))
  }

  pub fn statistic(&self, stat: Statistic) -> NanoResult<u64> {
    crate::get_statistic(self.handle, stat)
  }

  pub fn interrupt(&self) -> NanoResult<()> {
    crate::interrupt(self.handle)
  }

  /// Closes the socket and reports the outcome, unlike dropping it.
  pub fn close(mut self) -> NanoResult<()> {
    self.closed = true;
    crate::close(self.handle)
  }
}

impl Drop for Socket {
  fn drop(&mut self) {
    if self.closed {
      return;
    }
    let handle = self.handle;
    if tokio::runtime::Handle::try_current().is_ok() {
      let spawned = std::thread::Builder::new()
        .name(format!("rnano-close-{}", handle.index()))
        .spawn(move || close_on_drop(handle));
      match spawned {
        Ok(_) => return,
        Err(e) => tracing::debug!(socket_handle = %handle, error = %e, "Close thread unavailable, closing inline"),
      }
    }
    close_on_drop(handle);
  }
}

fn close_on_drop(handle: Handle) {
  if let Err(e) = crate::close(handle) {
    tracing::debug!(socket_handle = %handle, error = %e, "Close on drop failed");
  }
}

/// Async facade over [`Socket`]. Each call runs on tokio's blocking pool,
/// so a blocked `recv` never stalls the runtime's worker threads.
#[derive(Debug, Clone)]
pub struct AsyncSocket {
  inner: Arc<Socket>,
}

fn join_error(e: tokio::task::JoinError) -> NanoError {
  NanoError::Internal(format!("blocking task failed: {}", e))
}

impl AsyncSocket {
  pub fn new(domain: Domain, socket_type: SocketType) -> NanoResult<Self> {
    Ok(Self::from_socket(Socket::new(domain, socket_type)?))
  }

  pub fn from_socket(socket: Socket) -> Self {
    Self { inner: Arc::new(socket) }
  }

  pub fn handle(&self) -> Handle {
    self.inner.handle()
  }

  async fn blocking<T, F>(&self, f: F) -> NanoResult<T>
  where
    T: Send + 'static,
    F: FnOnce(&Socket) -> NanoResult<T> + Send + 'static,
  {
    let inner = self.inner.clone();
    tokio::task::spawn_blocking(move || f(&inner)).await.map_err(join_error)?
  }

  pub async fn bind(&self, addr: &str) -> NanoResult<EndpointId> {
    let addr = addr.to_string();
    self.blocking(move |s| s.bind(&addr)).await
  }

  pub async fn connect(&self, addr: &str) -> NanoResult<EndpointId> {
    let addr = addr.to_string();
    self.blocking(move |s| s.connect(&addr)).await
  }

  pub async fn shutdown(&self, endpoint: EndpointId) -> NanoResult<()> {
    self.blocking(move |s| s.shutdown(endpoint)).await
  }

  pub async fn send(&self, msg: Msg) -> NanoResult<()> {
    self.blocking(move |s| s.send_msg(msg, Flags::empty()).map(|_| ())).await
  }

  pub async fn recv(&self) -> NanoResult<Msg> {
    self.blocking(|s| s.recv_msg(Flags::empty())).await
  }

  pub async fn set_option(&self, option: i32, value: &[u8]) -> NanoResult<()> {
    let value = value.to_vec();
    self.blocking(move |s| s.set_option_raw(option, &value)).await
  }

  pub async fn get_option(&self, option: i32) -> NanoResult<Vec<u8>> {
    self.blocking(move |s| s.get_option_raw(option)).await
  }

  pub async fn statistic(&self, stat: Statistic) -> NanoResult<u64> {
    self.blocking(move |s| s.statistic(stat)).await
  }

  /// Closes the socket. Other clones of this handle see `BadHandle` from
  /// then on.
  pub async fn close(&self) -> NanoResult<()> {
    let handle = self.inner.handle();
    tokio::task::spawn_blocking(move || crate::close(handle))
      .await
      .map_err(join_error)?
  }
}
