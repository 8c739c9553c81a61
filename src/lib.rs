//! rnano - a nanomsg-style scalability protocol core in Rust.
//!
//! Sockets are identified by [`Handle`]s handed out by a process-wide
//! registry. Each socket runs one protocol (pair, pub/sub, pipeline, bus)
//! over any number of endpoints created with [`bind`] and [`connect`].
//! The in-process transport (`inproc://name`) is built in.
//!
//! Calls block the calling thread; [`AsyncSocket`] moves them onto tokio's
//! blocking pool.

mod endpoint;
pub mod error;
mod global;
mod handle;
pub mod message;
mod pipe;
mod protocol;
mod runtime;
mod socket;
mod transport;

pub use error::{NanoError, NanoResult};
pub use global::{Handle, MAX_SOCKETS};
pub use handle::{AsyncSocket, Socket};
pub use message::{Flags, Msg};
pub use socket::options;
pub use socket::stats::Statistic;
pub use socket::types::{Domain, SocketType};
pub use transport::EndpointId;

// --- Top-Level Functions ---

const VERSION_MAJOR: i32 = 0;
const VERSION_MINOR: i32 = 1;
const VERSION_PATCH: i32 = 0;

/// Returns the library version as a tuple (major, minor, patch).
pub fn version() -> (i32, i32, i32) {
  (VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH)
}

/// Returns the major version number of the library.
pub fn version_major() -> i32 {
  VERSION_MAJOR
}

/// Returns the minor version number of the library.
pub fn version_minor() -> i32 {
  VERSION_MINOR
}

/// Returns the patch version number of the library.
pub fn version_patch() -> i32 {
  VERSION_PATCH
}

/// Creates a socket.
pub fn socket(domain: Domain, socket_type: SocketType) -> NanoResult<Handle> {
  global::create_socket(domain, socket_type)
}

/// Closes a socket, waiting until every call in progress on it has
/// returned and every endpoint has shut down.
///
/// Threads blocked in `send`/`recv` on the socket wake with `BadHandle`.
/// If the closing thread is interrupted it gets `Interrupted` and the
/// teardown finishes in the background; the handle is dead either way.
pub fn close(handle: Handle) -> NanoResult<()> {
  global::close(handle)
}

/// Adds a local endpoint the socket accepts connections on.
pub fn bind(handle: Handle, addr: &str) -> NanoResult<EndpointId> {
  global::hold(handle)?.add_endpoint(addr, true)
}

/// Adds a remote endpoint. Succeeds even if nothing listens at `addr` yet.
pub fn connect(handle: Handle, addr: &str) -> NanoResult<EndpointId> {
  global::hold(handle)?.add_endpoint(addr, false)
}

/// Removes an endpoint. Returns without waiting for it to finish stopping.
pub fn shutdown(handle: Handle, endpoint: EndpointId) -> NanoResult<()> {
  global::hold(handle)?.shutdown(endpoint)
}

/// Sends a copy of `buf`. Returns the number of bytes sent.
pub fn send(handle: Handle, buf: &[u8], flags: Flags) -> NanoResult<usize> {
  global::hold(handle)?.send(Msg::copy_from_slice(buf), flags)?;
  Ok(buf.len())
}

/// Receives one message into `buf`.
///
/// A longer message is truncated; the return value is always the full
/// message size.
pub fn recv(handle: Handle, buf: &mut [u8], flags: Flags) -> NanoResult<usize> {
  let msg = global::hold(handle)?.recv(flags)?;
  let body = msg.body();
  let n = body.len().min(buf.len());
  buf[..n].copy_from_slice(&body[..n]);
  Ok(body.len())
}

/// Sends a message without copying its body. Returns the body size.
pub fn send_msg(handle: Handle, msg: Msg, flags: Flags) -> NanoResult<usize> {
  let size = msg.size();
  global::hold(handle)?.send(msg, flags)?;
  Ok(size)
}

/// Receives a whole message, including its protocol header.
pub fn recv_msg(handle: Handle, flags: Flags) -> NanoResult<Msg> {
  global::hold(handle)?.recv(flags)
}

/// Sets an option. `level` is `options::SOL_SOCKET`, a protocol level
/// (positive), or a transport level (negative).
pub fn setsockopt(handle: Handle, level: i32, option: i32, value: &[u8]) -> NanoResult<()> {
  global::hold(handle)?.set_option(level, option, value)
}

pub fn getsockopt(handle: Handle, level: i32, option: i32) -> NanoResult<Vec<u8>> {
  global::hold(handle)?.get_option(level, option)
}

/// Reads one of the socket's counters.
pub fn get_statistic(handle: Handle, stat: Statistic) -> NanoResult<u64> {
  Ok(global::hold(handle)?.statistic(stat))
}

/// Wakes every thread blocked on the socket with `Interrupted`.
pub fn interrupt(handle: Handle) -> NanoResult<()> {
  global::interrupt(handle)
}

/// Re-enables socket creation after [`term`].
pub fn init() {
  global::init()
}

/// Closes every socket and refuses new ones with `Terminating` until
/// [`init`] is called.
pub fn term() {
  global::term()
}
