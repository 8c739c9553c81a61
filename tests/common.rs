// tests/common.rs
#![allow(dead_code)] // Each test binary uses a different subset

use rnano::options::{RCVTIMEO, SNDTIMEO};
use rnano::{Domain, Flags, NanoError, Socket, SocketType};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;
use std::time::Duration;

static INPROC_ENDPOINT_COUNTER: AtomicUsize = AtomicUsize::new(0);

static TRACING_INIT: Once = Once::new();

pub const SHORT_TIMEOUT: Duration = Duration::from_millis(250);
pub const LONG_TIMEOUT: Duration = Duration::from_secs(2);

// Can be overridden by RUST_LOG
fn setup_tracing() {
  TRACING_INIT.call_once(|| {
    let default_filter = "rnano=debug,warn";
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = FmtSubscriber::builder()
      .with_max_level(tracing::Level::TRACE)
      .with_env_filter(env_filter)
      .with_target(true)
      .with_line_number(true)
      .with_test_writer()
      .finish();

    // Another test in the same binary may have won the race.
    let _ = tracing::subscriber::set_global_default(subscriber);
  });
}

/// Creates an SP socket with send and receive timeouts of `LONG_TIMEOUT`,
/// so a broken test fails instead of hanging.
pub fn test_socket(socket_type: SocketType) -> Socket {
  setup_tracing();
  let socket = Socket::new(Domain::Sp, socket_type).expect("Failed to create test socket");
  set_timeouts(&socket, LONG_TIMEOUT);
  socket
}

pub fn set_timeouts(socket: &Socket, timeout: Duration) {
  let ms = (timeout.as_millis() as i32).to_ne_bytes();
  socket.set_option_raw(SNDTIMEO, &ms).expect("Failed to set SNDTIMEO");
  socket.set_option_raw(RCVTIMEO, &ms).expect("Failed to set RCVTIMEO");
}

// Unique per process and per call; tests in one binary run in parallel.
pub fn unique_inproc_endpoint() -> String {
  let pid = std::process::id();
  let count = INPROC_ENDPOINT_COUNTER.fetch_add(1, Ordering::Relaxed);
  format!("inproc://rnano_test_{}_{}", pid, count)
}

pub fn send_bytes(socket: &Socket, body: &[u8]) -> Result<(), NanoError> {
  socket.send(body, Flags::empty()).map(|_| ())
}

pub fn recv_bytes(socket: &Socket) -> Result<Vec<u8>, NanoError> {
  socket.recv_msg(Flags::empty()).map(|msg| msg.body().to_vec())
}

/// Non-blocking receive; `None` when nothing is queued.
pub fn try_recv_bytes(socket: &Socket) -> Option<Vec<u8>> {
  match socket.recv_msg(Flags::DONTWAIT) {
    Ok(msg) => Some(msg.body().to_vec()),
    Err(NanoError::WouldBlock) => None,
    Err(e) => panic!("unexpected recv error: {}", e),
  }
}
