// src/error.rs

use thiserror::Error;

/// Errors returned by the public API.
///
/// Every variant is recoverable from the caller's point of view. Broken
/// internal invariants are not reported through this type; they panic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive] // Allows adding more variants later without breaking change
pub enum NanoError {
  // --- Handle & State Errors ---
  #[error("Bad socket handle")]
  BadHandle, // EBADF
  #[error("Library is terminating")]
  Terminating, // ETERM
  #[error("Too many open sockets")]
  TooManySockets, // EMFILE

  // --- Flow Errors ---
  #[error("Resource temporarily unavailable")]
  WouldBlock, // EAGAIN
  #[error("Operation timed out")]
  TimedOut, // ETIMEDOUT
  #[error("Operation interrupted")]
  Interrupted, // EINTR

  // --- Endpoint Errors ---
  #[error("Address already in use: {0}")]
  AddrInUse(String), // EADDRINUSE
  #[error("Address is too long: {0}")]
  NameTooLong(String), // ENAMETOOLONG
  #[error("Transport scheme not supported: {0}")]
  ProtocolNotSupported(String), // EPROTONOSUPPORT
  #[error("Address family not supported")]
  AddrFamilyNotSupported, // EAFNOSUPPORT
  #[error("Connection reset by peer")]
  ConnectionReset, // ECONNRESET
  #[error("Socket is already connected")]
  AlreadyConnected, // EISCONN

  // --- Argument & Option Errors ---
  #[error("Invalid argument provided: {0}")]
  InvalidArgument(String), // EINVAL
  #[error("Protocol option not recognized (level {level}, option {option})")]
  NoSuchOption { level: i32, option: i32 }, // ENOPROTOOPT
  #[error("Operation not supported by socket type ({0})")]
  NotSupported(&'static str), // ENOTSUP

  // --- Resource Errors ---
  #[error("Out of memory")]
  NoMemory, // ENOMEM

  // --- Internal Errors ---
  #[error("Internal library error: {0}")]
  Internal(String),
}

/// Convenience alias used across the crate.
pub type NanoResult<T> = Result<T, NanoError>;

impl NanoError {
  /// Maps the error onto the POSIX errno a C caller would observe.
  pub fn errno(&self) -> i32 {
    match self {
      NanoError::BadHandle => libc::EBADF,
      // libc has no ETERM; nanomsg places it in its private errno range.
      NanoError::Terminating => NN_HAUSNUMERO + 53,
      NanoError::TooManySockets => libc::EMFILE,
      NanoError::WouldBlock => libc::EAGAIN,
      NanoError::TimedOut => libc::ETIMEDOUT,
      NanoError::Interrupted => libc::EINTR,
      NanoError::AddrInUse(_) => libc::EADDRINUSE,
      NanoError::NameTooLong(_) => libc::ENAMETOOLONG,
      NanoError::ProtocolNotSupported(_) => libc::EPROTONOSUPPORT,
      NanoError::AddrFamilyNotSupported => libc::EAFNOSUPPORT,
      NanoError::ConnectionReset => libc::ECONNRESET,
      NanoError::AlreadyConnected => libc::EISCONN,
      NanoError::InvalidArgument(_) => libc::EINVAL,
      NanoError::NoSuchOption { .. } => libc::ENOPROTOOPT,
      NanoError::NotSupported(_) => libc::ENOTSUP,
      NanoError::NoMemory => libc::ENOMEM,
      NanoError::Internal(_) => libc::EFAULT,
    }
  }

  /// True for conditions a caller may simply retry.
  pub fn is_retryable(&self) -> bool {
    matches!(self, NanoError::WouldBlock | NanoError::TimedOut | NanoError::Interrupted)
  }
}

const NN_HAUSNUMERO: i32 = 156_384_712;
