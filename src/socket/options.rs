// src/socket/options.rs

use std::time::Duration;

use crate::error::{NanoError, NanoResult};
use crate::pipe::PipeOptions;

// Option levels. Positive levels address the protocol (its socket type id),
// negative levels a transport (its transport id).
pub const SOL_SOCKET: i32 = 0;

// Socket-level options, numbered as in nanomsg.
pub const LINGER: i32 = 1;
pub const SNDBUF: i32 = 2;
pub const RCVBUF: i32 = 3;
pub const SNDTIMEO: i32 = 4;
pub const RCVTIMEO: i32 = 5;
pub const RECONNECT_IVL: i32 = 6;
pub const RECONNECT_IVL_MAX: i32 = 7;
pub const SNDPRIO: i32 = 8;
pub const RCVPRIO: i32 = 9;
pub const DOMAIN: i32 = 12;
pub const PROTOCOL: i32 = 13;
pub const IPV4ONLY: i32 = 14;
pub const SOCKET_NAME: i32 = 15;
pub const RCVMAXSIZE: i32 = 16;
pub const MAXTTL: i32 = 17;

// SUB protocol options (level `SocketType::Sub.id()`).
pub const SUB_SUBSCRIBE: i32 = 1;
pub const SUB_UNSUBSCRIBE: i32 = 2;

const MAX_SOCKET_NAME_LEN: usize = 63;

/// Holds parsed and validated socket-level options.
#[derive(Debug, Clone)]
pub(crate) struct SocketOptions {
  pub linger: Option<Duration>, // None means wait forever
  pub sndbuf: usize,
  pub rcvbuf: usize,
  pub rcvmaxsize: Option<usize>, // None means unlimited
  pub sndtimeo: Option<Duration>,
  pub rcvtimeo: Option<Duration>,
  pub reconnect_ivl: Duration,
  pub reconnect_ivl_max: Duration,
  pub sndprio: u8,
  pub rcvprio: u8,
  pub ipv4only: bool,
  pub maxttl: u8,
  pub socket_name: String,
}

impl SocketOptions {
  /// Defaults for a fresh socket; its name is its handle index.
  pub(crate) fn new(socket_name: String) -> Self {
    Self {
      linger: Some(Duration::from_millis(1000)),
      sndbuf: 128 * 1024,
      rcvbuf: 128 * 1024,
      rcvmaxsize: Some(1024 * 1024),
      sndtimeo: None,
      rcvtimeo: None,
      reconnect_ivl: Duration::from_millis(100),
      reconnect_ivl_max: Duration::ZERO,
      sndprio: 8,
      rcvprio: 8,
      ipv4only: true,
      maxttl: 8,
      socket_name,
    }
  }

  /// Per-pipe options captured when an endpoint is created.
  pub(crate) fn pipe_options(&self) -> PipeOptions {
    PipeOptions {
      sndprio: self.sndprio,
      rcvprio: self.rcvprio,
      ipv4only: self.ipv4only,
    }
  }

  pub(crate) fn set(&mut self, option: i32, value: &[u8]) -> NanoResult<()> {
    match option {
      LINGER => self.linger = parse_duration_ms_option(option, value)?,
      SNDBUF => self.sndbuf = parse_positive_option(option, value)?,
      RCVBUF => self.rcvbuf = parse_positive_option(option, value)?,
      RCVMAXSIZE => {
        self.rcvmaxsize = match parse_i32_option(value)? {
          -1 => None,
          v @ 0.. => Some(v as usize),
          _ => return Err(invalid_value(option)),
        }
      }
      SNDTIMEO => self.sndtimeo = parse_duration_ms_option(option, value)?,
      RCVTIMEO => self.rcvtimeo = parse_duration_ms_option(option, value)?,
      RECONNECT_IVL => self.reconnect_ivl = parse_interval_option(option, value)?,
      RECONNECT_IVL_MAX => self.reconnect_ivl_max = parse_interval_option(option, value)?,
      SNDPRIO => self.sndprio = parse_range_option(option, value, 1, 16)?,
      RCVPRIO => self.rcvprio = parse_range_option(option, value, 1, 16)?,
      IPV4ONLY => self.ipv4only = parse_range_option(option, value, 0, 1)? == 1,
      MAXTTL => self.maxttl = parse_range_option(option, value, 1, 255)?,
      SOCKET_NAME => {
        if value.len() > MAX_SOCKET_NAME_LEN {
          return Err(invalid_value(option));
        }
        self.socket_name = String::from_utf8(value.to_vec()).map_err(|_| invalid_value(option))?;
      }
      DOMAIN | PROTOCOL => {
        return Err(NanoError::InvalidArgument(format!("option {} is read-only", option)));
      }
      _ => {
        return Err(NanoError::NoSuchOption {
          level: SOL_SOCKET,
          option,
        })
      }
    }
    tracing::debug!(option, socket_name = %self.socket_name, "Socket option set");
    Ok(())
  }

  pub(crate) fn get(&self, option: i32) -> NanoResult<Vec<u8>> {
    let int = |v: i32| Ok(v.to_ne_bytes().to_vec());
    match option {
      LINGER => int(duration_to_ms(self.linger)),
      SNDBUF => int(clamp_i32(self.sndbuf)),
      RCVBUF => int(clamp_i32(self.rcvbuf)),
      RCVMAXSIZE => int(self.rcvmaxsize.map_or(-1, clamp_i32)),
      SNDTIMEO => int(duration_to_ms(self.sndtimeo)),
      RCVTIMEO => int(duration_to_ms(self.rcvtimeo)),
      RECONNECT_IVL => int(duration_to_ms(Some(self.reconnect_ivl))),
      RECONNECT_IVL_MAX => int(duration_to_ms(Some(self.reconnect_ivl_max))),
      SNDPRIO => int(self.sndprio as i32),
      RCVPRIO => int(self.rcvprio as i32),
      IPV4ONLY => int(self.ipv4only as i32),
      MAXTTL => int(self.maxttl as i32),
      SOCKET_NAME => Ok(self.socket_name.as_bytes().to_vec()),
      _ => Err(NanoError::NoSuchOption {
        level: SOL_SOCKET,
        option,
      }),
    }
  }
}

fn invalid_value(option: i32) -> NanoError {
  NanoError::InvalidArgument(format!("invalid value for option {}", option))
}

fn clamp_i32(v: usize) -> i32 {
  i32::try_from(v).unwrap_or(i32::MAX)
}

fn duration_to_ms(d: Option<Duration>) -> i32 {
  d.map_or(-1, |d| i32::try_from(d.as_millis()).unwrap_or(i32::MAX))
}

// --- Helper functions for parsing option values ---

/// Parses a byte slice holding a native-endian `i32`, the C API's `int`.
pub(crate) fn parse_i32_option(value: &[u8]) -> NanoResult<i32> {
  let arr: [u8; 4] = value
    .try_into()
    .map_err(|_| NanoError::InvalidArgument(format!("expected 4-byte integer, got {} bytes", value.len())))?;
  Ok(i32::from_ne_bytes(arr))
}

/// Parses a timeout or linger in milliseconds. -1 means infinite.
pub(crate) fn parse_duration_ms_option(option: i32, value: &[u8]) -> NanoResult<Option<Duration>> {
  match parse_i32_option(value)? {
    -1 => Ok(None),
    v @ 0.. => Ok(Some(Duration::from_millis(v as u64))),
    _ => Err(invalid_value(option)),
  }
}

fn parse_interval_option(option: i32, value: &[u8]) -> NanoResult<Duration> {
  match parse_i32_option(value)? {
    v @ 0.. => Ok(Duration::from_millis(v as u64)),
    _ => Err(invalid_value(option)),
  }
}

fn parse_positive_option(option: i32, value: &[u8]) -> NanoResult<usize> {
  match parse_i32_option(value)? {
    v @ 1.. => Ok(v as usize),
    _ => Err(invalid_value(option)),
  }
}

fn parse_range_option(option: i32, value: &[u8], min: i32, max: i32) -> NanoResult<u8> {
  let v = parse_i32_option(value)?;
  if (min..=max).contains(&v) {
    u8::try_from(v).map_err(|_| invalid_value(option))
  } else {
    Err(invalid_value(option))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn int(v: i32) -> [u8; 4] {
    v.to_ne_bytes()
  }

  #[test]
  fn defaults_round_trip_through_get() {
    let opts = SocketOptions::new("7".into());
    assert_eq!(opts.get(LINGER).unwrap(), int(1000));
    assert_eq!(opts.get(SNDBUF).unwrap(), int(131072));
    assert_eq!(opts.get(RCVMAXSIZE).unwrap(), int(1048576));
    assert_eq!(opts.get(SNDTIMEO).unwrap(), int(-1));
    assert_eq!(opts.get(MAXTTL).unwrap(), int(8));
    assert_eq!(opts.get(SOCKET_NAME).unwrap(), b"7");
  }

  #[test]
  fn priorities_are_range_checked() {
    let mut opts = SocketOptions::new("0".into());
    assert!(opts.set(SNDPRIO, &int(0)).is_err());
    assert!(opts.set(RCVPRIO, &int(17)).is_err());
    opts.set(SNDPRIO, &int(1)).unwrap();
    opts.set(RCVPRIO, &int(16)).unwrap();
    assert_eq!(opts.pipe_options().sndprio, 1);
    assert_eq!(opts.pipe_options().rcvprio, 16);
  }

  #[test]
  fn buffers_must_be_positive() {
    let mut opts = SocketOptions::new("0".into());
    assert!(matches!(opts.set(RCVBUF, &int(0)), Err(NanoError::InvalidArgument(_))));
    assert!(matches!(opts.set(SNDBUF, &int(-5)), Err(NanoError::InvalidArgument(_))));
    opts.set(RCVBUF, &int(10)).unwrap();
    assert_eq!(opts.rcvbuf, 10);
  }

  #[test]
  fn rcvmaxsize_accepts_minus_one() {
    let mut opts = SocketOptions::new("0".into());
    opts.set(RCVMAXSIZE, &int(-1)).unwrap();
    assert_eq!(opts.rcvmaxsize, None);
    assert!(opts.set(RCVMAXSIZE, &int(-2)).is_err());
  }

  #[test]
  fn socket_name_length_is_bounded() {
    let mut opts = SocketOptions::new("0".into());
    opts.set(SOCKET_NAME, b"worker").unwrap();
    assert_eq!(opts.get(SOCKET_NAME).unwrap(), b"worker");
    assert!(opts.set(SOCKET_NAME, &[b'x'; 64]).is_err());
  }

  #[test]
  fn unknown_and_malformed_options() {
    let mut opts = SocketOptions::new("0".into());
    assert_eq!(
      opts.set(999, &int(1)),
      Err(NanoError::NoSuchOption {
        level: SOL_SOCKET,
        option: 999
      })
    );
    assert!(matches!(opts.set(LINGER, &[1, 2]), Err(NanoError::InvalidArgument(_))));
    assert!(matches!(opts.set(IPV4ONLY, &int(2)), Err(NanoError::InvalidArgument(_))));
    assert!(matches!(opts.set(MAXTTL, &int(256)), Err(NanoError::InvalidArgument(_))));
  }
}
