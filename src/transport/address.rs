// src/transport/address.rs

use crate::error::{NanoError, NanoResult};
use crate::transport::{self, Transport};

/// Longest accepted address, terminator included.
pub(crate) const SOCKADDR_MAX: usize = 128;

/// Splits `"<scheme>://<address>"` and resolves the scheme to a transport.
pub(crate) fn parse(addr: &str) -> NanoResult<(&'static dyn Transport, &str)> {
  if addr.len() >= SOCKADDR_MAX {
    return Err(NanoError::NameTooLong(addr.to_string()));
  }
  let invalid = || NanoError::InvalidArgument(format!("malformed address '{}'", addr));

  let Some(separator_pos) = addr.find("://") else {
    return Err(invalid());
  };
  let scheme = &addr[..separator_pos];
  let address_part = &addr[separator_pos + 3..];

  let transport = transport::find(scheme).ok_or_else(|| NanoError::ProtocolNotSupported(addr.to_string()))?;
  if address_part.is_empty() || address_part.contains('\0') {
    tracing::debug!(addr = %addr, "Rejecting empty or NUL-carrying address");
    return Err(invalid());
  }
  Ok((transport, address_part))
}
