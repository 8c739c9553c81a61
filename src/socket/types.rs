// src/socket/types.rs

use crate::error::{NanoError, NanoResult};

/// Socket domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
  /// Full protocol semantics.
  Sp = 1,
  /// Raw sockets, used to build devices. Protocol headers are exposed.
  SpRaw = 2,
}

impl Domain {
  pub fn from_id(id: i32) -> NanoResult<Self> {
    match id {
      1 => Ok(Domain::Sp),
      2 => Ok(Domain::SpRaw),
      _ => Err(NanoError::AddrFamilyNotSupported),
    }
  }

  pub fn id(self) -> i32 {
    self as i32
  }
}

/// Represents the type of a socket, defining its messaging pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketType {
  /// One-to-one, bidirectional (Pair pattern).
  Pair,
  /// Publish messages to subscribers (Pub-Sub pattern).
  Pub,
  /// Subscribe to messages from publishers (Pub-Sub pattern).
  Sub,
  /// Distribute messages to a pool of workers (Pipeline pattern).
  Push,
  /// Collect messages from a pool of distributors (Pipeline pattern).
  Pull,
  /// Every message goes to every peer (Bus pattern).
  Bus,
}

impl SocketType {
  /// Protocol identifier: `family * 16 + role`.
  pub fn id(self) -> i32 {
    match self {
      SocketType::Pair => 16,
      SocketType::Pub => 32,
      SocketType::Sub => 33,
      SocketType::Push => 80,
      SocketType::Pull => 81,
      SocketType::Bus => 112,
    }
  }

  pub fn from_id(id: i32) -> NanoResult<Self> {
    match id {
      16 => Ok(SocketType::Pair),
      32 => Ok(SocketType::Pub),
      33 => Ok(SocketType::Sub),
      80 => Ok(SocketType::Push),
      81 => Ok(SocketType::Pull),
      112 => Ok(SocketType::Bus),
      _ => Err(NanoError::InvalidArgument(format!("unknown protocol {}", id))),
    }
  }

  /// The protocol id this socket type talks to.
  pub(crate) fn peer_id(self) -> i32 {
    match self {
      SocketType::Pair => 16,
      SocketType::Pub => 33,
      SocketType::Sub => 32,
      SocketType::Push => 81,
      SocketType::Pull => 80,
      SocketType::Bus => 112,
    }
  }

  /// Whether a socket of this type accepts `other` as a peer.
  pub(crate) fn is_peer(self, other: SocketType) -> bool {
    (self.id() & 0xfff0) == (other.id() & 0xfff0) && self.peer_id() == other.id()
  }

  pub(crate) fn can_send(self) -> bool {
    !matches!(self, SocketType::Sub | SocketType::Pull)
  }

  pub(crate) fn can_recv(self) -> bool {
    !matches!(self, SocketType::Pub | SocketType::Push)
  }

  pub fn name(self) -> &'static str {
    match self {
      SocketType::Pair => "PAIR",
      SocketType::Pub => "PUB",
      SocketType::Sub => "SUB",
      SocketType::Push => "PUSH",
      SocketType::Pull => "PULL",
      SocketType::Bus => "BUS",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn peering_is_mutual_within_a_family() {
    assert!(SocketType::Push.is_peer(SocketType::Pull));
    assert!(SocketType::Pull.is_peer(SocketType::Push));
    assert!(SocketType::Pair.is_peer(SocketType::Pair));
    assert!(SocketType::Bus.is_peer(SocketType::Bus));
    assert!(!SocketType::Push.is_peer(SocketType::Push));
    assert!(!SocketType::Pub.is_peer(SocketType::Pull));
    assert!(!SocketType::Pair.is_peer(SocketType::Bus));
  }

  #[test]
  fn ids_round_trip() {
    for t in [
      SocketType::Pair,
      SocketType::Pub,
      SocketType::Sub,
      SocketType::Push,
      SocketType::Pull,
      SocketType::Bus,
    ] {
      assert_eq!(SocketType::from_id(t.id()).unwrap(), t);
    }
    assert!(SocketType::from_id(48).is_err());
    assert_eq!(Domain::from_id(3), Err(NanoError::AddrFamilyNotSupported));
  }
}
