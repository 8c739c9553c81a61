// src/message/msg.rs

use bytes::{Bytes, BytesMut};
use std::fmt;

/// A message: protocol header, transport headers and body.
///
/// All three parts are reference-counted `Bytes`, so moving a message is
/// free and duplicating it for fan-out (`bulk_copy`) shares the buffers.
/// Once a message is queued its buffers are never written to again.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Msg {
  sphdr: Bytes,
  hdrs: Bytes,
  body: Bytes,
}

impl Msg {
  /// Creates an empty message.
  pub fn new() -> Self {
    Self::default()
  }

  /// Creates a message from a `Vec<u8>`, taking ownership.
  pub fn from_vec(body: Vec<u8>) -> Self {
    Self::from_bytes(Bytes::from(body))
  }

  /// Creates a message from `bytes::Bytes`.
  pub fn from_bytes(body: Bytes) -> Self {
    Self {
      body,
      ..Default::default()
    }
  }

  /// Creates a message from a static byte slice (zero-copy).
  pub fn from_static(body: &'static [u8]) -> Self {
    Self::from_bytes(Bytes::from_static(body))
  }

  /// Creates a message by copying a byte slice.
  pub fn copy_from_slice(body: &[u8]) -> Self {
    Self::from_bytes(Bytes::copy_from_slice(body))
  }

  /// Creates a message with all three parts given.
  pub fn with_parts(sphdr: Bytes, hdrs: Bytes, body: Bytes) -> Self {
    Self { sphdr, hdrs, body }
  }

  /// The message payload.
  pub fn body(&self) -> &[u8] {
    &self.body
  }

  /// The scalability-protocol header.
  pub fn sphdr(&self) -> &[u8] {
    &self.sphdr
  }

  /// Transport-level headers (ancillary data).
  pub fn hdrs(&self) -> &[u8] {
    &self.hdrs
  }

  pub fn set_sphdr(&mut self, sphdr: Bytes) {
    self.sphdr = sphdr;
  }

  pub fn set_hdrs(&mut self, hdrs: Bytes) {
    self.hdrs = hdrs;
  }

  /// Returns the size of the body in bytes.
  pub fn size(&self) -> usize {
    self.body.len()
  }

  /// Bytes this message accounts for in a queue: header plus body.
  pub(crate) fn queued_size(&self) -> usize {
    self.sphdr.len() + self.body.len()
  }

  /// Returns the body as `Bytes`, dropping the headers.
  pub fn into_body(self) -> Bytes {
    self.body
  }

  /// Produces one more copy of this message for fan-out.
  ///
  /// The copy shares every buffer with the original; only reference counts
  /// change.
  pub(crate) fn bulk_copy(&self) -> Msg {
    self.clone()
  }

  /// Folds the protocol header into the body, as a transport does when it
  /// hands a message to the peer. Transport headers do not cross.
  pub(crate) fn flatten(self) -> Msg {
    if self.sphdr.is_empty() {
      return Msg::from_bytes(self.body);
    }
    let mut merged = BytesMut::with_capacity(self.sphdr.len() + self.body.len());
    merged.extend_from_slice(&self.sphdr);
    merged.extend_from_slice(&self.body);
    Msg::from_bytes(merged.freeze())
  }
}

impl From<Vec<u8>> for Msg {
  fn from(body: Vec<u8>) -> Self {
    Msg::from_vec(body)
  }
}

impl From<&'static [u8]> for Msg {
  fn from(body: &'static [u8]) -> Self {
    Msg::from_static(body)
  }
}

impl fmt::Debug for Msg {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Msg")
      .field("sphdr", &format!("{} bytes", self.sphdr.len()))
      .field("hdrs", &format!("{} bytes", self.hdrs.len()))
      .field("body", &format!("{} bytes", self.body.len())) // Avoid printing large data
      .finish()
  }
}
