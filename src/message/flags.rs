// src/message/flags.rs

use bitflags::bitflags;

bitflags! {
  /// Flags accepted by `send` and `recv`.
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
  pub struct Flags: i32 {
    /// Fail with `WouldBlock` instead of waiting.
    const DONTWAIT = 1;
  }
}
