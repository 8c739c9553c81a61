// src/runtime/mailbox.rs

//! Per-socket inbox for commands crossing socket contexts.

use crate::runtime::command::Envelope;

/// The sending end of a socket's inbox. Cloneable.
pub(crate) type MailboxSender = async_channel::Sender<Envelope>;

/// The receiving end of a socket's inbox, drained under the socket's lock.
pub(crate) type MailboxReceiver = async_channel::Receiver<Envelope>;

/// Creates an inbox channel pair.
///
/// Senders push while holding their own socket's lock, so the channel must
/// never make them wait: it is unbounded.
pub(crate) fn mailbox() -> (MailboxSender, MailboxReceiver) {
  async_channel::unbounded()
}
