// src/runtime/ctx.rs

use crate::pipe::PipeId;
use crate::runtime::command::{Envelope, Event, PeerAddr, PeerCommand, SocketEvent};
use crate::socket::SocketShared;

use async_channel::TrySendError;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};

/// Pending work of one socket context.
///
/// Handlers never call into each other directly. They raise local events
/// here, and the context drains them one at a time after the handler
/// returns. Commands for other sockets go straight into the target's inbox.
/// The target is remembered so the caller can drain its inbox once it has
/// left its own context.
pub(crate) struct EventQueue {
  me: Weak<SocketShared>,
  local: VecDeque<Event>,
  touched: Vec<Arc<SocketShared>>,
}

impl EventQueue {
  pub(crate) fn new(me: Weak<SocketShared>) -> Self {
    Self {
      me,
      local: VecDeque::new(),
      touched: Vec::new(),
    }
  }

  /// The socket this queue belongs to.
  pub(crate) fn me(&self) -> &Weak<SocketShared> {
    &self.me
  }

  pub(crate) fn raise(&mut self, event: Event) {
    tracing::trace!(?event, "Raising local event");
    self.local.push_back(event);
  }

  pub(crate) fn pop(&mut self) -> Option<Event> {
    self.local.pop_front()
  }

  #[cfg(test)]
  pub(crate) fn has_local(&self) -> bool {
    !self.local.is_empty()
  }

  /// Drops readiness events still queued for a pipe that just stopped.
  pub(crate) fn cancel_pipe(&mut self, pipe: PipeId) {
    self.local.retain(|event| {
      !matches!(
        event,
        Event::Socket(SocketEvent::PipeIn(p)) | Event::Socket(SocketEvent::PipeOut(p)) if *p == pipe
      )
    });
  }

  /// Posts a command to a peer. An unreachable peer is answered with a
  /// `Disconnect` on its behalf.
  pub(crate) fn post(&mut self, to: &PeerAddr, from: &PeerAddr, cmd: PeerCommand) {
    tracing::trace!(?to, ?from, cmd = cmd.name(), "Posting peer command");
    let envelope = Envelope {
      to: to.clone(),
      from: from.clone(),
      cmd,
    };
    let Some(target) = to.socket.upgrade() else {
      self.bounce(envelope);
      return;
    };
    match target.mailbox().try_send(envelope) {
      Ok(()) => {
        if !self.touched.iter().any(|s| Arc::ptr_eq(s, &target)) {
          self.touched.push(target);
        }
      }
      Err(TrySendError::Closed(envelope)) | Err(TrySendError::Full(envelope)) => self.bounce(envelope),
    }
  }

  /// Answers an undeliverable envelope: the sender gets a `Disconnect` as if
  /// the missing target had sent it. Undeliverable disconnects are dropped.
  pub(crate) fn bounce(&mut self, envelope: Envelope) {
    let Envelope { to, from, cmd } = envelope;
    if matches!(cmd, PeerCommand::Disconnect) {
      tracing::trace!(?to, ?from, "Dropping undeliverable disconnect");
      return;
    }
    tracing::debug!(?to, ?from, cmd = cmd.name(), "Peer unreachable, bouncing disconnect");
    self.post(&from, &to, PeerCommand::Disconnect);
  }

  /// Sockets whose inbox received commands since the last call.
  pub(crate) fn take_touched(&mut self) -> Vec<Arc<SocketShared>> {
    std::mem::take(&mut self.touched)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::runtime::command::EndpointEvent;

  #[test]
  fn cancel_pipe_removes_only_that_pipes_readiness() {
    let mut queue = EventQueue::new(Weak::new());
    let a = PipeId { eid: 1, sid: 1 };
    let b = PipeId { eid: 1, sid: 2 };
    queue.raise(Event::Socket(SocketEvent::PipeOut(a)));
    queue.raise(Event::Socket(SocketEvent::PipeIn(b)));
    queue.raise(Event::Socket(SocketEvent::PipeIn(a)));
    queue.raise(Event::Endpoint(1, EndpointEvent::TransportStopped));
    queue.cancel_pipe(a);
    assert!(matches!(queue.pop(), Some(Event::Socket(SocketEvent::PipeIn(p))) if p == b));
    assert!(matches!(queue.pop(), Some(Event::Endpoint(1, EndpointEvent::TransportStopped))));
    assert!(queue.pop().is_none());
  }

  #[test]
  fn commands_to_vanished_sockets_are_absorbed() {
    let mut queue = EventQueue::new(Weak::new());
    let gone = PeerAddr::session(Weak::new(), 3, 9);
    let me = PeerAddr::session(Weak::new(), 1, 1);
    // Both ends are unreachable: the bounced disconnect is dropped.
    queue.post(&gone, &me, PeerCommand::Ready);
    assert!(queue.take_touched().is_empty());
    assert!(!queue.has_local());
  }
}
