// src/transport/inproc/testing.rs

//! Socket context stand-in for driving inproc machines directly.

use crate::error::NanoError;
use crate::protocol::pair::Pair;
use crate::protocol::Protocol;
use crate::runtime::{Event, EventQueue};
use crate::socket::options::SocketOptions;
use crate::socket::stats::Statistics;
use crate::socket::types::SocketType;
use crate::transport::{EpEnv, Sid};

use std::sync::Weak;

/// Owns everything an `EpEnv` borrows. The endpoint id is always 1 and the
/// protocol is a pair, so at most one pipe attaches at a time.
pub(crate) struct Harness {
  pub protocol: Pair,
  pub queue: EventQueue,
  pub stats: Statistics,
  pub options: SocketOptions,
  pub error: Option<NanoError>,
  pub next_sid: Sid,
}

impl Harness {
  pub(crate) fn new(rcvbuf: usize) -> Self {
    let mut options = SocketOptions::new("test".to_string());
    options.rcvbuf = rcvbuf;
    Self {
      protocol: Pair::new(),
      queue: EventQueue::new(Weak::new()),
      stats: Statistics::default(),
      options,
      error: None,
      next_sid: 0,
    }
  }

  pub(crate) fn env(&mut self) -> EpEnv<'_> {
    let pipe_options = self.options.pipe_options();
    EpEnv::new(
      1,
      SocketType::Pair,
      &mut self.protocol as &mut dyn Protocol,
      &mut self.queue,
      &mut self.stats,
      &self.options,
      pipe_options,
      &mut self.error,
      &mut self.next_sid,
    )
  }

  pub(crate) fn drain(&mut self) -> Vec<Event> {
    std::iter::from_fn(|| self.queue.pop()).collect()
  }
}
