// src/socket/stats.rs

use crate::error::{NanoError, NanoResult};

/// Counters exposed through `get_statistic`, numbered as in nanomsg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Statistic {
  EstablishedConnections = 101,
  AcceptedConnections = 102,
  DroppedConnections = 103,
  BrokenConnections = 104,
  ConnectErrors = 105,
  BindErrors = 106,
  AcceptErrors = 107,
  CurrentConnections = 201,
  InprogressConnections = 202,
  CurrentEpErrors = 203,
  MessagesSent = 301,
  MessagesReceived = 302,
  BytesSent = 303,
  BytesReceived = 304,
  CurrentSndPriority = 401,
}

impl Statistic {
  pub fn from_id(id: i32) -> NanoResult<Self> {
    use Statistic::*;
    Ok(match id {
      101 => EstablishedConnections,
      102 => AcceptedConnections,
      103 => DroppedConnections,
      104 => BrokenConnections,
      105 => ConnectErrors,
      106 => BindErrors,
      107 => AcceptErrors,
      201 => CurrentConnections,
      202 => InprogressConnections,
      203 => CurrentEpErrors,
      301 => MessagesSent,
      302 => MessagesReceived,
      303 => BytesSent,
      304 => BytesReceived,
      401 => CurrentSndPriority,
      _ => return Err(NanoError::InvalidArgument(format!("unknown statistic {}", id))),
    })
  }
}

/// Per-socket counters. Mutated only inside the socket's context.
#[derive(Debug, Clone, Default)]
pub(crate) struct Statistics {
  pub established_connections: u64,
  pub accepted_connections: u64,
  pub dropped_connections: u64,
  pub broken_connections: u64,
  pub connect_errors: u64,
  pub bind_errors: u64,
  pub accept_errors: u64,
  pub current_connections: u64,
  pub inprogress_connections: u64,
  pub current_ep_errors: u64,
  pub messages_sent: u64,
  pub messages_received: u64,
  pub bytes_sent: u64,
  pub bytes_received: u64,
  /// None until the first send picked a priority.
  pub current_snd_priority: Option<u8>,
}

impl Statistics {
  pub(crate) fn get(&self, stat: Statistic) -> u64 {
    match stat {
      Statistic::EstablishedConnections => self.established_connections,
      Statistic::AcceptedConnections => self.accepted_connections,
      Statistic::DroppedConnections => self.dropped_connections,
      Statistic::BrokenConnections => self.broken_connections,
      Statistic::ConnectErrors => self.connect_errors,
      Statistic::BindErrors => self.bind_errors,
      Statistic::AcceptErrors => self.accept_errors,
      Statistic::CurrentConnections => self.current_connections,
      Statistic::InprogressConnections => self.inprogress_connections,
      Statistic::CurrentEpErrors => self.current_ep_errors,
      Statistic::MessagesSent => self.messages_sent,
      Statistic::MessagesReceived => self.messages_received,
      Statistic::BytesSent => self.bytes_sent,
      Statistic::BytesReceived => self.bytes_received,
      // -1 in the C API
      Statistic::CurrentSndPriority => self.current_snd_priority.map_or(u64::MAX, u64::from),
    }
  }

  pub(crate) fn record_sent(&mut self, bytes: usize) {
    self.messages_sent += 1;
    self.bytes_sent += bytes as u64;
  }

  pub(crate) fn record_received(&mut self, bytes: usize) {
    self.messages_received += 1;
    self.bytes_received += bytes as u64;
  }
}
