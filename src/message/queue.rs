// src/message/queue.rs

use crate::message::Msg;

use std::collections::VecDeque;

/// Messages per chunk.
const GRANULARITY: usize = 126;

struct Chunk {
  slots: Box<[Option<Msg>]>,
}

impl Chunk {
  fn new() -> Box<Self> {
    Box::new(Chunk {
      slots: (0..GRANULARITY).map(|_| None).collect(),
    })
  }
}

/// Bounded FIFO of inbound messages for one session.
///
/// Storage is a list of fixed-size chunks. A drained chunk is kept as a
/// spare so a steady stream does not allocate. `mem` never exceeds
/// `maxmem`, except that an empty queue always admits one message.
pub(crate) struct MsgQueue {
  chunks: VecDeque<Box<Chunk>>,
  /// Read position in the front chunk.
  head: usize,
  /// Write position in the back chunk.
  tail: usize,
  spare: Option<Box<Chunk>>,
  count: usize,
  mem: usize,
  maxmem: usize,
}

impl MsgQueue {
  pub(crate) fn new(maxmem: usize) -> Self {
    let mut chunks = VecDeque::new();
    chunks.push_back(Chunk::new());
    Self {
      chunks,
      head: 0,
      tail: 0,
      spare: None,
      count: 0,
      mem: 0,
      maxmem,
    }
  }

  /// Appends a message. A full queue hands the message back.
  pub(crate) fn send(&mut self, msg: Msg) -> Result<(), Msg> {
    let size = msg.queued_size();
    if self.count > 0 && self.mem + size > self.maxmem {
      return Err(msg);
    }

    if self.tail == GRANULARITY {
      let chunk = self.spare.take().unwrap_or_else(Chunk::new);
      self.chunks.push_back(chunk);
      self.tail = 0;
    }
    if let Some(back) = self.chunks.back_mut() {
      back.slots[self.tail] = Some(msg);
    }
    self.tail += 1;
    self.count += 1;
    self.mem += size;
    Ok(())
  }

  /// Removes the oldest message.
  pub(crate) fn recv(&mut self) -> Option<Msg> {
    if self.count == 0 {
      return None;
    }
    let msg = self.chunks.front_mut().and_then(|front| front.slots[self.head].take())?;
    self.head += 1;
    self.count -= 1;
    self.mem -= msg.queued_size();

    if self.head == GRANULARITY {
      if let Some(done) = self.chunks.pop_front() {
        if self.spare.is_none() {
          self.spare = Some(done);
        }
      }
      self.head = 0;
    }
    // The back chunk doubles as the front once everything is drained.
    if self.chunks.is_empty() {
      self.chunks.push_back(self.spare.take().unwrap_or_else(Chunk::new));
      self.tail = 0;
    }
    Some(msg)
  }

  pub(crate) fn is_empty(&self) -> bool {
    self.count == 0
  }

  pub(crate) fn len(&self) -> usize {
    self.count
  }

  #[cfg(test)]
  pub(crate) fn mem(&self) -> usize {
    self.mem
  }
}

impl std::fmt::Debug for MsgQueue {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("MsgQueue")
      .field("count", &self.count)
      .field("mem", &self.mem)
      .field("maxmem", &self.maxmem)
      .field("chunks", &self.chunks.len())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn msg_of(len: usize, tag: u8) -> Msg {
    Msg::from_vec(vec![tag; len])
  }

  #[test]
  fn fifo_order_across_chunk_boundaries() {
    let mut q = MsgQueue::new(usize::MAX);
    for i in 0..(GRANULARITY * 3 + 5) {
      q.send(Msg::from_vec((i as u32).to_be_bytes().to_vec())).unwrap();
    }
    for i in 0..(GRANULARITY * 3 + 5) {
      let m = q.recv().unwrap();
      assert_eq!(m.body(), (i as u32).to_be_bytes());
    }
    assert!(q.recv().is_none());
    assert_eq!(q.mem(), 0);
  }

  #[test]
  fn full_queue_returns_message() {
    let mut q = MsgQueue::new(100);
    q.send(msg_of(60, 1)).unwrap();
    let rejected = q.send(msg_of(60, 2)).unwrap_err();
    assert_eq!(rejected.body()[0], 2);
    assert_eq!(q.len(), 1);
    q.send(msg_of(40, 3)).unwrap();
    assert_eq!(q.mem(), 100);
  }

  #[test]
  fn oversized_message_admitted_only_when_empty() {
    let mut q = MsgQueue::new(10);
    q.send(msg_of(1000, 1)).unwrap();
    assert!(q.send(msg_of(1, 2)).is_err());
    assert_eq!(q.recv().unwrap().size(), 1000);
    q.send(msg_of(1, 3)).unwrap();
    assert!(q.mem() <= 10);
  }

  #[test]
  fn mem_never_exceeds_bound_after_mixed_traffic() {
    let mut q = MsgQueue::new(256);
    for round in 0..2_000usize {
      let len = (round * 37) % 90;
      let _ = q.send(msg_of(len, round as u8));
      if round % 3 == 0 {
        q.recv();
      }
      assert!(q.mem() <= 256 || q.len() == 1);
    }
  }

  #[test]
  fn drained_chunk_is_cached_as_spare() {
    let mut q = MsgQueue::new(usize::MAX);
    for _ in 0..GRANULARITY + 1 {
      q.send(msg_of(1, 0)).unwrap();
    }
    for _ in 0..GRANULARITY {
      q.recv().unwrap();
    }
    assert!(q.spare.is_some());
    assert_eq!(q.chunks.len(), 1);
  }
}
