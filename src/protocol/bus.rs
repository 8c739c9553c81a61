// src/protocol/bus.rs

use crate::error::{NanoError, NanoResult};
use crate::message::Msg;
use crate::pipe::{PipeId, PipeOptions};
use crate::protocol::patterns::{Distributor, FairQueue};
use crate::protocol::{PipeIo, Protocol, Readiness, SendError};
use crate::socket::types::Domain;

use bytes::{BufMut, Bytes, BytesMut};

/// Length of the SP header a raw BUS socket attaches to received messages.
const PIPE_KEY_LEN: usize = 12;

/// BUS: messages go to every connected peer; receives are fair-queued.
///
/// In the raw domain a received message carries its origin pipe in the SP
/// header, and sending a message with that header skips the origin. This is
/// what lets a device forward traffic without echoing it back.
#[derive(Debug)]
pub(crate) struct Bus {
  raw: bool,
  dist: Distributor,
  fq: FairQueue,
}

impl Bus {
  pub fn new(domain: Domain) -> Self {
    Self {
      raw: domain == Domain::SpRaw,
      dist: Distributor::new(),
      fq: FairQueue::new(),
    }
  }
}

fn encode_pipe(pipe: PipeId) -> Bytes {
  let mut key = BytesMut::with_capacity(PIPE_KEY_LEN);
  key.put_u32(pipe.eid);
  key.put_u64(pipe.sid);
  key.freeze()
}

fn decode_pipe(key: &[u8]) -> Option<PipeId> {
  let eid = u32::from_be_bytes(key.get(0..4)?.try_into().ok()?);
  let sid = u64::from_be_bytes(key.get(4..PIPE_KEY_LEN)?.try_into().ok()?);
  Some(PipeId { eid, sid })
}

impl Protocol for Bus {
  fn add(&mut self, pipe: PipeId, options: &PipeOptions) -> NanoResult<()> {
    self.dist.add(pipe);
    self.fq.add(pipe, options.rcvprio);
    Ok(())
  }

  fn remove(&mut self, pipe: PipeId) {
    self.dist.remove(pipe);
    self.fq.remove(pipe);
  }

  fn pipe_in(&mut self, pipe: PipeId) {
    self.fq.pipe_in(pipe);
  }

  fn pipe_out(&mut self, pipe: PipeId) {
    self.dist.pipe_out(pipe);
  }

  fn events(&self) -> Readiness {
    let mut events = Readiness::OUT;
    events.set(Readiness::IN, self.fq.can_recv());
    events
  }

  fn send(&mut self, mut msg: Msg, pipes: &mut dyn PipeIo) -> Result<(), SendError> {
    let exclude = if self.raw {
      let origin = if msg.sphdr().len() == PIPE_KEY_LEN {
        decode_pipe(msg.sphdr())
      } else {
        None
      };
      msg.set_sphdr(Bytes::new());
      origin
    } else {
      if !msg.sphdr().is_empty() {
        return Err(SendError::Failed(NanoError::InvalidArgument(
          "BUS message must not carry an SP header".into(),
        )));
      }
      None
    };
    self.dist.send(msg, exclude, pipes);
    Ok(())
  }

  fn recv(&mut self, pipes: &mut dyn PipeIo) -> NanoResult<Msg> {
    let (mut msg, pipe) = self.fq.recv(pipes)?;
    if self.raw {
      msg.set_sphdr(encode_pipe(pipe));
    } else {
      msg.set_sphdr(Bytes::new());
    }
    Ok(msg)
  }
}
