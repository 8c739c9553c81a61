// src/message/mod.rs

//! Message container and the chunked inbound queue.

pub mod flags;
pub mod msg;
pub(crate) mod queue;

pub use flags::Flags;
pub use msg::Msg;
pub(crate) use queue::MsgQueue;
