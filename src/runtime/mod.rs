// src/runtime/mod.rs

//! Core synchronisation primitives: events, inboxes, readiness and latches.

pub(crate) mod command;
pub(crate) mod ctx;
pub(crate) mod efd;
pub(crate) mod fsm;
pub(crate) mod latch;
pub(crate) mod mailbox;

pub(crate) use command::{EndpointEvent, Envelope, Event, PeerAddr, PeerCommand, SocketEvent, TransportEvent};
pub(crate) use ctx::EventQueue;
pub(crate) use efd::Efd;
pub(crate) use latch::CountDownLatch;
pub(crate) use mailbox::{mailbox, MailboxReceiver, MailboxSender};
