//! Mailbox access: the transport trait and its implementations.

pub mod mbox;
pub mod memory;
pub mod transport;
