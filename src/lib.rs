//! `mailsift` — read messages from a mailbox, walk their MIME structure,
//! save attachments and archive each message as an `.eml` file.
//!
//! The library is built around a [`store::transport::MailTransport`] that
//! reports message structure and serves individual parts, the
//! [`extract::MessageAssembler`] that turns one message into an
//! [`model::message::ExtractedMessage`], and the [`fetch`] driver that runs
//! a batch over a folder.

pub mod config;
pub mod error;
pub mod error_log;
pub mod export;
pub mod extract;
pub mod fetch;
pub mod model;
pub mod parser;
pub mod store;
