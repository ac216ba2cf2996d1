//! Core data model: addresses, MIME structure, and per-message records.

pub mod address;
pub mod message;
pub mod structure;
