//! Message parsing: MBOX scanning, header decoding, and MIME structure.

pub mod header;
pub mod mbox;
pub mod structure;
