//! Export functionality: archival `.eml` files.

pub mod eml;
