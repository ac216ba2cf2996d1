//! Content extraction: walk a message's MIME structure, decode its bodies,
//! save its attachments and assemble the result.

pub mod assemble;
pub mod classify;
pub mod codec;
pub mod filename;
pub mod inline;
pub mod walker;

pub use assemble::{AssembleOptions, MessageAssembler};
pub use inline::InlineMode;
pub use walker::{BodyAccumulator, Deadline, WalkOptions};
