//! The mailbox collaborator consumed by extraction.
//!
//! Everything the extractor knows about a mailbox goes through this trait:
//! listing messages, fetching headers, structure and part bodies, and the
//! post-processing actions (delete, move, expunge).

use std::io::Write;

use tracing::warn;

use crate::error::Result;
use crate::model::message::{HeaderInfo, Overview};
use crate::model::structure::{MimeNode, PartAddress};

/// A selected mailbox folder.
///
/// Messages are addressed by UID. Message numbers (1-based positions) are
/// only used for listing and ordering.
pub trait MailTransport {
    /// Message numbers of every message in the folder, ascending.
    fn search_all(&mut self) -> Result<Vec<u32>>;

    /// UID of the message at `message_number`.
    fn uid_for(&mut self, message_number: u32) -> Result<u32>;

    fn fetch_overview(&mut self, uid: u32) -> Result<Overview>;

    fn fetch_headers(&mut self, uid: u32) -> Result<HeaderInfo>;

    fn fetch_structure(&mut self, uid: u32) -> Result<MimeNode>;

    /// Raw (still transfer-encoded) bytes of a part.
    ///
    /// The root address returns the whole message body after the header block.
    fn fetch_part(&mut self, uid: u32, path: &PartAddress) -> Result<Vec<u8>>;

    /// Stream the raw bytes of a part into `dest`.
    ///
    /// Fetch failures are `Err`. Returns `Ok(false)` when `dest` rejected the
    /// bytes (including a decoding writer refusing malformed input).
    fn save_part_to_stream(
        &mut self,
        uid: u32,
        path: &PartAddress,
        dest: &mut dyn Write,
    ) -> Result<bool> {
        let bytes = self.fetch_part(uid, path)?;
        match dest.write_all(&bytes).and_then(|()| dest.flush()) {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(uid, part = %path, error = %e, "Part could not be written to stream");
                Ok(false)
            }
        }
    }

    /// Flag a message for removal at the next [`expunge`](Self::expunge).
    fn delete_message(&mut self, uid: u32) -> Result<()>;

    /// Copy a message to `target_folder` and flag it for removal here.
    fn move_message(&mut self, uid: u32, target_folder: &str) -> Result<()>;

    /// Permanently remove flagged messages.
    fn expunge(&mut self) -> Result<()>;

    fn list_folders(&mut self) -> Result<Vec<String>>;
}
