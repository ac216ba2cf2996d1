//! Per-message records: what the transport reports, and what extraction produces.

use super::address::{AddressEntry, MailboxAddress};

/// Summary metadata for a message (distinct from its full headers).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overview {
    /// Raw `Subject:` value, possibly RFC 2047 encoded.
    pub subject: Option<String>,
    /// Raw `Date:` value.
    pub date: Option<String>,
    /// `Message-ID:` value with its angle brackets, e.g. `<abc@example.com>`.
    pub message_id: String,
    pub uid: u32,
    /// Bracketed message IDs from the `References` header.
    pub references: Vec<String>,
}

/// Parsed address headers plus the raw header block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderInfo {
    pub from: Vec<MailboxAddress>,
    pub cc: Vec<MailboxAddress>,
    /// Header block byte for byte, including the terminating blank line.
    pub raw: Vec<u8>,
}

/// Decoded bodies of one message.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct MessageBody {
    /// Plain-text body, HTML-escaped with `<br />` line breaks.
    pub text: Option<String>,
    pub html: Option<String>,
}

/// Raw header and body, decoded for display. The archive file is written
/// from the undecoded bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RawMail {
    pub header: String,
    pub body: String,
}

/// Everything extracted from one message.
///
/// Built once by the assembler and not modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ExtractedMessage {
    pub subject: String,
    /// Unix timestamp of the `Date:` header (0 if missing or unparseable).
    pub date: i64,
    pub message_id: String,
    pub message_number: u32,
    pub uid: u32,
    pub references: Vec<String>,
    pub from: Vec<AddressEntry>,
    pub cc: Vec<AddressEntry>,
    pub message: MessageBody,
    /// Saved attachment filenames, in walk order.
    pub attachments: Vec<String>,
    /// Whether follow-up actions (delete/move) should run for this message.
    pub process: bool,
    /// Name of the archive file written for this message, if any.
    pub archive: Option<String>,
    pub raw: RawMail,
}

impl ExtractedMessage {
    /// First sender address, or an empty string.
    pub fn from_address(&self) -> &str {
        self.from.first().map(|a| a.address.as_str()).unwrap_or("")
    }

    pub fn date_utc(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp(self.date, 0).unwrap_or(chrono::DateTime::UNIX_EPOCH)
    }
}
