//! Turn one mailbox message into an [`ExtractedMessage`].

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::Result;
use crate::error_log::ErrorSink;
use crate::export::eml::{write_archive, ArchiveTemplate};
use crate::extract::inline::{rewrite, InlineMode};
use crate::extract::walker::{walk, BodyAccumulator, Deadline, WalkContext, WalkOptions};
use crate::model::address::{AddressEntry, MailboxAddress};
use crate::model::message::{ExtractedMessage, MessageBody, RawMail};
use crate::model::structure::PartAddress;
use crate::parser::header::{decode_encoded_words, decode_header_bytes, parse_date};
use crate::store::transport::MailTransport;

/// Per-run settings for message assembly.
#[derive(Debug, Clone)]
pub struct AssembleOptions {
    pub walk: WalkOptions,
    /// Only mark a message for follow-up actions if it had attachments.
    pub attachments_required: bool,
    /// Write an archival `.eml` file per message.
    pub save_to_file: bool,
    pub inline_mode: InlineMode,
    pub template: ArchiveTemplate,
    /// Time budget for all fetches of one message.
    pub message_timeout: Option<Duration>,
}

impl AssembleOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            walk: WalkOptions::new(output_dir),
            attachments_required: false,
            save_to_file: true,
            inline_mode: InlineMode::default(),
            template: ArchiveTemplate::default(),
            message_timeout: None,
        }
    }
}

/// Builds extracted messages, one at a time.
#[derive(Debug, Clone)]
pub struct MessageAssembler {
    options: AssembleOptions,
}

impl MessageAssembler {
    pub fn new(options: AssembleOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &AssembleOptions {
        &self.options
    }

    /// Fetch, walk and (optionally) archive one message.
    ///
    /// Transport failures and an expired deadline are returned as `Err`.
    /// Attachment and archive write failures only go to `errors`.
    pub fn assemble(
        &self,
        transport: &mut dyn MailTransport,
        errors: &mut dyn ErrorSink,
        uid: u32,
        message_number: u32,
    ) -> Result<ExtractedMessage> {
        let deadline = self.options.message_timeout.map(Deadline::after);
        let check = |deadline: Option<Deadline>| match deadline {
            Some(d) => d.check(uid),
            None => Ok(()),
        };

        check(deadline)?;
        let overview = transport.fetch_overview(uid)?;
        let subject = overview
            .subject
            .as_deref()
            .map(decode_encoded_words)
            .unwrap_or_default();
        let parsed_date = overview.date.as_deref().and_then(parse_date);
        let date = parsed_date.map(|d| d.timestamp()).unwrap_or(0);

        check(deadline)?;
        let headers = transport.fetch_headers(uid)?;
        let from = decode_addresses(&headers.from);
        let cc = decode_addresses(&headers.cc);

        check(deadline)?;
        let root = transport.fetch_structure(uid)?;
        debug!(uid, parts = root.leaf_count(), content_type = %root.content_type(), "Fetched structure");

        let mut acc = BodyAccumulator::new();
        {
            let mut ctx = WalkContext {
                transport: &mut *transport,
                errors: &mut *errors,
                options: &self.options.walk,
                uid,
                fallback_date: parsed_date.unwrap_or_else(Utc::now),
                deadline,
            };
            if root.is_leaf() {
                walk(&mut ctx, &root, &PartAddress::root(), &mut acc)?;
            } else {
                for (index, child) in root.children.iter().enumerate() {
                    walk(&mut ctx, child, &PartAddress::root().child(index), &mut acc)?;
                }
            }
        }

        let raw_body = match acc.raw_body.take() {
            Some(body) => body,
            None => {
                check(deadline)?;
                transport.fetch_part(uid, &PartAddress::root())?
            }
        };

        let html = acc.html.take().map(|html| {
            rewrite(
                &html,
                &acc.inline_images,
                &self.options.walk.output_dir,
                self.options.inline_mode,
            )
        });

        let process = !(self.options.attachments_required && acc.attachments.is_empty());
        let from_address = from.first().map(|a| a.address.as_str()).unwrap_or("");

        let archive = if self.options.save_to_file {
            let archive_date = parsed_date.unwrap_or(DateTime::UNIX_EPOCH);
            match write_archive(
                &self.options.walk.output_dir,
                archive_date,
                from_address,
                &self.options.template,
                &headers.raw,
                &raw_body,
            ) {
                Ok(path) => path.file_name().map(|n| n.to_string_lossy().into_owned()),
                Err(e) => {
                    errors.record(format!(
                        "Message could not be saved to file ({e})! Message ID: {uid}"
                    ));
                    None
                }
            }
        } else {
            None
        };

        let message = ExtractedMessage {
            subject,
            date,
            message_id: overview.message_id,
            message_number,
            uid,
            references: overview.references,
            from,
            cc,
            message: MessageBody {
                text: acc.plaintext.take(),
                html,
            },
            attachments: acc.attachments,
            process,
            archive,
            raw: RawMail {
                header: decode_header_bytes(&headers.raw),
                body: String::from_utf8_lossy(&raw_body).into_owned(),
            },
        };

        info!(
            uid,
            attachments = message.attachments.len(),
            process,
            "Extracted message"
        );
        Ok(message)
    }
}

/// Decode personal names and drop the `undisclosed-recipients` placeholder.
pub fn decode_addresses(addresses: &[MailboxAddress]) -> Vec<AddressEntry> {
    addresses
        .iter()
        .filter(|a| !a.is_undisclosed_placeholder())
        .map(|a| AddressEntry {
            address: a.full_address(),
            name: a.personal.as_deref().map(decode_encoded_words),
        })
        .collect()
}
