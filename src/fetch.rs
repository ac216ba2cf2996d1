//! Batch driver: read messages from the selected folder one by one, extract
//! each of them, and apply the follow-up action (delete or move).

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{MailError, Result};
use crate::error_log::ErrorSink;
use crate::extract::assemble::MessageAssembler;
use crate::model::message::ExtractedMessage;
use crate::store::transport::MailTransport;

/// Order in which message numbers are processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Oldest first.
    #[default]
    Asc,
    /// Newest first.
    Desc,
}

/// Batch-level settings.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub sort_order: SortOrder,
    /// Maximum number of messages to read (0 = all).
    pub limit: usize,
    pub delete_after_read: bool,
    pub move_to_folder: Option<String>,
    /// Stop the batch at the first message that cannot be fetched.
    pub abort_on_fetch_error: bool,
}

/// What a batch run produced.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub messages: Vec<ExtractedMessage>,
    /// Message numbers skipped because they could not be fetched.
    pub skipped: Vec<u32>,
    pub deleted: usize,
    pub moved: usize,
    /// The progress callback asked to stop early.
    pub cancelled: bool,
}

impl FetchReport {
    pub fn attachment_count(&self) -> usize {
        self.messages.iter().map(|m| m.attachments.len()).sum()
    }

    /// Attachments plus archive files actually written.
    pub fn files_written(&self) -> usize {
        self.messages
            .iter()
            .map(|m| m.attachments.len() + usize::from(m.archive.is_some()))
            .sum()
    }
}

/// Create the output directory if needed.
pub fn ensure_output_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| MailError::DirectoryCreation {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Read, extract and post-process messages from the selected folder.
///
/// UIDs are resolved for the whole batch before the first message is read,
/// so expunges during the run do not shift later messages. A message that
/// fails to fetch is recorded and skipped unless `abort_on_fetch_error` is
/// set. `progress` receives `(done, total)` after each message and returns
/// `false` to stop.
pub fn get_messages(
    transport: &mut dyn MailTransport,
    errors: &mut dyn ErrorSink,
    assembler: &MessageAssembler,
    options: &FetchOptions,
    progress: Option<&dyn Fn(usize, usize) -> bool>,
) -> Result<FetchReport> {
    ensure_output_dir(&assembler.options().walk.output_dir)?;

    let mut numbers = transport.search_all()?;
    if options.sort_order == SortOrder::Desc {
        numbers.reverse();
    }
    if options.limit > 0 {
        numbers.truncate(options.limit);
    }

    let batch: Vec<(u32, u32)> = numbers
        .into_iter()
        .map(|number| transport.uid_for(number).map(|uid| (number, uid)))
        .collect::<Result<_>>()?;
    let total = batch.len();
    info!(total, order = ?options.sort_order, "Reading messages");

    let mut report = FetchReport::default();
    for (done, (number, uid)) in batch.into_iter().enumerate() {
        match assembler.assemble(transport, errors, uid, number) {
            Ok(message) => {
                if message.process {
                    apply_follow_up(transport, options, uid, &mut report)?;
                }
                report.messages.push(message);
            }
            Err(e) if e.is_message_local() && !options.abort_on_fetch_error => {
                warn!(uid, number, error = %e, "Skipping message");
                errors.record(format!("Message {number} (UID {uid}) skipped: {e}"));
                report.skipped.push(number);
            }
            Err(e) => return Err(e),
        }

        if let Some(callback) = progress {
            if !callback(done + 1, total) {
                debug!(done = done + 1, total, "Batch stopped by caller");
                report.cancelled = true;
                break;
            }
        }
    }

    info!(
        read = report.messages.len(),
        skipped = report.skipped.len(),
        deleted = report.deleted,
        moved = report.moved,
        "Finished reading messages"
    );
    Ok(report)
}

/// Delete or move a processed message. Delete wins when both are set.
fn apply_follow_up(
    transport: &mut dyn MailTransport,
    options: &FetchOptions,
    uid: u32,
    report: &mut FetchReport,
) -> Result<()> {
    if options.delete_after_read {
        transport.delete_message(uid)?;
        transport.expunge()?;
        report.deleted += 1;
    } else if let Some(target) = options.move_to_folder.as_deref().filter(|t| !t.is_empty()) {
        transport.move_message(uid, target)?;
        transport.expunge()?;
        report.moved += 1;
    }
    Ok(())
}

/// Delete every given message with a single expunge at the end.
pub fn delete_all(transport: &mut dyn MailTransport, messages: &[ExtractedMessage]) -> Result<usize> {
    for message in messages {
        transport.delete_message(message.uid)?;
    }
    transport.expunge()?;
    info!(count = messages.len(), "Deleted messages");
    Ok(messages.len())
}
