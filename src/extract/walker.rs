//! Depth-first walk over a message's structure tree.
//!
//! Each node is classified once. Attachments are streamed through a
//! [`DecodingWriter`] straight into the output directory, text parts are
//! decoded into the plain-text and HTML bodies, and every node's children
//! are visited afterwards in declared order.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::{MailError, Result};
use crate::error_log::ErrorSink;
use crate::extract::classify::{classify, PartKind, PartParams};
use crate::extract::codec::{convert_charset, decode_content, DecodingWriter};
use crate::extract::filename::{embedded_message_name, extension_of, FilenameAllocator};
use crate::extract::inline::InlineImageMap;
use crate::model::structure::{MimeNode, MimeType, PartAddress};
use crate::parser::structure::MAX_DEPTH;
use crate::store::transport::MailTransport;

/// Everything the walk collects for one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyAccumulator {
    /// HTML-escaped plain text with `<br />` line breaks. Last plain part wins.
    pub plaintext: Option<String>,
    /// Last HTML part wins.
    pub html: Option<String>,
    /// Saved attachment filenames in walk order.
    pub attachments: Vec<String>,
    pub inline_images: InlineImageMap,
    /// Undecoded message body, captured at the first text part.
    pub raw_body: Option<Vec<u8>>,
}

impl BodyAccumulator {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A point in time after which no more fetches are made for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    expires_at: Instant,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self {
            expires_at: Instant::now() + timeout,
        }
    }

    pub fn at(expires_at: Instant) -> Self {
        Self { expires_at }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    pub fn check(&self, uid: u32) -> Result<()> {
        if self.is_expired() {
            Err(MailError::DeadlineExceeded { uid })
        } else {
            Ok(())
        }
    }
}

/// Settings shared by every walk in a run.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub output_dir: PathBuf,
    /// Lower-cased extensions without dots. Empty allows everything.
    pub allowed_extensions: Vec<String>,
    pub allocator: FilenameAllocator,
}

impl WalkOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            allowed_extensions: Vec::new(),
            allocator: FilenameAllocator::default(),
        }
    }

    /// Parse a comma-separated allow-list such as `"pdf, DOCX,"`.
    pub fn with_allowed_extensions(mut self, list: &str) -> Self {
        self.allowed_extensions = parse_extension_list(list);
        self
    }

    /// Whether a file with this name may be saved.
    pub fn allows(&self, filename: &str) -> bool {
        if self.allowed_extensions.is_empty() {
            return true;
        }
        extension_of(filename).is_some_and(|ext| self.allowed_extensions.contains(&ext))
    }
}

/// Split a comma list into trimmed, lower-cased, dot-less extensions.
pub fn parse_extension_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}

/// Collaborators and per-message facts for one walk.
pub struct WalkContext<'a> {
    pub transport: &'a mut dyn MailTransport,
    pub errors: &'a mut dyn ErrorSink,
    pub options: &'a WalkOptions,
    pub uid: u32,
    /// Date used to name embedded messages that declare no filename.
    pub fallback_date: DateTime<Utc>,
    pub deadline: Option<Deadline>,
}

impl WalkContext<'_> {
    pub fn check_deadline(&self) -> Result<()> {
        match self.deadline {
            Some(deadline) => deadline.check(self.uid),
            None => Ok(()),
        }
    }

    fn fetch(&mut self, path: &PartAddress) -> Result<Vec<u8>> {
        self.check_deadline()?;
        debug!(uid = self.uid, part = %path, "Fetching part");
        self.transport.fetch_part(self.uid, path)
    }
}

/// Where a decoded text part ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextTarget {
    Plain,
    Html,
}

/// Walk `node` (found at `path`) and all of its descendants.
///
/// Transport failures abort the walk with `Err`. Attachment write failures
/// and naming exhaustion are recorded in the error sink and the walk goes on.
pub fn walk(
    ctx: &mut WalkContext<'_>,
    node: &MimeNode,
    path: &PartAddress,
    acc: &mut BodyAccumulator,
) -> Result<()> {
    walk_node(ctx, node, path, 0, acc)
}

fn walk_node(
    ctx: &mut WalkContext<'_>,
    node: &MimeNode,
    path: &PartAddress,
    depth: usize,
    acc: &mut BodyAccumulator,
) -> Result<()> {
    if depth > MAX_DEPTH {
        warn!(uid = ctx.uid, part = %path, "Structure too deep, not descending further");
        return Ok(());
    }

    let classification = classify(node);
    match classification.kind {
        kind if kind.is_saved() => {
            save_attachment(ctx, node, &classification.params, kind, path, acc)?;
        }
        PartKind::TextBody => read_text_part(ctx, node, &classification.params, path, acc)?,
        _ => {
            debug!(uid = ctx.uid, part = %path, content_type = %node.content_type(), "Container part");
        }
    }

    for (index, child) in node.children.iter().enumerate() {
        walk_node(ctx, child, &path.child(index), depth + 1, acc)?;
    }
    Ok(())
}

fn text_target(node: &MimeNode) -> Option<TextTarget> {
    match node.mime_type {
        MimeType::Text => match node.subtype.as_str() {
            "" | "plain" => Some(TextTarget::Plain),
            "html" => Some(TextTarget::Html),
            _ => None,
        },
        MimeType::Multipart if node.subtype != "alternative" => Some(TextTarget::Plain),
        _ => None,
    }
}

fn read_text_part(
    ctx: &mut WalkContext<'_>,
    node: &MimeNode,
    params: &PartParams,
    path: &PartAddress,
    acc: &mut BodyAccumulator,
) -> Result<()> {
    let target = text_target(node);

    let content = match target {
        Some(_) => Some(ctx.fetch(path)?),
        None => None,
    };

    if acc.raw_body.is_none() {
        acc.raw_body = match (&content, path.is_root()) {
            (Some(bytes), true) => Some(bytes.clone()),
            _ => Some(ctx.fetch(&PartAddress::root())?),
        };
    }

    let (Some(target), Some(content)) = (target, content) else {
        debug!(uid = ctx.uid, part = %path, content_type = %node.content_type(), "Text part not used as a body");
        return Ok(());
    };

    let decoded = decode_content(&content, node.encoding);
    let text = convert_charset(&decoded, params.charset(), node.encoding);

    match target {
        TextTarget::Plain => acc.plaintext = Some(nl2br(escape_html(&text).trim())),
        TextTarget::Html => acc.html = Some(text),
    }
    Ok(())
}

fn save_attachment(
    ctx: &mut WalkContext<'_>,
    node: &MimeNode,
    params: &PartParams,
    kind: PartKind,
    path: &PartAddress,
    acc: &mut BodyAccumulator,
) -> Result<()> {
    let uid = ctx.uid;
    let output_dir = ctx.options.output_dir.clone();

    let declared = match (params.declared_name(), kind) {
        (Some(name), _) => name.to_string(),
        (None, PartKind::EmbeddedMessage) => embedded_message_name(ctx.fallback_date, uid, path),
        (None, _) => String::new(),
    };

    let filename = match ctx.options.allocator.allocate_in(&output_dir, &declared) {
        Ok(name) => name,
        Err(e) => {
            ctx.errors.record(format!("{e}! Message ID: {uid}"));
            return Ok(());
        }
    };

    if !ctx.options.allows(&filename) {
        debug!(uid, part = %path, filename = %filename, "Extension not allowed, skipping attachment");
        return Ok(());
    }

    if !write_part(ctx, node, path, &output_dir, &filename)? {
        return Ok(());
    }

    debug!(uid, part = %path, filename = %filename, "Saved attachment");
    if params.is_inline() {
        if let Some(cid) = params.bare_content_id() {
            acc.inline_images.insert(cid, filename.clone());
        }
    }
    acc.attachments.push(filename);
    Ok(())
}

/// Stream one part into `{output_dir}/{filename}`, decoding on the way.
///
/// Returns `Ok(false)` after recording the error when the file could not be
/// written; a partially written file is removed.
fn write_part(
    ctx: &mut WalkContext<'_>,
    node: &MimeNode,
    path: &PartAddress,
    output_dir: &Path,
    filename: &str,
) -> Result<bool> {
    let uid = ctx.uid;
    let target = output_dir.join(filename);

    let file = match File::create(&target) {
        Ok(file) => file,
        Err(e) => {
            ctx.errors.record(format!(
                "Cannot open file '{}' to save attachment ({e})! Message ID: {uid}",
                target.display()
            ));
            return Ok(false);
        }
    };

    let mut writer = DecodingWriter::new(BufWriter::new(file), node.encoding);
    let streamed = ctx
        .check_deadline()
        .and_then(|()| ctx.transport.save_part_to_stream(uid, path, &mut writer));

    let outcome = match streamed {
        Ok(true) => writer.finish().map(drop).map_err(|e| e.to_string()),
        Ok(false) => Err("stream rejected the part".to_string()),
        Err(e) => {
            drop(writer);
            remove_partial(&target);
            return Err(e);
        }
    };

    match outcome {
        Ok(()) => Ok(true),
        Err(reason) => {
            remove_partial(&target);
            ctx.errors.record(format!(
                "Attachment '{filename}' could not be written ({reason})! Message ID: {uid}"
            ));
            Ok(false)
        }
    }
}

fn remove_partial(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "Could not remove partial attachment");
    }
}

/// Escape `& < > " '` for embedding text in HTML.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            c => out.push(c),
        }
    }
    out
}

/// Insert `<br />` before every line break (`\r\n`, `\n\r`, `\n` or `\r`).
pub fn nl2br(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' | '\n' => {
                out.push_str("<br />");
                out.push(c);
                let pair = if c == '\r' { '\n' } else { '\r' };
                if chars.peek() == Some(&pair) {
                    out.push(pair);
                    chars.next();
                }
            }
            c => out.push(c),
        }
    }
    out
}
