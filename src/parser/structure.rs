//! MIME structure parsing: builds the [`MimeNode`] tree of a raw message and
//! remembers where every addressable part's body lives in the raw bytes.
//!
//! Addressing follows IMAP section numbers: the root is the body after the
//! top-level headers, `"2.1"` is the first child of the second child, and the
//! parts of an embedded `message/rfc822` are numbered below the rfc822 part.

use std::borrow::Cow;
use std::collections::HashMap;
use std::ops::Range;

use mail_parser::{Encoding, Message, MessageParser, MessagePart, MimeHeaders, PartType};
use tracing::{debug, warn};

use crate::model::structure::{
    Disposition, MimeNode, MimeParam, MimeType, PartAddress, TransferEncoding,
};

/// Maximum nesting depth for multipart and embedded messages (adversarial input guard).
pub const MAX_DEPTH: usize = 10;

/// Structure tree plus the byte range of every part body.
#[derive(Debug, Clone)]
pub struct ParsedStructure {
    pub root: MimeNode,
    header_len: usize,
    sections: HashMap<PartAddress, Range<usize>>,
}

impl ParsedStructure {
    /// Length of the top-level header block, including the blank line.
    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// Borrow the part body at `address` out of `raw`.
    pub fn part_bytes<'a>(&self, raw: &'a [u8], address: &PartAddress) -> Option<&'a [u8]> {
        let range = self.sections.get(address)?;
        raw.get(range.clone())
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }
}

/// Parse the MIME structure of a raw message (no `From ` line).
pub fn parse_structure(raw: &[u8]) -> ParsedStructure {
    let Some(message) = MessageParser::default().parse(raw) else {
        // Nothing that looks like a header: the whole input is one text body.
        debug!(len = raw.len(), "No header block, treating message as plain text");
        let root = MimeNode::leaf(MimeType::Text, "plain", TransferEncoding::SevenBit);
        let mut sections = HashMap::new();
        sections.insert(PartAddress::root(), 0..raw.len());
        sections.insert(PartAddress::root().child(0), 0..raw.len());
        return ParsedStructure {
            root,
            header_len: 0,
            sections,
        };
    };

    let mut builder = SectionBuilder {
        raw_len: raw.len(),
        sections: HashMap::new(),
    };
    let root = builder.node(&message, 0, &PartAddress::root(), 0);

    // The root section is everything after the top-level headers, epilogue included.
    let header_len = message
        .parts
        .first()
        .map_or(raw.len(), |p| p.offset_body.min(raw.len()));
    let mut sections = builder.sections;
    sections.insert(PartAddress::root(), header_len..raw.len());

    // A single-part message is also addressable as part "1".
    if root.is_leaf() {
        sections.insert(PartAddress::root().child(0), header_len..raw.len());
    }

    ParsedStructure {
        root,
        header_len,
        sections,
    }
}

struct SectionBuilder {
    raw_len: usize,
    sections: HashMap<PartAddress, Range<usize>>,
}

impl SectionBuilder {
    /// Convert part `part_id` of `message`, register its body range and
    /// recurse into its children.
    fn node(
        &mut self,
        message: &Message<'_>,
        part_id: usize,
        address: &PartAddress,
        depth: usize,
    ) -> MimeNode {
        let Some(part) = message.parts.get(part_id) else {
            warn!(part = %address, part_id, "Parser lost a MIME part");
            return MimeNode::leaf(MimeType::Text, "plain", TransferEncoding::SevenBit);
        };

        let mut node = node_from_headers(part);
        self.register(address, part);

        if depth >= MAX_DEPTH {
            warn!(part = %address, "MIME nesting too deep, not descending further");
            return node;
        }

        match &part.body {
            PartType::Multipart(children) => {
                node.children = children
                    .iter()
                    .enumerate()
                    .map(|(i, &id)| self.node(message, id, &address.child(i), depth + 1))
                    .collect();
            }
            PartType::Message(embedded) if part.encoding == Encoding::None => {
                node.children = self.embedded(embedded, address, depth + 1);
            }
            PartType::Message(_) => {
                // Offsets of an encoded embedded message point into its decoded
                // bytes, so its parts are not addressable in the raw message.
                debug!(part = %address, "Encoded embedded message, not descending");
            }
            _ => {}
        }
        node
    }

    /// Children of an rfc822 part at `address`.
    ///
    /// The parts of a multipart embedded message sit directly below the
    /// rfc822 part; a single-part embedded message is its only child.
    fn embedded(&mut self, embedded: &Message<'_>, address: &PartAddress, depth: usize) -> Vec<MimeNode> {
        let Some(root) = embedded.parts.first() else {
            return Vec::new();
        };
        match &root.body {
            PartType::Multipart(children) => children
                .iter()
                .enumerate()
                .map(|(i, &id)| self.node(embedded, id, &address.child(i), depth + 1))
                .collect(),
            _ => vec![self.node(embedded, 0, &address.child(0), depth)],
        }
    }

    fn register(&mut self, address: &PartAddress, part: &MessagePart<'_>) {
        let end = part.offset_end.min(self.raw_len);
        let start = part.offset_body.min(end);
        self.sections.insert(address.clone(), start..end);
    }
}

/// Read the MIME headers of a part into a childless node.
fn node_from_headers(part: &MessagePart<'_>) -> MimeNode {
    let (type_name, subtype) = match part.content_type() {
        Some(ct) => (ct.ctype(), ct.subtype().unwrap_or("")),
        // A part without Content-Type inside multipart/digest is a message.
        None if matches!(part.body, PartType::Message(_)) => ("message", "rfc822"),
        None => ("text", "plain"),
    };

    let encoding = part
        .content_transfer_encoding()
        .map(TransferEncoding::from_header)
        .unwrap_or_default();

    let mut node = MimeNode::leaf(MimeType::from_name(type_name), subtype, encoding);
    node.parameters = part
        .content_type()
        .map(|ct| params_of(ct.attributes()))
        .unwrap_or_default();

    if let Some(disposition) = part.content_disposition() {
        if !disposition.ctype().trim().is_empty() {
            node.disposition = Some(Disposition::from_token(disposition.ctype()));
        }
        node.disposition_parameters = params_of(disposition.attributes());
    }

    node.content_id = part
        .content_id()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| format!("<{id}>"));

    node
}

fn params_of(attributes: Option<&[(Cow<'_, str>, Cow<'_, str>)]>) -> Vec<MimeParam> {
    attributes
        .unwrap_or_default()
        .iter()
        .map(|(name, value)| MimeParam::new(name.as_ref(), value.as_ref()))
        .collect()
}
