//! Decide what a structure node is: something to save, something to read
//! as a body, or just a container to descend through.

use std::collections::HashMap;

use crate::model::structure::{Disposition, MimeNode, MimeType};

/// What to do with a node's own content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    /// A named part, saved to disk.
    Attachment,
    /// A `message/rfc822` part, saved to disk as a whole.
    EmbeddedMessage,
    /// A text or multipart node whose content may become a message body.
    TextBody,
    /// Nothing to extract here; only the children matter.
    Container,
}

impl PartKind {
    pub fn is_saved(self) -> bool {
        matches!(self, Self::Attachment | Self::EmbeddedMessage)
    }
}

/// Declared parameters of a node, merged into one case-insensitive map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartParams {
    values: HashMap<String, String>,
    pub disposition: Option<Disposition>,
    pub content_id: Option<String>,
}

impl PartParams {
    /// Merge Content-Type and Content-Disposition parameters.
    ///
    /// Disposition parameters win on conflicting names.
    pub fn from_node(node: &MimeNode) -> Self {
        let values = node
            .parameters
            .iter()
            .chain(&node.disposition_parameters)
            .map(|p| (p.attribute.to_ascii_lowercase(), p.value.clone()))
            .collect();
        Self {
            values,
            disposition: node.disposition.clone(),
            content_id: node.content_id.clone(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Declared filename, preferring `filename` over `name`.
    pub fn declared_name(&self) -> Option<&str> {
        self.get("filename")
            .or_else(|| self.get("name"))
            .filter(|n| !n.trim().is_empty())
    }

    pub fn has_declared_name(&self) -> bool {
        self.values.contains_key("filename") || self.values.contains_key("name")
    }

    pub fn charset(&self) -> Option<&str> {
        self.get("charset").filter(|c| !c.trim().is_empty())
    }

    pub fn is_inline(&self) -> bool {
        matches!(self.disposition, Some(Disposition::Inline))
    }

    /// Content-ID with surrounding angle brackets removed.
    pub fn bare_content_id(&self) -> Option<String> {
        self.content_id
            .as_deref()
            .map(|id| id.replace(['<', '>'], "").trim().to_string())
            .filter(|id| !id.is_empty())
    }
}

/// The classification of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: PartKind,
    pub params: PartParams,
}

/// Classify a node.
///
/// In order: an rfc822 subtype is an embedded message; a declared `name` or
/// `filename` is an attachment; text and multipart nodes are body
/// candidates; everything else is a container.
pub fn classify(node: &MimeNode) -> Classification {
    let params = PartParams::from_node(node);
    let kind = if node.subtype.eq_ignore_ascii_case("rfc822") {
        PartKind::EmbeddedMessage
    } else if params.has_declared_name() {
        PartKind::Attachment
    } else if matches!(node.mime_type, MimeType::Text | MimeType::Multipart) {
        PartKind::TextBody
    } else {
        PartKind::Container
    };
    Classification { kind, params }
}
