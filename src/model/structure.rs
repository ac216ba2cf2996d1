//! MIME structure tree as reported by the mailbox for one message.
//!
//! This mirrors what an IMAP server returns for `BODYSTRUCTURE`: the shape of
//! the message (types, encodings, parameters, nesting) without any part bodies.

use std::fmt;
use std::str::FromStr;

/// Top-level media type of a part.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MimeType {
    Text,
    Multipart,
    Message,
    Application,
    Audio,
    Image,
    Video,
    Model,
    Other(String),
}

impl MimeType {
    /// Map a lower- or mixed-case media type name (`"text"`, `"IMAGE"`, …).
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "text" => Self::Text,
            "multipart" => Self::Multipart,
            "message" => Self::Message,
            "application" => Self::Application,
            "audio" => Self::Audio,
            "image" => Self::Image,
            "video" => Self::Video,
            "model" => Self::Model,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Multipart => "multipart",
            Self::Message => "message",
            Self::Application => "application",
            Self::Audio => "audio",
            Self::Image => "image",
            Self::Video => "video",
            Self::Model => "model",
            Self::Other(name) => name,
        }
    }
}

/// Content-Transfer-Encoding of a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum TransferEncoding {
    #[default]
    SevenBit,
    EightBit,
    Binary,
    Base64,
    QuotedPrintable,
    Other,
}

impl TransferEncoding {
    /// Parse a `Content-Transfer-Encoding` header value.
    ///
    /// Anything unrecognized (e.g. `x-uuencode`) maps to [`TransferEncoding::Other`].
    pub fn from_header(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "7bit" => Self::SevenBit,
            "8bit" => Self::EightBit,
            "binary" => Self::Binary,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            _ => Self::Other,
        }
    }
}

/// Content-Disposition type.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Disposition {
    Inline,
    Attachment,
    Other(String),
}

impl Disposition {
    /// Parse the disposition type token (case-insensitive).
    pub fn from_token(token: &str) -> Self {
        let lower = token.trim().to_ascii_lowercase();
        match lower.as_str() {
            "inline" => Self::Inline,
            "attachment" => Self::Attachment,
            _ => Self::Other(lower),
        }
    }
}

/// A single `attribute=value` parameter as reported by the server.
///
/// Attribute case is preserved here; consumers lower-case it when merging.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MimeParam {
    pub attribute: String,
    pub value: String,
}

impl MimeParam {
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }
}

/// One node of the structure tree.
///
/// A node is either a container (non-empty `children`) or a leaf with
/// content. `message/rfc822` nodes are both: they have content (the embedded
/// message) and children (its parts).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MimeNode {
    pub mime_type: MimeType,
    /// Lower-cased subtype (`"plain"`, `"html"`, `"mixed"`, `"rfc822"`, …).
    /// Empty when the server did not report one.
    pub subtype: String,
    pub encoding: TransferEncoding,
    /// Content-Type parameters.
    pub parameters: Vec<MimeParam>,
    /// Content-Disposition parameters.
    pub disposition_parameters: Vec<MimeParam>,
    pub disposition: Option<Disposition>,
    pub content_id: Option<String>,
    pub children: Vec<MimeNode>,
}

impl MimeNode {
    /// A leaf node with no parameters.
    pub fn leaf(mime_type: MimeType, subtype: &str, encoding: TransferEncoding) -> Self {
        Self {
            mime_type,
            subtype: subtype.to_ascii_lowercase(),
            encoding,
            parameters: Vec::new(),
            disposition_parameters: Vec::new(),
            disposition: None,
            content_id: None,
            children: Vec::new(),
        }
    }

    /// A multipart container with the given children.
    pub fn multipart(subtype: &str, children: Vec<MimeNode>) -> Self {
        Self {
            children,
            ..Self::leaf(MimeType::Multipart, subtype, TransferEncoding::SevenBit)
        }
    }

    pub fn with_param(mut self, attribute: &str, value: &str) -> Self {
        self.parameters.push(MimeParam::new(attribute, value));
        self
    }

    pub fn with_disposition(mut self, disposition: Disposition) -> Self {
        self.disposition = Some(disposition);
        self
    }

    pub fn with_disposition_param(mut self, attribute: &str, value: &str) -> Self {
        self.disposition_parameters
            .push(MimeParam::new(attribute, value));
        self
    }

    pub fn with_content_id(mut self, id: &str) -> Self {
        self.content_id = Some(id.to_string());
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// `"type/subtype"` for logging.
    pub fn content_type(&self) -> String {
        if self.subtype.is_empty() {
            self.mime_type.as_str().to_string()
        } else {
            format!("{}/{}", self.mime_type.as_str(), self.subtype)
        }
    }

    /// Number of leaf nodes in this subtree.
    pub fn leaf_count(&self) -> usize {
        if self.children.is_empty() {
            1
        } else {
            self.children.iter().map(MimeNode::leaf_count).sum()
        }
    }

    /// Resolve a part address relative to this node.
    pub fn find(&self, address: &PartAddress) -> Option<&MimeNode> {
        let mut node = self;
        for &segment in address.segments() {
            node = node.children.get(segment.checked_sub(1)? as usize)?;
        }
        Some(node)
    }
}

/// Dotted-path location of a part inside the tree (`"2.1"`).
///
/// Segments are 1-based. The empty address is the root (whole-message body).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartAddress(Vec<u32>);

impl PartAddress {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Address of the child at zero-based `index` of this node.
    pub fn child(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(index as u32 + 1);
        Self(segments)
    }

    pub fn segments(&self) -> &[u32] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for PartAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.0 {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for PartAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::root());
        }
        s.split('.')
            .map(|seg| match seg.parse::<u32>() {
                Ok(n) if n > 0 => Ok(n),
                _ => Err(format!("invalid part address segment '{seg}' in '{s}'")),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_address_display() {
        let addr = PartAddress::root().child(1).child(2);
        assert_eq!(addr.to_string(), "2.3");
        assert_eq!(PartAddress::root().to_string(), "");
    }

    #[test]
    fn test_part_address_parse() {
        let addr: PartAddress = "2.1".parse().unwrap();
        assert_eq!(addr.segments(), &[2, 1]);
        assert!("".parse::<PartAddress>().unwrap().is_root());
        assert!("0.1".parse::<PartAddress>().is_err());
        assert!("a".parse::<PartAddress>().is_err());
    }

    #[test]
    fn test_find_nested_node() {
        let tree = MimeNode::multipart(
            "mixed",
            vec![
                MimeNode::leaf(MimeType::Text, "plain", TransferEncoding::SevenBit),
                MimeNode::multipart(
                    "related",
                    vec![
                        MimeNode::leaf(MimeType::Text, "html", TransferEncoding::SevenBit),
                        MimeNode::leaf(MimeType::Image, "png", TransferEncoding::Base64),
                    ],
                ),
            ],
        );
        let addr: PartAddress = "2.2".parse().unwrap();
        assert_eq!(tree.find(&addr).map(|n| n.subtype.as_str()), Some("png"));
        assert!(tree.find(&"3".parse().unwrap()).is_none());
        assert_eq!(tree.leaf_count(), 3);
    }

    #[test]
    fn test_transfer_encoding_from_header() {
        assert_eq!(TransferEncoding::from_header("BASE64"), TransferEncoding::Base64);
        assert_eq!(
            TransferEncoding::from_header(" quoted-printable "),
            TransferEncoding::QuotedPrintable
        );
        assert_eq!(TransferEncoding::from_header("x-uuencode"), TransferEncoding::Other);
        assert_eq!(TransferEncoding::from_header(""), TransferEncoding::SevenBit);
    }

    #[test]
    fn test_disposition_case_insensitive() {
        assert_eq!(Disposition::from_token("INLINE"), Disposition::Inline);
        assert_eq!(Disposition::from_token("Attachment"), Disposition::Attachment);
    }
}
