//! Transfer-encoding decoding and charset conversion.
//!
//! [`decode_content`] and [`convert_charset`] never fail: malformed payloads
//! and unknown charsets degrade to a best-effort result. [`DecodingWriter`]
//! is the streaming variant used for attachments, where a malformed payload
//! must surface as a write error instead of a silently corrupt file.

use std::io::{self, Write};

use mail_parser::decoders::base64::base64_decode;
use tracing::warn;

use crate::model::structure::TransferEncoding;

/// Decode a transfer-encoded payload.
///
/// 7bit, 8bit, binary and unknown encodings are passed through untouched.
/// Unpadded base64 is accepted. A base64 payload that still fails to decode
/// is returned as is.
pub fn decode_content(payload: &[u8], encoding: TransferEncoding) -> Vec<u8> {
    match encoding {
        TransferEncoding::Base64 => {
            base64_decode(&pad_base64(strip_whitespace(payload))).unwrap_or_else(|| {
                warn!(len = payload.len(), "Base64 payload did not decode, keeping raw bytes");
                payload.to_vec()
            })
        }
        TransferEncoding::QuotedPrintable => decode_quoted_printable(payload),
        TransferEncoding::SevenBit
        | TransferEncoding::EightBit
        | TransferEncoding::Binary
        | TransferEncoding::Other => payload.to_vec(),
    }
}

/// Decode quoted-printable leniently.
///
/// `=XX` becomes a byte and `=` before a line break (trailing blanks
/// allowed) or at the very end is a soft break. Any other `=` is kept.
pub fn decode_quoted_printable(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        let b = input[i];
        if b != b'=' {
            out.push(b);
            i += 1;
            continue;
        }
        if let Some(byte) = input
            .get(i + 1)
            .zip(input.get(i + 2))
            .and_then(|(&hi, &lo)| hex_value(hi).zip(hex_value(lo)))
            .map(|(hi, lo)| (hi << 4) | lo)
        {
            out.push(byte);
            i += 3;
            continue;
        }
        let blanks = input[i + 1..]
            .iter()
            .take_while(|&&c| c == b' ' || c == b'\t')
            .count();
        match &input[i + 1 + blanks..] {
            [b'\r', b'\n', ..] => i += blanks + 3,
            [b'\n', ..] => i += blanks + 2,
            [] => i = input.len(),
            _ => {
                out.push(b'=');
                i += 1;
            }
        }
    }
    out
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'A'..=b'F' => Some(b - b'A' + 10),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}

/// Complete a base64 tail with `=` so encoders that omit padding still decode.
fn pad_base64(mut bytes: Vec<u8>) -> Vec<u8> {
    let data_len = bytes.iter().rposition(|&b| b != b'=').map_or(0, |p| p + 1);
    bytes.truncate(data_len);
    match data_len % 4 {
        2 => bytes.extend_from_slice(b"=="),
        3 => bytes.push(b'='),
        _ => {}
    }
    bytes
}

/// Convert decoded bytes to UTF-8.
///
/// Without a declared charset the bytes are taken as UTF-8, falling back to
/// Windows-1252. An unrecognized charset is replaced by US-ASCII for 7bit
/// parts and UTF-8 otherwise.
pub fn convert_charset(bytes: &[u8], charset: Option<&str>, encoding: TransferEncoding) -> String {
    let Some(charset) = charset.map(str::trim).filter(|c| !c.is_empty()) else {
        return match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        };
    };

    let label = match encoding_rs::Encoding::for_label(charset.as_bytes()) {
        Some(_) => charset,
        None => {
            let fallback = fallback_charset(encoding);
            warn!(charset, fallback, "Unknown charset, substituting fallback");
            fallback
        }
    };

    match encoding_rs::Encoding::for_label(label.as_bytes()) {
        Some(enc) if enc == encoding_rs::UTF_8 => String::from_utf8_lossy(bytes).into_owned(),
        Some(enc) => enc.decode(bytes).0.into_owned(),
        None => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Charset assumed when the declared one is not recognized.
pub fn fallback_charset(encoding: TransferEncoding) -> &'static str {
    if encoding == TransferEncoding::SevenBit {
        "us-ascii"
    } else {
        "utf-8"
    }
}

fn is_base64_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=')
}

fn strip_whitespace(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect()
}

/// A writer that decodes a transfer encoding on the way through.
///
/// Base64 is decoded in complete 4-character groups and quoted-printable in
/// complete lines, so input may be split at any byte. Call [`finish`] to
/// decode the tail and flush.
///
/// [`finish`]: DecodingWriter::finish
pub struct DecodingWriter<W: Write> {
    inner: W,
    encoding: TransferEncoding,
    pending: Vec<u8>,
}

impl<W: Write> DecodingWriter<W> {
    pub fn new(inner: W, encoding: TransferEncoding) -> Self {
        Self {
            inner,
            encoding,
            pending: Vec::new(),
        }
    }

    /// Decode whatever is still buffered, flush, and return the inner writer.
    ///
    /// A base64 tail missing its padding is completed before decoding.
    pub fn finish(mut self) -> io::Result<W> {
        let mut tail = std::mem::take(&mut self.pending);
        if self.encoding == TransferEncoding::Base64 {
            tail = pad_base64(tail);
            if tail.len() % 4 != 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "truncated base64 payload",
                ));
            }
        }
        if !tail.is_empty() {
            self.emit(&tail)?;
        }
        self.inner.flush()?;
        Ok(self.inner)
    }

    fn emit(&mut self, chunk: &[u8]) -> io::Result<()> {
        let decoded = match self.encoding {
            TransferEncoding::Base64 => base64_decode(chunk).ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidData, "malformed base64 payload")
            })?,
            TransferEncoding::QuotedPrintable => decode_quoted_printable(chunk),
            _ => chunk.to_vec(),
        };
        self.inner.write_all(&decoded)
    }
}

impl<W: Write> Write for DecodingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.encoding {
            TransferEncoding::Base64 => {
                let start = self.pending.len();
                self.pending
                    .extend(buf.iter().copied().filter(|b| !b.is_ascii_whitespace()));
                if let Some(&bad) = self.pending[start..].iter().find(|&&b| !is_base64_byte(b)) {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("invalid base64 byte 0x{bad:02x}"),
                    ));
                }
                let complete = self.pending.len() / 4 * 4;
                if complete > 0 {
                    let chunk: Vec<u8> = self.pending.drain(..complete).collect();
                    self.emit(&chunk)?;
                }
            }
            TransferEncoding::QuotedPrintable => {
                self.pending.extend_from_slice(buf);
                if let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') {
                    let chunk: Vec<u8> = self.pending.drain(..=last_newline).collect();
                    self.emit(&chunk)?;
                }
            }
            _ => self.inner.write_all(buf)?,
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
