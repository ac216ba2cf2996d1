//! Streaming MBOX scanner.
//!
//! Reads MBOX files line-by-line with a large buffer and reports where each
//! message starts and how long it is. Never loads the whole file into memory.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{MailError, Result};

/// Size of the internal read buffer.
const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Location of one message inside an MBOX file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageSpan {
    /// Byte offset of the `From ` separator line.
    pub offset: u64,
    /// Length in bytes up to the next separator or EOF.
    pub length: u64,
}

/// Streaming MBOX scanner.
///
/// Tolerant of:
///
/// - Mixed `\n` and `\r\n` line endings
/// - `From ` lines not preceded by a blank line (logs a warning)
/// - Truncated messages at EOF
/// - UTF-8 BOM at the start of the file
pub struct MboxParser {
    path: PathBuf,
    file_size: u64,
}

impl MboxParser {
    /// Create a scanner for the given MBOX file.
    ///
    /// Verifies that the file exists and is readable, but does NOT validate
    /// that it is actually an MBOX.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MailError::FileNotFound(path.clone())
            } else {
                MailError::io(&path, e)
            }
        })?;
        Ok(Self {
            path,
            file_size: metadata.len(),
        })
    }

    /// Total size of the underlying file in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Find every message boundary.
    ///
    /// The callback receives each [`MessageSpan`] in file order and returns
    /// `true` to continue or `false` to stop early. Returns the number of
    /// messages reported.
    pub fn scan(&self, callback: &mut dyn FnMut(MessageSpan) -> bool) -> Result<u64> {
        if self.file_size == 0 {
            return Ok(0);
        }

        let file = File::open(&self.path).map_err(|e| MailError::io(&self.path, e))?;
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);

        let mut count: u64 = 0;
        let mut current_offset: u64 = 0;
        let mut message_start: Option<u64> = None;
        let mut prev_line_was_empty = true;
        let mut first_line = true;
        let mut line_buf: Vec<u8> = Vec::with_capacity(4096);

        loop {
            line_buf.clear();
            let line_len = {
                let buf = reader
                    .fill_buf()
                    .map_err(|e| MailError::io(&self.path, e))?;
                if buf.is_empty() {
                    break;
                }
                let consume_len = match memchr_newline(buf) {
                    Some(pos) => pos + 1,
                    None => buf.len(),
                };
                line_buf.extend_from_slice(&buf[..consume_len]);
                reader.consume(consume_len);
                consume_len as u64
            };

            if is_mbox_separator(&line_buf) {
                if !first_line && !prev_line_was_empty {
                    warn!(
                        offset = current_offset,
                        "Found 'From ' separator without preceding blank line"
                    );
                }
                if let Some(start) = message_start {
                    let span = MessageSpan {
                        offset: start,
                        length: current_offset - start,
                    };
                    count += 1;
                    if !callback(span) {
                        return Ok(count);
                    }
                }
                message_start = Some(current_offset);
            }

            prev_line_was_empty = is_blank_line(&line_buf);
            first_line = false;
            current_offset += line_len;
        }

        if let Some(start) = message_start {
            count += 1;
            callback(MessageSpan {
                offset: start,
                length: current_offset - start,
            });
        }

        Ok(count)
    }

    /// Read a single message at the given span.
    ///
    /// Uses `seek` to jump directly to the message without scanning the file.
    pub fn read_message_at(path: impl AsRef<Path>, span: MessageSpan) -> Result<Vec<u8>> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| MailError::io(path, e))?;
        file.seek(SeekFrom::Start(span.offset))
            .map_err(|e| MailError::io(path, e))?;
        let mut buffer = vec![0u8; span.length as usize];
        file.read_exact(&mut buffer)
            .map_err(|e| MailError::io(path, e))?;
        Ok(buffer)
    }
}

/// Strip the `From ` separator line (and a leading BOM) from raw MBOX message bytes.
pub fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);
    if data.starts_with(b"From ") {
        if let Some(pos) = memchr_newline(data) {
            return &data[pos + 1..];
        }
    }
    data
}

/// Append one raw message (including its `From ` line) to `out`, keeping a
/// blank line between messages. Returns the number of bytes written.
pub fn write_message(out: &mut impl Write, raw: &[u8]) -> std::io::Result<u64> {
    out.write_all(raw)?;
    let mut written = raw.len() as u64;
    if !raw.ends_with(b"\n") {
        out.write_all(b"\n")?;
        written += 1;
    }
    if !raw.ends_with(b"\n\n") && !raw.ends_with(b"\r\n\r\n") {
        out.write_all(b"\n")?;
        written += 1;
    }
    Ok(written)
}

#[inline]
fn memchr_newline(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n')
}

/// Check whether a line is an MBOX separator (`From ` at the start).
fn is_mbox_separator(line: &[u8]) -> bool {
    let line = line.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(line);
    line.starts_with(b"From ")
}

/// Check whether a line is blank (empty or only whitespace / CR / LF).
fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}
