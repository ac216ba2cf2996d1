//! Archive messages as individual `.eml` files.
//!
//! The file content comes from a template with two placeholders, one for the
//! raw header block and one for the raw body. The default template is just
//! the two placeholders, which yields the original message bytes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{MailError, Result};

/// Replaced by the raw header block.
pub const RAW_HEADER_PLACEHOLDER: &str = "[TPL_RAW_HEADER]";
/// Replaced by the raw message body.
pub const MESSAGE_PLACEHOLDER: &str = "[TPL_MESSAGE]";

/// Template used when none is configured.
pub const DEFAULT_TEMPLATE: &str = "[TPL_RAW_HEADER][TPL_MESSAGE]";

/// Maximum length of the sender part of an archive filename.
const MAX_FROM_LEN: usize = 100;

/// Archival file skeleton.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveTemplate {
    text: String,
}

impl Default for ArchiveTemplate {
    fn default() -> Self {
        Self::from_text(DEFAULT_TEMPLATE)
    }
}

impl ArchiveTemplate {
    pub fn from_text(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }

    /// Read a template file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| MailError::io(path, e))?;
        if !text.contains(RAW_HEADER_PLACEHOLDER) && !text.contains(MESSAGE_PLACEHOLDER) {
            return Err(MailError::ExportError(format!(
                "template '{}' contains neither {RAW_HEADER_PLACEHOLDER} nor {MESSAGE_PLACEHOLDER}",
                path.display()
            )));
        }
        Ok(Self { text })
    }

    /// Substitute both placeholders.
    ///
    /// Inserted text is never scanned again, so a body that happens to
    /// contain a placeholder is written as is.
    pub fn render(&self, raw_header: &[u8], raw_body: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.text.len() + raw_header.len() + raw_body.len());
        for (i, segment) in self.text.split(RAW_HEADER_PLACEHOLDER).enumerate() {
            if i > 0 {
                out.extend_from_slice(raw_header);
            }
            for (j, piece) in segment.split(MESSAGE_PLACEHOLDER).enumerate() {
                if j > 0 {
                    out.extend_from_slice(raw_body);
                }
                out.extend_from_slice(piece.as_bytes());
            }
        }
        out
    }
}

/// `{YYYYMMDD-HHmm}[_{from}].eml`
pub fn archive_file_name(date: DateTime<Utc>, from_address: &str) -> String {
    let date = date.format("%Y%m%d-%H%M");
    if from_address.trim().is_empty() {
        format!("{date}.eml")
    } else {
        format!(
            "{date}_{}.eml",
            sanitize_filename_part(from_address.trim(), MAX_FROM_LEN)
        )
    }
}

/// Render and write one archive file, replacing any file of the same name.
///
/// Returns the path written.
pub fn write_archive(
    output_dir: &Path,
    date: DateTime<Utc>,
    from_address: &str,
    template: &ArchiveTemplate,
    raw_header: &[u8],
    raw_body: &[u8],
) -> Result<PathBuf> {
    let path = output_dir.join(archive_file_name(date, from_address));
    let content = template.render(raw_header, raw_body);
    std::fs::write(&path, &content).map_err(|e| MailError::io(&path, e))?;
    debug!(path = %path.display(), bytes = content.len(), "Wrote archive file");
    Ok(path)
}

/// Sanitize a string for use in filenames.
///
/// Replaces invalid characters with `_` and truncates to `max_len`.
pub fn sanitize_filename_part(s: &str, max_len: usize) -> String {
    let sanitized: String = s
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '@' {
                c
            } else {
                '_'
            }
        })
        .take(max_len)
        .collect();

    if sanitized.is_empty() {
        "unknown".to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename_part("hello world", 20), "hello_world");
        assert_eq!(
            sanitize_filename_part("user@example.com", 30),
            "user@example.com"
        );
        assert_eq!(sanitize_filename_part("a/b\\c:d*e", 20), "a_b_c_d_e");
        assert_eq!(sanitize_filename_part("", 20), "unknown");
    }

    #[test]
    fn test_default_template_is_header_then_body() {
        let template = ArchiveTemplate::default();
        let out = template.render(b"Subject: x\r\n\r\n", b"body\r\n");
        assert_eq!(out, b"Subject: x\r\n\r\nbody\r\n");
    }

    #[test]
    fn test_placeholders_in_content_are_not_expanded() {
        let template = ArchiveTemplate::from_text("H:[TPL_RAW_HEADER]|B:[TPL_MESSAGE]|");
        let out = template.render(b"[TPL_MESSAGE]", b"[TPL_RAW_HEADER]");
        assert_eq!(out, b"H:[TPL_MESSAGE]|B:[TPL_RAW_HEADER]|");
    }

    #[test]
    fn test_archive_file_name() {
        let date = Utc.with_ymd_and_hms(2024, 1, 15, 9, 5, 0).unwrap();
        assert_eq!(
            archive_file_name(date, "alice@example.com"),
            "20240115-0905_alice@example.com.eml"
        );
        assert_eq!(archive_file_name(date, ""), "20240115-0905.eml");
    }

    #[test]
    fn test_write_archive_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let date = Utc.with_ymd_and_hms(2024, 1, 15, 9, 5, 0).unwrap();
        let template = ArchiveTemplate::default();
        write_archive(tmp.path(), date, "a@b.c", &template, b"H\n\n", b"one").unwrap();
        let path = write_archive(tmp.path(), date, "a@b.c", &template, b"H\n\n", b"two").unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"H\n\ntwo");
    }

    #[test]
    fn test_load_template_without_placeholders() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("template.eml");
        std::fs::write(&path, "nothing here").unwrap();
        assert!(matches!(
            ArchiveTemplate::load(&path),
            Err(MailError::ExportError(_))
        ));
    }
}
