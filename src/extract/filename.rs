//! Attachment filename allocation.
//!
//! A declared name is decoded, made safe for the filesystem, and then
//! disambiguated with a numeric suffix (`report_1.pdf`, `report_2.pdf`, …)
//! until it no longer collides with an existing file.

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::{MailError, Result};
use crate::model::structure::PartAddress;
use crate::parser::header::decode_encoded_words;

/// Upper bound on candidate names tried for one attachment.
pub const MAX_NAMING_ATTEMPTS: usize = 1000;

/// Name used when a declared name sanitizes to nothing.
const FALLBACK_NAME: &str = "attachment";

/// Maximum length of a sanitized name, in characters.
const MAX_NAME_LEN: usize = 200;

/// Derives non-colliding attachment filenames.
#[derive(Debug, Clone, Copy)]
pub struct FilenameAllocator {
    max_attempts: usize,
}

impl Default for FilenameAllocator {
    fn default() -> Self {
        Self {
            max_attempts: MAX_NAMING_ATTEMPTS,
        }
    }
}

impl FilenameAllocator {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Allocate a name for `declared` given an existence check on candidates.
    ///
    /// The first candidate is the cleaned name itself; after that the counter
    /// is inserted before the extension. A name without an extension gets
    /// the counter at the end.
    pub fn allocate(&self, declared: &str, exists: impl Fn(&str) -> bool) -> Result<String> {
        let name = safe_file_name(&decode_encoded_words(declared));
        let (base, ext) = split_extension(&name);

        for counter in 0..self.max_attempts {
            let candidate = if counter == 0 {
                name.clone()
            } else {
                format!("{base}_{counter}{ext}")
            };
            if !exists(&candidate) {
                return Ok(candidate);
            }
        }

        Err(MailError::NamingExhausted {
            name,
            attempts: self.max_attempts,
        })
    }

    /// Allocate a name that is free inside `dir`.
    pub fn allocate_in(&self, dir: &Path, declared: &str) -> Result<String> {
        self.allocate(declared, |candidate| dir.join(candidate).exists())
    }
}

/// Split `name` into base and extension; the extension keeps its dot.
///
/// A leading dot (`.profile`) is part of the base, not an extension.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => (&name[..pos], &name[pos..]),
        _ => (name, ""),
    }
}

/// Lower-cased extension without the dot, if any.
pub fn extension_of(name: &str) -> Option<String> {
    let (_, ext) = split_extension(name);
    ext.strip_prefix('.')
        .filter(|e| !e.is_empty())
        .map(str::to_ascii_lowercase)
}

/// Name for an embedded message that declares none:
/// `{YYYYMMDD-HHmm}_{uid}_{part}.eml`.
pub fn embedded_message_name(date: DateTime<Utc>, uid: u32, path: &PartAddress) -> String {
    let part = if path.is_root() {
        "1".to_string()
    } else {
        path.to_string()
    };
    format!("{}_{}_{}.eml", date.format("%Y%m%d-%H%M"), uid, part)
}

/// Make a declared name safe to join onto the output directory.
///
/// Path separators, reserved characters and control characters become `_`;
/// leading dots and surrounding whitespace are dropped so the result can
/// never name a parent directory or a hidden file.
pub fn safe_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(MAX_NAME_LEN)
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').trim_start();

    if cleaned.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;

    #[test]
    fn test_no_collision_keeps_name() {
        let allocator = FilenameAllocator::default();
        assert_eq!(allocator.allocate("report.pdf", |_| false).unwrap(), "report.pdf");
    }

    #[test]
    fn test_collisions_append_counter() {
        let taken: HashSet<&str> = ["report.pdf", "report_1.pdf", "report_2.pdf"].into();
        let allocator = FilenameAllocator::default();
        let name = allocator.allocate("report.pdf", |c| taken.contains(c)).unwrap();
        assert_eq!(name, "report_3.pdf");
    }

    #[test]
    fn test_name_without_extension() {
        let taken: HashSet<&str> = ["README"].into();
        let allocator = FilenameAllocator::default();
        assert_eq!(allocator.allocate("README", |c| taken.contains(c)).unwrap(), "README_1");
    }

    #[test]
    fn test_exhaustion_is_an_error() {
        let allocator = FilenameAllocator::new(5);
        let err = allocator.allocate("a.txt", |_| true).unwrap_err();
        assert!(matches!(err, MailError::NamingExhausted { attempts: 5, .. }));
    }

    #[test]
    fn test_encoded_word_name_is_decoded() {
        let allocator = FilenameAllocator::default();
        let name = allocator
            .allocate("=?UTF-8?B?w7xiZXIucGRm?=", |_| false)
            .unwrap();
        assert_eq!(name, "über.pdf");
    }

    #[test]
    fn test_allocate_in_directory() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("photo.png"), b"x").unwrap();
        let allocator = FilenameAllocator::default();
        assert_eq!(allocator.allocate_in(tmp.path(), "photo.png").unwrap(), "photo_1.png");
    }

    #[test]
    fn test_safe_file_name() {
        assert_eq!(safe_file_name("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(safe_file_name("my report.pdf"), "my report.pdf");
        assert_eq!(safe_file_name("a:b*c?.txt"), "a_b_c_.txt");
        assert_eq!(safe_file_name("..."), "attachment");
        assert_eq!(safe_file_name(".hidden"), "hidden");
    }

    #[test]
    fn test_extension_helpers() {
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_extension(".profile"), (".profile", ""));
        assert_eq!(extension_of("Doc.PDF").as_deref(), Some("pdf"));
        assert_eq!(extension_of("noext"), None);
    }

    #[test]
    fn test_embedded_message_name() {
        let date = Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 0).unwrap();
        let path: PartAddress = "2.1".parse().unwrap();
        assert_eq!(embedded_message_name(date, 42, &path), "20240305-1407_42_2.1.eml");
    }
}
