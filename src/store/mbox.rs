//! Local mailbox backed by MBOX files.
//!
//! A directory of `*.mbox` files is a mailbox whose folders are the file
//! stems. Opening a single `.mbox` file selects it as the current folder and
//! treats its siblings as the other folders.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use lru::LruCache;
use tracing::{debug, info};

use crate::error::{MailError, Result};
use crate::model::message::{HeaderInfo, Overview};
use crate::model::structure::{MimeNode, PartAddress};
use crate::parser::header::{parse_header_info, parse_overview};
use crate::parser::mbox::{skip_from_line, write_message, MboxParser, MessageSpan};
use crate::parser::structure::{parse_structure, ParsedStructure};
use crate::store::transport::MailTransport;

/// Default number of parsed messages to keep in the LRU cache.
const DEFAULT_CACHE_SIZE: usize = 50;

/// Folder selected when a directory is opened without one.
pub const DEFAULT_FOLDER: &str = "INBOX";

const MBOX_EXTENSION: &str = "mbox";

#[derive(Debug, Clone)]
struct Entry {
    uid: u32,
    span: MessageSpan,
    deleted: bool,
}

/// One message read from disk and parsed once.
struct CachedMessage {
    /// Message bytes without the `From ` separator line.
    raw: Vec<u8>,
    structure: ParsedStructure,
}

impl CachedMessage {
    fn header_block(&self) -> &[u8] {
        &self.raw[..self.structure.header_len()]
    }
}

/// MBOX-backed implementation of [`MailTransport`].
pub struct MboxTransport {
    root: PathBuf,
    folder: String,
    path: PathBuf,
    entries: Vec<Entry>,
    next_uid: u32,
    cache: LruCache<u32, Rc<CachedMessage>>,
}

impl MboxTransport {
    /// Open a mailbox directory (or a single `.mbox` file) and select a folder.
    pub fn open(path: impl AsRef<Path>, folder: Option<&str>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MailError::FileNotFound(path.to_path_buf())
            } else {
                MailError::io(path, e)
            }
        })?;

        let (root, default_folder) = if metadata.is_dir() {
            (path.to_path_buf(), DEFAULT_FOLDER.to_string())
        } else {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| MailError::InvalidMailbox(path.to_path_buf()))?;
            let parent = path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            (parent, stem.to_string())
        };

        let folder = folder.map(str::to_string).unwrap_or(default_folder);
        let folder_path = if metadata.is_file() && folder == folder_stem(path) {
            path.to_path_buf()
        } else {
            folder_file(&root, &folder)
        };

        let cache_size =
            NonZeroUsize::new(DEFAULT_CACHE_SIZE).expect("DEFAULT_CACHE_SIZE is non-zero");
        let mut transport = Self {
            root,
            folder,
            path: folder_path,
            entries: Vec::new(),
            next_uid: 1,
            cache: LruCache::new(cache_size),
        };
        transport.rescan()?;
        info!(
            folder = %transport.folder,
            messages = transport.entries.len(),
            "Opened mailbox folder"
        );
        Ok(transport)
    }

    pub fn folder_name(&self) -> &str {
        &self.folder
    }

    pub fn folder_path(&self) -> &Path {
        &self.path
    }

    pub fn message_count(&self) -> usize {
        self.entries.len()
    }

    /// Assign UIDs to every message currently in the folder file.
    fn rescan(&mut self) -> Result<()> {
        let parser = MboxParser::new(&self.path)?;
        let mut spans = Vec::new();
        parser.scan(&mut |span| {
            spans.push(span);
            true
        })?;
        self.entries = spans
            .into_iter()
            .map(|span| {
                let uid = self.next_uid;
                self.next_uid += 1;
                Entry {
                    uid,
                    span,
                    deleted: false,
                }
            })
            .collect();
        self.cache.clear();
        Ok(())
    }

    fn entry(&self, uid: u32) -> Result<&Entry> {
        self.entries
            .iter()
            .find(|e| e.uid == uid)
            .ok_or(MailError::UnknownMessage(uid))
    }

    fn entry_mut(&mut self, uid: u32) -> Result<&mut Entry> {
        self.entries
            .iter_mut()
            .find(|e| e.uid == uid)
            .ok_or(MailError::UnknownMessage(uid))
    }

    /// Read and parse a message, or return the cached copy.
    fn load(&mut self, uid: u32) -> Result<Rc<CachedMessage>> {
        if let Some(cached) = self.cache.get(&uid) {
            return Ok(Rc::clone(cached));
        }
        let span = self.entry(uid)?.span;
        debug!(uid, offset = span.offset, length = span.length, "Reading message from MBOX");
        let data = MboxParser::read_message_at(&self.path, span)?;
        let raw = skip_from_line(&data).to_vec();
        let structure = parse_structure(&raw);
        let message = Rc::new(CachedMessage {
            raw,
            structure,
        });
        self.cache.put(uid, Rc::clone(&message));
        Ok(message)
    }
}

impl MailTransport for MboxTransport {
    fn search_all(&mut self) -> Result<Vec<u32>> {
        Ok((1..=self.entries.len() as u32).collect())
    }

    fn uid_for(&mut self, message_number: u32) -> Result<u32> {
        message_number
            .checked_sub(1)
            .and_then(|i| self.entries.get(i as usize))
            .map(|e| e.uid)
            .ok_or(MailError::UnknownMessage(message_number))
    }

    fn fetch_overview(&mut self, uid: u32) -> Result<Overview> {
        let message = self.load(uid)?;
        Ok(parse_overview(message.header_block(), uid))
    }

    fn fetch_headers(&mut self, uid: u32) -> Result<HeaderInfo> {
        let message = self.load(uid)?;
        Ok(parse_header_info(message.header_block()))
    }

    fn fetch_structure(&mut self, uid: u32) -> Result<MimeNode> {
        let message = self.load(uid)?;
        Ok(message.structure.root.clone())
    }

    fn fetch_part(&mut self, uid: u32, path: &PartAddress) -> Result<Vec<u8>> {
        let message = self.load(uid)?;
        message
            .structure
            .part_bytes(&message.raw, path)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| MailError::UnknownPart {
                uid,
                path: path.to_string(),
            })
    }

    fn delete_message(&mut self, uid: u32) -> Result<()> {
        self.entry_mut(uid)?.deleted = true;
        debug!(uid, "Flagged message as deleted");
        Ok(())
    }

    fn move_message(&mut self, uid: u32, target_folder: &str) -> Result<()> {
        let span = self.entry(uid)?.span;
        let target = folder_file(&self.root, target_folder);
        if target == self.path {
            return Ok(());
        }
        let data = MboxParser::read_message_at(&self.path, span)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&target)
            .map_err(|e| MailError::io(&target, e))?;
        let mut writer = BufWriter::new(file);
        write_message(&mut writer, &data)
            .and_then(|_| writer.flush())
            .map_err(|e| MailError::io(&target, e))?;
        self.entry_mut(uid)?.deleted = true;
        debug!(uid, target = target_folder, "Moved message");
        Ok(())
    }

    fn expunge(&mut self) -> Result<()> {
        if !self.entries.iter().any(|e| e.deleted) {
            return Ok(());
        }

        let tmp_path = self.path.with_extension("mbox.tmp");
        let file = File::create(&tmp_path).map_err(|e| MailError::io(&tmp_path, e))?;
        let mut writer = BufWriter::new(file);
        let mut kept = Vec::with_capacity(self.entries.len());
        let mut offset = 0u64;

        for entry in &self.entries {
            if entry.deleted {
                self.cache.pop(&entry.uid);
                continue;
            }
            let data = MboxParser::read_message_at(&self.path, entry.span)?;
            let written =
                write_message(&mut writer, &data).map_err(|e| MailError::io(&tmp_path, e))?;
            kept.push(Entry {
                uid: entry.uid,
                span: MessageSpan {
                    offset,
                    length: written,
                },
                deleted: false,
            });
            offset += written;
        }
        writer.flush().map_err(|e| MailError::io(&tmp_path, e))?;
        drop(writer);

        std::fs::rename(&tmp_path, &self.path).map_err(|e| MailError::io(&self.path, e))?;
        let removed = self.entries.len() - kept.len();
        self.entries = kept;
        // Offsets changed; parsed bodies are still valid but cheap to drop.
        self.cache.clear();
        info!(folder = %self.folder, removed, "Expunged folder");
        Ok(())
    }

    fn list_folders(&mut self) -> Result<Vec<String>> {
        list_folders_in(&self.root)
    }
}

/// Folder names (file stems of `*.mbox` files) in a mailbox directory, sorted.
pub fn list_folders_in(root: &Path) -> Result<Vec<String>> {
    let dir = std::fs::read_dir(root).map_err(|e| MailError::io(root, e))?;
    let mut folders: Vec<String> = dir
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == MBOX_EXTENSION))
        .map(|p| folder_stem(&p))
        .filter(|name| !name.is_empty())
        .collect();
    folders.sort();
    Ok(folders)
}

fn folder_file(root: &Path, folder: &str) -> PathBuf {
    root.join(format!("{folder}.{MBOX_EXTENSION}"))
}

fn folder_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIRST: &str = "From a@x Thu Jan 01 00:00:00 2024\n\
Subject: one\n\
From: Alice <alice@example.com>\n\
Message-ID: <one@example.com>\n\n\
body one\n\n";

    const SECOND: &str = "From b@x Thu Jan 01 00:00:00 2024\n\
Subject: two\n\
Content-Type: multipart/mixed; boundary=zz\n\n\
--zz\n\
Content-Type: text/plain\n\n\
part text\n\
--zz--\n";

    fn mailbox() -> (tempfile::TempDir, MboxTransport) {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("INBOX.mbox"), format!("{FIRST}{SECOND}")).unwrap();
        std::fs::write(tmp.path().join("Archive.mbox"), "").unwrap();
        let transport = MboxTransport::open(tmp.path(), None).unwrap();
        (tmp, transport)
    }

    #[test]
    fn test_open_directory_selects_inbox() {
        let (_tmp, mut transport) = mailbox();
        assert_eq!(transport.folder_name(), "INBOX");
        assert_eq!(transport.search_all().unwrap(), vec![1, 2]);
        assert_eq!(transport.uid_for(2).unwrap(), 2);
        assert!(transport.uid_for(0).is_err());
    }

    #[test]
    fn test_fetch_overview_and_headers() {
        let (_tmp, mut transport) = mailbox();
        let overview = transport.fetch_overview(1).unwrap();
        assert_eq!(overview.subject.as_deref(), Some("one"));
        assert_eq!(overview.message_id, "<one@example.com>");

        let headers = transport.fetch_headers(1).unwrap();
        assert_eq!(headers.from[0].full_address(), "alice@example.com");
        assert!(headers.raw.starts_with(b"Subject: one"));
    }

    #[test]
    fn test_fetch_part_paths() {
        let (_tmp, mut transport) = mailbox();
        let part = transport.fetch_part(2, &"1".parse().unwrap()).unwrap();
        assert_eq!(part, b"part text");
        let root = transport.fetch_part(1, &PartAddress::root()).unwrap();
        assert_eq!(root, b"body one\n\n");
        let missing = transport.fetch_part(2, &"7".parse().unwrap());
        assert!(matches!(missing, Err(MailError::UnknownPart { .. })));
    }

    #[test]
    fn test_move_and_expunge_keep_uids() {
        let (tmp, mut transport) = mailbox();
        transport.move_message(1, "Archive").unwrap();
        transport.expunge().unwrap();

        assert_eq!(transport.message_count(), 1);
        assert_eq!(transport.uid_for(1).unwrap(), 2);
        let overview = transport.fetch_overview(2).unwrap();
        assert_eq!(overview.subject.as_deref(), Some("two"));

        let archive = MboxTransport::open(tmp.path(), Some("Archive")).unwrap();
        assert_eq!(archive.message_count(), 1);
    }

    #[test]
    fn test_delete_unknown_uid() {
        let (_tmp, mut transport) = mailbox();
        assert!(matches!(
            transport.delete_message(99),
            Err(MailError::UnknownMessage(99))
        ));
    }

    #[test]
    fn test_list_folders_sorted() {
        let (_tmp, mut transport) = mailbox();
        assert_eq!(transport.list_folders().unwrap(), vec!["Archive", "INBOX"]);
    }

    #[test]
    fn test_open_single_file() {
        let (tmp, _) = mailbox();
        let transport = MboxTransport::open(tmp.path().join("INBOX.mbox"), None).unwrap();
        assert_eq!(transport.folder_name(), "INBOX");
        assert_eq!(transport.message_count(), 2);
    }
}
