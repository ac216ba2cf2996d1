//! In-memory mailbox holding raw RFC 5322 messages.
//!
//! Same addressing rules as [`MboxTransport`](super::mbox::MboxTransport),
//! without touching the filesystem. Useful for embedding and benchmarks.

use std::collections::{BTreeMap, HashSet};

use crate::error::{MailError, Result};
use crate::model::message::{HeaderInfo, Overview};
use crate::model::structure::{MimeNode, PartAddress};
use crate::parser::header::{parse_header_info, parse_overview};
use crate::parser::mbox::skip_from_line;
use crate::parser::structure::{parse_structure, ParsedStructure};
use crate::store::transport::MailTransport;

struct StoredMessage {
    uid: u32,
    raw: Vec<u8>,
    structure: ParsedStructure,
    deleted: bool,
}

impl StoredMessage {
    fn header_block(&self) -> &[u8] {
        &self.raw[..self.structure.header_len()]
    }
}

/// A mailbox folder kept entirely in memory.
pub struct MemoryTransport {
    folder: String,
    messages: Vec<StoredMessage>,
    /// Raw messages moved out of the selected folder, by target folder.
    moved: BTreeMap<String, Vec<Vec<u8>>>,
    unreadable: HashSet<u32>,
    next_uid: u32,
    expunge_count: usize,
}

impl MemoryTransport {
    pub fn new(folder: &str) -> Self {
        Self {
            folder: folder.to_string(),
            messages: Vec::new(),
            moved: BTreeMap::new(),
            unreadable: HashSet::new(),
            next_uid: 1,
            expunge_count: 0,
        }
    }

    /// Add a raw message and return its UID.
    pub fn push(&mut self, raw: &[u8]) -> u32 {
        let raw = skip_from_line(raw).to_vec();
        let structure = parse_structure(&raw);
        let uid = self.next_uid;
        self.next_uid += 1;
        self.messages.push(StoredMessage {
            uid,
            raw,
            structure,
            deleted: false,
        });
        uid
    }

    /// Make every fetch for `uid` fail, as a broken server response would.
    pub fn set_unreadable(&mut self, uid: u32) {
        self.unreadable.insert(uid);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages moved into `folder` so far.
    pub fn moved_to(&self, folder: &str) -> usize {
        self.moved.get(folder).map_or(0, Vec::len)
    }

    /// How many times [`expunge`](MailTransport::expunge) was called.
    pub fn expunge_count(&self) -> usize {
        self.expunge_count
    }

    fn message(&self, uid: u32) -> Result<&StoredMessage> {
        if self.unreadable.contains(&uid) {
            return Err(MailError::MimeError(format!("message {uid} is unreadable")));
        }
        self.messages
            .iter()
            .find(|m| m.uid == uid)
            .ok_or(MailError::UnknownMessage(uid))
    }

    fn message_mut(&mut self, uid: u32) -> Result<&mut StoredMessage> {
        self.messages
            .iter_mut()
            .find(|m| m.uid == uid)
            .ok_or(MailError::UnknownMessage(uid))
    }
}

impl MailTransport for MemoryTransport {
    fn search_all(&mut self) -> Result<Vec<u32>> {
        Ok((1..=self.messages.len() as u32).collect())
    }

    fn uid_for(&mut self, message_number: u32) -> Result<u32> {
        message_number
            .checked_sub(1)
            .and_then(|i| self.messages.get(i as usize))
            .map(|m| m.uid)
            .ok_or(MailError::UnknownMessage(message_number))
    }

    fn fetch_overview(&mut self, uid: u32) -> Result<Overview> {
        let message = self.message(uid)?;
        Ok(parse_overview(message.header_block(), uid))
    }

    fn fetch_headers(&mut self, uid: u32) -> Result<HeaderInfo> {
        let message = self.message(uid)?;
        Ok(parse_header_info(message.header_block()))
    }

    fn fetch_structure(&mut self, uid: u32) -> Result<MimeNode> {
        Ok(self.message(uid)?.structure.root.clone())
    }

    fn fetch_part(&mut self, uid: u32, path: &PartAddress) -> Result<Vec<u8>> {
        let message = self.message(uid)?;
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
        self.message_mut(uid)?.deleted = true;
        Ok(())
    }

    fn move_message(&mut self, uid: u32, target_folder: &str) -> Result<()> {
        let message = self.message_mut(uid)?;
        message.deleted = true;
        let raw = message.raw.clone();
        self.moved
            .entry(target_folder.to_string())
            .or_default()
            .push(raw);
        Ok(())
    }

    fn expunge(&mut self) -> Result<()> {
        self.messages.retain(|m| !m.deleted);
        self.expunge_count += 1;
        Ok(())
    }

    fn list_folders(&mut self) -> Result<Vec<String>> {
        let mut folders: Vec<String> = std::iter::once(self.folder.clone())
            .chain(self.moved.keys().cloned())
            .collect();
        folders.sort();
        folders.dedup();
        Ok(folders)
    }
}
