//! Integration tests: run whole batches against MBOX folders on disk.

use std::path::{Path, PathBuf};

use assert_fs::prelude::*;
use predicates::prelude::*;

use mailsift::error_log::{ErrorLog, ErrorSink};
use mailsift::extract::{AssembleOptions, InlineMode, MessageAssembler};
use mailsift::fetch::{self, FetchOptions, FetchReport, SortOrder};
use mailsift::model::structure::{MimeType, PartAddress};
use mailsift::parser::structure::parse_structure;
use mailsift::store::mbox::MboxTransport;
use mailsift::store::transport::MailTransport;

// ─── Fixtures ───────────────────────────────────────────────────────

/// Text body, a nested multipart with two attachments and an unnamed
/// forwarded message at 2.3, and a plain attachment at 3.
const WITH_ATTACHMENTS: &str = "From alice@example.com Mon Jan 15 09:05:00 2024
From: Alice <alice@example.com>
To: bob@example.com
Subject: Invoice January
Date: Mon, 15 Jan 2024 09:05:00 +0000
Message-ID: <inv-1@example.com>
MIME-Version: 1.0
Content-Type: multipart/mixed; boundary=\"outer\"

--outer
Content-Type: text/plain; charset=utf-8

Hello Bob,
the invoice is attached.
--outer
Content-Type: multipart/mixed; boundary=\"inner\"

--inner
Content-Type: application/pdf; name=\"invoice.pdf\"
Content-Disposition: attachment; filename=\"invoice.pdf\"
Content-Transfer-Encoding: base64

JVBERi0xLjQK
--inner
Content-Type: text/plain; charset=utf-8; name=\"notes.txt\"
Content-Transfer-Encoding: quoted-printable

caf=C3=A9 notes
--inner
Content-Type: message/rfc822

Subject: forwarded
From: carol@example.com

forwarded body
--inner--
--outer
Content-Type: image/png; name=\"logo.png\"
Content-Disposition: attachment
Content-Transfer-Encoding: base64

iVBORw0KGgo=
--outer--

";

/// HTML body referencing an inline image twice.
const WITH_INLINE_IMAGE: &str = "From alice@example.com Tue Jan 16 10:00:00 2024
From: Alice <alice@example.com>
Subject: =?UTF-8?Q?Newsletter_f=C3=BCr_Bob?=
Date: Tue, 16 Jan 2024 10:00:00 +0000
Message-ID: <news-1@example.com>
Content-Type: multipart/related; boundary=\"rel\"

--rel
Content-Type: text/html; charset=utf-8

<p><img src=\"cid:logo@x\"></p><p><img src=\"cid:logo@x\"></p>
--rel
Content-Type: image/png; name=\"logo.png\"
Content-Disposition: inline
Content-ID: <logo@x>
Content-Transfer-Encoding: base64

iVBORw0KGgo=
--rel--

";

/// Plain text only, two senders and an undisclosed Cc list.
const PLAIN_ONLY: &str = "From dave@example.org Wed Jan 17 11:30:00 2024
From: Dave <dave@example.org>, erin@example.org
Cc: undisclosed-recipients:;
Subject: plain text
Date: Wed, 17 Jan 2024 11:30:00 +0000
Message-ID: <plain-1@example.org>

Just text & nothing else.

";

struct Mailbox {
    _dir: tempfile::TempDir,
    root: PathBuf,
}

impl Mailbox {
    fn new(messages: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        std::fs::write(root.join("INBOX.mbox"), messages.concat()).unwrap();
        Self { _dir: dir, root }
    }

    fn open(&self) -> MboxTransport {
        MboxTransport::open(&self.root, None).unwrap()
    }
}

fn all_messages() -> Mailbox {
    Mailbox::new(&[WITH_ATTACHMENTS, WITH_INLINE_IMAGE, PLAIN_ONLY])
}

fn run(
    transport: &mut MboxTransport,
    assemble: AssembleOptions,
    options: &FetchOptions,
) -> (FetchReport, ErrorLog) {
    let mut errors = ErrorLog::new();
    let report = fetch::get_messages(
        transport,
        &mut errors,
        &MessageAssembler::new(assemble),
        options,
        None,
    )
    .unwrap();
    (report, errors)
}

fn unlimited() -> FetchOptions {
    FetchOptions::default()
}

fn inbox_count(root: &Path) -> usize {
    MboxTransport::open(root, None).unwrap().message_count()
}

// ─── Structure walk ─────────────────────────────────────────────────

#[test]
fn test_part_addresses_follow_declared_order() {
    let raw = WITH_ATTACHMENTS.split_once('\n').unwrap().1;
    let parsed = parse_structure(raw.as_bytes());
    let forwarded = parsed
        .root
        .find(&"2.3".parse::<PartAddress>().unwrap())
        .unwrap();
    assert_eq!(forwarded.mime_type, MimeType::Message);
    assert_eq!(forwarded.subtype, "rfc822");

    let pdf = parsed.root.find(&"2.1".parse::<PartAddress>().unwrap()).unwrap();
    assert_eq!(pdf.subtype, "pdf");
}

#[test]
fn test_every_attachment_gets_its_own_file() {
    let mailbox = all_messages();
    let out = assert_fs::TempDir::new().unwrap();
    let mut transport = mailbox.open();

    let (report, errors) = run(&mut transport, AssembleOptions::new(out.path()), &unlimited());

    assert!(errors.is_empty(), "unexpected errors: {:?}", errors.entries());
    assert_eq!(report.messages.len(), 3);

    let first = &report.messages[0];
    assert_eq!(
        first.attachments,
        vec![
            "invoice.pdf",
            "notes.txt",
            "20240115-0905_1_2.3.eml",
            "logo.png"
        ]
    );
    for name in &first.attachments {
        out.child(name).assert(predicate::path::is_file());
    }
    assert_eq!(std::fs::read(out.path().join("invoice.pdf")).unwrap(), b"%PDF-1.4\n");
    out.child("notes.txt").assert(predicate::str::contains("café notes"));
    out.child("20240115-0905_1_2.3.eml")
        .assert(predicate::str::contains("forwarded body"));
    assert_eq!(
        std::fs::read(out.path().join("logo.png")).unwrap(),
        [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]
    );
}

#[test]
fn test_same_name_in_later_message_is_suffixed() {
    let mailbox = all_messages();
    let out = assert_fs::TempDir::new().unwrap();
    let mut transport = mailbox.open();

    let (report, _) = run(&mut transport, AssembleOptions::new(out.path()), &unlimited());

    assert_eq!(report.messages[1].attachments, vec!["logo_1.png"]);
    out.child("logo.png").assert(predicate::path::is_file());
    out.child("logo_1.png").assert(predicate::path::is_file());
}

#[test]
fn test_allow_list_skips_other_extensions() {
    let mailbox = all_messages();
    let out = assert_fs::TempDir::new().unwrap();
    let mut transport = mailbox.open();
    let mut options = AssembleOptions::new(out.path());
    options.walk = options.walk.with_allowed_extensions("pdf");

    let (report, errors) = run(&mut transport, options, &unlimited());

    assert!(errors.is_empty());
    assert_eq!(report.messages.len(), 3);
    assert_eq!(report.messages[0].attachments, vec!["invoice.pdf"]);
    assert!(report.messages[1].attachments.is_empty());
    out.child("invoice.pdf").assert(predicate::path::exists());
    out.child("notes.txt").assert(predicate::path::missing());
    out.child("logo.png").assert(predicate::path::missing());
}

// ─── Bodies and addresses ───────────────────────────────────────────

#[test]
fn test_inline_image_rewrite_first_only() {
    let mailbox = all_messages();
    let out = assert_fs::TempDir::new().unwrap();
    let mut transport = mailbox.open();

    let (report, _) = run(&mut transport, AssembleOptions::new(out.path()), &unlimited());

    let newsletter = &report.messages[1];
    assert_eq!(newsletter.subject, "Newsletter für Bob");
    let html = newsletter.message.html.as_deref().unwrap();
    let saved = out.path().join("logo_1.png");
    assert!(html.starts_with(&format!("<p><img src=\"{}\"></p>", saved.display())));
    assert!(html.contains("<img src=\"cid:logo@x\">"));
}

#[test]
fn test_inline_image_rewrite_all() {
    let mailbox = Mailbox::new(&[WITH_INLINE_IMAGE]);
    let out = assert_fs::TempDir::new().unwrap();
    let mut transport = mailbox.open();
    let mut options = AssembleOptions::new(out.path());
    options.inline_mode = InlineMode::All;

    let (report, _) = run(&mut transport, options, &unlimited());

    let html = report.messages[0].message.html.as_deref().unwrap();
    assert!(!html.contains("cid:"));
    assert_eq!(html.matches("logo.png").count(), 2);
}

#[test]
fn test_plain_body_and_address_filtering() {
    let mailbox = Mailbox::new(&[PLAIN_ONLY]);
    let out = assert_fs::TempDir::new().unwrap();
    let mut transport = mailbox.open();

    let (report, _) = run(&mut transport, AssembleOptions::new(out.path()), &unlimited());

    let message = &report.messages[0];
    assert_eq!(
        message.message.text.as_deref(),
        Some("Just text &amp; nothing else.")
    );
    assert_eq!(message.message.html, None);
    assert_eq!(message.from.len(), 2);
    assert_eq!(message.from[0].name.as_deref(), Some("Dave"));
    assert_eq!(message.from[1].address, "erin@example.org");
    assert!(message.cc.is_empty());
    assert_eq!(message.message_id, "<plain-1@example.org>");
}

// ─── Archive files ──────────────────────────────────────────────────

#[test]
fn test_archive_file_per_message() {
    let mailbox = all_messages();
    let out = assert_fs::TempDir::new().unwrap();
    let mut transport = mailbox.open();

    run(&mut transport, AssembleOptions::new(out.path()), &unlimited());

    out.child("20240115-0905_alice@example.com.eml")
        .assert(predicate::str::starts_with("From: Alice <alice@example.com>"))
        .assert(predicate::str::contains("--outer--"));
    out.child("20240117-1130_dave@example.org.eml")
        .assert(predicate::str::contains("Subject: plain text"))
        .assert(predicate::str::contains("Just text & nothing else."));
}

#[test]
fn test_no_archive_when_disabled() {
    let mailbox = Mailbox::new(&[PLAIN_ONLY]);
    let out = assert_fs::TempDir::new().unwrap();
    let mut transport = mailbox.open();
    let mut options = AssembleOptions::new(out.path());
    options.save_to_file = false;

    run(&mut transport, options, &unlimited());

    out.child("20240117-1130_dave@example.org.eml")
        .assert(predicate::path::missing());
}

// ─── Batch behavior ─────────────────────────────────────────────────

#[test]
fn test_attachments_required_gates_follow_up() {
    let mailbox = all_messages();
    let out = assert_fs::TempDir::new().unwrap();
    let mut transport = mailbox.open();
    let mut options = AssembleOptions::new(out.path());
    options.attachments_required = true;
    let fetch = FetchOptions {
        delete_after_read: true,
        ..FetchOptions::default()
    };

    let (report, _) = run(&mut transport, options, &fetch);

    let processed: Vec<bool> = report.messages.iter().map(|m| m.process).collect();
    assert_eq!(processed, vec![true, true, false]);
    assert_eq!(report.deleted, 2);
    assert_eq!(inbox_count(&mailbox.root), 1);
}

#[test]
fn test_move_to_folder_with_limit() {
    let mailbox = all_messages();
    let out = assert_fs::TempDir::new().unwrap();
    let mut transport = mailbox.open();
    let fetch = FetchOptions {
        limit: 2,
        move_to_folder: Some("Archive".to_string()),
        ..FetchOptions::default()
    };

    let (report, _) = run(&mut transport, AssembleOptions::new(out.path()), &fetch);

    assert_eq!(report.messages.len(), 2);
    assert_eq!(report.moved, 2);
    assert_eq!(transport.list_folders().unwrap(), vec!["Archive", "INBOX"]);
    assert_eq!(inbox_count(&mailbox.root), 1);
    let archive = MboxTransport::open(&mailbox.root, Some("Archive")).unwrap();
    assert_eq!(archive.message_count(), 2);
}

#[test]
fn test_descending_order() {
    let mailbox = all_messages();
    let out = assert_fs::TempDir::new().unwrap();
    let mut transport = mailbox.open();
    let fetch = FetchOptions {
        sort_order: SortOrder::Desc,
        limit: 1,
        ..FetchOptions::default()
    };
    let mut options = AssembleOptions::new(out.path());
    options.save_to_file = false;

    let (report, _) = run(&mut transport, options, &fetch);

    assert_eq!(report.messages.len(), 1);
    assert_eq!(report.messages[0].subject, "plain text");
    assert_eq!(report.messages[0].message_number, 3);
}

#[test]
fn test_delete_all_after_batch() {
    let mailbox = all_messages();
    let out = assert_fs::TempDir::new().unwrap();
    let mut transport = mailbox.open();
    let mut options = AssembleOptions::new(out.path());
    options.save_to_file = false;

    let (report, _) = run(&mut transport, options, &unlimited());
    let deleted = fetch::delete_all(&mut transport, &report.messages).unwrap();

    assert_eq!(deleted, 3);
    assert_eq!(inbox_count(&mailbox.root), 0);
}

#[test]
fn test_output_dir_is_created() {
    let mailbox = Mailbox::new(&[PLAIN_ONLY]);
    let out = assert_fs::TempDir::new().unwrap();
    let nested = out.child("a").child("b");
    let mut transport = mailbox.open();

    run(&mut transport, AssembleOptions::new(nested.path()), &unlimited());

    nested.assert(predicate::path::is_dir());
}

#[test]
fn test_error_log_flush_format() {
    let logs = assert_fs::TempDir::new().unwrap();
    let mut errors = ErrorLog::new();
    errors.record("Attachments directory is not writable! Message ID: 7".to_string());

    let path = errors.flush(logs.path()).unwrap().unwrap();

    assert_eq!(path, logs.path().join("errors.txt"));
    logs.child("errors.txt")
        .assert(predicate::str::starts_with("\r\n"))
        .assert(predicate::str::ends_with(" - Attachments directory is not writable! Message ID: 7"));
}

#[test]
fn test_extracted_message_serializes_to_json() {
    let mailbox = Mailbox::new(&[PLAIN_ONLY]);
    let out = assert_fs::TempDir::new().unwrap();
    let mut transport = mailbox.open();
    let mut options = AssembleOptions::new(out.path());
    options.save_to_file = false;

    let (report, _) = run(&mut transport, options, &unlimited());
    let json = serde_json::to_value(&report.messages[0]).unwrap();

    assert_eq!(json["subject"], "plain text");
    assert_eq!(json["from"][1]["address"], "erin@example.org");
    assert_eq!(json["process"], true);
}
