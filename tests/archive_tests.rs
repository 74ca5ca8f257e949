//! Integration tests for the archive pipeline: parsing, ignore rules, and the on-disk layout.

use std::path::{Path, PathBuf};

use assert_fs::prelude::*;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use predicates::prelude::*;

use mailarchiver::config::Config;
use mailarchiver::index::read_day;
use mailarchiver::model::attachment::Disposition;
use mailarchiver::normalize::{normalize, OutgoingMessage};
use mailarchiver::pipeline::{ArchiveOutcome, Archiver};
use mailarchiver::rules::SkipReason;
use mailarchiver::store::meta::ArchiveMeta;
use mailarchiver::store::sha256_hex;
use mailarchiver::store::writer::ArchivedEntry;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn read_fixture(name: &str) -> Vec<u8> {
    std::fs::read(fixture(name)).unwrap()
}

fn captured() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 17, 9, 30, 15).unwrap()
}

fn day() -> NaiveDate {
    captured().date_naive()
}

fn config_for(root: &Path) -> Config {
    let mut config = Config::default();
    config.archive.root = root.to_path_buf();
    config
}

fn archive(archiver: &Archiver, message: OutgoingMessage) -> ArchivedEntry {
    match archiver.archive(&message.captured_at(captured())).unwrap() {
        ArchiveOutcome::Archived(entry) => entry,
        other => panic!("expected the message to be archived, got {other:?}"),
    }
}

fn read_meta(entry: &ArchivedEntry) -> ArchiveMeta {
    let json = std::fs::read(entry.dir.join("meta.json")).unwrap();
    serde_json::from_slice(&json).unwrap()
}

// ─── Test 1: size and hash describe message.eml ─────────────────────

#[test]
fn test_size_and_hash_match_written_message() {
    let temp = assert_fs::TempDir::new().unwrap();
    let archiver = Archiver::from_config(&config_for(temp.path()));
    let raw = read_fixture("html_with_report.eml");

    let entry = archive(&archiver, OutgoingMessage::raw(raw.clone()));
    let written = std::fs::read(entry.dir.join("message.eml")).unwrap();

    assert_eq!(written, raw);
    let meta = read_meta(&entry);
    assert_eq!(meta.size, written.len() as u64);
    assert_eq!(meta.hash, sha256_hex(&written));
    assert_eq!(meta, entry.meta);
}

// ─── Test 2: HTML preview plus one attachment ───────────────────────

#[test]
fn test_html_and_report_round_trip() {
    let temp = assert_fs::TempDir::new().unwrap();
    let archiver = Archiver::from_config(&config_for(temp.path()));

    let entry = archive(
        &archiver,
        OutgoingMessage::raw(read_fixture("html_with_report.eml")),
    );
    let rel = format!("2024/05/17/{}", entry.archive_id);
    let dir = temp.child(&rel);

    dir.child("message.eml").assert(predicate::path::is_file());
    dir.child("meta.json").assert(predicate::path::is_file());
    dir.child("preview.txt").assert(predicate::path::missing());
    dir.child("preview.html")
        .assert(predicate::str::contains("<h1>Monthly report</h1>"))
        .assert(predicate::str::contains("report for May."));
    dir.child("attachments/1_report.pdf")
        .assert(predicate::path::is_file());
    let pdf = std::fs::read(dir.child("attachments/1_report.pdf").path()).unwrap();
    assert!(pdf.starts_with(b"%PDF-1.4"));

    let files: Vec<_> = std::fs::read_dir(dir.child("attachments").path())
        .unwrap()
        .collect();
    assert_eq!(files.len(), 1);

    let meta = read_meta(&entry);
    assert_eq!(meta.path, rel);
    assert!(meta.has_preview);
    assert_eq!(meta.attachments_count, 1);
    let record = &meta.attachments_meta[0];
    assert_eq!(record.stored_filename, "1_report.pdf");
    assert_eq!(record.original_name, "report.pdf");
    assert_eq!(record.disposition, Disposition::Attachment);
    assert_eq!(record.content_type.as_deref(), Some("application/pdf"));
    assert_eq!(meta.attachments_bytes, record.size);

    assert_eq!(meta.message_id.as_deref(), Some("report-2024-05@example.com"));
    assert_eq!(meta.from.as_deref(), Some("billing@example.com"));
    assert_eq!(meta.to, vec!["customer1@example.org", "customer2@example.org"]);
    assert_eq!(meta.cc, vec!["accounts@example.com"]);
}

// ─── Test 3: skip header leaves no trace ────────────────────────────

#[test]
fn test_skip_header_writes_nothing() {
    let temp = assert_fs::TempDir::new().unwrap();
    let archiver = Archiver::from_config(&config_for(temp.path()));

    let message = OutgoingMessage::raw(read_fixture("skip_header.eml")).captured_at(captured());
    let outcome = archiver.archive(&message).unwrap();

    assert!(matches!(outcome, ArchiveOutcome::Skipped(SkipReason::Requested)));
    temp.child("2024").assert(predicate::path::missing());
    temp.child("index/2024-05-17").assert(predicate::path::missing());
}

// ─── Test 4: sender rule ignores case ───────────────────────────────

#[test]
fn test_sender_rule_is_case_insensitive() {
    let temp = assert_fs::TempDir::new().unwrap();
    let mut config = config_for(temp.path());
    config.ignore.from = vec!["BILLING@example.COM".into()];
    let archiver = Archiver::from_config(&config);

    let message =
        OutgoingMessage::raw(read_fixture("html_with_report.eml")).captured_at(captured());
    let outcome = archiver.archive(&message).unwrap();

    assert!(matches!(outcome, ArchiveOutcome::Skipped(SkipReason::Sender(_))));
    temp.child("2024").assert(predicate::path::missing());
}

// ─── Test 5: invalid subject regex does not stop evaluation ─────────

#[test]
fn test_invalid_regex_falls_through() {
    let temp = assert_fs::TempDir::new().unwrap();
    let mut config = config_for(temp.path());
    config.ignore.subject_regex = vec!["/(unclosed/".into()];
    let archiver = Archiver::from_config(&config);

    // Only the broken rule: nothing matches, the message is archived
    archive(
        &archiver,
        OutgoingMessage::raw(read_fixture("html_with_report.eml")),
    );

    // A later rule still applies
    config.ignore.subject_regex = vec!["/(unclosed/".into(), "/monthly/i".into()];
    config.ignore.templates = vec!["promo".into()];
    let archiver = Archiver::from_config(&config);
    let message =
        OutgoingMessage::raw(read_fixture("html_with_report.eml")).captured_at(captured());
    assert!(matches!(
        archiver.archive(&message).unwrap(),
        ArchiveOutcome::Skipped(SkipReason::Subject(_))
    ));

    let message =
        OutgoingMessage::raw(read_fixture("nested_alternative.eml")).captured_at(captured());
    assert!(matches!(
        archiver.archive(&message).unwrap(),
        ArchiveOutcome::Skipped(SkipReason::Template(_))
    ));
}

// ─── Test 6: attachments are truncated to the cap ───────────────────

#[test]
fn test_attachment_truncated_to_cap() {
    let temp = assert_fs::TempDir::new().unwrap();
    let mut config = config_for(temp.path());
    config.archive.max_attachment_bytes = 16;
    let archiver = Archiver::from_config(&config);

    let entry = archive(
        &archiver,
        OutgoingMessage::raw(read_fixture("html_with_report.eml")),
    );
    let stored = std::fs::read(entry.dir.join("attachments").join("1_report.pdf")).unwrap();

    assert_eq!(stored.len(), 16);
    assert_eq!(&stored[..], b"%PDF-1.4\n1 0 obj");
    let record = &entry.meta.attachments_meta[0];
    assert_eq!(record.size, 16);
    assert_eq!(record.sha256, sha256_hex(&stored));
}

// ─── Test 7: preview truncation marker ──────────────────────────────

#[test]
fn test_preview_truncated_with_marker() {
    let temp = assert_fs::TempDir::new().unwrap();
    let mut config = config_for(temp.path());
    config.archive.max_preview_bytes = 12;
    let archiver = Archiver::from_config(&config);

    let entry = archive(
        &archiver,
        OutgoingMessage::raw(read_fixture("html_with_report.eml")),
    );
    let preview = std::fs::read_to_string(entry.dir.join("preview.html")).unwrap();
    assert!(preview.starts_with("<html><body>"));
    assert!(preview.ends_with("<!-- preview truncated -->\n"));
}

// ─── Test 8: encoded subject ────────────────────────────────────────

#[test]
fn test_encoded_subject_is_decoded() {
    let message = OutgoingMessage::raw(read_fixture("encoded_subject.eml"));
    let normalized = normalize(&message, "default");
    assert_eq!(normalized.subject.as_deref(), Some("Test"));
    assert_eq!(normalized.message_id.as_deref(), Some("encoded-subject@example.com"));
}

// ─── Test 9: inline image with Content-Id ───────────────────────────

#[test]
fn test_inline_logo_record() {
    let temp = assert_fs::TempDir::new().unwrap();
    let archiver = Archiver::from_config(&config_for(temp.path()));

    let entry = archive(&archiver, OutgoingMessage::raw(read_fixture("inline_logo.eml")));

    assert_eq!(entry.meta.attachments_count, 1);
    let record = &entry.meta.attachments_meta[0];
    assert_eq!(record.disposition, Disposition::Inline);
    assert_eq!(record.content_id.as_deref(), Some("logo1"));
    assert_eq!(record.original_name, "logo.png");
    assert_eq!(record.stored_filename, "1_logo.png");
    assert_eq!(record.size, 512);
    assert!(entry.meta.has_preview);
}

// ─── Test 10: nested multipart and RFC 2231 filename ────────────────

#[test]
fn test_nested_alternative_with_extended_filename() {
    let temp = assert_fs::TempDir::new().unwrap();
    let archiver = Archiver::from_config(&config_for(temp.path()));

    let entry = archive(
        &archiver,
        OutgoingMessage::raw(read_fixture("nested_alternative.eml")),
    );

    assert_eq!(entry.meta.subject.as_deref(), Some("Café offer"));
    assert_eq!(entry.meta.template.as_deref(), Some("Promo"));
    let preview = std::fs::read_to_string(entry.dir.join("preview.html")).unwrap();
    assert_eq!(preview, "<p>Café for everyone</p>");

    let record = &entry.meta.attachments_meta[0];
    assert_eq!(record.original_name, "price list €.csv");
    assert_eq!(record.stored_filename, "1_price list _.csv");
    let csv = std::fs::read_to_string(entry.dir.join("attachments").join("1_price list _.csv"))
        .unwrap();
    assert!(csv.starts_with("item,price"));
}

// ─── Test 11: object-model source ───────────────────────────────────

#[test]
fn test_parsed_source_archives_same_layout() {
    let temp = assert_fs::TempDir::new().unwrap();
    let archiver = Archiver::from_config(&config_for(temp.path()));
    let raw = read_fixture("html_with_report.eml");

    let message = OutgoingMessage::parsed(&raw).unwrap();
    let entry = archive(&archiver, message);

    assert_eq!(std::fs::read(entry.dir.join("message.eml")).unwrap(), raw);
    assert_eq!(entry.meta.subject.as_deref(), Some("Your monthly report"));
    assert_eq!(entry.meta.from.as_deref(), Some("billing@example.com"));
    let record = &entry.meta.attachments_meta[0];
    assert_eq!(record.stored_filename, "1_report.pdf");
    assert!(entry.dir.join("preview.html").is_file());
}

// ─── Test 12: root bootstrap ────────────────────────────────────────

#[test]
fn test_root_bootstrap_marker() {
    let temp = assert_fs::TempDir::new().unwrap();
    let archiver = Archiver::from_config(&config_for(temp.path()));
    archive(
        &archiver,
        OutgoingMessage::raw(read_fixture("encoded_subject.eml")),
    );

    temp.child(".gitignore").assert("*\n!.gitignore\n");
    temp.child("index").assert(predicate::path::is_dir());
    temp.child("index/2024-05-17")
        .assert(predicate::str::contains("\"subject\":\"Test\""));
}

// ─── Test 13: concurrent writers on the same day ────────────────────

#[test]
fn test_concurrent_archives_append_distinct_lines() {
    let temp = assert_fs::TempDir::new().unwrap();
    let config = config_for(temp.path());
    let raw = read_fixture("html_with_report.eml");

    std::thread::scope(|scope| {
        for _ in 0..2 {
            // Separate handles, as separate processes would have
            let archiver = Archiver::from_config(&config);
            let raw = raw.clone();
            scope.spawn(move || {
                for _ in 0..5 {
                    archive(&archiver, OutgoingMessage::raw(raw.clone()));
                }
            });
        }
    });

    let content = std::fs::read_to_string(temp.path().join("index").join("2024-05-17")).unwrap();
    assert_eq!(content.lines().count(), 10);
    for line in content.lines() {
        serde_json::from_str::<serde_json::Value>(line).unwrap();
    }

    let entries = read_day(temp.path(), day()).unwrap();
    assert_eq!(entries.len(), 10);
    let mut ids: Vec<&str> = entries.iter().map(|e| e.archive_id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 10);
    for entry in &entries {
        assert!(temp.path().join(&entry.path).join("meta.json").is_file());
    }
}

// ─── Attachment estimate agrees with extraction ─────────────────────

#[test]
fn test_attachment_estimate_matches_extraction() {
    let temp = assert_fs::TempDir::new().unwrap();
    let archiver = Archiver::from_config(&config_for(temp.path()));

    for name in ["html_with_report.eml", "inline_logo.eml", "nested_alternative.eml"] {
        let raw = read_fixture(name);
        let message = OutgoingMessage::raw(raw.clone());
        let estimate = normalize(&message, "default").attachment_hint;
        assert!(estimate > 0, "{name}");
        assert_eq!(archive(&archiver, message).meta.attachments_count, estimate, "{name}");

        let message = OutgoingMessage::parsed(&raw).unwrap();
        let estimate = normalize(&message, "default").attachment_hint;
        assert_eq!(archive(&archiver, message).meta.attachments_count, estimate, "{name}");
    }
}
