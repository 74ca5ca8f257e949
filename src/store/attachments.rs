//! Attachment extraction into an entry's `attachments/` directory.
//!
//! Parsed messages use the attachment list of the object model. Raw
//! messages are walked part by part: `attachment` parts always count,
//! `inline` parts only when they carry a filename.

use std::borrow::Cow;
use std::path::Path;

use mail_parser::{Message, MimeHeaders};
use tracing::debug;

use super::filename::{sanitize_filename, DEFAULT_ATTACHMENT_NAME};
use super::fs::ArchiveFs;
use super::sha256_hex;
use crate::error::Result;
use crate::model::attachment::{AttachmentRecord, Disposition};
use crate::normalize::MessageSource;
use crate::parser::header::strip_angle_brackets;
use crate::parser::mime::{leaf_parts, skip_from_line, Part};

/// Result of extracting a message's attachments.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub items: Vec<AttachmentRecord>,
    /// Sum of persisted sizes.
    pub total_bytes: u64,
}

impl Extraction {
    pub fn count(&self) -> usize {
        self.items.len()
    }
}

/// An attachment found in the message, before persisting.
struct Candidate<'a> {
    original_name: String,
    content_type: Option<String>,
    disposition: Disposition,
    content_id: Option<String>,
    bytes: Cow<'a, [u8]>,
}

/// Persist every attachment of `source` under `dir`.
///
/// Files are named `<n>_<sanitized name>` with `n` starting at 1. Content
/// beyond `max_bytes` is dropped; the records describe what was written.
/// `dir` is only created when there is at least one attachment.
pub fn extract<F: ArchiveFs + ?Sized>(
    fs: &F,
    source: &MessageSource,
    dir: &Path,
    max_bytes: usize,
) -> Result<Extraction> {
    let raw_root;
    let candidates = match source {
        MessageSource::Parsed(model) => model_candidates(model),
        MessageSource::Raw { bytes, .. } => {
            raw_root = Part::parse(skip_from_line(bytes));
            scanned_candidates(&raw_root)
        }
    };

    let mut extraction = Extraction::default();
    if candidates.is_empty() {
        return Ok(extraction);
    }
    fs.create_dir_all(dir)?;

    for (i, candidate) in candidates.into_iter().enumerate() {
        let stored_filename = format!("{}_{}", i + 1, sanitize_filename(&candidate.original_name));
        let data = &candidate.bytes[..candidate.bytes.len().min(max_bytes)];
        if data.len() < candidate.bytes.len() {
            debug!(
                name = %stored_filename,
                original = candidate.bytes.len(),
                cap = max_bytes,
                "Attachment truncated"
            );
        }

        fs.write_file(&dir.join(&stored_filename), data)?;

        extraction.total_bytes += data.len() as u64;
        extraction.items.push(AttachmentRecord {
            stored_filename,
            original_name: candidate.original_name,
            content_type: candidate.content_type,
            size: data.len() as u64,
            sha256: sha256_hex(data),
            disposition: candidate.disposition,
            content_id: candidate.content_id,
        });
    }

    Ok(extraction)
}

fn model_candidates<'a>(model: &'a Message<'_>) -> Vec<Candidate<'a>> {
    model
        .attachments()
        .map(|part| {
            let original_name = part
                .content_disposition()
                .and_then(|cd| cd.attribute("filename"))
                .or_else(|| part.content_type().and_then(|ct| ct.attribute("name")))
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .unwrap_or(DEFAULT_ATTACHMENT_NAME)
                .to_string();

            let disposition = match part.content_disposition() {
                Some(cd) if cd.ctype().eq_ignore_ascii_case("inline") => Disposition::Inline,
                _ => Disposition::Attachment,
            };

            let content_type = part.content_type().map(|ct| {
                let mime = match ct.subtype() {
                    Some(sub) => format!("{}/{}", ct.ctype(), sub),
                    None => ct.ctype().to_string(),
                };
                mime.to_lowercase()
            });

            Candidate {
                original_name,
                content_type,
                disposition,
                content_id: part
                    .content_id()
                    .map(strip_angle_brackets)
                    .filter(|id| !id.is_empty()),
                bytes: Cow::Borrowed(part.contents()),
            }
        })
        .collect()
}

fn scanned_candidates<'a>(root: &Part<'a>) -> Vec<Candidate<'a>> {
    leaf_parts(root)
        .into_iter()
        .filter_map(|part| {
            let disposition = part.attachment_disposition()?;
            Some(Candidate {
                original_name: part
                    .filename()
                    .unwrap_or_else(|| DEFAULT_ATTACHMENT_NAME.to_string()),
                content_type: part.declared_type(),
                disposition,
                content_id: part.content_id(),
                bytes: part.decoded_body(),
            })
        })
        .collect()
}
