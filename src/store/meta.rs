//! `meta.json`: the full metadata document of one archive entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::attachment::AttachmentRecord;
use crate::model::message::NormalizedMessage;

/// Metadata written next to `message.eml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveMeta {
    pub archive_id: String,
    pub message_id: Option<String>,
    pub subject: Option<String>,
    pub from: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub sent_at: DateTime<Utc>,
    pub transport: String,
    pub size: u64,
    /// Hex SHA-256 of `message.eml`.
    pub hash: String,
    pub has_preview: bool,
    pub template: Option<String>,
    /// Entry directory relative to the archive root, `/`-separated.
    pub path: String,
    pub attachments_count: usize,
    pub attachments_bytes: u64,
    pub attachments_meta: Vec<AttachmentRecord>,
}

impl ArchiveMeta {
    pub fn new(normalized: &NormalizedMessage, archive_id: &str, path: &str) -> Self {
        Self {
            archive_id: archive_id.to_string(),
            message_id: normalized.message_id.clone(),
            subject: normalized.subject.clone(),
            from: normalized.from.clone(),
            to: normalized.to.clone(),
            cc: normalized.cc.clone(),
            bcc: normalized.bcc.clone(),
            sent_at: normalized.sent_at,
            transport: normalized.transport.clone(),
            size: normalized.size,
            hash: normalized.content_hash.clone(),
            has_preview: normalized.has_preview(),
            template: normalized.template.clone(),
            path: path.to_string(),
            attachments_count: normalized.attachments.len(),
            attachments_bytes: normalized.attachments_bytes(),
            attachments_meta: normalized.attachments.clone(),
        }
    }
}
