//! The normalized message record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::attachment::AttachmentRecord;

/// Which kind of preview body was selected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewKind {
    #[default]
    None,
    Html,
    Text,
}

impl PreviewKind {
    /// File name of the preview inside an archive entry.
    pub fn file_name(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Html => Some("preview.html"),
            Self::Text => Some("preview.txt"),
        }
    }
}

/// Canonical record built once per archive attempt.
///
/// Every downstream writer (metadata, index, preview, ignore rules) reads
/// from this record only. `size` and `content_hash` describe the exact bytes
/// later written to `message.eml`.
#[derive(Debug, Clone, Default)]
pub struct NormalizedMessage {
    /// Message-ID without angle brackets.
    pub message_id: Option<String>,

    /// Decoded subject line (RFC 2047 encoded-words resolved).
    pub subject: Option<String>,

    /// Sender address, lowercased.
    pub from: Option<String>,

    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,

    /// Capture time.
    pub sent_at: DateTime<Utc>,

    pub transport: String,

    /// Byte length of the raw message.
    pub size: u64,

    /// Hex SHA-256 of the raw message.
    pub content_hash: String,

    /// Value of the `X-Archive-Template` header, if any.
    pub template: Option<String>,

    pub preview_kind: PreviewKind,
    pub preview_body: Option<String>,

    /// Filled by attachment extraction.
    pub attachments: Vec<AttachmentRecord>,

    /// Attachment count estimated while normalizing; superseded by
    /// `attachments.len()` once extraction ran.
    pub attachment_hint: usize,
}

impl NormalizedMessage {
    /// All recipients (To, Cc, Bcc) in header order.
    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        self.to
            .iter()
            .chain(self.cc.iter())
            .chain(self.bcc.iter())
            .map(String::as_str)
    }

    pub fn has_preview(&self) -> bool {
        self.preview_kind != PreviewKind::None && self.preview_body.is_some()
    }

    /// Total bytes of persisted attachments.
    pub fn attachments_bytes(&self) -> u64 {
        self.attachments.iter().map(|a| a.size).sum()
    }
}
