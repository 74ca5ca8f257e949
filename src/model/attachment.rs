//! Attachment metadata.
//!
//! Records describe what was actually persisted under `attachments/`, so
//! `size` and `sha256` reflect the stored (possibly truncated) bytes.

use serde::{Deserialize, Serialize};

/// How the part was presented in the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    /// A regular attachment.
    Attachment,
    /// Inline content that carried a filename (e.g. an embedded logo).
    Inline,
}

/// Metadata about one persisted attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRecord {
    /// Name on disk: `<ordinal>_<sanitized name>`, ordinal starting at 1.
    pub stored_filename: String,

    /// Best-effort original filename (a fixed default when none was found).
    pub original_name: String,

    /// MIME content type (e.g. `"image/png"`), when declared.
    pub content_type: Option<String>,

    /// Bytes actually written.
    pub size: u64,

    /// Hex SHA-256 of the written bytes.
    pub sha256: String,

    pub disposition: Disposition,

    /// Content-ID without angle brackets, for inline-referenced parts.
    pub content_id: Option<String>,
}
