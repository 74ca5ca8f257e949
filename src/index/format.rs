//! Daily index file format.
//!
//! ```text
//! <root>/index/<YYYY-MM-DD>
//!   {"archiveId":"093015_9f2c...","messageId":...,"path":"2024/05/17/093015_9f2c..."}\n
//!   {"archiveId":"101502_03ab...",...}\n
//! ```
//!
//! Files are append-only. Each line is a self-contained JSON object
//! summarizing one entry; `meta.json` in the entry holds the full record.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::store::meta::ArchiveMeta;

/// Directory under the archive root holding the daily index files.
pub const INDEX_DIR: &str = "index";

/// Summary of one archive entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexLine {
    pub archive_id: String,
    pub message_id: Option<String>,
    pub subject: Option<String>,
    pub from: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub sent_at: DateTime<Utc>,
    pub size: u64,
    pub has_preview: bool,
    pub template: Option<String>,
    pub path: String,
    pub attachments_count: usize,
    pub attachments_bytes: u64,
}

impl From<&ArchiveMeta> for IndexLine {
    fn from(meta: &ArchiveMeta) -> Self {
        Self {
            archive_id: meta.archive_id.clone(),
            message_id: meta.message_id.clone(),
            subject: meta.subject.clone(),
            from: meta.from.clone(),
            to: meta.to.clone(),
            cc: meta.cc.clone(),
            sent_at: meta.sent_at,
            size: meta.size,
            has_preview: meta.has_preview,
            template: meta.template.clone(),
            path: meta.path.clone(),
            attachments_count: meta.attachments_count,
            attachments_bytes: meta.attachments_bytes,
        }
    }
}

impl IndexLine {
    /// Serialize as one newline-terminated JSON line.
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Index file for `date`: `<root>/index/YYYY-MM-DD`.
pub fn day_file(root: &Path, date: NaiveDate) -> PathBuf {
    root.join(INDEX_DIR).join(date.format("%Y-%m-%d").to_string())
}
