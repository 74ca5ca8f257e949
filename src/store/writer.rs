//! Archive entry writer.
//!
//! ```text
//! <root>/.gitignore
//! <root>/index/<YYYY-MM-DD>
//! <root>/<YYYY>/<MM>/<DD>/<archiveId>/message.eml
//! <root>/<YYYY>/<MM>/<DD>/<archiveId>/preview.html | preview.txt
//! <root>/<YYYY>/<MM>/<DD>/<archiveId>/attachments/<n>_<name>
//! <root>/<YYYY>/<MM>/<DD>/<archiveId>/meta.json
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::attachments;
use super::fs::{ArchiveFs, LocalFs};
use super::meta::ArchiveMeta;
use crate::config::{ArchiveConfig, DEFAULT_MAX_ATTACHMENT_BYTES, DEFAULT_MAX_PREVIEW_BYTES};
use crate::error::{ArchiveError, Result};
use crate::index::builder::append_line;
use crate::index::format::INDEX_DIR;
use crate::model::message::{NormalizedMessage, PreviewKind};
use crate::normalize::MessageSource;

pub const MESSAGE_FILE: &str = "message.eml";
pub const META_FILE: &str = "meta.json";
pub const ATTACHMENTS_DIR: &str = "attachments";

/// Marker keeping the archive out of version control.
const GITIGNORE_FILE: &str = ".gitignore";
const GITIGNORE_CONTENT: &str = "*\n!.gitignore\n";

const HTML_TRUNCATION_MARKER: &str = "\n<!-- preview truncated -->\n";
const TEXT_TRUNCATION_MARKER: &str = "\n[preview truncated]\n";

/// A written archive entry.
#[derive(Debug, Clone)]
pub struct ArchivedEntry {
    pub archive_id: String,
    /// Absolute entry directory.
    pub dir: PathBuf,
    pub meta: ArchiveMeta,
}

/// Handle on an archive root.
///
/// The root is bootstrapped (index directory and `.gitignore`) on first
/// write through this handle. Bootstrapping is idempotent, so several
/// handles or processes may share one root.
#[derive(Debug)]
pub struct ArchiveStore<F: ArchiveFs = LocalFs> {
    root: PathBuf,
    fs: F,
    max_preview_bytes: usize,
    max_attachment_bytes: usize,
    bootstrapped: AtomicBool,
}

impl ArchiveStore<LocalFs> {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_fs(root, LocalFs)
    }

    pub fn from_config(config: &ArchiveConfig) -> Self {
        Self::new(&config.root).with_limits(config.max_preview_bytes, config.max_attachment_bytes)
    }
}

impl<F: ArchiveFs> ArchiveStore<F> {
    pub fn with_fs(root: impl Into<PathBuf>, fs: F) -> Self {
        Self {
            root: root.into(),
            fs,
            max_preview_bytes: DEFAULT_MAX_PREVIEW_BYTES,
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
            bootstrapped: AtomicBool::new(false),
        }
    }

    pub fn with_limits(mut self, max_preview_bytes: usize, max_attachment_bytes: usize) -> Self {
        self.max_preview_bytes = max_preview_bytes;
        self.max_attachment_bytes = max_attachment_bytes;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root, its `index/` directory and the `.gitignore` marker.
    pub fn ensure_root(&self) -> Result<()> {
        if self.bootstrapped.load(Ordering::Acquire) {
            return Ok(());
        }
        if self.fs.exists(&self.root) && !self.fs.is_dir(&self.root) {
            return Err(ArchiveError::InvalidRoot(self.root.clone()));
        }

        self.fs.create_dir_all(&self.root.join(INDEX_DIR))?;
        let marker = self.root.join(GITIGNORE_FILE);
        if !self.fs.exists(&marker) {
            self.fs.write_file(&marker, GITIGNORE_CONTENT.as_bytes())?;
        }

        self.bootstrapped.store(true, Ordering::Release);
        debug!(root = %self.root.display(), "Archive root ready");
        Ok(())
    }

    /// Write a new archive entry for `normalized`.
    ///
    /// `source` must be the message `normalized` was built from; its raw
    /// bytes are stored verbatim. On failure the partially written entry
    /// directory is removed and the error returned.
    pub fn write(
        &self,
        normalized: &NormalizedMessage,
        source: &MessageSource,
    ) -> Result<ArchivedEntry> {
        self.ensure_root()?;

        let archive_id = generate_archive_id(normalized.sent_at);
        let relative = entry_relative_path(normalized.sent_at, &archive_id);
        let dir = self.root.join(&relative);

        self.fs.create_dir_all(&dir)?;

        match self.write_entry(normalized, source, &archive_id, &relative, &dir) {
            Ok(meta) => Ok(ArchivedEntry {
                archive_id,
                dir,
                meta,
            }),
            Err(e) => {
                if let Err(cleanup) = self.fs.remove_dir_all(&dir) {
                    warn!(
                        path = %dir.display(),
                        error = %cleanup,
                        "Could not remove incomplete archive entry"
                    );
                }
                Err(e)
            }
        }
    }

    fn write_entry(
        &self,
        normalized: &NormalizedMessage,
        source: &MessageSource,
        archive_id: &str,
        relative: &str,
        dir: &Path,
    ) -> Result<ArchiveMeta> {
        self.fs
            .write_file(&dir.join(MESSAGE_FILE), source.raw_bytes())?;

        if let (Some(name), Some(body)) = (
            normalized.preview_kind.file_name(),
            normalized.preview_body.as_deref(),
        ) {
            let preview = truncate_preview(body, normalized.preview_kind, self.max_preview_bytes);
            self.fs.write_file(&dir.join(name), preview.as_bytes())?;
        }

        let extraction = attachments::extract(
            &self.fs,
            source,
            &dir.join(ATTACHMENTS_DIR),
            self.max_attachment_bytes,
        )?;
        if extraction.count() != normalized.attachment_hint {
            debug!(
                expected = normalized.attachment_hint,
                extracted = extraction.count(),
                "Attachment count differs from the normalized estimate"
            );
        }
        let mut record = normalized.clone();
        record.attachments = extraction.items;

        let meta = ArchiveMeta::new(&record, archive_id, relative);
        let json = serde_json::to_vec_pretty(&meta)?;
        self.fs.write_file(&dir.join(META_FILE), &json)?;

        append_line(&self.fs, &self.root, &meta)?;
        Ok(meta)
    }
}

/// `<HHMMSS>_<16 hex chars>` from the capture time and 8 random bytes.
pub fn generate_archive_id(captured_at: DateTime<Utc>) -> String {
    let random: [u8; 8] = rand::random();
    let hex: String = random.iter().map(|b| format!("{b:02x}")).collect();
    format!("{}_{hex}", captured_at.format("%H%M%S"))
}

/// `YYYY/MM/DD/<archive_id>`, always `/`-separated.
pub fn entry_relative_path(captured_at: DateTime<Utc>, archive_id: &str) -> String {
    format!("{}/{archive_id}", captured_at.format("%Y/%m/%d"))
}

/// Cut `body` to at most `max_bytes` (on a char boundary) and append the
/// kind's truncation marker when something was cut.
pub fn truncate_preview(body: &str, kind: PreviewKind, max_bytes: usize) -> String {
    if body.len() <= max_bytes {
        return body.to_string();
    }
    let mut end = max_bytes;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    let marker = match kind {
        PreviewKind::Html => HTML_TRUNCATION_MARKER,
        _ => TEXT_TRUNCATION_MARKER,
    };
    format!("{}{marker}", &body[..end])
}
