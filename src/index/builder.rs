//! Appending entries to the daily index.

use std::path::Path;

use tracing::debug;

use crate::error::Result;
use crate::index::format::{day_file, IndexLine};
use crate::store::fs::ArchiveFs;
use crate::store::meta::ArchiveMeta;

/// Append the summary of `meta` to the index of its capture day.
///
/// The line is written with a single locked append, so concurrent writers
/// (threads or processes) never interleave partial lines.
pub fn append_line<F: ArchiveFs + ?Sized>(fs: &F, root: &Path, meta: &ArchiveMeta) -> Result<()> {
    let path = day_file(root, meta.sent_at.date_naive());
    let line = IndexLine::from(meta).to_line()?;
    fs.append_locked(&path, line.as_bytes())?;
    debug!(path = %path.display(), archive_id = %meta.archive_id, "Index line appended");
    Ok(())
}
