//! Reading daily index files back.

use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::NaiveDate;
use tracing::warn;

use crate::error::{ArchiveError, Result};
use crate::index::format::{day_file, IndexLine};

/// All entries recorded for `date`, in append order.
///
/// A missing file means nothing was archived that day. Lines that do not
/// parse are skipped with a warning.
pub fn read_day(root: &Path, date: NaiveDate) -> Result<Vec<IndexLine>> {
    let path = day_file(root, date);
    let file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ArchiveError::io(&path, e)),
    };

    let mut entries = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| ArchiveError::io(&path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<IndexLine>(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!(path = %path.display(), line = number + 1, error = %e, "Skipping corrupt index line");
            }
        }
    }
    Ok(entries)
}

/// Total attachment bytes and message bytes across `entries`.
pub fn totals(entries: &[IndexLine]) -> (u64, u64) {
    entries
        .iter()
        .fold((0, 0), |(msgs, atts), e| (msgs + e.size, atts + e.attachments_bytes))
}
