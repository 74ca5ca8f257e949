//! Email address extraction (pragmatic RFC 5322 §3.4).
//!
//! Archive metadata only keeps bare, lowercased addresses. Display names are
//! discarded and anything that does not look like `local@domain` is dropped.

use std::sync::OnceLock;

use regex::Regex;

fn address_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9.-]*[A-Za-z0-9])?")
            .expect("valid address regex")
    })
}

/// Lowercase and trim an address for comparison.
pub fn normalize_address(raw: &str) -> String {
    let bare = raw.trim();
    let bare = bare.strip_prefix('<').unwrap_or(bare);
    let bare = bare.strip_suffix('>').unwrap_or(bare);
    bare.trim().to_lowercase()
}

/// Extract the single address from one list segment, either a bare
/// `user@domain` or the part inside `<...>` after a display name.
pub fn parse_address(raw: &str) -> Option<String> {
    let trimmed = raw.trim();

    // Prefer the angle-bracketed part so an address-like display name is ignored
    let candidate = match (trimmed.rfind('<'), trimmed.rfind('>')) {
        (Some(start), Some(end)) if end > start => &trimmed[start + 1..end],
        _ => trimmed,
    };

    address_re()
        .find(candidate)
        .map(|m| m.as_str().trim_end_matches('.').to_lowercase())
}

/// Parse a comma-separated address header into lowercased, deduplicated
/// addresses, keeping first-seen order.
///
/// Separators inside a quoted display name or an angle-bracketed address do
/// not split: `"Last, First" <a@b.com>, other@c.com` yields two addresses.
pub fn parse_address_list(raw: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for segment in split_segments(raw) {
        if let Some(addr) = parse_address(segment) {
            if !found.contains(&addr) {
                found.push(addr);
            }
        }
    }
    found
}

/// Split on top-level `,` and `;`.
fn split_segments(raw: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut quoted = false;
    let mut bracketed = false;
    let mut start = 0;

    for (idx, ch) in raw.char_indices() {
        match ch {
            '"' => quoted = !quoted,
            '<' if !quoted => bracketed = true,
            '>' if !quoted => bracketed = false,
            ',' | ';' if !quoted && !bracketed => {
                segments.push(&raw[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    segments.push(&raw[start..]);
    segments
}

/// Merge `extra` into `list`, skipping addresses already present.
pub fn merge_unique(list: &mut Vec<String>, extra: impl IntoIterator<Item = String>) {
    for addr in extra {
        let addr = normalize_address(&addr);
        if !addr.is_empty() && !list.contains(&addr) {
            list.push(addr);
        }
    }
}
