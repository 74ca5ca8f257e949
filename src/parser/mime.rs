//! MIME structure: header parameters, boundary detection, and multipart splitting.
//!
//! This is a pragmatic parser for raw bytes. It never fails; when the
//! structure cannot be recovered the message is treated as one opaque part.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::bytes::Regex;
use tracing::debug;

use percent_encoding::percent_decode_str;

use super::decode::{decode_charset, decode_text, decode_transfer};
use super::header::{self, strip_angle_brackets, Headers};
use crate::model::attachment::Disposition;

/// Maximum depth for nested multipart descent (adversarial input guard).
pub const MAX_DEPTH: usize = 10;

/// Number of non-empty body lines scanned when guessing a boundary.
const BOUNDARY_SCAN_LINES: usize = 10;

/// One MIME entity: its headers and its still-encoded body.
#[derive(Debug, Clone)]
pub struct Part<'a> {
    pub headers: Headers,
    pub body: &'a [u8],
}

impl<'a> Part<'a> {
    /// Split raw bytes into headers and body.
    pub fn parse(data: &'a [u8]) -> Self {
        let (head, body) = header::split_message(data);
        Self {
            headers: Headers::parse(head),
            body,
        }
    }

    /// Lowercase MIME type (`"text/plain"` when absent).
    pub fn mime_type(&self) -> String {
        self.headers
            .get("content-type")
            .map(media_type)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "text/plain".to_string())
    }

    /// Declared MIME type, `None` when the header is missing.
    pub fn declared_type(&self) -> Option<String> {
        self.headers
            .get("content-type")
            .map(media_type)
            .filter(|t| !t.is_empty())
    }

    pub fn is_multipart(&self) -> bool {
        self.mime_type().starts_with("multipart/")
    }

    /// Lowercase disposition type (`"attachment"`, `"inline"`).
    pub fn disposition(&self) -> Option<String> {
        self.headers
            .get("content-disposition")
            .map(media_type)
            .filter(|t| !t.is_empty())
    }

    pub fn transfer_encoding(&self) -> Option<&str> {
        self.headers.get("content-transfer-encoding")
    }

    pub fn charset(&self) -> Option<String> {
        self.headers
            .get("content-type")
            .and_then(|ct| param(ct, "charset"))
    }

    /// Content-ID without angle brackets.
    pub fn content_id(&self) -> Option<String> {
        self.headers
            .get("content-id")
            .map(strip_angle_brackets)
            .filter(|id| !id.is_empty())
    }

    /// Body with the transfer encoding reversed.
    pub fn decoded_body(&self) -> Cow<'a, [u8]> {
        decode_transfer(self.transfer_encoding(), self.body)
    }

    /// Body decoded to UTF-8 text.
    pub fn decoded_text(&self) -> String {
        decode_text(
            self.transfer_encoding(),
            self.charset().as_deref(),
            self.body,
        )
    }

    /// Best-effort original filename.
    ///
    /// Priority: `Content-Disposition` `filename*` (RFC 2231/5987), then
    /// `filename`, then `Content-Type` `name*`/`name`. Encoded-words and any
    /// leftover `charset''value` encoding are decoded.
    pub fn filename(&self) -> Option<String> {
        let disposition = self.headers.get("content-disposition");
        let content_type = self.headers.get("content-type");

        let raw = disposition
            .and_then(|d| extended_param(d, "filename").map(|v| decode_rfc2231(&v)))
            .or_else(|| disposition.and_then(|d| param(d, "filename")))
            .or_else(|| content_type.and_then(|ct| param(ct, "name")))
            .or_else(|| {
                content_type.and_then(|ct| extended_param(ct, "name").map(|v| decode_rfc2231(&v)))
            })?;

        let decoded = if residual_charset_re().is_match(&raw) {
            decode_rfc2231(&raw)
        } else {
            raw
        };
        let decoded = header::decode_encoded_words(decoded.trim());
        let decoded = decoded.trim();
        (!decoded.is_empty()).then(|| decoded.to_string())
    }

    /// Whether this part is stored as an attachment, and how.
    ///
    /// `attachment` parts always count; `inline` parts only with a filename.
    pub fn attachment_disposition(&self) -> Option<Disposition> {
        match self.disposition().as_deref() {
            Some("attachment") => Some(Disposition::Attachment),
            Some("inline") if self.filename().is_some() => Some(Disposition::Inline),
            _ => None,
        }
    }
}

fn charset_prefix_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"^([A-Za-z0-9_.:-]*)'[A-Za-z0-9-]*'(.*)$").expect("valid charset regex")
    })
}

/// A plain `filename=` value that still carries `charset''` (no language).
/// Stricter than the extended grammar so names with apostrophes survive.
fn residual_charset_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"^[A-Za-z0-9_.:-]+''.*$").expect("valid charset regex")
    })
}

/// Decode an RFC 2231 value: strip `charset'lang'`, percent-decode, and
/// convert from the charset (UTF-8 when none is given).
pub fn decode_rfc2231(value: &str) -> String {
    let (charset, encoded) = match charset_prefix_re().captures(value) {
        Some(caps) => (
            caps.get(1).map_or("", |m| m.as_str()).to_string(),
            caps.get(2).map_or("", |m| m.as_str()).to_string(),
        ),
        None => (String::new(), value.to_string()),
    };
    let bytes: Vec<u8> = percent_decode_str(&encoded).collect();
    let charset = if charset.is_empty() { "utf-8" } else { charset.as_str() };
    decode_charset(charset, &bytes)
}

/// The value before the first `;`, lowercased.
pub fn media_type(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .trim_matches('"')
        .to_ascii_lowercase()
}

/// Split a structured header value into `(lowercase name, value)` parameters.
///
/// Quoted values are unquoted (`\"` unescaped). Semicolons inside quotes do
/// not split. The leading media type is not returned.
pub fn parse_params(value: &str) -> Vec<(String, String)> {
    let mut segments: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for ch in value.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => {
                current.push(ch);
                escaped = true;
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ';' if !in_quotes => {
                segments.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    segments.push(current);

    segments
        .into_iter()
        .skip(1)
        .filter_map(|segment| {
            let (name, raw) = segment.split_once('=')?;
            let name = name.trim().to_ascii_lowercase();
            if name.is_empty() {
                return None;
            }
            Some((name, unquote(raw.trim())))
        })
        .collect()
}

fn unquote(raw: &str) -> String {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        let inner = &raw[1..raw.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else {
                out.push(c);
            }
        }
        out
    } else {
        raw.trim_matches('"').to_string()
    }
}

/// Look up one parameter by name (case-insensitive).
pub fn param(value: &str, name: &str) -> Option<String> {
    let name = name.to_ascii_lowercase();
    parse_params(value)
        .into_iter()
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

/// RFC 2231 extended parameter: `name*=charset'lang'value` or the
/// continuation form `name*0*=…; name*1*=…`, joined in order.
///
/// Returns the still percent-encoded value, including any `charset''` prefix.
pub fn extended_param(value: &str, name: &str) -> Option<String> {
    let name = name.to_ascii_lowercase();
    let params = parse_params(value);

    let prefix = format!("{name}*");
    if let Some((_, v)) = params.iter().find(|(k, _)| *k == prefix) {
        return Some(v.clone());
    }

    let mut sections: Vec<(usize, String)> = params
        .iter()
        .filter_map(|(k, v)| {
            let rest = k.strip_prefix(&prefix)?;
            let index = rest.trim_end_matches('*').parse::<usize>().ok()?;
            Some((index, v.clone()))
        })
        .collect();
    if sections.is_empty() {
        return None;
    }
    sections.sort_by_key(|(index, _)| *index);
    Some(sections.into_iter().map(|(_, v)| v).collect())
}

fn delimiter_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^--([0-9A-Za-z'()+_,./:=?-]{1,200}?)(?:--)?[ \t]*\r?$")
            .expect("valid boundary regex")
    })
}

/// Find the multipart boundary of an entity.
///
/// The `boundary` parameter of `Content-Type` wins. When it is missing or
/// empty and the entity is (or may be) multipart, the first non-empty body
/// lines are scanned for a `--token` delimiter line.
pub fn find_boundary(headers: &Headers, body: &[u8]) -> Option<String> {
    let content_type = headers.get("content-type");

    if let Some(ct) = content_type {
        let declared = param(ct, "boundary")
            .map(|b| b.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
            .filter(|b| !b.is_empty());
        if declared.is_some() {
            return declared;
        }
        if !media_type(ct).starts_with("multipart/") {
            return None;
        }
        debug!("Multipart entity without a usable boundary parameter, scanning body");
    }

    scan_for_boundary(body)
}

fn scan_for_boundary(body: &[u8]) -> Option<String> {
    body.split(|&b| b == b'\n')
        .filter(|line| !line.iter().all(|b| b.is_ascii_whitespace()))
        .take(BOUNDARY_SCAN_LINES)
        .find_map(|line| {
            delimiter_line_re()
                .captures(line)
                .and_then(|caps| caps.get(1))
                .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
        })
}

/// Find `--boundary` at the start of a line, at or after `from`.
fn find_delimiter(body: &[u8], delimiter: &[u8], from: usize) -> Option<usize> {
    let mut pos = from;
    while pos + delimiter.len() <= body.len() {
        let offset = body[pos..]
            .windows(delimiter.len())
            .position(|w| w == delimiter)?;
        let at = pos + offset;
        let line_start = at == 0 || body[at - 1] == b'\n';
        let after = body.get(at + delimiter.len()).copied();
        let terminated = matches!(after, None | Some(b'\r' | b'\n' | b' ' | b'\t' | b'-'));
        if line_start && terminated {
            return Some(at);
        }
        pos = at + 1;
    }
    None
}

/// Split a multipart body into its parts.
///
/// The preamble before the first delimiter and the epilogue after the
/// closing `--boundary--` are discarded. A missing closing delimiter is
/// tolerated: the last part runs to the end of the body.
pub fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Vec<Part<'a>> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();
    let mut parts = Vec::new();

    let Some(mut at) = find_delimiter(body, delimiter, 0) else {
        debug!(boundary = boundary, "Boundary not found in body");
        return parts;
    };

    loop {
        let after = at + delimiter.len();
        if body[after..].starts_with(b"--") {
            break;
        }

        // Skip the rest of the delimiter line
        let start = match body[after..].iter().position(|&b| b == b'\n') {
            Some(nl) => after + nl + 1,
            None => break,
        };

        let next = find_delimiter(body, delimiter, start);
        let end = next.unwrap_or(body.len());

        // The line break before a delimiter belongs to the delimiter
        let mut content_end = end;
        if next.is_some() {
            if content_end > start && body[content_end - 1] == b'\n' {
                content_end -= 1;
            }
            if content_end > start && body[content_end - 1] == b'\r' {
                content_end -= 1;
            }
        }

        parts.push(Part::parse(&body[start..content_end.max(start)]));

        match next {
            Some(n) => at = n,
            None => break,
        }
    }

    parts
}

/// Flatten an entity into its leaf parts in document order.
///
/// Nested multiparts are descended up to [`MAX_DEPTH`]; deeper ones, and
/// nested multiparts whose boundary cannot be recovered, are kept as opaque
/// leaves. A single-part entity is its own only leaf. A top-level multipart
/// without a recoverable boundary is opaque and yields no parts.
pub fn leaf_parts<'a>(root: &Part<'a>) -> Vec<Part<'a>> {
    let mut leaves = Vec::new();
    match root_boundary(root) {
        Some(boundary) => {
            for part in split_multipart(root.body, &boundary) {
                collect_leaves(part, 1, &mut leaves);
            }
        }
        None if root.is_multipart() => {
            debug!("Multipart message without a recoverable boundary, treating as opaque");
        }
        None => leaves.push(root.clone()),
    }
    leaves
}

fn root_boundary(root: &Part<'_>) -> Option<String> {
    match root.declared_type() {
        Some(t) if !t.starts_with("multipart/") => None,
        _ => find_boundary(&root.headers, root.body),
    }
}

fn collect_leaves<'a>(part: Part<'a>, depth: usize, out: &mut Vec<Part<'a>>) {
    if part.is_multipart() && depth < MAX_DEPTH {
        if let Some(boundary) = find_boundary(&part.headers, part.body) {
            for child in split_multipart(part.body, &boundary) {
                collect_leaves(child, depth + 1, out);
            }
            return;
        }
    }
    out.push(part);
}

/// Skip a byte-order mark and an mbox `From ` separator line, if present.
pub fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&b"\xEF\xBB\xBF"[..]).unwrap_or(data);

    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIXED: &[u8] = b"Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n\r\n\
preamble\r\n\
--XYZ\r\n\
Content-Type: text/html; charset=utf-8\r\n\r\n\
<p>Hello</p>\r\n\
--XYZ\r\n\
Content-Type: application/pdf\r\n\
Content-Disposition: attachment; filename=\"report.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\r\n\
JVBERi0xLjQ=\r\n\
--XYZ--\r\n\
epilogue\r\n";

    #[test]
    fn test_split_multipart() {
        let root = Part::parse(MIXED);
        let parts = leaf_parts(&root);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].mime_type(), "text/html");
        assert_eq!(parts[0].body, b"<p>Hello</p>");
        assert_eq!(parts[1].disposition().as_deref(), Some("attachment"));
        assert_eq!(parts[1].decoded_body().as_ref(), b"%PDF-1.4");
    }

    #[test]
    fn test_boundary_param_quoted_and_bare() {
        let h = Headers::parse(b"Content-Type: multipart/mixed; boundary=abc123\n");
        assert_eq!(find_boundary(&h, b"").as_deref(), Some("abc123"));
        let h = Headers::parse(b"Content-Type: multipart/mixed;\n boundary=\"'q=1'\"\n");
        assert_eq!(find_boundary(&h, b"").as_deref(), Some("q=1"));
    }

    #[test]
    fn test_boundary_scan_fallback() {
        let h = Headers::parse(b"Content-Type: multipart/mixed\n");
        let body = b"\nThis is a MIME message\n--frontier\nContent-Type: text/plain\n\nhi\n--frontier--\n";
        assert_eq!(find_boundary(&h, body).as_deref(), Some("frontier"));
    }

    #[test]
    fn test_no_scan_for_single_part_types() {
        let h = Headers::parse(b"Content-Type: text/plain\n");
        assert_eq!(find_boundary(&h, b"--looks-like-a-boundary\n"), None);
    }

    #[test]
    fn test_opaque_without_boundary() {
        let root = Part::parse(b"Content-Type: multipart/mixed\n\njust text, no delimiters\n");
        assert!(leaf_parts(&root).is_empty());
    }

    #[test]
    fn test_single_part_is_its_own_leaf() {
        let root = Part::parse(b"Content-Type: text/plain; charset=utf-8\n\nhello\n");
        let leaves = leaf_parts(&root);
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].body, b"hello\n");
    }

    #[test]
    fn test_nested_multipart_is_flattened() {
        let raw = b"Content-Type: multipart/mixed; boundary=outer\n\n\
--outer\n\
Content-Type: multipart/alternative; boundary=inner\n\n\
--inner\n\
Content-Type: text/plain\n\nplain\n\
--inner\n\
Content-Type: text/html\n\n<b>html</b>\n\
--inner--\n\
--outer\n\
Content-Type: image/png\n\
Content-Disposition: inline; filename=\"logo.png\"\n\
Content-Id: <logo1>\n\nPNG\n\
--outer--\n";
        let root = Part::parse(raw);
        let leaves = leaf_parts(&root);
        let types: Vec<String> = leaves.iter().map(|p| p.mime_type()).collect();
        assert_eq!(types, vec!["text/plain", "text/html", "image/png"]);
        assert_eq!(leaves[2].content_id().as_deref(), Some("logo1"));
    }

    #[test]
    fn test_longer_boundary_prefix_is_not_a_delimiter() {
        let body = b"--abcd\nnot ours\n--abc\nContent-Type: text/plain\n\nmine\n--abc--\n";
        let parts = split_multipart(body, "abc");
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].body, b"mine");
    }

    #[test]
    fn test_parse_params_with_quoted_semicolon() {
        let params = parse_params("attachment; filename=\"a;b.txt\"; size=10");
        assert_eq!(
            params,
            vec![
                ("filename".to_string(), "a;b.txt".to_string()),
                ("size".to_string(), "10".to_string())
            ]
        );
    }

    #[test]
    fn test_name_param_does_not_match_filename() {
        assert_eq!(param("attachment; filename=x.txt", "name"), None);
    }

    #[test]
    fn test_extended_param_continuations() {
        let value = "attachment; filename*1*=%20file.txt; filename*0*=UTF-8''my";
        assert_eq!(
            extended_param(value, "filename").as_deref(),
            Some("UTF-8''my%20file.txt")
        );
        assert_eq!(
            extended_param("attachment; filename*=UTF-8''caf%C3%A9.pdf", "filename").as_deref(),
            Some("UTF-8''caf%C3%A9.pdf")
        );
    }

    #[test]
    fn test_filename_priority() {
        let part = Part::parse(
            b"Content-Type: application/pdf; name=\"ct.pdf\"\n\
Content-Disposition: attachment; filename=\"plain.pdf\";\n filename*=UTF-8''na%C3%AFve%20r%C3%A9sum%C3%A9.pdf\n\nx",
        );
        assert_eq!(part.filename().as_deref(), Some("naïve résumé.pdf"));

        let part = Part::parse(b"Content-Type: text/csv; name=data.csv\nContent-Disposition: attachment\n\nx");
        assert_eq!(part.filename().as_deref(), Some("data.csv"));
    }

    #[test]
    fn test_filename_encoded_word_and_residual_charset() {
        let part = Part::parse(
            b"Content-Disposition: attachment; filename=\"=?UTF-8?B?w7xiZXIudHh0?=\"\n\nx",
        );
        assert_eq!(part.filename().as_deref(), Some("\u{fc}ber.txt"));

        let part = Part::parse(b"Content-Disposition: attachment; filename=\"utf-8''a%20b.txt\"\n\nx");
        assert_eq!(part.filename().as_deref(), Some("a b.txt"));
    }

    #[test]
    fn test_filename_with_apostrophes_is_kept_whole() {
        let part = Part::parse(b"Content-Disposition: attachment; filename=\"rock'n'roll.mp3\"\n\nx");
        assert_eq!(part.filename().as_deref(), Some("rock'n'roll.mp3"));

        let part = Part::parse(b"Content-Type: application/pdf; name=\"O'Neil's report.pdf\"\n\nx");
        assert_eq!(part.filename().as_deref(), Some("O'Neil's report.pdf"));
    }

    #[test]
    fn test_inline_without_filename_is_not_an_attachment() {
        let part = Part::parse(b"Content-Type: image/png\nContent-Disposition: inline\n\nx");
        assert_eq!(part.attachment_disposition(), None);
        let part = Part::parse(b"Content-Disposition: inline; filename=logo.png\n\nx");
        assert_eq!(part.attachment_disposition(), Some(Disposition::Inline));
        let part = Part::parse(b"Content-Disposition: ATTACHMENT\n\nx");
        assert_eq!(part.attachment_disposition(), Some(Disposition::Attachment));
    }

    #[test]
    fn test_skip_from_line() {
        let data = b"From user@example.com Thu Jan 01 00:00:00 2024\nSubject: Test\n\nBody\n";
        assert!(skip_from_line(data).starts_with(b"Subject:"));
        let data = b"Subject: Test\n\nBody\n";
        assert_eq!(skip_from_line(data), data);
    }
}
