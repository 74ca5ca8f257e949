//! RFC 5322 header parsing: header/body split, folding, and encoded-words (RFC 2047).

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use super::decode::{decode_charset, decode_quoted_printable};

/// Base64 for encoded-words: some mailers drop the trailing padding.
const WORD_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Unfolded headers keyed by lowercase name.
///
/// Repeated headers are joined into one value with `", "`, keeping the order
/// in which names first appeared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Parse a raw header block.
    pub fn parse(raw: &[u8]) -> Self {
        let text = decode_header_bytes(raw);
        let mut headers = Self::default();
        for (name, value) in unfold_headers(&text) {
            headers.insert(name, value);
        }
        headers
    }

    fn insert(&mut self, name: String, value: String) {
        if let Some((_, existing)) = self.entries.iter_mut().find(|(k, _)| *k == name) {
            existing.push_str(", ");
            existing.push_str(&value);
        } else {
            self.entries.push((name, value));
        }
    }

    /// Raw (undecoded) value of a header, case-insensitive.
    pub fn get(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Header value with RFC 2047 encoded-words decoded.
    pub fn get_decoded(&self, name: &str) -> Option<String> {
        self.get(name).map(decode_encoded_words)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Split a message (or a MIME part) into header and body bytes.
///
/// The blank line separating them may be `\n\n` or `\r\n\r\n`. Input that
/// starts with a blank line has no headers; input without one is all headers.
pub fn split_message(data: &[u8]) -> (&[u8], &[u8]) {
    if data.starts_with(b"\r\n") {
        return (&[], &data[2..]);
    }
    if data.starts_with(b"\n") {
        return (&[], &data[1..]);
    }
    match find_header_end(data) {
        Some((end, body_start)) => (&data[..end], &data[body_start..]),
        None => (data, &[]),
    }
}

/// Find the end of the header block: `(header_end, body_start)`.
fn find_header_end(data: &[u8]) -> Option<(usize, usize)> {
    for i in 0..data.len().saturating_sub(1) {
        if data[i] != b'\n' {
            continue;
        }
        if data[i + 1] == b'\n' {
            return Some((i + 1, i + 2));
        }
        if i + 2 < data.len() && data[i + 1] == b'\r' && data[i + 2] == b'\n' {
            return Some((i + 1, i + 3));
        }
    }
    None
}

/// Header bytes as text: UTF-8 when valid, otherwise Windows-1252 (which
/// maps every byte).
fn decode_header_bytes(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&b"\xEF\xBB\xBF"[..]).unwrap_or(bytes);
    match String::from_utf8(bytes.to_vec()) {
        Ok(text) => text,
        Err(_) => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
    }
}

/// Join folded lines and split the block into `(lowercase name, value)` pairs.
///
/// A continuation line (leading space or tab) is appended to the previous
/// value with a single space. Lines without a colon, and names containing
/// blanks, are dropped.
fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut fields: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        let folded = matches!(line.as_bytes().first(), Some(b' ' | b'\t'));
        if folded {
            let piece = line.trim();
            match fields.last_mut() {
                Some((_, value)) if !piece.is_empty() => {
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(piece);
                }
                _ => {}
            }
            continue;
        }

        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            debug!(line = line, "Skipping malformed header line");
            continue;
        }
        fields.push((name.to_ascii_lowercase(), value.trim().to_string()));
    }

    fields
}

/// `=?charset[*lang]?B|Q?text?=`
fn encoded_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"=\?([^?*\s]+)(?:\*[^?\s]*)?\?([BbQq])\?([^?\s]*)\?=")
            .expect("valid encoded-word regex")
    })
}

/// Decode RFC 2047 encoded-words in a header value.
///
/// Blanks between two adjacent encoded-words are dropped. A word that does
/// not decode is kept verbatim.
pub fn decode_encoded_words(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_end = 0;
    let mut after_word = false;

    for caps in encoded_word_re().captures_iter(input) {
        let Some(whole) = caps.get(0) else { continue };
        let gap = &input[last_end..whole.start()];
        last_end = whole.end();

        match decode_word(&caps[1], &caps[2], &caps[3]) {
            Some(text) => {
                if !(after_word && gap.trim().is_empty()) {
                    out.push_str(gap);
                }
                out.push_str(&text);
                after_word = true;
            }
            None => {
                debug!(word = whole.as_str(), "Undecodable encoded-word kept verbatim");
                out.push_str(gap);
                out.push_str(whole.as_str());
                after_word = false;
            }
        }
    }

    out.push_str(&input[last_end..]);
    out
}

fn decode_word(charset: &str, encoding: &str, text: &str) -> Option<String> {
    let bytes = if encoding.eq_ignore_ascii_case("b") {
        WORD_BASE64.decode(text).ok()?
    } else {
        // Q encoding is quoted-printable with `_` standing for a space
        let spaced: Vec<u8> = text
            .bytes()
            .map(|b| if b == b'_' { b' ' } else { b })
            .collect();
        decode_quoted_printable(&spaced)
    };
    Some(decode_charset(charset, &bytes))
}

/// Inner value of the first `<...>` pair, or the trimmed input without one.
pub fn strip_angle_brackets(s: &str) -> String {
    let trimmed = s.trim();
    trimmed
        .split_once('<')
        .and_then(|(_, rest)| rest.split_once('>'))
        .map_or(trimmed, |(inner, _)| inner.trim())
        .to_string()
}

/// Boolean-like header value: `1`, `true`, `yes`, `on` (case-insensitive).
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
