//! Content decoding: transfer encodings (base64, quoted-printable) and charsets.
//!
//! Every function here returns either the decoded value or the input
//! unchanged. Nothing fails: a bad body is archived as-is rather than lost.

use std::borrow::Cow;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::debug;

/// Reverse a `Content-Transfer-Encoding`.
///
/// `base64` and `quoted-printable` are decoded; anything else (including
/// `7bit`, `8bit`, `binary` or a missing header) passes through.
pub fn decode_transfer<'a>(encoding: Option<&str>, body: &'a [u8]) -> Cow<'a, [u8]> {
    let encoding = encoding.map(|e| e.trim().to_ascii_lowercase());
    match encoding.as_deref() {
        Some("base64") => match decode_base64(body) {
            Some(decoded) => Cow::Owned(decoded),
            None => {
                debug!(len = body.len(), "Invalid base64 body, keeping original bytes");
                Cow::Borrowed(body)
            }
        },
        Some("quoted-printable") => Cow::Owned(decode_quoted_printable(body)),
        _ => Cow::Borrowed(body),
    }
}

/// Strict base64: line breaks and blanks are ignored, any other invalid
/// input makes the whole body undecodable.
pub fn decode_base64(body: &[u8]) -> Option<Vec<u8>> {
    let cleaned: Vec<u8> = body
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD.decode(&cleaned).ok()
}

/// Decode quoted-printable (RFC 2045 §6.7).
///
/// Soft line breaks (`=` at end of line, optionally followed by trailing
/// blanks) are removed. An `=` not followed by two hex digits is kept literally.
pub fn decode_quoted_printable(input: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        let b = input[i];
        if b != b'=' {
            result.push(b);
            i += 1;
            continue;
        }

        // Soft line break: "=" [blanks] ("\r\n" | "\n")
        let mut j = i + 1;
        while j < input.len() && (input[j] == b' ' || input[j] == b'\t') {
            j += 1;
        }
        if j < input.len() && input[j] == b'\n' {
            i = j + 1;
            continue;
        }
        if j + 1 < input.len() && input[j] == b'\r' && input[j + 1] == b'\n' {
            i = j + 2;
            continue;
        }
        if j == input.len() {
            // "=" at the very end
            i = j;
            continue;
        }

        match (
            input.get(i + 1).and_then(|c| hex_val(*c)),
            input.get(i + 2).and_then(|c| hex_val(*c)),
        ) {
            (Some(hi), Some(lo)) => {
                result.push((hi << 4) | lo);
                i += 3;
            }
            _ => {
                result.push(b'=');
                i += 1;
            }
        }
    }
    result
}

fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Convert bytes in a named charset to UTF-8 text.
///
/// Invalid sequences are replaced with U+FFFD. An unknown charset leaves the
/// bytes untouched (read as lossy UTF-8).
pub fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    let charset_lower = charset.trim().trim_matches('"').to_lowercase();
    match charset_lower.as_str() {
        "" | "utf-8" | "utf8" | "us-ascii" | "ascii" => String::from_utf8_lossy(bytes).into_owned(),
        _ => {
            if let Some(encoding) = encoding_rs::Encoding::for_label(charset_lower.as_bytes()) {
                let (decoded, _, _) = encoding.decode(bytes);
                decoded.into_owned()
            } else {
                debug!(
                    charset = charset,
                    "Unknown charset, falling back to UTF-8 lossy"
                );
                String::from_utf8_lossy(bytes).into_owned()
            }
        }
    }
}

/// Transfer-decode and charset-convert a text body.
pub fn decode_text(encoding: Option<&str>, charset: Option<&str>, body: &[u8]) -> String {
    let bytes = decode_transfer(encoding, body);
    decode_charset(charset.unwrap_or("utf-8"), &bytes)
}
