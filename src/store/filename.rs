//! Filesystem-safe attachment names.

/// Name used when nothing usable is left after sanitizing.
pub const DEFAULT_ATTACHMENT_NAME: &str = "attachment.bin";

/// Maximum sanitized name length, in characters.
pub const MAX_FILENAME_CHARS: usize = 200;

/// Longest extension kept intact when a name is shortened.
const MAX_EXTENSION_CHARS: usize = 10;

/// Sanitize an attachment name for storage.
///
/// Path separators and any character outside letters, digits, whitespace and
/// `. - _ ( ) [ ]` become `_`. Surrounding whitespace is trimmed. Empty, `.` and
/// `..` results become [`DEFAULT_ATTACHMENT_NAME`]. Long names are cut to
/// [`MAX_FILENAME_CHARS`] keeping a short extension.
///
/// The output is a fixed point: sanitizing it again returns it unchanged.
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric()
                || c.is_whitespace()
                || matches!(c, '.' | '-' | '_' | '(' | ')' | '[' | ']')
            {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = sanitized.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return DEFAULT_ATTACHMENT_NAME.to_string();
    }

    truncate_keeping_extension(trimmed)
}

fn truncate_keeping_extension(name: &str) -> String {
    if name.chars().count() <= MAX_FILENAME_CHARS {
        return name.to_string();
    }

    let extension = name
        .rsplit_once('.')
        .filter(|(stem, ext)| {
            !stem.is_empty()
                && !ext.is_empty()
                && ext.chars().count() <= MAX_EXTENSION_CHARS
                && ext.chars().all(char::is_alphanumeric)
        })
        .map(|(_, ext)| ext);

    let shortened: String = match extension {
        Some(ext) => {
            let keep = MAX_FILENAME_CHARS - ext.chars().count() - 1;
            let stem: String = name.chars().take(keep).collect();
            format!("{stem}.{ext}")
        }
        None => name.chars().take(MAX_FILENAME_CHARS).collect(),
    };

    shortened.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_keeps_safe_names() {
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(
            sanitize_filename("Q3 results (final) [v2].xlsx"),
            "Q3 results (final) [v2].xlsx"
        );
        assert_eq!(sanitize_filename("résumé.pdf"), "résumé.pdf");
    }

    #[test]
    fn test_sanitize_replaces_separators_and_specials() {
        assert_eq!(sanitize_filename("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_filename("a\\b:c*d?.txt"), "a_b_c_d_.txt");
    }

    #[test]
    fn test_sanitize_keeps_inner_whitespace() {
        assert_eq!(sanitize_filename("tab\there.txt"), "tab\there.txt");
        assert_eq!(sanitize_filename("\tpadded\t"), "padded");
    }

    #[test]
    fn test_sanitize_rejects_dot_names() {
        assert_eq!(sanitize_filename(""), DEFAULT_ATTACHMENT_NAME);
        assert_eq!(sanitize_filename("   "), DEFAULT_ATTACHMENT_NAME);
        assert_eq!(sanitize_filename("."), DEFAULT_ATTACHMENT_NAME);
        assert_eq!(sanitize_filename(" .. "), DEFAULT_ATTACHMENT_NAME);
    }

    #[test]
    fn test_long_name_keeps_extension() {
        let long = format!("{}.pdf", "x".repeat(300));
        let out = sanitize_filename(&long);
        assert_eq!(out.chars().count(), MAX_FILENAME_CHARS);
        assert!(out.ends_with(".pdf"));
    }

    #[test]
    fn test_long_name_without_extension() {
        let long = "y".repeat(250);
        assert_eq!(sanitize_filename(&long).chars().count(), MAX_FILENAME_CHARS);
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let inputs = [
            "report.pdf",
            "../../etc/passwd",
            " spaced name .txt ",
            "",
            "..",
            "\tq1\tbudget .ods",
            "ünïcødé/名前.doc",
            &format!("{} .tar", "z ".repeat(150)),
            &"w ".repeat(120),
        ];
        for input in inputs {
            let once = sanitize_filename(input);
            assert_eq!(sanitize_filename(&once), once, "not a fixed point for {input:?}");
        }
    }
}
