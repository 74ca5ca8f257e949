//! Ignore rules: decide whether a message is archived at all.

use std::fmt;

use regex::{Regex, RegexBuilder};
use tracing::warn;

use crate::config::IgnoreConfig;
use crate::model::address::normalize_address;
use crate::model::message::NormalizedMessage;
use crate::normalize::OutgoingMessage;

/// A subject rule: a delimited regex (`/pattern/flags`) or a plain substring.
#[derive(Debug, Clone)]
pub enum SubjectPattern {
    /// Lowercased substring, matched case-insensitively.
    Literal(String),
    /// Delimited regex. `compiled` is `None` when the pattern or its flags
    /// are invalid; such a rule never matches.
    Regex {
        source: String,
        compiled: Option<Regex>,
    },
}

impl SubjectPattern {
    /// Classify a configured pattern. Blank input yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        match split_delimited(raw) {
            Some((pattern, flags)) => {
                let compiled = compile(pattern, flags);
                if compiled.is_none() {
                    warn!(pattern = raw, "Invalid subject regex, rule will never match");
                }
                Some(Self::Regex {
                    source: raw.to_string(),
                    compiled,
                })
            }
            None => Some(Self::Literal(raw.to_lowercase())),
        }
    }

    pub fn is_match(&self, subject: &str) -> bool {
        match self {
            Self::Literal(needle) => subject.to_lowercase().contains(needle.as_str()),
            Self::Regex { compiled, .. } => compiled.as_ref().is_some_and(|re| re.is_match(subject)),
        }
    }

    /// The pattern as configured (literals are lowercased).
    pub fn as_str(&self) -> &str {
        match self {
            Self::Literal(s) => s,
            Self::Regex { source, .. } => source,
        }
    }
}

/// Split `/pattern/flags` into pattern and flags.
///
/// The delimiter is any non-alphanumeric, non-blank character other than a
/// backslash, and the pattern must close with the same character. Flags must
/// be ASCII letters.
fn split_delimited(raw: &str) -> Option<(&str, &str)> {
    let delim = raw.chars().next()?;
    if delim.is_alphanumeric() || delim.is_whitespace() || delim == '\\' {
        return None;
    }

    let inner = &raw[delim.len_utf8()..];
    let end = inner.rfind(delim)?;
    let flags = &inner[end + delim.len_utf8()..];
    flags
        .chars()
        .all(|c| c.is_ascii_alphabetic())
        .then(|| (&inner[..end], flags))
}

fn compile(pattern: &str, flags: &str) -> Option<Regex> {
    let mut builder = RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            'U' => builder.swap_greed(true),
            // The engine is always Unicode-aware
            'u' => &mut builder,
            _ => return None,
        };
    }
    builder.build().ok()
}

/// Normalized ignore rules. Built once from configuration.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRuleSet {
    pub from: Vec<String>,
    pub to: Vec<String>,
    pub subject_patterns: Vec<SubjectPattern>,
    pub templates: Vec<String>,
}

impl IgnoreRuleSet {
    pub fn from_config(config: &IgnoreConfig) -> Self {
        Self {
            from: normalized_list(&config.from, normalize_address),
            to: normalized_list(&config.to, normalize_address),
            subject_patterns: config
                .subject_regex
                .iter()
                .filter_map(|p| SubjectPattern::parse(p))
                .collect(),
            templates: normalized_list(&config.templates, |t| t.trim().to_lowercase()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.from.is_empty()
            && self.to.is_empty()
            && self.subject_patterns.is_empty()
            && self.templates.is_empty()
    }
}

fn normalized_list(values: &[String], normalize: impl Fn(&str) -> String) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values.iter().map(|v| normalize(v.as_str())) {
        if !value.is_empty() && !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

/// Why a message was not archived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Skip flag or `X-Archive-Skip` header.
    Requested,
    Sender(String),
    Recipient(String),
    Subject(String),
    Template(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => write!(f, "skip requested"),
            Self::Sender(addr) => write!(f, "ignored sender {addr}"),
            Self::Recipient(addr) => write!(f, "ignored recipient {addr}"),
            Self::Subject(pattern) => write!(f, "subject matches {pattern}"),
            Self::Template(tag) => write!(f, "ignored template {tag}"),
        }
    }
}

/// First matching ignore rule, in order: explicit skip, sender, recipients,
/// subject, template.
pub fn evaluate(
    message: &OutgoingMessage,
    normalized: &NormalizedMessage,
    rules: &IgnoreRuleSet,
) -> Option<SkipReason> {
    if message.skip_requested() {
        return Some(SkipReason::Requested);
    }

    if let Some(from) = normalized.from.as_deref().map(normalize_address) {
        if rules.from.contains(&from) {
            return Some(SkipReason::Sender(from));
        }
    }

    if let Some(rcpt) = normalized
        .recipients()
        .map(normalize_address)
        .find(|r| rules.to.contains(r))
    {
        return Some(SkipReason::Recipient(rcpt));
    }

    let subject = normalized.subject.as_deref().unwrap_or_default();
    if let Some(pattern) = rules.subject_patterns.iter().find(|p| p.is_match(subject)) {
        return Some(SkipReason::Subject(pattern.as_str().to_string()));
    }

    if let Some(template) = normalized.template.as_deref().map(|t| t.trim().to_lowercase()) {
        if rules.templates.contains(&template) {
            return Some(SkipReason::Template(template));
        }
    }

    None
}

/// Whether `message` must not be archived.
pub fn should_skip(
    message: &OutgoingMessage,
    normalized: &NormalizedMessage,
    rules: &IgnoreRuleSet,
) -> bool {
    evaluate(message, normalized, rules).is_some()
}
