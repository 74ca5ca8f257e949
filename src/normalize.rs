//! Message sources and normalization into a [`NormalizedMessage`].
//!
//! A message reaches the archiver either already parsed by `mail-parser`
//! or as raw bytes. Both produce the same record; fields are filled first
//! writer wins, so values from the object model are never overwritten by
//! what the byte parser recovers.

use chrono::{DateTime, Utc};
use mail_parser::{Address, Message, MessageParser, MimeHeaders, PartType};

use crate::model::address::{merge_unique, normalize_address, parse_address_list};
use crate::model::message::{NormalizedMessage, PreviewKind};
use crate::parser::header::{is_truthy, split_message, strip_angle_brackets, Headers};
use crate::parser::mime::{leaf_parts, skip_from_line, Part};
use crate::store::sha256_hex;

/// Header whose boolean-true value suppresses archiving.
pub const SKIP_HEADER: &str = "X-Archive-Skip";

/// Header carrying the template tag used by ignore rules.
pub const TEMPLATE_HEADER: &str = "X-Archive-Template";

/// Transport-level sender and recipients.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    pub sender: Option<String>,
    pub recipients: Vec<String>,
}

/// Where a message comes from.
#[derive(Debug, Clone)]
pub enum MessageSource {
    /// A message already parsed by `mail-parser`.
    Parsed(Box<Message<'static>>),
    /// Raw RFC 5322 bytes, with an optional envelope.
    Raw {
        bytes: Vec<u8>,
        envelope: Option<Envelope>,
    },
}

impl MessageSource {
    /// Exact bytes archived as `message.eml`.
    pub fn raw_bytes(&self) -> &[u8] {
        match self {
            Self::Parsed(message) => message.raw_message(),
            Self::Raw { bytes, .. } => bytes,
        }
    }

    pub fn envelope(&self) -> Option<&Envelope> {
        match self {
            Self::Parsed(_) => None,
            Self::Raw { envelope, .. } => envelope.as_ref(),
        }
    }
}

/// An outgoing message handed to the archiver.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub source: MessageSource,
    /// Transport name; the configured default is used when `None`.
    pub transport: Option<String>,
    /// Message id assigned by the transport, preferred over the header.
    pub transport_message_id: Option<String>,
    /// Explicit skip signal, OR-ed with the skip header.
    pub skip: bool,
    pub captured_at: DateTime<Utc>,
}

impl OutgoingMessage {
    pub fn new(source: MessageSource) -> Self {
        Self {
            source,
            transport: None,
            transport_message_id: None,
            skip: false,
            captured_at: Utc::now(),
        }
    }

    /// Wrap raw message bytes.
    pub fn raw(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(MessageSource::Raw {
            bytes: bytes.into(),
            envelope: None,
        })
    }

    /// Parse bytes with `mail-parser`. Returns `None` if it rejects the input.
    pub fn parsed(bytes: &[u8]) -> Option<Self> {
        let message = MessageParser::default().parse(bytes)?.into_owned();
        Some(Self::new(MessageSource::Parsed(Box::new(message))))
    }

    /// Attach an envelope. Ignored for parsed messages.
    pub fn with_envelope(mut self, envelope: Envelope) -> Self {
        if let MessageSource::Raw { envelope: slot, .. } = &mut self.source {
            *slot = Some(envelope);
        }
        self
    }

    pub fn with_transport(mut self, transport: impl Into<String>) -> Self {
        self.transport = Some(transport.into());
        self
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.transport_message_id = Some(id.into());
        self
    }

    pub fn with_skip(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    pub fn captured_at(mut self, at: DateTime<Utc>) -> Self {
        self.captured_at = at;
        self
    }

    /// Top-level headers of the raw message.
    pub fn headers(&self) -> Headers {
        let (head, _) = split_message(skip_from_line(self.source.raw_bytes()));
        Headers::parse(head)
    }

    /// Whether the caller or the skip header asked not to archive.
    pub fn skip_requested(&self) -> bool {
        self.skip || self.headers().get(SKIP_HEADER).is_some_and(is_truthy)
    }
}

/// Build the canonical record for `message`.
///
/// `default_transport` is recorded when the message names no transport.
pub fn normalize(message: &OutgoingMessage, default_transport: &str) -> NormalizedMessage {
    let raw = message.source.raw_bytes();

    let mut normalized = NormalizedMessage {
        message_id: message
            .transport_message_id
            .as_deref()
            .map(strip_angle_brackets)
            .filter(|id| !id.is_empty()),
        sent_at: message.captured_at,
        transport: message
            .transport
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(default_transport)
            .to_string(),
        size: raw.len() as u64,
        content_hash: sha256_hex(raw),
        ..Default::default()
    };

    let root = Part::parse(skip_from_line(raw));
    if normalized.message_id.is_none() {
        normalized.message_id = root
            .headers
            .get("message-id")
            .map(strip_angle_brackets)
            .filter(|id| !id.is_empty());
    }

    if let MessageSource::Parsed(model) = &message.source {
        apply_model(&mut normalized, model);
    }

    apply_headers(&mut normalized, &root.headers);

    if let Some(envelope) = message.source.envelope() {
        apply_envelope(&mut normalized, envelope);
    }

    if normalized.preview_kind == PreviewKind::None {
        if let Some((kind, body)) = select_preview(&root) {
            normalized.preview_kind = kind;
            normalized.preview_body = Some(body);
        }
    }

    normalized.attachment_hint = match &message.source {
        MessageSource::Parsed(model) => model.attachments().count(),
        MessageSource::Raw { .. } => leaf_parts(&root)
            .iter()
            .filter(|p| p.attachment_disposition().is_some())
            .count(),
    };

    normalized
}

fn apply_model(normalized: &mut NormalizedMessage, model: &Message<'_>) {
    if normalized.message_id.is_none() {
        normalized.message_id = model
            .message_id()
            .map(strip_angle_brackets)
            .filter(|id| !id.is_empty());
    }
    if normalized.subject.is_none() {
        normalized.subject = model
            .subject()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
    }
    if normalized.from.is_none() {
        normalized.from = model
            .from()
            .and_then(|a| model_addresses(a).into_iter().next());
    }
    if normalized.to.is_empty() {
        normalized.to = model.to().map(model_addresses).unwrap_or_default();
    }
    if normalized.cc.is_empty() {
        normalized.cc = model.cc().map(model_addresses).unwrap_or_default();
    }
    if normalized.bcc.is_empty() {
        normalized.bcc = model.bcc().map(model_addresses).unwrap_or_default();
    }

    let html = model.html_bodies().find_map(|part| match &part.body {
        PartType::Html(html) if !is_attachment(part) => Some(html.to_string()),
        _ => None,
    });
    let preview = html.map(|body| (PreviewKind::Html, body)).or_else(|| {
        model.text_bodies().find_map(|part| match &part.body {
            PartType::Text(text) if !is_attachment(part) => {
                Some((PreviewKind::Text, text.to_string()))
            }
            _ => None,
        })
    });
    if let Some((kind, body)) = preview.filter(|(_, body)| !body.trim().is_empty()) {
        normalized.preview_kind = kind;
        normalized.preview_body = Some(body);
    }
}

fn is_attachment(part: &mail_parser::MessagePart<'_>) -> bool {
    part.content_disposition()
        .is_some_and(|cd| cd.ctype().eq_ignore_ascii_case("attachment"))
}

/// Lowercased, deduplicated addresses from a parsed address header.
fn model_addresses(address: &Address<'_>) -> Vec<String> {
    let raw: Vec<String> = match address {
        Address::List(list) => list
            .iter()
            .filter_map(|addr| addr.address.as_deref())
            .map(str::to_string)
            .collect(),
        Address::Group(groups) => groups
            .iter()
            .flat_map(|group| group.addresses.iter())
            .filter_map(|addr| addr.address.as_deref())
            .map(str::to_string)
            .collect(),
    };
    let mut addresses = Vec::new();
    merge_unique(&mut addresses, raw);
    addresses
}

fn apply_headers(normalized: &mut NormalizedMessage, headers: &Headers) {
    if normalized.subject.is_none() {
        normalized.subject = headers
            .get_decoded("subject")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
    }
    if normalized.from.is_none() {
        normalized.from = headers
            .get("from")
            .and_then(|v| parse_address_list(v).into_iter().next());
    }
    for (name, list) in [
        ("to", &mut normalized.to),
        ("cc", &mut normalized.cc),
        ("bcc", &mut normalized.bcc),
    ] {
        if list.is_empty() {
            *list = headers.get(name).map(parse_address_list).unwrap_or_default();
        }
    }
    if normalized.template.is_none() {
        normalized.template = headers
            .get_decoded(TEMPLATE_HEADER)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
    }
}

fn apply_envelope(normalized: &mut NormalizedMessage, envelope: &Envelope) {
    if normalized.from.is_none() {
        normalized.from = envelope
            .sender
            .as_deref()
            .map(normalize_address)
            .filter(|a| !a.is_empty());
    }
    if normalized.recipients().next().is_none() {
        merge_unique(&mut normalized.to, envelope.recipients.iter().cloned());
    }
}

/// First HTML body, else first plain-text body, among non-attachment leaves.
fn select_preview(root: &Part<'_>) -> Option<(PreviewKind, String)> {
    let bodies: Vec<Part<'_>> = leaf_parts(root)
        .into_iter()
        .filter(|p| p.attachment_disposition().is_none())
        .collect();

    let pick = |mime: &str, kind: PreviewKind| {
        bodies
            .iter()
            .filter(|p| p.mime_type() == mime)
            .map(Part::decoded_text)
            .find(|text| !text.trim().is_empty())
            .map(|text| (kind, text))
    };

    pick("text/html", PreviewKind::Html).or_else(|| pick("text/plain", PreviewKind::Text))
}
