//! MIME views of stored message bytes
//!
//! Message bodies are parsed with `mail-parser` whenever a fetch or search
//! needs their structure. Header blocks and body sections are cut directly
//! out of the raw bytes so fetched sections are byte-exact.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use mail_parser::{Address, MessageParser, MessagePart, MimeHeaders, PartType};
use std::fmt;
use std::str::FromStr;

/// Parse raw message bytes.
///
/// # Errors
///
/// Returns [`Error::Parse`] if the bytes are not a message.
pub fn parse(raw: &[u8]) -> Result<mail_parser::Message<'_>> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(Error::Parse("empty message".into()));
    }
    MessageParser::default()
        .parse(raw)
        .ok_or_else(|| Error::Parse("not an RFC 5322 message".into()))
}

fn offset<T: TryInto<usize>>(value: T) -> usize {
    value.try_into().unwrap_or(usize::MAX)
}

/// Split `raw` at the blank line ending the header block.
///
/// The header half keeps its trailing blank line, as IMAP's
/// `BODY[HEADER]` does.
#[must_use]
pub fn split_header(raw: &[u8]) -> (&[u8], &[u8]) {
    let mut pos = 0;
    while pos < raw.len() {
        let end = raw[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(raw.len(), |ix| pos + ix + 1);
        let line = &raw[pos..end];
        if line == b"\r\n" || line == b"\n" {
            return raw.split_at(end);
        }
        pos = end;
    }
    (raw, &[])
}

/// Unfolded header fields as (name, raw field including line breaks).
fn header_fields(header: &[u8]) -> Vec<(String, &[u8])> {
    let mut fields: Vec<(String, usize, usize)> = Vec::new();
    let mut pos = 0;
    while pos < header.len() {
        let end = header[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(header.len(), |ix| pos + ix + 1);
        let line = &header[pos..end];
        if line.first().is_some_and(|b| *b == b' ' || *b == b'\t') {
            if let Some(last) = fields.last_mut() {
                last.2 = end;
            }
        } else if let Some(colon) = line.iter().position(|&b| b == b':') {
            let name = String::from_utf8_lossy(&line[..colon]).trim().to_string();
            fields.push((name, pos, end));
        }
        pos = end;
    }
    fields
        .into_iter()
        .map(|(name, start, end)| (name, &header[start..end]))
        .collect()
}

/// The unfolded value of the first `name` field.
#[must_use]
pub fn header_value(header: &[u8], name: &str) -> Option<String> {
    header_fields(header)
        .into_iter()
        .find(|(field, _)| field.eq_ignore_ascii_case(name))
        .map(|(_, raw)| {
            let text = String::from_utf8_lossy(raw);
            let value = text.split_once(':').map_or("", |(_, value)| value);
            value
                .split(['\r', '\n'])
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
}

/// Header lines restricted to (or excluding) `names`, plus the blank line.
fn filter_header(header: &[u8], names: &[String], keep: bool) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, raw) in header_fields(header) {
        let listed = names.iter().any(|n| n.eq_ignore_ascii_case(&name));
        if listed == keep {
            out.extend_from_slice(raw);
        }
    }
    out.extend_from_slice(b"\r\n");
    out
}

/// The date in the `Date` header.
#[must_use]
pub fn sent_date(message: &mail_parser::Message<'_>) -> Option<DateTime<Utc>> {
    message
        .date()
        .and_then(|date| DateTime::from_timestamp(date.to_timestamp(), 0))
}

/// One address of an envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvelopeAddress {
    pub name: Option<String>,
    pub mailbox: Option<String>,
    pub host: Option<String>,
}

impl fmt::Display for EnvelopeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mailbox = self.mailbox.as_deref().unwrap_or_default();
        let addr = match &self.host {
            Some(host) => format!("{mailbox}@{host}"),
            None => mailbox.to_string(),
        };
        match &self.name {
            Some(name) => write!(f, "{name} <{addr}>"),
            None => f.write_str(&addr),
        }
    }
}

fn addresses(address: Option<&Address<'_>>) -> Vec<EnvelopeAddress> {
    let convert = |addr: &mail_parser::Addr<'_>| {
        let (mailbox, host) = match addr.address.as_deref() {
            Some(full) => match full.rsplit_once('@') {
                Some((mailbox, host)) => (Some(mailbox.to_string()), Some(host.to_string())),
                None => (Some(full.to_string()), None),
            },
            None => (None, None),
        };
        EnvelopeAddress {
            name: addr.name.as_deref().map(str::to_string),
            mailbox,
            host,
        }
    };
    match address {
        Some(Address::List(list)) => list.iter().map(convert).collect(),
        Some(Address::Group(groups)) => groups
            .iter()
            .flat_map(|group| group.addresses.iter().map(convert))
            .collect(),
        None => Vec::new(),
    }
}

/// The IMAP envelope of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// The `Date` header as written.
    pub date: Option<String>,
    pub subject: Option<String>,
    pub from: Vec<EnvelopeAddress>,
    pub sender: Vec<EnvelopeAddress>,
    pub reply_to: Vec<EnvelopeAddress>,
    pub to: Vec<EnvelopeAddress>,
    pub cc: Vec<EnvelopeAddress>,
    pub bcc: Vec<EnvelopeAddress>,
    pub in_reply_to: Option<String>,
    pub message_id: Option<String>,
}

impl Envelope {
    /// Build the envelope of `message`, whose raw bytes are `raw`.
    #[must_use]
    pub fn from_message(message: &mail_parser::Message<'_>, raw: &[u8]) -> Self {
        let (header, _) = split_header(raw);
        let from = addresses(message.from());
        let mut sender = addresses(message.sender());
        if sender.is_empty() {
            sender.clone_from(&from);
        }
        let mut reply_to = addresses(message.reply_to());
        if reply_to.is_empty() {
            reply_to.clone_from(&from);
        }
        Self {
            date: header_value(header, "Date"),
            subject: message.subject().map(str::to_string),
            from,
            sender,
            reply_to,
            to: addresses(message.to()),
            cc: addresses(message.cc()),
            bcc: addresses(message.bcc()),
            in_reply_to: header_value(header, "In-Reply-To"),
            message_id: header_value(header, "Message-ID"),
        }
    }
}

/// The MIME structure of a message or one of its parts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyStructure {
    pub mime_type: String,
    pub mime_subtype: String,
    pub params: Vec<(String, String)>,
    pub id: Option<String>,
    pub description: Option<String>,
    pub encoding: String,
    /// Encoded size in bytes.
    pub size: u32,
    /// Line count, for `text/*` parts.
    pub lines: Option<u32>,
    /// Sub-parts of a multipart.
    pub children: Vec<Self>,
    /// Envelope and structure of an encapsulated `message/rfc822`.
    pub message: Option<Box<(Envelope, Self)>>,
    /// `Content-Disposition` type, only in extended structures.
    pub disposition: Option<String>,
}

impl BodyStructure {
    /// Structure of `message`; `extended` adds the BODYSTRUCTURE-only
    /// fields.
    #[must_use]
    pub fn from_message(message: &mail_parser::Message<'_>, extended: bool) -> Self {
        let raw = message.raw_message();
        message
            .parts
            .first()
            .map(|root| part_structure(message, root, raw, extended))
            .unwrap_or_default()
    }
}

fn part_structure(
    message: &mail_parser::Message<'_>,
    part: &MessagePart<'_>,
    raw: &[u8],
    extended: bool,
) -> BodyStructure {
    let (default_type, default_subtype) = match &part.body {
        PartType::Multipart(_) => ("multipart", "mixed"),
        PartType::Html(_) => ("text", "html"),
        PartType::Text(_) => ("text", "plain"),
        PartType::Message(_) => ("message", "rfc822"),
        _ => ("application", "octet-stream"),
    };
    let content_type = part.content_type();
    let mime_type = content_type
        .map_or(default_type, |ct| ct.ctype())
        .to_ascii_lowercase();
    let mime_subtype = content_type
        .and_then(|ct| ct.subtype())
        .unwrap_or(default_subtype)
        .to_ascii_lowercase();
    let params = ["charset", "name", "boundary"]
        .into_iter()
        .filter_map(|key| {
            content_type
                .and_then(|ct| ct.attribute(key))
                .map(|value| (key.to_string(), value.to_string()))
        })
        .collect();

    let body = raw
        .get(offset(part.raw_body_offset())..offset(part.raw_end_offset()))
        .unwrap_or_default();
    let mut structure = BodyStructure {
        lines: (mime_type == "text")
            .then(|| u32::try_from(body.split(|&b| b == b'\n').count()).unwrap_or(u32::MAX)),
        mime_type,
        mime_subtype,
        params,
        id: part.content_id().map(str::to_string),
        description: part.content_description().map(str::to_string),
        encoding: part
            .content_transfer_encoding()
            .unwrap_or("7bit")
            .to_ascii_lowercase(),
        size: u32::try_from(body.len()).unwrap_or(u32::MAX),
        ..BodyStructure::default()
    };
    if extended {
        structure.disposition = part
            .content_disposition()
            .map(|cd| cd.ctype().to_ascii_lowercase());
    }

    match &part.body {
        PartType::Multipart(ids) => {
            structure.children = ids
                .iter()
                .filter_map(|id| message.parts.get(offset(*id)))
                .map(|child| part_structure(message, child, raw, extended))
                .collect();
        }
        PartType::Message(nested) => {
            let envelope = Envelope::from_message(nested, nested.raw_message());
            let inner = BodyStructure::from_message(nested, extended);
            structure.message = Some(Box::new((envelope, inner)));
        }
        _ => {}
    }
    structure
}

/// What part of a section is addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionText {
    /// The whole part (`BODY[]`, `BODY[1.2]`).
    All,
    Header,
    HeaderFields(Vec<String>),
    HeaderFieldsNot(Vec<String>),
    Text,
    /// The MIME header of a sub-part.
    Mime,
}

/// A parsed body-section fetch item such as `BODY.PEEK[1.HEADER]<0.512>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodySection {
    pub peek: bool,
    /// Part path; empty for the whole message.
    pub path: Vec<u32>,
    pub text: SectionText,
    /// `<start.length>`.
    pub partial: Option<(u32, u32)>,
}

impl FromStr for BodySection {
    type Err = Error;

    fn from_str(item: &str) -> Result<Self> {
        let invalid = || Error::Parse(format!("Invalid body section: {item}"));
        let upper = item.trim().to_ascii_uppercase();

        match upper.as_str() {
            "RFC822" => return Ok(Self::whole(false, SectionText::All)),
            "RFC822.HEADER" => return Ok(Self::whole(true, SectionText::Header)),
            "RFC822.TEXT" => return Ok(Self::whole(false, SectionText::Text)),
            _ => {}
        }

        let (peek, rest) = if let Some(rest) = upper.strip_prefix("BODY.PEEK[") {
            (true, rest)
        } else if let Some(rest) = upper.strip_prefix("BODY[") {
            (false, rest)
        } else {
            return Err(invalid());
        };
        let close = rest.find(']').ok_or_else(invalid)?;
        let (spec, tail) = (&rest[..close], &rest[close + 1..]);

        let partial = if tail.is_empty() {
            None
        } else {
            let range = tail
                .strip_prefix('<')
                .and_then(|t| t.strip_suffix('>'))
                .ok_or_else(invalid)?;
            let (start, len) = range.split_once('.').ok_or_else(invalid)?;
            Some((
                start.parse().map_err(|_| invalid())?,
                len.parse().map_err(|_| invalid())?,
            ))
        };

        let mut path = Vec::new();
        let mut remaining = spec;
        while remaining.starts_with(|c: char| c.is_ascii_digit()) {
            let (num, after) = remaining.split_once('.').unwrap_or((remaining, ""));
            let n: u32 = num.parse().map_err(|_| invalid())?;
            if n == 0 {
                return Err(invalid());
            }
            path.push(n);
            remaining = after;
        }

        let text = if remaining.is_empty() {
            SectionText::All
        } else if remaining == "HEADER" {
            SectionText::Header
        } else if remaining == "TEXT" {
            SectionText::Text
        } else if remaining == "MIME" && !path.is_empty() {
            SectionText::Mime
        } else if let Some(list) = remaining.strip_prefix("HEADER.FIELDS.NOT") {
            SectionText::HeaderFieldsNot(field_list(list).ok_or_else(invalid)?)
        } else if let Some(list) = remaining.strip_prefix("HEADER.FIELDS") {
            SectionText::HeaderFields(field_list(list).ok_or_else(invalid)?)
        } else {
            return Err(invalid());
        };

        Ok(Self {
            peek,
            path,
            text,
            partial,
        })
    }
}

fn field_list(raw: &str) -> Option<Vec<String>> {
    let inner = raw.trim().strip_prefix('(')?.strip_suffix(')')?;
    let fields: Vec<String> = inner.split_whitespace().map(str::to_string).collect();
    (!fields.is_empty()).then_some(fields)
}

impl BodySection {
    const fn whole(peek: bool, text: SectionText) -> Self {
        Self {
            peek,
            path: Vec::new(),
            text,
            partial: None,
        }
    }

    /// The bytes this section addresses within `raw`.
    ///
    /// A path pointing past the existing parts yields an empty section.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the message cannot be parsed.
    pub fn extract(&self, raw: &[u8]) -> Result<Vec<u8>> {
        let bytes = if self.path.is_empty() {
            Self::select(raw, &self.text)
        } else {
            let message = parse(raw)?;
            let (header, body) = match locate(&message, &self.path) {
                Some(found) => found,
                None => return Ok(Vec::new()),
            };
            match &self.text {
                SectionText::All => body.to_vec(),
                SectionText::Mime => header.to_vec(),
                // HEADER/TEXT of a part address its encapsulated message.
                other => Self::select(body, other),
            }
        };
        Ok(self.apply_partial(bytes))
    }

    fn select(raw: &[u8], text: &SectionText) -> Vec<u8> {
        let (header, body) = split_header(raw);
        match text {
            SectionText::All => raw.to_vec(),
            SectionText::Header | SectionText::Mime => header.to_vec(),
            SectionText::Text => body.to_vec(),
            SectionText::HeaderFields(names) => filter_header(header, names, true),
            SectionText::HeaderFieldsNot(names) => filter_header(header, names, false),
        }
    }

    fn apply_partial(&self, bytes: Vec<u8>) -> Vec<u8> {
        match self.partial {
            Some((start, len)) => {
                let start = offset(start).min(bytes.len());
                let end = start.saturating_add(offset(len)).min(bytes.len());
                bytes[start..end].to_vec()
            }
            None => bytes,
        }
    }
}

/// MIME header and body bytes of the part at `path`.
fn locate<'a>(message: &'a mail_parser::Message<'a>, path: &[u32]) -> Option<(&'a [u8], &'a [u8])> {
    let raw = message.raw_message();
    let mut part = message.parts.first()?;
    for (depth, &n) in path.iter().enumerate() {
        part = match &part.body {
            PartType::Multipart(ids) => {
                let id = ids.get(offset(n.checked_sub(1)?))?;
                message.parts.get(offset(*id))?
            }
            // A non-multipart message has a single part numbered 1.
            _ if depth == 0 && n == 1 => part,
            _ => return None,
        };
    }
    let header = raw.get(offset(part.raw_header_offset())..offset(part.raw_body_offset()))?;
    let body = raw.get(offset(part.raw_body_offset())..offset(part.raw_end_offset()))?;
    Some((header, body))
}

/// Whether any text part of `message` contains `needle`, ignoring case.
#[must_use]
pub fn body_contains(message: &mail_parser::Message<'_>, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    message.parts.iter().any(|part| match &part.body {
        PartType::Text(text) | PartType::Html(text) => text.to_lowercase().contains(&needle),
        _ => false,
    })
}
