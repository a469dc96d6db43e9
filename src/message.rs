//! Messages and the FETCH/SEARCH evaluation over them

use crate::error::{Error, Result};
use crate::flag::Flag;
use crate::mime::{self, BodySection, BodyStructure, Envelope};
use crate::seq_set::SeqSet;
use chrono::{DateTime, NaiveDate, Utc};
use std::str::FromStr;
use tracing::warn;

/// One message of a mailbox.
///
/// The bytes are not held here; the owning mailbox hands them to
/// [`Message::fetch`] and [`Message::matches`] on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub uid: u32,
    /// Internal date.
    pub date: DateTime<Utc>,
    pub size: u32,
    pub flags: Vec<Flag>,
    /// The work package this message projects, if any.
    pub work_package_id: Option<u64>,
}

/// A FETCH data item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItem {
    Envelope,
    /// Non-extended body structure (`BODY`).
    Body,
    BodyStructure,
    Flags,
    InternalDate,
    Rfc822Size,
    Uid,
    /// A body section such as `BODY.PEEK[HEADER]`, parsed at fetch time.
    Section(String),
}

impl FromStr for FetchItem {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let item = raw.trim();
        if item.is_empty() {
            return Err(Error::Parse("empty fetch item".into()));
        }
        Ok(match item.to_ascii_uppercase().as_str() {
            "ENVELOPE" => Self::Envelope,
            "BODY" => Self::Body,
            "BODYSTRUCTURE" => Self::BodyStructure,
            "FLAGS" => Self::Flags,
            "INTERNALDATE" => Self::InternalDate,
            "RFC822.SIZE" => Self::Rfc822Size,
            "UID" => Self::Uid,
            _ => Self::Section(item.to_string()),
        })
    }
}

impl FetchItem {
    const fn needs_body(&self) -> bool {
        matches!(
            self,
            Self::Envelope | Self::Body | Self::BodyStructure | Self::Section(_)
        )
    }

    /// Parse a space separated list, e.g. `FLAGS UID BODY.PEEK[HEADER]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] for an empty list.
    pub fn parse_list(raw: &str) -> Result<Vec<Self>> {
        let mut items = Vec::new();
        let mut rest = raw.trim();
        while !rest.is_empty() {
            // Section names may contain spaces inside their brackets.
            let end = match (rest.find(' '), rest.find('[')) {
                (Some(space), Some(open)) if open < space => rest[open..]
                    .find(']')
                    .map_or(rest.len(), |close| {
                        let after = open + close + 1;
                        rest[after..].find(' ').map_or(rest.len(), |s| after + s)
                    }),
                (Some(space), _) => space,
                (None, _) => rest.len(),
            };
            items.push(rest[..end].parse()?);
            rest = rest[end..].trim_start();
        }
        if items.is_empty() {
            return Err(Error::Parse("empty fetch item list".into()));
        }
        Ok(items)
    }
}

/// The data returned for one message by a FETCH.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedMessage {
    pub seq_num: u32,
    pub uid: Option<u32>,
    pub envelope: Option<Envelope>,
    pub body_structure: Option<BodyStructure>,
    pub flags: Option<Vec<Flag>>,
    pub internal_date: Option<DateTime<Utc>>,
    pub size: Option<u32>,
    pub sections: Vec<(BodySection, Vec<u8>)>,
}

/// A SEARCH predicate; every set field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchCriteria {
    pub seq_num: Option<SeqSet>,
    pub uid: Option<SeqSet>,
    /// Internal date on or after.
    pub since: Option<NaiveDate>,
    /// Internal date strictly before.
    pub before: Option<NaiveDate>,
    pub sent_since: Option<NaiveDate>,
    pub sent_before: Option<NaiveDate>,
    /// (field, substring); an empty substring matches any value.
    pub header: Vec<(String, String)>,
    pub body: Vec<String>,
    pub text: Vec<String>,
    pub with_flags: Vec<Flag>,
    pub without_flags: Vec<Flag>,
    pub larger: Option<u32>,
    pub smaller: Option<u32>,
    pub not: Vec<Self>,
    pub or: Vec<(Self, Self)>,
}

impl SearchCriteria {
    /// Messages without `\Seen`.
    #[must_use]
    pub fn unseen() -> Self {
        Self {
            without_flags: vec![Flag::Seen],
            ..Self::default()
        }
    }
}

/// Largest sequence number and UID of the mailbox, for `*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub max_seq: u32,
    pub max_uid: u32,
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

impl Message {
    #[must_use]
    pub fn is_seen(&self) -> bool {
        crate::flag::is_seen(&self.flags)
    }

    #[must_use]
    pub fn has_flag(&self, flag: &Flag) -> bool {
        self.flags.contains(flag)
    }

    /// Answer `items` for this message at `seq_num`.
    ///
    /// `load_body` is only called when an item needs the bytes, and the
    /// bytes are dropped once the items are answered. Malformed section
    /// names are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if a requested item needs the body and it
    /// is missing or does not parse, or the error of `load_body`.
    pub fn fetch<F>(&self, seq_num: u32, items: &[FetchItem], load_body: F) -> Result<FetchedMessage>
    where
        F: FnOnce() -> Result<Option<Vec<u8>>>,
    {
        let body = if items.iter().any(FetchItem::needs_body) {
            Some(load_body()?.ok_or_else(|| Error::Parse(format!("body of UID {} unavailable", self.uid)))?)
        } else {
            None
        };
        let raw = body.as_deref().unwrap_or_default();

        let mut fetched = FetchedMessage {
            seq_num,
            ..FetchedMessage::default()
        };
        for item in items {
            match item {
                FetchItem::Envelope => {
                    let parsed = mime::parse(raw)?;
                    fetched.envelope = Some(Envelope::from_message(&parsed, raw));
                }
                FetchItem::Body | FetchItem::BodyStructure => {
                    let parsed = mime::parse(raw)?;
                    let extended = *item == FetchItem::BodyStructure;
                    fetched.body_structure = Some(BodyStructure::from_message(&parsed, extended));
                }
                FetchItem::Flags => fetched.flags = Some(self.flags.clone()),
                FetchItem::InternalDate => fetched.internal_date = Some(self.date),
                FetchItem::Rfc822Size => fetched.size = Some(self.size),
                FetchItem::Uid => fetched.uid = Some(self.uid),
                FetchItem::Section(name) => match name.parse::<BodySection>() {
                    Ok(section) => {
                        let bytes = section.extract(raw)?;
                        fetched.sections.push((section, bytes));
                    }
                    Err(e) => warn!("Skipping fetch item {name}: {e}"),
                },
            }
        }
        Ok(fetched)
    }

    /// Whether this message, at `seq_num`, satisfies `criteria`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the body is missing or does not parse.
    pub fn matches(
        &self,
        seq_num: u32,
        criteria: &SearchCriteria,
        bounds: Bounds,
        body: &[u8],
    ) -> Result<bool> {
        let parsed = mime::parse(body)?;
        Ok(self.evaluate(seq_num, criteria, bounds, body, &parsed))
    }

    fn evaluate(
        &self,
        seq_num: u32,
        c: &SearchCriteria,
        bounds: Bounds,
        raw: &[u8],
        parsed: &mail_parser::Message<'_>,
    ) -> bool {
        if let Some(set) = &c.seq_num
            && !set.contains(seq_num, bounds.max_seq)
        {
            return false;
        }
        if let Some(set) = &c.uid
            && !set.contains(self.uid, bounds.max_uid)
        {
            return false;
        }

        let day = self.date.date_naive();
        if c.since.is_some_and(|since| day < since) || c.before.is_some_and(|before| day >= before) {
            return false;
        }
        if c.sent_since.is_some() || c.sent_before.is_some() {
            let Some(sent) = mime::sent_date(parsed).map(|d| d.date_naive()) else {
                return false;
            };
            if c.sent_since.is_some_and(|since| sent < since)
                || c.sent_before.is_some_and(|before| sent >= before)
            {
                return false;
            }
        }

        if c.larger.is_some_and(|n| self.size <= n) || c.smaller.is_some_and(|n| self.size >= n) {
            return false;
        }
        if !c.with_flags.iter().all(|f| self.has_flag(f))
            || c.without_flags.iter().any(|f| self.has_flag(f))
        {
            return false;
        }

        let (header, _) = mime::split_header(raw);
        for (field, needle) in &c.header {
            match mime::header_value(header, field) {
                Some(value) if needle.is_empty() || contains_ci(&value, needle) => {}
                _ => return false,
            }
        }
        if !c.body.iter().all(|needle| mime::body_contains(parsed, needle)) {
            return false;
        }
        let header_text = String::from_utf8_lossy(header);
        if !c
            .text
            .iter()
            .all(|needle| contains_ci(&header_text, needle) || mime::body_contains(parsed, needle))
        {
            return false;
        }

        if c.not
            .iter()
            .any(|inner| self.evaluate(seq_num, inner, bounds, raw, parsed))
        {
            return false;
        }
        c.or.iter().all(|(left, right)| {
            self.evaluate(seq_num, left, bounds, raw, parsed)
                || self.evaluate(seq_num, right, bounds, raw, parsed)
        })
    }
}
