//! IMAP message flags
//!
//! Provides a strongly-typed enum for IMAP flags instead of raw
//! strings, the STORE operations applied to flag sets, and the
//! comma-separated encoding used to persist flags in a time entry
//! comment on the remote service.

use std::collections::HashSet;
use std::fmt;

/// An IMAP message flag.
///
/// System flags (prefixed with `\` in the IMAP protocol) have
/// dedicated variants. User-defined keyword flags use [`Flag::Keyword`].
///
/// # Examples
///
/// ```
/// use imap_facade::Flag;
///
/// let seen = Flag::Seen;
/// assert_eq!(seen.as_imap_str(), "\\Seen");
///
/// assert_eq!(Flag::from("\\SEEN"), Flag::Seen);
/// assert_eq!(Flag::from("Important"), Flag::Keyword("Important".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Message has been read (`\Seen`).
    Seen,
    /// Message has been answered (`\Answered`).
    Answered,
    /// Message is flagged for attention (`\Flagged`).
    Flagged,
    /// Message is marked for deletion (`\Deleted`).
    Deleted,
    /// Message is a draft (`\Draft`).
    Draft,
    /// Message arrived in this session (`\Recent`).
    Recent,
    /// A user-defined keyword flag (no `\` prefix).
    Keyword(String),
}

impl Flag {
    /// The IMAP wire representation of this flag.
    ///
    /// System flags include the leading backslash (e.g. `\Seen`).
    /// Keyword flags are returned as-is.
    #[must_use]
    pub fn as_imap_str(&self) -> &str {
        match self {
            Self::Seen => "\\Seen",
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
            Self::Recent => "\\Recent",
            Self::Keyword(kw) => kw,
        }
    }

    /// Keyword marking work packages whose subject ends in the
    /// importance suffix.
    #[must_use]
    pub fn important() -> Self {
        Self::Keyword("Important".to_string())
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_imap_str())
    }
}

impl From<&str> for Flag {
    fn from(s: &str) -> Self {
        if s.eq_ignore_ascii_case("\\seen") {
            Self::Seen
        } else if s.eq_ignore_ascii_case("\\answered") {
            Self::Answered
        } else if s.eq_ignore_ascii_case("\\flagged") {
            Self::Flagged
        } else if s.eq_ignore_ascii_case("\\deleted") {
            Self::Deleted
        } else if s.eq_ignore_ascii_case("\\draft") {
            Self::Draft
        } else if s.eq_ignore_ascii_case("\\recent") {
            Self::Recent
        } else {
            Self::Keyword(s.to_string())
        }
    }
}

impl From<String> for Flag {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

/// The three STORE operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagOp {
    /// `+FLAGS`: add the given flags.
    Add,
    /// `-FLAGS`: remove the given flags.
    Remove,
    /// `FLAGS`: replace the flag set.
    Set,
}

/// Apply `op` with `flags` to `current`.
///
/// Order of first appearance is kept and duplicates never appear in
/// the result.
#[must_use]
pub fn apply(current: &[Flag], op: FlagOp, flags: &[Flag]) -> Vec<Flag> {
    fn push(flag: &Flag, out: &mut Vec<Flag>) {
        if !out.contains(flag) {
            out.push(flag.clone());
        }
    }

    let mut out: Vec<Flag> = Vec::with_capacity(current.len() + flags.len());
    match op {
        FlagOp::Add => {
            for flag in current.iter().chain(flags) {
                push(flag, &mut out);
            }
        }
        FlagOp::Remove => {
            for flag in current.iter().filter(|f| !flags.contains(f)) {
                push(flag, &mut out);
            }
        }
        FlagOp::Set => {
            for flag in flags {
                push(flag, &mut out);
            }
        }
    }
    out
}

/// Whether two flag lists hold the same set of flags, ignoring order.
#[must_use]
pub fn same_set(a: &[Flag], b: &[Flag]) -> bool {
    let a: HashSet<&Flag> = a.iter().collect();
    let b: HashSet<&Flag> = b.iter().collect();
    a == b
}

/// Whether `flags` contains `\Seen`.
#[must_use]
pub fn is_seen(flags: &[Flag]) -> bool {
    flags.contains(&Flag::Seen)
}

/// Encode flags for storage in a time entry comment.
///
/// The format is the wire form of each flag joined by `,`, which is
/// what existing entries on the remote service already hold.
#[must_use]
pub fn encode_comment(flags: &[Flag]) -> String {
    flags
        .iter()
        .map(Flag::as_imap_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// Decode flags stored by [`encode_comment`].
///
/// Blank entries are dropped and duplicates collapse.
#[must_use]
pub fn decode_comment(raw: &str) -> Vec<Flag> {
    let parsed: Vec<Flag> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Flag::from)
        .collect();
    apply(&[], FlagOp::Set, &parsed)
}
