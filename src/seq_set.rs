//! IMAP sequence sets
//!
//! A sequence set selects messages either by sequence number or by UID,
//! e.g. `1:3,5,7:*`. `*` stands for the largest number in use, which is
//! only known when the set is evaluated against a mailbox, so it is kept
//! symbolic until then.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Num(u32),
    Star,
}

impl Bound {
    const fn resolve(self, largest: u32) -> u32 {
        match self {
            Self::Num(n) => n,
            Self::Star => largest,
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Star => f.write_str("*"),
        }
    }
}

/// A set of sequence numbers or UIDs.
///
/// # Examples
///
/// ```
/// use imap_facade::SeqSet;
///
/// let set: SeqSet = "2:4,9:*".parse().unwrap();
/// assert!(set.contains(3, 12));
/// assert!(set.contains(12, 12));
/// assert!(!set.contains(5, 12));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SeqSet {
    ranges: Vec<(Bound, Bound)>,
}

impl SeqSet {
    /// An empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    /// A set holding just `id`.
    #[must_use]
    pub fn single(id: u32) -> Self {
        Self::range(id, id)
    }

    /// The inclusive range `start:end`; endpoints may come in either order.
    #[must_use]
    pub fn range(start: u32, end: u32) -> Self {
        let mut set = Self::new();
        set.insert(start, end);
        set
    }

    /// `1:*`, every message in the mailbox.
    #[must_use]
    pub fn all() -> Self {
        Self {
            ranges: vec![(Bound::Num(1), Bound::Star)],
        }
    }

    /// Add the inclusive range `start:end`.
    pub fn insert(&mut self, start: u32, end: u32) {
        self.ranges
            .push((Bound::Num(start.min(end)), Bound::Num(start.max(end))));
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Whether `id` is in the set when `*` means `largest`.
    ///
    /// RFC 3501 allows range endpoints in either order, so `*:4` is the
    /// same as `4:*`.
    #[must_use]
    pub fn contains(&self, id: u32, largest: u32) -> bool {
        self.ranges.iter().any(|&(start, end)| {
            let a = start.resolve(largest);
            let b = end.resolve(largest);
            a.min(b) <= id && id <= a.max(b)
        })
    }
}

impl FromStr for SeqSet {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        fn bound(raw: &str, whole: &str) -> Result<Bound> {
            if raw == "*" {
                return Ok(Bound::Star);
            }
            match raw.parse::<u32>() {
                Ok(n) if n > 0 => Ok(Bound::Num(n)),
                _ => Err(Error::Parse(format!("Invalid sequence set: {whole}"))),
            }
        }

        let mut ranges = Vec::new();
        for part in raw.split(',') {
            let mut ends = part.split(':');
            match (ends.next(), ends.next(), ends.next()) {
                (Some(only), None, None) => {
                    let b = bound(only, raw)?;
                    ranges.push((b, b));
                }
                (Some(start), Some(end), None) => {
                    ranges.push((bound(start, raw)?, bound(end, raw)?));
                }
                _ => return Err(Error::Parse(format!("Invalid sequence set: {raw}"))),
            }
        }
        Ok(Self { ranges })
    }
}

impl fmt::Display for SeqSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (ix, (start, end)) in self.ranges.iter().enumerate() {
            if ix > 0 {
                f.write_str(",")?;
            }
            if start == end {
                write!(f, "{start}")?;
            } else {
                write!(f, "{start}:{end}")?;
            }
        }
        Ok(())
    }
}
