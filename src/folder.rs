//! System folder types
//!
//! The fixed folders every session owns next to its project mailboxes.
//! Well-known folders carry an RFC 6154 special-use attribute; any
//! other configured name becomes a `Custom` folder without one.

use std::fmt;

/// A system mailbox folder.
///
/// # Examples
///
/// ```
/// use imap_facade::Folder;
///
/// let trash = Folder::from("Trash");
/// assert_eq!(trash.as_str(), "Trash");
/// assert_eq!(trash.special_use(), Some("\\Trash"));
///
/// assert_eq!(Folder::from("inbox"), Folder::Inbox);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Folder {
    /// The INBOX folder (RFC 3501 required, case-insensitive).
    Inbox,
    /// Sent messages.
    Sent,
    /// Draft messages.
    Drafts,
    /// Deleted messages.
    Trash,
    /// Spam / junk messages.
    Spam,
    /// Archived messages.
    Archive,
    /// Any other configured folder name.
    Custom(String),
}

impl Folder {
    /// Create a folder for a non-standard name.
    #[must_use]
    pub fn custom(name: impl Into<String>) -> Self {
        Self::Custom(name.into())
    }

    /// The IMAP folder name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Inbox => "INBOX",
            Self::Sent => "Sent",
            Self::Drafts => "Drafts",
            Self::Trash => "Trash",
            Self::Spam => "Spam",
            Self::Archive => "Archive",
            Self::Custom(name) => name,
        }
    }

    /// The RFC 6154 special-use attribute advertised in LIST responses.
    #[must_use]
    pub const fn special_use(&self) -> Option<&'static str> {
        match self {
            Self::Inbox | Self::Custom(_) => None,
            Self::Sent => Some("\\Sent"),
            Self::Drafts => Some("\\Drafts"),
            Self::Trash => Some("\\Trash"),
            Self::Spam => Some("\\Junk"),
            Self::Archive => Some("\\Archive"),
        }
    }

    /// Whether `name` refers to INBOX, which IMAP compares case-insensitively.
    #[must_use]
    pub fn is_inbox(name: &str) -> bool {
        name.eq_ignore_ascii_case("inbox")
    }
}

impl fmt::Display for Folder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Folder {
    fn from(s: &str) -> Self {
        if Self::is_inbox(s) {
            Self::Inbox
        } else {
            match s {
                "Sent" => Self::Sent,
                "Drafts" => Self::Drafts,
                "Trash" => Self::Trash,
                "Spam" | "Junk" => Self::Spam,
                "Archive" => Self::Archive,
                other => Self::Custom(other.to_string()),
            }
        }
    }
}

impl From<String> for Folder {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}
