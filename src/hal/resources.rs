//! Typed views over the resources this crate consumes

use super::{Link, ResourceObject};
use crate::error::Error;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

/// Formatted text as OpenProject returns it (`description`, `comment`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Formattable {
    pub format: String,
    pub raw: String,
    pub html: String,
}

impl Formattable {
    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let text = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Some(Self {
            format: text("format"),
            raw: text("raw"),
            html: text("html"),
        })
    }
}

/// Numeric id from the last path segment of an API href.
fn id_from_href(href: &str) -> Option<u64> {
    href.trim_end_matches('/').rsplit('/').next()?.parse().ok()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Project(pub ResourceObject);

impl Project {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.0.u64_field("id").unwrap_or_default()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.0.str_field("name").unwrap_or_default()
    }

    #[must_use]
    pub fn description(&self) -> Option<Formattable> {
        self.0.fields.get("description").and_then(Formattable::from_value)
    }

    /// Collection of the project's work packages.
    #[must_use]
    pub fn work_packages_link(&self) -> Link {
        self.0
            .link("workPackages")
            .cloned()
            .unwrap_or_else(|| Link::new(format!("/api/v3/projects/{}/work_packages", self.id())))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkPackage(pub ResourceObject);

impl WorkPackage {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.0.u64_field("id").unwrap_or_default()
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        self.0.str_field("subject").unwrap_or_default()
    }

    #[must_use]
    pub fn description(&self) -> Option<Formattable> {
        self.0.fields.get("description").and_then(Formattable::from_value)
    }

    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.0.datetime_field("createdAt")
    }

    #[must_use]
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.0.datetime_field("updatedAt")
    }

    #[must_use]
    pub fn author(&self) -> Option<&Link> {
        self.0.link("author")
    }

    #[must_use]
    pub fn assignee(&self) -> Option<&Link> {
        self.0.link("assignee")
    }

    #[must_use]
    pub fn responsible(&self) -> Option<&Link> {
        self.0.link("responsible")
    }

    #[must_use]
    pub fn attachments_link(&self) -> Option<&Link> {
        self.0.link("attachments")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct User(pub ResourceObject);

impl User {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.0.u64_field("id").unwrap_or_default()
    }

    #[must_use]
    pub fn login(&self) -> &str {
        self.0.str_field("login").unwrap_or_default()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.0.str_field("name").unwrap_or_default()
    }

    /// The email address, if visible to the requesting user.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.0.str_field("email").filter(|email| !email.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeEntry(pub ResourceObject);

impl TimeEntry {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.0.u64_field("id").unwrap_or_default()
    }

    #[must_use]
    pub fn comment(&self) -> Option<Formattable> {
        self.0.fields.get("comment").and_then(Formattable::from_value)
    }

    /// ISO 8601 duration, e.g. `PT1M`.
    #[must_use]
    pub fn hours(&self) -> Option<&str> {
        self.0.str_field("hours")
    }

    #[must_use]
    pub fn spent_on(&self) -> Option<NaiveDate> {
        self.0
            .str_field("spentOn")
            .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
    }

    #[must_use]
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.0.datetime_field("updatedAt")
    }

    /// Id of the work package the entry is logged on, if any.
    #[must_use]
    pub fn work_package_id(&self) -> Option<u64> {
        self.0
            .link("workPackage")
            .and_then(Link::target)
            .and_then(id_from_href)
    }

    #[must_use]
    pub fn self_link(&self) -> Link {
        self.0
            .link("self")
            .cloned()
            .unwrap_or_else(|| Link::new(format!("/api/v3/time_entries/{}", self.id())))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment(pub ResourceObject);

impl Attachment {
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.str_field("fileName").unwrap_or("attachment")
    }

    #[must_use]
    pub fn content_type(&self) -> &str {
        self.0
            .str_field("contentType")
            .unwrap_or("application/octet-stream")
    }

    #[must_use]
    pub fn download_location(&self) -> Option<&Link> {
        self.0.link("downloadLocation")
    }
}

/// The remote service's structured error payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError(pub ResourceObject);

impl ApiError {
    #[must_use]
    pub fn identifier(&self) -> &str {
        self.0.str_field("errorIdentifier").unwrap_or_default()
    }

    #[must_use]
    pub fn message(&self) -> &str {
        self.0.str_field("message").unwrap_or_default()
    }
}

impl From<ApiError> for Error {
    fn from(err: ApiError) -> Self {
        Self::Remote {
            identifier: err.identifier().to_string(),
            message: err.message().to_string(),
        }
    }
}
