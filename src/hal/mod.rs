//! HAL+JSON resources of the OpenProject API v3
//!
//! Every payload is a JSON object discriminated by `_type`, carrying a
//! `_links` map and an `_embedded` map next to its plain fields. Decoding
//! produces the closed [`Resource`] sum type; types this crate does not
//! use land in [`Resource::Unknown`] with their fields intact.

mod client;
mod collection;
mod resources;

pub use client::HalClient;
pub use collection::{Collection, Filters};
pub use resources::{ApiError, Attachment, Formattable, Project, TimeEntry, User, WorkPackage};

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A named hyperlink from `_links`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl Link {
    #[must_use]
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: Some(href.into()),
            title: None,
        }
    }

    /// The target, or `None` for null/empty links (e.g. an unset assignee).
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        self.href.as_deref().filter(|href| !href.is_empty())
    }
}

/// The generic part shared by every resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceObject {
    pub kind: String,
    pub links: HashMap<String, Link>,
    pub embedded: HashMap<String, Vec<Resource>>,
    pub fields: Map<String, Value>,
}

impl ResourceObject {
    fn decode(kind: String, map: Map<String, Value>) -> Result<Self> {
        let mut object = Self {
            kind,
            ..Self::default()
        };
        for (key, value) in map {
            match key.as_str() {
                "_type" => {}
                "_links" => object.links = decode_links(value)?,
                "_embedded" => object.embedded = decode_embedded(value)?,
                _ => {
                    object.fields.insert(key, value);
                }
            }
        }
        Ok(object)
    }

    #[must_use]
    pub fn link(&self, name: &str) -> Option<&Link> {
        self.links.get(name).filter(|link| link.target().is_some())
    }

    #[must_use]
    pub fn embedded(&self, name: &str) -> &[Resource] {
        self.embedded.get(name).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    #[must_use]
    pub fn u64_field(&self, name: &str) -> Option<u64> {
        self.fields.get(name).and_then(Value::as_u64)
    }

    #[must_use]
    pub fn datetime_field(&self, name: &str) -> Option<DateTime<Utc>> {
        self.str_field(name)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

fn decode_links(value: Value) -> Result<HashMap<String, Link>> {
    let Value::Object(map) = value else {
        return Err(Error::Decode("'_links' is not an object".into()));
    };
    let mut links = HashMap::with_capacity(map.len());
    for (name, raw) in map {
        // Multi-valued links (arrays) are not used by this crate.
        if raw.is_object() {
            links.insert(name, serde_json::from_value(raw)?);
        }
    }
    Ok(links)
}

fn decode_embedded(value: Value) -> Result<HashMap<String, Vec<Resource>>> {
    let Value::Object(map) = value else {
        return Err(Error::Decode("'_embedded' is not an object".into()));
    };
    let mut embedded = HashMap::with_capacity(map.len());
    for (name, raw) in map {
        let items = match raw {
            Value::Array(values) => values
                .into_iter()
                .map(Resource::from_value)
                .collect::<Result<Vec<_>>>()?,
            value @ Value::Object(_) => vec![Resource::from_value(value)?],
            _ => continue,
        };
        embedded.insert(name, items);
    }
    Ok(embedded)
}

/// A decoded resource, one variant per `_type` this crate understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Collection(Collection),
    Project(Project),
    WorkPackage(WorkPackage),
    User(User),
    TimeEntry(TimeEntry),
    Attachment(Attachment),
    Error(ApiError),
    Unknown(ResourceObject),
}

impl Resource {
    /// Decode a resource from raw JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the bytes are not a JSON object with
    /// a `_type` field.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(data)?;
        Self::from_value(value)
    }

    /// Decode a resource from a parsed JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the value is not an object, lacks
    /// `_type`, or has malformed `_links`/`_embedded`.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(Error::Decode("resource is not a JSON object".into()));
        };
        let kind = map
            .get("_type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Decode("missing '_type' field, unknown resource type".into()))?
            .to_string();
        let object = ResourceObject::decode(kind, map)?;

        Ok(match object.kind.as_str() {
            "Collection" => Self::Collection(Collection(object)),
            "Project" => Self::Project(Project(object)),
            "WorkPackage" => Self::WorkPackage(WorkPackage(object)),
            "User" => Self::User(User(object)),
            "TimeEntry" => Self::TimeEntry(TimeEntry(object)),
            "Attachment" => Self::Attachment(Attachment(object)),
            "Error" => Self::Error(ApiError(object)),
            _ => Self::Unknown(object),
        })
    }

    /// The `_type` discriminator.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.object().kind
    }

    #[must_use]
    pub const fn object(&self) -> &ResourceObject {
        match self {
            Self::Collection(Collection(o))
            | Self::Project(Project(o))
            | Self::WorkPackage(WorkPackage(o))
            | Self::User(User(o))
            | Self::TimeEntry(TimeEntry(o))
            | Self::Attachment(Attachment(o))
            | Self::Error(ApiError(o))
            | Self::Unknown(o) => o,
        }
    }

    /// Turn an `Error` resource into [`Error::Remote`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] for `Error` resources.
    pub fn into_result(self) -> Result<Self> {
        match self {
            Self::Error(err) => Err(err.into()),
            other => Ok(other),
        }
    }
}

/// Typed conversion out of [`Resource`], failing with [`Error::Decode`]
/// when the payload had a different `_type`.
macro_rules! typed_resource {
    ($ty:ident) => {
        impl TryFrom<Resource> for $ty {
            type Error = Error;

            fn try_from(res: Resource) -> Result<Self> {
                match res.into_result()? {
                    Resource::$ty(inner) => Ok(inner),
                    other => Err(Error::Decode(format!(
                        "expected {} resource, got {}",
                        stringify!($ty),
                        other.kind()
                    ))),
                }
            }
        }
    };
}

typed_resource!(Collection);
typed_resource!(Project);
typed_resource!(WorkPackage);
typed_resource!(User);
typed_resource!(TimeEntry);
typed_resource!(Attachment);
