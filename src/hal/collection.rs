//! Paginated collections and collection filters

use super::{HalClient, Resource, ResourceObject};
use crate::error::Result;
use serde_json::{Value, json};

/// A page of a remote collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection(pub ResourceObject);

impl Collection {
    /// The resources on this page (`_embedded.elements`).
    #[must_use]
    pub fn items(&self) -> &[Resource] {
        self.0.embedded("elements")
    }

    /// Consume the page, keeping only its resources.
    #[must_use]
    pub fn into_items(mut self) -> Vec<Resource> {
        self.0.embedded.remove("elements").unwrap_or_default()
    }

    /// Total number of resources across all pages.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.0.u64_field("total").unwrap_or_default()
    }

    /// Number of resources on this page.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.0.u64_field("count").unwrap_or_default()
    }

    #[must_use]
    pub fn offset(&self) -> Option<u64> {
        self.0.u64_field("offset")
    }

    #[must_use]
    pub fn page_size(&self) -> Option<u64> {
        self.0.u64_field("pageSize")
    }

    /// Whether another page follows this one.
    #[must_use]
    pub fn is_paginated(&self) -> bool {
        self.0.link("nextByOffset").is_some()
    }

    /// Fetch the page after this one, or `None` on the last page.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is not a
    /// collection.
    pub async fn next_page(&self, client: &HalClient) -> Result<Option<Self>> {
        match self.0.link("nextByOffset") {
            Some(link) => {
                let res = client.link_get(link).await?;
                Ok(Some(Self::try_from(res)?))
            }
            None => Ok(None),
        }
    }
}

/// OpenProject collection filters, sent as the `filters` query
/// parameter.
///
/// # Examples
///
/// ```
/// use imap_facade::hal::Filters;
///
/// let filters = Filters::new().filter("user", "=", 5);
/// assert_eq!(
///     filters.to_query(),
///     r#"[{"user":{"operator":"=","values":["5"]}}]"#
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    entries: Vec<(String, String, Vec<String>)>,
}

impl Filters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `name operator value`.
    #[must_use]
    pub fn filter(mut self, name: &str, operator: &str, value: impl ToString) -> Self {
        self.entries
            .push((name.to_string(), operator.to_string(), vec![value.to_string()]));
        self
    }

    /// Add a filter with several values, e.g. `status o` (open) with none.
    #[must_use]
    pub fn filter_values(mut self, name: &str, operator: &str, values: &[&str]) -> Self {
        self.entries.push((
            name.to_string(),
            operator.to_string(),
            values.iter().map(ToString::to_string).collect(),
        ));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The JSON array form expected by the API.
    #[must_use]
    pub fn to_query(&self) -> String {
        let filters: Vec<Value> = self
            .entries
            .iter()
            .map(|(name, operator, values)| {
                json!({ name.as_str(): { "operator": operator, "values": values } })
            })
            .collect();
        Value::Array(filters).to_string()
    }
}
