//! Authenticated HAL client

use super::{Collection, Filters, Link, Resource};
use crate::error::{Error, Result};
use reqwest::{Method, RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Client for the OpenProject API, authenticating with an API key.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HalClient {
    http: reqwest::Client,
    base: String,
    api_key: Option<String>,
}

impl HalClient {
    /// Create a client for the instance at `base`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base: &str, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            base: base.trim_end_matches('/').to_string(),
            api_key: None,
        })
    }

    /// Authenticate requests as `apikey:<key>` basic auth.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{path}", self.base)
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut req = self
            .http
            .request(method, self.url(path))
            .header(reqwest::header::ACCEPT, "application/hal+json, application/json");
        if let Some(key) = &self.api_key {
            req = req.basic_auth("apikey", Some(key));
        }
        req
    }

    /// A non-2xx status is always an error: the API's own error payload
    /// when the body carries one, otherwise the status itself.
    async fn send(req: RequestBuilder) -> Result<Resource> {
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        let decoded = Resource::from_slice(&body);
        if !status.is_success() {
            return match decoded {
                Ok(Resource::Error(err)) => Err(err.into()),
                _ => Err(status_error(status)),
            };
        }
        decoded?.into_result()
    }

    /// `GET path`, decoded into a [`Resource`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] for error payloads, [`Error::Transport`]
    /// for network failures and [`Error::Decode`] for anything that is
    /// not a HAL resource.
    pub async fn get(&self, path: &str) -> Result<Resource> {
        debug!("GET {path}");
        Self::send(self.request(Method::GET, path)).await
    }

    /// `GET path`, expecting the first page of a collection.
    ///
    /// # Errors
    ///
    /// Same as [`HalClient::get`], plus [`Error::Decode`] if the
    /// resource is not a collection.
    pub async fn get_collection(&self, path: &str) -> Result<Collection> {
        Collection::try_from(self.get(path).await?)
    }

    /// Like [`HalClient::get_collection`] with a `filters` query.
    ///
    /// # Errors
    ///
    /// Same as [`HalClient::get_collection`].
    pub async fn get_filtered_collection(
        &self,
        path: &str,
        filters: &Filters,
    ) -> Result<Collection> {
        debug!("GET {path} filters={}", filters.to_query());
        let req = self
            .request(Method::GET, path)
            .query(&[("filters", filters.to_query())]);
        Collection::try_from(Self::send(req).await?)
    }

    /// Follow a link from `_links`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] for a link without target, otherwise
    /// the same as [`HalClient::get`].
    pub async fn link_get(&self, link: &Link) -> Result<Resource> {
        let href = link
            .target()
            .ok_or_else(|| Error::Decode("link has no href".into()))?;
        self.get(href).await
    }

    /// `POST path` with a JSON body.
    ///
    /// # Errors
    ///
    /// Same as [`HalClient::get`].
    pub async fn post(&self, path: &str, body: &Value) -> Result<Resource> {
        debug!("POST {path}");
        Self::send(self.request(Method::POST, path).json(body)).await
    }

    /// `PATCH path` with a JSON body.
    ///
    /// # Errors
    ///
    /// Same as [`HalClient::get`].
    pub async fn patch(&self, path: &str, body: &Value) -> Result<Resource> {
        debug!("PATCH {path}");
        Self::send(self.request(Method::PATCH, path).json(body)).await
    }

    /// Download the raw bytes behind `link`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] on a non-success status and
    /// [`Error::Transport`] on network failures.
    pub async fn download(&self, link: &Link) -> Result<Vec<u8>> {
        let href = link
            .target()
            .ok_or_else(|| Error::Decode("download link has no href".into()))?;
        debug!("GET {href} (download)");
        let resp: Response = self.request(Method::GET, href).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(status_error(status));
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

fn status_error(status: reqwest::StatusCode) -> Error {
    Error::Remote {
        identifier: format!("http:{}", status.as_u16()),
        message: status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string(),
    }
}
