//! Caches for data derived from remote resources
//!
//! Resolving a sender or downloading an attachment costs a round trip per
//! message, so both are cached process-wide and shared by all sessions.
//! Profiles expire after the configured TTL and stay in memory; attachment
//! bytes go to the cache database. Attachment bytes and the time-entry
//! activity never change once fetched.

use crate::config::FacadeConfig;
use crate::db::CacheDb;
use crate::error::{Error, Result};
use crate::hal::{Attachment, HalClient, Link, Resource, User};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::debug;

/// A resolved user, keyed by the link it was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedProfile {
    pub link: String,
    pub id: u64,
    pub name: String,
    pub email: String,
    /// `Name <email>`, ready for an address header.
    pub address: String,
    pub fetched_at: Instant,
}

impl CachedProfile {
    fn from_user(link: &str, user: &User, config: &FacadeConfig, now: Instant) -> Self {
        let email = user
            .email()
            .map_or_else(|| config.placeholder_email(user.id()), str::to_string);
        Self {
            link: link.to_string(),
            id: user.id(),
            name: user.name().to_string(),
            address: format_address(user.name(), &email),
            email,
            fetched_at: now,
        }
    }

    /// Whether the entry may still be served at `now`.
    #[must_use]
    pub fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.fetched_at) <= ttl
    }
}

/// `Name <email>`, or the bare address when the name is empty.
#[must_use]
pub fn format_address(name: &str, email: &str) -> String {
    if name.is_empty() {
        email.to_string()
    } else {
        format!("{name} <{email}>")
    }
}

/// In-flight or resolved entry; concurrent misses for one link share it.
type ProfileSlot = Arc<OnceCell<CachedProfile>>;

/// TTL cache from user links to formatted addresses.
#[derive(Debug)]
pub struct AddressCache {
    config: Arc<FacadeConfig>,
    profiles: Mutex<HashMap<String, ProfileSlot>>,
}

impl AddressCache {
    #[must_use]
    pub fn new(config: Arc<FacadeConfig>) -> Self {
        Self {
            config,
            profiles: Mutex::new(HashMap::new()),
        }
    }

    fn fresh(&self, href: &str, now: Instant) -> Option<CachedProfile> {
        let profiles = self.profiles.lock().unwrap_or_else(PoisonError::into_inner);
        profiles
            .get(href)
            .and_then(|slot| slot.get())
            .filter(|profile| profile.is_fresh(now, self.config.name_expire))
            .cloned()
    }

    /// The slot to resolve `href` through. An expired profile is swapped
    /// for an empty slot so the next resolution starts over.
    fn slot(&self, href: &str, now: Instant) -> ProfileSlot {
        let mut profiles = self.profiles.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = profiles.entry(href.to_string()).or_default();
        if slot
            .get()
            .is_some_and(|profile| !profile.is_fresh(now, self.config.name_expire))
        {
            *slot = ProfileSlot::default();
        }
        Arc::clone(slot)
    }

    /// The profile behind `link`, resolved through `client` when absent
    /// or expired. Callers missing on the same link at the same time wait
    /// for a single request.
    ///
    /// # Errors
    ///
    /// Returns an error if the link cannot be resolved to a user.
    pub async fn load_profile(&self, client: &HalClient, link: &Link) -> Result<Option<CachedProfile>> {
        let Some(href) = link.target() else {
            return Ok(None);
        };
        let slot = self.slot(href, Instant::now());
        let profile = slot
            .get_or_try_init(|| async move {
                debug!("Resolving profile {href}");
                let user = User::try_from(client.link_get(link).await?)?;
                Ok::<_, Error>(CachedProfile::from_user(
                    href,
                    &user,
                    &self.config,
                    Instant::now(),
                ))
            })
            .await?;
        Ok(Some(profile.clone()))
    }

    /// The formatted address behind `link`; empty for a missing link.
    ///
    /// # Errors
    ///
    /// Returns an error if the link cannot be resolved to a user.
    pub async fn load_address(&self, client: &HalClient, link: Option<&Link>) -> Result<String> {
        let Some(link) = link else {
            return Ok(String::new());
        };
        Ok(self
            .load_profile(client, link)
            .await?
            .map(|profile| profile.address)
            .unwrap_or_default())
    }

    /// Seed the cache with an already fetched user.
    pub fn remember(&self, link: &str, user: &User) {
        let profile = CachedProfile::from_user(link, user, &self.config, Instant::now());
        self.profiles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(link.to_string(), Arc::new(OnceCell::new_with(Some(profile))));
    }
}

/// Attachment bytes keyed by download location, kept in the cache
/// database.
#[derive(Debug)]
pub struct AttachmentCache {
    db: CacheDb,
    downloads: Mutex<HashMap<String, Arc<OnceCell<()>>>>,
}

impl AttachmentCache {
    #[must_use]
    pub fn new(db: CacheDb) -> Self {
        Self {
            db,
            downloads: Mutex::new(HashMap::new()),
        }
    }

    /// The bytes of `attachment`, downloaded on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the attachment has no download
    /// location, the download error, or [`Error::Store`] if the
    /// database cannot be used.
    pub async fn load(&self, client: &HalClient, attachment: &Attachment) -> Result<Vec<u8>> {
        let link = attachment.download_location().ok_or_else(|| {
            Error::Decode(format!(
                "missing download link for attachment {}",
                attachment.file_name()
            ))
        })?;
        let href = link.target().unwrap_or_default();

        if let Some(bytes) = self.db.attachment(href)? {
            return Ok(bytes);
        }

        let download = Arc::clone(
            self.downloads
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(href.to_string())
                .or_default(),
        );
        let outcome = download
            .get_or_try_init(|| async move {
                if self.db.attachment(href)?.is_none() {
                    let bytes = client.download(link).await?;
                    self.db.put_attachment(href, &bytes)?;
                }
                Ok::<_, Error>(())
            })
            .await;
        self.downloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(href);
        outcome?;

        self.db
            .attachment(href)?
            .ok_or_else(|| Error::Store(format!("attachment {href} vanished from the cache")))
    }
}

/// Time-entry activity links by activity name.
#[derive(Debug, Default)]
pub struct ActivityCache {
    links: Mutex<HashMap<String, Link>>,
}

impl ActivityCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the activity called `name` among the values the time-entry
    /// form allows.
    ///
    /// # Errors
    ///
    /// Returns an error if the form cannot be loaded or has no activity
    /// with that name.
    pub async fn find(&self, client: &HalClient, name: &str) -> Result<Link> {
        let cached = self
            .links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        if let Some(link) = cached {
            return Ok(link);
        }

        let form = client.post("/api/v3/time_entries/form", &json!({})).await?;
        let link = find_allowed_activity(&form, name).ok_or_else(|| {
            Error::Decode(format!("time entry activity '{name}' not found"))
        })?;
        self.links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), link.clone());
        Ok(link)
    }
}

fn find_allowed_activity(form: &Resource, name: &str) -> Option<Link> {
    let schema = form.object().embedded("schema").first()?;
    let allowed = schema
        .object()
        .fields
        .get("activity")?
        .pointer("/_embedded/allowedValues")?
        .as_array()?;
    allowed
        .iter()
        .find(|value| value.get("name").and_then(Value::as_str) == Some(name))
        .and_then(|value| value.pointer("/_links/self"))
        .and_then(|link| serde_json::from_value::<Link>(link.clone()).ok())
        .filter(|link| link.target().is_some())
}
