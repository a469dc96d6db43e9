//! Facade configuration

use crate::error::{Error, Result};
use crate::folder::Folder;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration shared by the backend, its sessions and caches.
///
/// Built once and handed out behind an `Arc`; nothing here is mutated
/// after start-up.
#[derive(Debug, Clone)]
pub struct FacadeConfig {
    /// Base URL of the OpenProject instance, without trailing slash.
    pub base_url: String,
    /// Period of the per-session synchronizer.
    pub update_interval: Duration,
    /// How long a resolved sender/recipient address stays valid.
    pub name_expire: Duration,
    /// Domain used for system-generated senders.
    pub email_domain: String,
    /// Fallback address for users without a visible email.
    /// `{id}` is replaced by the remote user id.
    pub email_placeholder: String,
    /// Activity name used when creating time entries.
    pub time_entry_activity: String,
    /// Reading speed used for the reading-time estimate.
    pub words_per_minute: u32,
    /// Folders every session gets regardless of remote projects.
    pub system_folders: Vec<Folder>,
    /// Per-request timeout for remote calls. `None` keeps the
    /// transport default.
    pub request_timeout: Option<Duration>,
    /// Upper bound on a single update handshake. `None` waits forever.
    pub update_timeout: Option<Duration>,
    /// SQLite file holding message bodies and attachments. `None` uses a
    /// temporary file removed when the backend goes away.
    pub cache_path: Option<PathBuf>,
}

impl FacadeConfig {
    /// Configuration with defaults for everything but the base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            update_interval: Duration::from_secs(60),
            name_expire: Duration::from_secs(10),
            email_domain: "example.com".to_string(),
            email_placeholder: "user-{id}@example.com".to_string(),
            time_entry_activity: "Other".to_string(),
            words_per_minute: 200,
            system_folders: vec![Folder::Inbox, Folder::Trash],
            request_timeout: None,
            update_timeout: None,
            cache_path: None,
        }
    }

    /// Load configuration from environment variables
    ///
    /// Reads from `.env` file if present. Required variables:
    /// - `OPENPROJECT_BASE`
    ///
    /// Optional (with defaults):
    /// - `FACADE_UPDATE_INTERVAL` seconds (default: `60`)
    /// - `FACADE_NAME_EXPIRE` seconds (default: `10`)
    /// - `FACADE_EMAIL_DOMAIN` (default: `example.com`)
    /// - `FACADE_EMAIL_PLACEHOLDER` (default: `user-{id}@example.com`)
    /// - `FACADE_TIME_ENTRY_ACTIVITY` (default: `Other`)
    /// - `FACADE_WORDS_PER_MINUTE` (default: `200`)
    /// - `FACADE_SYSTEM_FOLDERS` comma separated (default: `INBOX,Trash`)
    /// - `FACADE_REQUEST_TIMEOUT` seconds (default: unset)
    /// - `FACADE_UPDATE_TIMEOUT` seconds (default: unset)
    /// - `FACADE_CACHE_PATH` SQLite file (default: a temporary file)
    ///
    /// # Errors
    ///
    /// Returns an error if `OPENPROJECT_BASE` is missing or a numeric
    /// variable does not parse.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let base = env::var("OPENPROJECT_BASE")
            .map_err(|_| Error::Config("OPENPROJECT_BASE not set".into()))?;
        let mut config = Self::new(base);

        if let Some(secs) = parse_var::<u64>("FACADE_UPDATE_INTERVAL")? {
            config.update_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = parse_var::<u64>("FACADE_NAME_EXPIRE")? {
            config.name_expire = Duration::from_secs(secs);
        }
        if let Ok(domain) = env::var("FACADE_EMAIL_DOMAIN") {
            config.email_domain = domain;
        }
        if let Ok(placeholder) = env::var("FACADE_EMAIL_PLACEHOLDER") {
            config.email_placeholder = placeholder;
        }
        if let Ok(activity) = env::var("FACADE_TIME_ENTRY_ACTIVITY")
            && !activity.is_empty()
        {
            config.time_entry_activity = activity;
        }
        if let Some(wpm) = parse_var::<u32>("FACADE_WORDS_PER_MINUTE")?
            && wpm > 0
        {
            config.words_per_minute = wpm;
        }
        if let Ok(folders) = env::var("FACADE_SYSTEM_FOLDERS") {
            config.system_folders = folders
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(Folder::from)
                .collect();
        }
        config.request_timeout = parse_var::<u64>("FACADE_REQUEST_TIMEOUT")?.map(Duration::from_secs);
        config.update_timeout = parse_var::<u64>("FACADE_UPDATE_TIMEOUT")?.map(Duration::from_secs);
        config.cache_path = env::var_os("FACADE_CACHE_PATH").map(PathBuf::from);

        Ok(config)
    }

    #[must_use]
    pub const fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_name_expire(mut self, ttl: Duration) -> Self {
        self.name_expire = ttl;
        self
    }

    #[must_use]
    pub fn with_email_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.email_placeholder = placeholder.into();
        self
    }

    #[must_use]
    pub fn with_system_folders(mut self, folders: Vec<Folder>) -> Self {
        self.system_folders = folders;
        self
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_update_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.update_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    /// Fallback email address for the remote user `id`.
    #[must_use]
    pub fn placeholder_email(&self, id: u64) -> String {
        self.email_placeholder.replace("{id}", &id.to_string())
    }

    /// Sender address of system-generated messages.
    #[must_use]
    pub fn contact_address(&self) -> String {
        format!("contact@{}", self.email_domain)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("Invalid {name}: {e}"))),
        Err(_) => Ok(None),
    }
}
