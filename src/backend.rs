//! Login and the session registry

use crate::cache::{ActivityCache, AddressCache, AttachmentCache};
use crate::config::FacadeConfig;
use crate::db::CacheDb;
use crate::error::{Error, Result};
use crate::hal::{HalClient, User};
use crate::session::{Session, SessionParts};
use crate::template::{DefaultTemplate, MessageTemplate};
use crate::updates::{self, UpdatePublisher, Updates};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Entry point for the protocol frontend.
///
/// Owns the process-wide caches and one session per username. Live
/// updates of every session arrive on the [`Updates`] returned by
/// [`Backend::new`].
#[derive(Debug)]
pub struct Backend {
    config: Arc<FacadeConfig>,
    publisher: UpdatePublisher,
    addresses: Arc<AddressCache>,
    attachments: Arc<AttachmentCache>,
    activities: Arc<ActivityCache>,
    template: Arc<dyn MessageTemplate>,
    db: CacheDb,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl Backend {
    /// Open the cache database named by the configuration (a temporary
    /// one when none is set) and set up the shared caches.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] or [`Error::Io`] if the cache database
    /// cannot be opened.
    pub fn new(config: FacadeConfig) -> Result<(Self, Updates)> {
        let config = Arc::new(config);
        let db = CacheDb::open_or_temporary(config.cache_path.as_deref())?;
        let (publisher, updates) = updates::channel(config.update_timeout);
        let backend = Self {
            addresses: Arc::new(AddressCache::new(Arc::clone(&config))),
            attachments: Arc::new(AttachmentCache::new(db.clone())),
            activities: Arc::new(ActivityCache::new()),
            template: Arc::new(DefaultTemplate),
            db,
            sessions: RwLock::new(HashMap::new()),
            publisher,
            config,
        };
        Ok((backend, updates))
    }

    /// Render messages of sessions created from now on with `template`.
    #[must_use]
    pub fn with_template(mut self, template: Arc<dyn MessageTemplate>) -> Self {
        self.template = template;
        self
    }

    #[must_use]
    pub fn config(&self) -> &FacadeConfig {
        &self.config
    }

    /// The shared address cache.
    #[must_use]
    pub fn addresses(&self) -> &AddressCache {
        &self.addresses
    }

    /// Authenticate `username` with an API key.
    ///
    /// An existing session is reused when the key matches the one it was
    /// created with; otherwise the key is checked against the remote
    /// service and a new session replaces the old one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if the key is rejected or belongs to a
    /// different user. Failing to reach the service at all is reported
    /// as such, not as a rejected key.
    pub async fn login(&self, username: &str, api_key: &str) -> Result<Arc<Session>> {
        let existing = self.sessions.read().await.get(username).cloned();
        if let Some(session) = existing
            && session.credential_matches(api_key)
        {
            debug!("Reusing session of {username}");
            return Ok(session);
        }

        let client = HalClient::new(&self.config.base_url, self.config.request_timeout)?
            .with_api_key(api_key);
        let user = match Self::authenticate(&client, username).await {
            Ok(user) => user,
            Err(e) => {
                warn!("Login of {username} failed: {e}");
                return Err(e);
            }
        };

        let parts = SessionParts {
            config: Arc::clone(&self.config),
            publisher: self.publisher.clone(),
            addresses: Arc::clone(&self.addresses),
            attachments: Arc::clone(&self.attachments),
            activities: Arc::clone(&self.activities),
            template: Arc::clone(&self.template),
            db: self.db.clone(),
        };
        let session = Session::start(username, api_key, user, client, parts).await?;

        let mut sessions = self.sessions.write().await;
        if let Some(current) = sessions.get(username)
            && current.credential_matches(api_key)
        {
            // A concurrent login got there first.
            session.shutdown();
            return Ok(Arc::clone(current));
        }
        if let Some(previous) = sessions.insert(username.to_string(), Arc::clone(&session)) {
            previous.shutdown();
        }
        info!("User {username} logged in");
        Ok(session)
    }

    async fn authenticate(client: &HalClient, username: &str) -> Result<User> {
        let user = client
            .get("/api/v3/users/me")
            .await
            .and_then(User::try_from)
            .map_err(|e| match e {
                Error::Remote { .. } | Error::Decode(_) => Error::Auth(e.to_string()),
                other => other,
            })?;
        if user.login() != username {
            return Err(Error::Auth(format!(
                "API key belongs to {}, not {username}",
                user.login()
            )));
        }
        Ok(user)
    }

    pub async fn session(&self, username: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(username).cloned()
    }

    /// Drop the session of `username` and stop its synchronizer.
    pub async fn logout(&self, username: &str) {
        if let Some(session) = self.sessions.write().await.remove(username) {
            session.shutdown();
            info!("User {username} logged out");
        }
    }

    /// Stop every session.
    pub async fn shutdown(&self) {
        let mut sessions = self.sessions.write().await;
        for (_, session) in sessions.drain() {
            session.shutdown();
        }
    }
}
