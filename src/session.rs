//! Authenticated sessions
//!
//! A session owns everything one logged-in user sees: the client with
//! their API key, their mailboxes, the time-entry state behind message
//! flags and a background synchronizer. Mailboxes are kept in a registry
//! guarded by its own lock, always taken before any mailbox lock.

use crate::body_store::BodyStore;
use crate::cache::{ActivityCache, AddressCache, AttachmentCache};
use crate::compose::{self, Composer};
use crate::config::FacadeConfig;
use crate::db::CacheDb;
use crate::error::{Error, Result};
use crate::folder::Folder;
use crate::hal::{HalClient, Link, Project, Resource, User};
use crate::mailbox::{Mailbox, MailboxContext, Registry};
use crate::sync::Synchronizer;
use crate::template::MessageTemplate;
use crate::time_entry::TimeEntries;
use crate::updates::UpdatePublisher;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Shared pieces a backend hands to every new session.
#[derive(Debug, Clone)]
pub struct SessionParts {
    pub config: Arc<FacadeConfig>,
    pub publisher: UpdatePublisher,
    pub addresses: Arc<AddressCache>,
    pub attachments: Arc<AttachmentCache>,
    pub activities: Arc<ActivityCache>,
    pub template: Arc<dyn MessageTemplate>,
    /// Where this session keeps its message bodies.
    pub db: CacheDb,
}

/// One logged-in user.
#[derive(Debug)]
pub struct Session {
    username: String,
    credential: String,
    user: User,
    client: HalClient,
    config: Arc<FacadeConfig>,
    publisher: UpdatePublisher,
    addresses: Arc<AddressCache>,
    bodies: Arc<BodyStore>,
    mailboxes: Arc<Registry>,
    time_entries: Arc<TimeEntries>,
    composer: Arc<Composer>,
    next_mailbox_id: AtomicU64,
    sync_lock: Mutex<()>,
    synchronizer: Synchronizer,
}

/// Registry key for `name`; INBOX is case-insensitive.
fn mailbox_key(name: &str) -> String {
    if Folder::is_inbox(name) {
        Folder::Inbox.as_str().to_string()
    } else {
        name.to_string()
    }
}

impl Session {
    /// Build a session for the already validated `user`, create its
    /// system folders and run the first synchronization cycle.
    pub(crate) async fn start(
        username: &str,
        credential: &str,
        user: User,
        client: HalClient,
        parts: SessionParts,
    ) -> Result<Arc<Self>> {
        let config = parts.config;
        let activity = match parts
            .activities
            .find(&client, &config.time_entry_activity)
            .await
        {
            Ok(link) => Some(link),
            Err(e) => {
                warn!("No time entry activity '{}': {e}", config.time_entry_activity);
                None
            }
        };

        let time_entries = Arc::new(TimeEntries::new(client.clone(), activity));
        if let Err(e) = time_entries.load_all(user.id()).await {
            warn!("Failed to load time entries of {username}: {e}");
        }

        let composer = Arc::new(Composer::new(
            client.clone(),
            Arc::clone(&config),
            Arc::clone(&parts.addresses),
            parts.attachments,
            parts.template,
            Some(Arc::clone(&time_entries)),
        ));
        let bodies = Arc::new(BodyStore::open(parts.db)?);

        let session = Arc::new_cyclic(|weak: &Weak<Self>| Self {
            username: username.to_string(),
            credential: credential.to_string(),
            user,
            client,
            publisher: parts.publisher,
            addresses: parts.addresses,
            bodies,
            mailboxes: Arc::new(RwLock::new(HashMap::new())),
            time_entries,
            composer,
            next_mailbox_id: AtomicU64::new(1),
            sync_lock: Mutex::new(()),
            synchronizer: Synchronizer::start(weak.clone(), username, config.update_interval),
            config,
        });

        session.create_system_folders().await?;
        if let Err(e) = session.synchronize(true).await {
            warn!("Initial synchronization of {username} aborted: {e}");
        }
        Ok(session)
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The remote user behind this session.
    #[must_use]
    pub const fn user(&self) -> &User {
        &self.user
    }

    #[must_use]
    pub fn config(&self) -> &FacadeConfig {
        &self.config
    }

    pub(crate) fn credential_matches(&self, credential: &str) -> bool {
        self.credential == credential
    }

    fn context(&self) -> MailboxContext {
        MailboxContext {
            username: self.username.clone(),
            publisher: self.publisher.clone(),
            bodies: Arc::clone(&self.bodies),
            time_entries: Some(Arc::clone(&self.time_entries)),
            registry: Arc::downgrade(&self.mailboxes),
        }
    }

    fn new_mailbox(&self, name: &str, special_use: Option<&'static str>, project: Option<Project>) -> Arc<Mailbox> {
        let id = self.next_mailbox_id.fetch_add(1, Ordering::Relaxed);
        Arc::new(Mailbox::new(id, name, special_use, project, self.context()))
    }

    async fn create_system_folders(&self) -> Result<()> {
        for folder in &self.config.system_folders {
            let mbox = self.new_mailbox(folder.as_str(), folder.special_use(), None);
            mbox.set_subscribed(true).await;
            if *folder == Folder::Inbox {
                self.greet(&mbox).await?;
            }
            self.mailboxes
                .write()
                .await
                .insert(folder.as_str().to_string(), mbox);
        }
        Ok(())
    }

    async fn greet(&self, inbox: &Mailbox) -> Result<()> {
        let href = format!("/api/v3/users/{}", self.user.id());
        self.addresses.remember(&href, &self.user);
        let Some(profile) = self
            .addresses
            .load_profile(&self.client, &Link::new(href))
            .await?
        else {
            return Ok(());
        };
        let body = compose::welcome_message(&self.config, &profile)?;
        inbox.append_local(Vec::new(), &body).await?;
        Ok(())
    }

    /// Mailboxes in creation order, optionally only subscribed ones.
    pub async fn list_mailboxes(&self, subscribed: bool) -> Vec<Arc<Mailbox>> {
        let mut all: Vec<Arc<Mailbox>> = self.mailboxes.read().await.values().cloned().collect();
        all.sort_by_key(|mbox| mbox.id());
        if !subscribed {
            return all;
        }
        let mut listed = Vec::with_capacity(all.len());
        for mbox in all {
            if mbox.is_subscribed().await {
                listed.push(mbox);
            }
        }
        listed
    }

    /// # Errors
    ///
    /// Returns [`Error::NoSuchMailbox`] if there is no mailbox `name`.
    pub async fn get_mailbox(&self, name: &str) -> Result<Arc<Mailbox>> {
        self.mailboxes
            .read()
            .await
            .get(&mailbox_key(name))
            .cloned()
            .ok_or_else(|| Error::NoSuchMailbox(name.to_string()))
    }

    /// # Errors
    ///
    /// Returns [`Error::MailboxExists`] if the name is taken.
    pub async fn create_mailbox(&self, name: &str) -> Result<Arc<Mailbox>> {
        let key = mailbox_key(name);
        let mut mailboxes = self.mailboxes.write().await;
        if mailboxes.contains_key(&key) {
            return Err(Error::MailboxExists(key));
        }
        let mbox = self.new_mailbox(&key, None, None);
        mailboxes.insert(key, Arc::clone(&mbox));
        debug!("Created mailbox {name} for {}", self.username);
        Ok(mbox)
    }

    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] for INBOX and
    /// [`Error::NoSuchMailbox`] if there is no mailbox `name`.
    pub async fn delete_mailbox(&self, name: &str) -> Result<()> {
        if Folder::is_inbox(name) {
            return Err(Error::InvalidOperation("INBOX cannot be deleted".into()));
        }
        let removed = self
            .mailboxes
            .write()
            .await
            .remove(&mailbox_key(name))
            .ok_or_else(|| Error::NoSuchMailbox(name.to_string()))?;
        if let Err(e) = self.bodies.remove_mailbox(removed.id()) {
            warn!("Failed to drop bodies of mailbox {name}: {e}");
        }
        debug!("Deleted mailbox {name} of {}", self.username);
        Ok(())
    }

    /// Move `existing` to `new_name` in one step under the registry lock.
    ///
    /// Renaming INBOX moves its messages away and leaves a new, empty
    /// INBOX behind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchMailbox`] if `existing` is missing and
    /// [`Error::MailboxExists`] if `new_name` is taken.
    pub async fn rename_mailbox(&self, existing: &str, new_name: &str) -> Result<()> {
        let from = mailbox_key(existing);
        let to = mailbox_key(new_name);
        let mut mailboxes = self.mailboxes.write().await;
        if mailboxes.contains_key(&to) {
            return Err(Error::MailboxExists(to));
        }
        let mbox = mailboxes
            .remove(&from)
            .ok_or_else(|| Error::NoSuchMailbox(existing.to_string()))?;
        mbox.set_name(&to).await;
        mailboxes.insert(to, mbox);

        if from == Folder::Inbox.as_str() {
            let inbox = self.new_mailbox(&from, Folder::Inbox.special_use(), None);
            inbox.set_subscribed(true).await;
            mailboxes.insert(from, inbox);
        }
        debug!("Renamed mailbox {existing} to {new_name} for {}", self.username);
        Ok(())
    }

    /// Run one synchronization cycle.
    ///
    /// Creates a mailbox for every project not mirrored yet and, unless
    /// `first_run`, folds every project's work packages into its mailbox.
    /// Cycles of one session never overlap.
    ///
    /// # Errors
    ///
    /// Returns the first remote or decode error; the cycle stops there.
    pub async fn synchronize(&self, first_run: bool) -> Result<()> {
        let _cycle = self.sync_lock.lock().await;

        let mut page = Some(self.client.get_collection("/api/v3/projects").await?);
        while let Some(col) = page {
            let projects: Vec<Project> = col
                .items()
                .iter()
                .filter_map(|item| match item {
                    Resource::Project(project) => Some(project.clone()),
                    other => {
                        warn!("Skipping {} in project collection", other.kind());
                        None
                    }
                })
                .collect();
            for project in &projects {
                self.add_project(project).await;
            }
            page = col.next_page(&self.client).await?;
        }

        if first_run {
            return Ok(());
        }
        for mbox in self.list_mailboxes(false).await {
            if mbox.project_id().await.is_some() {
                mbox.fold(&self.client, &self.composer).await?;
            }
        }
        Ok(())
    }

    async fn add_project(&self, project: &Project) {
        let mut mailboxes = self.mailboxes.write().await;
        let existing: Vec<Arc<Mailbox>> = mailboxes.values().cloned().collect();
        for mbox in existing {
            if mbox.project_id().await == Some(project.id()) {
                return;
            }
        }
        let name = project.name().to_string();
        if mailboxes.contains_key(&mailbox_key(&name)) {
            warn!("Project {} clashes with mailbox {name}", project.id());
            return;
        }
        let mbox = self.new_mailbox(&name, None, Some(project.clone()));
        mailboxes.insert(name, mbox);
        info!("Added mailbox for project {} of {}", project.id(), self.username);
    }

    /// Stop the background synchronizer.
    pub fn shutdown(&self) {
        self.synchronizer.stop();
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.synchronizer.is_stopped()
    }
}
