//! Mailboxes: ordered message stores with IMAP semantics
//!
//! A mailbox holds the messages of one project (or one system folder)
//! behind a reader/writer lock. Locks are held for in-memory work only;
//! remote calls, update delivery and message composition all happen with
//! the lock released. When two mailboxes must be locked together they are
//! locked in ascending creation id.

use crate::body_store::BodyStore;
use crate::compose::Composer;
use crate::error::{Error, Result};
use crate::flag::{self, Flag, FlagOp};
use crate::hal::{Collection, HalClient, Project, Resource, WorkPackage};
use crate::message::{Bounds, FetchItem, FetchedMessage, Message, SearchCriteria};
use crate::seq_set::SeqSet;
use crate::time_entry::TimeEntries;
use crate::updates::{Update, UpdateKind, UpdatePublisher};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Hierarchy delimiter advertised in LIST responses.
pub const DELIMITER: &str = "/";

/// Work packages composed at once during a fold.
const COMPOSE_CONCURRENCY: usize = 4;

/// Mailboxes of one session by name.
pub type Registry = RwLock<HashMap<String, Arc<Mailbox>>>;

/// A STATUS data item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusItem {
    Messages,
    UidNext,
    UidValidity,
    Recent,
    Unseen,
}

impl StatusItem {
    pub const ALL: [Self; 5] = [
        Self::Messages,
        Self::UidNext,
        Self::UidValidity,
        Self::Recent,
        Self::Unseen,
    ];
}

/// Answer to a STATUS (or SELECT) request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailboxStatus {
    pub name: String,
    /// Flag vocabulary, when requested.
    pub flags: Vec<Flag>,
    /// Flags that can be stored permanently; `\*` allows new keywords.
    pub permanent_flags: Vec<Flag>,
    pub messages: Option<u32>,
    pub uid_next: Option<u32>,
    pub uid_validity: Option<u32>,
    pub recent: Option<u32>,
    pub unseen: Option<u32>,
    /// Highest sequence number of an unseen message, 0 if none.
    pub unseen_seq_num: u32,
}

/// LIST information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxInfo {
    pub name: String,
    pub delimiter: &'static str,
    pub attributes: Vec<String>,
}

/// What a mailbox shares with its session.
#[derive(Debug, Clone)]
pub struct MailboxContext {
    pub username: String,
    pub publisher: UpdatePublisher,
    pub bodies: Arc<BodyStore>,
    pub time_entries: Option<Arc<TimeEntries>>,
    pub registry: Weak<Registry>,
}

#[derive(Debug)]
struct MailboxState {
    name: String,
    flags: Vec<Flag>,
    subscribed: bool,
    uid_next: u32,
    messages: Vec<Message>,
    /// Work package id to UID. Entries outlive expunge so a later fold
    /// does not bring deleted work packages back.
    work_map: HashMap<u64, u32>,
    project: Option<Project>,
}

impl MailboxState {
    fn status(&self, items: &[StatusItem], include_flags: bool, uid_validity: u32) -> MailboxStatus {
        let mut status = MailboxStatus {
            name: self.name.clone(),
            ..MailboxStatus::default()
        };
        if include_flags {
            status.flags.clone_from(&self.flags);
            status.permanent_flags = self.flags.clone();
            status.permanent_flags.push(Flag::from("\\*"));
        }

        let mut unseen = 0;
        for (ix, msg) in self.messages.iter().enumerate() {
            if !msg.is_seen() {
                unseen += 1;
                status.unseen_seq_num = seq(ix + 1);
            }
        }
        for item in items {
            match item {
                StatusItem::Messages => status.messages = Some(seq(self.messages.len())),
                StatusItem::UidNext => status.uid_next = Some(self.uid_next),
                StatusItem::UidValidity => status.uid_validity = Some(uid_validity),
                StatusItem::Recent => status.recent = Some(0),
                StatusItem::Unseen => status.unseen = Some(unseen),
            }
        }
        status
    }

    fn bounds(&self) -> Bounds {
        Bounds {
            max_seq: seq(self.messages.len()),
            max_uid: self.messages.last().map_or(0, |msg| msg.uid),
        }
    }

    /// Positions and sequence numbers of the messages in `set`.
    fn select(&self, by_uid: bool, set: &SeqSet) -> Vec<(usize, u32)> {
        let bounds = self.bounds();
        self.messages
            .iter()
            .enumerate()
            .filter_map(|(ix, msg)| {
                let seq_num = seq(ix + 1);
                let hit = if by_uid {
                    set.contains(msg.uid, bounds.max_uid)
                } else {
                    set.contains(seq_num, bounds.max_seq)
                };
                hit.then_some((ix, seq_num))
            })
            .collect()
    }

    fn allocate_uid(&mut self) -> u32 {
        let uid = self.uid_next;
        self.uid_next += 1;
        uid
    }

    /// Grow the flag vocabulary; returns whether it changed.
    fn learn_flags(&mut self, flags: &[Flag]) -> bool {
        let learned: Vec<Flag> = flags
            .iter()
            .filter(|f| **f != Flag::Recent)
            .cloned()
            .collect();
        let grown = flag::apply(&self.flags, FlagOp::Add, &learned);
        let changed = grown.len() != self.flags.len();
        self.flags = grown;
        changed
    }
}

/// Sequence number for a count or 1-based position.
fn seq(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn initial_flags() -> Vec<Flag> {
    vec![
        Flag::Answered,
        Flag::Flagged,
        Flag::Deleted,
        Flag::Seen,
        Flag::Draft,
        Flag::from("nonjunk"),
    ]
}

/// Last UIDVALIDITY handed out in this process.
static LAST_UID_VALIDITY: AtomicU32 = AtomicU32::new(0);

/// Seconds since the epoch, bumped past the previous value so mailboxes
/// created within one second still differ.
fn new_uid_validity() -> u32 {
    let now = u32::try_from(Utc::now().timestamp()).unwrap_or(u32::MAX).max(1);
    let previous = LAST_UID_VALIDITY
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |last| {
            Some(now.max(last.saturating_add(1)))
        })
        .unwrap_or_default();
    now.max(previous.saturating_add(1))
}

/// One mailbox of a session.
#[derive(Debug)]
pub struct Mailbox {
    id: u64,
    uid_validity: u32,
    special_use: Option<&'static str>,
    ctx: MailboxContext,
    state: RwLock<MailboxState>,
}

impl Mailbox {
    pub(crate) fn new(
        id: u64,
        name: &str,
        special_use: Option<&'static str>,
        project: Option<Project>,
        ctx: MailboxContext,
    ) -> Self {
        Self {
            id,
            uid_validity: new_uid_validity(),
            special_use,
            ctx,
            state: RwLock::new(MailboxState {
                name: name.to_string(),
                flags: initial_flags(),
                subscribed: project.is_some(),
                uid_next: 1,
                messages: Vec::new(),
                work_map: HashMap::new(),
                project,
            }),
        }
    }

    /// Creation-order id; also the lock order between mailboxes.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub const fn uid_validity(&self) -> u32 {
        self.uid_validity
    }

    pub async fn name(&self) -> String {
        self.state.read().await.name.clone()
    }

    pub(crate) async fn set_name(&self, name: &str) {
        name.clone_into(&mut self.state.write().await.name);
    }

    /// Id of the project this mailbox mirrors.
    pub async fn project_id(&self) -> Option<u64> {
        self.state.read().await.project.as_ref().map(Project::id)
    }

    pub async fn info(&self) -> MailboxInfo {
        let state = self.state.read().await;
        MailboxInfo {
            name: state.name.clone(),
            delimiter: DELIMITER,
            attributes: self
                .special_use
                .map(str::to_string)
                .into_iter()
                .collect(),
        }
    }

    pub async fn is_subscribed(&self) -> bool {
        self.state.read().await.subscribed
    }

    pub async fn set_subscribed(&self, subscribed: bool) {
        self.state.write().await.subscribed = subscribed;
    }

    /// CHECK; there is nothing to checkpoint.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn check(&self) -> Result<()> {
        Ok(())
    }

    /// Current counters, computed from the messages on every call.
    pub async fn status(&self, items: &[StatusItem], include_flags: bool) -> MailboxStatus {
        let state = self.state.read().await;
        state.status(items, include_flags, self.uid_validity)
    }

    /// Messages in `set`, fetched lazily as the returned list is iterated.
    pub async fn list_messages(&self, by_uid: bool, set: &SeqSet, items: &[FetchItem]) -> MessageList {
        let state = self.state.read().await;
        let entries = state
            .select(by_uid, set)
            .into_iter()
            .map(|(ix, seq_num)| (seq_num, state.messages[ix].clone()))
            .collect::<Vec<_>>();
        MessageList {
            mailbox: self.id,
            bodies: Arc::clone(&self.ctx.bodies),
            items: items.to_vec(),
            entries: entries.into_iter(),
        }
    }

    /// UIDs or sequence numbers of the messages matching `criteria`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if a message body cannot be parsed, or
    /// [`Error::Store`] if it cannot be read back.
    pub async fn search(&self, by_uid: bool, criteria: &SearchCriteria) -> Result<Vec<u32>> {
        let state = self.state.read().await;
        let bounds = state.bounds();
        let mut ids = Vec::new();
        for (ix, msg) in state.messages.iter().enumerate() {
            let seq_num = seq(ix + 1);
            let body = self
                .ctx
                .bodies
                .get(self.id, msg.uid)?
                .ok_or_else(|| Error::Parse(format!("body of UID {} unavailable", msg.uid)))?;
            if msg.matches(seq_num, criteria, bounds, &body)? {
                ids.push(if by_uid { msg.uid } else { seq_num });
            }
        }
        Ok(ids)
    }

    fn status_update(&self, state: &MailboxState) -> Update {
        Update {
            username: self.ctx.username.clone(),
            mailbox: state.name.clone(),
            kind: UpdateKind::MailboxStatus(
                state.status(&[StatusItem::Messages, StatusItem::Unseen], true, self.uid_validity),
            ),
        }
    }

    /// Store `body` under the next UID, then record the message. Nothing
    /// is allocated if the body cannot be stored.
    fn push(
        &self,
        state: &mut MailboxState,
        flags: Vec<Flag>,
        date: DateTime<Utc>,
        body: &[u8],
        work_package_id: Option<u64>,
    ) -> Result<u32> {
        self.ctx.bodies.insert(self.id, state.uid_next, body)?;
        let uid = state.allocate_uid();
        state.messages.push(Message {
            uid,
            date,
            size: seq(body.len()),
            flags,
            work_package_id,
        });
        if let Some(id) = work_package_id {
            state.work_map.insert(id, uid);
        }
        Ok(uid)
    }

    /// Append without `\Recent` or notification, e.g. the welcome message.
    pub(crate) async fn append_local(&self, flags: Vec<Flag>, body: &[u8]) -> Result<u32> {
        let mut state = self.state.write().await;
        self.push(&mut state, flags, Utc::now(), body, None)
    }

    /// APPEND: store a client-supplied message. Returns its UID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the body cannot be stored; the mailbox
    /// is left unchanged.
    pub async fn create_message(
        &self,
        flags: &[Flag],
        date: Option<DateTime<Utc>>,
        body: Vec<u8>,
    ) -> Result<u32> {
        let (uid, update) = {
            let mut state = self.state.write().await;
            let stored = flag::apply(flags, FlagOp::Add, &[Flag::Recent]);
            let uid = self.push(
                &mut state,
                stored,
                date.unwrap_or_else(Utc::now),
                &body,
                None,
            )?;
            state.learn_flags(flags);
            (uid, self.status_update(&state))
        };
        self.ctx.publisher.notify_all(vec![update]).await;
        Ok(uid)
    }

    /// STORE: apply `op` with `flags` to the messages in `set`.
    ///
    /// Changed work-package messages are written back to their time
    /// entries after the lock is released; failures there are logged and
    /// leave the local change in place.
    pub async fn update_messages_flags(&self, by_uid: bool, set: &SeqSet, op: FlagOp, flags: &[Flag]) {
        let (updates, remote) = {
            let mut state = self.state.write().await;
            let mut updates = Vec::new();
            let mut remote = Vec::new();

            for (ix, seq_num) in state.select(by_uid, set) {
                let msg = &mut state.messages[ix];
                let changed = flag::apply(&msg.flags, op, flags);
                if flag::same_set(&changed, &msg.flags) {
                    continue;
                }
                msg.flags = changed;
                if let Some(id) = msg.work_package_id {
                    remote.push((id, msg.flags.clone()));
                }
                updates.push(UpdateKind::Message {
                    seq_num,
                    uid: msg.uid,
                    flags: msg.flags.clone(),
                });
            }

            let mut updates: Vec<Update> = updates
                .into_iter()
                .map(|kind| Update {
                    username: self.ctx.username.clone(),
                    mailbox: state.name.clone(),
                    kind,
                })
                .collect();
            if matches!(op, FlagOp::Add | FlagOp::Set) && state.learn_flags(flags) {
                updates.push(self.status_update(&state));
            }
            (updates, remote)
        };

        self.ctx.publisher.notify_all(updates).await;
        self.sync_remote_flags(remote).await;
    }

    async fn sync_remote_flags(&self, changes: Vec<(u64, Vec<Flag>)>) {
        let Some(entries) = &self.ctx.time_entries else {
            return;
        };
        for (work_package_id, flags) in changes {
            if let Err(e) = entries.store_flags(work_package_id, &flags).await {
                warn!("Failed to store flags of work package {work_package_id}: {e}");
            }
        }
    }

    async fn destination(&self, name: &str) -> Result<Arc<Self>> {
        let registry = self
            .ctx
            .registry
            .upgrade()
            .ok_or_else(|| Error::NoSuchMailbox(name.to_string()))?;
        let mailboxes = registry.read().await;
        mailboxes
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NoSuchMailbox(name.to_string()))
    }

    /// COPY: duplicate the messages in `set` into the mailbox `dest`.
    ///
    /// Returns (source UID, destination UID) pairs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchMailbox`] if `dest` does not exist, or
    /// [`Error::Store`] if a body cannot be copied. Messages copied before
    /// the failure stay in `dest`.
    pub async fn copy_messages(&self, by_uid: bool, set: &SeqSet, dest: &str) -> Result<Vec<(u32, u32)>> {
        let target = self.destination(dest).await?;

        let (copied, update) = if target.id == self.id {
            let mut state = self.state.write().await;
            let picked = Self::picked(&state, by_uid, set);
            let copied = self.copy_into(&picked, &target, &mut state);
            (copied, self.status_update(&state))
        } else if self.id < target.id {
            let src = self.state.read().await;
            let mut dst = target.state.write().await;
            let picked = Self::picked(&src, by_uid, set);
            let copied = self.copy_into(&picked, &target, &mut dst);
            (copied, target.status_update(&dst))
        } else {
            let mut dst = target.state.write().await;
            let src = self.state.read().await;
            let picked = Self::picked(&src, by_uid, set);
            let copied = self.copy_into(&picked, &target, &mut dst);
            (copied, target.status_update(&dst))
        };

        let (copied, failure) = copied;
        debug!("Copied {} messages to {dest}", copied.len());
        if !copied.is_empty() {
            target.ctx.publisher.notify_all(vec![update]).await;
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(copied),
        }
    }

    fn picked(state: &MailboxState, by_uid: bool, set: &SeqSet) -> Vec<Message> {
        state
            .select(by_uid, set)
            .into_iter()
            .map(|(ix, _)| state.messages[ix].clone())
            .collect()
    }

    /// Copy `picked` into `dst`, stopping at the first body that cannot be
    /// copied. Returns the pairs copied so far and that failure.
    fn copy_into(
        &self,
        picked: &[Message],
        target: &Self,
        dst: &mut MailboxState,
    ) -> (Vec<(u32, u32)>, Option<Error>) {
        let mut copied = Vec::with_capacity(picked.len());
        for msg in picked {
            let uid = self
                .ctx
                .bodies
                .get(self.id, msg.uid)
                .and_then(|body| {
                    // Only one message per work package and mailbox.
                    let work_package_id = msg
                        .work_package_id
                        .filter(|id| !dst.work_map.contains_key(id));
                    target.push(
                        dst,
                        msg.flags.clone(),
                        msg.date,
                        body.as_deref().unwrap_or_default(),
                        work_package_id,
                    )
                });
            match uid {
                Ok(uid) => {
                    dst.learn_flags(&msg.flags);
                    copied.push((msg.uid, uid));
                }
                Err(e) => return (copied, Some(e)),
            }
        }
        (copied, None)
    }

    /// MOVE: copy to `dest`, then mark the originals deleted and expunge.
    ///
    /// # Errors
    ///
    /// As [`Mailbox::copy_messages`]; nothing is expunged on failure.
    pub async fn move_messages(&self, by_uid: bool, set: &SeqSet, dest: &str) -> Result<Vec<(u32, u32)>> {
        let copied = self.copy_messages(by_uid, set, dest).await?;
        if copied.is_empty() {
            return Ok(copied);
        }
        let mut moved = SeqSet::new();
        for (uid, _) in &copied {
            moved.insert(*uid, *uid);
        }
        self.update_messages_flags(true, &moved, FlagOp::Add, &[Flag::Deleted])
            .await;
        self.expunge().await;
        Ok(copied)
    }

    /// EXPUNGE: remove every `\Deleted` message, back to front.
    ///
    /// Returns the sequence numbers in the order they were removed.
    pub async fn expunge(&self) -> Vec<u32> {
        let (removed, updates) = {
            let mut state = self.state.write().await;
            let mut removed = Vec::new();
            for ix in (0..state.messages.len()).rev() {
                if state.messages[ix].has_flag(&Flag::Deleted) {
                    let msg = state.messages.remove(ix);
                    if let Err(e) = self.ctx.bodies.remove(self.id, msg.uid) {
                        warn!("Failed to drop body of UID {}: {e}", msg.uid);
                    }
                    removed.push(seq(ix + 1));
                }
            }
            let updates: Vec<Update> = removed
                .iter()
                .map(|&seq_num| Update {
                    username: self.ctx.username.clone(),
                    mailbox: state.name.clone(),
                    kind: UpdateKind::Expunge { seq_num },
                })
                .collect();
            (removed, updates)
        };
        self.ctx.publisher.notify_all(updates).await;
        removed
    }

    /// Fold one page of work packages into messages.
    ///
    /// Items already present are skipped, so folding the same page twice
    /// appends nothing. Messages are composed without holding the lock;
    /// the work-package map is checked again before each append.
    pub async fn fold_page(&self, composer: &Arc<Composer>, items: &[Resource]) -> usize {
        let pending: Vec<WorkPackage> = {
            let state = self.state.read().await;
            items
                .iter()
                .filter_map(|item| match item {
                    Resource::WorkPackage(wp) => Some(wp.clone()),
                    other => {
                        warn!("Skipping {} in work package collection", other.kind());
                        None
                    }
                })
                .filter(|wp| !state.work_map.contains_key(&wp.id()))
                .collect()
        };
        if pending.is_empty() {
            return 0;
        }

        // Address and attachment lookups of a page overlap; order is kept.
        let composer = Arc::clone(composer);
        let results: Vec<_> = stream::iter(pending)
            .map(move |wp| {
                let composer = Arc::clone(&composer);
                async move { (wp.id(), composer.compose(&wp).await) }
            })
            .buffered(COMPOSE_CONCURRENCY)
            .collect()
            .await;
        let mut composed = Vec::with_capacity(results.len());
        for (id, result) in results {
            match result {
                Ok(message) => composed.push(message),
                Err(e) => warn!("Failed to build message for work package {id}: {e}"),
            }
        }

        let (appended, update) = {
            let mut state = self.state.write().await;
            let mut appended = 0;
            for message in composed {
                if state.work_map.contains_key(&message.work_package_id) {
                    continue;
                }
                match self.push(
                    &mut state,
                    message.flags,
                    message.date,
                    &message.body,
                    Some(message.work_package_id),
                ) {
                    Ok(_) => appended += 1,
                    Err(e) => warn!(
                        "Failed to store message for work package {}: {e}",
                        message.work_package_id
                    ),
                }
            }
            (appended, self.status_update(&state))
        };
        if appended > 0 {
            self.ctx.publisher.notify_all(vec![update]).await;
        }
        appended
    }

    /// Walk every page of the project's work packages and fold them in.
    ///
    /// Does nothing for mailboxes without a project.
    ///
    /// # Errors
    ///
    /// Returns an error if a page cannot be loaded.
    pub async fn fold(&self, client: &HalClient, composer: &Arc<Composer>) -> Result<usize> {
        let Some(link) = self
            .state
            .read()
            .await
            .project
            .as_ref()
            .map(Project::work_packages_link)
        else {
            return Ok(0);
        };

        let mut total = 0;
        let mut page = Some(Collection::try_from(client.link_get(&link).await?)?);
        while let Some(col) = page {
            debug!("Folding work packages at offset {:?}", col.offset());
            total += self.fold_page(composer, col.items()).await;
            page = col.next_page(client).await?;
        }
        if total > 0 {
            info!("Added {total} messages to {}", self.name().await);
        }
        Ok(total)
    }

    #[cfg(test)]
    async fn uids(&self) -> Vec<u32> {
        self.state.read().await.messages.iter().map(|m| m.uid).collect()
    }
}

/// Lazily fetched FETCH results.
///
/// Holds a snapshot of the selected messages; bodies are loaded and
/// parsed one message at a time as the list is iterated.
#[derive(Debug)]
pub struct MessageList {
    mailbox: u64,
    bodies: Arc<BodyStore>,
    items: Vec<FetchItem>,
    entries: std::vec::IntoIter<(u32, Message)>,
}

impl Iterator for MessageList {
    type Item = Result<FetchedMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        let (seq_num, msg) = self.entries.next()?;
        let bodies = &self.bodies;
        let mailbox = self.mailbox;
        Some(msg.fetch(seq_num, &self.items, || bodies.get(mailbox, msg.uid)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CacheDb;
    use crate::updates;
    use std::time::Duration;
    use tokio::sync::mpsc;

    const RAW: &[u8] = b"From: ann@corp.test\r\nSubject: Hello\r\n\r\nHi there\r\n";

    struct Fixture {
        registry: Arc<Registry>,
        received: mpsc::UnboundedReceiver<Update>,
        ctx: MailboxContext,
        next_id: u64,
    }

    impl Fixture {
        fn new() -> Self {
            let (publisher, mut updates) = updates::channel(None);
            let (tx, received) = mpsc::unbounded_channel();
            tokio::spawn(async move {
                while let Some(pending) = updates.recv().await {
                    let _ = tx.send(pending.update().clone());
                    pending.done();
                }
            });
            let registry: Arc<Registry> = Arc::new(RwLock::new(HashMap::new()));
            let ctx = MailboxContext {
                username: "ann".into(),
                publisher,
                bodies: Arc::new(BodyStore::open(CacheDb::temporary().unwrap()).unwrap()),
                time_entries: None,
                registry: Arc::downgrade(&registry),
            };
            Self {
                registry,
                received,
                ctx,
                next_id: 0,
            }
        }

        async fn mailbox(&mut self, name: &str) -> Arc<Mailbox> {
            self.next_id += 1;
            let mbox = Arc::new(Mailbox::new(self.next_id, name, None, None, self.ctx.clone()));
            self.registry
                .write()
                .await
                .insert(name.to_string(), Arc::clone(&mbox));
            mbox
        }

        fn drain(&mut self) -> Vec<Update> {
            let mut out = Vec::new();
            while let Ok(update) = self.received.try_recv() {
                out.push(update);
            }
            out
        }
    }

    async fn fill(mbox: &Mailbox, n: usize) {
        for _ in 0..n {
            mbox.create_message(&[], None, RAW.to_vec()).await.unwrap();
        }
    }

    #[tokio::test]
    async fn status_counts_unseen_fresh_each_call() {
        let mut fx = Fixture::new();
        let mbox = fx.mailbox("Alpha").await;
        fill(&mbox, 3).await;

        let items = [StatusItem::Messages, StatusItem::Unseen, StatusItem::Recent];
        let status = mbox.status(&items, false).await;
        assert_eq!(status.messages, Some(3));
        assert_eq!(status.unseen, Some(3));
        assert_eq!(status.recent, Some(0));
        assert_eq!(status.unseen_seq_num, 3);

        mbox.update_messages_flags(false, &SeqSet::single(3), FlagOp::Add, &[Flag::Seen])
            .await;
        let status = mbox.status(&items, false).await;
        assert_eq!(status.unseen, Some(2));
        assert_eq!(status.unseen_seq_num, 2);
    }

    #[tokio::test]
    async fn unseen_seq_num_is_one_based() {
        let mut fx = Fixture::new();
        let mbox = fx.mailbox("Alpha").await;
        assert_eq!(mbox.status(&[], false).await.unseen_seq_num, 0);

        fill(&mbox, 1).await;
        assert_eq!(mbox.status(&[], false).await.unseen_seq_num, 1);

        fill(&mbox, 1).await;
        mbox.update_messages_flags(false, &SeqSet::single(2), FlagOp::Add, &[Flag::Seen])
            .await;
        assert_eq!(mbox.status(&[], false).await.unseen_seq_num, 1);
    }

    #[tokio::test]
    async fn uid_validity_is_epoch_seconds_and_increasing() {
        let mut fx = Fixture::new();
        let floor = u32::try_from(Utc::now().timestamp()).unwrap();
        let first = fx.mailbox("First").await;
        let second = fx.mailbox("Second").await;
        let third = fx.mailbox("Third").await;
        assert!(first.uid_validity() >= floor);
        assert!(second.uid_validity() > first.uid_validity());
        assert!(third.uid_validity() > second.uid_validity());
    }

    #[tokio::test]
    async fn status_reports_vocabulary_and_validity() {
        let mut fx = Fixture::new();
        let mbox = fx.mailbox("Alpha").await;
        let status = mbox.status(&StatusItem::ALL, true).await;
        assert_eq!(status.uid_next, Some(1));
        assert_eq!(status.uid_validity, Some(mbox.uid_validity()));
        assert!(status.flags.contains(&Flag::from("nonjunk")));
        assert_eq!(status.permanent_flags.last(), Some(&Flag::from("\\*")));
    }

    #[tokio::test]
    async fn uids_are_never_reused() {
        let mut fx = Fixture::new();
        let mbox = fx.mailbox("Alpha").await;
        fill(&mbox, 3).await;
        mbox.update_messages_flags(false, &SeqSet::all(), FlagOp::Add, &[Flag::Deleted])
            .await;
        mbox.expunge().await;
        assert!(mbox.uids().await.is_empty());

        fill(&mbox, 2).await;
        assert_eq!(mbox.uids().await, vec![4, 5]);
        let status = mbox.status(&[StatusItem::UidNext], false).await;
        assert_eq!(status.uid_next, Some(6));
    }

    #[tokio::test]
    async fn create_message_adds_recent_and_learns_flags() {
        let mut fx = Fixture::new();
        let mbox = fx.mailbox("Alpha").await;
        let uid = mbox
            .create_message(&[Flag::from("$Label1")], None, RAW.to_vec())
            .await
            .unwrap();
        assert_eq!(uid, 1);

        let fetched: Vec<_> = mbox
            .list_messages(true, &SeqSet::single(1), &[FetchItem::Flags])
            .await
            .collect();
        assert_eq!(
            fetched[0].as_ref().unwrap().flags,
            Some(vec![Flag::from("$Label1"), Flag::Recent])
        );
        let status = mbox.status(&[], true).await;
        assert!(status.flags.contains(&Flag::from("$Label1")));
        assert!(!status.flags.contains(&Flag::Recent));

        tokio::task::yield_now().await;
        let updates = fx.drain();
        assert!(matches!(updates[0].kind, UpdateKind::MailboxStatus(_)));
    }

    #[tokio::test]
    async fn unchanged_flags_emit_nothing() {
        let mut fx = Fixture::new();
        let mbox = fx.mailbox("Alpha").await;
        fill(&mbox, 1).await;
        fx.drain();

        mbox.update_messages_flags(false, &SeqSet::single(1), FlagOp::Remove, &[Flag::Seen])
            .await;
        tokio::task::yield_now().await;
        assert!(fx.drain().is_empty());

        mbox.update_messages_flags(false, &SeqSet::single(1), FlagOp::Add, &[Flag::Seen])
            .await;
        tokio::task::yield_now().await;
        let updates = fx.drain();
        assert_eq!(updates.len(), 1);
        assert!(matches!(
            updates[0].kind,
            UpdateKind::Message { seq_num: 1, uid: 1, .. }
        ));
    }

    #[tokio::test]
    async fn list_messages_by_sequence_and_uid() {
        let mut fx = Fixture::new();
        let mbox = fx.mailbox("Alpha").await;
        fill(&mbox, 4).await;
        mbox.update_messages_flags(false, &SeqSet::single(1), FlagOp::Add, &[Flag::Deleted])
            .await;
        mbox.expunge().await;

        let by_seq: Vec<_> = mbox
            .list_messages(false, &"2:*".parse().unwrap(), &[FetchItem::Uid])
            .await
            .map(|m| m.unwrap().uid.unwrap())
            .collect();
        assert_eq!(by_seq, vec![3, 4]);

        let by_uid: Vec<_> = mbox
            .list_messages(true, &"*".parse().unwrap(), &[FetchItem::Uid])
            .await
            .map(|m| m.unwrap().seq_num)
            .collect();
        assert_eq!(by_uid, vec![3]);
    }

    #[tokio::test]
    async fn search_returns_uids_or_sequence_numbers() {
        let mut fx = Fixture::new();
        let mbox = fx.mailbox("Alpha").await;
        fill(&mbox, 3).await;
        mbox.update_messages_flags(false, &SeqSet::single(2), FlagOp::Add, &[Flag::Seen])
            .await;

        let unseen = SearchCriteria::unseen();
        assert_eq!(mbox.search(false, &unseen).await.unwrap(), vec![1, 3]);
        assert_eq!(mbox.search(true, &unseen).await.unwrap(), vec![1, 3]);

        let text = SearchCriteria {
            body: vec!["hi there".into()],
            ..SearchCriteria::default()
        };
        assert_eq!(mbox.search(false, &text).await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn expunge_reports_sequence_numbers_back_to_front() {
        let mut fx = Fixture::new();
        let mbox = fx.mailbox("Alpha").await;
        fill(&mbox, 5).await;
        mbox.update_messages_flags(false, &"2,4:5".parse().unwrap(), FlagOp::Add, &[Flag::Deleted])
            .await;
        fx.drain();

        assert_eq!(mbox.expunge().await, vec![5, 4, 2]);
        assert_eq!(mbox.uids().await, vec![1, 3]);
        tokio::task::yield_now().await;
        let seqs: Vec<_> = fx
            .drain()
            .into_iter()
            .filter_map(|u| match u.kind {
                UpdateKind::Expunge { seq_num } => Some(seq_num),
                _ => None,
            })
            .collect();
        assert_eq!(seqs, vec![5, 4, 2]);
    }

    #[tokio::test]
    async fn move_allocates_fresh_destination_uids() {
        let mut fx = Fixture::new();
        let src = fx.mailbox("Alpha").await;
        let dst = fx.mailbox("Trash").await;
        fill(&src, 3).await;
        fill(&dst, 2).await;

        let moved = src
            .move_messages(false, &"1:2".parse().unwrap(), "Trash")
            .await
            .unwrap();
        assert_eq!(moved, vec![(1, 3), (2, 4)]);
        assert_eq!(src.uids().await, vec![3]);
        assert_eq!(dst.uids().await, vec![1, 2, 3, 4]);

        let bodies: Vec<_> = dst
            .list_messages(true, &"3:4".parse().unwrap(), &[FetchItem::Section("BODY[TEXT]".into())])
            .await
            .map(|m| m.unwrap().sections[0].1.clone())
            .collect();
        assert_eq!(bodies, vec![b"Hi there\r\n".to_vec(), b"Hi there\r\n".to_vec()]);
    }

    #[tokio::test]
    async fn copy_works_in_both_lock_orders() {
        let mut fx = Fixture::new();
        let first = fx.mailbox("First").await;
        let second = fx.mailbox("Second").await;
        fill(&first, 1).await;
        fill(&second, 1).await;

        first.copy_messages(true, &SeqSet::all(), "Second").await.unwrap();
        second.copy_messages(true, &SeqSet::single(1), "First").await.unwrap();
        first.copy_messages(true, &SeqSet::single(1), "First").await.unwrap();
        assert_eq!(first.uids().await, vec![1, 2, 3]);
        assert_eq!(second.uids().await, vec![1, 2]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn crossing_copies_do_not_deadlock() {
        const ROUNDS: usize = 25;
        let mut fx = Fixture::new();
        let first = fx.mailbox("First").await;
        let second = fx.mailbox("Second").await;
        fill(&first, 1).await;
        fill(&second, 1).await;

        for _ in 0..ROUNDS {
            let (a, b) = tokio::time::timeout(Duration::from_secs(5), async {
                let set_a = SeqSet::single(1);
                let set_b = SeqSet::single(1);
                tokio::join!(
                    first.copy_messages(true, &set_a, "Second"),
                    second.copy_messages(true, &set_b, "First"),
                )
            })
            .await
            .expect("crossing copies deadlocked");
            assert_eq!(a.unwrap().len(), 1);
            assert_eq!(b.unwrap().len(), 1);
        }

        for mbox in [&first, &second] {
            let uids = mbox.uids().await;
            assert_eq!(uids.len(), 1 + ROUNDS);
            assert!(uids.windows(2).all(|pair| pair[0] < pair[1]));
        }
    }

    #[tokio::test]
    async fn search_and_fetch_read_bodies_back_from_the_store() {
        let mut fx = Fixture::new();
        let mbox = fx.mailbox("Alpha").await;
        fill(&mbox, 2).await;
        assert_eq!(fx.ctx.bodies.len().unwrap(), 2);

        mbox.update_messages_flags(false, &SeqSet::single(1), FlagOp::Add, &[Flag::Deleted])
            .await;
        mbox.expunge().await;
        assert_eq!(fx.ctx.bodies.len().unwrap(), 1);
        assert!(fx.ctx.bodies.get(mbox.id(), 1).unwrap().is_none());

        let fetched: Vec<_> = mbox
            .list_messages(true, &SeqSet::single(2), &[FetchItem::Section("BODY[TEXT]".into())])
            .await
            .collect();
        assert_eq!(fetched[0].as_ref().unwrap().sections[0].1, b"Hi there\r\n".to_vec());
    }

    #[tokio::test]
    async fn copy_to_missing_mailbox_fails() {
        let mut fx = Fixture::new();
        let src = fx.mailbox("Alpha").await;
        fill(&src, 1).await;
        let err = src
            .copy_messages(false, &SeqSet::all(), "Nowhere")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoSuchMailbox(name) if name == "Nowhere"));
        assert_eq!(src.uids().await, vec![1]);
    }

    #[tokio::test]
    async fn info_and_subscription() {
        let mut fx = Fixture::new();
        let mbox = fx.mailbox("Alpha").await;
        assert!(!mbox.is_subscribed().await);
        mbox.set_subscribed(true).await;
        assert!(mbox.is_subscribed().await);
        let info = mbox.info().await;
        assert_eq!(info.name, "Alpha");
        assert_eq!(info.delimiter, "/");
        assert!(info.attributes.is_empty());
        assert!(mbox.check().is_ok());
    }
}
