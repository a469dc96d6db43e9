//! Live updates for the protocol frontend
//!
//! Mailboxes and sessions publish [`Update`]s through an
//! [`UpdatePublisher`]; the frontend drains them from [`Updates`]. The
//! channel is a rendezvous: a publisher waits until the consumer has
//! finished with its update before returning, and only one update is in
//! flight at any time.

use crate::error::{Error, Result};
use crate::flag::Flag;
use crate::mailbox::MailboxStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::warn;

/// What changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateKind {
    /// Mailbox counters or flag vocabulary changed.
    MailboxStatus(MailboxStatus),
    /// A message's flags changed.
    Message {
        seq_num: u32,
        uid: u32,
        flags: Vec<Flag>,
    },
    /// The message at `seq_num` was removed.
    Expunge { seq_num: u32 },
}

/// A change in one user's mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub username: String,
    pub mailbox: String,
    pub kind: UpdateKind,
}

/// An update handed to the consumer.
///
/// The producer is released when this is [`done`](Self::done) or
/// dropped.
#[derive(Debug)]
pub struct PendingUpdate {
    update: Update,
    done: Option<oneshot::Sender<()>>,
}

impl PendingUpdate {
    #[must_use]
    pub const fn update(&self) -> &Update {
        &self.update
    }

    /// Signal that the update has been delivered.
    pub fn done(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(done) = self.done.take() {
            // The producer may have timed out already.
            let _ = done.send(());
        }
    }
}

impl Drop for PendingUpdate {
    fn drop(&mut self) {
        self.release();
    }
}

/// Receiving side, owned by the frontend.
#[derive(Debug)]
pub struct Updates {
    rx: mpsc::Receiver<PendingUpdate>,
}

impl Updates {
    /// Next update, or `None` once every publisher is gone.
    pub async fn recv(&mut self) -> Option<PendingUpdate> {
        self.rx.recv().await
    }
}

/// Sending side, cloned into every session and mailbox.
#[derive(Debug, Clone)]
pub struct UpdatePublisher {
    tx: mpsc::Sender<PendingUpdate>,
    gate: Arc<Mutex<()>>,
    timeout: Option<Duration>,
}

/// A connected publisher/consumer pair.
#[must_use]
pub fn channel(timeout: Option<Duration>) -> (UpdatePublisher, Updates) {
    let (tx, rx) = mpsc::channel(1);
    (
        UpdatePublisher {
            tx,
            gate: Arc::new(Mutex::new(())),
            timeout,
        },
        Updates { rx },
    )
}

impl UpdatePublisher {
    /// Hand `update` to the consumer and wait until it is done with it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UpdatesClosed`] if the consumer is gone and
    /// [`Error::UpdateTimeout`] if the configured timeout elapses first.
    pub async fn publish(&self, update: Update) -> Result<()> {
        let _in_flight = self.gate.lock().await;

        let (done_tx, done_rx) = oneshot::channel();
        let pending = PendingUpdate {
            update,
            done: Some(done_tx),
        };
        let handshake = async {
            self.tx
                .send(pending)
                .await
                .map_err(|_| Error::UpdatesClosed)?;
            done_rx.await.map_err(|_| Error::UpdatesClosed)
        };

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, handshake)
                .await
                .map_err(|_| Error::UpdateTimeout)?,
            None => handshake.await,
        }
    }

    /// Publish each update in order, logging instead of failing.
    pub async fn notify_all(&self, updates: Vec<Update>) {
        for update in updates {
            let mailbox = update.mailbox.clone();
            if let Err(e) = self.publish(update).await {
                warn!("Failed to deliver update for {mailbox}: {e}");
            }
        }
    }
}
