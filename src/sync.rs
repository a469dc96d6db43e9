//! Background synchronizer
//!
//! One task per session. It holds only a weak reference, so a dropped
//! session ends its task at the next tick even without a shutdown.

use crate::session::Session;
use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Handle to a running synchronizer task; stops it when dropped.
#[derive(Debug)]
pub struct Synchronizer {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl Synchronizer {
    /// Start refreshing `session` every `period`, the first refresh one
    /// period from now.
    pub(crate) fn start(session: Weak<Session>, username: &str, period: Duration) -> Self {
        let shutdown = CancellationToken::new();
        let period = period.max(Duration::from_millis(1));
        let token = shutdown.clone();
        let username = username.to_string();

        let handle = tokio::spawn(async move {
            info!("Synchronizer for {username} started, period {period:?}");
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(session) = session.upgrade() else {
                            break;
                        };
                        debug!("Synchronizing {username}");
                        if let Err(e) = session.synchronize(false).await {
                            warn!("Synchronization of {username} aborted: {e}");
                        }
                    }
                }
            }
            info!("Synchronizer for {username} stopped");
        });

        Self { shutdown, handle }
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Synchronizer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
