//! Message flags stored in time entries
//!
//! OpenProject has nowhere to keep per-user message state, so the flags of
//! a work-package message live in the comment of one time entry per work
//! package. `\Seen` is also reflected as logged time: one minute spent
//! today while seen, zero otherwise.

use crate::error::Result;
use crate::flag::{self, Flag};
use crate::hal::{Filters, HalClient, Link, Resource, TimeEntry};
use chrono::Utc;
use serde_json::{Value, json};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const SEEN_HOURS: &str = "PT1M";
const UNSEEN_HOURS: &str = "PT0S";

/// The session user's time entries, keyed by work package id.
#[derive(Debug)]
pub struct TimeEntries {
    client: HalClient,
    activity: Option<Link>,
    entries: Mutex<HashMap<u64, TimeEntry>>,
}

impl TimeEntries {
    /// An empty store; new entries are logged under `activity`.
    #[must_use]
    pub fn new(client: HalClient, activity: Option<Link>) -> Self {
        Self {
            client,
            activity,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Page in every time entry of the user `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if a page cannot be loaded.
    pub async fn load_all(&self, user_id: u64) -> Result<usize> {
        let filters = Filters::new().filter("user", "=", user_id);
        let mut page = Some(
            self.client
                .get_filtered_collection("/api/v3/time_entries", &filters)
                .await?,
        );

        let mut loaded = 0;
        while let Some(col) = page {
            {
                let mut entries = self.entries.lock().await;
                for item in col.items() {
                    match item {
                        Resource::TimeEntry(te) => {
                            if record(&mut entries, te.clone()) {
                                loaded += 1;
                            }
                        }
                        other => warn!("Skipping {} in time entry collection", other.kind()),
                    }
                }
            }
            page = col.next_page(&self.client).await?;
        }
        debug!("Loaded {loaded} time entries");
        Ok(loaded)
    }

    /// Flags stored for `work_package_id`, if its entry holds any.
    pub async fn flags_for(&self, work_package_id: u64) -> Option<Vec<Flag>> {
        let entries = self.entries.lock().await;
        let comment = entries.get(&work_package_id)?.comment()?;
        let flags = flag::decode_comment(&comment.raw);
        (!flags.is_empty()).then_some(flags)
    }

    /// Write `flags` to the work package's time entry, creating the entry
    /// if there is none yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be created or updated.
    pub async fn store_flags(&self, work_package_id: u64, flags: &[Flag]) -> Result<()> {
        let mut entries = self.entries.lock().await;

        let link = match entries.get(&work_package_id) {
            Some(te) => te.self_link(),
            None => {
                let created = self.create(work_package_id).await?;
                let link = created.self_link();
                entries.insert(work_package_id, created);
                link
            }
        };
        let href = link.target().unwrap_or_default().to_string();

        let updated = TimeEntry::try_from(self.client.patch(&href, &update_body(flags)).await?)?;
        debug!("Stored flags of work package {work_package_id} in {href}");
        entries.insert(work_package_id, updated);
        Ok(())
    }

    async fn create(&self, work_package_id: u64) -> Result<TimeEntry> {
        let mut links = json!({
            "workPackage": { "href": format!("/api/v3/work_packages/{work_package_id}") }
        });
        if let Some(href) = self.activity.as_ref().and_then(Link::target) {
            links["activity"] = json!({ "href": href });
        }
        let body = json!({
            "_links": links,
            "hours": UNSEEN_HOURS,
            "spentOn": Utc::now().date_naive().to_string(),
            "comment": { "format": "plain", "raw": "" }
        });
        TimeEntry::try_from(self.client.post("/api/v3/time_entries", &body).await?)
    }

    /// Number of work packages with a known entry.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Keep the most recently updated entry per work package. Returns whether
/// `te` was kept.
fn record(entries: &mut HashMap<u64, TimeEntry>, te: TimeEntry) -> bool {
    let Some(work_package_id) = te.work_package_id() else {
        return false;
    };
    if let Some(current) = entries.get(&work_package_id)
        && current.updated_at() > te.updated_at()
    {
        return false;
    }
    entries.insert(work_package_id, te);
    true
}

fn update_body(flags: &[Flag]) -> Value {
    let comment = flag::encode_comment(flags);
    let mut body = json!({
        "comment": { "format": "plain", "raw": comment },
    });
    if flag::is_seen(flags) {
        body["hours"] = json!(SEEN_HOURS);
        body["spentOn"] = json!(Utc::now().date_naive().to_string());
    } else {
        body["hours"] = json!(UNSEEN_HOURS);
    }
    body
}
