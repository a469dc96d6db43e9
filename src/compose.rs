//! Building RFC 5322 messages from work packages

use crate::cache::{AddressCache, AttachmentCache, CachedProfile};
use crate::config::FacadeConfig;
use crate::error::Result;
use crate::flag::Flag;
use crate::hal::{Attachment, Collection, HalClient, Link, WorkPackage};
use crate::template::{MessageTemplate, WorkPackageView};
use crate::time_entry::TimeEntries;
use chrono::{DateTime, Utc};
use mail_builder::MessageBuilder;
use mail_builder::headers::address::Address;
use mail_builder::headers::date::Date;
use std::sync::Arc;
use tracing::{debug, warn};

/// Subject suffix marking a work package as important.
pub const IMPORTANT_SUFFIX: &str = " !1";

/// A message built from a work package, ready to append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedMessage {
    pub work_package_id: u64,
    pub date: DateTime<Utc>,
    pub flags: Vec<Flag>,
    pub body: Vec<u8>,
}

/// Strip the importance marker, returning the clean subject and whether
/// it was present.
#[must_use]
pub fn split_importance(subject: &str) -> (&str, bool) {
    subject
        .strip_suffix(IMPORTANT_SUFFIX)
        .map_or((subject, false), |clean| (clean, true))
}

fn address(profile: &CachedProfile) -> Address<'_> {
    if profile.name.is_empty() {
        Address::new_address(None::<&str>, profile.email.as_str())
    } else {
        Address::new_address(Some(profile.name.as_str()), profile.email.as_str())
    }
}

/// Turns work packages into messages for one session.
#[derive(Debug)]
pub struct Composer {
    client: HalClient,
    config: Arc<FacadeConfig>,
    addresses: Arc<AddressCache>,
    attachments: Arc<AttachmentCache>,
    template: Arc<dyn MessageTemplate>,
    time_entries: Option<Arc<TimeEntries>>,
}

impl Composer {
    #[must_use]
    pub fn new(
        client: HalClient,
        config: Arc<FacadeConfig>,
        addresses: Arc<AddressCache>,
        attachments: Arc<AttachmentCache>,
        template: Arc<dyn MessageTemplate>,
        time_entries: Option<Arc<TimeEntries>>,
    ) -> Self {
        Self {
            client,
            config,
            addresses,
            attachments,
            template,
            time_entries,
        }
    }

    async fn profile(&self, link: Option<&Link>) -> Option<CachedProfile> {
        let link = link?;
        match self.addresses.load_profile(&self.client, link).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!("Failed to resolve {:?}: {e}", link.href);
                None
            }
        }
    }

    async fn load_attachments(&self, wp: &WorkPackage) -> Vec<(Attachment, Vec<u8>)> {
        let Some(link) = wp.attachments_link() else {
            return Vec::new();
        };
        let collection = match self.client.link_get(link).await.and_then(Collection::try_from) {
            Ok(collection) => collection,
            Err(e) => {
                warn!("Failed to list attachments of work package {}: {e}", wp.id());
                return Vec::new();
            }
        };

        let mut loaded = Vec::new();
        for item in collection.into_items() {
            let Ok(attachment) = Attachment::try_from(item) else {
                warn!("Skipping non-attachment in attachments of {}", wp.id());
                continue;
            };
            match self.attachments.load(&self.client, &attachment).await {
                Ok(bytes) => loaded.push((attachment, bytes)),
                Err(e) => warn!(
                    "Failed to download attachment {} of work package {}: {e}",
                    attachment.file_name(),
                    wp.id()
                ),
            }
        }
        loaded
    }

    /// Build the message for `wp`.
    ///
    /// Unresolvable addresses and attachments are left out.
    ///
    /// # Errors
    ///
    /// Returns an error if the template fails or the message cannot be
    /// serialized.
    pub async fn compose(&self, wp: &WorkPackage) -> Result<ComposedMessage> {
        let date = wp
            .updated_at()
            .or_else(|| wp.created_at())
            .unwrap_or_else(Utc::now);

        let (subject, important) = split_importance(wp.subject());
        let mut flags = if important {
            vec![Flag::Flagged, Flag::important()]
        } else {
            Vec::new()
        };

        let from = self.profile(wp.author()).await;
        let to = self.profile(wp.assignee()).await;
        let cc = self.profile(wp.responsible()).await;
        let attachments = self.load_attachments(wp).await;

        let view = WorkPackageView::new(
            wp,
            subject,
            date,
            &self.config.base_url,
            self.config.words_per_minute,
        );
        let rendered = self.template.render(&view)?;

        let message_id = format!("wp-{}@{}", wp.id(), self.config.email_domain);
        let mut builder = MessageBuilder::new()
            .date(Date::new(date.timestamp()))
            .message_id(message_id.as_str())
            .subject(subject)
            .text_body(rendered.text.as_str())
            .html_body(rendered.html.as_str());
        if let Some(profile) = &from {
            builder = builder.from(address(profile));
        }
        if let Some(profile) = &to {
            builder = builder.to(address(profile));
        }
        if let Some(profile) = &cc {
            builder = builder.cc(address(profile));
        }
        for (attachment, bytes) in &attachments {
            builder = builder.attachment(
                attachment.content_type(),
                attachment.file_name(),
                bytes.as_slice(),
            );
        }
        let body = builder.write_to_vec()?;

        if let Some(entries) = &self.time_entries
            && let Some(stored) = entries.flags_for(wp.id()).await
        {
            flags = stored;
        }

        debug!("Composed message for work package {}: {subject}", wp.id());
        Ok(ComposedMessage {
            work_package_id: wp.id(),
            date,
            flags,
            body,
        })
    }
}

/// The one-time greeting placed in a new INBOX.
///
/// # Errors
///
/// Returns an error if the message cannot be serialized.
pub fn welcome_message(config: &FacadeConfig, user: &CachedProfile) -> Result<Vec<u8>> {
    let text = format!(
        "Hi {},\r\nWelcome to the IMAP facade for OpenProject.",
        user.name
    );
    let html = format!("<html><head></head><body>{text}</body></html>");
    let contact = config.contact_address();

    Ok(MessageBuilder::new()
        .date(Date::new(Utc::now().timestamp()))
        .from(Address::new_address(None::<&str>, contact.as_str()))
        .to(address(user))
        .subject("Welcome to the OpenProject IMAP facade")
        .text_body(text.as_str())
        .html_body(html.as_str())
        .write_to_vec()?)
}
