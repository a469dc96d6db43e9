//! IMAP facade over OpenProject
//!
//! Presents OpenProject as a mail store: every project is a mailbox and
//! every work package a message in it. Message flags are written back to
//! the remote service through time entries, so read state and importance
//! survive across clients.
//!
//! The crate is the backend of an IMAP server. A frontend calls
//! [`Backend::login`], works on the returned [`Session`] and its
//! [`Mailbox`]es, and consumes live changes from [`Updates`].

mod backend;
mod body_store;
mod cache;
mod compose;
mod config;
mod db;
mod error;
mod flag;
mod folder;
pub mod hal;
mod mailbox;
mod message;
mod mime;
mod seq_set;
mod session;
mod sync;
mod template;
mod time_entry;
mod updates;

pub use backend::Backend;
pub use body_store::BodyStore;
pub use cache::{ActivityCache, AddressCache, AttachmentCache, CachedProfile, format_address};
pub use compose::{ComposedMessage, Composer, IMPORTANT_SUFFIX, split_importance};
pub use config::FacadeConfig;
pub use db::CacheDb;
pub use error::{Error, Result};
pub use flag::{Flag, FlagOp};
pub use folder::Folder;
pub use mailbox::{DELIMITER, Mailbox, MailboxInfo, MailboxStatus, MessageList, StatusItem};
pub use message::{FetchItem, FetchedMessage, Message, SearchCriteria};
pub use mime::{BodySection, BodyStructure, Envelope, EnvelopeAddress, SectionText};
pub use seq_set::SeqSet;
pub use session::Session;
pub use sync::Synchronizer;
pub use template::{DefaultTemplate, MessageTemplate, RenderedBody, WorkPackageView};
pub use time_entry::TimeEntries;
pub use updates::{PendingUpdate, Update, UpdateKind, UpdatePublisher, Updates, channel};
