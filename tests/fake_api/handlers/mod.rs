//! Endpoint handlers for the fake API.
//!
//! Each module serves one endpoint family. Handlers are plain functions
//! over the locked `ApiState`; the server has already checked the API
//! key and passes the authenticated user.

mod attachments;
mod projects;
mod time_entries;
mod users;

pub use attachments::{handle_attachments, handle_download};
pub use projects::{handle_projects, handle_work_packages};
pub use time_entries::{handle_create_time_entry, handle_form, handle_time_entries, handle_update_time_entry};
pub use users::{handle_me, handle_user};
