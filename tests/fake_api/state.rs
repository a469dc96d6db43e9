//! Test data model for the fake OpenProject API
//!
//! Provides a builder-style API for constructing remote state:
//!
//! ```ignore
//! let state = ApiStateBuilder::new()
//!     .user(5, "ann", "Ann Example", Some("ann@corp.test"), "secret")
//!     .project(1, "Alpha")
//!         .work_package(101, "Fix login", "The login page fails.")
//!             .authored_by(5)
//!         .work_package(102, "Write docs !1", "")
//!     .time_entry(900, 5, 101, "\\Seen")
//!     .build();
//! ```
//!
//! The state is shared with the server behind a `Mutex`, so tests can
//! inspect what the client wrote (time entries, request counts) and add
//! remote data between synchronization cycles.

use serde_json::{Value, json};
use std::collections::HashMap;

pub const TIMESTAMP: &str = "2024-01-02T10:00:00Z";

#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: u64,
    pub login: String,
    pub name: String,
    pub email: Option<String>,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct TestProject {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct TestWorkPackage {
    pub id: u64,
    pub project_id: u64,
    pub subject: String,
    pub description: String,
    pub author_id: Option<u64>,
    pub assignee_id: Option<u64>,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct TestAttachment {
    pub id: u64,
    pub work_package_id: u64,
    pub file_name: String,
    pub content_type: String,
    pub content: Vec<u8>,
    /// Downloads fail with a server error.
    pub broken: bool,
}

/// A time entry as stored by the fake; `comment` holds the raw text.
#[derive(Debug, Clone)]
pub struct TestTimeEntry {
    pub id: u64,
    pub user_id: u64,
    pub work_package_id: u64,
    pub comment: String,
    pub hours: String,
    pub spent_on: String,
    pub updated_at: String,
    pub activity: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ApiState {
    pub users: Vec<TestUser>,
    pub projects: Vec<TestProject>,
    pub work_packages: Vec<TestWorkPackage>,
    pub attachments: Vec<TestAttachment>,
    pub time_entries: Vec<TestTimeEntry>,
    /// Collections are split into pages of this size.
    pub page_size: usize,
    /// Requests served, by path.
    pub requests: HashMap<String, usize>,
}

impl ApiState {
    pub fn user_by_key(&self, key: &str) -> Option<&TestUser> {
        self.users.iter().find(|u| u.api_key == key)
    }

    pub fn user_json(user: &TestUser) -> Value {
        let mut value = json!({
            "_type": "User",
            "id": user.id,
            "login": user.login,
            "name": user.name,
            "_links": { "self": { "href": format!("/api/v3/users/{}", user.id), "title": user.name } }
        });
        if let Some(email) = &user.email {
            value["email"] = json!(email);
        }
        value
    }

    pub fn project_json(project: &TestProject) -> Value {
        json!({
            "_type": "Project",
            "id": project.id,
            "name": project.name,
            "description": { "format": "markdown", "raw": "", "html": "" },
            "_links": {
                "self": { "href": format!("/api/v3/projects/{}", project.id) },
                "workPackages": { "href": format!("/api/v3/projects/{}/work_packages", project.id) }
            }
        })
    }

    pub fn work_package_json(wp: &TestWorkPackage) -> Value {
        let user_link = |id: Option<u64>| match id {
            Some(id) => json!({ "href": format!("/api/v3/users/{id}") }),
            None => json!({ "href": null }),
        };
        json!({
            "_type": "WorkPackage",
            "id": wp.id,
            "subject": wp.subject,
            "description": {
                "format": "markdown",
                "raw": wp.description,
                "html": format!("<p>{}</p>", wp.description)
            },
            "createdAt": TIMESTAMP,
            "updatedAt": wp.updated_at,
            "_links": {
                "self": { "href": format!("/api/v3/work_packages/{}", wp.id) },
                "project": { "href": format!("/api/v3/projects/{}", wp.project_id) },
                "author": user_link(wp.author_id),
                "assignee": user_link(wp.assignee_id),
                "responsible": { "href": null },
                "attachments": { "href": format!("/api/v3/work_packages/{}/attachments", wp.id) }
            }
        })
    }

    pub fn attachment_json(attachment: &TestAttachment) -> Value {
        json!({
            "_type": "Attachment",
            "id": attachment.id,
            "fileName": attachment.file_name,
            "contentType": attachment.content_type,
            "fileSize": attachment.content.len(),
            "_links": {
                "self": { "href": format!("/api/v3/attachments/{}", attachment.id) },
                "downloadLocation": { "href": format!("/api/v3/attachments/{}/content", attachment.id) }
            }
        })
    }

    pub fn time_entry_json(te: &TestTimeEntry) -> Value {
        let mut value = json!({
            "_type": "TimeEntry",
            "id": te.id,
            "comment": { "format": "plain", "raw": te.comment, "html": format!("<p>{}</p>", te.comment) },
            "hours": te.hours,
            "spentOn": te.spent_on,
            "createdAt": TIMESTAMP,
            "updatedAt": te.updated_at,
            "_links": {
                "self": { "href": format!("/api/v3/time_entries/{}", te.id) },
                "workPackage": { "href": format!("/api/v3/work_packages/{}", te.work_package_id) },
                "user": { "href": format!("/api/v3/users/{}", te.user_id) }
            }
        });
        if let Some(activity) = &te.activity {
            value["_links"]["activity"] = json!({ "href": activity });
        }
        value
    }

    /// One page of a collection at `path`; `offset` is the 1-based page.
    pub fn collection(&self, path: &str, elements: Vec<Value>, offset: u64) -> Value {
        let total = elements.len();
        let page_size = self.page_size.max(1);
        let offset = offset.max(1);
        let skip = usize::try_from(offset - 1).unwrap() * page_size;
        let page: Vec<Value> = elements.into_iter().skip(skip).take(page_size).collect();

        let mut links = json!({
            "self": { "href": format!("{path}?offset={offset}&pageSize={page_size}") }
        });
        if skip + page_size < total {
            links["nextByOffset"] = json!({
                "href": format!("{path}?offset={}&pageSize={page_size}", offset + 1)
            });
        }
        json!({
            "_type": "Collection",
            "total": total,
            "count": page.len(),
            "pageSize": page_size,
            "offset": offset,
            "_embedded": { "elements": page },
            "_links": links
        })
    }
}

/// Builder for constructing an `ApiState` step by step.
///
/// `.project()` starts a project that subsequent `.work_package()` calls
/// add to; `.authored_by()`, `.assigned_to()` and `.attachment()` modify
/// the most recent work package.
pub struct ApiStateBuilder {
    state: ApiState,
}

impl ApiStateBuilder {
    pub fn new() -> Self {
        Self {
            state: ApiState {
                users: Vec::new(),
                projects: Vec::new(),
                work_packages: Vec::new(),
                attachments: Vec::new(),
                time_entries: Vec::new(),
                page_size: 20,
                requests: HashMap::new(),
            },
        }
    }

    pub fn user(mut self, id: u64, login: &str, name: &str, email: Option<&str>, api_key: &str) -> Self {
        self.state.users.push(TestUser {
            id,
            login: login.to_string(),
            name: name.to_string(),
            email: email.map(str::to_string),
            api_key: api_key.to_string(),
        });
        self
    }

    pub fn project(mut self, id: u64, name: &str) -> Self {
        self.state.projects.push(TestProject {
            id,
            name: name.to_string(),
        });
        self
    }

    /// Add a work package to the most recently added project.
    ///
    /// # Panics
    ///
    /// Panics if called before any `.project()` call.
    pub fn work_package(mut self, id: u64, subject: &str, description: &str) -> Self {
        let project_id = self
            .state
            .projects
            .last()
            .expect("call .project() before .work_package()")
            .id;
        self.state.work_packages.push(TestWorkPackage {
            id,
            project_id,
            subject: subject.to_string(),
            description: description.to_string(),
            author_id: None,
            assignee_id: None,
            updated_at: TIMESTAMP.to_string(),
        });
        self
    }

    fn last_work_package(&mut self) -> &mut TestWorkPackage {
        self.state
            .work_packages
            .last_mut()
            .expect("call .work_package() first")
    }

    pub fn authored_by(mut self, user_id: u64) -> Self {
        self.last_work_package().author_id = Some(user_id);
        self
    }

    pub fn assigned_to(mut self, user_id: u64) -> Self {
        self.last_work_package().assignee_id = Some(user_id);
        self
    }

    pub fn attachment(mut self, id: u64, file_name: &str, content_type: &str, content: &[u8]) -> Self {
        let work_package_id = self.last_work_package().id;
        self.state.attachments.push(TestAttachment {
            id,
            work_package_id,
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            content: content.to_vec(),
            broken: false,
        });
        self
    }

    /// An attachment that is listed but whose download fails with 500.
    pub fn broken_attachment(mut self, id: u64, file_name: &str, content_type: &str) -> Self {
        let work_package_id = self.last_work_package().id;
        self.state.attachments.push(TestAttachment {
            id,
            work_package_id,
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            content: Vec::new(),
            broken: true,
        });
        self
    }

    pub fn time_entry(mut self, id: u64, user_id: u64, work_package_id: u64, comment: &str) -> Self {
        self.state.time_entries.push(TestTimeEntry {
            id,
            user_id,
            work_package_id,
            comment: comment.to_string(),
            hours: "PT0S".to_string(),
            spent_on: "2024-01-02".to_string(),
            updated_at: TIMESTAMP.to_string(),
            activity: None,
        });
        self
    }

    pub fn page_size(mut self, size: usize) -> Self {
        self.state.page_size = size;
        self
    }

    pub fn build(self) -> ApiState {
        self.state
    }
}
