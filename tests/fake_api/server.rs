//! In-process fake OpenProject API for integration testing
//!
//! # How the OpenProject API looks (overview)
//!
//! OpenProject exposes a HAL+JSON API under `/api/v3`. Every response
//! is a JSON object with a `_type`, hyperlinks under `_links` and nested
//! resources under `_embedded`:
//!
//! ```text
//!   GET /api/v3/projects
//!   {
//!     "_type": "Collection", "total": 1, "count": 1,
//!     "_embedded": { "elements": [ { "_type": "Project", "id": 1, ... } ] },
//!     "_links": { "nextByOffset": { "href": "/api/v3/projects?offset=2" } }
//!   }
//! ```
//!
//! Collections are paginated; `nextByOffset` is present while more
//! pages follow. Clients authenticate with HTTP basic auth, user
//! `apikey` and the API key as password. Failures come back as an
//! `Error` resource with an `errorIdentifier`.

use super::handlers::{
    handle_attachments, handle_create_time_entry, handle_download, handle_form, handle_me,
    handle_projects, handle_time_entries, handle_update_time_entry, handle_user,
    handle_work_packages,
};
use super::http::{Request, Response, read_request, write_response};
use super::state::{ApiState, TIMESTAMP, TestTimeEntry, TestUser, TestWorkPackage};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::sync::{Arc, Mutex};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};

/// A fake OpenProject instance on localhost with an OS-assigned port.
///
/// The server runs until the `FakeApiServer` is dropped (the tokio
/// task is aborted).
pub struct FakeApiServer {
    port: u16,
    state: Arc<Mutex<ApiState>>,
    handle: tokio::task::JoinHandle<()>,
}

impl FakeApiServer {
    /// Start a new fake API with the given state.
    pub async fn start(state: ApiState) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind to ephemeral port");
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(state));

        let shared = Arc::clone(&state);
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _addr)) = listener.accept().await else {
                    break;
                };
                let state = Arc::clone(&shared);
                tokio::spawn(async move {
                    handle_connection(stream, &state).await;
                });
            }
        });

        Self {
            port,
            state,
            handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Number of requests served for `path` (query excluded).
    pub fn requests(&self, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    /// Snapshot of the stored time entries.
    pub fn time_entries(&self) -> Vec<TestTimeEntry> {
        self.state.lock().unwrap().time_entries.clone()
    }

    /// Add a work package to `project_id` after startup.
    pub fn add_work_package(&self, project_id: u64, id: u64, subject: &str, author_id: Option<u64>) {
        self.state.lock().unwrap().work_packages.push(TestWorkPackage {
            id,
            project_id,
            subject: subject.to_string(),
            description: String::new(),
            author_id,
            assignee_id: None,
            updated_at: TIMESTAMP.to_string(),
        });
    }

    /// Rename a user, e.g. to observe address-cache expiry.
    pub fn rename_user(&self, id: u64, name: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(user) = state.users.iter_mut().find(|u| u.id == id) {
            user.name = name.to_string();
        }
    }
}

impl Drop for FakeApiServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// API key from an `Authorization: Basic` header.
fn api_key(req: &Request) -> Option<String> {
    let encoded = req.headers.get("authorization")?.strip_prefix("Basic ")?;
    let decoded = String::from_utf8(STANDARD.decode(encoded).ok()?).ok()?;
    let (user, key) = decoded.split_once(':')?;
    (user == "apikey").then(|| key.to_string())
}

async fn handle_connection(stream: TcpStream, state: &Mutex<ApiState>) {
    let mut reader = BufReader::new(stream);
    let Ok(Some(req)) = read_request(&mut reader).await else {
        return;
    };
    let response = {
        let mut state = state.lock().unwrap();
        *state.requests.entry(req.path.clone()).or_default() += 1;
        let user = api_key(&req).and_then(|key| state.user_by_key(&key).cloned());
        match user {
            Some(user) => route(&mut state, &req, &user),
            None => Response::error(401, "Unauthenticated", "You need to be authenticated to access this resource."),
        }
    };
    let mut stream = reader.into_inner();
    let _ = write_response(&mut stream, &response).await;
}

/// Dispatch on method and path segments after `/api/v3/`.
fn route(state: &mut ApiState, req: &Request, user: &TestUser) -> Response {
    let Some(rest) = req.path.strip_prefix("/api/v3/") else {
        return Response::not_found(&req.path);
    };
    let segments: Vec<&str> = rest.trim_end_matches('/').split('/').collect();
    let id = |ix: usize| segments.get(ix).and_then(|s| s.parse::<u64>().ok());

    match (req.method.as_str(), segments.as_slice()) {
        ("GET", ["users", "me"]) => handle_me(user),
        ("GET", ["users", _]) => id(1).map_or_else(|| Response::not_found(&req.path), |id| handle_user(state, id)),
        ("GET", ["projects"]) => handle_projects(state, req),
        ("GET", ["projects", _, "work_packages"]) => match id(1) {
            Some(id) => handle_work_packages(state, req, id),
            None => Response::not_found(&req.path),
        },
        ("GET", ["work_packages", _, "attachments"]) => match id(1) {
            Some(id) => handle_attachments(state, req, id),
            None => Response::not_found(&req.path),
        },
        ("GET", ["attachments", _, "content"]) => match id(1) {
            Some(id) => handle_download(state, req, id),
            None => Response::not_found(&req.path),
        },
        ("GET", ["time_entries"]) => handle_time_entries(state, req),
        ("POST", ["time_entries", "form"]) => handle_form(),
        ("POST", ["time_entries"]) => handle_create_time_entry(state, req, user),
        ("PATCH", ["time_entries", _]) => match id(1) {
            Some(id) => handle_update_time_entry(state, req, id),
            None => Response::not_found(&req.path),
        },
        _ => Response::error(405, "NotImplemented", "Endpoint not supported by the fake"),
    }
}
