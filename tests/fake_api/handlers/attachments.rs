//! Attachment listing and downloads.

use crate::fake_api::http::{Request, Response};
use crate::fake_api::state::ApiState;

pub fn handle_attachments(state: &ApiState, req: &Request, work_package_id: u64) -> Response {
    let elements = state
        .attachments
        .iter()
        .filter(|a| a.work_package_id == work_package_id)
        .map(ApiState::attachment_json)
        .collect();
    Response::json(200, &state.collection(&req.path, elements, 1))
}

pub fn handle_download(state: &ApiState, req: &Request, id: u64) -> Response {
    match state.attachments.iter().find(|a| a.id == id) {
        None => Response::not_found(&req.path),
        Some(a) if a.broken => Response::error(500, "InternalError", "Storage unavailable."),
        Some(a) => Response::bytes("application/octet-stream", a.content.clone()),
    }
}
