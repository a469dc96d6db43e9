//! `/api/v3/projects` and `/api/v3/projects/{id}/work_packages`.

use crate::fake_api::http::{Request, Response};
use crate::fake_api::state::ApiState;

pub fn handle_projects(state: &ApiState, req: &Request) -> Response {
    let elements = state.projects.iter().map(ApiState::project_json).collect();
    let offset = req.query_u64("offset").unwrap_or(1);
    Response::json(200, &state.collection(&req.path, elements, offset))
}

pub fn handle_work_packages(state: &ApiState, req: &Request, project_id: u64) -> Response {
    if !state.projects.iter().any(|p| p.id == project_id) {
        return Response::not_found(&req.path);
    }
    let elements = state
        .work_packages
        .iter()
        .filter(|wp| wp.project_id == project_id)
        .map(ApiState::work_package_json)
        .collect();
    let offset = req.query_u64("offset").unwrap_or(1);
    Response::json(200, &state.collection(&req.path, elements, offset))
}
