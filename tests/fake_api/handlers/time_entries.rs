//! Time entries: filtered listing, the create form, create and update.

use crate::fake_api::http::{Request, Response};
use crate::fake_api::state::{ApiState, TestTimeEntry, TestUser};
use serde_json::{Value, json};

/// Activity offered by the form; the client looks it up by name.
pub const ACTIVITY_HREF: &str = "/api/v3/time_entries/activities/3";

/// Values of the `user` filter, if the request has one.
fn user_filter(req: &Request) -> Option<u64> {
    let filters: Value = serde_json::from_str(req.query.get("filters")?).ok()?;
    filters
        .as_array()?
        .iter()
        .find_map(|f| f.pointer("/user/values/0"))
        .and_then(Value::as_str)
        .and_then(|v| v.parse().ok())
}

pub fn handle_time_entries(state: &ApiState, req: &Request) -> Response {
    let user = user_filter(req);
    let elements = state
        .time_entries
        .iter()
        .filter(|te| user.is_none_or(|id| te.user_id == id))
        .map(ApiState::time_entry_json)
        .collect();
    let offset = req.query_u64("offset").unwrap_or(1);
    Response::json(200, &state.collection(&req.path, elements, offset))
}

pub fn handle_form() -> Response {
    Response::json(
        200,
        &json!({
            "_type": "Form",
            "_embedded": {
                "payload": { "_type": "TimeEntry" },
                "schema": {
                    "_type": "Schema",
                    "activity": {
                        "type": "TimeEntriesActivity",
                        "_embedded": { "allowedValues": [
                            { "_type": "TimeEntriesActivity", "id": 1, "name": "Development",
                              "_links": { "self": { "href": "/api/v3/time_entries/activities/1" } } },
                            { "_type": "TimeEntriesActivity", "id": 3, "name": "Other",
                              "_links": { "self": { "href": ACTIVITY_HREF } } }
                        ] }
                    }
                }
            }
        }),
    )
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

fn apply(te: &mut TestTimeEntry, body: &Value) {
    if let Some(raw) = body.pointer("/comment/raw").and_then(Value::as_str) {
        te.comment = raw.to_string();
    }
    if let Some(hours) = body.get("hours").and_then(Value::as_str) {
        te.hours = hours.to_string();
    }
    if let Some(spent_on) = body.get("spentOn").and_then(Value::as_str) {
        te.spent_on = spent_on.to_string();
    }
    te.updated_at = now();
}

pub fn handle_create_time_entry(state: &mut ApiState, req: &Request, user: &TestUser) -> Response {
    let body = req.json();
    let Some(work_package_id) = body
        .pointer("/_links/workPackage/href")
        .and_then(Value::as_str)
        .and_then(|href| href.rsplit('/').next())
        .and_then(|id| id.parse().ok())
    else {
        return Response::error(422, "PropertyConstraintViolation", "Work package is missing");
    };

    let id = state.time_entries.iter().map(|te| te.id).max().unwrap_or(0) + 1;
    let mut te = TestTimeEntry {
        id,
        user_id: user.id,
        work_package_id,
        comment: String::new(),
        hours: "PT0S".to_string(),
        spent_on: String::new(),
        updated_at: String::new(),
        activity: body
            .pointer("/_links/activity/href")
            .and_then(Value::as_str)
            .map(str::to_string),
    };
    apply(&mut te, &body);
    let response = Response::json(201, &ApiState::time_entry_json(&te));
    state.time_entries.push(te);
    response
}

pub fn handle_update_time_entry(state: &mut ApiState, req: &Request, id: u64) -> Response {
    let body = req.json();
    let Some(te) = state.time_entries.iter_mut().find(|te| te.id == id) else {
        return Response::not_found(&req.path);
    };
    apply(te, &body);
    Response::json(200, &ApiState::time_entry_json(te))
}
