//! `/api/v3/users/me` and `/api/v3/users/{id}`.

use crate::fake_api::http::Response;
use crate::fake_api::state::{ApiState, TestUser};

pub fn handle_me(user: &TestUser) -> Response {
    Response::json(200, &ApiState::user_json(user))
}

pub fn handle_user(state: &ApiState, id: u64) -> Response {
    state.users.iter().find(|u| u.id == id).map_or_else(
        || Response::not_found(&format!("/api/v3/users/{id}")),
        |user| Response::json(200, &ApiState::user_json(user)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_api::ApiStateBuilder;

    #[test]
    fn unknown_user_is_not_found() {
        let state = ApiStateBuilder::new()
            .user(5, "ann", "Ann", None, "k")
            .build();
        assert_eq!(handle_user(&state, 5).status, 200);
        assert_eq!(handle_user(&state, 6).status, 404);
    }
}
