use axum::{routing::get, Router};

use crate::handlers::get_user;
use crate::state::AppState;

pub fn user_routes() -> Router<AppState> {
    Router::new().route("/api/users/:id", get(get_user))
}
