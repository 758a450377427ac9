//! Verification route definitions

use axum::{
    routing::{get, patch},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn verification_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/verifications",
            get(list_verifications).post(submit_verification),
        )
        .route("/api/verifications/status", get(verification_status))
        .route("/api/verifications/:id/review", patch(review_verification))
}
