//! Trade route definitions

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn trade_routes() -> Router<AppState> {
    Router::new()
        .route("/api/trades", post(create_trade))
        .route("/api/trades/my-trades", get(my_trades))
        .route("/api/trades/:id", get(get_trade).delete(cancel_trade))
        .route("/api/trades/:id/status", patch(update_trade_status))
        .route("/api/trades/:id/messages", post(add_trade_message))
}
