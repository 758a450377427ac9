//! Route definitions for the UniGoods API

mod products;
mod trades;
mod users;
mod verification;

use axum::{routing::get, Router};

use crate::handlers::{health_check, root};
use crate::state::AppState;
use crate::websocket::ws_handler;

pub use products::product_routes;
pub use trades::trade_routes;
pub use users::user_routes;
pub use verification::verification_routes;

/// Every route, before middleware layers are applied
pub fn api_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/ws", get(ws_handler))
        .merge(trade_routes())
        .merge(product_routes())
        .merge(user_routes())
        .merge(verification_routes())
        .with_state(app_state)
}
