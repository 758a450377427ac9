//! Product route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/api/products", get(list_items).post(create_item))
        .route(
            "/api/products/:id",
            get(get_item).put(update_item).delete(delete_item),
        )
        .route("/api/products/search/:query", get(search_items))
        .route("/api/products/category/:category", get(items_by_category))
        .route("/api/products/:id/favorite", post(toggle_favorite))
}
