//! Service wiring and router assembly shared by the binary and tests

use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::{middleware, Router};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};

use crate::auth::JwtKeys;
use crate::config::Config;
use crate::item::{InMemoryItemRegistry, ItemRegistry, ItemService, PgItemRegistry};
use crate::middleware::{hsts_header, rate_limit, request_tracing, security_headers, RateLimiter};
use crate::routes::api_router;
use crate::state::AppState;
use crate::trade::{InMemoryTradeStore, PgTradeStore, TradeLifecycleService, TradePolicy, TradeStore};
use crate::user::{InMemoryUserDirectory, PgUserDirectory, UserDirectory};
use crate::verification::{
    InMemoryVerificationStore, PgVerificationStore, VerificationService, VerificationStore,
};
use crate::websocket::WsState;

/// One implementation per persistence boundary
#[derive(Clone)]
pub struct Stores {
    pub items: Arc<dyn ItemRegistry>,
    pub trades: Arc<dyn TradeStore>,
    pub users: Arc<dyn UserDirectory>,
    pub verifications: Arc<dyn VerificationStore>,
    pub db_pool: Option<PgPool>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            items: Arc::new(PgItemRegistry::new(pool.clone())),
            trades: Arc::new(PgTradeStore::new(pool.clone())),
            users: Arc::new(PgUserDirectory::new(pool.clone())),
            verifications: Arc::new(PgVerificationStore::new(pool.clone())),
            db_pool: Some(pool),
        }
    }

    /// Process-local stores. The user directory is returned as well so
    /// callers can seed accounts.
    pub fn in_memory() -> (Self, Arc<InMemoryUserDirectory>) {
        let users = Arc::new(InMemoryUserDirectory::new());
        let stores = Self {
            items: Arc::new(InMemoryItemRegistry::new()),
            trades: Arc::new(InMemoryTradeStore::new()),
            users: users.clone(),
            verifications: Arc::new(InMemoryVerificationStore::new()),
            db_pool: None,
        };
        (stores, users)
    }
}

/// Build services over the given stores
pub fn build_state(stores: Stores, policy: TradePolicy, jwt_secret: &str, ws_state: WsState) -> AppState {
    let trade_service = Arc::new(TradeLifecycleService::new(
        stores.trades.clone(),
        stores.items.clone(),
        stores.users.clone(),
        policy,
    ));
    let item_service = Arc::new(ItemService::new(stores.items.clone()));
    let verification_service = Arc::new(VerificationService::new(stores.verifications.clone()));

    AppState::new(
        trade_service,
        item_service,
        verification_service,
        stores.users,
        Arc::new(JwtKeys::new(jwt_secret)),
        ws_state,
        stores.db_pool,
    )
}

/// Full router with the middleware stack
pub fn build_router(app_state: AppState, config: &Config, rate_limiter: RateLimiter) -> Router {
    let mut app = api_router(app_state)
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_tracing))
        .layer(middleware::from_fn_with_state(rate_limiter, rate_limit))
        .layer(configure_cors(config.cors_allowed_origins.as_deref()));

    if config.environment.is_production() {
        app = app.layer(middleware::from_fn(hsts_header));
    }

    app
}

fn configure_cors(allowed_origins: Option<&str>) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    if origins.is_empty() {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(Any)
}
