//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::auth::JwtKeys;
use crate::item::ItemService;
use crate::trade::TradeLifecycleService;
use crate::user::UserDirectory;
use crate::verification::VerificationService;
use crate::websocket::WsState;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub trade_service: Arc<TradeLifecycleService>,
    pub item_service: Arc<ItemService>,
    pub verification_service: Arc<VerificationService>,
    pub user_directory: Arc<dyn UserDirectory>,
    pub jwt_keys: Arc<JwtKeys>,
    pub ws_state: WsState,
    /// Present on the postgres backend; used by the health check
    pub db_pool: Option<PgPool>,
}

impl AppState {
    pub fn new(
        trade_service: Arc<TradeLifecycleService>,
        item_service: Arc<ItemService>,
        verification_service: Arc<VerificationService>,
        user_directory: Arc<dyn UserDirectory>,
        jwt_keys: Arc<JwtKeys>,
        ws_state: WsState,
        db_pool: Option<PgPool>,
    ) -> Self {
        Self {
            trade_service,
            item_service,
            verification_service,
            user_directory,
            jwt_keys,
            ws_state,
            db_pool,
        }
    }
}

impl FromRef<AppState> for WsState {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.ws_state.clone()
    }
}

impl FromRef<AppState> for Arc<JwtKeys> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.jwt_keys.clone()
    }
}

impl FromRef<AppState> for Arc<TradeLifecycleService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.trade_service.clone()
    }
}

impl FromRef<AppState> for Arc<ItemService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.item_service.clone()
    }
}

impl FromRef<AppState> for Arc<VerificationService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.verification_service.clone()
    }
}
