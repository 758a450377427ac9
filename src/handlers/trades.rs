//! Trade proposal handlers
//!
//! Each successful mutation is broadcast on the WebSocket feed.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::ApiError;
use crate::middleware::AuthenticatedUser;
use crate::models::{ApiResponse, PaginatedResponse, PaginationParams};
use crate::state::AppState;
use crate::trade::{
    AddMessageRequest, CreateTradeRequest, Trade, TradeEvent, TradeLifecycleService,
    UpdateTradeStatusRequest,
};

pub async fn create_trade(
    user: AuthenticatedUser,
    State(app_state): State<AppState>,
    Json(request): Json<CreateTradeRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Trade>>), ApiError> {
    request.validate()?;

    let trade = app_state
        .trade_service
        .propose(user.party(), request)
        .await?;

    app_state
        .ws_state
        .broadcast_event(
            TradeEvent::Proposed {
                trade_id: trade.id,
                initiator_id: trade.initiator.id,
                recipient_id: trade.recipient.id,
            },
            trade.participants(),
        )
        .await;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(trade))))
}

pub async fn my_trades(
    user: AuthenticatedUser,
    State(service): State<Arc<TradeLifecycleService>>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PaginatedResponse<Trade>>>, ApiError> {
    let page = service.list_mine(user.user_id, params.into()).await?;
    Ok(Json(ApiResponse::ok(page)))
}

pub async fn get_trade(
    user: AuthenticatedUser,
    State(service): State<Arc<TradeLifecycleService>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Trade>>, ApiError> {
    let trade = service.get_trade(id, user.user_id).await?;
    Ok(Json(ApiResponse::ok(trade)))
}

pub async fn update_trade_status(
    user: AuthenticatedUser,
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateTradeStatusRequest>,
) -> Result<Json<ApiResponse<Trade>>, ApiError> {
    let trade = app_state
        .trade_service
        .update_status(id, user.user_id, request.status)
        .await?;

    app_state
        .ws_state
        .broadcast_event(
            TradeEvent::StatusChanged {
                trade_id: trade.id,
                status: trade.status,
            },
            trade.participants(),
        )
        .await;

    Ok(Json(ApiResponse::ok(trade)))
}

pub async fn add_trade_message(
    user: AuthenticatedUser,
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AddMessageRequest>,
) -> Result<Json<ApiResponse<Trade>>, ApiError> {
    request.validate()?;

    let trade = app_state
        .trade_service
        .add_message(id, user.user_id, &request.message)
        .await?;

    app_state
        .ws_state
        .broadcast_event(
            TradeEvent::MessageAdded {
                trade_id: trade.id,
                sender_id: user.user_id,
            },
            trade.participants(),
        )
        .await;

    Ok(Json(ApiResponse::ok(trade)))
}

pub async fn cancel_trade(
    user: AuthenticatedUser,
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Value>>, ApiError> {
    let trade = app_state.trade_service.cancel(id, user.user_id).await?;

    app_state
        .ws_state
        .broadcast_event(TradeEvent::Cancelled { trade_id: id }, trade.participants())
        .await;

    Ok(Json(ApiResponse::ok(json!({ "id": id, "cancelled": true }))))
}
