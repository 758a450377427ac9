//! Product catalogue handlers

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
use crate::item::{CreateItemRequest, Item, ItemFilter, ItemService, ItemSort, UpdateItemRequest};
use crate::middleware::AuthenticatedUser;
use crate::models::{ApiResponse, PaginatedResponse, PaginationParams};

/// Browse available items
pub async fn list_items(
    State(service): State<Arc<ItemService>>,
    Query(filter): Query<ItemFilter>,
) -> Result<Json<ApiResponse<PaginatedResponse<Item>>>, ApiError> {
    let page = service.browse(filter).await?;
    Ok(Json(ApiResponse::ok(page)))
}

/// Free-text search over available items, best matches first
pub async fn search_items(
    State(service): State<Arc<ItemService>>,
    Path(query): Path<String>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PaginatedResponse<Item>>>, ApiError> {
    let filter = ItemFilter {
        q: Some(query),
        sort: Some(ItemSort::Relevance),
        page: params.page,
        limit: params.limit,
        ..Default::default()
    };
    let page = service.browse(filter).await?;
    Ok(Json(ApiResponse::ok(page)))
}

pub async fn items_by_category(
    State(service): State<Arc<ItemService>>,
    Path(category): Path<String>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PaginatedResponse<Item>>>, ApiError> {
    let filter = ItemFilter {
        category: Some(category),
        page: params.page,
        limit: params.limit,
        ..Default::default()
    };
    let page = service.browse(filter).await?;
    Ok(Json(ApiResponse::ok(page)))
}

pub async fn get_item(
    State(service): State<Arc<ItemService>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Item>>, ApiError> {
    let item = service.get_item(id).await?;
    Ok(Json(ApiResponse::ok(item)))
}

pub async fn create_item(
    user: AuthenticatedUser,
    State(service): State<Arc<ItemService>>,
    Json(request): Json<CreateItemRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Item>>), ApiError> {
    request.validate()?;
    let item = service.create_item(user.owner(), request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(item))))
}

pub async fn update_item(
    user: AuthenticatedUser,
    State(service): State<Arc<ItemService>>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateItemRequest>,
) -> Result<Json<ApiResponse<Item>>, ApiError> {
    request.validate()?;
    let item = service.update_item(id, user.user_id, request).await?;
    Ok(Json(ApiResponse::ok(item)))
}

pub async fn delete_item(
    user: AuthenticatedUser,
    State(service): State<Arc<ItemService>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Value>>, ApiError> {
    service.delete_item(id, user.user_id).await?;
    Ok(Json(ApiResponse::ok(json!({ "id": id, "deleted": true }))))
}

pub async fn toggle_favorite(
    user: AuthenticatedUser,
    State(service): State<Arc<ItemService>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Item>>, ApiError> {
    let item = service.toggle_favorite(id, user.user_id).await?;
    Ok(Json(ApiResponse::ok(item)))
}
