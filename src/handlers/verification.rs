//! Student-ID verification handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::ApiError;
use crate::middleware::{AdminUser, AuthenticatedUser};
use crate::models::ApiResponse;
use crate::verification::{
    ListVerificationsQuery, ReviewVerificationRequest, SubmitVerificationRequest, Verification,
    VerificationService,
};

pub async fn submit_verification(
    user: AuthenticatedUser,
    State(service): State<Arc<VerificationService>>,
    Json(request): Json<SubmitVerificationRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Verification>>), ApiError> {
    request.validate()?;
    let verification = service
        .submit(user.applicant(), &request.student_id_url)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(verification))))
}

pub async fn verification_status(
    user: AuthenticatedUser,
    State(service): State<Arc<VerificationService>>,
) -> Result<Json<ApiResponse<Verification>>, ApiError> {
    let verification = service.status(user.user_id).await?;
    Ok(Json(ApiResponse::ok(verification)))
}

pub async fn list_verifications(
    AdminUser(_admin): AdminUser,
    State(service): State<Arc<VerificationService>>,
    Query(query): Query<ListVerificationsQuery>,
) -> Result<Json<ApiResponse<Vec<Verification>>>, ApiError> {
    let verifications = service.list(query.status).await?;
    Ok(Json(ApiResponse::ok(verifications)))
}

pub async fn review_verification(
    AdminUser(admin): AdminUser,
    State(service): State<Arc<VerificationService>>,
    Path(id): Path<Uuid>,
    Json(request): Json<ReviewVerificationRequest>,
) -> Result<Json<ApiResponse<Verification>>, ApiError> {
    let verification = service.review(id, admin.user_id, request).await?;
    Ok(Json(ApiResponse::ok(verification)))
}
