//! Authentication extractors
//!
//! Verify the bearer token on each request and expose the caller's identity
//! as taken from its claims.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{verify_token, JwtError, JwtKeys};
use crate::models::{OwnerSnapshot, PartySnapshot, UserRole};
use crate::verification::Applicant;

/// Authenticated user extracted from JWT token
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub name: String,
    pub university: String,
    pub role: UserRole,
}

impl AuthenticatedUser {
    pub fn party(&self) -> PartySnapshot {
        PartySnapshot {
            id: self.user_id,
            name: self.name.clone(),
        }
    }

    pub fn owner(&self) -> OwnerSnapshot {
        OwnerSnapshot {
            id: self.user_id,
            name: self.name.clone(),
            university: self.university.clone(),
        }
    }

    pub fn applicant(&self) -> Applicant {
        Applicant {
            user_id: self.user_id,
            name: self.name.clone(),
            university: self.university.clone(),
        }
    }
}

/// Error response for authentication failures
#[derive(Debug, Serialize)]
struct AuthError {
    #[serde(skip)]
    status: StatusCode,
    error: AuthErrorDetails,
}

#[derive(Debug, Serialize)]
struct AuthErrorDetails {
    code: String,
    message: String,
}

impl AuthError {
    fn unauthorized(code: &str, message: &str) -> Self {
        Self::with_status(StatusCode::UNAUTHORIZED, code, message)
    }

    fn with_status(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            error: AuthErrorDetails {
                code: code.to_string(),
                message: message.to_string(),
            },
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Extractor for authenticated users
///
/// ```rust,ignore
/// async fn protected_handler(user: AuthenticatedUser) -> impl IntoResponse {
///     format!("Hello, {}", user.name)
/// }
/// ```
#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<JwtKeys>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    AuthError::unauthorized(
                        "MISSING_TOKEN",
                        "Authorization header with Bearer token required",
                    )
                    .into_response()
                })?;

        let keys = Arc::<JwtKeys>::from_ref(state);

        let claims = verify_token(bearer.token(), keys.jwt_secret()).map_err(|e| {
            let (code, message) = match e {
                JwtError::TokenExpired => ("TOKEN_EXPIRED", "Token has expired"),
                _ => ("INVALID_TOKEN", "Invalid token"),
            };
            AuthError::unauthorized(code, message).into_response()
        })?;

        let user_id = claims.user_id().map_err(|_| {
            AuthError::unauthorized("INVALID_TOKEN", "Invalid user ID in token").into_response()
        })?;

        let role = claims.role().map_err(|_| {
            AuthError::unauthorized("INVALID_TOKEN", "Invalid role in token").into_response()
        })?;

        Ok(AuthenticatedUser {
            user_id,
            name: claims.name,
            university: claims.university,
            role,
        })
    }
}

/// Extractor that additionally requires the `admin` role claim
pub struct AdminUser(pub AuthenticatedUser);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    Arc<JwtKeys>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;

        if user.role != UserRole::Admin {
            return Err(AuthError::with_status(
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "Admin access required",
            )
            .into_response());
        }

        Ok(AdminUser(user))
    }
}
