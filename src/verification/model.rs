//! Student-ID verification models

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

/// Verification request submitted by a student
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Verification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub university: String,
    pub student_id_url: String,
    pub submitted_at: DateTime<Utc>,
    pub status: VerificationStatus,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<Uuid>,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "verification_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Pending,
    Approved,
    Rejected,
}

/// Who is applying, taken from the caller's token
#[derive(Debug, Clone)]
pub struct Applicant {
    pub user_id: Uuid,
    pub name: String,
    pub university: String,
}

/// Result of an atomic check-and-insert
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    Created(Verification),
    /// The user already has an open request in this status
    Existing(VerificationStatus),
}

/// Review decision as persisted
#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub status: VerificationStatus,
    pub reviewer_id: Uuid,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitVerificationRequest {
    #[validate(length(min = 1, max = 2048, message = "Student ID image URL is required"))]
    pub student_id_url: String,
}

#[derive(Debug, Deserialize)]
pub struct ReviewVerificationRequest {
    pub status: VerificationStatus,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListVerificationsQuery {
    pub status: Option<VerificationStatus>,
}
