//! Verification service - student-ID submission and admin review

use std::sync::Arc;

use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{ApiError, StoreError};
use crate::verification::model::{
    Applicant, ReviewOutcome, ReviewVerificationRequest, SubmitOutcome, Verification,
    VerificationStatus,
};
use crate::verification::store::VerificationStore;

#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("You already have a pending verification request")]
    AlreadyPending,

    #[error("You are already verified")]
    AlreadyVerified,

    #[error("This verification request has already been reviewed")]
    AlreadyReviewed,

    #[error("No verification request found")]
    NotFound,

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<VerificationError> for ApiError {
    fn from(err: VerificationError) -> Self {
        match err {
            VerificationError::AlreadyPending
            | VerificationError::AlreadyVerified
            | VerificationError::AlreadyReviewed => ApiError::BadRequest(err.to_string()),
            VerificationError::NotFound => ApiError::NotFound(err.to_string()),
            VerificationError::Validation(msg) => ApiError::ValidationError(msg),
            VerificationError::Store(e) => e.into(),
        }
    }
}

#[derive(Clone)]
pub struct VerificationService {
    store: Arc<dyn VerificationStore>,
}

impl VerificationService {
    pub fn new(store: Arc<dyn VerificationStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, applicant, student_id_url), fields(user_id = %applicant.user_id))]
    pub async fn submit(
        &self,
        applicant: Applicant,
        student_id_url: &str,
    ) -> Result<Verification, VerificationError> {
        let url = student_id_url.trim();
        if url.is_empty() {
            return Err(VerificationError::Validation(
                "Student ID image URL is required".to_string(),
            ));
        }

        match self.store.submit(applicant, url.to_string()).await? {
            SubmitOutcome::Created(verification) => {
                tracing::info!(verification_id = %verification.id, "Verification submitted");
                Ok(verification)
            }
            SubmitOutcome::Existing(VerificationStatus::Approved) => {
                Err(VerificationError::AlreadyVerified)
            }
            SubmitOutcome::Existing(_) => Err(VerificationError::AlreadyPending),
        }
    }

    /// Latest request for the user
    #[instrument(skip(self))]
    pub async fn status(&self, user_id: Uuid) -> Result<Verification, VerificationError> {
        self.store
            .latest_for_user(user_id)
            .await?
            .ok_or(VerificationError::NotFound)
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        status: Option<VerificationStatus>,
    ) -> Result<Vec<Verification>, VerificationError> {
        Ok(self.store.list(status).await?)
    }

    #[instrument(skip(self, request))]
    pub async fn review(
        &self,
        id: Uuid,
        admin_id: Uuid,
        request: ReviewVerificationRequest,
    ) -> Result<Verification, VerificationError> {
        let rejection_reason = match request.status {
            VerificationStatus::Approved => None,
            VerificationStatus::Rejected => {
                let reason = request
                    .rejection_reason
                    .as_deref()
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .ok_or_else(|| {
                        VerificationError::Validation(
                            "Rejection reason is required".to_string(),
                        )
                    })?;
                Some(reason.to_string())
            }
            VerificationStatus::Pending => {
                return Err(VerificationError::Validation(
                    "Review status must be approved or rejected".to_string(),
                ));
            }
        };

        let existing = self
            .store
            .get(id)
            .await?
            .ok_or(VerificationError::NotFound)?;
        if existing.status != VerificationStatus::Pending {
            return Err(VerificationError::AlreadyReviewed);
        }

        let outcome = ReviewOutcome {
            status: request.status,
            reviewer_id: admin_id,
            rejection_reason,
        };

        let reviewed = self.store.review(id, outcome).await?.ok_or_else(|| {
            tracing::warn!(verification_id = %id, "Verification reviewed concurrently");
            VerificationError::AlreadyReviewed
        })?;

        tracing::info!(verification_id = %id, status = ?reviewed.status, "Verification reviewed");
        Ok(reviewed)
    }
}
