//! Verification store - persistence for verification requests

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::verification::model::{
    Applicant, ReviewOutcome, SubmitOutcome, Verification, VerificationStatus,
};

#[async_trait]
pub trait VerificationStore: Send + Sync {
    /// Insert a pending request unless the user already has a pending or
    /// approved one. The check and the insert are atomic.
    async fn submit(
        &self,
        applicant: Applicant,
        student_id_url: String,
    ) -> Result<SubmitOutcome, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Verification>, StoreError>;

    /// Most recently submitted request for the user
    async fn latest_for_user(&self, user_id: Uuid) -> Result<Option<Verification>, StoreError>;

    /// Newest first
    async fn list(
        &self,
        status: Option<VerificationStatus>,
    ) -> Result<Vec<Verification>, StoreError>;

    /// Record a review if the request is still pending; `None` otherwise
    async fn review(
        &self,
        id: Uuid,
        outcome: ReviewOutcome,
    ) -> Result<Option<Verification>, StoreError>;
}

/// PostgreSQL-backed verification store
#[derive(Clone)]
pub struct PgVerificationStore {
    db_pool: PgPool,
}

impl PgVerificationStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl VerificationStore for PgVerificationStore {
    async fn submit(
        &self,
        applicant: Applicant,
        student_id_url: String,
    ) -> Result<SubmitOutcome, StoreError> {
        // The partial unique index on open requests arbitrates concurrent submits
        let created = sqlx::query_as::<_, Verification>(
            r#"
            INSERT INTO verifications (
                id, user_id, user_name, university, student_id_url, submitted_at, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'pending')
            ON CONFLICT (user_id) WHERE status IN ('pending', 'approved') DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(applicant.user_id)
        .bind(&applicant.name)
        .bind(&applicant.university)
        .bind(&student_id_url)
        .bind(Utc::now())
        .fetch_optional(&self.db_pool)
        .await?;

        if let Some(verification) = created {
            return Ok(SubmitOutcome::Created(verification));
        }

        let status: VerificationStatus = sqlx::query_scalar(
            r#"
            SELECT status FROM verifications
            WHERE user_id = $1 AND status IN ('pending', 'approved')
            LIMIT 1
            "#,
        )
        .bind(applicant.user_id)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(SubmitOutcome::Existing(status))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Verification>, StoreError> {
        let verification =
            sqlx::query_as::<_, Verification>("SELECT * FROM verifications WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.db_pool)
                .await?;

        Ok(verification)
    }

    async fn latest_for_user(&self, user_id: Uuid) -> Result<Option<Verification>, StoreError> {
        let verification = sqlx::query_as::<_, Verification>(
            r#"
            SELECT * FROM verifications
            WHERE user_id = $1
            ORDER BY submitted_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(verification)
    }

    async fn list(
        &self,
        status: Option<VerificationStatus>,
    ) -> Result<Vec<Verification>, StoreError> {
        let verifications = sqlx::query_as::<_, Verification>(
            r#"
            SELECT * FROM verifications
            WHERE ($1::verification_status IS NULL OR status = $1)
            ORDER BY submitted_at DESC
            "#,
        )
        .bind(status)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(verifications)
    }

    async fn review(
        &self,
        id: Uuid,
        outcome: ReviewOutcome,
    ) -> Result<Option<Verification>, StoreError> {
        let verification = sqlx::query_as::<_, Verification>(
            r#"
            UPDATE verifications SET
                status = $2,
                reviewed_at = $3,
                reviewed_by = $4,
                rejection_reason = $5
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(outcome.status)
        .bind(Utc::now())
        .bind(outcome.reviewer_id)
        .bind(outcome.rejection_reason)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(verification)
    }
}
