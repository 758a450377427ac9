//! In-memory verification store

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::verification::model::{
    Applicant, ReviewOutcome, SubmitOutcome, Verification, VerificationStatus,
};
use crate::verification::store::VerificationStore;

#[derive(Clone, Default)]
pub struct InMemoryVerificationStore {
    verifications: Arc<RwLock<HashMap<Uuid, Verification>>>,
}

impl InMemoryVerificationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(list: &mut [Verification]) {
    list.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
}

#[async_trait]
impl VerificationStore for InMemoryVerificationStore {
    async fn submit(
        &self,
        applicant: Applicant,
        student_id_url: String,
    ) -> Result<SubmitOutcome, StoreError> {
        let mut verifications = self.verifications.write().await;

        let open = verifications.values().find(|v| {
            v.user_id == applicant.user_id
                && matches!(
                    v.status,
                    VerificationStatus::Pending | VerificationStatus::Approved
                )
        });
        if let Some(existing) = open {
            return Ok(SubmitOutcome::Existing(existing.status));
        }

        let verification = Verification {
            id: Uuid::new_v4(),
            user_id: applicant.user_id,
            user_name: applicant.name,
            university: applicant.university,
            student_id_url,
            submitted_at: Utc::now(),
            status: VerificationStatus::Pending,
            reviewed_at: None,
            reviewed_by: None,
            rejection_reason: None,
        };
        verifications.insert(verification.id, verification.clone());

        Ok(SubmitOutcome::Created(verification))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Verification>, StoreError> {
        Ok(self.verifications.read().await.get(&id).cloned())
    }

    async fn latest_for_user(&self, user_id: Uuid) -> Result<Option<Verification>, StoreError> {
        let verifications = self.verifications.read().await;
        Ok(verifications
            .values()
            .filter(|v| v.user_id == user_id)
            .max_by_key(|v| v.submitted_at)
            .cloned())
    }

    async fn list(
        &self,
        status: Option<VerificationStatus>,
    ) -> Result<Vec<Verification>, StoreError> {
        let verifications = self.verifications.read().await;
        let mut found: Vec<Verification> = verifications
            .values()
            .filter(|v| status.map_or(true, |s| v.status == s))
            .cloned()
            .collect();
        newest_first(&mut found);
        Ok(found)
    }

    async fn review(
        &self,
        id: Uuid,
        outcome: ReviewOutcome,
    ) -> Result<Option<Verification>, StoreError> {
        let mut verifications = self.verifications.write().await;
        match verifications.get_mut(&id) {
            Some(v) if v.status == VerificationStatus::Pending => {
                v.status = outcome.status;
                v.reviewed_at = Some(Utc::now());
                v.reviewed_by = Some(outcome.reviewer_id);
                v.rejection_reason = outcome.rejection_reason;
                Ok(Some(v.clone()))
            }
            _ => Ok(None),
        }
    }
}
