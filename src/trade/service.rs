//! Trade lifecycle service - the proposal state machine
//!
//! Every rule about who may do what to a trade, and every coupling between
//! trade status and item availability, lives here. The stores underneath are
//! rule-free.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{ApiError, StoreError};
use crate::item::{distinct_count, ItemRegistry};
use crate::models::{PageRequest, PaginatedResponse, PartySnapshot};
use crate::trade::model::{normalize_message, CreateTradeRequest, NewTrade, Trade, TradeStatus};
use crate::trade::store::TradeStore;
use crate::user::UserDirectory;

/// Trade lifecycle errors
#[derive(Error, Debug)]
pub enum TradeError {
    #[error("{0}")]
    Validation(String),

    #[error("Offered items must belong to you and be available")]
    InvalidOfferedItems,

    #[error("Requested items must belong to the recipient and be available")]
    InvalidRequestedItems,

    #[error("Recipient {0} not found")]
    RecipientNotFound(Uuid),

    #[error("Trade {0} not found")]
    TradeNotFound(Uuid),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    ConcurrencyConflict(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<TradeError> for ApiError {
    fn from(err: TradeError) -> Self {
        match err {
            TradeError::Validation(msg) => ApiError::ValidationError(msg),
            TradeError::InvalidOfferedItems | TradeError::InvalidRequestedItems => {
                ApiError::BadRequest(err.to_string())
            }
            TradeError::RecipientNotFound(_) | TradeError::TradeNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            TradeError::Forbidden(msg) => ApiError::Forbidden(msg),
            TradeError::InvalidState(msg) => ApiError::BadRequest(msg),
            TradeError::ConcurrencyConflict(msg) => ApiError::Conflict(msg),
            TradeError::Store(e) => e.into(),
        }
    }
}

/// Tunable lifecycle rules
#[derive(Debug, Clone, Copy)]
pub struct TradePolicy {
    /// Allow `pending -> completed` without passing through `accepted`
    pub allow_direct_completion: bool,
}

impl Default for TradePolicy {
    fn default() -> Self {
        Self {
            allow_direct_completion: true,
        }
    }
}

/// Items of a finished trade whose release has not gone through yet
#[derive(Debug, Clone)]
struct PendingRelease {
    trade_id: Uuid,
    ids: Vec<Uuid>,
}

/// Trade lifecycle service
#[derive(Clone)]
pub struct TradeLifecycleService {
    trades: Arc<dyn TradeStore>,
    items: Arc<dyn ItemRegistry>,
    users: Arc<dyn UserDirectory>,
    policy: TradePolicy,
    pending_releases: Arc<Mutex<Vec<PendingRelease>>>,
}

impl TradeLifecycleService {
    pub fn new(
        trades: Arc<dyn TradeStore>,
        items: Arc<dyn ItemRegistry>,
        users: Arc<dyn UserDirectory>,
        policy: TradePolicy,
    ) -> Self {
        Self {
            trades,
            items,
            users,
            policy,
            pending_releases: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Propose a trade, reserving both sides' items
    #[instrument(skip(self, request), fields(initiator_id = %initiator.id, recipient_id = %request.recipient_id))]
    pub async fn propose(
        &self,
        initiator: PartySnapshot,
        request: CreateTradeRequest,
    ) -> Result<Trade, TradeError> {
        if initiator.id == request.recipient_id {
            return Err(TradeError::Validation(
                "Cannot propose a trade to yourself".to_string(),
            ));
        }

        if request.offered_items.is_empty()
            || distinct_count(&request.offered_items) != request.offered_items.len()
            || !self
                .items
                .verify_owned_and_available(&request.offered_items, initiator.id)
                .await?
        {
            return Err(TradeError::InvalidOfferedItems);
        }

        if request.requested_items.is_empty()
            || distinct_count(&request.requested_items) != request.requested_items.len()
            || !self
                .items
                .verify_owned_and_available(&request.requested_items, request.recipient_id)
                .await?
        {
            return Err(TradeError::InvalidRequestedItems);
        }

        let recipient = self
            .users
            .get_user(request.recipient_id)
            .await?
            .ok_or(TradeError::RecipientNotFound(request.recipient_id))?;

        if !self
            .items
            .reserve(&request.offered_items, initiator.id)
            .await?
        {
            tracing::warn!("Offered items were taken by a concurrent proposal");
            return Err(TradeError::ConcurrencyConflict(
                "Offered items are no longer available".to_string(),
            ));
        }

        match self
            .items
            .reserve(&request.requested_items, recipient.id)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                self.release(&request.offered_items).await;
                tracing::warn!("Requested items were taken by a concurrent proposal");
                return Err(TradeError::ConcurrencyConflict(
                    "Requested items are no longer available".to_string(),
                ));
            }
            Err(e) => {
                self.release(&request.offered_items).await;
                return Err(e.into());
            }
        }

        let new_trade = NewTrade {
            initiator,
            recipient: PartySnapshot {
                id: recipient.id,
                name: recipient.name,
            },
            offered_items: request.offered_items,
            requested_items: request.requested_items,
            message: request.message.as_deref().and_then(normalize_message),
        };

        match self.trades.create(new_trade.clone()).await {
            Ok(trade) => {
                tracing::info!(trade_id = %trade.id, "Trade proposed");
                Ok(trade)
            }
            Err(e) => {
                self.release(&new_trade.offered_items).await;
                self.release(&new_trade.requested_items).await;
                Err(e.into())
            }
        }
    }

    /// Move a trade to `accepted`, `rejected`, or `completed`
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        trade_id: Uuid,
        requester_id: Uuid,
        status: TradeStatus,
    ) -> Result<Trade, TradeError> {
        let trade = self
            .trades
            .get(trade_id)
            .await?
            .ok_or(TradeError::TradeNotFound(trade_id))?;

        match status {
            TradeStatus::Pending => {
                return Err(TradeError::Validation(
                    "A trade cannot be moved back to pending".to_string(),
                ));
            }
            TradeStatus::Accepted | TradeStatus::Rejected => {
                if trade.recipient.id != requester_id {
                    return Err(TradeError::Forbidden(format!(
                        "Only the recipient can mark a trade {}",
                        status
                    )));
                }
            }
            TradeStatus::Completed => {
                if !trade.is_participant(requester_id) {
                    return Err(TradeError::Forbidden(
                        "Only trade participants can complete a trade".to_string(),
                    ));
                }
            }
        }

        if !self.is_legal(trade.status, status) {
            return Err(TradeError::InvalidState(format!(
                "Cannot move trade from {} to {}",
                trade.status, status
            )));
        }

        let updated = self
            .trades
            .set_status(trade_id, trade.status, status)
            .await?
            .ok_or_else(|| {
                tracing::warn!(trade_id = %trade_id, "Trade status changed concurrently");
                TradeError::ConcurrencyConflict("Trade was modified concurrently".to_string())
            })?;

        if status == TradeStatus::Rejected {
            self.release_after_commit(trade_id, updated.all_items()).await;
        }

        tracing::info!(trade_id = %trade_id, from = %trade.status, to = %status, "Trade status updated");
        Ok(updated)
    }

    fn is_legal(&self, from: TradeStatus, to: TradeStatus) -> bool {
        if from.is_terminal() {
            return false;
        }
        match (from, to) {
            (TradeStatus::Pending, TradeStatus::Accepted)
            | (TradeStatus::Pending, TradeStatus::Rejected)
            | (TradeStatus::Accepted, TradeStatus::Completed) => true,
            (TradeStatus::Pending, TradeStatus::Completed) => self.policy.allow_direct_completion,
            _ => false,
        }
    }

    /// Append a message from one of the participants
    #[instrument(skip(self, text))]
    pub async fn add_message(
        &self,
        trade_id: Uuid,
        sender_id: Uuid,
        text: &str,
    ) -> Result<Trade, TradeError> {
        let trade = self
            .trades
            .get(trade_id)
            .await?
            .ok_or(TradeError::TradeNotFound(trade_id))?;

        if !trade.is_participant(sender_id) {
            return Err(TradeError::Forbidden(
                "Only trade participants can send messages".to_string(),
            ));
        }

        let message = normalize_message(text)
            .ok_or_else(|| TradeError::Validation("Message must not be empty".to_string()))?;

        match self.trades.append_message(trade_id, sender_id, message).await {
            Ok(trade) => Ok(trade),
            Err(StoreError::NotFound(_)) => Err(TradeError::TradeNotFound(trade_id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Withdraw a pending proposal and release its items
    #[instrument(skip(self))]
    pub async fn cancel(&self, trade_id: Uuid, requester_id: Uuid) -> Result<Trade, TradeError> {
        let trade = self
            .trades
            .get(trade_id)
            .await?
            .ok_or(TradeError::TradeNotFound(trade_id))?;

        if trade.initiator.id != requester_id {
            return Err(TradeError::Forbidden(
                "Only the initiator can cancel a trade".to_string(),
            ));
        }

        if trade.status != TradeStatus::Pending {
            return Err(TradeError::InvalidState(format!(
                "Cannot cancel a trade that is {}",
                trade.status
            )));
        }

        if !self.trades.delete(trade_id, TradeStatus::Pending).await? {
            tracing::warn!(trade_id = %trade_id, "Trade changed before it could be cancelled");
            return Err(TradeError::ConcurrencyConflict(
                "Trade was modified concurrently".to_string(),
            ));
        }

        self.release_after_commit(trade_id, trade.all_items()).await;

        tracing::info!(trade_id = %trade_id, "Trade cancelled");
        Ok(trade)
    }

    /// Fetch a trade visible to the requester
    #[instrument(skip(self))]
    pub async fn get_trade(&self, trade_id: Uuid, requester_id: Uuid) -> Result<Trade, TradeError> {
        let trade = self
            .trades
            .get(trade_id)
            .await?
            .ok_or(TradeError::TradeNotFound(trade_id))?;

        if !trade.is_participant(requester_id) {
            return Err(TradeError::Forbidden(
                "Not authorized to view this trade".to_string(),
            ));
        }

        Ok(trade)
    }

    /// Trades the user takes part in, newest first
    #[instrument(skip(self))]
    pub async fn list_mine(
        &self,
        user_id: Uuid,
        page: PageRequest,
    ) -> Result<PaginatedResponse<Trade>, TradeError> {
        let (trades, total) = self.trades.list_for_user(user_id, page).await?;
        Ok(PaginatedResponse::new(trades, total, page))
    }

    /// Reject every pending proposal created before `cutoff`.
    ///
    /// Returns the expired trades. Trades that moved on concurrently are
    /// skipped.
    #[instrument(skip(self))]
    pub async fn expire_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<Trade>, TradeError> {
        let stale = self.trades.list_pending_before(cutoff).await?;
        let mut expired = Vec::with_capacity(stale.len());

        for trade in stale {
            let rejected = match self
                .trades
                .set_status(trade.id, TradeStatus::Pending, TradeStatus::Rejected)
                .await
            {
                Ok(Some(rejected)) => rejected,
                Ok(None) => {
                    tracing::warn!(trade_id = %trade.id, "Trade changed before it could expire");
                    continue;
                }
                Err(e) => {
                    tracing::error!(trade_id = %trade.id, error = %e, "Failed to expire trade");
                    continue;
                }
            };

            self.release_after_commit(rejected.id, rejected.all_items()).await;

            tracing::info!(trade_id = %rejected.id, "Trade proposal expired");
            expired.push(rejected);
        }

        Ok(expired)
    }

    /// Release the items of a trade whose terminal write already committed.
    ///
    /// The transition stands either way. A failed release is queued for
    /// `retry_pending_releases` so the items cannot stay held forever.
    async fn release_after_commit(&self, trade_id: Uuid, ids: Vec<Uuid>) {
        if let Err(e) = self.items.set_availability(&ids, true).await {
            tracing::error!(trade_id = %trade_id, error = %e, "Failed to release trade items, queued for retry");
            self.pending_releases.lock().await.push(PendingRelease { trade_id, ids });
        }
    }

    /// Retry queued item releases. Returns how many are still outstanding.
    #[instrument(skip(self))]
    pub async fn retry_pending_releases(&self) -> usize {
        let queued = std::mem::take(&mut *self.pending_releases.lock().await);
        if queued.is_empty() {
            return 0;
        }

        let mut failed = Vec::new();
        for release in queued {
            match self.items.set_availability(&release.ids, true).await {
                Ok(()) => {
                    tracing::info!(trade_id = %release.trade_id, "Released items on retry");
                }
                Err(e) => {
                    tracing::warn!(trade_id = %release.trade_id, error = %e, "Item release still failing");
                    failed.push(release);
                }
            }
        }

        let mut pending = self.pending_releases.lock().await;
        pending.extend(failed);
        pending.len()
    }

    pub async fn pending_release_count(&self) -> usize {
        self.pending_releases.lock().await.len()
    }

    /// Best-effort release used on rollback paths; the original error wins
    async fn release(&self, ids: &[Uuid]) {
        if let Err(e) = self.items.set_availability(ids, true).await {
            tracing::error!(error = %e, "Failed to release reserved items");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{InMemoryItemRegistry, Item, ItemChanges, ItemCondition, ItemQuery, NewItem};
    use std::sync::atomic::{AtomicBool, Ordering};
    use crate::models::{OwnerSnapshot, User, UserRole};
    use crate::trade::memory::InMemoryTradeStore;
    use crate::user::InMemoryUserDirectory;
    use chrono::Duration;

    struct Fixture {
        service: TradeLifecycleService,
        items: Arc<InMemoryItemRegistry>,
        trades: Arc<InMemoryTradeStore>,
        alice: PartySnapshot,
        bob: PartySnapshot,
        alice_item: Uuid,
        bob_item: Uuid,
    }

    async fn add_user(users: &InMemoryUserDirectory, name: &str) -> PartySnapshot {
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: format!("{}@state.edu", name.to_lowercase()),
            university: "State U".to_string(),
            role: UserRole::User,
            created_at: Utc::now(),
        };
        users.insert(user.clone()).await;
        PartySnapshot {
            id: user.id,
            name: user.name,
        }
    }

    async fn add_item(items: &InMemoryItemRegistry, owner: &PartySnapshot, title: &str) -> Uuid {
        items
            .create(NewItem {
                title: title.to_string(),
                description: "Good shape".to_string(),
                condition: ItemCondition::Good,
                category: None,
                tags: vec![],
                image_url: "https://img.example/i.png".to_string(),
                owner: OwnerSnapshot {
                    id: owner.id,
                    name: owner.name.clone(),
                    university: "State U".to_string(),
                },
            })
            .await
            .unwrap()
            .id
    }

    async fn fixture(policy: TradePolicy) -> Fixture {
        let items = Arc::new(InMemoryItemRegistry::new());
        let trades = Arc::new(InMemoryTradeStore::new());
        let users = Arc::new(InMemoryUserDirectory::new());
        let alice = add_user(&users, "Alice").await;
        let bob = add_user(&users, "Bob").await;
        let alice_item = add_item(&items, &alice, "Calculator").await;
        let bob_item = add_item(&items, &bob, "Textbook").await;

        Fixture {
            service: TradeLifecycleService::new(trades.clone(), items.clone(), users, policy),
            items,
            trades,
            alice,
            bob,
            alice_item,
            bob_item,
        }
    }

    fn request(to: Uuid, offered: Vec<Uuid>, requested: Vec<Uuid>) -> CreateTradeRequest {
        CreateTradeRequest {
            recipient_id: to,
            offered_items: offered,
            requested_items: requested,
            message: Some("  Want to swap?  ".to_string()),
        }
    }

    async fn available(items: &InMemoryItemRegistry, id: Uuid) -> bool {
        items.get(id).await.unwrap().unwrap().is_available
    }

    async fn propose(f: &Fixture) -> Trade {
        f.service
            .propose(
                f.alice.clone(),
                request(f.bob.id, vec![f.alice_item], vec![f.bob_item]),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_propose_locks_items() {
        let f = fixture(TradePolicy::default()).await;
        let trade = propose(&f).await;

        assert_eq!(trade.status, TradeStatus::Pending);
        assert_eq!(trade.messages[0].message, "Want to swap?");
        assert!(!available(&f.items, f.alice_item).await);
        assert!(!available(&f.items, f.bob_item).await);
    }

    #[tokio::test]
    async fn test_propose_validation_order() {
        let f = fixture(TradePolicy::default()).await;

        let err = f
            .service
            .propose(
                f.alice.clone(),
                request(f.alice.id, vec![f.alice_item], vec![f.bob_item]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TradeError::Validation(_)));

        let err = f
            .service
            .propose(
                f.alice.clone(),
                request(f.bob.id, vec![f.alice_item, f.alice_item], vec![f.bob_item]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TradeError::InvalidOfferedItems));

        let err = f
            .service
            .propose(
                f.alice.clone(),
                request(f.bob.id, vec![f.alice_item], vec![f.bob_item, f.bob_item]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TradeError::InvalidRequestedItems));

        // Items are checked before the recipient is looked up
        let stranger = Uuid::new_v4();
        let err = f
            .service
            .propose(
                f.alice.clone(),
                request(stranger, vec![f.alice_item], vec![f.bob_item]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TradeError::InvalidRequestedItems));

        let ghost = PartySnapshot {
            id: Uuid::new_v4(),
            name: "Ghost".to_string(),
        };
        let ghost_item = add_item(&f.items, &ghost, "Lamp").await;
        let err = f
            .service
            .propose(
                f.alice.clone(),
                request(ghost.id, vec![f.alice_item], vec![ghost_item]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TradeError::RecipientNotFound(id) if id == ghost.id));
        assert!(available(&f.items, ghost_item).await);

        let err = f
            .service
            .propose(f.alice.clone(), request(f.bob.id, vec![], vec![f.bob_item]))
            .await
            .unwrap_err();
        assert!(matches!(err, TradeError::InvalidOfferedItems));

        // Offering someone else's item
        let err = f
            .service
            .propose(
                f.alice.clone(),
                request(f.bob.id, vec![f.bob_item], vec![f.alice_item]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TradeError::InvalidOfferedItems));

        let err = f
            .service
            .propose(
                f.alice.clone(),
                request(f.bob.id, vec![f.alice_item], vec![Uuid::new_v4()]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TradeError::InvalidRequestedItems));

        assert!(available(&f.items, f.alice_item).await);
        assert!(available(&f.items, f.bob_item).await);
    }

    #[tokio::test]
    async fn test_offered_items_reported_before_unknown_recipient() {
        let f = fixture(TradePolicy::default()).await;

        let err = f
            .service
            .propose(
                f.alice.clone(),
                request(Uuid::new_v4(), vec![f.bob_item], vec![Uuid::new_v4()]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TradeError::InvalidOfferedItems));
    }

    #[tokio::test]
    async fn test_no_double_hold() {
        let f = fixture(TradePolicy::default()).await;
        propose(&f).await;
        let other_bob_item = add_item(&f.items, &f.bob, "Lamp").await;

        let err = f
            .service
            .propose(
                f.alice.clone(),
                request(f.bob.id, vec![f.alice_item], vec![other_bob_item]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TradeError::InvalidOfferedItems));
        assert!(available(&f.items, other_bob_item).await);
    }

    #[tokio::test]
    async fn test_reject_releases_items() {
        let f = fixture(TradePolicy::default()).await;
        let trade = propose(&f).await;

        let rejected = f
            .service
            .update_status(trade.id, f.bob.id, TradeStatus::Rejected)
            .await
            .unwrap();
        assert_eq!(rejected.status, TradeStatus::Rejected);
        assert!(available(&f.items, f.alice_item).await);
        assert!(available(&f.items, f.bob_item).await);
    }

    #[tokio::test]
    async fn test_accept_then_complete_keeps_items_locked() {
        let f = fixture(TradePolicy::default()).await;
        let trade = propose(&f).await;

        let err = f
            .service
            .update_status(trade.id, f.alice.id, TradeStatus::Accepted)
            .await
            .unwrap_err();
        assert!(matches!(err, TradeError::Forbidden(_)));

        f.service
            .update_status(trade.id, f.bob.id, TradeStatus::Accepted)
            .await
            .unwrap();
        let done = f
            .service
            .update_status(trade.id, f.alice.id, TradeStatus::Completed)
            .await
            .unwrap();
        assert_eq!(done.status, TradeStatus::Completed);
        assert!(!available(&f.items, f.alice_item).await);
        assert!(!available(&f.items, f.bob_item).await);

        let err = f
            .service
            .update_status(trade.id, f.bob.id, TradeStatus::Rejected)
            .await
            .unwrap_err();
        assert!(matches!(err, TradeError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_pending_is_not_a_target() {
        let f = fixture(TradePolicy::default()).await;
        let trade = propose(&f).await;
        let err = f
            .service
            .update_status(trade.id, f.bob.id, TradeStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, TradeError::Validation(_)));
    }

    #[tokio::test]
    async fn test_direct_completion_policy() {
        let f = fixture(TradePolicy::default()).await;
        let trade = propose(&f).await;
        f.service
            .update_status(trade.id, f.bob.id, TradeStatus::Completed)
            .await
            .unwrap();

        let f = fixture(TradePolicy {
            allow_direct_completion: false,
        })
        .await;
        let trade = propose(&f).await;
        let err = f
            .service
            .update_status(trade.id, f.bob.id, TradeStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, TradeError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_cancel_rules() {
        let f = fixture(TradePolicy::default()).await;
        let trade = propose(&f).await;

        let err = f.service.cancel(trade.id, f.bob.id).await.unwrap_err();
        assert!(matches!(err, TradeError::Forbidden(_)));

        f.service.cancel(trade.id, f.alice.id).await.unwrap();
        assert!(available(&f.items, f.alice_item).await);
        assert!(available(&f.items, f.bob_item).await);

        let err = f.service.cancel(trade.id, f.alice.id).await.unwrap_err();
        assert!(matches!(err, TradeError::TradeNotFound(_)));
    }

    #[tokio::test]
    async fn test_cancel_after_reject_is_invalid_state() {
        let f = fixture(TradePolicy::default()).await;
        let trade = propose(&f).await;
        f.service
            .update_status(trade.id, f.bob.id, TradeStatus::Rejected)
            .await
            .unwrap();

        let err = f.service.cancel(trade.id, f.alice.id).await.unwrap_err();
        assert!(matches!(err, TradeError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_messages() {
        let f = fixture(TradePolicy::default()).await;
        let trade = propose(&f).await;

        let err = f
            .service
            .add_message(trade.id, Uuid::new_v4(), "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, TradeError::Forbidden(_)));

        let err = f
            .service
            .add_message(trade.id, f.bob.id, "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, TradeError::Validation(_)));

        let updated = f
            .service
            .add_message(trade.id, f.bob.id, " Deal ")
            .await
            .unwrap();
        assert_eq!(updated.messages.len(), 2);
        assert_eq!(updated.messages[1].message, "Deal");
        assert_eq!(updated.messages[1].sender_id, f.bob.id);
    }

    #[tokio::test]
    async fn test_get_and_list_restricted_to_participants() {
        let f = fixture(TradePolicy::default()).await;
        let trade = propose(&f).await;

        assert!(f.service.get_trade(trade.id, f.bob.id).await.is_ok());
        let err = f
            .service
            .get_trade(trade.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, TradeError::Forbidden(_)));

        let page = f
            .service
            .list_mine(f.bob.id, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        let page = f
            .service
            .list_mine(Uuid::new_v4(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_expire_stale_releases_items() {
        let f = fixture(TradePolicy::default()).await;
        let trade = propose(&f).await;
        f.trades
            .backdate(trade.id, Utc::now() - Duration::hours(72))
            .await;

        let expired = f
            .service
            .expire_stale(Utc::now() - Duration::hours(48))
            .await
            .unwrap();
        assert_eq!(expired.iter().map(|t| t.id).collect::<Vec<_>>(), vec![trade.id]);
        assert_eq!(expired[0].status, TradeStatus::Rejected);
        assert!(available(&f.items, f.alice_item).await);

        let trade = f.service.get_trade(trade.id, f.alice.id).await.unwrap();
        assert_eq!(trade.status, TradeStatus::Rejected);
    }

    /// Registry whose releases can be made to fail
    struct FlakyRegistry {
        inner: Arc<InMemoryItemRegistry>,
        fail_release: AtomicBool,
    }

    #[async_trait::async_trait]
    impl ItemRegistry for FlakyRegistry {
        async fn create(&self, item: NewItem) -> Result<Item, StoreError> {
            self.inner.create(item).await
        }

        async fn get(&self, id: Uuid) -> Result<Option<Item>, StoreError> {
            self.inner.get(id).await
        }

        async fn increment_views(&self, id: Uuid) -> Result<(), StoreError> {
            self.inner.increment_views(id).await
        }

        async fn update(&self, id: Uuid, changes: ItemChanges) -> Result<Option<Item>, StoreError> {
            self.inner.update(id, changes).await
        }

        async fn delete_if_available(&self, id: Uuid) -> Result<bool, StoreError> {
            self.inner.delete_if_available(id).await
        }

        async fn find_available(
            &self,
            query: &ItemQuery,
            page: PageRequest,
        ) -> Result<(Vec<Item>, i64), StoreError> {
            self.inner.find_available(query, page).await
        }

        async fn verify_owned_and_available(
            &self,
            ids: &[Uuid],
            owner_id: Uuid,
        ) -> Result<bool, StoreError> {
            self.inner.verify_owned_and_available(ids, owner_id).await
        }

        async fn set_availability(&self, ids: &[Uuid], value: bool) -> Result<(), StoreError> {
            if value && self.fail_release.load(Ordering::SeqCst) {
                return Err(StoreError::Database("connection reset".to_string()));
            }
            self.inner.set_availability(ids, value).await
        }

        async fn reserve(&self, ids: &[Uuid], owner_id: Uuid) -> Result<bool, StoreError> {
            self.inner.reserve(ids, owner_id).await
        }

        async fn toggle_favorite(&self, id: Uuid, user_id: Uuid) -> Result<Option<Item>, StoreError> {
            self.inner.toggle_favorite(id, user_id).await
        }
    }

    #[tokio::test]
    async fn test_failed_release_is_queued_and_retried() {
        let f = fixture(TradePolicy::default()).await;
        let flaky = Arc::new(FlakyRegistry {
            inner: f.items.clone(),
            fail_release: AtomicBool::new(false),
        });
        let users = Arc::new(InMemoryUserDirectory::new());
        for party in [&f.alice, &f.bob] {
            users
                .insert(User {
                    id: party.id,
                    name: party.name.clone(),
                    email: format!("{}@state.edu", party.name.to_lowercase()),
                    university: "State U".to_string(),
                    role: UserRole::User,
                    created_at: Utc::now(),
                })
                .await;
        }
        let service = TradeLifecycleService::new(
            f.trades.clone(),
            flaky.clone(),
            users,
            TradePolicy::default(),
        );

        let trade = service
            .propose(
                f.alice.clone(),
                request(f.bob.id, vec![f.alice_item], vec![f.bob_item]),
            )
            .await
            .unwrap();

        flaky.fail_release.store(true, Ordering::SeqCst);
        let rejected = service
            .update_status(trade.id, f.bob.id, TradeStatus::Rejected)
            .await
            .unwrap();
        assert_eq!(rejected.status, TradeStatus::Rejected);
        assert!(!available(&f.items, f.alice_item).await);
        assert_eq!(service.pending_release_count().await, 1);

        // Still failing: stays queued
        assert_eq!(service.retry_pending_releases().await, 1);

        flaky.fail_release.store(false, Ordering::SeqCst);
        assert_eq!(service.retry_pending_releases().await, 0);
        assert!(available(&f.items, f.alice_item).await);
        assert!(available(&f.items, f.bob_item).await);
    }

    #[test]
    fn test_error_mapping() {
        let api: ApiError = TradeError::ConcurrencyConflict("x".to_string()).into();
        assert_eq!(api.error_code(), "CONFLICT");
        let api: ApiError = TradeError::InvalidState("x".to_string()).into();
        assert_eq!(api.error_code(), "BAD_REQUEST");
        let api: ApiError = TradeError::RecipientNotFound(Uuid::nil()).into();
        assert_eq!(api.error_code(), "NOT_FOUND");
    }
}
