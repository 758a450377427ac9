//! In-memory trade store used by the memory backend and tests

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::PageRequest;
use crate::trade::model::{NewTrade, Trade, TradeMessage, TradeStatus};
use crate::trade::store::TradeStore;

#[derive(Clone, Default)]
pub struct InMemoryTradeStore {
    trades: Arc<RwLock<HashMap<Uuid, Trade>>>,
}

impl InMemoryTradeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a stored trade's creation time; used to exercise expiry
    pub async fn backdate(&self, id: Uuid, created_at: DateTime<Utc>) {
        if let Some(trade) = self.trades.write().await.get_mut(&id) {
            trade.created_at = created_at;
        }
    }
}

#[async_trait]
impl TradeStore for InMemoryTradeStore {
    async fn create(&self, trade: NewTrade) -> Result<Trade, StoreError> {
        let now = Utc::now();
        let messages = trade
            .message
            .map(|message| {
                vec![TradeMessage {
                    sender_id: trade.initiator.id,
                    message,
                    created_at: now,
                }]
            })
            .unwrap_or_default();

        let trade = Trade {
            id: Uuid::new_v4(),
            initiator: trade.initiator,
            recipient: trade.recipient,
            offered_items: trade.offered_items,
            requested_items: trade.requested_items,
            status: TradeStatus::Pending,
            messages,
            created_at: now,
            updated_at: now,
        };

        self.trades.write().await.insert(trade.id, trade.clone());
        Ok(trade)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Trade>, StoreError> {
        Ok(self.trades.read().await.get(&id).cloned())
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        page: PageRequest,
    ) -> Result<(Vec<Trade>, i64), StoreError> {
        let trades = self.trades.read().await;
        let mut mine: Vec<&Trade> = trades
            .values()
            .filter(|t| t.is_participant(user_id))
            .collect();
        mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = mine.len() as i64;
        let data = mine
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .cloned()
            .collect();

        Ok((data, total))
    }

    async fn append_message(
        &self,
        id: Uuid,
        sender_id: Uuid,
        message: String,
    ) -> Result<Trade, StoreError> {
        let mut trades = self.trades.write().await;
        let trade = trades
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("Trade {}", id)))?;

        let now = Utc::now();
        trade.messages.push(TradeMessage {
            sender_id,
            message,
            created_at: now,
        });
        trade.updated_at = now;

        Ok(trade.clone())
    }

    async fn set_status(
        &self,
        id: Uuid,
        expected: TradeStatus,
        status: TradeStatus,
    ) -> Result<Option<Trade>, StoreError> {
        let mut trades = self.trades.write().await;
        match trades.get_mut(&id) {
            Some(trade) if trade.status == expected => {
                trade.status = status;
                trade.updated_at = Utc::now();
                Ok(Some(trade.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete(&self, id: Uuid, expected: TradeStatus) -> Result<bool, StoreError> {
        let mut trades = self.trades.write().await;
        match trades.get(&id) {
            Some(trade) if trade.status == expected => {
                trades.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_pending_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Trade>, StoreError> {
        let trades = self.trades.read().await;
        let mut stale: Vec<Trade> = trades
            .values()
            .filter(|t| t.status == TradeStatus::Pending && t.created_at < cutoff)
            .cloned()
            .collect();
        stale.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(stale)
    }
}
