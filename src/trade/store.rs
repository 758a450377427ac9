//! Trade proposal store - persistence for trades and their message logs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::PageRequest;
use crate::trade::model::{
    NewTrade, Trade, TradeMessage, TradeMessageRow, TradeRow, TradeStatus,
};

/// Storage operations over trade proposals.
///
/// The store enforces no ownership, availability, or transition rules. Status
/// writes and deletes are guarded by the caller's expected current status so
/// that racing updates resolve to a single winner.
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Persist a new trade in `pending`
    async fn create(&self, trade: NewTrade) -> Result<Trade, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Trade>, StoreError>;

    /// Trades where the user is initiator or recipient, newest first
    async fn list_for_user(
        &self,
        user_id: Uuid,
        page: PageRequest,
    ) -> Result<(Vec<Trade>, i64), StoreError>;

    /// Fails with `StoreError::NotFound` when the trade is absent
    async fn append_message(
        &self,
        id: Uuid,
        sender_id: Uuid,
        message: String,
    ) -> Result<Trade, StoreError>;

    /// Returns `None` if the trade is absent or no longer in `expected`
    async fn set_status(
        &self,
        id: Uuid,
        expected: TradeStatus,
        status: TradeStatus,
    ) -> Result<Option<Trade>, StoreError>;

    /// Returns false if the trade is absent or no longer in `expected`
    async fn delete(&self, id: Uuid, expected: TradeStatus) -> Result<bool, StoreError>;

    /// Pending trades created strictly before `cutoff`, oldest first
    async fn list_pending_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Trade>, StoreError>;
}

const TRADE_COLUMNS: &str = "id, initiator_id, initiator_name, recipient_id, recipient_name, \
     offered_items, requested_items, status, created_at, updated_at";

/// PostgreSQL-backed trade store
#[derive(Clone)]
pub struct PgTradeStore {
    db_pool: PgPool,
}

impl PgTradeStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// Load message logs for a batch of rows and assemble trades in row order
    async fn attach_messages(&self, rows: Vec<TradeRow>) -> Result<Vec<Trade>, StoreError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let message_rows = sqlx::query_as::<_, TradeMessageRow>(
            r#"
            SELECT trade_id, sender_id, message, created_at
            FROM trade_messages
            WHERE trade_id = ANY($1)
            ORDER BY id ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.db_pool)
        .await?;

        let mut by_trade: HashMap<Uuid, Vec<TradeMessage>> = HashMap::new();
        for row in message_rows {
            by_trade.entry(row.trade_id).or_default().push(row.into());
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let messages = by_trade.remove(&row.id).unwrap_or_default();
                row.into_trade(messages)
            })
            .collect())
    }

    async fn attach_one(&self, row: TradeRow) -> Result<Trade, StoreError> {
        let trade_id = row.id;
        self.attach_messages(vec![row])
            .await?
            .pop()
            .ok_or_else(|| StoreError::NotFound(format!("Trade {}", trade_id)))
    }
}

#[async_trait]
impl TradeStore for PgTradeStore {
    async fn create(&self, trade: NewTrade) -> Result<Trade, StoreError> {
        let now = Utc::now();
        let mut tx = self.db_pool.begin().await?;

        let row = sqlx::query_as::<_, TradeRow>(&format!(
            r#"
            INSERT INTO trades (
                id, initiator_id, initiator_name, recipient_id, recipient_name,
                offered_items, requested_items, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8, $8)
            RETURNING {}
            "#,
            TRADE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(trade.initiator.id)
        .bind(&trade.initiator.name)
        .bind(trade.recipient.id)
        .bind(&trade.recipient.name)
        .bind(&trade.offered_items)
        .bind(&trade.requested_items)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let mut messages = Vec::new();
        if let Some(message) = trade.message {
            sqlx::query(
                r#"
                INSERT INTO trade_messages (trade_id, sender_id, message, created_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(row.id)
            .bind(trade.initiator.id)
            .bind(&message)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            messages.push(TradeMessage {
                sender_id: trade.initiator.id,
                message,
                created_at: now,
            });
        }

        tx.commit().await?;
        Ok(row.into_trade(messages))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Trade>, StoreError> {
        let row = sqlx::query_as::<_, TradeRow>(&format!(
            "SELECT {} FROM trades WHERE id = $1",
            TRADE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db_pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.attach_one(row).await?)),
            None => Ok(None),
        }
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        page: PageRequest,
    ) -> Result<(Vec<Trade>, i64), StoreError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM trades WHERE initiator_id = $1 OR recipient_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.db_pool)
        .await?;

        let rows = sqlx::query_as::<_, TradeRow>(&format!(
            r#"
            SELECT {} FROM trades
            WHERE initiator_id = $1 OR recipient_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            TRADE_COLUMNS
        ))
        .bind(user_id)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(&self.db_pool)
        .await?;

        Ok((self.attach_messages(rows).await?, total))
    }

    async fn append_message(
        &self,
        id: Uuid,
        sender_id: Uuid,
        message: String,
    ) -> Result<Trade, StoreError> {
        let now = Utc::now();
        let mut tx = self.db_pool.begin().await?;

        let row = sqlx::query_as::<_, TradeRow>(&format!(
            "UPDATE trades SET updated_at = $2 WHERE id = $1 RETURNING {}",
            TRADE_COLUMNS
        ))
        .bind(id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("Trade {}", id)))?;

        sqlx::query(
            r#"
            INSERT INTO trade_messages (trade_id, sender_id, message, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(id)
        .bind(sender_id)
        .bind(&message)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.attach_one(row).await
    }

    async fn set_status(
        &self,
        id: Uuid,
        expected: TradeStatus,
        status: TradeStatus,
    ) -> Result<Option<Trade>, StoreError> {
        let row = sqlx::query_as::<_, TradeRow>(&format!(
            r#"
            UPDATE trades SET status = $3, updated_at = $4
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            TRADE_COLUMNS
        ))
        .bind(id)
        .bind(expected)
        .bind(status)
        .bind(Utc::now())
        .fetch_optional(&self.db_pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.attach_one(row).await?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, id: Uuid, expected: TradeStatus) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM trades WHERE id = $1 AND status = $2")
            .bind(id)
            .bind(expected)
            .execute(&self.db_pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_pending_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Trade>, StoreError> {
        let rows = sqlx::query_as::<_, TradeRow>(&format!(
            r#"
            SELECT {} FROM trades
            WHERE status = 'pending' AND created_at < $1
            ORDER BY created_at ASC
            "#,
            TRADE_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(&self.db_pool)
        .await?;

        self.attach_messages(rows).await
    }
}
