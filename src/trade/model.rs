//! Trade proposal models and data structures for UniGoods backend

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::models::PartySnapshot;

/// Longest message body kept on a trade; longer input is truncated
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Trade proposal between two users
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Trade {
    pub id: Uuid,
    pub initiator: PartySnapshot,
    pub recipient: PartySnapshot,
    pub offered_items: Vec<Uuid>,
    pub requested_items: Vec<Uuid>,
    pub status: TradeStatus,
    pub messages: Vec<TradeMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trade {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.initiator.id == user_id || self.recipient.id == user_id
    }

    pub fn participants(&self) -> [Uuid; 2] {
        [self.initiator.id, self.recipient.id]
    }

    /// Offered followed by requested ids
    pub fn all_items(&self) -> Vec<Uuid> {
        self.offered_items
            .iter()
            .chain(self.requested_items.iter())
            .copied()
            .collect()
    }
}

/// Trade status
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "trade_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Pending => "pending",
            TradeStatus::Accepted => "accepted",
            TradeStatus::Rejected => "rejected",
            TradeStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TradeStatus::Rejected | TradeStatus::Completed)
    }
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry in a trade's append-only message log
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TradeMessage {
    pub sender_id: Uuid,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Flat row as stored in the `trades` table
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TradeRow {
    pub id: Uuid,
    pub initiator_id: Uuid,
    pub initiator_name: String,
    pub recipient_id: Uuid,
    pub recipient_name: String,
    pub offered_items: Vec<Uuid>,
    pub requested_items: Vec<Uuid>,
    pub status: TradeStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TradeRow {
    pub fn into_trade(self, messages: Vec<TradeMessage>) -> Trade {
        Trade {
            id: self.id,
            initiator: PartySnapshot {
                id: self.initiator_id,
                name: self.initiator_name,
            },
            recipient: PartySnapshot {
                id: self.recipient_id,
                name: self.recipient_name,
            },
            offered_items: self.offered_items,
            requested_items: self.requested_items,
            status: self.status,
            messages,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Row from the `trade_messages` table
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TradeMessageRow {
    pub trade_id: Uuid,
    pub sender_id: Uuid,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl From<TradeMessageRow> for TradeMessage {
    fn from(row: TradeMessageRow) -> Self {
        Self {
            sender_id: row.sender_id,
            message: row.message,
            created_at: row.created_at,
        }
    }
}

/// Validated input for persisting a new proposal
#[derive(Debug, Clone)]
pub struct NewTrade {
    pub initiator: PartySnapshot,
    pub recipient: PartySnapshot,
    pub offered_items: Vec<Uuid>,
    pub requested_items: Vec<Uuid>,
    /// Opening message, already trimmed and capped
    pub message: Option<String>,
}

/// Request DTO for proposing a trade
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTradeRequest {
    pub recipient_id: Uuid,
    #[validate(length(min = 1, message = "At least one offered item is required"))]
    pub offered_items: Vec<Uuid>,
    #[validate(length(min = 1, message = "At least one requested item is required"))]
    pub requested_items: Vec<Uuid>,
    pub message: Option<String>,
}

/// Request DTO for moving a trade to a new status
#[derive(Debug, Deserialize)]
pub struct UpdateTradeStatusRequest {
    pub status: TradeStatus,
}

/// Request DTO for appending a message
#[derive(Debug, Deserialize, Validate)]
pub struct AddMessageRequest {
    #[validate(length(min = 1, message = "Message is required"))]
    pub message: String,
}

/// Trade event types for real-time updates
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum TradeEvent {
    Proposed {
        trade_id: Uuid,
        initiator_id: Uuid,
        recipient_id: Uuid,
    },
    StatusChanged {
        trade_id: Uuid,
        status: TradeStatus,
    },
    Cancelled {
        trade_id: Uuid,
    },
    MessageAdded {
        trade_id: Uuid,
        sender_id: Uuid,
    },
    Expired {
        trade_id: Uuid,
    },
}

impl TradeEvent {
    pub fn trade_id(&self) -> Uuid {
        match self {
            TradeEvent::Proposed { trade_id, .. }
            | TradeEvent::StatusChanged { trade_id, .. }
            | TradeEvent::Cancelled { trade_id }
            | TradeEvent::MessageAdded { trade_id, .. }
            | TradeEvent::Expired { trade_id } => *trade_id,
        }
    }
}

/// Trim and cap a message body; `None` when nothing is left
pub fn normalize_message(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_MESSAGE_CHARS).collect())
}
