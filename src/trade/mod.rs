//! Trade proposals: lifecycle, storage, and expiry

mod expiry;
mod memory;
mod model;
mod service;
mod store;

pub use expiry::{expiry_sweeper, release_retrier};
pub use memory::InMemoryTradeStore;
pub use model::{
    normalize_message, AddMessageRequest, CreateTradeRequest, NewTrade, Trade, TradeEvent,
    TradeMessage, TradeStatus, UpdateTradeStatusRequest, MAX_MESSAGE_CHARS,
};
pub use service::{TradeError, TradeLifecycleService, TradePolicy};
pub use store::{PgTradeStore, TradeStore};
