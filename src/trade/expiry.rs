//! Background trade maintenance: proposal expiry and release retries

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::trade::model::TradeEvent;
use crate::trade::service::TradeLifecycleService;
use crate::websocket::WsState;

/// Periodically reject pending proposals older than `ttl` and broadcast
/// an `Expired` event to both parties of each
pub async fn expiry_sweeper(
    service: Arc<TradeLifecycleService>,
    ws_state: WsState,
    ttl: chrono::Duration,
    interval: Duration,
) {
    tracing::info!(
        ttl_hours = ttl.num_hours(),
        interval_secs = interval.as_secs(),
        "Starting trade expiry sweeper"
    );

    loop {
        tokio::time::sleep(interval).await;

        match service.expire_stale(Utc::now() - ttl).await {
            Ok(expired) => {
                for trade in expired {
                    ws_state
                        .broadcast_event(
                            TradeEvent::Expired { trade_id: trade.id },
                            trade.participants(),
                        )
                        .await;
                }
            }
            Err(e) => {
                tracing::error!("Error expiring stale trades: {}", e);
            }
        }
    }
}

/// Periodically retry item releases that failed after a trade finished
pub async fn release_retrier(service: Arc<TradeLifecycleService>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;

        let outstanding = service.retry_pending_releases().await;
        if outstanding > 0 {
            tracing::warn!(outstanding, "Item releases still pending");
        }
    }
}
