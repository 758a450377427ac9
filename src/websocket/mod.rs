//! WebSocket feed of trade events

use axum::{
    async_trait,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        FromRef, FromRequestParts, Query, State,
    },
    http::{header, request::Parts},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use uuid::Uuid;

use crate::auth::{verify_token, JwtKeys};
use crate::error::ApiError;
use crate::trade::TradeEvent;

/// An event together with the users allowed to see it
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedEvent {
    pub audience: [Uuid; 2],
    pub event: TradeEvent,
}

#[derive(Debug)]
struct Client {
    user_id: Uuid,
    /// Trade ids the client asked for; empty means all of the user's trades
    subscriptions: HashSet<Uuid>,
}

/// WebSocket server state
#[derive(Clone)]
pub struct WsState {
    pub tx: broadcast::Sender<ScopedEvent>,
    clients: Arc<RwLock<HashMap<Uuid, Client>>>,
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Caller of the event feed. Browsers cannot set headers on an upgrade
/// request, so a `?token=` query parameter is accepted as well as a bearer
/// header.
#[derive(Debug, Clone, Copy)]
pub struct FeedUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for FeedUser
where
    Arc<JwtKeys>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let bearer = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|v| v.trim().to_string());

        let token = match bearer {
            Some(token) => token,
            None => Query::<TokenQuery>::from_request_parts(parts, state)
                .await
                .ok()
                .and_then(|Query(q)| q.token)
                .ok_or_else(|| ApiError::Unauthorized("Token required".to_string()))?,
        };

        let keys = Arc::<JwtKeys>::from_ref(state);
        let user_id = verify_token(&token, keys.jwt_secret())
            .and_then(|claims| claims.user_id())
            .map_err(|e| ApiError::Unauthorized(e.to_string()))?;

        Ok(FeedUser(user_id))
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ClientMessage {
    Subscribe { trade_ids: Vec<Uuid> },
    Unsubscribe { trade_ids: Vec<Uuid> },
    Ping,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ServerMessage {
    Event { event: TradeEvent },
    Subscribed { trade_ids: Vec<Uuid> },
    Unsubscribed { trade_ids: Vec<Uuid> },
    Pong,
    Error { message: String },
}

impl Default for WsState {
    fn default() -> Self {
        Self::new()
    }
}

impl WsState {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(100);
        Self {
            tx,
            clients: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Fan an event out to the connected clients of `audience`. Having no
    /// listeners is not an error.
    pub async fn broadcast_event(&self, event: TradeEvent, audience: [Uuid; 2]) {
        if self.tx.receiver_count() == 0 {
            tracing::debug!(trade_id = %event.trade_id(), "No WebSocket listeners for event");
            return;
        }
        if let Err(e) = self.tx.send(ScopedEvent { audience, event }) {
            tracing::error!("Failed to broadcast event: {}", e);
        }
    }

    pub async fn connected_clients(&self) -> usize {
        self.clients.read().await.len()
    }

    async fn register_client(&self, client_id: Uuid, user_id: Uuid) {
        self.clients.write().await.insert(
            client_id,
            Client {
                user_id,
                subscriptions: HashSet::new(),
            },
        );
        tracing::info!(client_id = %client_id, user_id = %user_id, "WebSocket client connected");
    }

    async fn unregister_client(&self, client_id: Uuid) {
        self.clients.write().await.remove(&client_id);
        tracing::info!(client_id = %client_id, "WebSocket client disconnected");
    }

    async fn subscribe(&self, client_id: Uuid, trade_ids: &[Uuid]) {
        if let Some(client) = self.clients.write().await.get_mut(&client_id) {
            client.subscriptions.extend(trade_ids.iter().copied());
        }
    }

    async fn unsubscribe(&self, client_id: Uuid, trade_ids: &[Uuid]) {
        if let Some(client) = self.clients.write().await.get_mut(&client_id) {
            for id in trade_ids {
                client.subscriptions.remove(id);
            }
        }
    }

    async fn wants(&self, client_id: Uuid, scoped: &ScopedEvent) -> bool {
        self.clients.read().await.get(&client_id).is_some_and(|client| {
            scoped.audience.contains(&client.user_id)
                && (client.subscriptions.is_empty()
                    || client.subscriptions.contains(&scoped.event.trade_id()))
        })
    }
}

/// Upgrade an authenticated HTTP connection to the caller's event feed
pub async fn ws_handler(
    FeedUser(user_id): FeedUser,
    State(state): State<WsState>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

async fn handle_socket(socket: WebSocket, state: WsState, user_id: Uuid) {
    let client_id = Uuid::new_v4();
    state.register_client(client_id, user_id).await;

    let (mut sender, mut receiver) = socket.split();
    let (internal_tx, mut internal_rx) = mpsc::channel::<ServerMessage>(32);
    let mut rx = state.tx.subscribe();

    let send_state = state.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            let outgoing = tokio::select! {
                received = rx.recv() => match received {
                    Ok(scoped) => {
                        if !send_state.wants(client_id, &scoped).await {
                            continue;
                        }
                        ServerMessage::Event { event: scoped.event }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(client_id = %client_id, skipped, "WebSocket client lagging");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                Some(msg) = internal_rx.recv() => msg,
                else => break,
            };

            if let Ok(text) = serde_json::to_string(&outgoing) {
                if sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        }
    });

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let text = match msg {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            let reply = match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Subscribe { trade_ids }) => {
                    recv_state.subscribe(client_id, &trade_ids).await;
                    ServerMessage::Subscribed { trade_ids }
                }
                Ok(ClientMessage::Unsubscribe { trade_ids }) => {
                    recv_state.unsubscribe(client_id, &trade_ids).await;
                    ServerMessage::Unsubscribed { trade_ids }
                }
                Ok(ClientMessage::Ping) => ServerMessage::Pong,
                Err(e) => ServerMessage::Error {
                    message: format!("Unrecognized message: {}", e),
                },
            };

            if internal_tx.send(reply).await.is_err() {
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    state.unregister_client(client_id).await;
}
