use crate::error::{AppError, AppResult};
use crate::models::Guess;
use crate::services::{ApiResponse, Price, ResolutionNotice, ResolutionScheduler, SessionService};
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Channel carrying `price_update` messages
pub const TICKER_CHANNEL: &str = "ticker";

/// Channel carrying a single player's `guess_resolved` messages
pub fn player_channel(player_id: Uuid) -> String {
    format!("player:{}", player_id)
}

/// Requests a client may send
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe {
        channel: String,
    },
    Unsubscribe {
        channel: String,
    },
    CreatePlayer,
    GetPlayer {
        #[serde(default)]
        player_id: String,
    },
    MakeGuess {
        #[serde(default)]
        player_id: String,
        #[serde(default)]
        direction: String,
    },
    ResolveGuess {
        #[serde(default)]
        player_id: String,
    },
    GetPrice,
}

/// Messages pushed to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    PriceUpdate {
        price: Price,
        timestamp: i64,
    },
    GuessResolved {
        player_id: Uuid,
        guess: Guess,
    },
    Error {
        message: String,
    },
}

impl WsMessage {
    /// Channel a broadcast message is routed on
    fn channel(&self) -> Option<String> {
        match self {
            WsMessage::PriceUpdate { .. } => Some(TICKER_CHANNEL.to_string()),
            WsMessage::GuessResolved { player_id, .. } => Some(player_channel(*player_id)),
            WsMessage::Error { .. } => None,
        }
    }
}

/// Reply to a request, `{type: "response", action, data, error}`
#[derive(Debug, Serialize)]
struct Reply<'a, T> {
    #[serde(rename = "type")]
    kind: &'static str,
    action: &'a str,
    #[serde(flatten)]
    body: ApiResponse<T>,
}

/// Per-connection state. Replaces any process-wide "already initialised"
/// flag: the player binding lives and dies with the connection.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub client_id: Uuid,
    pub player_id: Option<Uuid>,
}

impl ConnectionContext {
    pub fn new(client_id: Uuid) -> Self {
        Self {
            client_id,
            player_id: None,
        }
    }

    /// Bind the connection to `player_id`. Returns `None` when it was
    /// already bound to that player, otherwise the previous binding.
    fn bind(&mut self, player_id: Uuid) -> Option<Option<Uuid>> {
        if self.player_id == Some(player_id) {
            return None;
        }
        Some(self.player_id.replace(player_id))
    }
}

/// WebSocket server binding the player session operations
#[derive(Clone)]
pub struct WebSocketServer {
    session: Arc<SessionService>,
    scheduler: Option<Arc<ResolutionScheduler>>,
    /// Broadcast sender for sending messages to all clients
    tx: broadcast::Sender<WsMessage>,
    /// Active subscriptions: channel -> set of client IDs
    subscriptions: Arc<RwLock<HashMap<String, Vec<Uuid>>>>,
    /// Client subscriptions: client_id -> set of channels
    client_channels: Arc<RwLock<HashMap<Uuid, Vec<String>>>>,
}

impl WebSocketServer {
    /// Create a new WebSocket server
    pub fn new(session: Arc<SessionService>) -> Self {
        let (tx, _) = broadcast::channel(1000); // Buffer up to 1000 messages

        Self {
            session,
            scheduler: None,
            tx,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            client_channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Hand every accepted guess to the resolution scheduler
    pub fn with_scheduler(mut self, scheduler: Arc<ResolutionScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Get broadcast sender
    pub fn sender(&self) -> broadcast::Sender<WsMessage> {
        self.tx.clone()
    }

    /// Broadcast a message to all subscribers of a channel
    pub async fn broadcast_to_channel(&self, channel: &str, message: WsMessage) -> bool {
        let subscriptions = self.subscriptions.read().await;

        match subscriptions.get(channel) {
            Some(subscribers) if !subscribers.is_empty() => {
                debug!(
                    "Broadcasting to {} subscribers on channel {}",
                    subscribers.len(),
                    channel
                );
                if let Err(e) = self.tx.send(message) {
                    warn!("Failed to broadcast message: {}", e);
                    return false;
                }
                true
            }
            _ => false,
        }
    }

    /// Subscribe a client to a channel
    pub async fn subscribe(&self, client_id: Uuid, channel: String) {
        let mut subscriptions = self.subscriptions.write().await;
        let mut client_channels = self.client_channels.write().await;

        let subscribers = subscriptions.entry(channel.clone()).or_default();
        if !subscribers.contains(&client_id) {
            subscribers.push(client_id);
        }

        let channels = client_channels.entry(client_id).or_default();
        if !channels.contains(&channel) {
            channels.push(channel.clone());
        }

        info!("Client {} subscribed to {}", client_id, channel);
    }

    /// Unsubscribe a client from a channel
    pub async fn unsubscribe(&self, client_id: Uuid, channel: &str) {
        let mut subscriptions = self.subscriptions.write().await;
        let mut client_channels = self.client_channels.write().await;

        if let Some(subscribers) = subscriptions.get_mut(channel) {
            subscribers.retain(|&id| id != client_id);
            if subscribers.is_empty() {
                subscriptions.remove(channel);
            }
        }

        if let Some(channels) = client_channels.get_mut(&client_id) {
            channels.retain(|c| c != channel);
            if channels.is_empty() {
                client_channels.remove(&client_id);
            }
        }

        info!("Client {} unsubscribed from {}", client_id, channel);
    }

    /// Get all channels a client is subscribed to
    pub async fn get_client_channels(&self, client_id: Uuid) -> Vec<String> {
        let client_channels = self.client_channels.read().await;
        client_channels.get(&client_id).cloned().unwrap_or_default()
    }

    /// Number of channels with at least one subscriber
    pub async fn active_channels(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    /// Check if client is subscribed to a channel
    pub async fn is_client_subscribed(&self, client_id: Uuid, channel: &str) -> bool {
        let subscriptions = self.subscriptions.read().await;
        subscriptions
            .get(channel)
            .map(|subscribers| subscribers.contains(&client_id))
            .unwrap_or(false)
    }

    async fn bind_player(&self, ctx: &mut ConnectionContext, player_id: Uuid) {
        let Some(previous) = ctx.bind(player_id) else {
            return;
        };
        if let Some(previous) = previous {
            self.unsubscribe(ctx.client_id, &player_channel(previous)).await;
        }
        self.subscribe(ctx.client_id, player_channel(player_id)).await;
    }

    fn reply<T: Serialize>(action: &str, result: AppResult<ApiResponse<T>>) -> serde_json::Value {
        let body = match result {
            Ok(body) => body,
            Err(err) => {
                return serde_json::json!({
                    "type": "error",
                    "message": format!("{} failed: {}", action, err),
                });
            }
        };

        serde_json::to_value(Reply {
            kind: "response",
            action,
            body,
        })
        .unwrap_or_else(|e| {
            error!("Failed to serialize {} reply: {}", action, e);
            serde_json::json!({"type": "error", "message": "Internal serialization error"})
        })
    }

    /// Handle one client request and build the reply
    pub async fn handle_request(
        &self,
        ctx: &mut ConnectionContext,
        message: ClientMessage,
    ) -> serde_json::Value {
        match message {
            ClientMessage::Subscribe { channel } => {
                self.subscribe(ctx.client_id, channel.clone()).await;
                serde_json::json!({"type": "subscribed", "channel": channel})
            }
            ClientMessage::Unsubscribe { channel } => {
                self.unsubscribe(ctx.client_id, &channel).await;
                serde_json::json!({"type": "unsubscribed", "channel": channel})
            }
            ClientMessage::CreatePlayer => {
                let result = self.session.create_player().await;
                if let Ok(ApiResponse {
                    data: Some(player), ..
                }) = &result
                {
                    self.bind_player(ctx, player.player_id).await;
                }
                Self::reply("create_player", result)
            }
            ClientMessage::GetPlayer { player_id } => {
                let result = self.session.get_player(&player_id).await;
                if let Ok(ApiResponse {
                    data: Some(Some(player)),
                    ..
                }) = &result
                {
                    self.bind_player(ctx, player.player_id).await;
                }
                Self::reply("get_player", result)
            }
            ClientMessage::MakeGuess {
                player_id,
                direction,
            } => {
                let result = self.session.make_guess(&player_id, &direction).await;
                if let (
                    Ok(ApiResponse {
                        data: Some(Guess::Pending(guess)),
                        ..
                    }),
                    Some(scheduler),
                ) = (&result, &self.scheduler)
                {
                    if let Ok(id) = Uuid::parse_str(player_id.trim()) {
                        scheduler.schedule(id, guess.resolvable_at());
                    }
                }
                Self::reply("make_guess", result)
            }
            ClientMessage::ResolveGuess { player_id } => {
                let result = self.session.resolve_guess(&player_id).await;
                Self::reply("resolve_guess", result)
            }
            ClientMessage::GetPrice => Self::reply("get_price", self.session.get_price().await),
        }
    }

    /// Handle a new WebSocket connection
    pub async fn handle_connection(&self, stream: tokio::net::TcpStream) -> AppResult<()> {
        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| AppError::Message(format!("WebSocket handshake failed: {}", e)))?;

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let mut rx = self.tx.subscribe();
        let client_id = Uuid::new_v4();

        info!("New WebSocket connection: {}", client_id);

        let welcome = serde_json::json!({
            "type": "connected",
            "client_id": client_id.to_string(),
        });
        if let Err(e) = ws_sender.send(Message::Text(welcome.to_string())).await {
            warn!("Failed to send welcome message: {}", e);
        }

        // Both tasks write to the socket
        let ws_sender = Arc::new(tokio::sync::Mutex::new(ws_sender));
        // Fired (or dropped) when the reader exits so the forwarder stops too
        let (closed_tx, mut closed_rx) = oneshot::channel::<()>();

        let server = self.clone();
        let sender = Arc::clone(&ws_sender);
        tokio::spawn(async move {
            let mut ctx = ConnectionContext::new(client_id);

            while let Some(msg) = ws_receiver.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(request) => server.handle_request(&mut ctx, request).await,
                            Err(e) => {
                                warn!("Failed to parse message from client {}: {}", client_id, e);
                                serde_json::json!({
                                    "type": "error",
                                    "message": "Invalid message format",
                                })
                            }
                        };

                        let mut sender = sender.lock().await;
                        if let Err(e) = sender.send(Message::Text(reply.to_string())).await {
                            warn!("Failed to send reply to {}: {}", client_id, e);
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        info!("WebSocket connection closed: {}", client_id);
                        break;
                    }
                    Err(e) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }

            // Clean up all subscriptions for this client
            for channel in server.get_client_channels(client_id).await {
                server.unsubscribe(client_id, &channel).await;
            }
            let _ = closed_tx.send(());
        });

        let server = self.clone();
        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    _ = &mut closed_rx => break,
                    received = rx.recv() => received,
                };

                let msg = match received {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Client {} lagged, skipped {} messages", client_id, skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                let subscribed = match msg.channel() {
                    Some(channel) => server.is_client_subscribed(client_id, &channel).await,
                    None => false,
                };
                if !subscribed {
                    continue;
                }

                let json = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize message: {}", e);
                        continue;
                    }
                };

                let mut sender = ws_sender.lock().await;
                if let Err(e) = sender.send(Message::Text(json)).await {
                    debug!("Stopped forwarding to client {}: {}", client_id, e);
                    break;
                }
            }
        });

        Ok(())
    }

    /// Broadcast price update
    pub async fn broadcast_price_update(&self, price: Decimal) -> bool {
        let message = WsMessage::PriceUpdate {
            price: Price(price),
            timestamp: chrono::Utc::now().timestamp(),
        };

        self.broadcast_to_channel(TICKER_CHANNEL, message).await
    }

    /// Broadcast a scheduler resolution to the owning player's channel
    pub async fn broadcast_guess_resolved(&self, notice: ResolutionNotice) -> bool {
        let channel = player_channel(notice.player_id);
        let message = WsMessage::GuessResolved {
            player_id: notice.player_id,
            guess: Guess::Resolved(notice.guess),
        };

        self.broadcast_to_channel(&channel, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_parsing() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"make_guess","player_id":"abc","direction":"up"}"#)
                .unwrap();
        assert!(matches!(
            msg,
            ClientMessage::MakeGuess { ref player_id, ref direction }
                if player_id == "abc" && direction == "up"
        ));

        // Missing fields arrive as empty strings and fail validation later
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"resolve_guess"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::ResolveGuess { ref player_id } if player_id.is_empty()));

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"get_price"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::GetPrice));
    }

    #[test]
    fn test_message_channels() {
        let id = Uuid::new_v4();
        let price = WsMessage::PriceUpdate {
            price: Price(Decimal::new(50000, 0)),
            timestamp: 0,
        };
        assert_eq!(price.channel().as_deref(), Some(TICKER_CHANNEL));

        let json = serde_json::to_value(&price).unwrap();
        assert_eq!(json["type"], "price_update");
        assert_eq!(json["price"], 50000.0);

        let error = WsMessage::Error {
            message: "x".into(),
        };
        assert!(error.channel().is_none());
        assert_eq!(player_channel(id), format!("player:{}", id));
    }

    #[test]
    fn test_context_binds_once() {
        let mut ctx = ConnectionContext::new(Uuid::new_v4());
        let player = Uuid::new_v4();

        assert_eq!(ctx.bind(player), Some(None));
        assert_eq!(ctx.bind(player), None);
        assert_eq!(ctx.player_id, Some(player));

        let other = Uuid::new_v4();
        assert_eq!(ctx.bind(other), Some(Some(player)));
        assert_eq!(ctx.player_id, Some(other));
    }
}
