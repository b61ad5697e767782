use analysis_core::{Quote, Tick};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message};

const POLYGON_WS_URL: &str = "wss://socket.polygon.io/stocks";

/// A live trade or quote as pushed by Polygon's WebSocket feed, normalized
/// into the same `Tick`/`Quote` types the rest of the workspace reads and
/// writes. `market-data-facade` feeds these into `SessionState` through the
/// same `append_bar`/aggregation path used for replayed history.
#[derive(Debug, Clone)]
pub enum LiveEvent {
    Tick(Tick),
    Quote(Quote),
}

pub struct PolygonWebSocket {
    api_key: String,
    tx: broadcast::Sender<LiveEvent>,
    subscriptions: Arc<Mutex<HashSet<String>>>,
    shutdown: Arc<tokio::sync::Notify>,
}

impl PolygonWebSocket {
    pub fn new(api_key: String) -> (Self, broadcast::Receiver<LiveEvent>) {
        let (tx, rx) = broadcast::channel(1024);
        let ws = Self {
            api_key,
            tx,
            subscriptions: Arc::new(Mutex::new(HashSet::new())),
            shutdown: Arc::new(tokio::sync::Notify::new()),
        };
        (ws, rx)
    }

    pub fn sender(&self) -> broadcast::Sender<LiveEvent> {
        self.tx.clone()
    }

    pub async fn subscribe(&self, symbols: &[String]) {
        let mut subs = self.subscriptions.lock().await;
        for s in symbols {
            subs.insert(s.to_uppercase());
        }
    }

    pub async fn unsubscribe(&self, symbols: &[String]) {
        let mut subs = self.subscriptions.lock().await;
        for s in symbols {
            subs.remove(&s.to_uppercase());
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    pub async fn run(&self) {
        loop {
            match self.connect_and_stream().await {
                Ok(()) => {
                    tracing::info!("Polygon WS disconnected gracefully");
                    break;
                }
                Err(e) => {
                    tracing::warn!("Polygon WS error: {}, reconnecting in 5s", e);
                    tokio::select! {
                        _ = tokio::time::sleep(std::time::Duration::from_secs(5)) => {},
                        _ = self.shutdown.notified() => {
                            tracing::info!("Polygon WS shutdown requested");
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn connect_and_stream(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (ws_stream, _) = connect_async(POLYGON_WS_URL).await?;
        let (mut write, mut read) = ws_stream.split();
        tracing::info!("Connected to Polygon WebSocket");

        // Authenticate
        let auth_msg = serde_json::json!({"action": "auth", "params": self.api_key});
        write.send(Message::Text(auth_msg.to_string())).await?;

        // Wait for auth confirmation
        if let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    tracing::debug!("Polygon WS auth response: {}", text);
                }
                Ok(_) => {}
                Err(e) => return Err(Box::new(e)),
            }
        }

        // Subscribe to current symbols
        let subs = self.subscriptions.lock().await;
        if !subs.is_empty() {
            let channels: Vec<String> = subs
                .iter()
                .flat_map(|s| vec![format!("T.{}", s), format!("Q.{}", s)])
                .collect();
            let sub_msg = serde_json::json!({"action": "subscribe", "params": channels.join(",")});
            write.send(Message::Text(sub_msg.to_string())).await?;
            tracing::info!("Subscribed to {} symbols", subs.len());
        }
        drop(subs);

        // Stream messages
        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_message(&text);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::info!("Polygon WS connection closed");
                            return Ok(());
                        }
                        Some(Err(e)) => {
                            return Err(Box::new(e));
                        }
                        _ => {}
                    }
                }
                _ = self.shutdown.notified() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
            }
        }
    }

    fn millis_to_utc(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn handle_message(&self, text: &str) {
        // Polygon sends arrays of events
        if let Ok(events) = serde_json::from_str::<Vec<serde_json::Value>>(text) {
            for event in events {
                match event.get("ev").and_then(|e| e.as_str()) {
                    Some("T") => {
                        if let (Some(sym), Some(p), Some(s), Some(t)) = (
                            event.get("sym").and_then(|v| v.as_str()),
                            event.get("p").and_then(|v| v.as_f64()),
                            event.get("s").and_then(|v| v.as_f64()),
                            event.get("t").and_then(|v| v.as_i64()),
                        ) {
                            let _ = self.tx.send(LiveEvent::Tick(Tick {
                                symbol: sym.to_string(),
                                timestamp: Self::millis_to_utc(t),
                                price: p,
                                size: s,
                            }));
                        }
                    }
                    Some("Q") => {
                        if let (Some(sym), Some(bp), Some(ap), Some(t)) = (
                            event.get("sym").and_then(|v| v.as_str()),
                            event.get("bp").and_then(|v| v.as_f64()),
                            event.get("ap").and_then(|v| v.as_f64()),
                            event.get("t").and_then(|v| v.as_i64()),
                        ) {
                            let bs = event.get("bs").and_then(|v| v.as_f64()).unwrap_or(0.0);
                            let as_ = event.get("as").and_then(|v| v.as_f64()).unwrap_or(0.0);
                            let ex = event.get("x").and_then(|v| v.as_i64()).map(|x| x.to_string()).unwrap_or_default();
                            let _ = self.tx.send(LiveEvent::Quote(Quote {
                                symbol: sym.to_string(),
                                timestamp: Self::millis_to_utc(t),
                                bid_price: bp,
                                ask_price: ap,
                                bid_size: bs,
                                ask_size: as_,
                                exchange: ex,
                            }));
                        }
                    }
                    Some("status") => {
                        if let Some(msg) = event.get("message").and_then(|v| v.as_str()) {
                            tracing::debug!("Polygon WS status: {}", msg);
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}
