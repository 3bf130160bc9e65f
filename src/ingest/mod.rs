// src/ingest/mod.rs - Comment aggregator feed: frame decoding and WebSocket client

use anyhow::{Context, Result};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::bot::task::TaskHandle;
use crate::types::{Comment, ModerationError, ModerationResult, PlatformKind, StreamTarget};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Events the feed delivers to the watcher
#[derive(Debug, Clone, PartialEq)]
pub enum IngestEvent {
    Services(Vec<StreamTarget>),
    Comments(Vec<Comment>),
}

#[derive(Debug, Deserialize)]
struct Frame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CommentsPayload {
    #[serde(default)]
    comments: Vec<WireComment>,
}

#[derive(Debug, Deserialize)]
struct WireComment {
    service: String,
    data: WireCommentData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCommentData {
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    name: String,
    display_name: Option<String>,
    #[serde(default)]
    comment: String,
    #[serde(default)]
    has_gift: bool,
    price: Option<serde_json::Value>,
    currency: Option<String>,
    gift_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireService {
    url: Option<String>,
    name: Option<String>,
}

impl WireComment {
    fn into_comment(self) -> Comment {
        let data = self.data;
        let display_name = Some(data.name)
            .filter(|n| !n.is_empty())
            .or(data.display_name.filter(|n| !n.is_empty()))
            .unwrap_or_else(|| data.user_id.clone());

        Comment {
            platform: self.service,
            user_id: data.user_id,
            display_name,
            text: data.comment,
            has_gift: data.has_gift,
            amount: data.price.as_ref().and_then(parse_amount),
            currency: data.currency,
            gift_name: data.gift_name,
            received_at: Utc::now(),
        }
    }
}

/// Prices arrive either as numbers or as numeric strings
fn parse_amount(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}

/// Decode one text frame. Frame types other than comments and services
/// yield `Ok(None)`.
pub fn decode_frame(raw: &str) -> ModerationResult<Option<IngestEvent>> {
    let frame: Frame = serde_json::from_str(raw).map_err(|e| ModerationError::IngestDecode(e.to_string()))?;

    match frame.kind.as_str() {
        "comments" => {
            let payload: CommentsPayload = serde_json::from_value(frame.data)
                .map_err(|e| ModerationError::IngestDecode(format!("comments frame: {}", e)))?;
            let comments = payload.comments.into_iter().map(WireComment::into_comment).collect();
            Ok(Some(IngestEvent::Comments(comments)))
        }
        "services" => {
            let services: Vec<WireService> = serde_json::from_value(frame.data)
                .map_err(|e| ModerationError::IngestDecode(format!("services frame: {}", e)))?;

            let targets = services
                .into_iter()
                .filter_map(|service| {
                    let url = service.url.filter(|u| !u.is_empty())?;
                    match PlatformKind::from_url(&url) {
                        Some(platform) => Some(StreamTarget::new(platform, url)),
                        None => {
                            debug!("Ignoring service {:?} with unsupported url {}", service.name, url);
                            None
                        }
                    }
                })
                .collect();
            Ok(Some(IngestEvent::Services(targets)))
        }
        other => {
            debug!("Ignoring '{}' frame", other);
            Ok(None)
        }
    }
}

/// WebSocket client for the aggregator feed. Reconnects after a fixed delay
/// whenever the connection drops.
pub struct OneCommeClient {
    url: String,
    reconnect_delay: Duration,
}

impl OneCommeClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Read frames until the socket closes. Returns `Ok(false)` once the
    /// receiving side of `events` is gone.
    async fn run_connection(&self, events: &mpsc::Sender<IngestEvent>) -> Result<bool> {
        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .with_context(|| format!("Failed to connect to {}", self.url))?;
        info!("Connected to comment feed at {}", self.url);

        let (mut write, mut read) = ws_stream.split();

        while let Some(message) = read.next().await {
            match message.context("Feed read error")? {
                Message::Text(text) => match decode_frame(&text) {
                    Ok(Some(event)) => {
                        if events.send(event).await.is_err() {
                            return Ok(false);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("{}", e),
                },
                Message::Ping(payload) => {
                    if let Err(e) = write.send(Message::Pong(payload)).await {
                        warn!("Failed to answer feed ping: {}", e);
                    }
                }
                Message::Close(frame) => {
                    info!("Feed closed the connection: {:?}", frame);
                    break;
                }
                Message::Binary(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }

        Ok(true)
    }

    pub fn spawn(self, events: mpsc::Sender<IngestEvent>) -> TaskHandle {
        let (stop_tx, mut stop_rx) = TaskHandle::channel();

        let join = tokio::spawn(async move {
            let feed = async {
                loop {
                    match self.run_connection(&events).await {
                        Ok(false) => {
                            info!("Event consumer gone, closing feed client");
                            return;
                        }
                        Ok(true) => warn!("Feed disconnected"),
                        Err(e) => error!("Feed connection error: {:#}", e),
                    }
                    info!("Reconnecting to {} in {:?}", self.url, self.reconnect_delay);
                    sleep(self.reconnect_delay).await;
                }
            };

            tokio::select! {
                _ = feed => {}
                _ = stop_rx.changed() => {}
            }
            info!("Feed client stopped");
        });

        TaskHandle::new("feed_client", stop_tx, join)
    }
}
