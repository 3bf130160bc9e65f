use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::PlatformSettings;
use crate::platforms::{
    donation_table, ensure_success, gift_tier, meets_minimum, pick_donation_message, ChatPlatform, DemandItems, PlatformState,
};
use crate::types::{Comment, ModerationError, ModerationResult, PlatformKind, StreamTarget};

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// YouTube API list responses
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct YouTubeResponse<T> {
    #[serde(default)]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    #[serde(rename = "liveStreamingDetails")]
    live_streaming_details: Option<LiveStreamingDetails>,
}

#[derive(Debug, Deserialize)]
struct LiveStreamingDetails {
    #[serde(rename = "activeLiveChatId")]
    active_live_chat_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchId,
    snippet: Option<SearchSnippet>,
}

#[derive(Debug, Deserialize)]
struct SearchId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
    #[serde(rename = "channelId")]
    channel_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchSnippet {
    #[serde(rename = "channelId")]
    channel_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    snippet: SendMessageSnippet<'a>,
}

#[derive(Debug, Serialize)]
struct SendMessageSnippet<'a> {
    #[serde(rename = "liveChatId")]
    live_chat_id: &'a str,
    #[serde(rename = "type")]
    message_type: &'a str,
    #[serde(rename = "textMessageDetails")]
    text_message_details: TextMessageDetails<'a>,
}

#[derive(Debug, Serialize)]
struct TextMessageDetails<'a> {
    #[serde(rename = "messageText")]
    message_text: &'a str,
}

/// Configuration for posting to YouTube Live Chat
#[derive(Debug, Clone)]
pub struct YouTubeConfig {
    pub api_key: Option<String>, // For read-only lookups
    pub oauth_token: String,     // For sending messages
    pub api_base: String,
    pub min_thanks_amount: Option<f64>,
    pub big_gift_amount: f64,
}

impl YouTubeConfig {
    pub fn from_settings(settings: &PlatformSettings) -> Result<Self> {
        let oauth_token = settings
            .access_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .context("platforms.youtube.access_token (or YOUTUBE_OAUTH_TOKEN) is not set")?;

        Ok(Self {
            api_key: settings.api_key.clone().filter(|k| !k.trim().is_empty()),
            oauth_token,
            api_base: settings.endpoint.clone().unwrap_or_else(|| API_BASE.to_string()),
            min_thanks_amount: settings.min_thanks_amount,
            big_gift_amount: settings.big_gift_amount(),
        })
    }
}

/// What a stream URL points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamLocator {
    Video(String),
    Handle(String),
}

/// Accepts watch?v=, youtu.be/, /live/ and /@handle URLs
pub fn parse_stream_url(raw: &str) -> Option<StreamLocator> {
    let parsed = url::Url::parse(raw).ok()?;
    let host = parsed.host_str()?.trim_start_matches("www.").trim_start_matches("m.");
    let segments: Vec<&str> = parsed.path_segments()?.filter(|s| !s.is_empty()).collect();

    match (host, segments.as_slice()) {
        ("youtu.be", [id, ..]) => Some(StreamLocator::Video(id.to_string())),
        ("youtube.com", ["watch"]) => parsed
            .query_pairs()
            .find(|(key, value)| key == "v" && !value.is_empty())
            .map(|(_, id)| StreamLocator::Video(id.into_owned())),
        ("youtube.com", ["live", id, ..]) => Some(StreamLocator::Video(id.to_string())),
        ("youtube.com", [first, ..]) if first.starts_with('@') && first.len() > 1 => {
            Some(StreamLocator::Handle(first.to_string()))
        }
        _ => None,
    }
}

pub struct YouTubePlatform {
    config: YouTubeConfig,
    http_client: reqwest::Client,
    state: PlatformState,
    live_chat_id: Option<String>,
    current_url: Option<String>,
    demand: DemandItems,
    donations: HashMap<String, Vec<String>>,
}

impl YouTubePlatform {
    pub fn new(config: YouTubeConfig, bot_user_id: String) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
            state: PlatformState::new(bot_user_id),
            live_chat_id: None,
            current_url: None,
            demand: DemandItems::new(
                &["200円のスパチャ", "スーパーステッカー"],
                &["1,000円のスパチャ", "メンバーシップ"],
                &["10,000円の赤スパ", "メンバーシップギフト50人分"],
            ),
            donations: donation_table(&[
                ("ja", &["{name}さん、ナイスパ！", "ナイスパ！{name}さん、ありがとうございます。"]),
                ("en", &["Thank you for the Super Chat, {name}!", "Nice Super Chat, {name}!"]),
                ("ja:big", &["{name}さん、赤スパありがとうございます。太っ腹すぎませんかね。"]),
                ("en:big", &["Wow, {name}, thank you so much for the generous Super Chat!"]),
            ]),
        }
    }

    fn thanks_line(&self, comment: &Comment) -> Option<String> {
        let tier = gift_tier(comment, &self.demand, self.config.big_gift_amount);
        pick_donation_message(&self.donations, comment, tier)
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}/{}", self.config.api_base, path);
        let mut request = self.http_client.get(&url).query(query);
        request = match &self.config.api_key {
            Some(key) => request.query(&[("key", key.as_str())]),
            None => request.bearer_auth(&self.config.oauth_token),
        };

        let response = request.send().await.with_context(|| format!("Failed to call {}", path))?;
        let response = ensure_success(response, path).await?;
        response.json().await.with_context(|| format!("Failed to parse {} response", path))
    }

    async fn chat_id_for_video(&self, video_id: &str) -> Result<String> {
        let response: YouTubeResponse<VideoItem> = self
            .get("videos", &[("part", "liveStreamingDetails"), ("id", video_id)])
            .await?;

        response
            .items
            .into_iter()
            .next()
            .and_then(|v| v.live_streaming_details)
            .and_then(|d| d.active_live_chat_id)
            .with_context(|| format!("No active live chat for video {}", video_id))
    }

    async fn channel_id_for_handle(&self, handle: &str) -> Result<String> {
        let response: YouTubeResponse<SearchItem> = self
            .get(
                "search",
                &[("part", "snippet"), ("q", handle), ("type", "channel"), ("maxResults", "1")],
            )
            .await?;

        response
            .items
            .into_iter()
            .next()
            .and_then(|item| item.id.channel_id.or(item.snippet.and_then(|s| s.channel_id)))
            .with_context(|| format!("Channel {} not found", handle))
    }

    async fn live_video_for_channel(&self, channel_id: &str) -> Result<String> {
        let response: YouTubeResponse<SearchItem> = self
            .get(
                "search",
                &[
                    ("part", "snippet"),
                    ("channelId", channel_id),
                    ("eventType", "live"),
                    ("type", "video"),
                    ("maxResults", "1"),
                ],
            )
            .await?;

        response
            .items
            .into_iter()
            .next()
            .and_then(|item| item.id.video_id)
            .with_context(|| format!("Channel {} is not live", channel_id))
    }

    async fn resolve_chat_id(&self, url: &str) -> Result<String> {
        match parse_stream_url(url) {
            Some(StreamLocator::Video(video_id)) => self.chat_id_for_video(&video_id).await,
            Some(StreamLocator::Handle(handle)) => {
                let channel_id = self.channel_id_for_handle(&handle).await?;
                let video_id = self.live_video_for_channel(&channel_id).await?;
                self.chat_id_for_video(&video_id).await
            }
            None => Err(anyhow::anyhow!("Unsupported YouTube URL")),
        }
    }

    async fn send(&self, live_chat_id: &str, text: &str) -> Result<()> {
        let request = SendMessageRequest {
            snippet: SendMessageSnippet {
                live_chat_id,
                message_type: "textMessageEvent",
                text_message_details: TextMessageDetails { message_text: text },
            },
        };

        let url = format!("{}/liveChat/messages", self.config.api_base);
        let response = self
            .http_client
            .post(&url)
            .query(&[("part", "snippet")])
            .bearer_auth(&self.config.oauth_token)
            .json(&request)
            .send()
            .await
            .context("Failed to send YouTube Live Chat message")?;
        ensure_success(response, "liveChat/messages").await?;
        Ok(())
    }
}

#[async_trait]
impl ChatPlatform for YouTubePlatform {
    fn platform(&self) -> PlatformKind {
        PlatformKind::YouTube
    }

    async fn initialize(&mut self, target: &StreamTarget) -> ModerationResult<()> {
        if self.live_chat_id.is_some() && self.current_url.as_deref() == Some(target.url.as_str()) {
            return Ok(());
        }

        match self.resolve_chat_id(&target.url).await {
            Ok(chat_id) => {
                info!("YouTube live chat {} resolved for {}", chat_id, target.url);
                self.live_chat_id = Some(chat_id);
                self.current_url = Some(target.url.clone());
                Ok(())
            }
            Err(e) => {
                self.live_chat_id = None;
                self.current_url = None;
                Err(ModerationError::AdapterInit {
                    platform: PlatformKind::YouTube,
                    url: target.url.clone(),
                    reason: format!("{:#}", e),
                })
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.live_chat_id.is_some()
    }

    async fn post_message(&self, text: &str) -> ModerationResult<()> {
        let delivery_error = |reason: String| ModerationError::Delivery {
            platform: PlatformKind::YouTube,
            reason,
        };
        let chat_id = self
            .live_chat_id
            .as_deref()
            .ok_or_else(|| delivery_error("no live chat bound".to_string()))?;

        self.send(chat_id, text).await.map_err(|e| delivery_error(format!("{:#}", e)))?;
        debug!("Sent YouTube message: {}", text);
        Ok(())
    }

    async fn post_thanks_message(&self, comment: &Comment) -> ModerationResult<()> {
        if !meets_minimum(comment, self.config.min_thanks_amount) {
            debug!("Super Chat from {} below thanks minimum", comment.display_name);
            return Ok(());
        }
        match self.thanks_line(comment) {
            Some(line) => self.post_message(&line).await,
            None => {
                warn!("No YouTube thanks message configured");
                Ok(())
            }
        }
    }

    fn state(&self) -> &PlatformState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut PlatformState {
        &mut self.state
    }

    fn demand_items(&self) -> &DemandItems {
        &self.demand
    }

    fn donation_messages(&self) -> &HashMap<String, Vec<String>> {
        &self.donations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform() -> YouTubePlatform {
        let settings = PlatformSettings {
            enabled: true,
            access_token: Some("token".to_string()),
            min_thanks_amount: Some(500.0),
            ..Default::default()
        };
        YouTubePlatform::new(YouTubeConfig::from_settings(&settings).unwrap(), "UCbot".to_string())
    }

    #[test]
    fn test_parse_stream_url() {
        assert_eq!(
            parse_stream_url("https://www.youtube.com/watch?v=abc123&t=10"),
            Some(StreamLocator::Video("abc123".to_string()))
        );
        assert_eq!(
            parse_stream_url("https://youtu.be/xyz"),
            Some(StreamLocator::Video("xyz".to_string()))
        );
        assert_eq!(
            parse_stream_url("https://www.youtube.com/live/live42?si=share"),
            Some(StreamLocator::Video("live42".to_string()))
        );
        assert_eq!(
            parse_stream_url("https://www.youtube.com/@ayapi/live"),
            Some(StreamLocator::Handle("@ayapi".to_string()))
        );
        assert_eq!(parse_stream_url("https://www.youtube.com/watch"), None);
        assert_eq!(parse_stream_url("https://www.youtube.com/feed"), None);
    }

    #[test]
    fn test_config_requires_oauth_token() {
        assert!(YouTubeConfig::from_settings(&PlatformSettings::default()).is_err());
        let config = platform().config;
        assert_eq!(config.api_base, API_BASE);
        assert_eq!(config.api_key, None);
    }

    #[tokio::test]
    async fn test_unsupported_url_fails_initialize() {
        let mut youtube = platform();
        let target = StreamTarget::new(PlatformKind::YouTube, "https://www.youtube.com/feed/trending");

        let err = youtube.initialize(&target).await.unwrap_err();
        assert!(matches!(err, ModerationError::AdapterInit { platform: PlatformKind::YouTube, .. }));
        assert!(!youtube.is_ready());
    }

    #[tokio::test]
    async fn test_post_without_live_chat_is_delivery_error() {
        let youtube = platform();
        let err = youtube.post_message("hello").await.unwrap_err();
        assert!(matches!(err, ModerationError::Delivery { .. }));
    }

    #[tokio::test]
    async fn test_small_super_chat_is_not_thanked() {
        let youtube = platform();
        let comment = Comment::new("youtube", "u1", "Taro", "がんばって").with_gift(Some(200.0));
        // Below the minimum nothing is posted, so the missing chat id is never hit
        assert!(youtube.post_thanks_message(&comment).await.is_ok());
        assert_eq!(youtube.state().bot_user_id, "UCbot");
    }

    #[test]
    fn test_thanks_line_scales_with_super_chat() {
        let youtube = platform();

        let mut red = Comment::new("youtube", "u1", "Taro", "いつも楽しい").with_gift(Some(10000.0));
        red.currency = Some("JPY".to_string());
        assert_eq!(
            youtube.thanks_line(&red).as_deref(),
            Some("Taroさん、赤スパありがとうございます。太っ腹すぎませんかね。")
        );

        let small = Comment::new("youtube", "u1", "Taro", "いつも楽しい").with_gift(Some(500.0));
        let line = youtube.thanks_line(&small).unwrap();
        assert!(line.contains("ナイスパ"));

        let mut membership = Comment::new("youtube", "u2", "Mary", "welcome").with_gift(None);
        membership.gift_name = Some("メンバーシップ".to_string());
        assert_eq!(
            youtube.thanks_line(&membership).as_deref(),
            Some("Wow, Mary, thank you so much for the generous Super Chat!")
        );
    }
}
