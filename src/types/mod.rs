// src/types/mod.rs - Data model shared by the ingest, moderation and platform layers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Streaming platforms the watcher knows how to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    YouTube,
    TikTok,
    Twitcasting,
}

impl PlatformKind {
    pub const ALL: [PlatformKind; 3] = [PlatformKind::YouTube, PlatformKind::TikTok, PlatformKind::Twitcasting];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKind::YouTube => "youtube",
            PlatformKind::TikTok => "tiktok",
            PlatformKind::Twitcasting => "twitcasting",
        }
    }

    /// Resolve the service tag attached to an incoming comment
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "youtube" => Some(PlatformKind::YouTube),
            "tiktok" => Some(PlatformKind::TikTok),
            "twitcasting" | "twicas" => Some(PlatformKind::Twitcasting),
            _ => None,
        }
    }

    /// Infer the platform from a stream URL by its host
    pub fn from_url(raw: &str) -> Option<Self> {
        let parsed = url::Url::parse(raw).ok()?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return None;
        }
        let host = parsed.host_str()?.trim_start_matches("www.").trim_start_matches("m.");

        match host {
            "youtube.com" | "youtu.be" => Some(PlatformKind::YouTube),
            "twitcasting.tv" => Some(PlatformKind::Twitcasting),
            "tiktok.com" => Some(PlatformKind::TikTok),
            _ => None,
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single viewer comment as delivered by the ingestion feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    /// Raw service tag ("youtube", "tiktok", ...); unknown tags are dropped by the router
    pub platform: String,
    pub user_id: String,
    pub display_name: String,
    pub text: String,
    pub has_gift: bool,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub gift_name: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(
        platform: impl Into<String>,
        user_id: impl Into<String>,
        display_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            platform: platform.into(),
            user_id: user_id.into(),
            display_name: display_name.into(),
            text: text.into(),
            has_gift: false,
            amount: None,
            currency: None,
            gift_name: None,
            received_at: Utc::now(),
        }
    }

    /// Mark the comment as gift-bearing (super chat, item, tea...)
    pub fn with_gift(mut self, amount: Option<f64>) -> Self {
        self.has_gift = true;
        self.amount = amount;
        self
    }
}

/// Active stream announced by a service-state event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamTarget {
    pub platform: PlatformKind,
    pub url: String,
}

impl StreamTarget {
    pub fn new(platform: PlatformKind, url: impl Into<String>) -> Self {
        Self { platform, url: url.into() }
    }
}

/// Label the external classifier attaches to a comment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionCategory {
    Age,
    Demand,
    Insult,
    Faq,
    Advice,
    Wordplay,
    BotNameMention,
    None,
    Error,
}

impl DetectionCategory {
    /// Parse a classifier label. Unrecognised labels count as `None`.
    pub fn from_label(label: &str) -> Self {
        let normalized: String = label
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.')
            .to_ascii_lowercase()
            .replace('-', "_");

        match normalized.as_str() {
            "age" => DetectionCategory::Age,
            "demand" => DetectionCategory::Demand,
            "insult" => DetectionCategory::Insult,
            "faq" => DetectionCategory::Faq,
            "advice" => DetectionCategory::Advice,
            "wordplay" => DetectionCategory::Wordplay,
            "bot_name_mention" | "bot_mention" | "hiroyuki" => DetectionCategory::BotNameMention,
            "error" => DetectionCategory::Error,
            _ => DetectionCategory::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionCategory::Age => "age",
            DetectionCategory::Demand => "demand",
            DetectionCategory::Insult => "insult",
            DetectionCategory::Faq => "faq",
            DetectionCategory::Advice => "advice",
            DetectionCategory::Wordplay => "wordplay",
            DetectionCategory::BotNameMention => "bot_name_mention",
            DetectionCategory::None => "none",
            DetectionCategory::Error => "error",
        }
    }

    /// Cooldown bucket for replies of this category, if any
    pub fn cooldown(&self) -> Option<CooldownCategory> {
        match self {
            DetectionCategory::Age => Some(CooldownCategory::AgeResponse),
            DetectionCategory::BotNameMention => Some(CooldownCategory::BotNameMention),
            _ => None,
        }
    }

    /// Directed replies are addressed to the commenter by name
    pub fn is_directed(&self) -> bool {
        matches!(self, DetectionCategory::Demand)
    }
}

impl fmt::Display for DetectionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier output for one comment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedReply {
    pub text: String,
    pub detection: DetectionCategory,
    pub reply: Option<String>,
}

impl ClassifiedReply {
    pub fn new(text: impl Into<String>, detection: DetectionCategory, reply: Option<String>) -> Self {
        Self { text: text.into(), detection, reply }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(text, DetectionCategory::Error, None)
    }
}

/// Reply buckets tracked by the per-platform cooldown gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CooldownCategory {
    AgeResponse,
    BotNameMention,
    GiftThanks,
    GreetingSpam,
    RepeatSpam,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpamType {
    Repetitive,
    GreetingSpam,
}

impl SpamType {
    pub fn cooldown(&self) -> CooldownCategory {
        match self {
            SpamType::Repetitive => CooldownCategory::RepeatSpam,
            SpamType::GreetingSpam => CooldownCategory::GreetingSpam,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpamDetectionResult {
    pub is_spam: bool,
    pub spam_type: Option<SpamType>,
    /// Number of recent comments by the same user that matched
    pub score: usize,
}

impl SpamDetectionResult {
    pub fn clean() -> Self {
        Self { is_spam: false, spam_type: None, score: 0 }
    }

    pub fn spam(spam_type: SpamType, score: usize) -> Self {
        Self { is_spam: true, spam_type: Some(spam_type), score }
    }
}

/// Failure taxonomy of the moderation pipeline. Every variant is contained at
/// the scope of a single event, comment or reply.
#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("failed to decode ingest event: {0}")]
    IngestDecode(String),

    #[error("classification failed: {0}")]
    Classification(String),

    #[error("delivery to {platform} failed: {reason}")]
    Delivery { platform: PlatformKind, reason: String },

    #[error("{platform} adapter could not initialize for {url}: {reason}")]
    AdapterInit { platform: PlatformKind, url: String, reason: String },

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type ModerationResult<T> = std::result::Result<T, ModerationError>;
