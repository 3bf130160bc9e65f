// src/config/mod.rs - File + environment configuration for the watcher

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::RwLock;

use crate::bot::cooldown::CooldownGate;
use crate::bot::spam::{HistoryScope, SpamThresholds};
use crate::types::{ModerationError, ModerationResult, PlatformKind};
#[cfg(test)]
use crate::types::CooldownCategory;

pub const DEFAULT_CONFIG_PATH: &str = "config/chatwatch.yaml";
/// Upper bound for every `*_secs` setting (one year)
pub const MAX_CONFIG_SECS: u64 = 365 * 24 * 60 * 60;

/// `secs` is bounded by `MAX_CONFIG_SECS` in `validate`; anything past chrono's
/// range saturates instead of panicking.
fn chrono_secs(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

/// Complete watcher configuration. Every section falls back to its defaults
/// when omitted from the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub core: CoreSettings,
    pub platforms: PlatformsConfig,
    pub queue: QueueSettings,
    pub scheduler: SchedulerSettings,
    pub cooldowns: CooldownSettings,
    pub moderation: ModerationSettings,
    pub classifier: ClassifierSettings,
    pub promotion: PromotionSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreSettings {
    /// Comment aggregator feed
    pub websocket_url: String,
    /// Default account id of the bot, used to ignore its own echoed comments
    pub bot_user_id: String,
    pub streamer_name: String,
    pub bot_name: String,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            websocket_url: "ws://localhost:8080".to_string(),
            bot_user_id: String::new(),
            streamer_name: "ぁゃぴ".to_string(),
            bot_name: "ひろゆき".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformSettings {
    pub enabled: bool,
    /// Overrides `core.bot_user_id` for this platform
    pub bot_user_id: Option<String>,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    /// Alternative API base or relay endpoint
    pub endpoint: Option<String>,
    /// Gifts below this amount are not thanked
    pub min_thanks_amount: Option<f64>,
    /// Gifts at or above this amount get the warmer thanks lines
    pub big_gift_amount: Option<f64>,
}

impl PlatformSettings {
    pub fn big_gift_amount(&self) -> f64 {
        self.big_gift_amount.unwrap_or(crate::platforms::DEFAULT_BIG_GIFT_AMOUNT)
    }
}

/// A platform missing from a present `platforms` section is disabled; YouTube
/// is only on by default when the whole section is omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformsConfig {
    #[serde(default)]
    pub youtube: PlatformSettings,
    #[serde(default)]
    pub tiktok: PlatformSettings,
    #[serde(default)]
    pub twitcasting: PlatformSettings,
}

impl Default for PlatformsConfig {
    fn default() -> Self {
        Self {
            youtube: PlatformSettings {
                enabled: true,
                ..Default::default()
            },
            tiktok: PlatformSettings::default(),
            twitcasting: PlatformSettings::default(),
        }
    }
}

impl PlatformsConfig {
    pub fn get(&self, kind: PlatformKind) -> &PlatformSettings {
        match kind {
            PlatformKind::YouTube => &self.youtube,
            PlatformKind::TikTok => &self.tiktok,
            PlatformKind::Twitcasting => &self.twitcasting,
        }
    }

    pub fn enabled(&self) -> Vec<PlatformKind> {
        PlatformKind::ALL.into_iter().filter(|k| self.get(*k).enabled).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub capacity: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self { capacity: crate::bot::queue::MAX_QUEUE_SIZE }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub flush_interval_secs: u64,
    /// Delay between two consecutive replies of one flush cycle
    pub pacing_secs: u64,
    /// Upper bound for any single classifier or platform call
    pub call_timeout_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            flush_interval_secs: 60,
            pacing_secs: 10,
            call_timeout_secs: 30,
        }
    }
}

impl SchedulerSettings {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_secs(self.pacing_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownSettings {
    pub age_secs: u64,
    pub bot_name_mention_secs: u64,
    pub greeting_spam_secs: u64,
    pub repeat_spam_secs: u64,
    /// Gift thanks are ungated unless set
    pub gift_thanks_secs: Option<u64>,
}

impl Default for CooldownSettings {
    fn default() -> Self {
        Self {
            age_secs: 5 * 60,
            bot_name_mention_secs: 5 * 60,
            greeting_spam_secs: 3 * 60,
            repeat_spam_secs: 3 * 60,
            gift_thanks_secs: None,
        }
    }
}

impl CooldownSettings {
    pub fn gate(&self) -> CooldownGate {
        CooldownGate::new(
            chrono_secs(self.age_secs),
            chrono_secs(self.bot_name_mention_secs),
            chrono_secs(self.greeting_spam_secs),
            chrono_secs(self.repeat_spam_secs),
            self.gift_thanks_secs.map(chrono_secs),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationSettings {
    pub history_capacity: usize,
    pub window_secs: u64,
    pub repeat_threshold: usize,
    pub greeting_threshold: usize,
    pub similarity_threshold: usize,
    pub history_scope: HistoryScope,
    /// Greeting targets that are never treated as viewer-to-viewer chatter
    pub allowed_reply_targets: Vec<String>,
    /// `{name}` is replaced with the commenter's display name
    pub greeting_spam_warning: String,
    pub repeat_spam_warning: String,
    /// `{item}` is replaced with a suggestion from the platform's demand items
    pub demand_reply_template: String,
}

impl Default for ModerationSettings {
    fn default() -> Self {
        Self {
            history_capacity: crate::bot::history::MAX_HISTORY,
            window_secs: crate::bot::spam::DEFAULT_WINDOW_SECONDS as u64,
            repeat_threshold: crate::bot::spam::REPEAT_THRESHOLD,
            greeting_threshold: crate::bot::spam::GREETING_THRESHOLD,
            similarity_threshold: crate::bot::spam::SIMILARITY_THRESHOLD,
            history_scope: HistoryScope::Global,
            allowed_reply_targets: crate::bot::reply_detector::DEFAULT_ALLOWED_TARGETS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            greeting_spam_warning:
                "{name}さん、視聴者同士の挨拶はほどほどにしてもらっていいですか？配信者さんへのコメントでお願いしたいんすよね。"
                    .to_string(),
            repeat_spam_warning: "{name}さん、同じコメントの連投はやめてもらっていいですか？".to_string(),
            demand_reply_template: "{item}くらい投げてくれたら考えてもいいと思うおいらです。。。".to_string(),
        }
    }
}

impl ModerationSettings {
    pub fn thresholds(&self) -> SpamThresholds {
        SpamThresholds {
            repeat: self.repeat_threshold,
            greeting: self.greeting_threshold,
            similarity: self.similarity_threshold,
            window: chrono_secs(self.window_secs),
            history_capacity: self.history_capacity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub detection_temperature: f32,
    pub reply_temperature: f32,
    pub max_reply_tokens: u32,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o".to_string(),
            detection_temperature: 0.3,
            reply_temperature: 0.7,
            max_reply_tokens: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromotionSettings {
    pub enabled: bool,
    pub initial_delay_secs: u64,
    pub interval_secs: u64,
    /// Pause between the primary and the secondary message of one cycle
    pub follow_up_delay_secs: u64,
    pub primary: String,
    /// Rotated round-robin, one per cycle
    pub secondaries: Vec<String>,
    pub targets: Vec<PlatformKind>,
}

impl Default for PromotionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_secs: 15 * 60,
            interval_secs: 30 * 60,
            follow_up_delay_secs: 10,
            primary: "配信が気に入ったら、高評価とチャンネル登録をしてもらえると助かるんすよね。ハートの連打も歓迎らしいです。".to_string(),
            secondaries: vec![
                "公式サイトにかなり長いプロフィールが載ってるんで、暇なときに読んでみるといいと思いますけどね。".to_string(),
                "オリジナル曲のMVも公開されてるんで、見ておいたほうがいいんじゃないすかね。".to_string(),
            ],
            targets: vec![PlatformKind::YouTube],
        }
    }
}

impl PromotionSettings {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn follow_up_delay(&self) -> Duration {
        Duration::from_secs(self.follow_up_delay_secs)
    }
}

impl WatcherConfig {
    /// Overlay secrets and endpoints from the environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()));
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("WEBSOCKET_URL") {
            self.core.websocket_url = url;
        }
        if let Some(id) = lookup("BOT_USER_ID") {
            self.core.bot_user_id = id;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.classifier.api_key = Some(key);
        }
        if let Some(model) = lookup("OPENAI_MODEL") {
            self.classifier.model = model;
        }
        if let Some(key) = lookup("YOUTUBE_API_KEY") {
            self.platforms.youtube.api_key = Some(key);
        }
        if let Some(token) = lookup("YOUTUBE_OAUTH_TOKEN") {
            self.platforms.youtube.access_token = Some(token);
        }
        if let Some(token) = lookup("TWICAS_ACCESS_TOKEN") {
            self.platforms.twitcasting.access_token = Some(token);
        }
        if let Some(url) = lookup("TIKTOK_RELAY_URL") {
            self.platforms.tiktok.endpoint = Some(url);
        }
    }

    fn durations(&self) -> Vec<(&'static str, u64)> {
        let mut durations = vec![
            ("scheduler.flush_interval_secs", self.scheduler.flush_interval_secs),
            ("scheduler.pacing_secs", self.scheduler.pacing_secs),
            ("scheduler.call_timeout_secs", self.scheduler.call_timeout_secs),
            ("cooldowns.age_secs", self.cooldowns.age_secs),
            ("cooldowns.bot_name_mention_secs", self.cooldowns.bot_name_mention_secs),
            ("cooldowns.greeting_spam_secs", self.cooldowns.greeting_spam_secs),
            ("cooldowns.repeat_spam_secs", self.cooldowns.repeat_spam_secs),
            ("moderation.window_secs", self.moderation.window_secs),
            ("promotion.initial_delay_secs", self.promotion.initial_delay_secs),
            ("promotion.interval_secs", self.promotion.interval_secs),
            ("promotion.follow_up_delay_secs", self.promotion.follow_up_delay_secs),
        ];
        if let Some(gift) = self.cooldowns.gift_thanks_secs {
            durations.push(("cooldowns.gift_thanks_secs", gift));
        }
        durations
    }

    pub fn validate(&self) -> ModerationResult<()> {
        let invalid = |msg: &str| Err(ModerationError::Config(msg.to_string()));

        if let Some((name, _)) = self.durations().into_iter().find(|(_, secs)| *secs > MAX_CONFIG_SECS) {
            return invalid(&format!("{} must not exceed {} seconds", name, MAX_CONFIG_SECS));
        }

        if self.platforms.enabled().is_empty() {
            return invalid("at least one platform must be enabled");
        }
        if self.queue.capacity == 0 {
            return invalid("queue.capacity must be greater than zero");
        }
        if self.scheduler.flush_interval_secs == 0 {
            return invalid("scheduler.flush_interval_secs must be greater than zero");
        }
        if self.scheduler.pacing_secs == 0 {
            return invalid("scheduler.pacing_secs must be greater than zero");
        }
        if self.scheduler.call_timeout_secs == 0 {
            return invalid("scheduler.call_timeout_secs must be greater than zero");
        }
        if self.moderation.history_capacity == 0 {
            return invalid("moderation.history_capacity must be greater than zero");
        }
        if self.moderation.repeat_threshold == 0 || self.moderation.greeting_threshold == 0 {
            return invalid("moderation thresholds must be greater than zero");
        }
        if self.promotion.enabled {
            if self.promotion.primary.trim().is_empty() {
                return invalid("promotion.primary must not be empty when promotion is enabled");
            }
            if self.promotion.secondaries.is_empty() {
                return invalid("promotion.secondaries needs at least one message when promotion is enabled");
            }
            if self.promotion.interval_secs == 0 {
                return invalid("promotion.interval_secs must be greater than zero");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Yaml,
    Toml,
    Json,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()) {
            Some(ext) if ext == "toml" => ConfigFormat::Toml,
            Some(ext) if ext == "json" => ConfigFormat::Json,
            _ => ConfigFormat::Yaml,
        }
    }

    fn parse(&self, content: &str) -> Result<WatcherConfig> {
        let config = match self {
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
        };
        Ok(config)
    }

    fn render(&self, config: &WatcherConfig) -> Result<String> {
        let content = match self {
            ConfigFormat::Yaml => serde_yaml::to_string(config)?,
            ConfigFormat::Toml => toml::to_string_pretty(config)?,
            ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        };
        Ok(content)
    }
}

/// Loads the configuration file, creating it with defaults when missing
#[derive(Clone)]
pub struct ConfigurationManager {
    config_path: PathBuf,
    config: Arc<RwLock<WatcherConfig>>,
}

impl ConfigurationManager {
    pub fn new<P: AsRef<Path>>(config_path: P) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            config: Arc::new(RwLock::new(WatcherConfig::default())),
        }
    }

    pub async fn initialize(&self) -> Result<()> {
        if !self.config_path.exists() {
            warn!("Config file not found, creating default: {}", self.config_path.display());
            self.save_config(&WatcherConfig::default()).await?;
        }

        self.reload().await?;
        info!("Configuration loaded from {}", self.config_path.display());
        Ok(())
    }

    /// Re-read the file, overlay the environment and validate
    pub async fn reload(&self) -> Result<()> {
        let content = fs::read_to_string(&self.config_path)
            .await
            .with_context(|| format!("Failed to read {}", self.config_path.display()))?;

        let mut config = ConfigFormat::from_path(&self.config_path)
            .parse(&content)
            .with_context(|| format!("Failed to parse {}", self.config_path.display()))?;

        config.apply_env_overrides();
        config.validate()?;

        debug!("Enabled platforms: {:?}", config.platforms.enabled());
        *self.config.write().await = config;
        Ok(())
    }

    pub async fn save_config(&self, config: &WatcherConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await?;
                info!("Created configuration directory: {}", parent.display());
            }
        }

        let content = ConfigFormat::from_path(&self.config_path).render(config)?;
        fs::write(&self.config_path, content)
            .await
            .with_context(|| format!("Failed to write {}", self.config_path.display()))?;
        Ok(())
    }

    pub async fn get_config(&self) -> WatcherConfig {
        self.config.read().await.clone()
    }

}
