use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use rand::Rng;
use std::collections::HashMap;

use crate::config::WatcherConfig;
use crate::types::{Comment, CooldownCategory, ModerationResult, PlatformKind, StreamTarget};

pub mod tiktok;
pub mod twitcasting;
pub mod youtube;

pub const DEFAULT_BIG_GIFT_AMOUNT: f64 = 1000.0;
/// Amounts in any other currency are not compared against the big-gift threshold
pub const BASE_CURRENCY: &str = "JPY";
const BIG_GIFT_SUFFIX: &str = ":big";

/// How warmly a gift is acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiftTier {
    Standard,
    Big,
}

/// A named medium or heavy item is big, as is an amount at or above
/// `big_amount` in the base currency (or with no currency given).
pub fn gift_tier(comment: &Comment, items: &DemandItems, big_amount: f64) -> GiftTier {
    if comment.gift_name.as_deref().is_some_and(|name| items.is_big_item(name)) {
        return GiftTier::Big;
    }
    let comparable = comment
        .currency
        .as_deref()
        .map_or(true, |c| c.trim().eq_ignore_ascii_case(BASE_CURRENCY));
    match comment.amount {
        Some(amount) if comparable && amount >= big_amount => GiftTier::Big,
        _ => GiftTier::Standard,
    }
}

/// Tiered gift suggestions used when answering "demand" comments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemandItems {
    pub light: Vec<String>,
    pub medium: Vec<String>,
    pub heavy: Vec<String>,
}

impl DemandItems {
    pub fn new(light: &[&str], medium: &[&str], heavy: &[&str]) -> Self {
        let owned = |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };
        Self {
            light: owned(light),
            medium: owned(medium),
            heavy: owned(heavy),
        }
    }

    pub fn is_big_item(&self, name: &str) -> bool {
        let name = name.trim();
        self.medium.iter().chain(&self.heavy).any(|item| item == name)
    }

    /// Pick a random non-empty tier, then a random item from it
    pub fn pick(&self) -> Option<&str> {
        let tiers: Vec<&Vec<String>> = [&self.light, &self.medium, &self.heavy]
            .into_iter()
            .filter(|tier| !tier.is_empty())
            .collect();
        if tiers.is_empty() {
            return None;
        }

        let mut rng = rand::rng();
        let tier = tiers[rng.random_range(0..tiers.len())];
        Some(tier[rng.random_range(0..tier.len())].as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpamCooldowns {
    pub last_greeting_spam: Option<DateTime<Utc>>,
    pub last_repeat_spam: Option<DateTime<Utc>>,
}

/// Mutable per-platform record. Each adapter owns exactly one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformState {
    pub last_age_response: Option<DateTime<Utc>>,
    pub last_bot_mention_response: Option<DateTime<Utc>>,
    pub last_gift_response: Option<DateTime<Utc>>,
    pub spam: SpamCooldowns,
    /// Account the bot posts as; its echoed comments are ignored
    pub bot_user_id: String,
}

impl PlatformState {
    pub fn new(bot_user_id: impl Into<String>) -> Self {
        Self {
            bot_user_id: bot_user_id.into(),
            ..Default::default()
        }
    }

    pub fn last_fired(&self, category: CooldownCategory) -> Option<DateTime<Utc>> {
        match category {
            CooldownCategory::AgeResponse => self.last_age_response,
            CooldownCategory::BotNameMention => self.last_bot_mention_response,
            CooldownCategory::GiftThanks => self.last_gift_response,
            CooldownCategory::GreetingSpam => self.spam.last_greeting_spam,
            CooldownCategory::RepeatSpam => self.spam.last_repeat_spam,
        }
    }

    /// Record a firing. Timestamps never move backwards.
    pub fn record_fired(&mut self, category: CooldownCategory, at: DateTime<Utc>) {
        let slot = match category {
            CooldownCategory::AgeResponse => &mut self.last_age_response,
            CooldownCategory::BotNameMention => &mut self.last_bot_mention_response,
            CooldownCategory::GiftThanks => &mut self.last_gift_response,
            CooldownCategory::GreetingSpam => &mut self.spam.last_greeting_spam,
            CooldownCategory::RepeatSpam => &mut self.spam.last_repeat_spam,
        };
        *slot = Some(slot.map_or(at, |previous| previous.max(at)));
    }

    pub fn is_own_comment(&self, comment: &Comment) -> bool {
        !self.bot_user_id.is_empty() && comment.user_id == self.bot_user_id
    }
}

/// Capabilities every streaming platform adapter provides
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    fn platform(&self) -> PlatformKind;

    /// Bind the adapter to a live stream. Re-initializing with the URL it is
    /// already bound to succeeds without touching the network.
    async fn initialize(&mut self, target: &StreamTarget) -> ModerationResult<()>;

    /// Whether the adapter can currently deliver messages
    fn is_ready(&self) -> bool;

    async fn post_message(&self, text: &str) -> ModerationResult<()>;

    /// Platform-specific acknowledgement of a gift or donation
    async fn post_thanks_message(&self, comment: &Comment) -> ModerationResult<()>;

    fn state(&self) -> &PlatformState;

    fn state_mut(&mut self) -> &mut PlatformState;

    fn demand_items(&self) -> &DemandItems;

    /// Fallback thanks lines keyed by language code ("ja", "en", ...)
    fn donation_messages(&self) -> &HashMap<String, Vec<String>>;
}

/// Build adapters for every platform enabled in the configuration
pub fn build_enabled(config: &WatcherConfig) -> Result<Vec<Box<dyn ChatPlatform>>> {
    let mut adapters: Vec<Box<dyn ChatPlatform>> = Vec::new();

    for kind in PlatformKind::ALL {
        let settings = config.platforms.get(kind);
        if !settings.enabled {
            continue;
        }
        let bot_user_id = settings
            .bot_user_id
            .clone()
            .unwrap_or_else(|| config.core.bot_user_id.clone());

        let adapter: Box<dyn ChatPlatform> = match kind {
            PlatformKind::YouTube => Box::new(youtube::YouTubePlatform::new(
                youtube::YouTubeConfig::from_settings(settings)?,
                bot_user_id,
            )),
            PlatformKind::Twitcasting => Box::new(twitcasting::TwitcastingPlatform::new(
                twitcasting::TwitcastingConfig::from_settings(settings)?,
                bot_user_id,
            )),
            PlatformKind::TikTok => Box::new(tiktok::TikTokPlatform::new(
                tiktok::TikTokConfig::from_settings(settings),
                bot_user_id,
            )),
        };
        info!("Built {} adapter", kind);
        adapters.push(adapter);
    }

    Ok(adapters)
}

/// Rough language guess for picking a thanks message: any kana or CJK
/// ideograph means Japanese, otherwise English.
pub fn detect_language(text: &str) -> &'static str {
    let japanese = text.chars().any(|c| {
        matches!(c,
            '\u{3040}'..='\u{309F}'   // hiragana
            | '\u{30A0}'..='\u{30FF}' // katakana
            | '\u{4E00}'..='\u{9FFF}' // CJK unified ideographs
            | '\u{FF66}'..='\u{FF9F}' // half-width katakana
        )
    });
    if japanese { "ja" } else { "en" }
}

/// Choose a thanks line for a donor and fill in `{name}`. Big gifts look for
/// `"<lang>:big"` lines first; any tier falls back to Japanese.
pub fn pick_donation_message(
    messages: &HashMap<String, Vec<String>>,
    comment: &Comment,
    tier: GiftTier,
) -> Option<String> {
    let language = detect_language(&format!("{}{}", comment.display_name, comment.text));
    let mut keys = Vec::with_capacity(4);
    if tier == GiftTier::Big {
        keys.push(format!("{}{}", language, BIG_GIFT_SUFFIX));
        keys.push(format!("ja{}", BIG_GIFT_SUFFIX));
    }
    keys.push(language.to_string());
    keys.push("ja".to_string());

    let candidates = keys
        .iter()
        .find_map(|key| messages.get(key).filter(|lines| !lines.is_empty()))?;
    let line = &candidates[rand::rng().random_range(0..candidates.len())];
    Some(line.replace("{name}", &comment.display_name))
}

/// Turn a non-2xx response into an error carrying the body text
pub(crate) async fn ensure_success(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
    Err(anyhow::anyhow!("{} failed {}: {}", action, status, error_text))
}

/// Gifts below the configured minimum are not acknowledged
pub(crate) fn meets_minimum(comment: &Comment, minimum: Option<f64>) -> bool {
    match (minimum, comment.amount) {
        (Some(min), Some(amount)) => amount >= min,
        (Some(_), None) => false,
        (None, _) => true,
    }
}

pub(crate) fn donation_table(entries: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
    entries
        .iter()
        .map(|(lang, lines)| (lang.to_string(), lines.iter().map(|l| l.to_string()).collect()))
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_record_fired_is_monotonic() {
        let mut state = PlatformState::new("bot");
        let t0 = Utc::now();

        state.record_fired(CooldownCategory::AgeResponse, t0);
        state.record_fired(CooldownCategory::AgeResponse, t0 - Duration::seconds(30));
        assert_eq!(state.last_fired(CooldownCategory::AgeResponse), Some(t0));
        assert_eq!(state.last_fired(CooldownCategory::RepeatSpam), None);

        state.record_fired(CooldownCategory::GreetingSpam, t0);
        assert_eq!(state.spam.last_greeting_spam, Some(t0));
    }

    #[test]
    fn test_language_detection() {
        assert_eq!(detect_language("ナイスパ"), "ja");
        assert_eq!(detect_language("田中"), "ja");
        assert_eq!(detect_language("great stream!"), "en");
    }

    #[test]
    fn test_donation_message_falls_back_to_japanese() {
        let table = donation_table(&[("ja", &["{name}さん、ナイスパ！"])]);
        let comment = Comment::new("youtube", "u1", "Alice", "love it").with_gift(Some(500.0));
        assert_eq!(
            pick_donation_message(&table, &comment, GiftTier::Standard).as_deref(),
            Some("Aliceさん、ナイスパ！")
        );
        assert_eq!(
            pick_donation_message(&table, &comment, GiftTier::Big).as_deref(),
            Some("Aliceさん、ナイスパ！")
        );
    }

    #[test]
    fn test_big_gifts_use_big_lines() {
        let table = donation_table(&[
            ("ja", &["{name}さん、ありがとう"]),
            ("en", &["Thanks {name}!"]),
            ("ja:big", &["{name}さん、太っ腹すぎませんかね"]),
        ]);
        let comment = Comment::new("youtube", "u1", "Bob", "wow").with_gift(Some(5000.0));

        assert_eq!(
            pick_donation_message(&table, &comment, GiftTier::Big).as_deref(),
            Some("Bobさん、太っ腹すぎませんかね")
        );
        assert_eq!(
            pick_donation_message(&table, &comment, GiftTier::Standard).as_deref(),
            Some("Thanks Bob!")
        );
    }

    #[test]
    fn test_gift_tier_by_item_amount_and_currency() {
        let items = DemandItems::new(&["お茶"], &["お茶爆10"], &["お茶爆100"]);
        let gift = |amount: Option<f64>| Comment::new("twicas", "u1", "A", "").with_gift(amount);

        let mut tea = gift(None);
        tea.gift_name = Some("お茶".to_string());
        assert_eq!(gift_tier(&tea, &items, 1000.0), GiftTier::Standard);
        tea.gift_name = Some(" お茶爆100 ".to_string());
        assert_eq!(gift_tier(&tea, &items, 1000.0), GiftTier::Big);

        assert_eq!(gift_tier(&gift(Some(999.0)), &items, 1000.0), GiftTier::Standard);
        assert_eq!(gift_tier(&gift(Some(1000.0)), &items, 1000.0), GiftTier::Big);

        let mut dollars = gift(Some(5000.0));
        dollars.currency = Some("USD".to_string());
        assert_eq!(gift_tier(&dollars, &items, 1000.0), GiftTier::Standard);
        dollars.currency = Some("jpy".to_string());
        assert_eq!(gift_tier(&dollars, &items, 1000.0), GiftTier::Big);
    }

    #[test]
    fn test_minimum_thanks_amount() {
        let gift = Comment::new("tiktok", "u1", "A", "").with_gift(Some(5.0));
        assert!(meets_minimum(&gift, None));
        assert!(meets_minimum(&gift, Some(5.0)));
        assert!(!meets_minimum(&gift, Some(10.0)));
        assert!(!meets_minimum(&Comment::new("tiktok", "u1", "A", "").with_gift(None), Some(1.0)));
    }

    #[test]
    fn test_demand_items_pick_skips_empty_tiers() {
        let items = DemandItems::new(&[], &["ケーキ"], &[]);
        assert_eq!(items.pick(), Some("ケーキ"));
        assert_eq!(DemandItems::default().pick(), None);
    }

    #[test]
    fn test_own_comment_detection() {
        let state = PlatformState::new("bot-1");
        assert!(state.is_own_comment(&Comment::new("youtube", "bot-1", "Bot", "hi")));
        assert!(!state.is_own_comment(&Comment::new("youtube", "viewer", "V", "hi")));
        assert!(!PlatformState::default().is_own_comment(&Comment::new("youtube", "", "V", "hi")));
    }
}
