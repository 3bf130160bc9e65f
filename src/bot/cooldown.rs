// src/bot/cooldown.rs - Per-platform, per-category reply throttling

use chrono::{DateTime, Duration, Utc};
use log::debug;

use crate::platforms::PlatformState;
use crate::types::CooldownCategory;

/// Cooldown durations per reply category. The timestamps themselves live in
/// each adapter's `PlatformState`, so one gate serves every platform.
#[derive(Debug, Clone)]
pub struct CooldownGate {
    age_response: Duration,
    bot_name_mention: Duration,
    greeting_spam: Duration,
    repeat_spam: Duration,
    gift_thanks: Option<Duration>,
}

impl CooldownGate {
    pub fn new(
        age_response: Duration,
        bot_name_mention: Duration,
        greeting_spam: Duration,
        repeat_spam: Duration,
        gift_thanks: Option<Duration>,
    ) -> Self {
        Self {
            age_response,
            bot_name_mention,
            greeting_spam,
            repeat_spam,
            gift_thanks,
        }
    }

    /// `None` means the category is never throttled
    pub fn duration(&self, category: CooldownCategory) -> Option<Duration> {
        match category {
            CooldownCategory::AgeResponse => Some(self.age_response),
            CooldownCategory::BotNameMention => Some(self.bot_name_mention),
            CooldownCategory::GreetingSpam => Some(self.greeting_spam),
            CooldownCategory::RepeatSpam => Some(self.repeat_spam),
            CooldownCategory::GiftThanks => self.gift_thanks,
        }
    }

    pub fn is_on_cooldown(&self, state: &PlatformState, category: CooldownCategory, now: DateTime<Utc>) -> bool {
        let (Some(duration), Some(last)) = (self.duration(category), state.last_fired(category)) else {
            return false;
        };
        now.signed_duration_since(last) < duration
    }

    /// Record a firing when the category is off cooldown. Returns whether the
    /// caller may emit; a suppressed reply is simply dropped.
    pub fn try_fire(&self, state: &mut PlatformState, category: CooldownCategory, now: DateTime<Utc>) -> bool {
        if self.is_on_cooldown(state, category, now) {
            debug!("{:?} suppressed by cooldown", category);
            return false;
        }
        state.record_fired(category, now);
        true
    }
}

impl Default for CooldownGate {
    fn default() -> Self {
        Self::new(
            Duration::minutes(5),
            Duration::minutes(5),
            Duration::minutes(3),
            Duration::minutes(3),
            None,
        )
    }
}
