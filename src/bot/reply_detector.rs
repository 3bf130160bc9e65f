// src/bot/reply_detector.rs - Detects viewers greeting each other in public chat

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};

const HONORIFICS: &[&str] = &["さん", "くん", "ちゃん", "君", "さま", "のお兄さん", "のお姉さん"];

const GREETINGS: &[&str] = &[
    "おは",
    "こんにちは",
    "こんにちわ",
    "こんばんは",
    "こんばんわ",
    "はじめまして",
    "よろしく",
    "お疲れ様",
    "おつかれさま",
    "おやすみ",
    "いってらっしゃい",
    "いってきます",
    "ただいま",
    "おかえり",
];

/// Streamer name variants, the collective "everyone", and the bot itself
pub const DEFAULT_ALLOWED_TARGETS: &[&str] = &["ぁゃぴ", "あやぴ", "あゃぴ", "ぁやぴ", "みな", "ひろゆき"];

/// Matches messages shaped like "<name><honorific>、<greeting>" whose target is
/// not on the allow-list.
pub struct ReplyDetector {
    pattern: Regex,
    allowed_targets: Vec<String>,
}

impl ReplyDetector {
    pub fn new<I, S>(allowed_targets: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let honorifics = alternation(HONORIFICS);
        let greetings = alternation(GREETINGS);
        let source = format!(r"^([^、,]+)({})[、,\s]*({})", honorifics, greetings);

        let pattern = RegexBuilder::new(&source)
            .case_insensitive(true)
            .build()
            .context("Failed to compile greeting reply pattern")?;

        let allowed_targets = allowed_targets
            .into_iter()
            .map(|t| t.as_ref().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        Ok(Self { pattern, allowed_targets })
    }

    pub fn with_default_targets() -> Result<Self> {
        Self::new(DEFAULT_ALLOWED_TARGETS.iter().copied())
    }

    pub fn is_greeting_reply(&self, message: &str) -> bool {
        let Some(captures) = self.pattern.captures(message) else {
            return false;
        };
        let target = captures.get(1).map(|m| m.as_str().to_lowercase()).unwrap_or_default();

        !self.allowed_targets.iter().any(|allowed| target.contains(allowed.as_str()))
    }
}

fn alternation(words: &[&str]) -> String {
    words.iter().map(|w| regex::escape(w)).collect::<Vec<_>>().join("|")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> ReplyDetector {
        ReplyDetector::with_default_targets().unwrap()
    }

    #[test]
    fn test_flags_viewer_to_viewer_greeting() {
        let detector = detector();
        assert!(detector.is_greeting_reply("田中さん、おはよう"));
        assert!(detector.is_greeting_reply("たろうくん こんばんは！"));
        assert!(detector.is_greeting_reply("Bobさん,お疲れ様です"));
        assert!(detector.is_greeting_reply("近所のお兄さんのお姉さんただいま"));
    }

    #[test]
    fn test_allows_greetings_to_streamer_and_bot() {
        let detector = detector();
        assert!(!detector.is_greeting_reply("ぁゃぴさん、おはよう"));
        assert!(!detector.is_greeting_reply("あやぴちゃんこんにちは"));
        assert!(!detector.is_greeting_reply("みなさんこんばんは"));
        assert!(!detector.is_greeting_reply("ひろゆきさん、おつかれさま"));
    }

    #[test]
    fn test_ignores_non_greetings() {
        let detector = detector();
        assert!(!detector.is_greeting_reply("おはよう"));
        assert!(!detector.is_greeting_reply("田中さんって誰"));
        assert!(!detector.is_greeting_reply("今日も配信ありがとう！"));
    }

    #[test]
    fn test_allow_list_is_case_insensitive() {
        let detector = ReplyDetector::new(["Moderator"]).unwrap();
        assert!(!detector.is_greeting_reply("MODERATORさん、こんにちは"));
        assert!(detector.is_greeting_reply("Aliceさん、こんにちは"));
    }
}
