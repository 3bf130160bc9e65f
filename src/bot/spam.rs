// src/bot/spam.rs - Repetition and greeting-spam screening over recent comment history

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::bot::history::{CommentHistory, HistoryRecord, MAX_HISTORY};
use crate::bot::reply_detector::ReplyDetector;
use crate::types::{PlatformKind, SpamDetectionResult, SpamType};

pub const REPEAT_THRESHOLD: usize = 3;
pub const GREETING_THRESHOLD: usize = 2;
pub const SIMILARITY_THRESHOLD: usize = 3;
pub const DEFAULT_WINDOW_SECONDS: i64 = 5 * 60;

/// Whether users on different platforms share one history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryScope {
    #[default]
    Global,
    PerPlatform,
}

#[derive(Debug, Clone)]
pub struct SpamThresholds {
    pub repeat: usize,
    pub greeting: usize,
    pub similarity: usize,
    pub window: Duration,
    pub history_capacity: usize,
}

impl Default for SpamThresholds {
    fn default() -> Self {
        Self {
            repeat: REPEAT_THRESHOLD,
            greeting: GREETING_THRESHOLD,
            similarity: SIMILARITY_THRESHOLD,
            window: Duration::seconds(DEFAULT_WINDOW_SECONDS),
            history_capacity: MAX_HISTORY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum HistoryKey {
    Global,
    Platform(PlatformKind),
}

pub struct SpamDetector {
    histories: HashMap<HistoryKey, CommentHistory>,
    reply_detector: ReplyDetector,
    thresholds: SpamThresholds,
    scope: HistoryScope,
}

impl SpamDetector {
    pub fn new(reply_detector: ReplyDetector, thresholds: SpamThresholds, scope: HistoryScope) -> Self {
        Self {
            histories: HashMap::new(),
            reply_detector,
            thresholds,
            scope,
        }
    }

    pub fn with_defaults() -> Result<Self> {
        Ok(Self::new(
            ReplyDetector::with_default_targets()?,
            SpamThresholds::default(),
            HistoryScope::default(),
        ))
    }

    /// Record the message and classify it against the user's recent comments.
    /// The recorded message itself is part of the recent set.
    pub fn detect_at(
        &mut self,
        platform: PlatformKind,
        user_id: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> SpamDetectionResult {
        let key = match self.scope {
            HistoryScope::Global => HistoryKey::Global,
            HistoryScope::PerPlatform => HistoryKey::Platform(platform),
        };
        let capacity = self.thresholds.history_capacity;
        let history = self
            .histories
            .entry(key)
            .or_insert_with(|| CommentHistory::new(capacity));

        history.add(HistoryRecord {
            user_id: user_id.to_string(),
            message: message.to_string(),
            timestamp: now,
        });

        let recent = history.recent_comments(user_id, self.thresholds.window, now);

        if self.reply_detector.is_greeting_reply(message) {
            let greeting_count = recent
                .iter()
                .filter(|r| self.reply_detector.is_greeting_reply(&r.message))
                .count();

            if greeting_count >= self.thresholds.greeting {
                debug!("Greeting spam from {} on {} (score {})", user_id, platform, greeting_count);
                return SpamDetectionResult::spam(SpamType::GreetingSpam, greeting_count);
            }
        }

        let similar_count = recent
            .iter()
            .filter(|r| is_similar_message(&r.message, message, self.thresholds.similarity))
            .count();

        if similar_count >= self.thresholds.repeat {
            debug!("Repetitive spam from {} on {} (score {})", user_id, platform, similar_count);
            return SpamDetectionResult::spam(SpamType::Repetitive, similar_count);
        }

        SpamDetectionResult::clean()
    }

    #[cfg(test)]
    pub(crate) fn history_len(&self) -> usize {
        self.histories.values().map(CommentHistory::len).sum()
    }
}

/// Exact match, match ignoring whitespace, or a small absolute edit distance.
/// Short messages would be over-penalised by a normalised similarity score.
pub fn is_similar_message(a: &str, b: &str, max_distance: usize) -> bool {
    if a == b {
        return true;
    }

    let strip = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
    if strip(a) == strip(b) {
        return true;
    }

    levenshtein_distance(a, b) <= max_distance
}

/// Levenshtein distance over Unicode scalar values
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}
