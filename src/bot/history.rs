// src/bot/history.rs - Sliding log of recent comments used for spam screening

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

pub const MAX_HISTORY: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub user_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Keeps the last `capacity` records regardless of their age
#[derive(Debug)]
pub struct CommentHistory {
    records: VecDeque<HistoryRecord>,
    capacity: usize,
}

impl CommentHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn add(&mut self, record: HistoryRecord) {
        self.records.push_back(record);
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }

    /// Records by `user_id` strictly younger than `window` at `now`
    pub fn recent_comments(&self, user_id: &str, window: Duration, now: DateTime<Utc>) -> Vec<&HistoryRecord> {
        self.records
            .iter()
            .filter(|r| r.user_id == user_id && now.signed_duration_since(r.timestamp) < window)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for CommentHistory {
    fn default() -> Self {
        Self::new(MAX_HISTORY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(user: &str, message: &str, timestamp: DateTime<Utc>) -> HistoryRecord {
        HistoryRecord {
            user_id: user.to_string(),
            message: message.to_string(),
            timestamp,
        }
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut history = CommentHistory::default();
        let now = Utc::now();
        for n in 0..45 {
            history.add(record("u", &format!("m{}", n), now));
            assert!(history.len() <= MAX_HISTORY);
        }
        let recent = history.recent_comments("u", Duration::minutes(5), now);
        assert_eq!(recent.len(), MAX_HISTORY);
        assert_eq!(recent[0].message, "m15");
    }

    #[test]
    fn test_recent_filters_user_and_window() {
        let mut history = CommentHistory::default();
        let now = Utc::now();
        history.add(record("a", "old", now - Duration::minutes(5)));
        history.add(record("a", "fresh", now - Duration::minutes(4)));
        history.add(record("b", "other user", now));

        let recent = history.recent_comments("a", Duration::minutes(5), now);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].message, "fresh");
    }
}
