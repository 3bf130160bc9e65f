// src/bot/scheduler.rs - Periodic drain, classify and reply cycle

use anyhow::Result;
use chrono::Utc;
use futures_util::FutureExt;
use log::{debug, error, info, warn};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, timeout};

use crate::bot::cooldown::CooldownGate;
use crate::bot::queue::BoundedQueue;
use crate::bot::reply_detector::ReplyDetector;
use crate::bot::router::{CommentRouter, SharedPlatform};
use crate::bot::spam::SpamDetector;
use crate::bot::task::TaskHandle;
use crate::bot::text::TextCleaner;
use crate::classifier::Classifier;
use crate::config::{SchedulerSettings, WatcherConfig};
use crate::types::{
    ClassifiedReply, Comment, CooldownCategory, DetectionCategory, ModerationError, PlatformKind, SpamType,
};

/// Canned texts the scheduler fills in itself
#[derive(Debug, Clone)]
pub struct ReplyWordings {
    pub greeting_spam: String,
    pub repeat_spam: String,
    pub demand: String,
}

impl ReplyWordings {
    fn warning(&self, spam_type: SpamType, display_name: &str) -> String {
        let template = match spam_type {
            SpamType::GreetingSpam => &self.greeting_spam,
            SpamType::Repetitive => &self.repeat_spam,
        };
        template.replace("{name}", display_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle was still running
    Skipped,
    Empty,
    Completed { drained: usize, emitted: usize },
    Panicked,
}

/// A drained comment that survived routing, with its screening verdict
struct PendingItem {
    comment: Comment,
    kind: PlatformKind,
    platform: SharedPlatform,
    text: String,
    spam: Option<SpamType>,
}

enum Plan {
    Warn(SpamType),
    Reply(ClassifiedReply),
}

/// Releases the in-flight flag however the cycle ends
struct FlushGuard<'a>(&'a AtomicBool);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct FlushScheduler {
    queue: Arc<BoundedQueue>,
    router: Arc<CommentRouter>,
    classifier: Arc<dyn Classifier>,
    spam: Mutex<SpamDetector>,
    cleaner: TextCleaner,
    gate: CooldownGate,
    wordings: ReplyWordings,
    timing: SchedulerSettings,
    flushing: AtomicBool,
}

impl FlushScheduler {
    pub fn new(
        queue: Arc<BoundedQueue>,
        router: Arc<CommentRouter>,
        classifier: Arc<dyn Classifier>,
        config: &WatcherConfig,
    ) -> Result<Self> {
        let moderation = &config.moderation;
        let reply_detector = ReplyDetector::new(&moderation.allowed_reply_targets)?;
        let spam = SpamDetector::new(reply_detector, moderation.thresholds(), moderation.history_scope);

        Ok(Self {
            queue,
            router,
            classifier,
            spam: Mutex::new(spam),
            cleaner: TextCleaner::new()?,
            gate: config.cooldowns.gate(),
            wordings: ReplyWordings {
                greeting_spam: moderation.greeting_spam_warning.clone(),
                repeat_spam: moderation.repeat_spam_warning.clone(),
                demand: moderation.demand_reply_template.clone(),
            },
            timing: config.scheduler.clone(),
            flushing: AtomicBool::new(false),
        })
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.load(Ordering::SeqCst)
    }

    /// Run one cycle unless one is already in flight. A panic inside the
    /// cycle is contained here so the ticker keeps going.
    pub async fn run_cycle(&self) -> CycleOutcome {
        if self
            .flushing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Flush already in progress, skipping tick");
            return CycleOutcome::Skipped;
        }
        let _guard = FlushGuard(&self.flushing);

        match AssertUnwindSafe(self.flush()).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                error!("Flush cycle panicked, comments of this cycle are dropped");
                CycleOutcome::Panicked
            }
        }
    }

    async fn flush(&self) -> CycleOutcome {
        let drained = self.queue.drain_all();
        if drained.is_empty() {
            debug!("Queue empty, nothing to flush");
            return CycleOutcome::Empty;
        }
        let drained_count = drained.len();
        info!("Flushing {} queued comments", drained_count);

        let mut items = Vec::with_capacity(drained_count);
        for comment in drained {
            let Some((kind, platform)) = self.router.route(&comment.platform).await else {
                continue;
            };
            let text = self.cleaner.clean(&comment.text);
            if text.is_empty() {
                debug!("Dropping empty {} comment from {}", kind, comment.user_id);
                continue;
            }
            let spam = self.screen(kind, &comment, &text);
            items.push(PendingItem { comment, kind, platform, text, spam });
        }

        let clean_texts: Vec<String> = items
            .iter()
            .filter(|item| item.spam.is_none())
            .map(|item| item.text.clone())
            .collect();
        let mut classified = self.classify_batch(&clean_texts).await.into_iter();

        let mut attempts = 0;
        let mut emitted = 0;
        for item in &items {
            let plan = match item.spam {
                Some(spam_type) => Plan::Warn(spam_type),
                None => Plan::Reply(classified.next().unwrap_or_else(|| ClassifiedReply::error(item.text.clone()))),
            };

            let Some((text, cooldown)) = self.prepare(item, plan).await else {
                continue;
            };

            if attempts > 0 {
                sleep(self.timing.pacing()).await;
            }
            attempts += 1;

            if self.deliver(item, &text, cooldown).await {
                emitted += 1;
            }
        }

        CycleOutcome::Completed {
            drained: drained_count,
            emitted,
        }
    }

    /// Screen against the history as of the comment's arrival, so a long
    /// paced cycle does not stretch the repetition window
    fn screen(&self, kind: PlatformKind, comment: &Comment, text: &str) -> Option<SpamType> {
        let mut detector = self.spam.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let verdict = detector.detect_at(kind, &comment.user_id, text, comment.received_at);
        if verdict.is_spam {
            info!(
                "[{}] Spam from {} ({:?}, score {}): {}",
                kind, comment.user_id, verdict.spam_type, verdict.score, text
            );
        }
        verdict.spam_type
    }

    /// Always returns one entry per input text
    async fn classify_batch(&self, texts: &[String]) -> Vec<ClassifiedReply> {
        if texts.is_empty() {
            return Vec::new();
        }

        let limit = self.timing.call_timeout();
        let result = match timeout(limit, self.classifier.classify(texts)).await {
            Ok(result) => result,
            Err(_) => Err(ModerationError::Timeout {
                operation: "classification".to_string(),
                seconds: limit.as_secs(),
            }),
        };

        match result {
            Ok(mut replies) => {
                if replies.len() != texts.len() {
                    warn!("Classifier returned {} results for {} comments", replies.len(), texts.len());
                }
                replies.truncate(texts.len());
                replies
            }
            Err(e) => {
                error!("Batch of {} comments unclassified: {}", texts.len(), e);
                texts.iter().map(|t| ClassifiedReply::error(t.clone())).collect()
            }
        }
    }

    /// Decide the outgoing text, or `None` when nothing should be said
    async fn prepare(&self, item: &PendingItem, plan: Plan) -> Option<(String, Option<CooldownCategory>)> {
        let adapter = item.platform.lock().await;
        let name = &item.comment.display_name;

        let (text, cooldown) = match plan {
            Plan::Warn(spam_type) => (self.wordings.warning(spam_type, name), Some(spam_type.cooldown())),
            Plan::Reply(classified) => {
                let detection = classified.detection;
                match detection {
                    DetectionCategory::Error => {
                        warn!("[{}] Classifier error for comment from {}, not replying", item.kind, name);
                        return None;
                    }
                    DetectionCategory::None => return None,
                    _ => {}
                }

                let body = match classified.reply {
                    Some(reply) if !reply.trim().is_empty() => reply,
                    _ if detection == DetectionCategory::Demand => {
                        let Some(gift) = adapter.demand_items().pick() else {
                            debug!("[{}] No demand items configured", item.kind);
                            return None;
                        };
                        self.wordings.demand.replace("{item}", gift)
                    }
                    _ => {
                        debug!("[{}] {} comment without reply text", item.kind, detection);
                        return None;
                    }
                };

                let text = if detection.is_directed() {
                    format!("{} さん、{}", name, body)
                } else {
                    body
                };
                (text, detection.cooldown())
            }
        };

        if let Some(category) = cooldown {
            if self.gate.is_on_cooldown(adapter.state(), category, Utc::now()) {
                info!("[{}] {:?} reply to {} suppressed by cooldown", item.kind, category, name);
                return None;
            }
        }

        Some((text, cooldown))
    }

    async fn deliver(&self, item: &PendingItem, text: &str, cooldown: Option<CooldownCategory>) -> bool {
        let mut adapter = item.platform.lock().await;

        if let Some(category) = cooldown {
            if !self.gate.try_fire(adapter.state_mut(), category, Utc::now()) {
                info!("[{}] {:?} reply suppressed by cooldown", item.kind, category);
                return false;
            }
        }

        let limit = self.timing.call_timeout();
        let result = match timeout(limit, adapter.post_message(text)).await {
            Ok(result) => result,
            Err(_) => Err(ModerationError::Timeout {
                operation: format!("{} post_message", item.kind),
                seconds: limit.as_secs(),
            }),
        };

        match result {
            Ok(()) => {
                info!("[{}] Input: {} | Output: {}", item.kind, item.text, text);
                true
            }
            Err(e) => {
                error!("{}", e);
                false
            }
        }
    }

    /// Tick every flush interval until stopped. The next tick is scheduled
    /// only after the current cycle returns; stopping abandons a running cycle.
    pub fn spawn(self: Arc<Self>) -> TaskHandle {
        let (stop_tx, mut stop_rx) = TaskHandle::channel();
        let period = self.timing.flush_interval();

        let join = tokio::spawn(async move {
            info!("Flush scheduler started (every {:?})", period);
            let ticker = async {
                loop {
                    sleep(period).await;
                    let outcome = self.run_cycle().await;
                    debug!("Flush cycle finished: {:?}", outcome);
                }
            };

            tokio::select! {
                _ = ticker => {}
                _ = stop_rx.changed() => {}
            }
            info!("Flush scheduler stopped");
        });

        TaskHandle::new("flush_scheduler", stop_tx, join)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::testing::ScriptedClassifier;
    use crate::platforms::testing::RecordingPlatform;
    use crate::types::ClassifiedReply;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::time::Instant;

    type Posted = Arc<std::sync::Mutex<Vec<(Instant, String)>>>;

    async fn fixture(classifier: ScriptedClassifier, platform: RecordingPlatform) -> (Arc<FlushScheduler>, Arc<BoundedQueue>, Posted) {
        let posted = platform.messages();
        let router = Arc::new(CommentRouter::new(Duration::from_secs(30)));
        router.register(Box::new(platform)).await;

        let queue = Arc::new(BoundedQueue::default());
        let scheduler = FlushScheduler::new(
            Arc::clone(&queue),
            router,
            Arc::new(classifier),
            &WatcherConfig::default(),
        )
        .unwrap();
        (Arc::new(scheduler), queue, posted)
    }

    fn texts(posted: &Posted) -> Vec<String> {
        posted.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
    }

    fn yt(user: &str, text: &str) -> Comment {
        Comment::new("youtube", user, user.to_uppercase(), text)
    }

    #[tokio::test(start_paused = true)]
    async fn test_replies_are_paced_in_drain_order() {
        let classifier = ScriptedClassifier::new()
            .answer("つまんね", DetectionCategory::Insult, Some("面白いと思いますけどね。。。"))
            .answer("配信いつまで？", DetectionCategory::Faq, Some("いつもは二時間くらいらしいです。"))
            .answer("アドバイスしてやる", DetectionCategory::Advice, Some("それってあなたの感想ですよね？"));
        let (scheduler, queue, posted) = fixture(classifier, RecordingPlatform::new(PlatformKind::YouTube)).await;

        queue.push(yt("a", "つまんね"));
        queue.push(yt("b", "配信いつまで？"));
        queue.push(yt("c", "アドバイスしてやる"));

        let outcome = scheduler.run_cycle().await;
        assert_eq!(outcome, CycleOutcome::Completed { drained: 3, emitted: 3 });

        let posted = posted.lock().unwrap().clone();
        assert_eq!(posted[0].1, "面白いと思いますけどね。。。");
        assert_eq!(posted[1].1, "いつもは二時間くらいらしいです。");
        assert_eq!(posted[2].1, "それってあなたの感想ですよね？");
        for pair in posted.windows(2) {
            assert!(pair[1].0 - pair[0].0 >= Duration::from_secs(10));
        }
        assert!(!scheduler.is_flushing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_platform_is_dropped() {
        let classifier = ScriptedClassifier::new();
        let (scheduler, queue, _) = fixture(classifier, RecordingPlatform::new(PlatformKind::YouTube)).await;

        queue.push(Comment::new("niconico", "u", "U", "hello"));
        queue.push(Comment::new("tiktok", "u", "U", "hello"));

        assert_eq!(
            scheduler.run_cycle().await,
            CycleOutcome::Completed { drained: 2, emitted: 0 }
        );
        assert_eq!(scheduler.run_cycle().await, CycleOutcome::Empty);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_classifier_failure_is_contained() {
        let mut classifier = ScriptedClassifier::new().answer("BBA", DetectionCategory::Age, Some("若いと思いますけどね"));
        classifier.fail = true;
        let (scheduler, queue, posted) = fixture(classifier, RecordingPlatform::new(PlatformKind::YouTube)).await;

        queue.push(yt("a", "BBA"));
        assert_eq!(
            scheduler.run_cycle().await,
            CycleOutcome::Completed { drained: 1, emitted: 0 }
        );
        assert!(texts(&posted).is_empty());
        assert!(!scheduler.is_flushing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_classifier_timeout_is_contained() {
        let mut classifier = ScriptedClassifier::new().answer("BBA", DetectionCategory::Age, Some("若い"));
        classifier.delay = Some(Duration::from_secs(120));
        let (scheduler, queue, posted) = fixture(classifier, RecordingPlatform::new(PlatformKind::YouTube)).await;

        queue.push(yt("a", "BBA"));
        let start = Instant::now();
        let outcome = scheduler.run_cycle().await;

        assert_eq!(outcome, CycleOutcome::Completed { drained: 1, emitted: 0 });
        assert!(start.elapsed() < Duration::from_secs(60));
        assert!(texts(&posted).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_classifier_output_leaves_tail_unanswered() {
        let mut classifier = ScriptedClassifier::new()
            .answer("つまんね", DetectionCategory::Insult, Some("面白いと思いますけどね。。。"))
            .answer("配信いつまで？", DetectionCategory::Faq, Some("いつもは二時間くらいらしいです。"))
            .answer("アドバイスしてやる", DetectionCategory::Advice, Some("それってあなたの感想ですよね？"));
        classifier.result_skew = -1;
        let (scheduler, queue, posted) = fixture(classifier, RecordingPlatform::new(PlatformKind::YouTube)).await;

        queue.push(yt("a", "つまんね"));
        queue.push(yt("b", "配信いつまで？"));
        queue.push(yt("c", "アドバイスしてやる"));

        assert_eq!(
            scheduler.run_cycle().await,
            CycleOutcome::Completed { drained: 3, emitted: 2 }
        );
        assert_eq!(
            texts(&posted),
            vec!["面白いと思いますけどね。。。", "いつもは二時間くらいらしいです。"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_surplus_classifier_output_is_ignored() {
        let mut classifier = ScriptedClassifier::new()
            .answer("つまんね", DetectionCategory::Insult, Some("面白いと思いますけどね。。。"))
            .answer("配信いつまで？", DetectionCategory::Faq, Some("いつもは二時間くらいらしいです。"));
        classifier.result_skew = 1;
        let (scheduler, queue, posted) = fixture(classifier, RecordingPlatform::new(PlatformKind::YouTube)).await;

        queue.push(yt("a", "つまんね"));
        queue.push(yt("b", "配信いつまで？"));

        assert_eq!(
            scheduler.run_cycle().await,
            CycleOutcome::Completed { drained: 2, emitted: 2 }
        );
        assert_eq!(
            texts(&posted),
            vec!["面白いと思いますけどね。。。", "いつもは二時間くらいらしいです。"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_window_follows_arrival_time() {
        let (scheduler, queue, posted) =
            fixture(ScriptedClassifier::new(), RecordingPlatform::new(PlatformKind::YouTube)).await;

        // Same text three times, but spread wider than the five minute window
        let base = Utc::now() - chrono::Duration::minutes(10);
        for minutes in [0, 4, 8] {
            let mut comment = yt("slow", "やめろ");
            comment.received_at = base + chrono::Duration::minutes(minutes);
            queue.push(comment);
        }

        assert_eq!(
            scheduler.run_cycle().await,
            CycleOutcome::Completed { drained: 3, emitted: 0 }
        );
        assert!(texts(&posted).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_spam_gets_single_warning() {
        let (scheduler, queue, posted) =
            fixture(ScriptedClassifier::new(), RecordingPlatform::new(PlatformKind::YouTube)).await;

        for _ in 0..4 {
            queue.push(yt("spammer", "やめろ"));
        }

        let outcome = scheduler.run_cycle().await;
        assert_eq!(outcome, CycleOutcome::Completed { drained: 4, emitted: 1 });
        assert_eq!(texts(&posted), vec!["SPAMMERさん、同じコメントの連投はやめてもらっていいですか？"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_greeting_spam_warning_names_user() {
        let (scheduler, queue, posted) =
            fixture(ScriptedClassifier::new(), RecordingPlatform::new(PlatformKind::YouTube)).await;

        queue.push(yt("greeter", "田中さん、おはよう"));
        queue.push(yt("greeter", "佐藤さん、こんにちは"));
        scheduler.run_cycle().await;

        let posted = texts(&posted);
        assert_eq!(posted.len(), 1);
        assert!(posted[0].starts_with("GREETERさん、"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_age_replies_respect_cooldown() {
        let classifier = ScriptedClassifier::new()
            .answer("BBA", DetectionCategory::Age, Some("BBAじゃないんすよね"))
            .answer("おばさん", DetectionCategory::Age, Some("おばさんじゃないと思うおいらです"));
        let (scheduler, queue, posted) = fixture(classifier, RecordingPlatform::new(PlatformKind::YouTube)).await;

        queue.push(yt("a", "BBA"));
        queue.push(yt("b", "おばさん"));

        assert_eq!(
            scheduler.run_cycle().await,
            CycleOutcome::Completed { drained: 2, emitted: 1 }
        );
        assert_eq!(texts(&posted), vec!["BBAじゃないんすよね"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_demand_reply_is_directed_and_built_from_items() {
        let classifier = ScriptedClassifier::new().answer("脱げ", DetectionCategory::Demand, None);
        let (scheduler, queue, posted) = fixture(classifier, RecordingPlatform::new(PlatformKind::YouTube)).await;

        queue.push(Comment::new("youtube", "u1", "Taro", "脱げ"));
        scheduler.run_cycle().await;

        let posted = texts(&posted);
        assert_eq!(posted.len(), 1);
        assert!(posted[0].starts_with("Taro さん、"));
        assert!(posted[0].contains("スタンプ"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleaned_text_is_classified() {
        let classifier = Arc::new(ScriptedClassifier::new());
        let router = Arc::new(CommentRouter::new(Duration::from_secs(30)));
        router.register(Box::new(RecordingPlatform::new(PlatformKind::YouTube))).await;
        let queue = Arc::new(BoundedQueue::default());
        let scheduler = FlushScheduler::new(
            Arc::clone(&queue),
            router,
            Arc::clone(&classifier) as Arc<dyn Classifier>,
            &WatcherConfig::default(),
        )
        .unwrap();

        queue.push(yt("a", "（<b>こんにちは</b>）\n"));
        queue.push(yt("b", "<img src=\"x.png\">"));
        scheduler.run_cycle().await;

        assert_eq!(classifier.batches(), vec![vec!["こんにちは".to_string()]]);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_delivery_failure_does_not_stop_cycle() {
        let classifier = ScriptedClassifier::new()
            .answer("one", DetectionCategory::Insult, Some("reject me"))
            .answer("two", DetectionCategory::Insult, Some("deliver me"));
        let mut platform = RecordingPlatform::new(PlatformKind::YouTube);
        platform.fail_messages_containing = Some("reject".to_string());
        let (scheduler, queue, posted) = fixture(classifier, platform).await;

        queue.push(yt("a", "one"));
        queue.push(yt("b", "two"));

        assert_eq!(
            scheduler.run_cycle().await,
            CycleOutcome::Completed { drained: 2, emitted: 1 }
        );
        assert_eq!(texts(&posted), vec!["deliver me"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_cycle_is_skipped() {
        let mut classifier = ScriptedClassifier::new();
        classifier.delay = Some(Duration::from_secs(5));
        let (scheduler, queue, _) = fixture(classifier, RecordingPlatform::new(PlatformKind::YouTube)).await;

        queue.push(yt("a", "hello"));
        let (first, second) = tokio::join!(scheduler.run_cycle(), async {
            tokio::task::yield_now().await;
            scheduler.run_cycle().await
        });

        assert_eq!(first, CycleOutcome::Completed { drained: 1, emitted: 0 });
        assert_eq!(second, CycleOutcome::Skipped);
        assert_eq!(scheduler.run_cycle().await, CycleOutcome::Empty);
    }

    struct PanickingClassifier;

    #[async_trait]
    impl Classifier for PanickingClassifier {
        async fn classify(&self, _texts: &[String]) -> crate::types::ModerationResult<Vec<ClassifiedReply>> {
            panic!("classifier bug");
        }

        async fn classify_single(&self, _text: &str) -> crate::types::ModerationResult<DetectionCategory> {
            Ok(DetectionCategory::None)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_releases_guard() {
        let router = Arc::new(CommentRouter::new(Duration::from_secs(30)));
        router.register(Box::new(RecordingPlatform::new(PlatformKind::YouTube))).await;
        let queue = Arc::new(BoundedQueue::default());
        let scheduler = FlushScheduler::new(
            Arc::clone(&queue),
            router,
            Arc::new(PanickingClassifier),
            &WatcherConfig::default(),
        )
        .unwrap();

        queue.push(yt("a", "hello"));
        assert_eq!(scheduler.run_cycle().await, CycleOutcome::Panicked);
        assert!(!scheduler.is_flushing());
        assert_eq!(scheduler.run_cycle().await, CycleOutcome::Empty);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_ticker_flushes_and_stops() {
        let classifier = ScriptedClassifier::new().answer("つまんね", DetectionCategory::Insult, Some("面白いですけどね"));
        let (scheduler, queue, posted) = fixture(classifier, RecordingPlatform::new(PlatformKind::YouTube)).await;

        queue.push(yt("a", "つまんね"));
        let handle = Arc::clone(&scheduler).spawn();

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(texts(&posted).is_empty());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(texts(&posted), vec!["面白いですけどね"]);

        handle.stop().await.unwrap();
        assert!(handle.is_finished().await);
    }
}
