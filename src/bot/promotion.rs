// src/bot/promotion.rs - Periodic announcements independent of chat traffic

use log::{debug, error, info};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};

use crate::bot::router::{CommentRouter, SharedPlatform};
use crate::bot::task::TaskHandle;
use crate::config::PromotionSettings;
use crate::types::{ModerationError, PlatformKind};

pub struct PromotionBroadcaster {
    router: Arc<CommentRouter>,
    settings: PromotionSettings,
    next_secondary: AtomicUsize,
    call_timeout: Duration,
}

impl PromotionBroadcaster {
    pub fn new(router: Arc<CommentRouter>, settings: PromotionSettings, call_timeout: Duration) -> Self {
        Self {
            router,
            settings,
            next_secondary: AtomicUsize::new(0),
            call_timeout,
        }
    }

    async fn ready_targets(&self) -> Vec<(PlatformKind, SharedPlatform)> {
        let mut ready = Vec::new();
        for kind in &self.settings.targets {
            if let Some(platform) = self.router.get(*kind).await {
                if platform.lock().await.is_ready() {
                    ready.push((*kind, platform));
                }
            }
        }
        ready
    }

    async fn post_all(&self, targets: &[(PlatformKind, SharedPlatform)], text: &str) {
        for (kind, platform) in targets {
            let adapter = platform.lock().await;
            match timeout(self.call_timeout, adapter.post_message(text)).await {
                Ok(Ok(())) => debug!("[{}] Promotion posted", kind),
                Ok(Err(e)) => error!("{}", e),
                Err(_) => error!(
                    "{}",
                    ModerationError::Timeout {
                        operation: format!("{} promotion", kind),
                        seconds: self.call_timeout.as_secs(),
                    }
                ),
            }
        }
    }

    /// Post the primary message, wait, then the next secondary in rotation.
    /// The rotation only advances when at least one target was ready.
    pub async fn broadcast_once(&self) -> usize {
        let targets = self.ready_targets().await;
        if targets.is_empty() {
            debug!("No ready promotion target, skipping");
            return 0;
        }

        self.post_all(&targets, &self.settings.primary).await;
        sleep(self.settings.follow_up_delay()).await;

        if !self.settings.secondaries.is_empty() {
            let len = self.settings.secondaries.len();
            let index = self.next_secondary.load(Ordering::SeqCst) % len;
            self.post_all(&targets, &self.settings.secondaries[index]).await;
            self.next_secondary.store((index + 1) % len, Ordering::SeqCst);
            info!("Promotion posted to {} platform(s), secondary #{}", targets.len(), index + 1);
        }

        targets.len()
    }

    pub fn spawn(self: Arc<Self>) -> TaskHandle {
        let (stop_tx, mut stop_rx) = TaskHandle::channel();
        let initial = self.settings.initial_delay();
        let start = Instant::now() + initial;
        let period = self.settings.interval();

        let join = tokio::spawn(async move {
            info!("Promotion broadcaster started (first in {:?}, then every {:?})", initial, period);
            let mut ticker = interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let broadcasts = async {
                loop {
                    ticker.tick().await;
                    self.broadcast_once().await;
                }
            };

            tokio::select! {
                _ = broadcasts => {}
                _ = stop_rx.changed() => {}
            }
            info!("Promotion broadcaster stopped");
        });

        TaskHandle::new("promotion_broadcaster", stop_tx, join)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::testing::RecordingPlatform;

    fn settings() -> PromotionSettings {
        PromotionSettings {
            primary: "primary".to_string(),
            secondaries: vec!["second-0".to_string(), "second-1".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_and_rotation() {
        let platform = RecordingPlatform::new(PlatformKind::YouTube);
        let posted = platform.messages();
        let router = Arc::new(CommentRouter::new(Duration::from_secs(30)));
        router.register(Box::new(platform)).await;

        let start = Instant::now();
        let broadcaster = Arc::new(PromotionBroadcaster::new(router, settings(), Duration::from_secs(30)));
        let handle = Arc::clone(&broadcaster).spawn();

        sleep(Duration::from_secs(14 * 60 + 59)).await;
        assert!(posted.lock().unwrap().is_empty());

        sleep(Duration::from_secs(15 * 60 + 30 * 60 * 2)).await;
        handle.stop().await.unwrap();

        let posted = posted.lock().unwrap().clone();
        let texts: Vec<&str> = posted.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(
            texts,
            vec!["primary", "second-0", "primary", "second-1", "primary", "second-0"]
        );
        let close_to = |actual: Duration, expected: Duration| {
            let diff = if actual > expected { actual - expected } else { expected - actual };
            diff < Duration::from_secs(1)
        };
        assert!(close_to(posted[0].0 - start, Duration::from_secs(15 * 60)));
        assert!(close_to(posted[1].0 - posted[0].0, Duration::from_secs(10)));
        assert!(close_to(posted[2].0 - posted[0].0, Duration::from_secs(30 * 60)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_holds_without_ready_target() {
        let mut platform = RecordingPlatform::new(PlatformKind::YouTube);
        platform.ready = false;
        let posted = platform.messages();
        let router = Arc::new(CommentRouter::new(Duration::from_secs(30)));
        router.register(Box::new(platform)).await;

        let broadcaster = PromotionBroadcaster::new(Arc::clone(&router), settings(), Duration::from_secs(30));
        assert_eq!(broadcaster.broadcast_once().await, 0);
        assert!(posted.lock().unwrap().is_empty());

        let shared = router.get(PlatformKind::YouTube).await.unwrap();
        let target = crate::types::StreamTarget::new(PlatformKind::YouTube, "https://youtu.be/live");
        shared.lock().await.initialize(&target).await.unwrap();

        assert_eq!(broadcaster.broadcast_once().await, 1);
        assert_eq!(posted.lock().unwrap()[1].1, "second-0");
    }
}
