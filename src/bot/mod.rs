use anyhow::Result;
use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::classifier::Classifier;
use crate::config::WatcherConfig;
use crate::ingest::IngestEvent;
use crate::platforms::ChatPlatform;
use crate::types::{Comment, CooldownCategory, ModerationError, PlatformKind, StreamTarget};

pub mod cooldown;
pub mod history;
pub mod promotion;
pub mod queue;
pub mod reply_detector;
pub mod router;
pub mod scheduler;
pub mod shutdown;
pub mod spam;
pub mod task;
pub mod text;

use cooldown::CooldownGate;
use promotion::PromotionBroadcaster;
use queue::BoundedQueue;
use router::{CommentRouter, SharedPlatform};
use scheduler::FlushScheduler;
use task::TaskHandle;

/// Composition root: receives feed events, answers gifts on the spot and
/// hands everything else to the flush scheduler.
pub struct ChatWatcher {
    router: Arc<CommentRouter>,
    queue: Arc<BoundedQueue>,
    scheduler: Arc<FlushScheduler>,
    promotion: Option<Arc<PromotionBroadcaster>>,
    gate: CooldownGate,
    call_timeout: Duration,
}

impl ChatWatcher {
    pub fn new(config: &WatcherConfig, classifier: Arc<dyn Classifier>) -> Result<Self> {
        config.validate()?;

        let call_timeout = config.scheduler.call_timeout();
        let router = Arc::new(CommentRouter::new(call_timeout));
        let queue = Arc::new(BoundedQueue::new(config.queue.capacity));
        let scheduler = Arc::new(FlushScheduler::new(
            Arc::clone(&queue),
            Arc::clone(&router),
            classifier,
            config,
        )?);

        let promotion = config.promotion.enabled.then(|| {
            Arc::new(PromotionBroadcaster::new(
                Arc::clone(&router),
                config.promotion.clone(),
                call_timeout,
            ))
        });

        Ok(Self {
            router,
            queue,
            scheduler,
            promotion,
            gate: config.cooldowns.gate(),
            call_timeout,
        })
    }

    pub async fn add_platform(&self, platform: Box<dyn ChatPlatform>) -> SharedPlatform {
        self.router.register(platform).await
    }

    pub fn router(&self) -> Arc<CommentRouter> {
        Arc::clone(&self.router)
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Bind adapters to the streams currently announced by the feed
    pub async fn on_service_update(&self, targets: &[StreamTarget]) -> usize {
        debug!("Service update with {} stream(s)", targets.len());
        self.router.apply_service_update(targets).await
    }

    pub async fn on_comments(&self, comments: Vec<Comment>) {
        for comment in comments {
            let Some((kind, platform)) = self.router.route(&comment.platform).await else {
                continue;
            };

            if platform.lock().await.state().is_own_comment(&comment) {
                continue;
            }

            if comment.has_gift {
                self.thank(kind, &platform, &comment).await;
                continue;
            }

            let evicted = self.queue.push(comment);
            if evicted > 0 {
                warn!("Comment queue full, dropped {} oldest comment(s)", evicted);
            }
        }
    }

    async fn thank(&self, kind: PlatformKind, platform: &SharedPlatform, comment: &Comment) {
        let mut adapter = platform.lock().await;
        if !self
            .gate
            .try_fire(adapter.state_mut(), CooldownCategory::GiftThanks, Utc::now())
        {
            info!("[{}] Gift thanks for {} suppressed by cooldown", kind, comment.display_name);
            return;
        }

        match timeout(self.call_timeout, adapter.post_thanks_message(comment)).await {
            Ok(Ok(())) => info!("[{}] Thanked {} for a gift", kind, comment.display_name),
            Ok(Err(e)) => error!("{}", e),
            Err(_) => error!(
                "{}",
                ModerationError::Timeout {
                    operation: format!("{} post_thanks_message", kind),
                    seconds: self.call_timeout.as_secs(),
                }
            ),
        }
    }

    /// Spawn the flush scheduler and, when enabled, the promotion broadcaster
    pub fn start(&self) -> Vec<TaskHandle> {
        let mut handles = vec![Arc::clone(&self.scheduler).spawn()];
        if let Some(promotion) = &self.promotion {
            handles.push(Arc::clone(promotion).spawn());
        }
        info!("Chat watcher started with {} background task(s)", handles.len());
        handles
    }

    /// Feed events from the ingest client into the watcher until stopped
    pub fn spawn_dispatcher(self: &Arc<Self>, mut events: mpsc::Receiver<IngestEvent>) -> TaskHandle {
        let (stop_tx, mut stop_rx) = TaskHandle::channel();
        let watcher = Arc::clone(self);

        let join = tokio::spawn(async move {
            let dispatch = async {
                while let Some(event) = events.recv().await {
                    match event {
                        IngestEvent::Services(targets) => {
                            watcher.on_service_update(&targets).await;
                        }
                        IngestEvent::Comments(comments) => watcher.on_comments(comments).await,
                    }
                }
            };

            tokio::select! {
                _ = dispatch => info!("Event source closed"),
                _ = stop_rx.changed() => {}
            }
            info!("Event dispatcher stopped");
        });

        TaskHandle::new("event_dispatcher", stop_tx, join)
    }
}
