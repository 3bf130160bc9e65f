// src/bot/router.rs - Maps comment platform tags to their adapters

use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;

use crate::platforms::ChatPlatform;
use crate::types::{ModerationError, PlatformKind, StreamTarget};

/// An adapter behind its own async lock; cooldown state is only touched while held
pub type SharedPlatform = Arc<Mutex<Box<dyn ChatPlatform>>>;

pub struct CommentRouter {
    platforms: RwLock<HashMap<PlatformKind, SharedPlatform>>,
    init_timeout: Duration,
}

impl CommentRouter {
    pub fn new(init_timeout: Duration) -> Self {
        Self {
            platforms: RwLock::new(HashMap::new()),
            init_timeout,
        }
    }

    pub async fn register(&self, platform: Box<dyn ChatPlatform>) -> SharedPlatform {
        let kind = platform.platform();
        let shared = Arc::new(Mutex::new(platform));
        if self.platforms.write().await.insert(kind, Arc::clone(&shared)).is_some() {
            warn!("Replaced existing {} adapter", kind);
        }
        info!("Registered {} adapter", kind);
        shared
    }

    pub async fn get(&self, kind: PlatformKind) -> Option<SharedPlatform> {
        self.platforms.read().await.get(&kind).cloned()
    }

    /// Resolve a comment's tag to a ready adapter. Unknown tags, unregistered
    /// platforms and adapters without a live stream all yield `None`.
    pub async fn route(&self, tag: &str) -> Option<(PlatformKind, SharedPlatform)> {
        let Some(kind) = PlatformKind::from_tag(tag) else {
            debug!("Dropping comment with unknown platform tag '{}'", tag);
            return None;
        };
        let Some(platform) = self.get(kind).await else {
            debug!("Dropping {} comment: platform not configured", kind);
            return None;
        };
        if !platform.lock().await.is_ready() {
            debug!("Dropping {} comment: adapter not ready", kind);
            return None;
        }
        Some((kind, platform))
    }

    /// Bind adapters to the streams announced by the feed. Failures are logged
    /// per target and leave that adapter unusable until the next update.
    pub async fn apply_service_update(&self, targets: &[StreamTarget]) -> usize {
        let mut ready = 0;

        for target in targets {
            let Some(platform) = self.get(target.platform).await else {
                debug!("Ignoring {} stream {}: platform not configured", target.platform, target.url);
                continue;
            };

            let mut adapter = platform.lock().await;
            let result = match timeout(self.init_timeout, adapter.initialize(target)).await {
                Ok(result) => result,
                Err(_) => Err(ModerationError::Timeout {
                    operation: format!("{} initialize", target.platform),
                    seconds: self.init_timeout.as_secs(),
                }),
            };

            match result {
                Ok(()) => {
                    info!("{} adapter bound to {}", target.platform, target.url);
                    ready += 1;
                }
                Err(e) => error!("{}", e),
            }
        }

        ready
    }

    pub async fn platforms(&self) -> Vec<PlatformKind> {
        let mut kinds: Vec<PlatformKind> = self.platforms.read().await.keys().copied().collect();
        kinds.sort();
        kinds
    }
}
