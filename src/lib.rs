//! # chatwatch
//!
//! Live-stream chat moderation across YouTube, TikTok and Twitcasting.
//!
//! Comments arrive from a comment-aggregator feed, are screened for
//! repetition and viewer-to-viewer greeting chatter, classified by an external
//! language model, and answered on the originating platform under per-platform
//! cooldowns with paced delivery.
//!
//! ## Features
//!
//! - **Bounded intake**: a drop-oldest queue flushed on a fixed interval
//! - **Spam screening**: edit-distance repeat detection over a sliding history
//! - **Cooldown gating**: per platform and per reply category
//! - **Gift fast path**: donations are thanked as soon as they arrive
//! - **Promotion**: periodic announcements on a separate schedule
//! - **Archive analysis**: `chatwatch-analyze` classifies a finished stream's chat replay into CSV
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chatwatch::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let manager = ConfigurationManager::new("config/chatwatch.yaml");
//!     manager.initialize().await?;
//!     let config = manager.get_config().await;
//!
//!     let classifier = OpenAiClassifier::new(&config.classifier, &config.core)?;
//!     let watcher = Arc::new(ChatWatcher::new(&config, Arc::new(classifier))?);
//!     for platform in build_enabled(&config)? {
//!         watcher.add_platform(platform).await;
//!     }
//!
//!     let (tx, rx) = tokio::sync::mpsc::channel(64);
//!     let _feed = OneCommeClient::new(config.core.websocket_url.clone()).spawn(tx);
//!     let _dispatcher = watcher.spawn_dispatcher(rx);
//!     let _tasks = watcher.start();
//!
//!     tokio::signal::ctrl_c().await?;
//!     Ok(())
//! }
//! ```

pub mod types;
pub mod config;
pub mod platforms;
pub mod classifier;
pub mod ingest;
pub mod bot;
pub mod archive;

// Re-export commonly used items
pub mod prelude {
    pub use crate::bot::ChatWatcher;
    pub use crate::bot::shutdown::{GracefulShutdown, ShutdownComponent};
    pub use crate::bot::task::TaskHandle;
    pub use crate::classifier::{Classifier, OpenAiClassifier};
    pub use crate::config::{ConfigurationManager, WatcherConfig};
    pub use crate::ingest::{IngestEvent, OneCommeClient};
    pub use crate::platforms::{build_enabled, ChatPlatform, DemandItems, PlatformState};
    pub use crate::types::{
        ClassifiedReply, Comment, DetectionCategory, ModerationError, ModerationResult, PlatformKind, StreamTarget,
    };
    pub use anyhow::Result;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
