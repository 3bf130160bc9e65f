// src/archive/mod.rs - Offline classification of a finished stream's chat replay

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;

use crate::classifier::Classifier;
use crate::platforms::youtube::{parse_stream_url, StreamLocator};
use crate::types::DetectionCategory;

pub const DEFAULT_OUTPUT_DIR: &str = "output";
/// Pause between classifier calls to stay under API rate limits
pub const DEFAULT_CALL_DELAY: Duration = Duration::from_secs(1);
/// Rewrite the CSV after this many messages so a crash loses little work
pub const CHECKPOINT_EVERY: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMessage {
    pub timestamp: DateTime<Utc>,
    pub username: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzedMessage {
    pub message: ArchiveMessage,
    pub detection: DetectionCategory,
}

/// Video id of a watch/youtu.be/live URL. Channel handles have no replay.
pub fn video_id_from_url(url: &str) -> Option<String> {
    match parse_stream_url(url)? {
        StreamLocator::Video(id) => Some(id),
        StreamLocator::Handle(_) => None,
    }
}

/// One line of yt-dlp's `live_chat.json`. Only plain text messages are kept;
/// super chats, memberships and malformed lines yield `None`.
pub fn parse_live_chat_line(line: &str) -> Option<ArchiveMessage> {
    let data: Value = serde_json::from_str(line).ok()?;
    let renderer = data
        .pointer("/replayChatItemAction/actions/0/addChatItemAction/item/liveChatTextMessageRenderer")?;

    let micros: i64 = renderer.get("timestampUsec")?.as_str()?.parse().ok()?;
    let timestamp = DateTime::<Utc>::from_timestamp_micros(micros)?;
    let username = renderer.pointer("/authorName/simpleText")?.as_str()?.to_string();

    let message = renderer
        .pointer("/message/runs")?
        .as_array()?
        .iter()
        .map(|run| {
            run.get("text")
                .and_then(Value::as_str)
                .or_else(|| run.pointer("/emoji/emojiId").and_then(Value::as_str))
                .unwrap_or_default()
        })
        .collect::<String>();

    Some(ArchiveMessage { timestamp, username, message })
}

pub fn parse_live_chat(content: &str) -> Vec<ArchiveMessage> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(parse_live_chat_line)
        .collect()
}

/// Fetches chat replays with an external `yt-dlp` binary
pub struct ArchiveDownloader {
    yt_dlp: PathBuf,
    output_dir: PathBuf,
}

impl ArchiveDownloader {
    pub fn new(yt_dlp: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            yt_dlp: yt_dlp.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn chat_file(&self, video_id: &str) -> PathBuf {
        self.output_dir.join(format!("{}.live_chat.json", video_id))
    }

    pub async fn download(&self, video_id: &str) -> Result<Vec<ArchiveMessage>> {
        fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.output_dir.display()))?;

        let target = format!("https://www.youtube.com/watch?v={}", video_id);
        let output = self.output_dir.join(video_id);
        info!("Downloading chat replay of {}", target);

        let status = Command::new(&self.yt_dlp)
            .arg(&target)
            .args(["--skip-download", "--write-subs", "--sub-langs", "live_chat", "--sub-format", "json3", "-o"])
            .arg(&output)
            .status()
            .await
            .with_context(|| format!("Failed to run {}", self.yt_dlp.display()))?;
        if !status.success() {
            anyhow::bail!("{} exited with {}", self.yt_dlp.display(), status);
        }

        let chat_file = self.chat_file(video_id);
        let content = fs::read_to_string(&chat_file)
            .await
            .with_context(|| format!("Failed to read {}", chat_file.display()))?;
        let messages = parse_live_chat(&content);
        info!("Loaded {} chat messages from {}", messages.len(), chat_file.display());
        Ok(messages)
    }
}

/// Per-category totals of one analysis run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisReport {
    pub total: usize,
    pub counts: BTreeMap<String, usize>,
}

impl AnalysisReport {
    pub fn from_messages(messages: &[AnalyzedMessage]) -> Self {
        let mut counts = BTreeMap::new();
        for analyzed in messages {
            *counts.entry(analyzed.detection.to_string()).or_insert(0) += 1;
        }
        Self { total: messages.len(), counts }
    }

    pub fn percentage(&self, label: &str) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let count = self.counts.get(label).copied().unwrap_or(0);
        count as f64 * 100.0 / self.total as f64
    }
}

pub struct ArchiveAnalyzer {
    classifier: Arc<dyn Classifier>,
    call_delay: Duration,
}

impl ArchiveAnalyzer {
    pub fn new(classifier: Arc<dyn Classifier>, call_delay: Duration) -> Self {
        Self { classifier, call_delay }
    }

    /// Classify every message in order, checkpointing to `output` as it goes.
    /// A failed classification is recorded as `error` and the run continues.
    pub async fn analyze(&self, messages: Vec<ArchiveMessage>, output: &Path) -> Result<AnalysisReport> {
        let mut analyzed = Vec::with_capacity(messages.len());

        for (index, message) in messages.into_iter().enumerate() {
            if index > 0 && !self.call_delay.is_zero() {
                tokio::time::sleep(self.call_delay).await;
            }

            let detection = match self.classifier.classify_single(&message.message).await {
                Ok(detection) => detection,
                Err(e) => {
                    warn!("Could not classify message from {}: {}", message.username, e);
                    DetectionCategory::Error
                }
            };
            debug!("{} -> {}", message.message, detection);
            analyzed.push(AnalyzedMessage { message, detection });

            if analyzed.len() % CHECKPOINT_EVERY == 0 {
                info!("{} messages classified", analyzed.len());
                write_csv(output, &analyzed).await?;
            }
        }

        write_csv(output, &analyzed).await?;
        info!("Results written to {}", output.display());
        Ok(AnalysisReport::from_messages(&analyzed))
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub async fn write_csv(path: &Path, messages: &[AnalyzedMessage]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let mut content = String::from("TIMESTAMP,USERNAME,MESSAGE,DETECTION\n");
    for analyzed in messages {
        let row = [
            analyzed.message.timestamp.to_rfc3339(),
            csv_field(&analyzed.message.username),
            csv_field(&analyzed.message.message),
            analyzed.detection.to_string(),
        ];
        content.push_str(&row.join(","));
        content.push('\n');
    }

    fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}
