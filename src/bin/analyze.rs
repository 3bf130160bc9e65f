use anyhow::{Context, Result};
use log::info;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use chatwatch::archive::{video_id_from_url, ArchiveAnalyzer, ArchiveDownloader, DEFAULT_CALL_DELAY, DEFAULT_OUTPUT_DIR};
use chatwatch::config::DEFAULT_CONFIG_PATH;
use chatwatch::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let mut args = env::args().skip(1);
    let Some(video_url) = args.next() else {
        anyhow::bail!("usage: chatwatch-analyze <YOUTUBE_URL> [OUTPUT_CSV]");
    };
    let video_id = video_id_from_url(&video_url).with_context(|| format!("Not a YouTube video URL: {}", video_url))?;
    let output = args.next().map(PathBuf::from).unwrap_or_else(|| {
        let stamp = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S");
        PathBuf::from(DEFAULT_OUTPUT_DIR).join(format!("analyzed_chat_{}.csv", stamp))
    });

    let config_path = env::var("CHATWATCH_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config_manager = ConfigurationManager::new(&config_path);
    config_manager.initialize().await?;
    let config = config_manager.get_config().await;

    let classifier = OpenAiClassifier::new(&config.classifier, &config.core)
        .context("Failed to set up the classifier")?;

    let yt_dlp = env::var("YT_DLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string());
    let downloader = ArchiveDownloader::new(yt_dlp, DEFAULT_OUTPUT_DIR);
    let messages = downloader.download(&video_id).await?;

    let analyzer = ArchiveAnalyzer::new(Arc::new(classifier), DEFAULT_CALL_DELAY);
    let report = analyzer.analyze(messages, &output).await?;

    info!("=== Detection summary ({} messages) ===", report.total);
    for (label, count) in &report.counts {
        info!("{}: {} ({:.2}%)", label, count, report.percentage(label));
    }
    Ok(())
}
