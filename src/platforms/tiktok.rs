use async_trait::async_trait;
use log::{debug, info};
use serde::Serialize;
use std::collections::HashMap;

use crate::config::PlatformSettings;
use crate::platforms::{
    donation_table, ensure_success, gift_tier, meets_minimum, pick_donation_message, ChatPlatform, DemandItems, PlatformState,
};
use crate::types::{Comment, ModerationError, ModerationResult, PlatformKind, StreamTarget};

pub const DEFAULT_RELAY_URL: &str = "http://localhost:9080/send";

#[derive(Debug, Serialize)]
struct RelayRequest<'a> {
    text: &'a str,
}

/// TikTok has no public chat-posting API; messages go through a local relay
#[derive(Debug, Clone)]
pub struct TikTokConfig {
    pub relay_url: String,
    pub min_thanks_amount: Option<f64>,
    pub big_gift_amount: f64,
}

impl TikTokConfig {
    pub fn from_settings(settings: &PlatformSettings) -> Self {
        Self {
            relay_url: settings
                .endpoint
                .clone()
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_RELAY_URL.to_string()),
            min_thanks_amount: settings.min_thanks_amount,
            big_gift_amount: settings.big_gift_amount(),
        }
    }
}

pub struct TikTokPlatform {
    config: TikTokConfig,
    http_client: reqwest::Client,
    state: PlatformState,
    current_url: Option<String>,
    demand: DemandItems,
    donations: HashMap<String, Vec<String>>,
}

impl TikTokPlatform {
    pub fn new(config: TikTokConfig, bot_user_id: String) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
            state: PlatformState::new(bot_user_id),
            current_url: None,
            demand: DemandItems::new(
                &["バラ", "TikTok"],
                &["ドーナツ", "帽子とひげ"],
                &["ライオン", "TikTokユニバース"],
            ),
            donations: donation_table(&[
                ("ja", &["{name}さん、ギフトありがとうございます。", "{name}さん、ナイスギフト！"]),
                ("en", &["Thanks for the gift, {name}!"]),
                ("ja:big", &["{name}さん、すごいギフトありがとうございます！"]),
            ]),
        }
    }
}

#[async_trait]
impl ChatPlatform for TikTokPlatform {
    fn platform(&self) -> PlatformKind {
        PlatformKind::TikTok
    }

    async fn initialize(&mut self, target: &StreamTarget) -> ModerationResult<()> {
        if self.current_url.as_deref() != Some(target.url.as_str()) {
            info!("TikTok stream {} posting via {}", target.url, self.config.relay_url);
            self.current_url = Some(target.url.clone());
        }
        Ok(())
    }

    /// The relay is assumed reachable; failures surface per message
    fn is_ready(&self) -> bool {
        true
    }

    async fn post_message(&self, text: &str) -> ModerationResult<()> {
        let delivery_error = |reason: String| ModerationError::Delivery {
            platform: PlatformKind::TikTok,
            reason,
        };

        let response = self
            .http_client
            .post(&self.config.relay_url)
            .json(&RelayRequest { text })
            .send()
            .await
            .map_err(|e| delivery_error(e.to_string()))?;
        ensure_success(response, "relay")
            .await
            .map_err(|e| delivery_error(format!("{:#}", e)))?;

        debug!("Sent TikTok message: {}", text);
        Ok(())
    }

    async fn post_thanks_message(&self, comment: &Comment) -> ModerationResult<()> {
        if !meets_minimum(comment, self.config.min_thanks_amount) {
            debug!("Gift from {} below thanks minimum", comment.display_name);
            return Ok(());
        }
        let tier = gift_tier(comment, &self.demand, self.config.big_gift_amount);
        match pick_donation_message(&self.donations, comment, tier) {
            Some(line) => self.post_message(&line).await,
            None => Ok(()),
        }
    }

    fn state(&self) -> &PlatformState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut PlatformState {
        &mut self.state
    }

    fn demand_items(&self) -> &DemandItems {
        &self.demand
    }

    fn donation_messages(&self) -> &HashMap<String, Vec<String>> {
        &self.donations
    }
}
