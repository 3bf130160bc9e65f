use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::PlatformSettings;
use crate::platforms::{
    donation_table, ensure_success, gift_tier, meets_minimum, pick_donation_message, ChatPlatform, DemandItems,
    PlatformState,
};
use crate::types::{Comment, ModerationError, ModerationResult, PlatformKind, StreamTarget};

const API_BASE: &str = "https://apiv2.twitcasting.tv";

#[derive(Debug, Deserialize)]
struct UserResponse {
    user: UserInfo,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    last_movie_id: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct PostCommentRequest<'a> {
    comment: &'a str,
    sns: &'a str,
}

#[derive(Debug, Clone)]
pub struct TwitcastingConfig {
    pub access_token: String,
    pub api_base: String,
    pub min_thanks_amount: Option<f64>,
    pub big_gift_amount: f64,
}

impl TwitcastingConfig {
    pub fn from_settings(settings: &PlatformSettings) -> Result<Self> {
        let access_token = settings
            .access_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .context("platforms.twitcasting.access_token (or TWICAS_ACCESS_TOKEN) is not set")?;

        Ok(Self {
            access_token,
            api_base: settings.endpoint.clone().unwrap_or_else(|| API_BASE.to_string()),
            min_thanks_amount: settings.min_thanks_amount,
            big_gift_amount: settings.big_gift_amount(),
        })
    }
}

/// Broadcaster id from `twitcasting.tv/<user>[/...]`
pub fn user_from_url(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw).ok()?;
    let host = parsed.host_str()?.trim_start_matches("www.");
    if host != "twitcasting.tv" {
        return None;
    }
    let user = parsed.path_segments()?.find(|s| !s.is_empty())?;
    urlencoding::decode(user).ok().map(|u| u.into_owned())
}

pub struct TwitcastingPlatform {
    config: TwitcastingConfig,
    http_client: reqwest::Client,
    state: PlatformState,
    movie_id: Option<String>,
    current_url: Option<String>,
    demand: DemandItems,
    donations: HashMap<String, Vec<String>>,
}

impl TwitcastingPlatform {
    pub fn new(config: TwitcastingConfig, bot_user_id: String) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
            state: PlatformState::new(bot_user_id),
            movie_id: None,
            current_url: None,
            demand: DemandItems::new(
                &["お茶", "コンティニューコイン"],
                &["お茶爆10", "キャンディー"],
                &["お茶爆100", "金のコイン"],
            ),
            // Tea thanks are language-agnostic and picked at random
            donations: donation_table(&[
                ("ja", &["{name}さん、ナイス茶！", "{name}さん、Nice Tea!"]),
                ("ja:big", &["{name}さん、お茶爆ありがとうございます！ごちそうさまです。"]),
            ]),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http_client
            .request(method, format!("{}/{}", self.config.api_base, path))
            .header("Accept", "application/json")
            .header("X-Api-Version", "2.0")
            .bearer_auth(&self.config.access_token)
    }

    async fn latest_movie_id(&self, user: &str) -> Result<String> {
        let path = format!("users/{}", urlencoding::encode(user));
        let response = self
            .request(reqwest::Method::GET, &path)
            .send()
            .await
            .context("Failed to fetch Twitcasting user")?;
        let body: UserResponse = ensure_success(response, "users")
            .await?
            .json()
            .await
            .context("Failed to parse Twitcasting user")?;

        match body.user.last_movie_id {
            Some(serde_json::Value::String(id)) if !id.is_empty() => Ok(id),
            Some(serde_json::Value::Number(id)) => Ok(id.to_string()),
            _ => Err(anyhow::anyhow!("User {} has no recent movie", user)),
        }
    }

    fn thanks_line(&self, comment: &Comment) -> Option<String> {
        let tier = gift_tier(comment, &self.demand, self.config.big_gift_amount);
        pick_donation_message(&self.donations, comment, tier)
    }
}

#[async_trait]
impl ChatPlatform for TwitcastingPlatform {
    fn platform(&self) -> PlatformKind {
        PlatformKind::Twitcasting
    }

    async fn initialize(&mut self, target: &StreamTarget) -> ModerationResult<()> {
        if self.movie_id.is_some() && self.current_url.as_deref() == Some(target.url.as_str()) {
            return Ok(());
        }

        let init_error = |reason: String| ModerationError::AdapterInit {
            platform: PlatformKind::Twitcasting,
            url: target.url.clone(),
            reason,
        };

        self.movie_id = None;
        self.current_url = None;
        let user = user_from_url(&target.url).ok_or_else(|| init_error("no user in URL".to_string()))?;
        let movie_id = self
            .latest_movie_id(&user)
            .await
            .map_err(|e| init_error(format!("{:#}", e)))?;

        info!("Twitcasting movie {} resolved for {}", movie_id, user);
        self.movie_id = Some(movie_id);
        self.current_url = Some(target.url.clone());
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.movie_id.is_some()
    }

    async fn post_message(&self, text: &str) -> ModerationResult<()> {
        let delivery_error = |reason: String| ModerationError::Delivery {
            platform: PlatformKind::Twitcasting,
            reason,
        };
        let movie_id = self
            .movie_id
            .as_deref()
            .ok_or_else(|| delivery_error("no live movie bound".to_string()))?;

        let response = self
            .request(reqwest::Method::POST, &format!("movies/{}/comments", movie_id))
            .json(&PostCommentRequest { comment: text, sns: "none" })
            .send()
            .await
            .map_err(|e| delivery_error(e.to_string()))?;
        ensure_success(response, "comments")
            .await
            .map_err(|e| delivery_error(format!("{:#}", e)))?;

        debug!("Sent Twitcasting comment: {}", text);
        Ok(())
    }

    async fn post_thanks_message(&self, comment: &Comment) -> ModerationResult<()> {
        if !meets_minimum(comment, self.config.min_thanks_amount) {
            debug!("Item from {} below thanks minimum", comment.display_name);
            return Ok(());
        }
        match self.thanks_line(comment) {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn platform() -> TwitcastingPlatform {
        let settings = PlatformSettings {
            enabled: true,
            access_token: Some("token".to_string()),
            ..Default::default()
        };
        TwitcastingPlatform::new(TwitcastingConfig::from_settings(&settings).unwrap(), "c:bot".to_string())
    }

    #[test]
    fn test_user_from_url() {
        assert_eq!(user_from_url("https://twitcasting.tv/c:ayapi"), Some("c:ayapi".to_string()));
        assert_eq!(user_from_url("https://twitcasting.tv/someone/movie/123"), Some("someone".to_string()));
        assert_eq!(user_from_url("https://twitcasting.tv/"), None);
        assert_eq!(user_from_url("https://example.com/someone"), None);
    }

    #[test]
    fn test_config_requires_access_token() {
        assert!(TwitcastingConfig::from_settings(&PlatformSettings::default()).is_err());
    }

    #[test]
    fn test_thanks_line_names_donor() {
        let comment = Comment::new("twicas", "u1", "Hanako", "").with_gift(None);
        let line = platform().thanks_line(&comment).unwrap();
        assert!(line == "Hanakoさん、ナイス茶！" || line == "Hanakoさん、Nice Tea!");
    }

    #[test]
    fn test_tea_bombs_get_big_thanks() {
        let mut bomb = Comment::new("twicas", "u1", "Hanako", "").with_gift(None);
        bomb.gift_name = Some("お茶爆10".to_string());
        assert_eq!(
            platform().thanks_line(&bomb).as_deref(),
            Some("Hanakoさん、お茶爆ありがとうございます！ごちそうさまです。")
        );

        bomb.gift_name = Some("お茶".to_string());
        assert!(platform().thanks_line(&bomb).unwrap().starts_with("Hanakoさん、"));
        assert!(!platform().thanks_line(&bomb).unwrap().contains("お茶爆"));
    }

    #[tokio::test]
    async fn test_url_without_user_fails_initialize() {
        let mut twicas = platform();
        let target = StreamTarget::new(PlatformKind::Twitcasting, "https://twitcasting.tv/");
        assert!(matches!(
            twicas.initialize(&target).await,
            Err(ModerationError::AdapterInit { .. })
        ));
        assert!(!twicas.is_ready());
        assert!(matches!(
            twicas.post_message("hi").await,
            Err(ModerationError::Delivery { .. })
        ));
    }
}
