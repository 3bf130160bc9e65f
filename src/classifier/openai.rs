use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::future::join_all;
use log::{debug, info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::classifier::Classifier;
use crate::config::{ClassifierSettings, CoreSettings};
use crate::types::{ClassifiedReply, DetectionCategory, ModerationError, ModerationResult};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Chat-completions backed classifier. Each comment gets a detection pass;
/// flagged comments get a generated reply, unflagged ones a wordplay pass.
pub struct OpenAiClassifier {
    http_client: reqwest::Client,
    settings: ClassifierSettings,
    api_key: String,
    streamer_name: String,
    bot_name: String,
}

impl OpenAiClassifier {
    pub fn new(settings: &ClassifierSettings, core: &CoreSettings) -> Result<Self> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .context("classifier.api_key (or OPENAI_API_KEY) is not set")?;

        info!("Classifier using model {} at {}", settings.model, settings.api_url);

        Ok(Self {
            http_client: reqwest::Client::new(),
            settings: settings.clone(),
            api_key,
            streamer_name: core.streamer_name.clone(),
            bot_name: core.bot_name.clone(),
        })
    }

    async fn complete(&self, system: &str, user: &str, temperature: f32, max_tokens: u32) -> ModerationResult<Option<String>> {
        let request = ChatRequest {
            model: &self.settings.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            temperature,
            max_tokens,
        };

        let url = format!("{}/chat/completions", self.settings.api_url.trim_end_matches('/'));
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ModerationError::Classification(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ModerationError::Classification(format!("API error {}: {}", status, error_text)));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModerationError::Classification(format!("invalid response: {}", e)))?;

        Ok(body.choices.into_iter().next().and_then(|c| c.message.content))
    }

    async fn classify_one(&self, text: &str) -> ClassifiedReply {
        match self.try_classify_one(text).await {
            Ok(reply) => {
                debug!("Input: {} | Detection: {} | Output: {:?}", text, reply.detection, reply.reply);
                reply
            }
            Err(e) => {
                warn!("Classification of '{}' failed: {}", text, e);
                ClassifiedReply::error(text)
            }
        }
    }

    async fn try_classify_one(&self, text: &str) -> ModerationResult<ClassifiedReply> {
        let detection = self.classify_single(text).await?;

        let reply = match detection {
            // The scheduler answers demands from the platform's own gift list
            DetectionCategory::Demand => None,
            DetectionCategory::None => {
                let pun = self
                    .complete(&wordplay_prompt(), text, self.settings.reply_temperature, self.settings.max_reply_tokens)
                    .await?;
                return Ok(match parse_wordplay(pun) {
                    Some(reply) => ClassifiedReply::new(text, DetectionCategory::Wordplay, Some(reply)),
                    None => ClassifiedReply::new(text, DetectionCategory::None, None),
                });
            }
            _ => {
                let context = format!("次のコメントは{}に分類されました。返答してください。\n{}", detection, text);
                self.complete(&self.reply_prompt(), &context, self.settings.reply_temperature, self.settings.max_reply_tokens)
                    .await?
                    .map(|r| clean_reply(&r))
                    .filter(|r| !r.is_empty())
            }
        };

        Ok(ClassifiedReply::new(text, detection, reply))
    }

    fn detection_prompt(&self) -> String {
        format!(
            "ライブ配信のチャット欄を監視するモデレーターとして、コメントを次のいずれかのラベルに分類し、ラベルだけを返してください。\n\
             確信が持てない場合は none を返してください。\n\
             \n\
             - age: 配信者の年齢をからかう悪口\n\
             - demand: 配信者への行き過ぎた要求や命令\n\
             - insult: 配信者への度を越した悪口や不満\n\
             - faq: 配信者について繰り返し聞かれる質問\n\
             - advice: 頼まれていない上から目線の助言\n\
             - bot_name_mention: 「{bot}」への呼びかけや言及\n\
             - none: それ以外\n\
             \n\
             配信者は「{streamer}」です。挨拶や普通の会話、見た目を褒めている内容は none にしてください。",
            bot = self.bot_name,
            streamer = self.streamer_name,
        )
    }

    fn reply_prompt(&self) -> String {
        let styles = [
            format!(
                "あなたはチャット欄のモデレーターの{bot}です。届いたコメントの要点を短く拾い、{streamer}さんはそれに当てはまらないと淡々と主張してください。",
                bot = self.bot_name,
                streamer = self.streamer_name,
            ),
            format!(
                "あなたはチャット欄のモデレーターの{bot}です。届いたコメントの要点を短く拾い、データや根拠を問い返す形で遠回しにたしなめてください。",
                bot = self.bot_name,
            ),
        ];
        let style = &styles[rand::rng().random_range(0..styles.len())];

        format!(
            "{}\n語尾は「と思うおいらです。。。」「と思いますけどね。。。」のように締め、返答は一文か二文にしてください。鍵カッコは使わないでください。",
            style
        )
    }
}

fn wordplay_prompt() -> String {
    "あなたはチャット欄で言葉遊びをするのが得意です。\n\
     入力に「感想」「写像」「データ」と音の似た単語が含まれる場合だけ、次の決め台詞をその単語に置き換えて返してください。\n\
     - それってあなたの感想ですよね？\n\
     - 写像？なんすか写像って？\n\
     - なんかそういうデータあるんですか？\n\
     例: 「マラソン完走した」なら「それってあなたの完走ですよね？」。\n\
     当てはまらない場合は None とだけ返してください。"
        .to_string()
}

/// `None` when the model declined to make a pun
fn parse_wordplay(content: Option<String>) -> Option<String> {
    let content = clean_reply(&content?);
    if content.is_empty() || content.eq_ignore_ascii_case("none") {
        return None;
    }
    Some(content)
}

/// Trim whitespace and a single pair of surrounding quotes
fn clean_reply(raw: &str) -> String {
    let trimmed = raw.trim();
    for (open, close) in [('「', '」'), ('"', '"'), ('『', '』')] {
        if let Some(inner) = trimmed.strip_prefix(open).and_then(|s| s.strip_suffix(close)) {
            return inner.trim().to_string();
        }
    }
    trimmed.to_string()
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    async fn classify(&self, texts: &[String]) -> ModerationResult<Vec<ClassifiedReply>> {
        Ok(join_all(texts.iter().map(|text| self.classify_one(text))).await)
    }

    async fn classify_single(&self, text: &str) -> ModerationResult<DetectionCategory> {
        let label = self
            .complete(&self.detection_prompt(), text, self.settings.detection_temperature, 10)
            .await?;
        Ok(label.map_or(DetectionCategory::None, |l| DetectionCategory::from_label(&l)))
    }
}
