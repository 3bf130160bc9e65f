// src/classifier/mod.rs - Semantic judgment of comments is delegated behind this trait

use async_trait::async_trait;

use crate::types::{ClassifiedReply, DetectionCategory, ModerationResult};

pub mod openai;

pub use openai::OpenAiClassifier;

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify a batch of cleaned comment texts. The result is positionally
    /// aligned with `texts`; a failed item is reported as `DetectionCategory::Error`.
    async fn classify(&self, texts: &[String]) -> ModerationResult<Vec<ClassifiedReply>>;

    async fn classify_single(&self, text: &str) -> ModerationResult<DetectionCategory>;
}
