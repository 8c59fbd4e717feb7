use std::sync::Arc;

use async_openai::types::{
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    CreateEmbeddingRequestArgs,
};
use async_trait::async_trait;
use common::{
    credentials::CredentialContext,
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::model_config::{ModelConfig, ModelKind},
    },
    utils::config::AppConfig,
};

/// Model-facing operations of the pipeline, behind a trait so tests can run
/// the stage graph without a provider.
#[async_trait]
pub trait PipelineServices: Send + Sync {
    /// Embeds one batch of chunk texts, preserving input order.
    async fn embed_batch(
        &self,
        credentials: &CredentialContext,
        inputs: &[String],
    ) -> Result<Vec<Vec<f32>>, AppError>;

    /// Runs one rendered transformation prompt through the language model.
    async fn generate_insight(
        &self,
        credentials: &CredentialContext,
        prompt: &str,
    ) -> Result<String, AppError>;
}

/// Production services backed by the caller's per-request OpenAI client.
/// Model names resolve through the caller's `model_config` records, falling
/// back to the process defaults.
pub struct OpenAiServices {
    db: Arc<SurrealDbClient>,
    config: AppConfig,
}

impl OpenAiServices {
    pub fn new(db: Arc<SurrealDbClient>, config: AppConfig) -> Self {
        Self { db, config }
    }

    async fn embedding_model(&self, credentials: &CredentialContext) -> (String, u32) {
        if let Some(user_id) = credentials.user_id() {
            if let Ok(Some(config)) =
                ModelConfig::resolve(ModelKind::Embedding, user_id, &self.db).await
            {
                let dimensions = config
                    .dimensions
                    .map_or(self.config.embedding_dimensions, |d| d as u32);
                return (config.model_name, dimensions);
            }
        }

        (
            self.config.embedding_model.clone(),
            self.config.embedding_dimensions,
        )
    }

    async fn chat_model(&self, credentials: &CredentialContext) -> String {
        if let Some(user_id) = credentials.user_id() {
            if let Ok(Some(config)) = ModelConfig::resolve(ModelKind::Chat, user_id, &self.db).await
            {
                return config.model_name;
            }
        }

        self.config.chat_model.clone()
    }
}

#[async_trait]
impl PipelineServices for OpenAiServices {
    async fn embed_batch(
        &self,
        credentials: &CredentialContext,
        inputs: &[String],
    ) -> Result<Vec<Vec<f32>>, AppError> {
        let client = credentials.openai_client(&self.config.openai_base_url)?;
        let (model, dimensions) = self.embedding_model(credentials).await;

        let request = CreateEmbeddingRequestArgs::default()
            .model(model)
            .dimensions(dimensions)
            .input(inputs.to_vec())
            .build()?;

        let response = client.embeddings().create(request).await?;

        let mut data = response.data;
        data.sort_by_key(|entry| entry.index);
        Ok(data.into_iter().map(|entry| entry.embedding).collect())
    }

    async fn generate_insight(
        &self,
        credentials: &CredentialContext,
        prompt: &str,
    ) -> Result<String, AppError> {
        let client = credentials.openai_client(&self.config.openai_base_url)?;
        let model = self.chat_model(credentials).await;

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages([ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()?
                .into()])
            .build()?;

        let response = client.chat().create(request).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::InternalError("No completion content received".into()))
    }
}
