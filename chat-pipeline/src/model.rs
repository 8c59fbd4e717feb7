use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use std::sync::Arc;

use async_trait::async_trait;
use common::{
    credentials::CredentialContext,
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            message::ChatRole,
            model_config::{ModelConfig, ModelKind},
        },
    },
    utils::config::AppConfig,
};
use futures::{stream::BoxStream, StreamExt};

/// One message of the assembled prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Streaming language-model access behind a trait so the executor can be
/// driven by a mock in tests. The returned stream yields token fragments in
/// arrival order.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn stream_completion(
        &self,
        credentials: &CredentialContext,
        messages: Vec<PromptMessage>,
    ) -> Result<BoxStream<'static, Result<String, AppError>>, AppError>;
}

/// Production model backed by the caller's per-request OpenAI client. The
/// model name resolves through the caller's `model_config` records, falling
/// back to the process default.
pub struct OpenAiChatModel {
    db: Arc<SurrealDbClient>,
    config: AppConfig,
}

impl OpenAiChatModel {
    pub fn new(db: Arc<SurrealDbClient>, config: AppConfig) -> Self {
        Self { db, config }
    }

    async fn model_name(&self, credentials: &CredentialContext) -> String {
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
impl ChatModel for OpenAiChatModel {
    async fn stream_completion(
        &self,
        credentials: &CredentialContext,
        messages: Vec<PromptMessage>,
    ) -> Result<BoxStream<'static, Result<String, AppError>>, AppError> {
        let client = credentials.openai_client(&self.config.openai_base_url)?;

        let mut request_messages: Vec<ChatCompletionRequestMessage> =
            Vec::with_capacity(messages.len());
        for message in messages {
            let built = match message.role {
                ChatRole::System => ChatCompletionRequestSystemMessageArgs::default()
                    .content(message.content)
                    .build()?
                    .into(),
                ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(message.content)
                    .build()?
                    .into(),
                ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(message.content)
                    .build()?
                    .into(),
            };
            request_messages.push(built);
        }

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model_name(credentials).await)
            .messages(request_messages)
            .build()?;

        let stream = client.chat().create_stream(request).await?;

        // Dropping the returned stream drops the underlying HTTP response,
        // aborting the provider call on client disconnect.
        Ok(stream
            .map(|result| match result {
                Ok(response) => Ok(response
                    .choices
                    .first()
                    .and_then(|choice| choice.delta.content.clone())
                    .unwrap_or_default()),
                Err(err) => Err(AppError::from(err)),
            })
            .boxed())
    }
}
