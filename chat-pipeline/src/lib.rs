#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod context;
pub mod events;
pub mod model;

use std::{collections::HashMap, sync::Arc};

use async_stream::stream;
use common::{
    credentials::CredentialContext,
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            chat_session::ChatSession,
            message::{ChatMessage, ChatRole},
            user::User,
        },
    },
    utils::config::AppConfig,
    vault::SecretVault,
};
use futures::{stream::BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info};

pub use context::{ContextMode, ContextSelection, NoteSelection, SelectedContext};
pub use events::ChatEvent;
pub use model::{ChatModel, OpenAiChatModel, PromptMessage};

/// One chat execution request as the API hands it to the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
    #[serde(default)]
    pub selected_context: SelectedContext,
}

/// Per-session mutexes serializing concurrent requests on one session while
/// leaving different sessions fully parallel.
#[derive(Default)]
struct SessionLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    async fn lock_for(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().await;
        Arc::clone(
            map.entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}

/// Streaming chat executor: validates ownership, assembles context, streams
/// tokens and persists the finished turn. Persistence happens only after the
/// model stream completed, so a dropped consumer leaves the session
/// untouched.
pub struct ChatExecutor {
    db: Arc<SurrealDbClient>,
    config: AppConfig,
    vault: Arc<SecretVault>,
    model: Arc<dyn ChatModel>,
    locks: Arc<SessionLocks>,
}

impl ChatExecutor {
    pub fn new(
        db: Arc<SurrealDbClient>,
        config: AppConfig,
        vault: Arc<SecretVault>,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            db,
            config,
            vault,
            model,
            locks: Arc::new(SessionLocks::default()),
        }
    }

    /// Opens the event stream for one request. Ownership and credential
    /// problems surface as errors here, before any event is emitted; every
    /// later failure becomes a terminal `error` event on the stream.
    pub async fn execute(
        &self,
        user: &User,
        request: ChatRequest,
    ) -> Result<BoxStream<'static, ChatEvent>, AppError> {
        let session = ChatSession::get_owned(&request.session_id, &user.id, &self.db).await?;
        let credentials = CredentialContext::for_user(&self.db, &self.vault, &user.id).await?;

        let db = Arc::clone(&self.db);
        let model = Arc::clone(&self.model);
        let locks = Arc::clone(&self.locks);
        let budget = self.config.chat_context_budget_chars;

        let events = stream! {
            let session_lock = locks.lock_for(&session.id).await;
            let _guard = session_lock.lock().await;

            yield ChatEvent::UserMessage { content: request.message.clone() };

            let context_block = match context::build_context_block(
                &db,
                &session.user_id,
                &request.selected_context,
            )
            .await
            {
                Ok(block) => block,
                Err(err) => {
                    yield ChatEvent::Error { message: err.to_string() };
                    return;
                }
            };

            let history = match ChatMessage::list_for_session(&session.id, &db).await {
                Ok(history) => history,
                Err(err) => {
                    yield ChatEvent::Error { message: err.to_string() };
                    return;
                }
            };

            let prompt = context::assemble_prompt(
                context_block.as_deref(),
                &history,
                &request.message,
                budget,
            );

            let mut tokens = match model.stream_completion(&credentials, prompt).await {
                Ok(stream) => stream,
                Err(err) => {
                    yield ChatEvent::Error { message: err.to_string() };
                    return;
                }
            };

            let mut assistant_text = String::new();
            while let Some(item) = tokens.next().await {
                match item {
                    Ok(fragment) => {
                        if fragment.is_empty() {
                            continue;
                        }
                        assistant_text.push_str(&fragment);
                        yield ChatEvent::Token { content: fragment };
                    }
                    Err(err) => {
                        error!(session_id = %session.id, error = %err, "model stream failed");
                        yield ChatEvent::Error { message: err.to_string() };
                        return;
                    }
                }
            }

            // Persist the turn only now: a consumer that disconnected mid-stream
            // dropped this generator before reaching here, so neither message
            // lands in the session.
            let user_message = ChatMessage::new(
                session.id.clone(),
                ChatRole::User,
                request.message.clone(),
            );
            if let Err(err) = db.store_item(user_message).await {
                yield ChatEvent::Error { message: err.to_string() };
                return;
            }

            let assistant_message = ChatMessage::new(
                session.id.clone(),
                ChatRole::Assistant,
                assistant_text.clone(),
            );
            if let Err(err) = db.store_item(assistant_message).await {
                yield ChatEvent::Error { message: err.to_string() };
                return;
            }

            info!(session_id = %session.id, "chat turn persisted");
            yield ChatEvent::AiMessageComplete { content: assistant_text };
            yield ChatEvent::Complete;
        };

        Ok(events.boxed())
    }
}
