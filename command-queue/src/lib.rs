#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod registry;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use common::{
    credentials::CredentialContext,
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            command::{Command, DEFAULT_LEASE_SECS, MAX_ATTEMPTS},
            source::{Source, SourceStatus},
        },
    },
    utils::config::AppConfig,
    vault::SecretVault,
};
use futures::StreamExt;
use tokio::{sync::Notify, time::sleep};
use tracing::{error, info, warn};
use uuid::Uuid;

pub use registry::{CommandHandler, CommandRegistry, HandlerContext};

/// How often an idle worker sweeps for abandoned claims.
const REAP_INTERVAL: Duration = Duration::from_secs(60);
/// Idle wait between claim attempts when no live notification arrives.
const IDLE_BACKOFF: Duration = Duration::from_secs(1);

/// Submit and dispatch front-end over the durable command table.
pub struct CommandQueue {
    db: Arc<SurrealDbClient>,
    config: AppConfig,
    vault: Arc<SecretVault>,
    registry: Arc<CommandRegistry>,
}

impl CommandQueue {
    pub fn new(
        db: Arc<SurrealDbClient>,
        config: AppConfig,
        vault: Arc<SecretVault>,
        registry: Arc<CommandRegistry>,
    ) -> Self {
        Self {
            db,
            config,
            vault,
            registry,
        }
    }

    pub fn db(&self) -> &Arc<SurrealDbClient> {
        &self.db
    }

    /// Persists a new command and returns immediately with its id. The
    /// registry is not consulted here: the worker that claims the command may
    /// live in another process, and an unknown handler is reported through
    /// the command's own failed state within one worker tick.
    pub async fn submit(
        &self,
        namespace: &str,
        name: &str,
        input: serde_json::Value,
    ) -> Result<String, AppError> {
        let command = Command::create_and_store(
            namespace.to_string(),
            name.to_string(),
            input,
            &self.db,
        )
        .await?;

        Ok(command.id)
    }

    /// Persists and runs a command in the calling task, bounded by `timeout`.
    /// Unknown handlers fail fast since execution is local by definition.
    pub async fn execute_sync(
        &self,
        namespace: &str,
        name: &str,
        input: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, AppError> {
        if self.registry.get(namespace, name).is_none() {
            return Err(AppError::Validation(format!(
                "unknown handler: {namespace}/{name}"
            )));
        }

        let command = Command::create_and_store(
            namespace.to_string(),
            name.to_string(),
            input,
            &self.db,
        )
        .await?;
        let claimed = Command::claim_by_id(&command.id, &self.db)
            .await?
            .ok_or_else(|| AppError::InternalError("Failed to claim fresh command".into()))?;

        match tokio::time::timeout(timeout, self.dispatch(&claimed)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let err = AppError::Timeout {
                    stage: "execute_sync",
                    seconds: timeout.as_secs(),
                };
                Command::mark_failed(&command.id, &err.to_string(), &self.db).await?;
                self.mirror_source_failure(&claimed, &err.to_string()).await;
                Err(err)
            }
        }
    }

    /// Runs one claimed command to its terminal state: resolve handler, build
    /// the caller's credential context, execute, persist the outcome and
    /// mirror failures onto the associated source.
    pub async fn dispatch(&self, command: &Command) -> Result<serde_json::Value, AppError> {
        let Some(handler) = self.registry.get(&command.namespace, &command.name) else {
            Command::mark_failed(&command.id, "unknown handler", &self.db).await?;
            self.mirror_source_failure(command, "unknown handler").await;
            return Err(AppError::Validation(format!(
                "unknown handler: {}/{}",
                command.namespace, command.name
            )));
        };

        let outcome = match self.credentials_for(command).await {
            Ok(credentials) => {
                let ctx = HandlerContext {
                    db: self.db.clone(),
                    config: self.config.clone(),
                    credentials,
                };
                handler.run(&ctx, command.input.clone()).await
            }
            Err(err) => Err(err),
        };

        match &outcome {
            Ok(result) => {
                Command::mark_complete(&command.id, result.clone(), &self.db).await?;
            }
            Err(err) => {
                let message = err.to_string();
                Command::mark_failed(&command.id, &message, &self.db).await?;
                self.mirror_source_failure(command, &message).await;
            }
        }

        outcome
    }

    async fn credentials_for(&self, command: &Command) -> Result<CredentialContext, AppError> {
        match command.user_id() {
            Some(user_id) => CredentialContext::for_user(&self.db, &self.vault, user_id).await,
            None => Ok(CredentialContext::empty()),
        }
    }

    /// A failed command drags the source it was processing into `failed` so
    /// pollers see the terminal state without inspecting the command.
    async fn mirror_source_failure(&self, command: &Command, message: &str) {
        let Some(source_id) = command.source_id() else {
            return;
        };

        if let Err(err) = Source::set_status(
            source_id,
            SourceStatus::Failed,
            Some(message.to_string()),
            &self.db,
        )
        .await
        {
            error!(%source_id, error = %err, "failed to mirror command failure onto source");
        }
    }
}

/// Long-running claim loop: wakes on live-query notifications or a one second
/// tick, claims one command at a time and runs it to a terminal state. Sweeps
/// for abandoned claims on startup and periodically thereafter.
pub async fn run_worker_loop(queue: Arc<CommandQueue>) -> Result<(), AppError> {
    let worker_id = format!("command-worker-{}", Uuid::new_v4());
    info!(%worker_id, "command worker starting");

    let notify = Arc::new(Notify::new());
    spawn_notification_listener(queue.db().clone(), Arc::clone(&notify));

    reap(queue.db()).await;
    let mut last_reap = Instant::now();

    loop {
        if last_reap.elapsed() >= REAP_INTERVAL {
            reap(queue.db()).await;
            last_reap = Instant::now();
        }

        match Command::claim_next(queue.db()).await {
            Ok(Some(command)) => {
                let command_id = command.id.clone();
                info!(
                    %worker_id,
                    %command_id,
                    namespace = %command.namespace,
                    name = %command.name,
                    attempt = command.attempts,
                    "claimed command"
                );
                if let Err(err) = queue.dispatch(&command).await {
                    error!(%worker_id, %command_id, error = %err, "command failed");
                }
            }
            Ok(None) => {
                tokio::select! {
                    () = notify.notified() => {}
                    () = sleep(IDLE_BACKOFF) => {}
                }
            }
            Err(err) => {
                error!(%worker_id, error = %err, "failed to claim command");
                warn!("Backing off for 1s after claim error");
                sleep(IDLE_BACKOFF).await;
            }
        }
    }
}

fn spawn_notification_listener(db: Arc<SurrealDbClient>, notify: Arc<Notify>) {
    tokio::spawn(async move {
        match Command::listen(&db).await {
            Ok(mut stream) => {
                while let Some(_notification) = stream.next().await {
                    notify.notify_one();
                }
            }
            Err(err) => {
                warn!(error = %err, "live query unavailable, worker falls back to polling");
            }
        }
    });
}

async fn reap(db: &SurrealDbClient) {
    match Command::reap_expired(db, DEFAULT_LEASE_SECS, MAX_ATTEMPTS).await {
        Ok((0, 0)) => {}
        Ok((requeued, exhausted)) => {
            info!(requeued, exhausted, "reaped abandoned command claims");
        }
        Err(err) => error!(error = %err, "reaper sweep failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes_gcm::{
        aead::{KeyInit, OsRng},
        Aes256Gcm,
    };
    use async_trait::async_trait;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use common::storage::types::command::CommandStatus;
    use common::storage::types::source::SourceAsset;
    use serde_json::json;

    struct EchoHandler;

    #[async_trait]
    impl CommandHandler for EchoHandler {
        fn namespace(&self) -> &'static str {
            "test"
        }

        fn name(&self) -> &'static str {
            "echo"
        }

        async fn run(
            &self,
            _ctx: &HandlerContext,
            input: serde_json::Value,
        ) -> Result<serde_json::Value, AppError> {
            Ok(json!({ "echoed": input }))
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl CommandHandler for FailingHandler {
        fn namespace(&self) -> &'static str {
            "test"
        }

        fn name(&self) -> &'static str {
            "fail"
        }

        async fn run(
            &self,
            _ctx: &HandlerContext,
            _input: serde_json::Value,
        ) -> Result<serde_json::Value, AppError> {
            Err(AppError::Processing {
                stage: "extract",
                message: "boom".to_string(),
            })
        }
    }

    async fn test_queue() -> CommandQueue {
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .expect("memory db"),
        );
        db.apply_migrations().await.expect("migrations");

        let key = Aes256Gcm::generate_key(&mut OsRng);
        let vault =
            Arc::new(SecretVault::from_encoded_key(&BASE64.encode(key)).expect("vault"));

        let mut registry = CommandRegistry::new();
        registry.register(Arc::new(EchoHandler));
        registry.register(Arc::new(FailingHandler));

        CommandQueue::new(db, AppConfig::default(), vault, Arc::new(registry))
    }

    #[tokio::test]
    async fn submit_persists_a_new_command() {
        let queue = test_queue().await;

        let id = queue
            .submit("test", "echo", json!({"user_id": "u1"}))
            .await
            .expect("submit");

        let command: Command = queue
            .db()
            .get_item(&id)
            .await
            .expect("get")
            .expect("stored");
        assert_eq!(command.status, CommandStatus::New);
        assert_eq!(command.attempts, 0);
    }

    #[tokio::test]
    async fn dispatch_runs_handler_and_completes() {
        let queue = test_queue().await;

        queue
            .submit("test", "echo", json!({"value": 7}))
            .await
            .expect("submit");
        let claimed = Command::claim_next(queue.db())
            .await
            .expect("claim")
            .expect("claimed");

        let result = queue.dispatch(&claimed).await.expect("dispatch");
        assert_eq!(result, json!({"echoed": {"value": 7}}));

        let finished: Command = queue
            .db()
            .get_item(&claimed.id)
            .await
            .expect("get")
            .expect("stored");
        assert_eq!(finished.status, CommandStatus::Complete);
        assert_eq!(finished.result, Some(json!({"echoed": {"value": 7}})));
    }

    #[tokio::test]
    async fn unknown_handler_fails_with_exact_message() {
        let queue = test_queue().await;

        let id = queue
            .submit("test", "missing", json!({}))
            .await
            .expect("submit");
        let claimed = Command::claim_next(queue.db())
            .await
            .expect("claim")
            .expect("claimed");

        assert!(queue.dispatch(&claimed).await.is_err());

        let failed: Command = queue
            .db()
            .get_item(&id)
            .await
            .expect("get")
            .expect("stored");
        assert_eq!(failed.status, CommandStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("unknown handler"));
    }

    #[tokio::test]
    async fn handler_failure_is_mirrored_onto_source() {
        let queue = test_queue().await;

        let source = Source::new(
            "Doomed".to_string(),
            SourceAsset::Text {
                inline: "body".to_string(),
            },
            "u1".to_string(),
        );
        queue
            .db()
            .store_item(source.clone())
            .await
            .expect("store source");

        queue
            .submit(
                "test",
                "fail",
                json!({"source_id": source.id, "user_id": "u1"}),
            )
            .await
            .expect("submit");
        let claimed = Command::claim_next(queue.db())
            .await
            .expect("claim")
            .expect("claimed");

        assert!(queue.dispatch(&claimed).await.is_err());

        let mirrored = Source::get_owned(&source.id, "u1", queue.db())
            .await
            .expect("get source");
        assert_eq!(mirrored.status, SourceStatus::Failed);
        assert_eq!(mirrored.error_message.as_deref(), Some("extract: boom"));
    }

    #[tokio::test]
    async fn execute_sync_returns_result_and_persists_outcome() {
        let queue = test_queue().await;

        let result = queue
            .execute_sync(
                "test",
                "echo",
                json!({"value": 1}),
                Duration::from_secs(5),
            )
            .await
            .expect("execute_sync");
        assert_eq!(result, json!({"echoed": {"value": 1}}));

        // Unknown handlers fail fast without persisting anything runnable.
        let err = queue
            .execute_sync("test", "missing", json!({}), Duration::from_secs(5))
            .await;
        assert!(matches!(err, Err(AppError::Validation(_))));
    }
}
