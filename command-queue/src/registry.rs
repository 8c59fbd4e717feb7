use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use common::{
    credentials::CredentialContext, error::AppError, storage::db::SurrealDbClient,
    utils::config::AppConfig,
};

/// Everything a handler needs for one command: the repository, process
/// configuration and the submitting caller's credential context.
pub struct HandlerContext {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub credentials: CredentialContext,
}

/// A unit of deferred work executable by the worker, registered at startup
/// under a compile-time-known `(namespace, name)` pair.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    fn namespace(&self) -> &'static str;
    fn name(&self) -> &'static str;

    async fn run(
        &self,
        ctx: &HandlerContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, AppError>;
}

/// Static handler registry; lookups happen on every dispatch, registration
/// only at process start.
#[derive(Default)]
pub struct CommandRegistry {
    handlers: HashMap<(String, String), Arc<dyn CommandHandler>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn CommandHandler>) {
        self.handlers.insert(
            (handler.namespace().to_string(), handler.name().to_string()),
            handler,
        );
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandler;

    #[async_trait]
    impl CommandHandler for NoopHandler {
        fn namespace(&self) -> &'static str {
            "test"
        }

        fn name(&self) -> &'static str {
            "noop"
        }

        async fn run(
            &self,
            _ctx: &HandlerContext,
            input: serde_json::Value,
        ) -> Result<serde_json::Value, AppError> {
            Ok(input)
        }
    }

    #[test]
    fn registry_resolves_by_namespace_and_name() {
        let mut registry = CommandRegistry::new();
        assert!(registry.is_empty());

        registry.register(Arc::new(NoopHandler));

        assert!(registry.get("test", "noop").is_some());
        assert!(registry.get("test", "other").is_none());
        assert!(registry.get("other", "noop").is_none());
    }
}
