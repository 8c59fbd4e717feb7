use uuid::Uuid;

use crate::{credentials::Provider, error::AppError, storage::db::SurrealDbClient, stored_object};

/// Which model slot a configuration fills.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Chat,
    Embedding,
}

stored_object!(ModelConfig, "model_config", {
    user_id: Option<String>,
    kind: ModelKind,
    provider: Provider,
    model_name: String,
    dimensions: Option<i64>
});

impl ModelConfig {
    /// `user_id = None` marks a system-wide default overridable per user.
    pub fn new(
        user_id: Option<String>,
        kind: ModelKind,
        provider: Provider,
        model_name: String,
        dimensions: Option<i64>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            user_id,
            kind,
            provider,
            model_name,
            dimensions,
        }
    }

    /// Resolves the model to use for one slot: the user's own configuration
    /// wins over the system-wide one; `None` means the process defaults
    /// apply.
    pub async fn resolve(
        kind: ModelKind,
        user_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let configs: Vec<Self> = db
            .client
            .query(
                "SELECT * FROM type::table($table)
                WHERE kind = $kind AND (user_id = $user_id OR user_id = NONE)
                ORDER BY updated_at DESC",
            )
            .bind(("table", Self::table_name()))
            .bind(("kind", kind))
            .bind(("user_id", user_id.to_string()))
            .await?
            .take(0)?;

        let user_scoped = configs
            .iter()
            .find(|config| config.user_id.as_deref() == Some(user_id))
            .cloned();

        Ok(user_scoped.or_else(|| configs.into_iter().find(|config| config.user_id.is_none())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_test_db() -> SurrealDbClient {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");
        db.apply_migrations().await.expect("migrations");
        db
    }

    #[tokio::test]
    async fn resolve_prefers_user_scoped_config() {
        let db = setup_test_db().await;

        let system = ModelConfig::new(
            None,
            ModelKind::Chat,
            Provider::Openai,
            "gpt-4o-mini".to_string(),
            None,
        );
        let personal = ModelConfig::new(
            Some("user_1".to_string()),
            ModelKind::Chat,
            Provider::Openai,
            "gpt-4o".to_string(),
            None,
        );
        db.store_item(system).await.expect("store system");
        db.store_item(personal).await.expect("store personal");

        let resolved = ModelConfig::resolve(ModelKind::Chat, "user_1", &db)
            .await
            .expect("resolve")
            .expect("config present");
        assert_eq!(resolved.model_name, "gpt-4o");

        let fallback = ModelConfig::resolve(ModelKind::Chat, "user_2", &db)
            .await
            .expect("resolve")
            .expect("system config present");
        assert_eq!(fallback.model_name, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn resolve_returns_none_without_configs() {
        let db = setup_test_db().await;

        let resolved = ModelConfig::resolve(ModelKind::Embedding, "user_1", &db)
            .await
            .expect("resolve");
        assert!(resolved.is_none());
    }
}
