use crate::{credentials::Provider, error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(UserProviderSecret, "user_provider_secret", {
    user_id: String,
    provider: Provider,
    encrypted_value: String,
    display_name: Option<String>
});

/// List view of a stored secret. Never carries ciphertext or plaintext; only
/// the explicit reveal operation decrypts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecretMetadata {
    pub id: String,
    pub provider: Provider,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserProviderSecret> for SecretMetadata {
    fn from(secret: UserProviderSecret) -> Self {
        Self {
            id: secret.id,
            provider: secret.provider,
            display_name: secret.display_name,
            created_at: secret.created_at,
            updated_at: secret.updated_at,
        }
    }
}

impl UserProviderSecret {
    /// Record ids are deterministic per (user, provider) so a second store of
    /// the same provider replaces the first; the unique index backs this up.
    pub fn new(
        user_id: String,
        provider: Provider,
        encrypted_value: String,
        display_name: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: format!("{user_id}_{}", provider.tag()),
            created_at: now,
            updated_at: now,
            user_id,
            provider,
            encrypted_value,
            display_name,
        }
    }

    pub async fn upsert(self, db: &SurrealDbClient) -> Result<Self, AppError> {
        let stored = db.upsert_item(self).await?;
        stored.ok_or_else(|| AppError::InternalError("Failed to store provider secret".into()))
    }

    pub async fn list_for_user(
        user_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let secrets: Vec<Self> = db
            .client
            .query("SELECT * FROM type::table($table) WHERE user_id = $user_id ORDER BY provider")
            .bind(("table", Self::table_name()))
            .bind(("user_id", user_id.to_string()))
            .await?
            .take(0)?;

        Ok(secrets)
    }

    pub async fn list_metadata_for_user(
        user_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<SecretMetadata>, AppError> {
        Ok(Self::list_for_user(user_id, db)
            .await?
            .into_iter()
            .map(SecretMetadata::from)
            .collect())
    }

    pub async fn get_by_provider(
        user_id: &str,
        provider: Provider,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let secret: Option<Self> = db
            .client
            .query(
                "SELECT * FROM type::table($table)
                WHERE user_id = $user_id AND provider = $provider LIMIT 1",
            )
            .bind(("table", Self::table_name()))
            .bind(("user_id", user_id.to_string()))
            .bind(("provider", provider))
            .await?
            .take(0)?;

        Ok(secret)
    }

    pub async fn delete_by_provider(
        user_id: &str,
        provider: Provider,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let existing = Self::get_by_provider(user_id, provider, db)
            .await?
            .ok_or_else(|| AppError::NotFound("No secret stored for provider".into()))?;

        db.delete_item::<Self>(&existing.id).await?;
        Ok(())
    }
}
