use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(User, "user", {
    email: String,
    password: String,
    display_name: Option<String>,
    is_active: bool,
    is_admin: bool,
    has_completed_onboarding: bool,
    api_key: Option<String>
});

// Account provisioning is owned by the external auth layer, which writes
// `user` records (lower-cased unique email, argon2 password hash, the opaque
// bearer token in `api_key`) into the shared store. The core only reads them:
// it resolves a presented token to an identity and enforces ownership.
impl User {
    /// Resolves a bearer token to its active account, the identity the rest
    /// of the core keys ownership on.
    pub async fn find_by_api_key(
        api_key: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let user: Option<User> = db
            .client
            .query("SELECT * FROM user WHERE api_key = $api_key AND is_active = true LIMIT 1")
            .bind(("api_key", api_key.to_string()))
            .await?
            .take(0)?;

        Ok(user)
    }

    /// Clears every record owned by the user, in dependency order: notebooks,
    /// sources, chunks, insights, notes, chat sessions (with messages),
    /// episodes, provider secrets. The user record itself is kept.
    pub async fn wipe_owned_data(user_id: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        db.client
            .query("DELETE notebook WHERE user_id = $user_id")
            .query("DELETE source WHERE user_id = $user_id")
            .query("DELETE source_chunk WHERE user_id = $user_id")
            .query("DELETE source_insight WHERE user_id = $user_id")
            .query("DELETE note WHERE user_id = $user_id")
            .query(
                "DELETE chat_message WHERE session_id IN
                    (SELECT VALUE record::id(id) FROM chat_session WHERE user_id = $user_id)",
            )
            .query("DELETE chat_session WHERE user_id = $user_id")
            .query("DELETE episode WHERE user_id = $user_id")
            .query("DELETE user_provider_secret WHERE user_id = $user_id")
            .bind(("user_id", user_id.to_string()))
            .await?
            .check()?;

        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl User {
    /// Test fixture shaped like an account the external auth layer would
    /// have provisioned: active, with a bearer token already attached.
    pub fn fixture(email: &str, is_admin: bool) -> Self {
        let now = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();
        Self {
            api_key: Some(format!("test-token-{id}")),
            id,
            created_at: now,
            updated_at: now,
            email: email.to_ascii_lowercase(),
            password: "argon2-hash-placeholder".to_string(),
            display_name: None,
            is_active: true,
            is_admin,
            has_completed_onboarding: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::{
        chat_session::ChatSession,
        message::{ChatMessage, ChatRole},
        notebook::Notebook,
    };
    use uuid::Uuid;

    async fn setup_test_db() -> SurrealDbClient {
        let namespace = "test_ns";
        let database = Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, &database)
            .await
            .expect("Failed to start in-memory surrealdb");

        db.apply_migrations()
            .await
            .expect("Failed to apply migrations");

        db
    }

    #[tokio::test]
    async fn test_find_by_api_key_resolves_active_accounts() {
        let db = setup_test_db().await;

        let user = User::fixture("Reader@Example.com", false);
        let token = user.api_key.clone().expect("fixture token");
        db.store_item(user.clone()).await.expect("store user");

        let found = User::find_by_api_key(&token, &db)
            .await
            .expect("Error searching by API key");
        let found = found.expect("user resolved");
        assert_eq!(found.id, user.id);
        assert_eq!(found.email, "reader@example.com");

        let not_found = User::find_by_api_key("test-token-bogus", &db)
            .await
            .expect("Error searching by API key");
        assert!(not_found.is_none());
    }

    #[tokio::test]
    async fn test_find_by_api_key_ignores_deactivated_accounts() {
        let db = setup_test_db().await;

        let mut user = User::fixture("gone@example.com", false);
        user.is_active = false;
        let token = user.api_key.clone().expect("fixture token");
        db.store_item(user).await.expect("store user");

        let resolved = User::find_by_api_key(&token, &db)
            .await
            .expect("Error searching by API key");
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn test_wipe_owned_data_is_scoped_to_user() {
        let db = setup_test_db().await;
        let user_id = "wipe_user";
        let other_id = "other_user";

        let notebook = Notebook::new("Mine".to_string(), None, user_id.to_string());
        db.store_item(notebook).await.expect("store notebook");

        let session = ChatSession::new(user_id.to_string(), "nb".to_string(), "Chat".to_string());
        let message = ChatMessage::new(session.id.clone(), ChatRole::User, "hello".to_string());
        db.store_item(session).await.expect("store session");
        db.store_item(message).await.expect("store message");

        let other_notebook = Notebook::new("Theirs".to_string(), None, other_id.to_string());
        db.store_item(other_notebook.clone())
            .await
            .expect("store other notebook");

        User::wipe_owned_data(user_id, &db).await.expect("wipe");

        let notebooks: Vec<Notebook> = db.get_all_stored_items().await.expect("notebooks");
        assert_eq!(notebooks.len(), 1);
        assert_eq!(
            notebooks.first().map(|n| n.id.clone()),
            Some(other_notebook.id)
        );

        let sessions: Vec<ChatSession> = db.get_all_stored_items().await.expect("sessions");
        assert!(sessions.is_empty());

        let messages: Vec<ChatMessage> = db.get_all_stored_items().await.expect("messages");
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn test_wipe_keeps_the_user_record() {
        let db = setup_test_db().await;

        let user = User::fixture("kept@example.com", true);
        db.store_item(user.clone()).await.expect("store user");

        User::wipe_owned_data(&user.id, &db).await.expect("wipe");

        let still_there: Option<User> = db.get_item(&user.id).await.expect("get user");
        assert!(still_there.is_some());
    }
}
