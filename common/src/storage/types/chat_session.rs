use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::message::ChatMessage;

stored_object!(ChatSession, "chat_session", {
    user_id: String,
    notebook_id: String,
    title: String
});

impl ChatSession {
    pub fn new(user_id: String, notebook_id: String, title: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            user_id,
            notebook_id,
            title,
        }
    }

    /// Fetches a session the caller owns. Cross-owner reads surface NotFound
    /// so existence is not disclosed.
    pub async fn get_owned(
        id: &str,
        user_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        db.get_item::<Self>(id)
            .await?
            .filter(|session| session.user_id == user_id)
            .ok_or_else(|| AppError::NotFound("Chat session not found".into()))
    }

    pub async fn list_for_user(
        user_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let sessions: Vec<Self> = db
            .client
            .query(
                "SELECT * FROM type::table($table)
                WHERE user_id = $user_id ORDER BY updated_at DESC",
            )
            .bind(("table", Self::table_name()))
            .bind(("user_id", user_id.to_string()))
            .await?
            .take(0)?;

        Ok(sessions)
    }

    /// The session transcript in persistence order.
    pub async fn messages(
        session_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<ChatMessage>, AppError> {
        ChatMessage::list_for_session(session_id, db).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::message::ChatRole;

    async fn setup_test_db() -> SurrealDbClient {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");
        db.apply_migrations().await.expect("migrations");
        db
    }

    #[tokio::test]
    async fn test_cross_owner_read_is_not_found() {
        let db = setup_test_db().await;

        let session = ChatSession::new(
            "owner".to_string(),
            "notebook-1".to_string(),
            "Private chat".to_string(),
        );
        db.store_item(session.clone()).await.expect("store");

        let result = ChatSession::get_owned(&session.id, "intruder", &db).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        let owned = ChatSession::get_owned(&session.id, "owner", &db).await;
        assert!(owned.is_ok());
    }

    #[tokio::test]
    async fn test_messages_come_back_in_creation_order() {
        let db = setup_test_db().await;

        let session = ChatSession::new(
            "user_1".to_string(),
            "notebook-1".to_string(),
            "Ordered".to_string(),
        );
        db.store_item(session.clone()).await.expect("store");

        let base = Utc::now();
        for (i, content) in ["first", "second", "third"].iter().enumerate() {
            let mut message = ChatMessage::new(
                session.id.clone(),
                if i % 2 == 0 {
                    ChatRole::User
                } else {
                    ChatRole::Assistant
                },
                (*content).to_string(),
            );
            message.created_at = base + chrono::Duration::seconds(i as i64);
            message.updated_at = message.created_at;
            db.store_item(message).await.expect("store message");
        }

        let messages = ChatSession::messages(&session.id, &db).await.expect("list");
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }
}
