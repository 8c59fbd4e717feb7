use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(Note, "note", {
    notebook_id: String,
    user_id: String,
    title: Option<String>,
    content: String
});

impl Note {
    pub fn new(
        notebook_id: String,
        user_id: String,
        title: Option<String>,
        content: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            notebook_id,
            user_id,
            title,
            content,
        }
    }

    /// Fetches a note the caller owns. Cross-owner reads surface NotFound so
    /// existence is not disclosed.
    pub async fn get_owned(
        id: &str,
        user_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        db.get_item::<Self>(id)
            .await?
            .filter(|note| note.user_id == user_id)
            .ok_or_else(|| AppError::NotFound("Note not found".into()))
    }

    pub async fn list_for_notebook(
        notebook_id: &str,
        user_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let notes: Vec<Self> = db
            .client
            .query(
                "SELECT * FROM type::table($table)
                WHERE notebook_id = $notebook_id AND user_id = $user_id
                ORDER BY created_at DESC",
            )
            .bind(("table", Self::table_name()))
            .bind(("notebook_id", notebook_id.to_string()))
            .bind(("user_id", user_id.to_string()))
            .await?
            .take(0)?;

        Ok(notes)
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
    async fn test_cross_owner_read_is_not_found() {
        let db = setup_test_db().await;

        let note = Note::new(
            "notebook-1".to_string(),
            "owner".to_string(),
            Some("Private".to_string()),
            "body".to_string(),
        );
        db.store_item(note.clone()).await.expect("store");

        assert!(matches!(
            Note::get_owned(&note.id, "intruder", &db).await,
            Err(AppError::NotFound(_))
        ));
        assert!(Note::get_owned(&note.id, "owner", &db).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_notebook_and_user() {
        let db = setup_test_db().await;

        let mine = Note::new(
            "notebook-1".to_string(),
            "user_1".to_string(),
            None,
            "mine".to_string(),
        );
        let other_notebook = Note::new(
            "notebook-2".to_string(),
            "user_1".to_string(),
            None,
            "elsewhere".to_string(),
        );
        let other_user = Note::new(
            "notebook-1".to_string(),
            "user_2".to_string(),
            None,
            "foreign".to_string(),
        );
        db.store_item(mine.clone()).await.expect("store");
        db.store_item(other_notebook).await.expect("store");
        db.store_item(other_user).await.expect("store");

        let listed = Note::list_for_notebook("notebook-1", "user_1", &db)
            .await
            .expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed.first().map(|n| n.id.clone()), Some(mine.id));
    }
}
