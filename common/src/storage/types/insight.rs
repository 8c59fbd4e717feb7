use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(SourceInsight, "source_insight", {
    source_id: String,
    transformation_id: String,
    content: String,
    user_id: String
});

impl SourceInsight {
    pub fn new(
        source_id: String,
        transformation_id: String,
        content: String,
        user_id: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            source_id,
            transformation_id,
            content,
            user_id,
        }
    }

    /// Clears every insight of a source so a retry replaces rather than
    /// appends.
    pub async fn delete_by_source_id(
        source_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.client
            .query("DELETE type::table($table) WHERE source_id = $source_id")
            .bind(("table", Self::table_name()))
            .bind(("source_id", source_id.to_string()))
            .await?
            .check()?;

        Ok(())
    }

    pub async fn list_by_source(
        source_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let insights: Vec<Self> = db
            .client
            .query(
                "SELECT * FROM type::table($table)
                WHERE source_id = $source_id ORDER BY created_at ASC",
            )
            .bind(("table", Self::table_name()))
            .bind(("source_id", source_id.to_string()))
            .await?
            .take(0)?;

        Ok(insights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delete_by_source_id_is_scoped() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");
        db.apply_migrations().await.expect("migrations");

        let doomed = SourceInsight::new(
            "source-a".to_string(),
            "t-1".to_string(),
            "summary".to_string(),
            "user_1".to_string(),
        );
        let kept = SourceInsight::new(
            "source-b".to_string(),
            "t-1".to_string(),
            "other".to_string(),
            "user_1".to_string(),
        );
        db.store_item(doomed).await.expect("store");
        db.store_item(kept.clone()).await.expect("store");

        SourceInsight::delete_by_source_id("source-a", &db)
            .await
            .expect("delete");

        let remaining: Vec<SourceInsight> = db.get_all_stored_items().await.expect("all");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining.first().map(|i| i.id.clone()), Some(kept.id));
    }
}
