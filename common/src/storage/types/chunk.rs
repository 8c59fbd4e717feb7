use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(SourceChunk, "source_chunk", {
    source_id: String,
    #[serde(rename = "chunk_index")]
    index: i64,
    content: String,
    embedding: Option<Vec<f32>>,
    user_id: String
});

impl SourceChunk {
    pub fn new(
        source_id: String,
        index: i64,
        content: String,
        embedding: Option<Vec<f32>>,
        user_id: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            source_id,
            index,
            content,
            embedding,
            user_id,
        }
    }

    /// Clears every chunk of a source. Runs before a (re)write so a retry
    /// replaces rather than appends.
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
        let chunks: Vec<Self> = db
            .client
            .query(
                "SELECT * FROM type::table($table)
                WHERE source_id = $source_id ORDER BY chunk_index ASC",
            )
            .bind(("table", Self::table_name()))
            .bind(("source_id", source_id.to_string()))
            .await?
            .take(0)?;

        Ok(chunks)
    }

    /// Count of persisted chunks whose embedding is present; the value
    /// `Source.embedded_chunks` must mirror.
    pub async fn count_embedded(source_id: &str, db: &SurrealDbClient) -> Result<i64, AppError> {
        #[derive(Deserialize)]
        struct CountRow {
            count: i64,
        }

        let row: Option<CountRow> = db
            .client
            .query(
                "SELECT count() as count FROM type::table($table)
                WHERE source_id = $source_id AND embedding != NONE GROUP ALL",
            )
            .bind(("table", Self::table_name()))
            .bind(("source_id", source_id.to_string()))
            .await?
            .take(0)?;

        Ok(row.map(|r| r.count).unwrap_or(0))
    }
}
