use surrealdb::opt::PatchOp;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

/// What the source was created from. Inline text is carried here until the
/// pipeline persists it as `full_text`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceAsset {
    Upload { file_path: String },
    Link { url: String },
    Text { inline: String },
}

stored_object!(Source, "source", {
    title: String,
    user_id: String,
    asset: SourceAsset,
    full_text: Option<String>,
    content_length: Option<i64>,
    #[serde(default)]
    embedded_chunks: i64,
    status: SourceStatus,
    error_message: Option<String>,
    command_id: Option<String>
});

impl Source {
    pub fn new(title: String, asset: SourceAsset, user_id: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            title,
            user_id,
            asset,
            full_text: None,
            content_length: None,
            embedded_chunks: 0,
            status: SourceStatus::Queued,
            error_message: None,
            command_id: None,
        }
    }

    /// Fetches a source the caller owns. Cross-owner reads surface NotFound so
    /// existence is not disclosed.
    pub async fn get_owned(
        id: &str,
        user_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        db.get_item::<Self>(id)
            .await?
            .filter(|source| source.user_id == user_id)
            .ok_or_else(|| AppError::NotFound("Source not found".into()))
    }

    pub async fn list_for_user(
        user_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let sources: Vec<Self> = db
            .client
            .query(
                "SELECT * FROM type::table($table)
                WHERE user_id = $user_id ORDER BY created_at DESC",
            )
            .bind(("table", Self::table_name()))
            .bind(("user_id", user_id.to_string()))
            .await?
            .take(0)?;

        Ok(sources)
    }

    pub async fn set_status(
        id: &str,
        status: SourceStatus,
        error_message: Option<String>,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let id = crate::storage::db::normalize_record_key(Self::table_name(), id);
        let _source: Option<Self> = db
            .update((Self::table_name(), id))
            .patch(PatchOp::replace("/status", status))
            .patch(PatchOp::replace("/error_message", error_message))
            .patch(PatchOp::replace(
                "/updated_at",
                surrealdb::sql::Datetime::default(),
            ))
            .await?;

        Ok(())
    }

    pub async fn set_command(
        id: &str,
        command_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let id = crate::storage::db::normalize_record_key(Self::table_name(), id);
        let _source: Option<Self> = db
            .update((Self::table_name(), id))
            .patch(PatchOp::replace("/command_id", command_id.to_string()))
            .patch(PatchOp::replace(
                "/updated_at",
                surrealdb::sql::Datetime::default(),
            ))
            .await?;

        Ok(())
    }

    /// Persists the extracted full text and its length.
    pub async fn update_content(
        id: &str,
        full_text: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let id = crate::storage::db::normalize_record_key(Self::table_name(), id);
        let _source: Option<Self> = db
            .update((Self::table_name(), id))
            .patch(PatchOp::replace("/full_text", full_text.to_string()))
            .patch(PatchOp::replace(
                "/content_length",
                full_text.len() as i64,
            ))
            .patch(PatchOp::replace(
                "/updated_at",
                surrealdb::sql::Datetime::default(),
            ))
            .await?;

        Ok(())
    }

    /// Re-establishes the embedded-chunk count after (re)writing chunks.
    pub async fn set_embedded_chunks(
        id: &str,
        count: i64,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let id = crate::storage::db::normalize_record_key(Self::table_name(), id);
        let _source: Option<Self> = db
            .update((Self::table_name(), id))
            .patch(PatchOp::replace("/embedded_chunks", count))
            .patch(PatchOp::replace(
                "/updated_at",
                surrealdb::sql::Datetime::default(),
            ))
            .await?;

        Ok(())
    }

    /// Deletes the source together with its chunks and insights.
    pub async fn delete_cascade(
        id: &str,
        user_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let source = Self::get_owned(id, user_id, db).await?;

        db.client
            .query("DELETE source_chunk WHERE source_id = $source_id")
            .query("DELETE source_insight WHERE source_id = $source_id")
            .query("DELETE contains WHERE out = type::thing('source', $source_id)")
            .bind(("source_id", source.id.clone()))
            .await?
            .check()?;

        db.delete_item::<Self>(&source.id).await?;
        Ok(())
    }
}
