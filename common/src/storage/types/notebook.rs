use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};
use uuid::Uuid;

stored_object!(Notebook, "notebook", {
    name: String,
    description: Option<String>,
    archived: bool,
    user_id: String
});

impl Notebook {
    pub fn new(name: String, description: Option<String>, user_id: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            name,
            description,
            archived: false,
            user_id,
        }
    }

    /// Fetches a notebook the caller owns. Cross-owner reads surface NotFound
    /// so existence is not disclosed.
    pub async fn get_owned(
        id: &str,
        user_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        db.get_item::<Self>(id)
            .await?
            .filter(|notebook| notebook.user_id == user_id)
            .ok_or_else(|| AppError::NotFound("Notebook not found".into()))
    }

    pub async fn list_for_user(
        user_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let notebooks: Vec<Self> = db
            .client
            .query(
                "SELECT * FROM type::table($table)
                WHERE user_id = $user_id ORDER BY created_at DESC",
            )
            .bind(("table", Self::table_name()))
            .bind(("user_id", user_id.to_string()))
            .await?
            .take(0)?;

        Ok(notebooks)
    }

    /// Links a source into this notebook via the `contains` graph edge.
    pub async fn add_source(
        notebook_id: &str,
        source_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.relate(
            (Self::table_name(), notebook_id),
            "contains",
            ("source", source_id),
        )
        .await
    }

    /// Ids of the sources this notebook contains.
    pub async fn source_ids(
        notebook_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<String>, AppError> {
        let ids: Vec<String> = db
            .client
            .query(
                "SELECT VALUE record::id(out) FROM contains
                WHERE in = type::thing($table, $notebook_id)",
            )
            .bind(("table", Self::table_name()))
            .bind(("notebook_id", notebook_id.to_string()))
            .await?
            .take(0)?;

        Ok(ids)
    }
}
