use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Placeholder in a prompt template that the source full text replaces.
pub const CONTENT_PLACEHOLDER: &str = "{content}";

stored_object!(Transformation, "transformation", {
    name: String,
    prompt_template: String,
    user_id: Option<String>
});

impl Transformation {
    /// `user_id = None` marks a system-scoped transformation visible to all
    /// users.
    pub fn new(name: String, prompt_template: String, user_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            name,
            prompt_template,
            user_id,
        }
    }

    /// Fetches a transformation the caller may use: system-scoped or owned.
    pub async fn get_accessible(
        id: &str,
        user_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        db.get_item::<Self>(id)
            .await?
            .filter(|t| t.user_id.is_none() || t.user_id.as_deref() == Some(user_id))
            .ok_or_else(|| AppError::NotFound("Transformation not found".into()))
    }

    pub async fn list_accessible(
        user_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let transformations: Vec<Self> = db
            .client
            .query(
                "SELECT * FROM type::table($table)
                WHERE user_id = NONE OR user_id = $user_id
                ORDER BY name ASC",
            )
            .bind(("table", Self::table_name()))
            .bind(("user_id", user_id.to_string()))
            .await?
            .take(0)?;

        Ok(transformations)
    }

    /// Substitutes the source text into the template. A template without the
    /// placeholder gets the text appended after a blank line.
    pub fn render(&self, full_text: &str) -> String {
        if self.prompt_template.contains(CONTENT_PLACEHOLDER) {
            self.prompt_template.replace(CONTENT_PLACEHOLDER, full_text)
        } else {
            format!("{}\n\n{full_text}", self.prompt_template)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_substitutes_placeholder() {
        let t = Transformation::new(
            "Summarize".to_string(),
            "Summarize the following:\n{content}".to_string(),
            None,
        );
        assert_eq!(
            t.render("Hello world."),
            "Summarize the following:\nHello world."
        );
    }

    #[test]
    fn render_appends_when_placeholder_missing() {
        let t = Transformation::new(
            "Keywords".to_string(),
            "List keywords.".to_string(),
            None,
        );
        assert_eq!(t.render("Body"), "List keywords.\n\nBody");
    }

    #[tokio::test]
    async fn accessible_covers_system_and_owned() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");
        db.apply_migrations().await.expect("migrations");

        let system = Transformation::new("System".to_string(), "{content}".to_string(), None);
        let owned = Transformation::new(
            "Owned".to_string(),
            "{content}".to_string(),
            Some("user_1".to_string()),
        );
        let foreign = Transformation::new(
            "Foreign".to_string(),
            "{content}".to_string(),
            Some("user_2".to_string()),
        );
        db.store_item(system.clone()).await.expect("store");
        db.store_item(owned.clone()).await.expect("store");
        db.store_item(foreign.clone()).await.expect("store");

        assert!(Transformation::get_accessible(&system.id, "user_1", &db)
            .await
            .is_ok());
        assert!(Transformation::get_accessible(&owned.id, "user_1", &db)
            .await
            .is_ok());
        assert!(matches!(
            Transformation::get_accessible(&foreign.id, "user_1", &db).await,
            Err(AppError::NotFound(_))
        ));

        let listed = Transformation::list_accessible("user_1", &db)
            .await
            .expect("list");
        let names: Vec<&str> = listed.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Owned", "System"]);
    }
}
