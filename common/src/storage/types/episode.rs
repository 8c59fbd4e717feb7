use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Scheme prefix marking a remote audio artifact in object storage.
pub const REMOTE_AUDIO_PREFIX: &str = "s3://";

/// Where an episode's audio lives; the serving layer branches on this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioLocation {
    /// Relative path under the podcasts root.
    Local(String),
    /// Object-storage key, `episodes/<user_id>/<episode_id>/<filename>`.
    Remote(String),
}

stored_object!(Episode, "episode", {
    title: String,
    user_id: String,
    notebook_id: Option<String>,
    episode_profile_id: String,
    audio_file: Option<String>
});

impl Episode {
    pub fn new(
        title: String,
        user_id: String,
        notebook_id: Option<String>,
        episode_profile_id: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            title,
            user_id,
            notebook_id,
            episode_profile_id,
            audio_file: None,
        }
    }

    /// Object-storage key convention for remote audio artifacts.
    pub fn object_key(user_id: &str, episode_id: &str, filename: &str) -> String {
        format!("episodes/{user_id}/{episode_id}/{filename}")
    }

    pub fn audio_location(&self) -> Option<AudioLocation> {
        self.audio_file.as_deref().map(|file| {
            match file.strip_prefix(REMOTE_AUDIO_PREFIX) {
                Some(key) => AudioLocation::Remote(key.to_string()),
                None => AudioLocation::Local(file.to_string()),
            }
        })
    }

    pub async fn get_owned(
        id: &str,
        user_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        db.get_item::<Self>(id)
            .await?
            .filter(|episode| episode.user_id == user_id)
            .ok_or_else(|| AppError::NotFound("Episode not found".into()))
    }
}
