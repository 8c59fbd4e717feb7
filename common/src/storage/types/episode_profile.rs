use uuid::Uuid;

use crate::stored_object;

stored_object!(EpisodeProfile, "episode_profile", {
    name: String,
    user_id: String,
    speaker_profile_ids: Vec<String>,
    outline_prompt: Option<String>
});

impl EpisodeProfile {
    pub fn new(
        name: String,
        user_id: String,
        speaker_profile_ids: Vec<String>,
        outline_prompt: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            name,
            user_id,
            speaker_profile_ids,
            outline_prompt,
        }
    }
}
