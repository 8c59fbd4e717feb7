use uuid::Uuid;

use crate::stored_object;

stored_object!(SpeakerProfile, "speaker_profile", {
    name: String,
    user_id: String,
    voice_id: String,
    backstory: Option<String>
});

impl SpeakerProfile {
    pub fn new(name: String, user_id: String, voice_id: String, backstory: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            name,
            user_id,
            voice_id,
            backstory,
        }
    }
}
