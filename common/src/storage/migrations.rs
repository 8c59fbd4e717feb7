/// Ordered migration scripts. The position in this list plus one is the
/// migration version recorded in `migration_version:current`; append-only.
pub const MIGRATIONS: &[&str] = &[
    // v1: base tables and lookup indexes
    "DEFINE TABLE user SCHEMALESS;
     DEFINE INDEX unique_email ON TABLE user FIELDS email UNIQUE;
     DEFINE TABLE user_provider_secret SCHEMALESS;
     DEFINE INDEX unique_user_provider ON TABLE user_provider_secret FIELDS user_id, provider UNIQUE;
     DEFINE TABLE notebook SCHEMALESS;
     DEFINE INDEX idx_notebook_user ON TABLE notebook FIELDS user_id;
     DEFINE TABLE source SCHEMALESS;
     DEFINE INDEX idx_source_user ON TABLE source FIELDS user_id;
     DEFINE INDEX idx_source_status ON TABLE source FIELDS status;
     DEFINE TABLE source_chunk SCHEMALESS;
     DEFINE INDEX idx_chunk_source ON TABLE source_chunk FIELDS source_id;
     DEFINE TABLE source_insight SCHEMALESS;
     DEFINE INDEX idx_insight_source ON TABLE source_insight FIELDS source_id;
     DEFINE TABLE transformation SCHEMALESS;
     DEFINE TABLE chat_session SCHEMALESS;
     DEFINE INDEX idx_chat_session_user ON TABLE chat_session FIELDS user_id;
     DEFINE TABLE chat_message SCHEMALESS;
     DEFINE INDEX idx_chat_message_session ON TABLE chat_message FIELDS session_id;
     DEFINE TABLE note SCHEMALESS;
     DEFINE INDEX idx_note_notebook ON TABLE note FIELDS notebook_id;
     DEFINE TABLE model_config SCHEMALESS;
     DEFINE TABLE episode SCHEMALESS;
     DEFINE INDEX idx_episode_user ON TABLE episode FIELDS user_id;
     DEFINE TABLE episode_profile SCHEMALESS;
     DEFINE TABLE speaker_profile SCHEMALESS;
     DEFINE TABLE migration_version SCHEMALESS;",
    // v2: command queue table and claim-ordering indexes
    "DEFINE TABLE command SCHEMALESS;
     DEFINE INDEX idx_command_status ON TABLE command FIELDS status;
     DEFINE INDEX idx_command_created ON TABLE command FIELDS created_at;",
];
