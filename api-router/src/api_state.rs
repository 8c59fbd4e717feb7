use std::sync::Arc;

use chat_pipeline::ChatExecutor;
use command_queue::CommandQueue;
use common::{
    storage::{db::SurrealDbClient, uploads::UploadStore},
    utils::config::AppConfig,
    vault::SecretVault,
};

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub vault: Arc<SecretVault>,
    pub queue: Arc<CommandQueue>,
    pub chat: Arc<ChatExecutor>,
    pub uploads: UploadStore,
}

impl ApiState {
    pub fn new(
        config: AppConfig,
        db: Arc<SurrealDbClient>,
        vault: Arc<SecretVault>,
        queue: Arc<CommandQueue>,
        chat: Arc<ChatExecutor>,
    ) -> Self {
        let uploads = UploadStore::new(config.uploads_dir());

        Self {
            db,
            config,
            vault,
            queue,
            chat,
            uploads,
        }
    }
}
