use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    /// Full store endpoint; wins over address/port when set.
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_database_address")]
    pub database_address: String,
    #[serde(default = "default_database_port")]
    pub database_port: u16,
    #[serde(default = "default_database_user")]
    pub database_user: String,
    #[serde(default = "default_database_password")]
    pub database_password: String,
    #[serde(default = "default_database_namespace")]
    pub database_namespace: String,
    #[serde(default = "default_database_database")]
    pub database_database: String,

    /// Base64 symmetric key for the secret vault.
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Path to a file holding the base64 symmetric key.
    #[serde(default)]
    pub secret_key_file: Option<String>,

    #[serde(default = "default_data_path")]
    pub data_path: String,
    /// "false" disables the in-process worker loop; any other value enables it.
    #[serde(default = "default_enable_worker")]
    pub enable_worker: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: String,

    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: u32,
    /// Character budget for assembled chat context; older history is dropped
    /// first when the budget is exceeded.
    #[serde(default = "default_chat_context_budget")]
    pub chat_context_budget_chars: usize,
}

fn default_database_address() -> String {
    "127.0.0.1".to_string()
}

fn default_database_port() -> u16 {
    8000
}

fn default_database_user() -> String {
    "root".to_string()
}

fn default_database_password() -> String {
    "root".to_string()
}

fn default_database_namespace() -> String {
    "open_notebook".to_string()
}

fn default_database_database() -> String {
    "production".to_string()
}

fn default_data_path() -> String {
    "./data".to_string()
}

fn default_enable_worker() -> String {
    "true".to_string()
}

fn default_http_port() -> u16 {
    5055
}

fn default_allowed_origins() -> String {
    "*".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dimensions() -> u32 {
    1536
}

fn default_chat_context_budget() -> usize {
    24_000
}

impl AppConfig {
    /// Resolves the store endpoint. A full `database_url` wins; otherwise the
    /// endpoint is assembled as `ws://{address}:{port}` in that order.
    pub fn database_endpoint(&self) -> String {
        match &self.database_url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => format!("ws://{}:{}", self.database_address, self.database_port),
        }
    }

    pub fn worker_enabled(&self) -> bool {
        self.enable_worker != "false"
    }

    pub fn uploads_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_path).join("uploads")
    }

    pub fn podcasts_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_path).join("podcasts")
    }

    pub fn secrets_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_path).join(".secrets")
    }

    pub fn allowed_origins_list(&self) -> Vec<String> {
        self.allowed_origins
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect()
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

#[cfg(any(test, feature = "test-utils"))]
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            database_address: default_database_address(),
            database_port: default_database_port(),
            database_user: default_database_user(),
            database_password: default_database_password(),
            database_namespace: default_database_namespace(),
            database_database: default_database_database(),
            secret_key: None,
            secret_key_file: None,
            data_path: default_data_path(),
            enable_worker: default_enable_worker(),
            http_port: default_http_port(),
            allowed_origins: default_allowed_origins(),
            openai_base_url: default_openai_base_url(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: default_embedding_dimensions(),
            chat_context_budget_chars: default_chat_context_budget(),
        }
    }
}
