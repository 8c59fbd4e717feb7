use std::collections::HashMap;

use async_openai::config::OpenAIConfig;
use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    storage::{db::SurrealDbClient, types::provider_secret::UserProviderSecret},
    vault::SecretVault,
};

/// Closed set of AI providers a user can store credentials for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Openai,
    Anthropic,
    Gemini,
    Google,
    Vertex,
    Mistral,
    Deepseek,
    Xai,
    Groq,
    Voyage,
    Elevenlabs,
    Cohere,
    Openrouter,
}

impl Provider {
    pub const ALL: &'static [Provider] = &[
        Provider::Openai,
        Provider::Anthropic,
        Provider::Gemini,
        Provider::Google,
        Provider::Vertex,
        Provider::Mistral,
        Provider::Deepseek,
        Provider::Xai,
        Provider::Groq,
        Provider::Voyage,
        Provider::Elevenlabs,
        Provider::Cohere,
        Provider::Openrouter,
    ];

    /// Canonical environment variable each provider's client library reads.
    /// Gemini, Google and Vertex are aliases for the same variable.
    pub fn env_var(self) -> &'static str {
        match self {
            Provider::Openai => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::Gemini | Provider::Google | Provider::Vertex => "GOOGLE_API_KEY",
            Provider::Mistral => "MISTRAL_API_KEY",
            Provider::Deepseek => "DEEPSEEK_API_KEY",
            Provider::Xai => "XAI_API_KEY",
            Provider::Groq => "GROQ_API_KEY",
            Provider::Voyage => "VOYAGE_API_KEY",
            Provider::Elevenlabs => "ELEVENLABS_API_KEY",
            Provider::Cohere => "COHERE_API_KEY",
            Provider::Openrouter => "OPENROUTER_API_KEY",
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Provider::Openai => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Gemini => "gemini",
            Provider::Google => "google",
            Provider::Vertex => "vertex",
            Provider::Mistral => "mistral",
            Provider::Deepseek => "deepseek",
            Provider::Xai => "xai",
            Provider::Groq => "groq",
            Provider::Voyage => "voyage",
            Provider::Elevenlabs => "elevenlabs",
            Provider::Cohere => "cohere",
            Provider::Openrouter => "openrouter",
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = AppError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .iter()
            .copied()
            .find(|provider| provider.tag() == input.to_ascii_lowercase())
            .ok_or_else(|| AppError::Validation(format!("unknown provider: {input}")))
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Request-local view of one caller's decrypted provider credentials.
///
/// The process environment is never mutated: keys are injected directly into
/// per-request provider clients, and the environment is only consulted
/// read-only as a fallback when the user has no stored secret for a provider.
/// The plaintext map lives for exactly one logical request; nothing is cached
/// across requests.
pub struct CredentialContext {
    user_id: Option<String>,
    keys: HashMap<Provider, String>,
}

impl CredentialContext {
    /// Loads and decrypts every stored secret for the user. Any decryption
    /// failure aborts the whole request before its body runs.
    pub async fn for_user(
        db: &SurrealDbClient,
        vault: &SecretVault,
        user_id: &str,
    ) -> Result<Self, AppError> {
        let secrets = UserProviderSecret::list_for_user(user_id, db).await?;

        let mut keys = HashMap::with_capacity(secrets.len());
        for secret in secrets {
            let plain = vault.decrypt(&secret.encrypted_value)?;
            keys.insert(secret.provider, plain);
        }

        Ok(Self {
            user_id: Some(user_id.to_string()),
            keys,
        })
    }

    pub fn empty() -> Self {
        Self {
            user_id: None,
            keys: HashMap::new(),
        }
    }

    /// The caller this context was materialized for, when there is one.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn from_keys(keys: HashMap<Provider, String>) -> Self {
        Self {
            user_id: None,
            keys,
        }
    }

    /// The caller's key for a provider: the stored secret when present,
    /// otherwise the process environment variable from the canonical mapping.
    pub fn api_key(&self, provider: Provider) -> Option<String> {
        self.keys
            .get(&provider)
            .cloned()
            .or_else(|| std::env::var(provider.env_var()).ok())
    }

    pub fn openai_config(&self, base_url: &str) -> Result<OpenAIConfig, AppError> {
        let key = self.api_key(Provider::Openai).ok_or_else(|| {
            AppError::InvalidCredential("no openai credential configured".to_string())
        })?;

        Ok(OpenAIConfig::new()
            .with_api_key(key)
            .with_api_base(base_url))
    }

    pub fn openai_client(
        &self,
        base_url: &str,
    ) -> Result<async_openai::Client<OpenAIConfig>, AppError> {
        Ok(async_openai::Client::with_config(
            self.openai_config(base_url)?,
        ))
    }
}
