use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use common::{
    credentials::Provider,
    error::AppError,
    storage::types::{
        provider_secret::{SecretMetadata, UserProviderSecret},
        user::User,
    },
};
use serde::{Deserialize, Serialize};

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct CreateSecretRequest {
    pub provider: String,
    pub value: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RevealedSecret {
    pub provider: Provider,
    pub value: String,
}

/// Stores (or replaces) one provider credential, encrypted at rest. The
/// plaintext is never persisted or echoed back.
pub async fn create_secret(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateSecretRequest>,
) -> Result<(StatusCode, Json<SecretMetadata>), ApiError> {
    let provider: Provider = request.provider.parse()?;

    if request.value.trim().is_empty() {
        return Err(ApiError::ValidationError(
            "secret value must not be empty".into(),
        ));
    }

    let encrypted = state
        .vault
        .encrypt(&request.value)
        .map_err(AppError::from)?;

    let secret = UserProviderSecret::new(
        user.id.clone(),
        provider,
        encrypted,
        request.display_name,
    )
    .upsert(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(secret.into())))
}

/// Lists secret metadata only; plaintext is available solely via reveal.
pub async fn list_secrets(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<SecretMetadata>>, ApiError> {
    let metadata = UserProviderSecret::list_metadata_for_user(&user.id, &state.db).await?;
    Ok(Json(metadata))
}

pub async fn reveal_secret(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    Path(provider): Path<String>,
) -> Result<Json<RevealedSecret>, ApiError> {
    let provider: Provider = provider.parse()?;

    let secret = UserProviderSecret::get_by_provider(&user.id, provider, &state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound("No secret stored for provider".into()))?;

    let value = state
        .vault
        .decrypt(&secret.encrypted_value)
        .map_err(AppError::from)?;

    Ok(Json(RevealedSecret { provider, value }))
}

pub async fn delete_secret(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    Path(provider): Path<String>,
) -> Result<StatusCode, ApiError> {
    let provider: Provider = provider.parse()?;
    UserProviderSecret::delete_by_provider(&user.id, provider, &state.db).await?;
    Ok(StatusCode::NO_CONTENT)
}
