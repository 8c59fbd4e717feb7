use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension,
};
use common::storage::{db::normalize_record_key, types::user::User};
use tracing::info;

use crate::{api_state::ApiState, error::ApiError};

/// Clears every record a user owns: notebooks, sources, chunks, insights,
/// chat sessions with messages, episodes and provider secrets, in that
/// order. Admin-only; the target account itself survives.
pub async fn wipe_user_data(
    State(state): State<ApiState>,
    Extension(caller): Extension<User>,
    Path(user_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !caller.is_admin {
        return Err(ApiError::Forbidden(
            "only admins can wipe user data".into(),
        ));
    }

    let target_id = normalize_record_key("user", &user_id).to_string();
    let target: Option<User> = state
        .db
        .get_item(&target_id)
        .await
        .map_err(common::error::AppError::Database)?;
    let target = target.ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    User::wipe_owned_data(&target.id, &state.db).await?;
    info!(admin = %caller.id, target = %target.id, "wiped user data");

    Ok(StatusCode::NO_CONTENT)
}
