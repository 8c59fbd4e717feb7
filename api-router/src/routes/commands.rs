use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use common::{
    error::AppError,
    storage::{
        db::qualified_id,
        types::{
            command::{Command, CommandStatus},
            user::User,
        },
    },
};
use serde::Serialize;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Serialize)]
pub struct CommandView {
    pub id: String,
    pub namespace: String,
    pub name: String,
    pub status: CommandStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl From<Command> for CommandView {
    fn from(command: Command) -> Self {
        Self {
            id: qualified_id("command", &command.id),
            namespace: command.namespace,
            name: command.name,
            status: command.status,
            attempts: command.attempts,
            error_message: command.error_message,
            result: command.result,
            created: command.created_at,
            updated: command.updated_at,
        }
    }
}

/// Loads a command the caller may see: the submitting user, or an admin.
async fn get_visible_command(
    state: &ApiState,
    user: &User,
    id: &str,
) -> Result<Command, ApiError> {
    let command: Option<Command> = state.db.get_item(id).await.map_err(AppError::Database)?;

    command
        .filter(|command| user.is_admin || command.user_id() == Some(user.id.as_str()))
        .ok_or_else(|| ApiError::NotFound("Command not found".into()))
}

pub async fn get_command(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Result<Json<CommandView>, ApiError> {
    let command = get_visible_command(&state, &user, &id).await?;
    Ok(Json(command.into()))
}

/// Cancels a queued command; running commands are not preemptively
/// interruptible and yield 409.
pub async fn cancel_command(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<CommandView>), ApiError> {
    let command = get_visible_command(&state, &user, &id).await?;

    if !Command::cancel(&command.id, &state.db).await? {
        return Err(ApiError::Conflict(
            "only queued commands can be cancelled".into(),
        ));
    }

    let cancelled = get_visible_command(&state, &user, &command.id).await?;
    Ok((StatusCode::OK, Json(cancelled.into())))
}
