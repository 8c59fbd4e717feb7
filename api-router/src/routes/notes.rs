use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use common::{
    error::AppError,
    storage::{
        db::{normalize_record_key, qualified_id},
        types::{note::Note, notebook::Notebook, user::User},
    },
};
use serde::{Deserialize, Serialize};

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct CreateNoteRequest {
    pub notebook_id: String,
    pub title: Option<String>,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct NoteView {
    pub id: String,
    pub notebook_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub content: String,
    pub owner: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl From<Note> for NoteView {
    fn from(note: Note) -> Self {
        Self {
            id: qualified_id("note", &note.id),
            notebook_id: qualified_id("notebook", &note.notebook_id),
            title: note.title,
            content: note.content,
            owner: qualified_id("user", &note.user_id),
            created: note.created_at,
            updated: note.updated_at,
        }
    }
}

pub async fn create_note(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateNoteRequest>,
) -> Result<(StatusCode, Json<NoteView>), ApiError> {
    if request.content.is_empty() {
        return Err(ApiError::ValidationError(
            "content must not be empty".into(),
        ));
    }

    let notebook_id = normalize_record_key("notebook", &request.notebook_id).to_string();
    Notebook::get_owned(&notebook_id, &user.id, &state.db).await?;

    let note = Note::new(notebook_id, user.id.clone(), request.title, request.content);
    let stored = state
        .db
        .store_item(note)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| ApiError::InternalError("Failed to persist note".into()))?;

    Ok((StatusCode::CREATED, Json(stored.into())))
}

pub async fn get_note(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Result<Json<NoteView>, ApiError> {
    let note = Note::get_owned(&id, &user.id, &state.db).await?;
    Ok(Json(note.into()))
}

pub async fn delete_note(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let note = Note::get_owned(&id, &user.id, &state.db).await?;
    state
        .db
        .delete_item::<Note>(&note.id)
        .await
        .map_err(AppError::Database)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_notebook_notes(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    Path(notebook_id): Path<String>,
) -> Result<Json<Vec<NoteView>>, ApiError> {
    let notebook = Notebook::get_owned(&notebook_id, &user.id, &state.db).await?;
    let notes = Note::list_for_notebook(&notebook.id, &user.id, &state.db).await?;
    Ok(Json(notes.into_iter().map(NoteView::from).collect()))
}
