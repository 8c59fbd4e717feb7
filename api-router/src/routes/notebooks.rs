use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use common::{
    error::AppError,
    storage::{db::qualified_id, types::{notebook::Notebook, user::User}},
};
use serde::{Deserialize, Serialize};

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct CreateNotebookRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NotebookView {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub archived: bool,
    pub owner: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl From<Notebook> for NotebookView {
    fn from(notebook: Notebook) -> Self {
        Self {
            id: qualified_id("notebook", &notebook.id),
            name: notebook.name,
            description: notebook.description,
            archived: notebook.archived,
            owner: qualified_id("user", &notebook.user_id),
            created: notebook.created_at,
            updated: notebook.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NotebookDetail {
    #[serde(flatten)]
    pub notebook: NotebookView,
    pub source_ids: Vec<String>,
}

pub async fn create_notebook(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateNotebookRequest>,
) -> Result<(StatusCode, Json<NotebookView>), ApiError> {
    if request.name.trim().is_empty() {
        return Err(ApiError::ValidationError("name must not be empty".into()));
    }

    let notebook = Notebook::new(request.name, request.description, user.id.clone());
    let stored = state
        .db
        .store_item(notebook)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| ApiError::InternalError("Failed to persist notebook".into()))?;

    Ok((StatusCode::CREATED, Json(stored.into())))
}

pub async fn list_notebooks(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<NotebookView>>, ApiError> {
    let notebooks = Notebook::list_for_user(&user.id, &state.db).await?;
    Ok(Json(notebooks.into_iter().map(NotebookView::from).collect()))
}

pub async fn get_notebook(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Result<Json<NotebookDetail>, ApiError> {
    let notebook = Notebook::get_owned(&id, &user.id, &state.db).await?;
    let source_ids = Notebook::source_ids(&notebook.id, &state.db)
        .await?
        .into_iter()
        .map(|id| qualified_id("source", &id))
        .collect();

    Ok(Json(NotebookDetail {
        notebook: notebook.into(),
        source_ids,
    }))
}
