use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart};
use chrono::{DateTime, Utc};
use common::{
    error::AppError,
    storage::{
        db::{normalize_record_key, qualified_id},
        types::{
            command::Command,
            notebook::Notebook,
            source::{Source, SourceAsset, SourceStatus},
            transformation::Transformation,
            user::User,
        },
    },
};
use ingestion_pipeline::{ProcessSourceInput, NAMESPACE, PROCESS_SOURCE};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::info;

use crate::{api_state::ApiState, error::ApiError};

/// Budget for a synchronous (`async_processing=false`) ingestion run.
const SYNC_PROCESSING_TIMEOUT: Duration = Duration::from_secs(300);

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CreateSourceRequest {
    Link {
        url: String,
        title: Option<String>,
        #[serde(default)]
        notebook_ids: Vec<String>,
        #[serde(default)]
        transformations: Vec<String>,
        #[serde(default)]
        embed: bool,
        #[serde(default = "default_true")]
        async_processing: bool,
    },
    Text {
        content: String,
        title: Option<String>,
        #[serde(default)]
        notebook_ids: Vec<String>,
        #[serde(default)]
        transformations: Vec<String>,
        #[serde(default)]
        embed: bool,
        #[serde(default = "default_true")]
        async_processing: bool,
    },
}

#[derive(Debug, TryFromMultipart)]
pub struct UploadSourceRequest {
    pub title: Option<String>,
    #[form_data(default)]
    pub notebook_ids: Vec<String>,
    #[form_data(default)]
    pub transformations: Vec<String>,
    #[form_data(default)]
    pub embed: bool,
    pub async_processing: Option<bool>,
    #[form_data(default)]
    pub delete_source: bool,
    #[form_data(limit = "50MiB")]
    pub file: FieldData<NamedTempFile>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RetryRequest {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct SourceView {
    pub id: String,
    pub title: String,
    pub status: SourceStatus,
    pub owner: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<i64>,
    pub embedded_chunks: i64,
}

impl From<Source> for SourceView {
    fn from(source: Source) -> Self {
        Self {
            id: qualified_id("source", &source.id),
            title: source.title,
            status: source.status,
            owner: qualified_id("user", &source.user_id),
            created: source.created_at,
            updated: source.updated_at,
            error_message: source.error_message,
            full_text: source.full_text,
            content_length: source.content_length,
            embedded_chunks: source.embedded_chunks,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateSourceResponse {
    pub source: SourceView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_id: Option<String>,
}

struct IngestRequest {
    source: Source,
    input: ProcessSourceInput,
    async_processing: bool,
}

pub async fn create_source(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateSourceRequest>,
) -> Result<(StatusCode, Json<CreateSourceResponse>), ApiError> {
    let ingest = match request {
        CreateSourceRequest::Link {
            url,
            title,
            notebook_ids,
            transformations,
            embed,
            async_processing,
        } => {
            if url.trim().is_empty() {
                return Err(ApiError::ValidationError("url must not be empty".into()));
            }
            let title = title.unwrap_or_else(|| url.clone());
            build_ingest_request(
                &state,
                &user,
                Source::new(title, SourceAsset::Link { url }, user.id.clone()),
                notebook_ids,
                transformations,
                embed,
                async_processing,
                false,
            )
            .await?
        }
        CreateSourceRequest::Text {
            content,
            title,
            notebook_ids,
            transformations,
            embed,
            async_processing,
        } => {
            if content.is_empty() {
                return Err(ApiError::ValidationError(
                    "content must not be empty".into(),
                ));
            }
            let title = title.unwrap_or_else(|| "Untitled text".to_string());
            build_ingest_request(
                &state,
                &user,
                Source::new(title, SourceAsset::Text { inline: content }, user.id.clone()),
                notebook_ids,
                transformations,
                embed,
                async_processing,
                false,
            )
            .await?
        }
    };

    dispatch_ingest(&state, ingest).await
}

pub async fn upload_source(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    TypedMultipart(request): TypedMultipart<UploadSourceRequest>,
) -> Result<(StatusCode, Json<CreateSourceResponse>), ApiError> {
    let file_name = request
        .file
        .metadata
        .file_name
        .clone()
        .ok_or_else(|| ApiError::ValidationError("file name missing in upload".into()))?;

    let saved_path = state
        .uploads
        .save_temp_file(&request.file.contents, &file_name)?;
    info!(path = %saved_path.display(), "stored uploaded source file");

    let title = request.title.unwrap_or(file_name);
    let source = Source::new(
        title,
        SourceAsset::Upload {
            file_path: saved_path.display().to_string(),
        },
        user.id.clone(),
    );

    let ingest = build_ingest_request(
        &state,
        &user,
        source,
        request.notebook_ids,
        request.transformations,
        request.embed,
        request.async_processing.unwrap_or(true),
        request.delete_source,
    )
    .await?;

    dispatch_ingest(&state, ingest).await
}

/// Validates referenced notebooks/transformations up front and persists the
/// queued source record.
#[allow(clippy::too_many_arguments)]
async fn build_ingest_request(
    state: &ApiState,
    user: &User,
    source: Source,
    notebook_ids: Vec<String>,
    transformation_ids: Vec<String>,
    embed: bool,
    async_processing: bool,
    delete_source: bool,
) -> Result<IngestRequest, ApiError> {
    let notebook_ids: Vec<String> = notebook_ids
        .iter()
        .map(|id| normalize_record_key("notebook", id).to_string())
        .collect();
    for notebook_id in &notebook_ids {
        Notebook::get_owned(notebook_id, &user.id, &state.db).await?;
    }

    let transformation_ids: Vec<String> = transformation_ids
        .iter()
        .map(|id| normalize_record_key("transformation", id).to_string())
        .collect();
    for transformation_id in &transformation_ids {
        Transformation::get_accessible(transformation_id, &user.id, &state.db).await?;
    }

    let stored = state
        .db
        .store_item(source)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| ApiError::InternalError("Failed to persist source".into()))?;

    let input = ProcessSourceInput {
        source_id: stored.id.clone(),
        user_id: user.id.clone(),
        notebook_ids,
        transformation_ids,
        embed,
        delete_source,
    };

    Ok(IngestRequest {
        source: stored,
        input,
        async_processing,
    })
}

/// Enqueues or runs the processing command and shapes the response.
async fn dispatch_ingest(
    state: &ApiState,
    ingest: IngestRequest,
) -> Result<(StatusCode, Json<CreateSourceResponse>), ApiError> {
    let input_value = serde_json::to_value(&ingest.input)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    if ingest.async_processing {
        let command_id = state
            .queue
            .submit(NAMESPACE, PROCESS_SOURCE, input_value)
            .await?;
        Source::set_command(&ingest.source.id, &command_id, &state.db).await?;

        let source = Source::get_owned(&ingest.source.id, &ingest.input.user_id, &state.db)
            .await?;
        return Ok((
            StatusCode::CREATED,
            Json(CreateSourceResponse {
                source: source.into(),
                command_id: Some(qualified_id("command", &command_id)),
            }),
        ));
    }

    state
        .queue
        .execute_sync(
            NAMESPACE,
            PROCESS_SOURCE,
            input_value,
            SYNC_PROCESSING_TIMEOUT,
        )
        .await?;

    let source = Source::get_owned(&ingest.source.id, &ingest.input.user_id, &state.db).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateSourceResponse {
            source: source.into(),
            command_id: None,
        }),
    ))
}

pub async fn list_sources(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<SourceView>>, ApiError> {
    let sources = Source::list_for_user(&user.id, &state.db).await?;
    Ok(Json(sources.into_iter().map(SourceView::from).collect()))
}

pub async fn get_source(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Result<Json<SourceView>, ApiError> {
    let source = Source::get_owned(&id, &user.id, &state.db).await?;
    Ok(Json(source.into()))
}

pub async fn delete_source(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    Source::delete_cascade(&id, &user.id, &state.db).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Re-runs the idempotent pipeline on an existing source with a fresh
/// command. A source that completed successfully needs `force:true`; a source
/// with a queued or running command is rejected until it settles.
pub async fn retry_source(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    request: Option<Json<RetryRequest>>,
) -> Result<(StatusCode, Json<CreateSourceResponse>), ApiError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let source = Source::get_owned(&id, &user.id, &state.db).await?;

    if source.status == SourceStatus::Completed && !request.force {
        return Err(ApiError::ValidationError(
            "retry of a completed source requires force".into(),
        ));
    }

    if Command::active_count_for_source(&source.id, &state.db).await? > 0 {
        return Err(ApiError::Conflict(
            "source is already being processed".into(),
        ));
    }

    let input = match &source.command_id {
        Some(command_id) => {
            let previous: Option<Command> = state
                .db
                .get_item(command_id)
                .await
                .map_err(AppError::Database)?;
            match previous {
                Some(command) => serde_json::from_value::<ProcessSourceInput>(command.input)
                    .map_err(|e| {
                        ApiError::InternalError(format!("stored command input unreadable: {e}"))
                    })?,
                None => fallback_input(&source),
            }
        }
        None => fallback_input(&source),
    };

    Source::set_status(&source.id, SourceStatus::Queued, None, &state.db).await?;

    let input_value =
        serde_json::to_value(&input).map_err(|e| ApiError::InternalError(e.to_string()))?;
    let command_id = state
        .queue
        .submit(NAMESPACE, PROCESS_SOURCE, input_value)
        .await?;
    Source::set_command(&source.id, &command_id, &state.db).await?;

    let source = Source::get_owned(&source.id, &user.id, &state.db).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(CreateSourceResponse {
            source: source.into(),
            command_id: Some(qualified_id("command", &command_id)),
        }),
    ))
}

/// Minimal re-run input for sources whose original command is gone.
fn fallback_input(source: &Source) -> ProcessSourceInput {
    ProcessSourceInput {
        source_id: source.id.clone(),
        user_id: source.user_id.clone(),
        notebook_ids: Vec::new(),
        transformation_ids: Vec::new(),
        embed: source.embedded_chunks > 0,
        delete_source: false,
    }
}
