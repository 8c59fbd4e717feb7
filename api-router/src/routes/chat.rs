use std::{convert::Infallible, time::Duration};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Extension, Json,
};
use chat_pipeline::ChatRequest;
use chrono::{DateTime, Utc};
use common::storage::{
    db::{normalize_record_key, qualified_id},
    types::{
        chat_session::ChatSession,
        message::{ChatMessage, ChatRole},
        notebook::Notebook,
        user::User,
    },
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub notebook_id: String,
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: String,
    pub notebook_id: String,
    pub title: String,
    pub owner: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl From<ChatSession> for SessionView {
    fn from(session: ChatSession) -> Self {
        Self {
            id: qualified_id("chat_session", &session.id),
            notebook_id: qualified_id("notebook", &session.notebook_id),
            title: session.title,
            owner: qualified_id("user", &session.user_id),
            created: session.created_at,
            updated: session.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageView {
    pub role: ChatRole,
    pub content: String,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: SessionView,
    pub messages: Vec<MessageView>,
}

pub async fn create_session(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionView>), ApiError> {
    let notebook_id = normalize_record_key("notebook", &request.notebook_id).to_string();
    Notebook::get_owned(&notebook_id, &user.id, &state.db).await?;

    let session = ChatSession::new(
        user.id.clone(),
        notebook_id,
        request.title.unwrap_or_else(|| "New chat".to_string()),
    );
    let stored = state
        .db
        .store_item(session)
        .await
        .map_err(common::error::AppError::Database)?
        .ok_or_else(|| ApiError::InternalError("Failed to persist chat session".into()))?;

    Ok((StatusCode::CREATED, Json(stored.into())))
}

pub async fn list_sessions(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<SessionView>>, ApiError> {
    let sessions = ChatSession::list_for_user(&user.id, &state.db).await?;
    Ok(Json(sessions.into_iter().map(SessionView::from).collect()))
}

pub async fn get_session(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Result<Json<SessionDetail>, ApiError> {
    let session = ChatSession::get_owned(&id, &user.id, &state.db).await?;
    let messages = ChatMessage::list_for_session(&session.id, &state.db).await?;

    Ok(Json(SessionDetail {
        session: session.into(),
        messages: messages
            .into_iter()
            .map(|m| MessageView {
                role: m.role,
                content: m.content,
                created: m.created_at,
            })
            .collect(),
    }))
}

/// Streams one chat execution as server-sent events, one JSON event per
/// `data:` frame, flushed per event. Failures before the first event map to
/// an HTTP status; everything after arrives as a terminal `error` event.
pub async fn execute_stream(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    Json(mut request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    request.session_id = normalize_record_key("chat_session", &request.session_id).to_string();

    info!(session_id = %request.session_id, "chat stream starting");
    let events = state.chat.execute(&user, request).await?;

    let sse_stream = events.map(|event| {
        let payload = serde_json::to_string(&event).unwrap_or_else(|_| {
            r#"{"type":"error","message":"event serialization failed"}"#.to_string()
        });
        Ok(Event::default().data(payload))
    });

    Ok(Sse::new(sse_stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}
