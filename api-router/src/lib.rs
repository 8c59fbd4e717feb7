#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

use api_state::ApiState;
use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};
use middleware_api_auth::api_auth;
use routes::{
    admin::wipe_user_data,
    chat::{create_session, execute_stream, get_session, list_sessions},
    commands::{cancel_command, get_command},
    health::health,
    notebooks::{create_notebook, get_notebook, list_notebooks},
    notes::{create_note, delete_note, get_note, list_notebook_notes},
    secrets::{create_secret, delete_secret, list_secrets, reveal_secret},
    sources::{
        create_source, delete_source, get_source, list_sources, retry_source, upload_source,
    },
};

pub mod api_state;
pub mod error;
mod middleware_api_auth;
mod routes;

/// Upper bound on multipart upload bodies.
const UPLOAD_BODY_LIMIT: usize = 50 * 1024 * 1024;

/// Router for the core API surface, version 1.
pub fn api_routes_v1(app_state: &ApiState) -> Router {
    // Public, unauthenticated endpoints (for probes)
    let public = Router::new().route("/health", get(health));

    // Protected API endpoints (require auth)
    let protected = Router::new()
        .route("/sources", post(create_source).get(list_sources))
        .route(
            "/sources/upload",
            post(upload_source).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/sources/{id}", get(get_source).delete(delete_source))
        .route("/sources/{id}/retry", post(retry_source))
        .route("/commands/{id}", get(get_command))
        .route("/commands/{id}/cancel", post(cancel_command))
        .route("/chat/sessions", post(create_session).get(list_sessions))
        .route("/chat/sessions/{id}", get(get_session))
        .route("/chat/execute/stream", post(execute_stream))
        .route("/notebooks", post(create_notebook).get(list_notebooks))
        .route("/notebooks/{id}", get(get_notebook))
        .route("/notebooks/{id}/notes", get(list_notebook_notes))
        .route("/notes", post(create_note))
        .route("/notes/{id}", get(get_note).delete(delete_note))
        .route("/secrets", post(create_secret).get(list_secrets))
        .route("/secrets/{provider}", delete(delete_secret))
        .route("/secrets/{provider}/reveal", get(reveal_secret))
        .route("/admin/users/{id}/data", delete(wipe_user_data))
        .route_layer(from_fn_with_state(app_state.clone(), api_auth));

    public.merge(protected).with_state(app_state.clone())
}
