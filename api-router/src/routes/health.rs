use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::api_state::ApiState;

/// Readiness probe: a trivial scalar round-trip against the store plus the
/// migration version. Returns 503 until both are healthy.
pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let database_ok = state.db.health_check().await.is_ok();

    let (current_version, needs_migration, migrations_ok) =
        match state.db.current_migration_version().await {
            Ok(version) => {
                let latest = common::storage::db::SurrealDbClient::latest_migration_version();
                (version, version < latest, version >= latest)
            }
            Err(_) => (0, true, false),
        };

    let healthy = database_ok && migrations_ok;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if healthy { "ok" } else { "error" },
            "checks": {
                "database": if database_ok { "ok" } else { "fail" },
                "migrations": {
                    "current_version": current_version,
                    "needs_migration": needs_migration,
                }
            }
        })),
    )
}
