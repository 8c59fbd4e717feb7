use std::sync::Arc;

use api_router::{api_routes_v1, api_state::ApiState};
use axum::http::{HeaderValue, Method};
use chat_pipeline::{ChatExecutor, OpenAiChatModel};
use command_queue::{run_worker_loop, CommandQueue, CommandRegistry};
use common::{
    storage::db::SurrealDbClient,
    utils::config::get_config,
    vault::SecretVault,
};
use ingestion_pipeline::{OpenAiServices, ProcessSourceHandler, SourcePipeline};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let db = Arc::new(SurrealDbClient::connect(&config).await?);
    db.apply_migrations().await?;

    let vault = Arc::new(SecretVault::from_config(&config)?);

    // Handlers registered here serve both the in-process worker and the
    // synchronous ingestion path.
    let pipeline = Arc::new(SourcePipeline::new(
        Arc::clone(&db),
        Arc::new(OpenAiServices::new(Arc::clone(&db), config.clone())),
    ));
    let mut registry = CommandRegistry::new();
    registry.register(Arc::new(ProcessSourceHandler::new(pipeline)));

    let queue = Arc::new(CommandQueue::new(
        Arc::clone(&db),
        config.clone(),
        Arc::clone(&vault),
        Arc::new(registry),
    ));

    let chat = Arc::new(ChatExecutor::new(
        Arc::clone(&db),
        config.clone(),
        Arc::clone(&vault),
        Arc::new(OpenAiChatModel::new(Arc::clone(&db), config.clone())),
    ));

    let api_state = ApiState::new(
        config.clone(),
        Arc::clone(&db),
        Arc::clone(&vault),
        Arc::clone(&queue),
        chat,
    );

    if config.worker_enabled() {
        let worker_queue = Arc::clone(&queue);
        tokio::spawn(async move {
            if let Err(err) = run_worker_loop(worker_queue).await {
                tracing::error!(error = %err, "worker loop terminated");
            }
        });
    } else {
        warn!("ENABLE_WORKER=false, this process will not execute commands");
    }

    let app = api_routes_v1(&api_state).layer(cors_layer(&config.allowed_origins_list()));

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// CORS is enforced by this outer layer only; the core routes stay agnostic.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    if origins.iter().any(|origin| origin == "*") {
        layer.allow_origin(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        layer.allow_origin(AllowOrigin::list(parsed))
    }
}
