use std::sync::Arc;

use command_queue::{run_worker_loop, CommandQueue, CommandRegistry};
use common::{
    storage::db::SurrealDbClient,
    utils::config::get_config,
    vault::SecretVault,
};
use ingestion_pipeline::{OpenAiServices, ProcessSourceHandler, SourcePipeline};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let db = Arc::new(SurrealDbClient::connect(&config).await?);
    db.apply_migrations().await?;

    let vault = Arc::new(SecretVault::from_config(&config)?);

    let pipeline = Arc::new(SourcePipeline::new(
        Arc::clone(&db),
        Arc::new(OpenAiServices::new(Arc::clone(&db), config.clone())),
    ));
    let mut registry = CommandRegistry::new();
    registry.register(Arc::new(ProcessSourceHandler::new(pipeline)));

    let queue = Arc::new(CommandQueue::new(
        db,
        config,
        vault,
        Arc::new(registry),
    ));

    run_worker_loop(queue).await?;

    Ok(())
}
