use std::sync::Arc;

use async_trait::async_trait;
use command_queue::{CommandHandler, HandlerContext};
use common::error::AppError;

use crate::pipeline::{ProcessSourceInput, SourcePipeline};

/// Namespace the ingestion handlers register under.
pub const NAMESPACE: &str = "source";
/// Name of the source-processing handler.
pub const PROCESS_SOURCE: &str = "process_source";

/// Bridges the command queue to the source pipeline.
pub struct ProcessSourceHandler {
    pipeline: Arc<SourcePipeline>,
}

impl ProcessSourceHandler {
    pub fn new(pipeline: Arc<SourcePipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl CommandHandler for ProcessSourceHandler {
    fn namespace(&self) -> &'static str {
        NAMESPACE
    }

    fn name(&self) -> &'static str {
        PROCESS_SOURCE
    }

    async fn run(
        &self,
        ctx: &HandlerContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, AppError> {
        let input: ProcessSourceInput = serde_json::from_value(input)
            .map_err(|e| AppError::Validation(format!("malformed process_source input: {e}")))?;

        self.pipeline.process(&ctx.credentials, input).await
    }
}
