use std::{sync::Arc, time::Duration};

use common::{
    credentials::CredentialContext,
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            chunk::SourceChunk,
            insight::SourceInsight,
            notebook::Notebook,
            source::{Source, SourceAsset, SourceStatus},
            transformation::Transformation,
        },
    },
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    chunking::{split_text, CHUNK_OVERLAP, CHUNK_SIZE},
    extract::{extract_from_file, extract_from_url, Extracted},
    services::PipelineServices,
};

/// Chunks embedded per model call.
const EMBED_BATCH_SIZE: usize = 10;
/// Budget for one embedding batch.
const EMBED_BATCH_TIMEOUT: Duration = Duration::from_secs(30);
/// Budget for one transformation model call.
const TRANSFORM_TIMEOUT: Duration = Duration::from_secs(60);

/// Input carried in the `process_source` command. The content itself is read
/// from the source record's asset; this structure selects what to do with it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessSourceInput {
    pub source_id: String,
    pub user_id: String,
    #[serde(default)]
    pub notebook_ids: Vec<String>,
    #[serde(default)]
    pub transformation_ids: Vec<String>,
    #[serde(default)]
    pub embed: bool,
    #[serde(default)]
    pub delete_source: bool,
}

/// Three-node ingestion graph over one source: extract, persist+embed,
/// transform. Re-entry is idempotent: chunks and insights from a prior
/// attempt are replaced, never appended.
pub struct SourcePipeline {
    db: Arc<SurrealDbClient>,
    services: Arc<dyn PipelineServices>,
}

impl SourcePipeline {
    pub fn new(db: Arc<SurrealDbClient>, services: Arc<dyn PipelineServices>) -> Self {
        Self { db, services }
    }

    /// Runs the full graph for one source, mirroring the outcome onto the
    /// source record. Stage failures keep their stage tag in
    /// `error_message`.
    pub async fn process(
        &self,
        credentials: &CredentialContext,
        input: ProcessSourceInput,
    ) -> Result<serde_json::Value, AppError> {
        let source = Source::get_owned(&input.source_id, &input.user_id, &self.db).await?;
        Source::set_status(&source.id, SourceStatus::Running, None, &self.db).await?;

        match self.run_stages(credentials, &source, &input).await {
            Ok(summary) => {
                Source::set_status(&source.id, SourceStatus::Completed, None, &self.db).await?;
                self.cleanup_upload(&source, &input);
                info!(source_id = %source.id, "source processing completed");
                Ok(summary)
            }
            Err(err) => {
                Source::set_status(
                    &source.id,
                    SourceStatus::Failed,
                    Some(err.to_string()),
                    &self.db,
                )
                .await?;
                Err(err)
            }
        }
    }

    async fn run_stages(
        &self,
        credentials: &CredentialContext,
        source: &Source,
        input: &ProcessSourceInput,
    ) -> Result<serde_json::Value, AppError> {
        let extracted = self
            .extract_stage(source)
            .await
            .map_err(|e| AppError::stage("extract", e))?;

        let chunk_count = self
            .persist_embed_stage(credentials, source, input, &extracted)
            .await
            .map_err(|e| AppError::stage("persist_embed", e))?;

        let insight_count = self
            .transform_stage(credentials, source, input, &extracted)
            .await
            .map_err(|e| AppError::stage("transform", e))?;

        Ok(serde_json::json!({
            "source_id": source.id,
            "content_length": extracted.markdown.len(),
            "chunks": chunk_count,
            "insights": insight_count,
        }))
    }

    /// Node 1 — resolve the asset to markdown.
    async fn extract_stage(&self, source: &Source) -> Result<Extracted, AppError> {
        match &source.asset {
            SourceAsset::Link { url } => extract_from_url(url).await,
            SourceAsset::Upload { file_path } => {
                extract_from_file(std::path::Path::new(file_path)).await
            }
            SourceAsset::Text { inline } => Ok(Extracted::inline(inline)),
        }
    }

    /// Node 2 — persist the full text, replace the chunk set, embed and link
    /// notebooks.
    async fn persist_embed_stage(
        &self,
        credentials: &CredentialContext,
        source: &Source,
        input: &ProcessSourceInput,
        extracted: &Extracted,
    ) -> Result<usize, AppError> {
        Source::update_content(&source.id, &extracted.markdown, &self.db).await?;

        // Idempotent re-entry: a retry replaces the prior chunk set.
        SourceChunk::delete_by_source_id(&source.id, &self.db).await?;

        let mut written = 0usize;
        if input.embed && !extracted.markdown.is_empty() {
            let chunks = split_text(&extracted.markdown, CHUNK_SIZE, CHUNK_OVERLAP);

            for (batch_index, batch) in chunks.chunks(EMBED_BATCH_SIZE).enumerate() {
                let embeddings = tokio::time::timeout(
                    EMBED_BATCH_TIMEOUT,
                    self.services.embed_batch(credentials, batch),
                )
                .await
                .map_err(|_| AppError::Timeout {
                    stage: "persist_embed",
                    seconds: EMBED_BATCH_TIMEOUT.as_secs(),
                })??;

                if embeddings.len() != batch.len() {
                    return Err(AppError::InternalError(format!(
                        "embedding batch returned {} vectors for {} chunks",
                        embeddings.len(),
                        batch.len()
                    )));
                }

                for (offset, (content, embedding)) in
                    batch.iter().zip(embeddings.into_iter()).enumerate()
                {
                    let index = (batch_index * EMBED_BATCH_SIZE + offset) as i64;
                    let chunk = SourceChunk::new(
                        source.id.clone(),
                        index,
                        content.clone(),
                        Some(embedding),
                        source.user_id.clone(),
                    );
                    self.db.store_item(chunk).await?;
                    written += 1;
                }
            }
        }

        Source::set_embedded_chunks(&source.id, written as i64, &self.db).await?;

        for notebook_id in &input.notebook_ids {
            // Ownership check keeps a caller from linking into foreign notebooks.
            Notebook::get_owned(notebook_id, &input.user_id, &self.db).await?;
            Notebook::add_source(notebook_id, &source.id, &self.db).await?;
        }

        Ok(written)
    }

    /// Node 3 — apply each requested transformation, replacing insights from
    /// any prior attempt.
    async fn transform_stage(
        &self,
        credentials: &CredentialContext,
        source: &Source,
        input: &ProcessSourceInput,
        extracted: &Extracted,
    ) -> Result<usize, AppError> {
        SourceInsight::delete_by_source_id(&source.id, &self.db).await?;

        let mut written = 0usize;
        for transformation_id in &input.transformation_ids {
            let transformation =
                Transformation::get_accessible(transformation_id, &input.user_id, &self.db)
                    .await?;
            let prompt = transformation.render(&extracted.markdown);

            let content = tokio::time::timeout(
                TRANSFORM_TIMEOUT,
                self.services.generate_insight(credentials, &prompt),
            )
            .await
            .map_err(|_| AppError::Timeout {
                stage: "transform",
                seconds: TRANSFORM_TIMEOUT.as_secs(),
            })??;

            let insight = SourceInsight::new(
                source.id.clone(),
                transformation.id.clone(),
                content,
                source.user_id.clone(),
            );
            self.db.store_item(insight).await?;
            written += 1;
        }

        Ok(written)
    }

    /// Unlinks an upload once processing reached the terminal success state.
    fn cleanup_upload(&self, source: &Source, input: &ProcessSourceInput) {
        if !input.delete_source {
            return;
        }
        if let SourceAsset::Upload { file_path } = &source.asset {
            if let Err(err) = std::fs::remove_file(file_path) {
                warn!(%file_path, error = %err, "failed to unlink processed upload");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use common::storage::types::command::Command;
    use tokio::sync::Mutex;
    use uuid::Uuid;

    use super::*;

    const TEST_EMBEDDING_DIM: usize = 8;

    struct MockServices {
        fail_embedding: bool,
        fail_insight: bool,
        calls: Mutex<Vec<&'static str>>,
    }

    impl MockServices {
        fn new() -> Self {
            Self {
                fail_embedding: false,
                fail_insight: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing_embedding() -> Self {
            Self {
                fail_embedding: true,
                ..Self::new()
            }
        }

        fn failing_insight() -> Self {
            Self {
                fail_insight: true,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl PipelineServices for MockServices {
        async fn embed_batch(
            &self,
            _credentials: &CredentialContext,
            inputs: &[String],
        ) -> Result<Vec<Vec<f32>>, AppError> {
            self.calls.lock().await.push("embed");
            if self.fail_embedding {
                return Err(AppError::InternalError("embedding backend down".into()));
            }
            Ok(vec![vec![0.25; TEST_EMBEDDING_DIM]; inputs.len()])
        }

        async fn generate_insight(
            &self,
            _credentials: &CredentialContext,
            prompt: &str,
        ) -> Result<String, AppError> {
            self.calls.lock().await.push("insight");
            if self.fail_insight {
                return Err(AppError::InternalError("model unavailable".into()));
            }
            Ok(format!("insight: {}", prompt.len()))
        }
    }

    async fn setup() -> (Arc<SurrealDbClient>, CredentialContext) {
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .expect("memory db"),
        );
        db.apply_migrations().await.expect("migrations");
        (db, CredentialContext::empty())
    }

    fn pipeline_with(db: &Arc<SurrealDbClient>, services: MockServices) -> SourcePipeline {
        SourcePipeline::new(Arc::clone(db), Arc::new(services))
    }

    async fn store_text_source(db: &SurrealDbClient, text: &str, user_id: &str) -> Source {
        let source = Source::new(
            "Test source".to_string(),
            SourceAsset::Text {
                inline: text.to_string(),
            },
            user_id.to_string(),
        );
        db.store_item(source.clone()).await.expect("store source");
        source
    }

    fn input_for(source: &Source, embed: bool) -> ProcessSourceInput {
        ProcessSourceInput {
            source_id: source.id.clone(),
            user_id: source.user_id.clone(),
            notebook_ids: Vec::new(),
            transformation_ids: Vec::new(),
            embed,
            delete_source: false,
        }
    }

    #[tokio::test]
    async fn text_source_with_embedding_completes() {
        let (db, credentials) = setup().await;
        let pipeline = pipeline_with(&db, MockServices::new());

        let source = store_text_source(&db, "Hello world. ", "user_1").await;
        let summary = pipeline
            .process(&credentials, input_for(&source, true))
            .await
            .expect("process");

        assert_eq!(summary["chunks"], 1);
        assert_eq!(summary["content_length"], 13);

        let updated = Source::get_owned(&source.id, "user_1", &db)
            .await
            .expect("get source");
        assert_eq!(updated.status, SourceStatus::Completed);
        assert_eq!(updated.full_text.as_deref(), Some("Hello world. "));
        assert_eq!(updated.content_length, Some(13));
        assert_eq!(updated.embedded_chunks, 1);
        assert!(updated.error_message.is_none());

        let chunks = SourceChunk::list_by_source(&source.id, &db)
            .await
            .expect("chunks");
        assert_eq!(chunks.len(), 1);
        let chunk = chunks.first().expect("chunk");
        assert_eq!(chunk.index, 0);
        assert_eq!(chunk.content, "Hello world. ");
        assert_eq!(
            chunk.embedding.as_ref().map(Vec::len),
            Some(TEST_EMBEDDING_DIM)
        );
    }

    #[tokio::test]
    async fn long_text_chunks_sequentially_and_counts_match() {
        let (db, credentials) = setup().await;
        let pipeline = pipeline_with(&db, MockServices::new());

        let text: String = "abcdefghij".repeat(300); // 3000 chars -> 4 chunks
        let source = store_text_source(&db, &text, "user_1").await;
        pipeline
            .process(&credentials, input_for(&source, true))
            .await
            .expect("process");

        let chunks = SourceChunk::list_by_source(&source.id, &db)
            .await
            .expect("chunks");
        let indexes: Vec<i64> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indexes, vec![0, 1, 2, 3]);

        let updated = Source::get_owned(&source.id, "user_1", &db)
            .await
            .expect("source");
        assert_eq!(updated.embedded_chunks, 4);
        assert_eq!(
            SourceChunk::count_embedded(&source.id, &db)
                .await
                .expect("count"),
            updated.embedded_chunks
        );
    }

    #[tokio::test]
    async fn embed_false_leaves_no_chunks() {
        let (db, credentials) = setup().await;
        let pipeline = pipeline_with(&db, MockServices::new());

        let source = store_text_source(&db, "No embedding requested.", "user_1").await;
        pipeline
            .process(&credentials, input_for(&source, false))
            .await
            .expect("process");

        let chunks = SourceChunk::list_by_source(&source.id, &db)
            .await
            .expect("chunks");
        assert!(chunks.is_empty());

        let updated = Source::get_owned(&source.id, "user_1", &db)
            .await
            .expect("source");
        assert_eq!(updated.embedded_chunks, 0);
        assert_eq!(updated.status, SourceStatus::Completed);
    }

    #[tokio::test]
    async fn reentry_replaces_chunks_and_insights() {
        let (db, credentials) = setup().await;
        let pipeline = pipeline_with(&db, MockServices::new());

        let transformation = Transformation::new(
            "Summarize".to_string(),
            "Summarize: {content}".to_string(),
            None,
        );
        db.store_item(transformation.clone())
            .await
            .expect("store transformation");

        let source = store_text_source(&db, &"word ".repeat(500), "user_1").await;
        let mut input = input_for(&source, true);
        input.transformation_ids = vec![transformation.id.clone()];

        pipeline
            .process(&credentials, input.clone())
            .await
            .expect("first run");
        let first_chunks = SourceChunk::list_by_source(&source.id, &db)
            .await
            .expect("chunks");
        let first_insights = SourceInsight::list_by_source(&source.id, &db)
            .await
            .expect("insights");

        pipeline
            .process(&credentials, input)
            .await
            .expect("second run");
        let second_chunks = SourceChunk::list_by_source(&source.id, &db)
            .await
            .expect("chunks");
        let second_insights = SourceInsight::list_by_source(&source.id, &db)
            .await
            .expect("insights");

        // Same counts, fresh rows: replaced rather than appended.
        assert_eq!(first_chunks.len(), second_chunks.len());
        assert_eq!(first_insights.len(), 1);
        assert_eq!(second_insights.len(), 1);
        assert_ne!(
            first_chunks.first().map(|c| c.id.clone()),
            second_chunks.first().map(|c| c.id.clone())
        );

        let updated = Source::get_owned(&source.id, "user_1", &db)
            .await
            .expect("source");
        assert_eq!(updated.embedded_chunks, second_chunks.len() as i64);
    }

    #[tokio::test]
    async fn embedding_failure_is_tagged_and_marks_source_failed() {
        let (db, credentials) = setup().await;
        let pipeline = pipeline_with(&db, MockServices::failing_embedding());

        let source = store_text_source(&db, "some text", "user_1").await;
        let err = pipeline
            .process(&credentials, input_for(&source, true))
            .await
            .expect_err("must fail");
        assert!(err.to_string().starts_with("persist_embed:"));

        let updated = Source::get_owned(&source.id, "user_1", &db)
            .await
            .expect("source");
        assert_eq!(updated.status, SourceStatus::Failed);
        assert!(updated
            .error_message
            .as_deref()
            .is_some_and(|m| m.starts_with("persist_embed:")));
    }

    #[tokio::test]
    async fn transform_failure_is_tagged() {
        let (db, credentials) = setup().await;
        let pipeline = pipeline_with(&db, MockServices::failing_insight());

        let transformation =
            Transformation::new("Keywords".to_string(), "{content}".to_string(), None);
        db.store_item(transformation.clone())
            .await
            .expect("store transformation");

        let source = store_text_source(&db, "text body", "user_1").await;
        let mut input = input_for(&source, false);
        input.transformation_ids = vec![transformation.id];

        let err = pipeline
            .process(&credentials, input)
            .await
            .expect_err("must fail");
        assert!(err.to_string().starts_with("transform:"));
    }

    #[tokio::test]
    async fn failed_attempt_leaves_no_chunk_rows() {
        let (db, credentials) = setup().await;

        // Seed rows from a previous successful attempt.
        let good = pipeline_with(&db, MockServices::new());
        let source = store_text_source(&db, "retry body", "user_1").await;
        good.process(&credentials, input_for(&source, true))
            .await
            .expect("seed run");

        // A failing re-run deletes the old rows and writes none.
        let bad = pipeline_with(&db, MockServices::failing_embedding());
        bad.process(&credentials, input_for(&source, true))
            .await
            .expect_err("must fail");

        let chunks = SourceChunk::list_by_source(&source.id, &db)
            .await
            .expect("chunks");
        assert!(chunks.is_empty());

        // And the idempotent retry restores the full set.
        good.process(&credentials, input_for(&source, true))
            .await
            .expect("retry run");
        let restored = SourceChunk::list_by_source(&source.id, &db)
            .await
            .expect("chunks");
        assert_eq!(restored.len(), 1);
    }

    #[tokio::test]
    async fn notebook_edges_require_ownership() {
        let (db, credentials) = setup().await;
        let pipeline = pipeline_with(&db, MockServices::new());

        let mine = Notebook::new("Mine".to_string(), None, "user_1".to_string());
        let foreign = Notebook::new("Foreign".to_string(), None, "user_2".to_string());
        db.store_item(mine.clone()).await.expect("store notebook");
        db.store_item(foreign.clone())
            .await
            .expect("store notebook");

        let source = store_text_source(&db, "link me", "user_1").await;
        let mut input = input_for(&source, false);
        input.notebook_ids = vec![mine.id.clone()];
        pipeline
            .process(&credentials, input)
            .await
            .expect("process");
        assert_eq!(
            Notebook::source_ids(&mine.id, &db).await.expect("ids"),
            vec![source.id.clone()]
        );

        let second = store_text_source(&db, "blocked", "user_1").await;
        let mut blocked = input_for(&second, false);
        blocked.notebook_ids = vec![foreign.id.clone()];
        let err = pipeline
            .process(&credentials, blocked)
            .await
            .expect_err("foreign notebook must be rejected");
        assert!(err.to_string().starts_with("persist_embed:"));
    }

    #[tokio::test]
    async fn command_input_round_trips_through_json() {
        let input = ProcessSourceInput {
            source_id: "source-1".to_string(),
            user_id: "user_1".to_string(),
            notebook_ids: vec!["nb-1".to_string()],
            transformation_ids: Vec::new(),
            embed: true,
            delete_source: false,
        };

        let command = Command::new(
            "source".to_string(),
            "process_source".to_string(),
            serde_json::to_value(&input).expect("to_value"),
        );
        assert_eq!(command.source_id(), Some("source-1"));
        assert_eq!(command.user_id(), Some("user_1"));

        let parsed: ProcessSourceInput =
            serde_json::from_value(command.input).expect("from_value");
        assert_eq!(parsed, input);
    }
}
