use futures::Stream;
use surrealdb::Notification;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    New,
    Running,
    Complete,
    Failed,
}

/// Claims older than this are considered abandoned and eligible for reaping.
pub const DEFAULT_LEASE_SECS: i64 = 600;
/// Reaper gives up re-queueing a claim after this many attempts.
pub const MAX_ATTEMPTS: u32 = 3;
/// Error recorded when the reaper exhausts the retry budget.
pub const LEASE_EXPIRED_MESSAGE: &str = "lease expired, retry budget exhausted";

stored_object!(Command, "command", {
    namespace: String,
    name: String,
    input: serde_json::Value,
    status: CommandStatus,
    result: Option<serde_json::Value>,
    error_message: Option<String>,
    #[serde(
        serialize_with = "serialize_option_datetime",
        deserialize_with = "deserialize_option_datetime",
        default
    )]
    claimed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    attempts: u32
});

impl Command {
    pub fn new(namespace: String, name: String, input: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            namespace,
            name,
            input,
            status: CommandStatus::New,
            result: None,
            error_message: None,
            claimed_at: None,
            attempts: 0,
        }
    }

    /// Persists a new command and returns it.
    pub async fn create_and_store(
        namespace: String,
        name: String,
        input: serde_json::Value,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let command = Self::new(namespace, name, input);
        let stored = db.store_item(command).await?;
        stored.ok_or_else(|| AppError::InternalError("Failed to persist command".into()))
    }

    /// Convenience accessor for the caller carried in the opaque input.
    pub fn user_id(&self) -> Option<&str> {
        self.input.get("user_id").and_then(|v| v.as_str())
    }

    /// Convenience accessor for the source a handler operates on, if any.
    pub fn source_id(&self) -> Option<&str> {
        self.input.get("source_id").and_then(|v| v.as_str())
    }

    /// Atomically claims the oldest `new` command: compare-and-swap on the
    /// status so concurrent claimants get at most one winner each.
    pub async fn claim_next(db: &SurrealDbClient) -> Result<Option<Self>, AppError> {
        let claimed: Vec<Self> = db
            .client
            .query(
                "UPDATE (SELECT VALUE id FROM type::table($table)
                     WHERE status = 'new' ORDER BY created_at ASC LIMIT 1)
                 SET status = 'running',
                     claimed_at = time::now(),
                     attempts += 1,
                     updated_at = time::now()
                 WHERE status = 'new'
                 RETURN AFTER",
            )
            .bind(("table", Self::table_name()))
            .await?
            .take(0)?;

        Ok(claimed.into_iter().next())
    }

    /// Claims one specific command; used by the synchronous execution path so
    /// the status history matches worker-run commands.
    pub async fn claim_by_id(id: &str, db: &SurrealDbClient) -> Result<Option<Self>, AppError> {
        let claimed: Vec<Self> = db
            .client
            .query(
                "UPDATE type::thing($table, $id)
                 SET status = 'running',
                     claimed_at = time::now(),
                     attempts += 1,
                     updated_at = time::now()
                 WHERE status = 'new'
                 RETURN AFTER",
            )
            .bind(("table", Self::table_name()))
            .bind(("id", id.to_string()))
            .await?
            .take(0)?;

        Ok(claimed.into_iter().next())
    }

    /// Terminal success transition; only a `running` command can complete.
    pub async fn mark_complete(
        id: &str,
        result: serde_json::Value,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.client
            .query(
                "UPDATE type::thing($table, $id)
                 SET status = 'complete', result = $result, updated_at = time::now()
                 WHERE status = 'running'",
            )
            .bind(("table", Self::table_name()))
            .bind(("id", id.to_string()))
            .bind(("result", result))
            .await?
            .check()?;

        Ok(())
    }

    /// Terminal failure transition; only a `running` command can fail this
    /// way (cancellation of queued commands goes through [`Self::cancel`]).
    pub async fn mark_failed(
        id: &str,
        error_message: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.client
            .query(
                "UPDATE type::thing($table, $id)
                 SET status = 'failed', error_message = $message, updated_at = time::now()
                 WHERE status = 'running'",
            )
            .bind(("table", Self::table_name()))
            .bind(("id", id.to_string()))
            .bind(("message", error_message.to_string()))
            .await?
            .check()?;

        Ok(())
    }

    /// Cancels a queued command. Returns false when the command had already
    /// been claimed; running commands are not preemptively interruptible.
    pub async fn cancel(id: &str, db: &SurrealDbClient) -> Result<bool, AppError> {
        let cancelled: Vec<Self> = db
            .client
            .query(
                "UPDATE type::thing($table, $id)
                 SET status = 'failed', error_message = 'cancelled', updated_at = time::now()
                 WHERE status = 'new'
                 RETURN AFTER",
            )
            .bind(("table", Self::table_name()))
            .bind(("id", id.to_string()))
            .await?
            .take(0)?;

        Ok(!cancelled.is_empty())
    }

    /// Releases abandoned claims. Commands whose lease expired go back to
    /// `new` while attempts remain, and to `failed` once the budget is spent.
    /// Returns `(requeued, exhausted)` counts.
    pub async fn reap_expired(
        db: &SurrealDbClient,
        lease_secs: i64,
        max_attempts: u32,
    ) -> Result<(usize, usize), AppError> {
        let cutoff = Utc::now() - chrono::Duration::seconds(lease_secs);

        let mut response = db
            .client
            .query(
                "UPDATE type::table($table)
                 SET status = 'failed', error_message = $exhausted_message, updated_at = time::now()
                 WHERE status = 'running' AND claimed_at != NONE AND claimed_at < $cutoff
                   AND attempts >= $max_attempts
                 RETURN AFTER",
            )
            .query(
                "UPDATE type::table($table)
                 SET status = 'new', claimed_at = NONE, updated_at = time::now()
                 WHERE status = 'running' AND claimed_at != NONE AND claimed_at < $cutoff
                   AND attempts < $max_attempts
                 RETURN AFTER",
            )
            .bind(("table", Self::table_name()))
            .bind(("cutoff", surrealdb::sql::Datetime::from(cutoff)))
            .bind(("max_attempts", max_attempts))
            .bind(("exhausted_message", LEASE_EXPIRED_MESSAGE.to_string()))
            .await?;

        let exhausted: Vec<Self> = response.take(0)?;
        let requeued: Vec<Self> = response.take(1)?;

        Ok((requeued.len(), exhausted.len()))
    }

    /// Commands currently queued or executing against one source. The
    /// one-running-job-per-source invariant requires this to stay ≤ 1.
    pub async fn active_count_for_source(
        source_id: &str,
        db: &SurrealDbClient,
    ) -> Result<i64, AppError> {
        #[derive(Deserialize)]
        struct CountRow {
            count: i64,
        }

        let row: Option<CountRow> = db
            .client
            .query(
                "SELECT count() as count FROM type::table($table)
                 WHERE input.source_id = $source_id AND status IN ['new', 'running']
                 GROUP ALL",
            )
            .bind(("table", Self::table_name()))
            .bind(("source_id", source_id.to_string()))
            .await?
            .take(0)?;

        Ok(row.map(|r| r.count).unwrap_or(0))
    }

    /// Live notifications on the command table; wakes idle workers.
    pub async fn listen(
        db: &SurrealDbClient,
    ) -> Result<impl Stream<Item = Result<Notification<Self>, surrealdb::Error>>, surrealdb::Error>
    {
        db.listen::<Self>().await
    }
}
