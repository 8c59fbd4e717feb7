use crate::{error::AppError, utils::config::AppConfig};

use super::migrations::MIGRATIONS;
use super::types::StoredObject;
use futures::Stream;
use serde::Deserialize;
use std::ops::Deref;
use surrealdb::{
    engine::any::{connect, Any},
    opt::auth::Root,
    Error, Notification, Surreal,
};
use tokio_retry::{strategy::ExponentialBackoff, Retry};
use tracing::{info, warn};

/// Single owner of the process connection to the graph/document store. All
/// statements are parameterised via `.bind`; callers never interpolate values.
#[derive(Clone)]
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
}

/// Strips a `table:` qualifier so callers may pass either form.
pub fn normalize_record_key<'a>(table: &str, id: &'a str) -> &'a str {
    match id.split_once(':') {
        Some((prefix, rest)) if prefix == table => rest,
        _ => id,
    }
}

/// The externally visible, table-qualified form of a record id.
pub fn qualified_id(table: &str, id: &str) -> String {
    format!("{table}:{}", normalize_record_key(table, id))
}

impl SurrealDbClient {
    /// Connects, signs in and scopes the session. Establishment is retried
    /// with 2-4-8 second delays before the error surfaces; auth failures are a
    /// configuration problem and are not retried further by callers.
    pub async fn connect(config: &AppConfig) -> Result<Self, AppError> {
        let endpoint = config.database_endpoint();

        // 2s, 4s, 8s
        let strategy = ExponentialBackoff::from_millis(2).factor(1000).take(3);

        let db = Retry::spawn(strategy, || async {
            let attempt = async {
                let db = connect(&endpoint).await?;
                db.signin(Root {
                    username: &config.database_user,
                    password: &config.database_password,
                })
                .await?;
                db.use_ns(&config.database_namespace)
                    .use_db(&config.database_database)
                    .await?;
                Ok::<_, Error>(db)
            }
            .await;

            if let Err(err) = &attempt {
                warn!(%endpoint, error = %err, "Store connection attempt failed, backing off");
            }
            attempt
        })
        .await?;

        info!(%endpoint, "Connected to store");
        Ok(SurrealDbClient { client: db })
    }

    /// Applies every pending migration and records the resulting version.
    pub async fn apply_migrations(&self) -> Result<(), AppError> {
        let current = self.current_migration_version().await?;

        for (index, statements) in MIGRATIONS.iter().enumerate() {
            let version = index as i64 + 1;
            if version <= current {
                continue;
            }

            self.client.query(*statements).await?.check()?;
            self.client
                .query("UPSERT migration_version:current SET version = $version")
                .bind(("version", version))
                .await?
                .check()?;
            info!(version, "Applied store migration");
        }

        Ok(())
    }

    pub async fn current_migration_version(&self) -> Result<i64, AppError> {
        #[derive(Deserialize)]
        struct Row {
            version: i64,
        }

        let rows: Vec<Row> = self
            .client
            .query("SELECT version FROM migration_version")
            .await?
            .take(0)?;

        Ok(rows.into_iter().map(|row| row.version).max().unwrap_or(0))
    }

    pub fn latest_migration_version() -> i64 {
        MIGRATIONS.len() as i64
    }

    pub async fn needs_migration(&self) -> Result<bool, AppError> {
        Ok(self.current_migration_version().await? < Self::latest_migration_version())
    }

    /// Trivial scalar round-trip used by the readiness probe.
    pub async fn health_check(&self) -> Result<(), AppError> {
        self.client.query("RETURN 1").await?.check()?;
        Ok(())
    }

    /// Operation to store a object in SurrealDB, requires the struct to implement StoredObject
    pub async fn store_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client
            .create((T::table_name(), item.get_id()))
            .content(item)
            .await
    }

    /// Create-or-replace by id.
    pub async fn upsert_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client
            .upsert((T::table_name(), item.get_id()))
            .content(item)
            .await
    }

    /// Operation to retrieve all objects from a certain table
    pub async fn get_all_stored_items<T>(&self) -> Result<Vec<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select(T::table_name()).await
    }

    /// Operation to retrieve a single object by its ID. Accepts bare or
    /// table-qualified ids.
    pub async fn get_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        let key = normalize_record_key(T::table_name(), id);
        self.client.select((T::table_name(), key)).await
    }

    /// Operation to delete a single object by its ID. Accepts bare or
    /// table-qualified ids.
    pub async fn delete_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        let key = normalize_record_key(T::table_name(), id);
        self.client.delete((T::table_name(), key)).await
    }

    /// Creates a graph edge between two records. The edge name must be a
    /// code-supplied identifier; record keys stay parameterised.
    pub async fn relate(
        &self,
        from: (&str, &str),
        edge: &str,
        to: (&str, &str),
    ) -> Result<(), AppError> {
        if !edge
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(AppError::Validation(format!(
                "invalid edge name: {edge}"
            )));
        }

        let statement = format!(
            "RELATE (type::thing($from_table, $from_id))->{edge}->(type::thing($to_table, $to_id))"
        );

        self.client
            .query(statement)
            .bind(("from_table", from.0.to_string()))
            .bind(("from_id", normalize_record_key(from.0, from.1).to_string()))
            .bind(("to_table", to.0.to_string()))
            .bind(("to_id", normalize_record_key(to.0, to.1).to_string()))
            .await?
            .check()?;

        Ok(())
    }

    /// Operation to listen to a table for updates
    pub async fn listen<T>(
        &self,
    ) -> Result<impl Stream<Item = Result<Notification<T>, Error>>, Error>
    where
        T: for<'de> StoredObject + std::marker::Unpin,
    {
        self.client.select(T::table_name()).live().await
    }
}

impl Deref for SurrealDbClient {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl SurrealDbClient {
    /// Create an in-memory SurrealDB client for testing.
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, Error> {
        let db = connect("mem://").await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }
}

#[cfg(test)]
mod tests {
    use crate::stored_object;

    use super::*;
    use uuid::Uuid;

    stored_object!(Dummy, "dummy", {
        name: String
    });

    #[test]
    fn record_key_normalization() {
        assert_eq!(normalize_record_key("source", "source:abc"), "abc");
        assert_eq!(normalize_record_key("source", "abc"), "abc");
        // A foreign qualifier is part of the key, not a prefix to strip.
        assert_eq!(normalize_record_key("source", "notebook:abc"), "notebook:abc");
        assert_eq!(qualified_id("source", "abc"), "source:abc");
        assert_eq!(qualified_id("source", "source:abc"), "source:abc");
    }

    #[tokio::test]
    async fn test_initialization_and_crud() {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string(); // ensures isolation per test run
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");

        db.apply_migrations()
            .await
            .expect("Failed to apply migrations");

        // Test basic CRUD
        let dummy = Dummy {
            id: "abc".to_string(),
            name: "first".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        // Store
        let stored = db.store_item(dummy.clone()).await.expect("Failed to store");
        assert!(stored.is_some());

        // Read
        let fetched = db
            .get_item::<Dummy>(&dummy.id)
            .await
            .expect("Failed to fetch");
        assert_eq!(fetched, Some(dummy.clone()));

        // Read with qualified id
        let fetched_qualified = db
            .get_item::<Dummy>("dummy:abc")
            .await
            .expect("Failed to fetch by qualified id");
        assert_eq!(fetched_qualified, Some(dummy.clone()));

        // Read all
        let all = db
            .get_all_stored_items::<Dummy>()
            .await
            .expect("Failed to fetch all");
        assert!(all.contains(&dummy));

        // Delete
        let deleted = db
            .delete_item::<Dummy>(&dummy.id)
            .await
            .expect("Failed to delete");
        assert_eq!(deleted, Some(dummy));

        // After delete, should not be present
        let fetch_post = db
            .get_item::<Dummy>("abc")
            .await
            .expect("Failed fetch post delete");
        assert!(fetch_post.is_none());
    }

    #[tokio::test]
    async fn test_migrations_record_version() {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");

        assert_eq!(db.current_migration_version().await.expect("version"), 0);
        assert!(db.needs_migration().await.expect("needs"));

        db.apply_migrations().await.expect("migrations");

        assert_eq!(
            db.current_migration_version().await.expect("version"),
            SurrealDbClient::latest_migration_version()
        );
        assert!(!db.needs_migration().await.expect("needs"));

        // Applying again is a no-op.
        db.apply_migrations().await.expect("migrations rerun");
        assert_eq!(
            db.current_migration_version().await.expect("version"),
            SurrealDbClient::latest_migration_version()
        );
    }

    #[tokio::test]
    async fn test_health_check() {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");

        db.health_check().await.expect("health check");
    }

    #[tokio::test]
    async fn test_relate_creates_edge() {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");

        let a = Dummy {
            id: "a".to_string(),
            name: "a".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let b = Dummy {
            id: "b".to_string(),
            name: "b".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        db.store_item(a).await.expect("store a");
        db.store_item(b).await.expect("store b");

        db.relate(("dummy", "a"), "linked", ("dummy", "dummy:b"))
            .await
            .expect("relate");

        #[derive(serde::Deserialize)]
        struct CountRow {
            count: i64,
        }

        let rows: Vec<CountRow> = db
            .client
            .query("SELECT count() as count FROM linked GROUP ALL")
            .await
            .expect("query")
            .take(0)
            .expect("take");
        assert_eq!(rows.first().map(|r| r.count), Some(1));
    }
}
