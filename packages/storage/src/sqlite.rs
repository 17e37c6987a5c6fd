// ABOUTME: SQLite-backed document store
// ABOUTME: One JSON document table queried through the JSON1 functions

use async_trait::async_trait;
use caseflow_core::{default_database_path, Collection, IN_QUERY_LIMIT};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{migrate::MigrateDatabase, Row, Sqlite, Transaction};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

use crate::{
    BatchUpdate, ChangeFeed, DocRef, Document, DocumentChange, DocumentStore, DocumentWriter,
    Patch, StorageError, StorageResult,
};

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub path: PathBuf,
    pub enable_wal: bool,
    pub max_connections: u32,
    pub busy_timeout_seconds: u64,
    pub in_query_limit: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            enable_wal: true,
            max_connections: 5,
            busy_timeout_seconds: 30,
            in_query_limit: IN_QUERY_LIMIT,
        }
    }
}

/// SQLite implementation of DocumentStore
pub struct SqliteStore {
    pool: SqlitePool,
    in_query_limit: usize,
    feed: ChangeFeed,
    /// Held across every write transaction; concurrent deferred upgrades fail with SQLITE_BUSY
    write_lock: Mutex<()>,
}

impl SqliteStore {
    /// Open (creating if needed) the database file described by `config`
    pub async fn new(config: StorageConfig) -> StorageResult<Self> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(StorageError::Io)?;
        }

        let database_url = format!("sqlite:{}", config.path.display());

        if !Sqlite::database_exists(&database_url).await? {
            debug!("Creating database at: {}", database_url);
            Sqlite::create_database(&database_url).await?;
        }

        let busy_timeout = Duration::from_secs(config.busy_timeout_seconds);
        let journal_mode = if config.enable_wal {
            SqliteJournalMode::Wal
        } else {
            SqliteJournalMode::Delete
        };
        // Applied to every pooled connection
        let options = SqliteConnectOptions::from_str(&database_url)?
            .journal_mode(journal_mode)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(busy_timeout)
            .connect_with(options)
            .await?;

        Ok(Self {
            pool,
            in_query_limit: config.in_query_limit,
            feed: ChangeFeed::new(),
            write_lock: Mutex::new(()),
        })
    }

    /// Private in-memory database; a single pinned connection keeps it alive
    pub async fn in_memory() -> StorageResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Ok(Self {
            pool,
            in_query_limit: IN_QUERY_LIMIT,
            feed: ChangeFeed::new(),
            write_lock: Mutex::new(()),
        })
    }

    /// Run migrations
    pub async fn initialize(&self) -> StorageResult<()> {
        info!("Initializing SQLite document store with migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn row_to_document(row: &SqliteRow) -> StorageResult<Document> {
        let id: String = row.try_get("id")?;
        let data: String = row.try_get("data")?;
        match serde_json::from_str(&data)? {
            Value::Object(map) => Ok(Document::new(id, map)),
            _ => Err(StorageError::Database(format!(
                "Document {} is not a JSON object",
                id
            ))),
        }
    }

    fn rows_to_documents(rows: &[SqliteRow]) -> StorageResult<Vec<Document>> {
        rows.iter().map(Self::row_to_document).collect()
    }

    /// JSON path for a top-level field, quoted so any field name is safe
    fn json_path(field: &str) -> String {
        format!("$.\"{}\"", field.replace('"', "\\\""))
    }

    async fn fetch_in_tx(
        tx: &mut Transaction<'_, Sqlite>,
        target: &DocRef,
    ) -> StorageResult<Option<Document>> {
        let row = sqlx::query("SELECT id, data FROM documents WHERE collection = ? AND id = ?")
            .bind(target.collection.as_str())
            .bind(&target.id)
            .fetch_optional(&mut **tx)
            .await?;
        row.as_ref().map(Self::row_to_document).transpose()
    }

    async fn write_in_tx(
        tx: &mut Transaction<'_, Sqlite>,
        collection: Collection,
        document: &Document,
    ) -> StorageResult<()> {
        let tenant_id = document.tenant_id().ok_or(StorageError::MissingTenant)?;
        let data = serde_json::to_string(&document.data)?;

        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, tenant_id, data, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (collection, id) DO UPDATE SET
                tenant_id = excluded.tenant_id,
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(collection.as_str())
        .bind(&document.id)
        .bind(tenant_id)
        .bind(data)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn patch_in_tx(
        tx: &mut Transaction<'_, Sqlite>,
        target: &DocRef,
        patch: &Patch,
    ) -> StorageResult<DocumentChange> {
        let before = Self::fetch_in_tx(tx, target)
            .await?
            .ok_or_else(|| target.not_found())?;
        let mut after = before.clone();
        after.apply(patch);
        Self::write_in_tx(tx, target.collection, &after).await?;
        Ok(DocumentChange::new(
            target.collection,
            Some(before),
            Some(after),
        ))
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get_by_id(&self, collection: Collection, id: &str) -> StorageResult<Option<Document>> {
        let row = sqlx::query("SELECT id, data FROM documents WHERE collection = ? AND id = ?")
            .bind(collection.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_document).transpose()
    }

    async fn query_equals(
        &self,
        collection: Collection,
        field: &str,
        value: &Value,
        tenant_id: &str,
    ) -> StorageResult<Vec<Document>> {
        let rows = sqlx::query(
            r#"
            SELECT id, data FROM documents
            WHERE collection = ? AND tenant_id = ?
            AND json_extract(data, ?) = json_extract(?, '$')
            ORDER BY id
            "#,
        )
        .bind(collection.as_str())
        .bind(tenant_id)
        .bind(Self::json_path(field))
        .bind(serde_json::to_string(value)?)
        .fetch_all(&self.pool)
        .await?;
        Self::rows_to_documents(&rows)
    }

    async fn query_in(
        &self,
        collection: Collection,
        field: &str,
        values: &[Value],
        tenant_id: &str,
    ) -> StorageResult<Vec<Document>> {
        if values.len() > self.in_query_limit {
            return Err(StorageError::InQueryLimitExceeded {
                requested: values.len(),
                limit: self.in_query_limit,
            });
        }
        if values.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT id, data FROM documents
            WHERE collection = ? AND tenant_id = ?
            AND json_extract(data, ?) IN (SELECT value FROM json_each(?))
            ORDER BY id
            "#,
        )
        .bind(collection.as_str())
        .bind(tenant_id)
        .bind(Self::json_path(field))
        .bind(serde_json::to_string(values)?)
        .fetch_all(&self.pool)
        .await?;
        Self::rows_to_documents(&rows)
    }

    async fn query_array_contains(
        &self,
        collection: Collection,
        field: &str,
        value: &Value,
        tenant_id: &str,
    ) -> StorageResult<Vec<Document>> {
        let rows = sqlx::query(
            r#"
            SELECT id, data FROM documents
            WHERE collection = ? AND tenant_id = ?
            AND json_type(data, ?) = 'array'
            AND EXISTS (
                SELECT 1 FROM json_each(documents.data, ?) AS member
                WHERE member.value = json_extract(?, '$')
            )
            ORDER BY id
            "#,
        )
        .bind(collection.as_str())
        .bind(tenant_id)
        .bind(Self::json_path(field))
        .bind(Self::json_path(field))
        .bind(serde_json::to_string(value)?)
        .fetch_all(&self.pool)
        .await?;
        Self::rows_to_documents(&rows)
    }

    async fn update(&self, target: &DocRef, patch: &Patch) -> StorageResult<()> {
        let _writer = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let change = Self::patch_in_tx(&mut tx, target, patch).await?;
        tx.commit().await?;

        debug!("Updated {}", target);
        self.feed.publish(change);
        Ok(())
    }

    async fn atomic_batch_update(&self, updates: &[BatchUpdate]) -> StorageResult<()> {
        let _writer = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let mut changes = Vec::with_capacity(updates.len());
        for update in updates {
            // Dropping the transaction on error rolls back earlier patches
            changes.push(Self::patch_in_tx(&mut tx, &update.target, &update.patch).await?);
        }
        tx.commit().await?;

        debug!("Committed batch of {} updates", changes.len());
        for change in changes {
            self.feed.publish(change);
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentWriter for SqliteStore {
    async fn put(
        &self,
        collection: Collection,
        document: Document,
    ) -> StorageResult<DocumentChange> {
        if document.tenant_id().is_none() {
            return Err(StorageError::MissingTenant);
        }

        let _writer = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let before =
            Self::fetch_in_tx(&mut tx, &DocRef::new(collection, document.id.clone())).await?;
        Self::write_in_tx(&mut tx, collection, &document).await?;
        tx.commit().await?;

        let change = DocumentChange::new(collection, before, Some(document));
        self.feed.publish(change.clone());
        Ok(change)
    }

    async fn delete(&self, collection: Collection, id: &str) -> StorageResult<DocumentChange> {
        let _writer = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let before = Self::fetch_in_tx(&mut tx, &DocRef::new(collection, id)).await?;
        sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(collection.as_str())
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        let change = DocumentChange::new(collection, before, None);
        self.feed.publish(change.clone());
        Ok(change)
    }

    fn subscribe(&self) -> broadcast::Receiver<DocumentChange> {
        self.feed.subscribe()
    }
}
