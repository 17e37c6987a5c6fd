// ABOUTME: Document store abstraction shared by the reconciliation engine and its collaborators
// ABOUTME: Defines the store traits, error type, and re-exports the memory and SQLite backends

use async_trait::async_trait;
use caseflow_core::{Collection, Entity};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

pub mod document;
pub mod feed;
pub mod memory;
pub mod sqlite;

pub use document::{BatchUpdate, DocRef, Document, DocumentChange, Patch};
pub use feed::ChangeFeed;
pub use memory::{MemoryStore, OpCounts, StoreOp};
pub use sqlite::{SqliteStore, StorageConfig};

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("Sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: Collection, id: String },
    #[error("Membership query with {requested} values exceeds the limit of {limit}")]
    InQueryLimitExceeded { requested: usize, limit: usize },
    #[error("Document has no tenant_id")]
    MissingTenant,
    #[error("Failed to decode {collection}/{id}: {source}")]
    Decode {
        collection: Collection,
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Injected failure on {0}")]
    Injected(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Read/update surface the reconciliation engine depends on.
///
/// Every query is scoped to one tenant. `query_in` accepts at most the store's
/// membership ceiling; callers partition larger id sets themselves.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_by_id(&self, collection: Collection, id: &str) -> StorageResult<Option<Document>>;

    async fn query_equals(
        &self,
        collection: Collection,
        field: &str,
        value: &Value,
        tenant_id: &str,
    ) -> StorageResult<Vec<Document>>;

    async fn query_in(
        &self,
        collection: Collection,
        field: &str,
        values: &[Value],
        tenant_id: &str,
    ) -> StorageResult<Vec<Document>>;

    async fn query_array_contains(
        &self,
        collection: Collection,
        field: &str,
        value: &Value,
        tenant_id: &str,
    ) -> StorageResult<Vec<Document>>;

    /// Merge `patch` into one existing document
    async fn update(&self, target: &DocRef, patch: &Patch) -> StorageResult<()>;

    /// Apply every update or none of them
    async fn atomic_batch_update(&self, updates: &[BatchUpdate]) -> StorageResult<()>;
}

/// Create/replace/delete surface used by external CRUD collaborators.
///
/// Each write reports the before/after snapshots it produced and publishes
/// them on the change feed.
#[async_trait]
pub trait DocumentWriter: Send + Sync {
    async fn put(&self, collection: Collection, document: Document)
        -> StorageResult<DocumentChange>;

    async fn delete(&self, collection: Collection, id: &str) -> StorageResult<DocumentChange>;

    fn subscribe(&self) -> broadcast::Receiver<DocumentChange>;
}

/// Typed convenience over [`DocumentWriter`]
#[async_trait]
pub trait DocumentWriterExt: DocumentWriter {
    async fn put_entity<T: Entity>(&self, entity: &T) -> StorageResult<DocumentChange> {
        let document = Document::from_entity(entity)?;
        self.put(T::COLLECTION, document).await
    }
}

impl<W: DocumentWriter + ?Sized> DocumentWriterExt for W {}
