//! Test doubles shared by the unit tests in this crate

use async_trait::async_trait;
use caseflow_core::Collection;
use caseflow_storage::{BatchUpdate, DocRef, Document, DocumentStore, Patch, StorageResult};
use mockall::mock;
use serde_json::Value;

mock! {
    pub Store {}

    #[async_trait]
    impl DocumentStore for Store {
        async fn get_by_id(&self, collection: Collection, id: &str) -> StorageResult<Option<Document>>;
        async fn query_equals(&self, collection: Collection, field: &str, value: &Value, tenant_id: &str) -> StorageResult<Vec<Document>>;
        async fn query_in(&self, collection: Collection, field: &str, values: &[Value], tenant_id: &str) -> StorageResult<Vec<Document>>;
        async fn query_array_contains(&self, collection: Collection, field: &str, value: &Value, tenant_id: &str) -> StorageResult<Vec<Document>>;
        async fn update(&self, target: &DocRef, patch: &Patch) -> StorageResult<()>;
        async fn atomic_batch_update(&self, updates: &[BatchUpdate]) -> StorageResult<()>;
    }
}
