// ABOUTME: In-memory document store for tests and short-lived tooling
// ABOUTME: Counts every operation and can inject one-shot failures

use async_trait::async_trait;
use caseflow_core::{Collection, IN_QUERY_LIMIT};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::{
    BatchUpdate, ChangeFeed, DocRef, Document, DocumentChange, DocumentStore, DocumentWriter,
    Patch, StorageError, StorageResult,
};

/// Store operations that can be counted and failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    GetById,
    QueryEquals,
    QueryIn,
    QueryArrayContains,
    Update,
    AtomicBatchUpdate,
}

/// Number of calls made per operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounts {
    pub get_by_id: usize,
    pub query_equals: usize,
    pub query_in: usize,
    pub query_array_contains: usize,
    pub update: usize,
    pub atomic_batch_update: usize,
}

impl OpCounts {
    fn bump(&mut self, op: StoreOp) {
        match op {
            StoreOp::GetById => self.get_by_id += 1,
            StoreOp::QueryEquals => self.query_equals += 1,
            StoreOp::QueryIn => self.query_in += 1,
            StoreOp::QueryArrayContains => self.query_array_contains += 1,
            StoreOp::Update => self.update += 1,
            StoreOp::AtomicBatchUpdate => self.atomic_batch_update += 1,
        }
    }

    /// Reads of any kind
    pub fn reads(&self) -> usize {
        self.get_by_id + self.query_equals + self.query_in + self.query_array_contains
    }

    /// Writes of any kind
    pub fn writes(&self) -> usize {
        self.update + self.atomic_batch_update
    }
}

/// A pending injected failure: fail `op` once `skip` more calls have succeeded
#[derive(Debug)]
struct FailPoint {
    op: StoreOp,
    skip: usize,
}

type Collections = HashMap<Collection, BTreeMap<String, Document>>;

pub struct MemoryStore {
    collections: RwLock<Collections>,
    in_query_limit: usize,
    counts: Mutex<OpCounts>,
    fail_points: Mutex<Vec<FailPoint>>,
    feed: ChangeFeed,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_in_query_limit(IN_QUERY_LIMIT)
    }

    pub fn with_in_query_limit(in_query_limit: usize) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            in_query_limit,
            counts: Mutex::new(OpCounts::default()),
            fail_points: Mutex::new(Vec::new()),
            feed: ChangeFeed::new(),
        }
    }

    /// Snapshot of the operation counters
    pub fn op_counts(&self) -> OpCounts {
        *self
            .counts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn reset_op_counts(&self) {
        *self
            .counts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = OpCounts::default();
    }

    /// Fail the next call of `op`
    pub fn fail_next(&self, op: StoreOp) {
        self.fail_after(op, 0);
    }

    /// Let `skip` calls of `op` succeed, then fail the one after
    pub fn fail_after(&self, op: StoreOp, skip: usize) {
        self.fail_points
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(FailPoint { op, skip });
    }

    /// Number of documents in a collection
    pub async fn len(&self, collection: Collection) -> usize {
        self.collections
            .read()
            .await
            .get(&collection)
            .map_or(0, BTreeMap::len)
    }

    pub async fn is_empty(&self, collection: Collection) -> bool {
        self.len(collection).await == 0
    }

    fn record(&self, op: StoreOp) -> StorageResult<()> {
        self.counts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .bump(op);

        let mut fail_points = self
            .fail_points
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(index) = fail_points.iter().position(|point| point.op == op) {
            if fail_points[index].skip == 0 {
                fail_points.remove(index);
                return Err(StorageError::Injected(format!("{op:?}")));
            }
            fail_points[index].skip -= 1;
        }
        Ok(())
    }

    async fn scan<F>(
        &self,
        collection: Collection,
        tenant_id: &str,
        predicate: F,
    ) -> Vec<Document>
    where
        F: Fn(&Document) -> bool,
    {
        let collections = self.collections.read().await;
        collections
            .get(&collection)
            .into_iter()
            .flat_map(BTreeMap::values)
            .filter(|doc| doc.tenant_id() == Some(tenant_id) && predicate(doc))
            .cloned()
            .collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_by_id(&self, collection: Collection, id: &str) -> StorageResult<Option<Document>> {
        self.record(StoreOp::GetById)?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(&collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn query_equals(
        &self,
        collection: Collection,
        field: &str,
        value: &Value,
        tenant_id: &str,
    ) -> StorageResult<Vec<Document>> {
        self.record(StoreOp::QueryEquals)?;
        Ok(self
            .scan(collection, tenant_id, |doc| doc.field(field) == Some(value))
            .await)
    }

    async fn query_in(
        &self,
        collection: Collection,
        field: &str,
        values: &[Value],
        tenant_id: &str,
    ) -> StorageResult<Vec<Document>> {
        self.record(StoreOp::QueryIn)?;
        if values.len() > self.in_query_limit {
            return Err(StorageError::InQueryLimitExceeded {
                requested: values.len(),
                limit: self.in_query_limit,
            });
        }
        if values.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .scan(collection, tenant_id, |doc| {
                doc.field(field).is_some_and(|v| values.contains(v))
            })
            .await)
    }

    async fn query_array_contains(
        &self,
        collection: Collection,
        field: &str,
        value: &Value,
        tenant_id: &str,
    ) -> StorageResult<Vec<Document>> {
        self.record(StoreOp::QueryArrayContains)?;
        Ok(self
            .scan(collection, tenant_id, |doc| doc.array_contains(field, value))
            .await)
    }

    async fn update(&self, target: &DocRef, patch: &Patch) -> StorageResult<()> {
        self.record(StoreOp::Update)?;
        let change = {
            let mut collections = self.collections.write().await;
            let doc = collections
                .get_mut(&target.collection)
                .and_then(|docs| docs.get_mut(&target.id))
                .ok_or_else(|| target.not_found())?;
            let before = doc.clone();
            doc.apply(patch);
            DocumentChange::new(target.collection, Some(before), Some(doc.clone()))
        };
        debug!("Updated {}", target);
        self.feed.publish(change);
        Ok(())
    }

    async fn atomic_batch_update(&self, updates: &[BatchUpdate]) -> StorageResult<()> {
        self.record(StoreOp::AtomicBatchUpdate)?;
        let changes = {
            let mut collections = self.collections.write().await;

            // Validate every target before touching any of them
            for update in updates {
                let exists = collections
                    .get(&update.target.collection)
                    .is_some_and(|docs| docs.contains_key(&update.target.id));
                if !exists {
                    return Err(update.target.not_found());
                }
            }

            let mut changes = Vec::with_capacity(updates.len());
            for update in updates {
                if let Some(doc) = collections
                    .get_mut(&update.target.collection)
                    .and_then(|docs| docs.get_mut(&update.target.id))
                {
                    let before = doc.clone();
                    doc.apply(&update.patch);
                    changes.push(DocumentChange::new(
                        update.target.collection,
                        Some(before),
                        Some(doc.clone()),
                    ));
                }
            }
            changes
        };
        debug!("Applied batch of {} updates", changes.len());
        for change in changes {
            self.feed.publish(change);
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentWriter for MemoryStore {
    async fn put(
        &self,
        collection: Collection,
        document: Document,
    ) -> StorageResult<DocumentChange> {
        if document.tenant_id().is_none() {
            return Err(StorageError::MissingTenant);
        }
        let change = {
            let mut collections = self.collections.write().await;
            let before = collections
                .entry(collection)
                .or_default()
                .insert(document.id.clone(), document.clone());
            DocumentChange::new(collection, before, Some(document))
        };
        self.feed.publish(change.clone());
        Ok(change)
    }

    async fn delete(&self, collection: Collection, id: &str) -> StorageResult<DocumentChange> {
        let change = {
            let mut collections = self.collections.write().await;
            let before = collections
                .get_mut(&collection)
                .and_then(|docs| docs.remove(id));
            DocumentChange::new(collection, before, None)
        };
        self.feed.publish(change.clone());
        Ok(change)
    }

    fn subscribe(&self) -> broadcast::Receiver<DocumentChange> {
        self.feed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DocumentWriterExt;
    use caseflow_core::{fields, Feature, TestPlan};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn feature(id: &str, tenant: &str, project: &str) -> Feature {
        Feature {
            id: id.to_string(),
            tenant_id: tenant.to_string(),
            project_id: project.to_string(),
            name: None,
        }
    }

    fn plan(id: &str, ids: &[&str]) -> TestPlan {
        TestPlan {
            id: id.to_string(),
            tenant_id: "acme".to_string(),
            name: None,
            test_case_ids: ids.iter().map(|s| s.to_string()).collect(),
            test_cases_count: ids.len() as u64,
        }
    }

    #[tokio::test]
    async fn test_queries_are_tenant_scoped() {
        let store = MemoryStore::new();
        store.put_entity(&feature("f-1", "acme", "p-1")).await.unwrap();
        store.put_entity(&feature("f-2", "globex", "p-1")).await.unwrap();

        let found = store
            .query_equals(Collection::Features, fields::PROJECT_ID, &json!("p-1"), "acme")
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "f-1");
    }

    #[tokio::test]
    async fn test_query_in_enforces_ceiling() {
        let store = MemoryStore::with_in_query_limit(3);
        let values: Vec<Value> = (0..4).map(|i| json!(format!("f-{i}"))).collect();

        let err = store
            .query_in(Collection::Stories, fields::FEATURE_ID, &values, "acme")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StorageError::InQueryLimitExceeded {
                requested: 4,
                limit: 3
            }
        ));
    }

    #[tokio::test]
    async fn test_query_in_with_no_values_matches_nothing() {
        let store = MemoryStore::new();
        store.put_entity(&feature("f-1", "acme", "p-1")).await.unwrap();

        let found = store
            .query_in(Collection::Features, fields::PROJECT_ID, &[], "acme")
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_document_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update(&DocRef::new(Collection::Projects, "nope"), &Patch::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_batch_with_missing_target_applies_nothing() {
        let store = MemoryStore::new();
        store.put_entity(&plan("tp-1", &["a", "b"])).await.unwrap();

        let patch = Patch::new()
            .set(fields::TEST_CASE_IDS, vec!["a"])
            .unwrap()
            .set(fields::TEST_CASES_COUNT, 1)
            .unwrap();
        let updates = vec![
            BatchUpdate::new(DocRef::new(Collection::TestPlans, "tp-1"), patch.clone()),
            BatchUpdate::new(DocRef::new(Collection::TestPlans, "tp-missing"), patch),
        ];

        assert!(store.atomic_batch_update(&updates).await.is_err());

        let stored: TestPlan = store
            .get_by_id(Collection::TestPlans, "tp-1")
            .await
            .unwrap()
            .unwrap()
            .decode()
            .unwrap();
        assert_eq!(stored.test_case_ids, vec!["a", "b"]);
        assert_eq!(stored.test_cases_count, 2);
    }

    #[tokio::test]
    async fn test_fail_after_skips_then_fails_once() {
        let store = MemoryStore::new();
        store.fail_after(StoreOp::GetById, 1);

        assert!(store.get_by_id(Collection::Stories, "s").await.is_ok());
        assert!(matches!(
            store.get_by_id(Collection::Stories, "s").await,
            Err(StorageError::Injected(_))
        ));
        assert!(store.get_by_id(Collection::Stories, "s").await.is_ok());
        assert_eq!(store.op_counts().get_by_id, 3);
    }

    #[tokio::test]
    async fn test_writes_publish_changes() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();

        store.put_entity(&feature("f-1", "acme", "p-1")).await.unwrap();
        store.delete(Collection::Features, "f-1").await.unwrap();
        // Deleting a missing document publishes nothing
        store.delete(Collection::Features, "f-1").await.unwrap();

        let created = rx.try_recv().unwrap();
        assert!(created.before.is_none());
        assert_eq!(created.after.unwrap().id, "f-1");

        let deleted = rx.try_recv().unwrap();
        assert_eq!(deleted.before.unwrap().id, "f-1");
        assert!(deleted.after.is_none());

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_put_requires_tenant() {
        let store = MemoryStore::new();
        let doc = Document::new("x", serde_json::Map::new());
        assert!(matches!(
            store.put(Collection::Features, doc).await,
            Err(StorageError::MissingTenant)
        ));
    }
}
