// ABOUTME: Removes a deleted test case from every test plan that references it
// ABOUTME: All affected plans are rewritten in one atomic batch

use caseflow_core::{fields, Collection, Entity, TestPlan};
use caseflow_storage::{BatchUpdate, DocRef, Document, DocumentStore, Patch, StorageError};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::{ReconcileError, ReconcileResult};

/// `ids` with every occurrence of `removed` filtered out, order preserved
pub fn without_member(ids: &[String], removed: &str) -> Vec<String> {
    ids.iter().filter(|id| *id != removed).cloned().collect()
}

pub struct CascadeCleanup {
    store: Arc<dyn DocumentStore>,
}

impl CascadeCleanup {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Drop `test_case_id` from every plan in the tenant; returns how many plans changed.
    ///
    /// Either every referencing plan is rewritten or none is.
    pub async fn remove_test_case(
        &self,
        test_case_id: &str,
        tenant_id: &str,
    ) -> ReconcileResult<usize> {
        let cascade_err = |source: StorageError| ReconcileError::Cascade {
            test_case_id: test_case_id.to_string(),
            source,
        };

        let docs = self
            .store
            .query_array_contains(
                Collection::TestPlans,
                fields::TEST_CASE_IDS,
                &Value::String(test_case_id.to_string()),
                tenant_id,
            )
            .await
            .map_err(cascade_err)?;

        if docs.is_empty() {
            debug!(
                test_case_id,
                tenant_id, "Test case is not referenced by any test plan"
            );
            return Ok(0);
        }

        let updates = docs
            .iter()
            .map(|doc| Self::plan_update(doc, test_case_id))
            .collect::<Result<Vec<_>, _>>()
            .map_err(cascade_err)?;

        self.store
            .atomic_batch_update(&updates)
            .await
            .map_err(cascade_err)?;

        info!(
            test_case_id,
            tenant_id,
            "Removed test case from {} test plan(s)",
            updates.len()
        );
        Ok(updates.len())
    }

    fn plan_update(
        doc: &Document,
        test_case_id: &str,
    ) -> Result<BatchUpdate, StorageError> {
        let plan: TestPlan = doc.decode()?;
        let remaining = without_member(&plan.test_case_ids, test_case_id);
        let patch = Patch::new()
            .set(fields::TEST_CASES_COUNT, remaining.len() as u64)?
            .set(fields::TEST_CASE_IDS, remaining)?;
        Ok(BatchUpdate::new(
            DocRef::new(TestPlan::COLLECTION, plan.id),
            patch,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockStore;
    use caseflow_storage::{DocumentWriterExt, MemoryStore, StoreOp};
    use pretty_assertions::assert_eq;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn plan(id: &str, members: &[&str]) -> TestPlan {
        TestPlan {
            id: id.to_string(),
            tenant_id: "acme".to_string(),
            name: None,
            test_case_ids: ids(members),
            test_cases_count: members.len() as u64,
        }
    }

    async fn load_plan(store: &MemoryStore, id: &str) -> TestPlan {
        store
            .get_by_id(Collection::TestPlans, id)
            .await
            .unwrap()
            .unwrap()
            .decode()
            .unwrap()
    }

    #[test]
    fn test_without_member_preserves_order() {
        let result = without_member(&ids(&["a", "x", "b", "c"]), "x");
        assert_eq!(result, ids(&["a", "b", "c"]));
    }

    #[test]
    fn test_without_member_removes_duplicates_of_target() {
        let result = without_member(&ids(&["x", "a", "x"]), "x");
        assert_eq!(result, ids(&["a"]));
    }

    #[tokio::test]
    async fn test_removes_from_every_referencing_plan() {
        let store = Arc::new(MemoryStore::new());
        store.put_entity(&plan("tp-1", &["a", "x", "b"])).await.unwrap();
        store.put_entity(&plan("tp-2", &["x"])).await.unwrap();
        store.put_entity(&plan("tp-3", &["a", "b"])).await.unwrap();

        let cleanup = CascadeCleanup::new(store.clone());
        let cleaned = cleanup.remove_test_case("x", "acme").await.unwrap();

        assert_eq!(cleaned, 2);
        assert_eq!(store.op_counts().atomic_batch_update, 1);

        let tp1 = load_plan(&store, "tp-1").await;
        assert_eq!(tp1.test_case_ids, ids(&["a", "b"]));
        assert_eq!(tp1.test_cases_count, 2);

        let tp2 = load_plan(&store, "tp-2").await;
        assert!(tp2.test_case_ids.is_empty());
        assert_eq!(tp2.test_cases_count, 0);

        assert_eq!(load_plan(&store, "tp-3").await, plan("tp-3", &["a", "b"]));
    }

    #[tokio::test]
    async fn test_unreferenced_test_case_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        store.put_entity(&plan("tp-1", &["a", "b"])).await.unwrap();

        let cleanup = CascadeCleanup::new(store.clone());
        let cleaned = cleanup.remove_test_case("zzz", "acme").await.unwrap();

        assert_eq!(cleaned, 0);
        assert_eq!(store.op_counts().writes(), 0);
        assert_eq!(load_plan(&store, "tp-1").await, plan("tp-1", &["a", "b"]));
    }

    #[tokio::test]
    async fn test_other_tenants_plans_are_untouched() {
        let store = Arc::new(MemoryStore::new());
        let mut foreign = plan("tp-foreign", &["x"]);
        foreign.tenant_id = "globex".to_string();
        store.put_entity(&foreign).await.unwrap();

        let cleanup = CascadeCleanup::new(store.clone());
        assert_eq!(cleanup.remove_test_case("x", "acme").await.unwrap(), 0);
        assert_eq!(load_plan(&store, "tp-foreign").await, foreign);
    }

    #[tokio::test]
    async fn test_batch_failure_is_surfaced_and_leaves_plans_intact() {
        let store = Arc::new(MemoryStore::new());
        store.put_entity(&plan("tp-1", &["a", "x"])).await.unwrap();
        store.put_entity(&plan("tp-2", &["x", "b"])).await.unwrap();
        store.fail_next(StoreOp::AtomicBatchUpdate);

        let cleanup = CascadeCleanup::new(store.clone());
        let err = cleanup.remove_test_case("x", "acme").await.unwrap_err();

        assert!(matches!(
            err,
            ReconcileError::Cascade {
                source: StorageError::Injected(_),
                ..
            }
        ));
        assert_eq!(load_plan(&store, "tp-1").await, plan("tp-1", &["a", "x"]));
        assert_eq!(load_plan(&store, "tp-2").await, plan("tp-2", &["x", "b"]));
    }

    #[tokio::test]
    async fn test_query_failure_skips_batch() {
        let mut store = MockStore::new();
        store
            .expect_query_array_contains()
            .times(1)
            .returning(|_, _, _, _| Err(StorageError::Database("unavailable".to_string())));
        store.expect_atomic_batch_update().times(0);

        let cleanup = CascadeCleanup::new(Arc::new(store));
        assert!(cleanup.remove_test_case("x", "acme").await.is_err());
    }
}
