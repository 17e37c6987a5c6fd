// ABOUTME: Resolves the project a test case belongs to
// ABOUTME: Uses the denormalized pointer when present, otherwise walks story -> feature

use caseflow_core::{Collection, Entity, Feature, Story, TestCase};
use caseflow_storage::{DocumentStore, StorageError};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::ReconcileResult;

/// Why a test case could not be tied to a project
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvedReason {
    StoryNotFound { story_id: String },
    FeatureNotFound { feature_id: String },
    Malformed { collection: Collection, id: String },
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnresolvedReason::StoryNotFound { story_id } => {
                write!(f, "story {} not found", story_id)
            }
            UnresolvedReason::FeatureNotFound { feature_id } => {
                write!(f, "feature {} not found", feature_id)
            }
            UnresolvedReason::Malformed { collection, id } => {
                write!(f, "{}/{} is malformed", collection, id)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ancestry {
    Resolved(String),
    Unresolvable(UnresolvedReason),
}

impl Ancestry {
    pub fn project_id(&self) -> Option<&str> {
        match self {
            Ancestry::Resolved(id) => Some(id),
            Ancestry::Unresolvable(_) => None,
        }
    }
}

pub struct AncestryResolver {
    store: Arc<dyn DocumentStore>,
}

impl AncestryResolver {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Resolve the owning project.
    ///
    /// Zero reads when the pointer is denormalized, at most two point reads
    /// otherwise. Missing parents are an outcome, not an error.
    pub async fn resolve(&self, test_case: &TestCase) -> ReconcileResult<Ancestry> {
        if let Some(project_id) = test_case.denormalized_project_id() {
            return Ok(Ancestry::Resolved(project_id.to_string()));
        }

        debug!(
            test_case_id = %test_case.id,
            story_id = %test_case.story_id,
            "Legacy test case without project_id, walking ancestry"
        );

        let story: Story = match self.load(&test_case.story_id).await? {
            Loaded::Found(story) => story,
            Loaded::Missing => {
                warn!(
                    test_case_id = %test_case.id,
                    "Story {} not found, skipping", test_case.story_id
                );
                return Ok(Ancestry::Unresolvable(UnresolvedReason::StoryNotFound {
                    story_id: test_case.story_id.clone(),
                }));
            }
            Loaded::Malformed(reason) => return Ok(Ancestry::Unresolvable(reason)),
        };

        let feature: Feature = match self.load(&story.feature_id).await? {
            Loaded::Found(feature) => feature,
            Loaded::Missing => {
                warn!(
                    test_case_id = %test_case.id,
                    "Feature {} not found, skipping", story.feature_id
                );
                return Ok(Ancestry::Unresolvable(UnresolvedReason::FeatureNotFound {
                    feature_id: story.feature_id,
                }));
            }
            Loaded::Malformed(reason) => return Ok(Ancestry::Unresolvable(reason)),
        };

        Ok(Ancestry::Resolved(feature.project_id))
    }

    async fn load<T: Entity>(&self, id: &str) -> ReconcileResult<Loaded<T>> {
        let Some(doc) = self.store.get_by_id(T::COLLECTION, id).await? else {
            return Ok(Loaded::Missing);
        };
        match doc.decode::<T>() {
            Ok(entity) => Ok(Loaded::Found(entity)),
            Err(StorageError::Decode {
                collection,
                id,
                source,
            }) => {
                warn!("Skipping malformed {}/{}: {}", collection, id, source);
                Ok(Loaded::Malformed(UnresolvedReason::Malformed { collection, id }))
            }
            Err(other) => Err(other.into()),
        }
    }
}

enum Loaded<T> {
    Found(T),
    Missing,
    Malformed(UnresolvedReason),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockStore;
    use caseflow_storage::{Document, DocumentWriter, DocumentWriterExt, MemoryStore};
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    fn test_case(story: &str, project: Option<&str>) -> TestCase {
        TestCase {
            id: "tc-1".to_string(),
            tenant_id: "acme".to_string(),
            story_id: story.to_string(),
            project_id: project.map(str::to_string),
            title: None,
        }
    }

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .put_entity(&Feature {
                id: "f-1".to_string(),
                tenant_id: "acme".to_string(),
                project_id: "p-1".to_string(),
                name: None,
            })
            .await
            .unwrap();
        store
            .put_entity(&Story {
                id: "s-1".to_string(),
                tenant_id: "acme".to_string(),
                feature_id: "f-1".to_string(),
                name: None,
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_fast_path_performs_no_reads() {
        let mut store = MockStore::new();
        store.expect_get_by_id().times(0);

        let resolver = AncestryResolver::new(Arc::new(store));
        let ancestry = resolver
            .resolve(&test_case("s-1", Some("p-7")))
            .await
            .unwrap();

        assert_eq!(ancestry, Ancestry::Resolved("p-7".to_string()));
    }

    #[tokio::test]
    async fn test_legacy_record_walks_story_and_feature() {
        let store = seeded_store().await;
        let resolver = AncestryResolver::new(store.clone());

        let ancestry = resolver.resolve(&test_case("s-1", None)).await.unwrap();

        assert_eq!(ancestry.project_id(), Some("p-1"));
        assert_eq!(store.op_counts().get_by_id, 2);
        assert_eq!(store.op_counts().reads(), 2);
    }

    #[tokio::test]
    async fn test_empty_pointer_falls_back_to_walk() {
        let store = seeded_store().await;
        let resolver = AncestryResolver::new(store);

        let ancestry = resolver
            .resolve(&test_case("s-1", Some("")))
            .await
            .unwrap();

        assert_eq!(ancestry, Ancestry::Resolved("p-1".to_string()));
    }

    #[tokio::test]
    async fn test_missing_story_is_unresolvable() {
        let store = seeded_store().await;
        let resolver = AncestryResolver::new(store.clone());

        let ancestry = resolver
            .resolve(&test_case("s-gone", None))
            .await
            .unwrap();

        assert_eq!(
            ancestry,
            Ancestry::Unresolvable(UnresolvedReason::StoryNotFound {
                story_id: "s-gone".to_string()
            })
        );
        assert_eq!(store.op_counts().get_by_id, 1);
    }

    #[tokio::test]
    async fn test_missing_feature_is_unresolvable() {
        let store = Arc::new(MemoryStore::new());
        store
            .put_entity(&Story {
                id: "s-1".to_string(),
                tenant_id: "acme".to_string(),
                feature_id: "f-gone".to_string(),
                name: None,
            })
            .await
            .unwrap();
        let resolver = AncestryResolver::new(store);

        let ancestry = resolver.resolve(&test_case("s-1", None)).await.unwrap();

        assert_eq!(
            ancestry,
            Ancestry::Unresolvable(UnresolvedReason::FeatureNotFound {
                feature_id: "f-gone".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let mut store = MockStore::new();
        store.expect_get_by_id().times(1).returning(|_, _| {
            Err(caseflow_storage::StorageError::Database(
                "connection reset".to_string(),
            ))
        });

        let resolver = AncestryResolver::new(Arc::new(store));
        assert!(resolver.resolve(&test_case("s-1", None)).await.is_err());
    }

    #[tokio::test]
    async fn test_malformed_story_is_unresolvable() {
        let store = Arc::new(MemoryStore::new());
        let mut data = serde_json::Map::new();
        data.insert("tenant_id".to_string(), Value::from("acme"));
        store
            .put(Collection::Stories, Document::new("s-1", data))
            .await
            .unwrap();
        let resolver = AncestryResolver::new(store);

        let ancestry = resolver.resolve(&test_case("s-1", None)).await.unwrap();

        assert_eq!(
            ancestry,
            Ancestry::Unresolvable(UnresolvedReason::Malformed {
                collection: Collection::Stories,
                id: "s-1".to_string()
            })
        );
    }
}
