// ABOUTME: Recomputes a project's feature/story/test case counts from scratch
// ABOUTME: Membership queries are fanned out in chunks no larger than the store ceiling

use caseflow_core::{fields, Collection, Project, ProjectStats, IN_QUERY_LIMIT};
use caseflow_storage::{DocRef, Document, DocumentStore, Patch, StorageError};
use chrono::Utc;
use futures::future::try_join_all;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::partition::partition;
use crate::{ReconcileError, ReconcileResult};

/// Result of one recount
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecountOutcome {
    Updated {
        project_id: String,
        stats: ProjectStats,
    },
    /// The project document was gone when the stats were written
    ProjectMissing { project_id: String },
}

impl RecountOutcome {
    pub fn project_id(&self) -> &str {
        match self {
            RecountOutcome::Updated { project_id, .. }
            | RecountOutcome::ProjectMissing { project_id } => project_id,
        }
    }

    pub fn stats(&self) -> Option<ProjectStats> {
        match self {
            RecountOutcome::Updated { stats, .. } => Some(*stats),
            RecountOutcome::ProjectMissing { .. } => None,
        }
    }
}

pub struct AggregateEngine {
    store: Arc<dyn DocumentStore>,
    in_query_limit: usize,
}

impl AggregateEngine {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_in_query_limit(store, IN_QUERY_LIMIT)
    }

    pub fn with_in_query_limit(store: Arc<dyn DocumentStore>, in_query_limit: usize) -> Self {
        Self {
            store,
            in_query_limit: in_query_limit.max(1),
        }
    }

    /// Count descendants without writing anything
    pub async fn compute_stats(
        &self,
        project_id: &str,
        tenant_id: &str,
    ) -> ReconcileResult<ProjectStats> {
        let features = self
            .store
            .query_equals(
                Collection::Features,
                fields::PROJECT_ID,
                &Value::String(project_id.to_string()),
                tenant_id,
            )
            .await?;

        if features.is_empty() {
            debug!(project_id, tenant_id, "Project has no features");
            return Ok(ProjectStats::EMPTY);
        }
        let feature_ids = ids_of(&features);

        let story_ids = self
            .children_of(Collection::Stories, fields::FEATURE_ID, &feature_ids, tenant_id)
            .await?;

        let test_case_count = if story_ids.is_empty() {
            0
        } else {
            self.children_of(Collection::TestCases, fields::STORY_ID, &story_ids, tenant_id)
                .await?
                .len()
        };

        Ok(ProjectStats {
            feature_count: feature_ids.len() as u64,
            story_count: story_ids.len() as u64,
            test_case_count: test_case_count as u64,
        })
    }

    /// Recount and write the project's stats.
    ///
    /// The write happens only after every count is known; a failed query
    /// leaves the stored stats untouched.
    pub async fn recount(
        &self,
        project_id: &str,
        tenant_id: &str,
    ) -> ReconcileResult<RecountOutcome> {
        let recount_err = |source: StorageError| ReconcileError::Recount {
            project_id: project_id.to_string(),
            source,
        };

        let stats = match self.compute_stats(project_id, tenant_id).await {
            Ok(stats) => stats,
            Err(ReconcileError::Storage(source)) => return Err(recount_err(source)),
            Err(other) => return Err(other),
        };

        let patch = Patch::new()
            .set(fields::STATS, stats)
            .and_then(|patch| patch.set(fields::UPDATED_AT, Utc::now()))
            .map_err(recount_err)?;

        match self
            .store
            .update(&DocRef::new(Collection::Projects, project_id), &patch)
            .await
        {
            Ok(()) => {
                info!(project_id, tenant_id, "Recounted project stats: {}", stats);
                Ok(RecountOutcome::Updated {
                    project_id: project_id.to_string(),
                    stats,
                })
            }
            Err(err) if err.is_not_found() => {
                warn!(project_id, tenant_id, "Project not found, stats not written");
                Ok(RecountOutcome::ProjectMissing {
                    project_id: project_id.to_string(),
                })
            }
            Err(err) => Err(recount_err(err)),
        }
    }

    /// Recount every project in the tenant, one after another
    pub async fn recount_tenant(&self, tenant_id: &str) -> ReconcileResult<Vec<RecountOutcome>> {
        let projects = self
            .store
            .query_equals(
                Collection::Projects,
                fields::TENANT_ID,
                &Value::String(tenant_id.to_string()),
                tenant_id,
            )
            .await?;

        info!(tenant_id, "Backfilling stats for {} project(s)", projects.len());

        let mut outcomes = Vec::with_capacity(projects.len());
        for doc in &projects {
            let project: Project = doc.decode()?;
            outcomes.push(self.recount(&project.id, tenant_id).await?);
        }
        Ok(outcomes)
    }

    /// Ids of every `collection` document whose `parent_field` is one of `parent_ids`
    async fn children_of(
        &self,
        collection: Collection,
        parent_field: &str,
        parent_ids: &[String],
        tenant_id: &str,
    ) -> ReconcileResult<Vec<String>> {
        let chunks = partition(parent_ids, self.in_query_limit);
        debug!(
            tenant_id,
            "Querying {} by {} in {} chunk(s)",
            collection,
            parent_field,
            chunks.len()
        );

        let queries = chunks.into_iter().map(move |chunk| {
            let values: Vec<Value> = chunk.into_iter().map(Value::String).collect();
            async move {
                self.store
                    .query_in(collection, parent_field, &values, tenant_id)
                    .await
            }
        });

        // Chunks are disjoint, so results are summed without deduplication
        let results = try_join_all(queries).await?;
        Ok(results.iter().flat_map(|docs| ids_of(docs)).collect())
    }
}

fn ids_of(docs: &[Document]) -> Vec<String> {
    docs.iter().map(|doc| doc.id.clone()).collect()
}
