// ABOUTME: Entry point invoked once per test case write
// ABOUTME: Classifies the write, cascades deletes, resolves the project, and recounts it

use caseflow_core::{Collection, TestCase, IN_QUERY_LIMIT};
use caseflow_storage::{Document, DocumentChange, DocumentStore};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::aggregate::{AggregateEngine, RecountOutcome};
use crate::ancestry::{Ancestry, AncestryResolver, UnresolvedReason};
use crate::cascade::CascadeCleanup;
use crate::event::{ChangeKind, TestCaseChange};
use crate::ReconcileResult;

/// Tuning for a dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherOptions {
    /// Maximum values per membership query
    pub in_query_limit: usize,
    /// Skip the recount for updates that leave story_id and project_id alone
    pub skip_unchanged_updates: bool,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            in_query_limit: IN_QUERY_LIMIT,
            skip_unchanged_updates: false,
        }
    }
}

/// What one invocation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub kind: ChangeKind,
    pub test_case_id: String,
    pub tenant_id: String,
    /// Test plans the deleted id was removed from
    pub plans_cleaned: usize,
    pub recounts: Vec<RecountOutcome>,
    pub unresolved: Option<UnresolvedReason>,
    /// Update left the ancestry untouched and recounting was skipped
    pub short_circuited: bool,
}

impl DispatchReport {
    fn new(change: &TestCaseChange) -> Self {
        Self {
            kind: change.kind(),
            test_case_id: change.test_case_id().to_string(),
            tenant_id: change.tenant_id().to_string(),
            plans_cleaned: 0,
            recounts: Vec::new(),
            unresolved: None,
            short_circuited: false,
        }
    }
}

pub struct Dispatcher {
    resolver: AncestryResolver,
    cascade: CascadeCleanup,
    engine: AggregateEngine,
    options: DispatcherOptions,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_options(store, DispatcherOptions::default())
    }

    pub fn with_options(store: Arc<dyn DocumentStore>, options: DispatcherOptions) -> Self {
        Self {
            resolver: AncestryResolver::new(store.clone()),
            cascade: CascadeCleanup::new(store.clone()),
            engine: AggregateEngine::with_in_query_limit(store, options.in_query_limit),
            options,
        }
    }

    pub fn options(&self) -> DispatcherOptions {
        self.options
    }

    /// Trigger entry point: one call per observed write, either snapshot may be absent
    pub async fn on_change(
        &self,
        before: Option<TestCase>,
        after: Option<TestCase>,
    ) -> ReconcileResult<Option<DispatchReport>> {
        match TestCaseChange::classify(before, after) {
            Some(change) => self.dispatch(change).await.map(Some),
            None => {
                debug!("Change event carried no snapshots, ignoring");
                Ok(None)
            }
        }
    }

    /// Decode a raw store change and dispatch it.
    ///
    /// Changes to other collections are ignored. A snapshot that fails to
    /// decode is logged and dropped, except that a deleted test case is still
    /// removed from its test plans.
    pub async fn on_document_change(
        &self,
        change: &DocumentChange,
    ) -> ReconcileResult<Option<DispatchReport>> {
        match TestCaseChange::from_document_change(change) {
            Ok(Some(change)) => self.dispatch(change).await.map(Some),
            Ok(None) => Ok(None),
            Err(err) => {
                warn!("Undecodable {} change: {}", change.collection, err);
                match (&change.before, &change.after) {
                    (Some(deleted), None) => self.cascade_undecodable(deleted).await,
                    _ => Ok(None),
                }
            }
        }
    }

    /// Cleanup needs only the id and tenant; ancestry and recount are skipped
    async fn cascade_undecodable(
        &self,
        deleted: &Document,
    ) -> ReconcileResult<Option<DispatchReport>> {
        let Some(tenant_id) = deleted.tenant_id() else {
            warn!(test_case_id = %deleted.id, "Deleted test case has no tenant, dropping event");
            return Ok(None);
        };

        let plans_cleaned = self
            .cascade
            .remove_test_case(&deleted.id, tenant_id)
            .await
            .inspect_err(|err| {
                error!(test_case_id = %deleted.id, "Cascade cleanup failed: {}", err);
            })?;

        Ok(Some(DispatchReport {
            kind: ChangeKind::Delete,
            test_case_id: deleted.id.clone(),
            tenant_id: tenant_id.to_string(),
            plans_cleaned,
            recounts: Vec::new(),
            unresolved: Some(UnresolvedReason::Malformed {
                collection: Collection::TestCases,
                id: deleted.id.clone(),
            }),
            short_circuited: false,
        }))
    }

    /// Run cascade (deletes only), ancestry resolution, and recount for one change.
    ///
    /// Store failures are logged and returned so the host can redeliver;
    /// unresolvable ancestry and missing projects are reported, not raised.
    pub async fn dispatch(&self, change: TestCaseChange) -> ReconcileResult<DispatchReport> {
        let mut report = DispatchReport::new(&change);
        let test_case_id = report.test_case_id.clone();
        let tenant_id = report.tenant_id.clone();

        debug!(
            test_case_id = %test_case_id,
            tenant_id = %tenant_id,
            "Dispatching test case {}",
            report.kind
        );

        if let TestCaseChange::Updated { before, after } = &change {
            if self.options.skip_unchanged_updates && !before.ancestry_differs(after) {
                debug!(test_case_id = %test_case_id, "Ancestry unchanged, skipping recount");
                report.short_circuited = true;
                return Ok(report);
            }
        }

        if let TestCaseChange::Deleted(deleted) = &change {
            report.plans_cleaned = self
                .cascade
                .remove_test_case(&deleted.id, &deleted.tenant_id)
                .await
                .inspect_err(|err| {
                    error!(test_case_id = %test_case_id, "Cascade cleanup failed: {}", err);
                })?;
        }

        let project_id = match self.resolve(change.source(), &test_case_id).await? {
            Ancestry::Resolved(project_id) => project_id,
            Ancestry::Unresolvable(reason) => {
                warn!(
                    test_case_id = %test_case_id,
                    tenant_id = %tenant_id,
                    "Cannot resolve project ({}), dropping event",
                    reason
                );
                report.unresolved = Some(reason);
                return Ok(report);
            }
        };

        report
            .recounts
            .push(self.recount(&project_id, &tenant_id).await?);

        // A moved test case also leaves a stale count on its former project
        if let TestCaseChange::Updated { before, after } = &change {
            if before.ancestry_differs(after) {
                if let Ancestry::Resolved(previous) = self.resolve(before, &test_case_id).await? {
                    if previous != project_id {
                        info!(
                            test_case_id = %test_case_id,
                            "Test case moved from project {} to {}", previous, project_id
                        );
                        report
                            .recounts
                            .push(self.recount(&previous, &tenant_id).await?);
                    }
                }
            }
        }

        Ok(report)
    }

    async fn resolve(&self, test_case: &TestCase, test_case_id: &str) -> ReconcileResult<Ancestry> {
        self.resolver.resolve(test_case).await.inspect_err(|err| {
            error!(test_case_id, "Ancestry resolution failed: {}", err);
        })
    }

    async fn recount(&self, project_id: &str, tenant_id: &str) -> ReconcileResult<RecountOutcome> {
        self.engine
            .recount(project_id, tenant_id)
            .await
            .inspect_err(|err| {
                error!(project_id, tenant_id, "Recount failed: {}", err);
            })
    }
}
