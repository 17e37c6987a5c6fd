// ABOUTME: Operator commands run against a store
// ABOUTME: Thin wrappers over the reconciliation components with store bootstrap

use anyhow::{bail, Context};
use caseflow_config::ReconcileSettings;
use caseflow_core::{Collection, Project};
use caseflow_reconcile::{
    AggregateEngine, CascadeCleanup, DispatchReport, Dispatcher, DispatcherOptions,
    ReconcileResult, RecountOutcome,
};
use caseflow_storage::{DocumentChange, DocumentStore, SqliteStore, StorageConfig, StorageResult};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Open and migrate the SQLite store described by `settings`
pub async fn open_store(settings: &ReconcileSettings) -> StorageResult<Arc<SqliteStore>> {
    let config = StorageConfig {
        path: settings.database_path.clone(),
        max_connections: settings.max_connections,
        in_query_limit: settings.in_query_limit,
        ..StorageConfig::default()
    };
    info!("Opening database at {}", config.path.display());

    let store = SqliteStore::new(config).await?;
    store.initialize().await?;
    Ok(Arc::new(store))
}

pub fn dispatcher_options(settings: &ReconcileSettings) -> DispatcherOptions {
    DispatcherOptions {
        in_query_limit: settings.in_query_limit,
        skip_unchanged_updates: settings.skip_unchanged_updates,
    }
}

/// Recount one project, or every project in the tenant when `project_id` is `None`
pub async fn recount(
    store: Arc<dyn DocumentStore>,
    settings: &ReconcileSettings,
    tenant_id: &str,
    project_id: Option<&str>,
) -> ReconcileResult<Vec<RecountOutcome>> {
    let engine = AggregateEngine::with_in_query_limit(store, settings.in_query_limit);
    match project_id {
        Some(project_id) => Ok(vec![engine.recount(project_id, tenant_id).await?]),
        None => engine.recount_tenant(tenant_id).await,
    }
}

pub async fn cleanup(
    store: Arc<dyn DocumentStore>,
    tenant_id: &str,
    test_case_id: &str,
) -> ReconcileResult<usize> {
    CascadeCleanup::new(store)
        .remove_test_case(test_case_id, tenant_id)
        .await
}

/// Load a serialized change event
pub fn read_change(path: &Path) -> anyhow::Result<DocumentChange> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a valid change event", path.display()))
}

pub async fn replay(
    store: Arc<dyn DocumentStore>,
    settings: &ReconcileSettings,
    change: &DocumentChange,
) -> ReconcileResult<Option<DispatchReport>> {
    Dispatcher::with_options(store, dispatcher_options(settings))
        .on_document_change(change)
        .await
}

/// The stored project record, checked against the tenant
pub async fn stored_project(
    store: Arc<dyn DocumentStore>,
    tenant_id: &str,
    project_id: &str,
) -> anyhow::Result<Project> {
    let Some(doc) = store.get_by_id(Collection::Projects, project_id).await? else {
        bail!("Project '{}' not found", project_id);
    };
    let project: Project = doc.decode()?;
    if project.tenant_id != tenant_id {
        bail!("Project '{}' not found in tenant '{}'", project_id, tenant_id);
    }
    Ok(project)
}
