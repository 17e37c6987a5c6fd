use caseflow_storage::StorageError;
use thiserror::Error;

/// Reconciliation errors
///
/// Not-found conditions never surface here; they are reported as outcomes.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cascade cleanup of test case {test_case_id} failed: {source}")]
    Cascade {
        test_case_id: String,
        #[source]
        source: StorageError,
    },

    #[error("Recount of project {project_id} failed: {source}")]
    Recount {
        project_id: String,
        #[source]
        source: StorageError,
    },
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
