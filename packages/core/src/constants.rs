use std::env;
use std::path::PathBuf;

/// Maximum number of values a single "field is one of" query accepts
pub const IN_QUERY_LIMIT: usize = 10;

/// Field names shared by every store implementation and query site
pub mod fields {
    pub const TENANT_ID: &str = "tenant_id";
    pub const PROJECT_ID: &str = "project_id";
    pub const FEATURE_ID: &str = "feature_id";
    pub const STORY_ID: &str = "story_id";
    pub const TEST_CASE_IDS: &str = "test_case_ids";
    pub const TEST_CASES_COUNT: &str = "test_cases_count";
    pub const STATS: &str = "stats";
    pub const UPDATED_AT: &str = "updated_at";
}

/// Get the path to the Caseflow directory (~/.caseflow)
pub fn caseflow_dir() -> PathBuf {
    // HOME first so tests can redirect it
    if let Ok(home) = env::var("HOME") {
        PathBuf::from(home).join(".caseflow")
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".caseflow")
    }
}

/// Get the default SQLite database path (~/.caseflow/caseflow.db)
pub fn default_database_path() -> PathBuf {
    caseflow_dir().join("caseflow.db")
}
