// ABOUTME: Environment variable name constants
// ABOUTME: Centralized definitions of all environment variable names used across Caseflow

// Storage Configuration
pub const CASEFLOW_DATABASE_PATH: &str = "CASEFLOW_DATABASE_PATH";
pub const CASEFLOW_MAX_CONNECTIONS: &str = "CASEFLOW_MAX_CONNECTIONS";

// Reconciliation
pub const CASEFLOW_IN_QUERY_LIMIT: &str = "CASEFLOW_IN_QUERY_LIMIT";
pub const CASEFLOW_SKIP_UNCHANGED_UPDATES: &str = "CASEFLOW_SKIP_UNCHANGED_UPDATES";

// Logging
pub const CASEFLOW_LOG: &str = "CASEFLOW_LOG";
