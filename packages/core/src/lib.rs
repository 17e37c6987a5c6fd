// ABOUTME: Core types and constants for Caseflow
// ABOUTME: Foundational package shared by the storage, reconcile, and cli packages

pub mod constants;
pub mod types;

// Re-export main types
pub use types::{
    Collection, Entity, Feature, ParseCollectionError, Project, ProjectStats, Story, TestCase,
    TestPlan,
};

// Re-export constants
pub use constants::{caseflow_dir, default_database_path, fields, IN_QUERY_LIMIT};
