// ABOUTME: Runtime settings for the reconciliation core
// ABOUTME: Environment variable names and parsing with defaults

pub mod constants;
pub mod settings;

pub use settings::{ConfigError, ReconcileSettings};
