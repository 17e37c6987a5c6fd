use caseflow_core::{default_database_path, IN_QUERY_LIMIT};
use std::env;
use std::num::ParseIntError;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

use crate::constants::{
    CASEFLOW_DATABASE_PATH, CASEFLOW_IN_QUERY_LIMIT, CASEFLOW_LOG, CASEFLOW_MAX_CONNECTIONS,
    CASEFLOW_SKIP_UNCHANGED_UPDATES,
};

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid number for {var}: {value:?}")]
    InvalidNumber {
        var: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("In-query limit {value} is out of valid range (1-{max})")]
    InQueryLimitOutOfRange { value: usize, max: usize },
    #[error("Max connections must be at least 1")]
    NoConnections,
    #[error("Invalid boolean for {var}: {value:?}")]
    InvalidBool { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileSettings {
    pub database_path: PathBuf,
    pub in_query_limit: usize,
    pub skip_unchanged_updates: bool,
    pub max_connections: u32,
    /// Filter directive from CASEFLOW_LOG, if set
    pub log_filter: Option<String>,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            in_query_limit: IN_QUERY_LIMIT,
            skip_unchanged_updates: false,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            log_filter: None,
        }
    }
}

impl ReconcileSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Parse settings from any key/value source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let database_path = get(CASEFLOW_DATABASE_PATH)
            .map(PathBuf::from)
            .unwrap_or(defaults.database_path);

        let in_query_limit = match get(CASEFLOW_IN_QUERY_LIMIT) {
            Some(value) => parse_number::<usize>(CASEFLOW_IN_QUERY_LIMIT, value)?,
            None => defaults.in_query_limit,
        };
        // Store queries reject anything above the store ceiling
        if in_query_limit == 0 || in_query_limit > IN_QUERY_LIMIT {
            return Err(ConfigError::InQueryLimitOutOfRange {
                value: in_query_limit,
                max: IN_QUERY_LIMIT,
            });
        }

        let skip_unchanged_updates = match get(CASEFLOW_SKIP_UNCHANGED_UPDATES) {
            Some(value) => parse_bool(CASEFLOW_SKIP_UNCHANGED_UPDATES, value)?,
            None => defaults.skip_unchanged_updates,
        };

        let max_connections = match get(CASEFLOW_MAX_CONNECTIONS) {
            Some(value) => parse_number::<u32>(CASEFLOW_MAX_CONNECTIONS, value)?,
            None => defaults.max_connections,
        };
        if max_connections == 0 {
            return Err(ConfigError::NoConnections);
        }

        let settings = Self {
            database_path,
            in_query_limit,
            skip_unchanged_updates,
            max_connections,
            log_filter: get(CASEFLOW_LOG),
        };
        debug!(?settings, "Loaded reconcile settings");
        Ok(settings)
    }
}

fn parse_number<T>(var: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr<Err = ParseIntError>,
{
    value
        .parse::<T>()
        .map_err(|source| ConfigError::InvalidNumber { var, value, source })
}

fn parse_bool(var: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool { var, value }),
    }
}
