use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// CASEFLOW_LOG wins over RUST_LOG; both fall back to `info`
pub fn env_filter(log_filter: Option<&str>) -> EnvFilter {
    if let Some(directive) = log_filter {
        match EnvFilter::try_new(directive) {
            Ok(filter) => return filter,
            Err(e) => eprintln!("Ignoring invalid log filter {:?}: {}", directive, e),
        }
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. Logs go to stderr so command output stays clean.
pub fn init(log_filter: Option<&str>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(log_filter))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
