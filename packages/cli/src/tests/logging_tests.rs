use crate::logging::env_filter;

#[test]
fn test_explicit_filter_is_used() {
    let filter = env_filter(Some("caseflow_reconcile=debug"));
    assert_eq!(filter.to_string(), "caseflow_reconcile=debug");
}

#[test]
fn test_missing_filter_falls_back() {
    let filter = env_filter(None);
    assert!(!filter.to_string().is_empty());
}
