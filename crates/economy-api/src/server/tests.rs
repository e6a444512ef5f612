use super::*;

use crate::{StaticTokenDirectory, StoreError};
use contracts::EconomyConfig;
use economy_core::inventory::StaticAdInventory;

fn test_state(name: &str) -> (AppState, std::path::PathBuf) {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time should be monotonic")
        .as_nanos();
    let path = std::env::temp_dir().join(format!("economy_server_{name}_{nanos}.sqlite"));

    let api = EconomyApi::open(
        EconomyConfig::default(),
        &path,
        Box::new(StaticAdInventory::default_catalog()),
    )
    .expect("api should open");

    let mut directory = StaticTokenDirectory::new();
    directory.insert("tok_alpha", "user_alpha");

    (AppState::new(api, Arc::new(directory)), path)
}

#[test]
fn identity_requires_a_known_bearer() {
    let (state, path) = test_state("identity");

    let empty = HeaderMap::new();
    assert!(require_identity(&empty, &state).is_err());

    let mut known = HeaderMap::new();
    known.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok_alpha"));
    assert_eq!(
        require_identity(&known, &state).expect("resolves"),
        "user_alpha"
    );

    let mut unknown = HeaderMap::new();
    unknown.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok_nope"));
    assert!(require_identity(&unknown, &state).is_err());

    let _ = std::fs::remove_file(&path);
}

#[test]
fn engine_errors_map_to_distinct_statuses() {
    let conflict = HttpApiError::from_engine(EngineError::Rejected(ApiError::new(
        ErrorCode::ActiveTokenExists,
        "busy",
        None,
    )));
    assert_eq!(conflict.status, StatusCode::CONFLICT);

    let missing = HttpApiError::from_engine(EngineError::Rejected(ApiError::new(
        ErrorCode::NoUnusedTokens,
        "none",
        None,
    )));
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    let retryable = HttpApiError::from_engine(EngineError::Store(StoreError::Corrupt(
        "boom".to_string(),
    )));
    assert_eq!(retryable.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(retryable.error.error_code, ErrorCode::StoreUnavailable);
}

#[test]
fn ledger_page_size_is_bounded() {
    assert_eq!(bounded_page(None), DEFAULT_LEDGER_PAGE_SIZE);
    assert_eq!(bounded_page(Some(0)), 1);
    assert_eq!(bounded_page(Some(9_999)), MAX_LEDGER_PAGE_SIZE);
}
