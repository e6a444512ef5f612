use contracts::{CreditRequest, CreditSource, EconomyConfig, ErrorCode};
use economy_core::ledger::validate_credit;

fn request(delta_coins: i64, delta_lives: i64) -> CreditRequest {
    CreditRequest::new("user_1", delta_coins, delta_lives, CreditSource::Refill, "sess-1")
}

#[test]
fn rejects_unsupported_schema_version() {
    let config = EconomyConfig::default();
    let mut bad = request(10, 0);
    bad.schema_version = "0.9".to_string();

    let error = validate_credit(&bad, &config).expect("should reject");
    assert_eq!(error.error_code, ErrorCode::ValidationFailed);
    assert!(error.details.expect("details").contains("expected=1.0"));
}

#[test]
fn rejects_whitespace_only_identifiers() {
    let config = EconomyConfig::default();

    let mut blank_user = request(10, 0);
    blank_user.user_id = "   ".to_string();
    assert!(validate_credit(&blank_user, &config).is_some());

    let mut blank_key = request(10, 0);
    blank_key.idempotency_key = "\t".to_string();
    assert!(validate_credit(&blank_key, &config).is_some());
}

#[test]
fn ceiling_is_inclusive() {
    let config = EconomyConfig::default();
    assert!(validate_credit(&request(config.max_abs_delta_coins, 0), &config).is_none());
    assert!(validate_credit(&request(config.max_abs_delta_coins + 1, 0), &config).is_some());
    assert!(validate_credit(&request(0, config.max_abs_delta_lives), &config).is_none());
    assert!(validate_credit(&request(0, config.max_abs_delta_lives + 1), &config).is_some());
}

#[test]
fn negative_deltas_within_ceiling_are_valid() {
    // Debits (spend paths) ride the same operation and the same ceilings.
    let config = EconomyConfig::default();
    assert!(validate_credit(&request(-250, -1), &config).is_none());
    assert!(validate_credit(&request(-(config.max_abs_delta_coins + 1), 0), &config).is_some());
}

#[test]
fn one_sided_deltas_are_valid() {
    let config = EconomyConfig::default();
    assert!(validate_credit(&request(0, 1), &config).is_none());
    assert!(validate_credit(&request(1, 0), &config).is_none());
}
