use contracts::{
    ApiError, BalanceSnapshot, CreditRequest, EconomyConfig, ErrorCode, LedgerEntry,
    SCHEMA_VERSION_V1,
};

/// Validate a credit request before any write. Shape checks come first so a
/// malformed request is rejected without touching the store.
pub fn validate_credit(request: &CreditRequest, config: &EconomyConfig) -> Option<ApiError> {
    if request.schema_version != SCHEMA_VERSION_V1 {
        return Some(ApiError::new(
            ErrorCode::ValidationFailed,
            "Unsupported schema_version",
            Some(format!(
                "got={} expected={}",
                request.schema_version, SCHEMA_VERSION_V1
            )),
        ));
    }

    if request.user_id.trim().is_empty() {
        return Some(ApiError::new(
            ErrorCode::ValidationFailed,
            "user_id must not be empty",
            None,
        ));
    }

    if request.idempotency_key.trim().is_empty() {
        return Some(ApiError::new(
            ErrorCode::ValidationFailed,
            "idempotency_key must not be empty",
            None,
        ));
    }

    if request.delta_coins == 0 && request.delta_lives == 0 {
        return Some(ApiError::new(
            ErrorCode::ValidationFailed,
            "credit must change at least one resource",
            None,
        ));
    }

    if request.delta_coins.abs() > config.max_abs_delta_coins {
        return Some(ApiError::new(
            ErrorCode::ValidationFailed,
            "delta_coins exceeds sanity ceiling",
            Some(format!(
                "delta_coins={} ceiling={}",
                request.delta_coins, config.max_abs_delta_coins
            )),
        ));
    }

    if request.delta_lives.abs() > config.max_abs_delta_lives {
        return Some(ApiError::new(
            ErrorCode::ValidationFailed,
            "delta_lives exceeds sanity ceiling",
            Some(format!(
                "delta_lives={} ceiling={}",
                request.delta_lives, config.max_abs_delta_lives
            )),
        ));
    }

    None
}

/// Apply one ledger delta to a cached aggregate. Lives clamp at zero on the
/// downside only: bonus credits may legitimately push lives above
/// `max_lives`, and only natural regeneration respects the cap.
pub fn apply_delta(balance: &BalanceSnapshot, delta_coins: i64, delta_lives: i64) -> BalanceSnapshot {
    let mut next = balance.clone();
    next.coins += delta_coins;
    next.lives = (next.lives + delta_lives).max(0);
    next
}

/// Replay a user's ledger into a fresh aggregate: the repair path for a
/// snapshot that is suspected to have drifted from the source of truth.
/// Entries are replayed in creation order with the same zero clamp the live
/// path uses. Regeneration is not ledgered and is not reconstructed here;
/// `last_regen_at_ms` restarts at `now_ms`.
pub fn replay_entries(
    user_id: &str,
    max_lives: i64,
    entries: &[LedgerEntry],
    now_ms: i64,
) -> BalanceSnapshot {
    let mut ordered: Vec<&LedgerEntry> = entries
        .iter()
        .filter(|entry| entry.user_id == user_id)
        .collect();
    ordered.sort_by(|a, b| {
        a.created_at_ms
            .cmp(&b.created_at_ms)
            .then_with(|| a.entry_id.cmp(&b.entry_id))
    });

    let mut balance = BalanceSnapshot::new_empty(user_id, max_lives, now_ms);
    for entry in ordered {
        balance = apply_delta(&balance, entry.delta_coins, entry.delta_lives);
    }
    balance
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::CreditSource;

    fn request(delta_coins: i64, delta_lives: i64, key: &str) -> CreditRequest {
        CreditRequest::new("user_1", delta_coins, delta_lives, CreditSource::Promo, key)
    }

    fn entry(id: &str, delta_coins: i64, delta_lives: i64, created_at_ms: i64) -> LedgerEntry {
        LedgerEntry {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            entry_id: id.to_string(),
            user_id: "user_1".to_string(),
            delta_coins,
            delta_lives,
            source: CreditSource::Promo,
            idempotency_key: format!("key-{id}"),
            correlation_id: None,
            metadata: Default::default(),
            created_at_ms,
        }
    }

    #[test]
    fn rejects_empty_idempotency_key() {
        let config = EconomyConfig::default();
        let error = validate_credit(&request(10, 0, "  "), &config).expect("should reject");
        assert_eq!(error.error_code, ErrorCode::ValidationFailed);
    }

    #[test]
    fn rejects_zero_delta() {
        let config = EconomyConfig::default();
        assert!(validate_credit(&request(0, 0, "key"), &config).is_some());
    }

    #[test]
    fn rejects_delta_beyond_ceiling() {
        let config = EconomyConfig::default();
        let error = validate_credit(&request(config.max_abs_delta_coins + 1, 0, "key"), &config)
            .expect("should reject");
        assert!(error.details.expect("details").contains("ceiling"));
    }

    #[test]
    fn accepts_plain_credit() {
        let config = EconomyConfig::default();
        assert!(validate_credit(&request(500, 5, "sess-1"), &config).is_none());
    }

    #[test]
    fn apply_clamps_lives_at_zero_but_not_at_cap() {
        let base = BalanceSnapshot {
            user_id: "user_1".to_string(),
            coins: 100,
            lives: 4,
            max_lives: 5,
            last_regen_at_ms: 0,
        };

        let above_cap = apply_delta(&base, 0, 10);
        assert_eq!(above_cap.lives, 14, "bonus lives may exceed max_lives");

        let floored = apply_delta(&base, -500, -10);
        assert_eq!(floored.lives, 0);
        assert_eq!(floored.coins, -400, "coins are not clamped");
    }

    #[test]
    fn replay_orders_by_creation_and_clamps_per_step() {
        // A debit that lands before the matching credit must clamp at zero
        // in replay just as it did live.
        let entries = vec![
            entry("b", 0, 3, 200),
            entry("a", 50, -5, 100),
            entry("c", -20, 0, 300),
        ];

        let replayed = replay_entries("user_1", 5, &entries, 1_000);
        assert_eq!(replayed.coins, 30);
        assert_eq!(replayed.lives, 3);
        assert_eq!(replayed.last_regen_at_ms, 1_000);
    }

    #[test]
    fn replay_ignores_other_users() {
        let mut foreign = entry("x", 999, 9, 100);
        foreign.user_id = "user_2".to_string();
        let replayed = replay_entries("user_1", 5, &[foreign], 0);
        assert_eq!(replayed.coins, 0);
        assert_eq!(replayed.lives, 0);
    }
}
