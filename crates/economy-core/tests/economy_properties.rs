use contracts::{
    BalanceSnapshot, CreditSource, EconomyConfig, LedgerEntry, RewardEventType, SpeedToken,
    TokenSource, TokenState, MS_PER_MINUTE, SCHEMA_VERSION_V1,
};
use economy_core::{ledger, regen, rewards};

fn token(granted_at_ms: i64) -> SpeedToken {
    SpeedToken {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        token_id: "token:prop".to_string(),
        user_id: "user_1".to_string(),
        duration_minutes: 15,
        source: TokenSource::Purchase,
        granted_at_ms,
        used_at_ms: None,
        expires_at_ms: None,
    }
}

#[test]
fn token_lifecycle_is_granted_active_expired() {
    let mut t = token(0);
    assert_eq!(t.state(10 * MS_PER_MINUTE), TokenState::Granted);

    // Activation stamps the timestamps; state is derived from them lazily.
    let activated_at = 20 * MS_PER_MINUTE;
    t.used_at_ms = Some(activated_at);
    t.expires_at_ms = Some(activated_at + t.duration_minutes * MS_PER_MINUTE);

    assert_eq!(t.state(activated_at + 1), TokenState::Active);
    assert_eq!(t.remaining_minutes(activated_at), Some(15));

    // No write happens at expiry; the passage of time alone flips the state.
    let after_expiry = activated_at + 15 * MS_PER_MINUTE;
    assert_eq!(t.state(after_expiry), TokenState::Expired);
    assert_eq!(t.remaining_minutes(after_expiry), None);
}

#[test]
fn remaining_minutes_rounds_up_partial_minutes() {
    let mut t = token(0);
    t.used_at_ms = Some(0);
    t.expires_at_ms = Some(15 * MS_PER_MINUTE);

    assert_eq!(t.remaining_minutes(MS_PER_MINUTE / 2), Some(15));
    assert_eq!(t.remaining_minutes(14 * MS_PER_MINUTE + 1), Some(1));
}

#[test]
fn replay_matches_sequential_application() {
    let deltas: [(i64, i64); 6] = [(500, 5), (-200, 0), (0, -9), (120, 2), (-1, -1), (0, 7)];

    let mut live = BalanceSnapshot::new_empty("user_1", 5, 0);
    let mut entries = Vec::new();
    for (index, (delta_coins, delta_lives)) in deltas.iter().enumerate() {
        live = ledger::apply_delta(&live, *delta_coins, *delta_lives);
        entries.push(LedgerEntry {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            entry_id: format!("entry:{index}"),
            user_id: "user_1".to_string(),
            delta_coins: *delta_coins,
            delta_lives: *delta_lives,
            source: CreditSource::Promo,
            idempotency_key: format!("key:{index}"),
            correlation_id: None,
            metadata: Default::default(),
            created_at_ms: index as i64 * 10,
        });
    }

    let replayed = ledger::replay_entries("user_1", 5, &entries, 999);
    assert_eq!(replayed.coins, live.coins);
    assert_eq!(replayed.lives, live.lives);
}

#[test]
fn regeneration_never_exceeds_cap_across_repeated_catchups() {
    let interval = 30 * MS_PER_MINUTE;
    let mut lives = 0;
    let mut anchor = 0;

    for step in 1..=50 {
        let now_ms = step * 17 * MS_PER_MINUTE;
        let outcome = regen::accrue(lives, 5, anchor, interval, now_ms);
        assert!(outcome.lives <= 5, "regeneration crossed the cap");
        assert!(outcome.lives >= lives, "regeneration reduced lives");
        lives = outcome.lives;
        anchor = outcome.last_regen_at_ms;
    }
    assert_eq!(lives, 5);
}

#[test]
fn bonus_lives_survive_regen_but_not_vice_versa() {
    let interval = 30 * MS_PER_MINUTE;

    // The credit path may push lives over the cap...
    let boosted = ledger::apply_delta(&BalanceSnapshot::new_empty("user_1", 5, 0), 0, 8);
    assert_eq!(boosted.lives, 8);

    // ...and the regeneration path must neither trim them nor add to them.
    let outcome = regen::accrue(boosted.lives, 5, 0, interval, 100 * interval);
    assert_eq!(outcome.lives, 8);
    assert_eq!(outcome.next_life_at_ms, None);
}

#[test]
fn end_game_doubles_and_refill_pays_the_bundle() {
    let config = EconomyConfig::default();

    let doubled = rewards::reward_for(RewardEventType::EndGame, 75, &config);
    assert_eq!((doubled.coins, doubled.lives), (150, 0));

    let bundle = rewards::reward_for(RewardEventType::Refill, 75, &config);
    assert_eq!((bundle.coins, bundle.lives), (500, 5));
}
