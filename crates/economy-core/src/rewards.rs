use contracts::{CreditSource, EconomyConfig, RewardEventType};

/// What a completed reward session credits. The amounts are data, not
/// control flow: the table below is the whole business rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardBundle {
    pub coins: i64,
    pub lives: i64,
}

/// Refill sessions reserve two ad items; every other event type reserves one.
pub fn required_watch_count(event_type: RewardEventType) -> u32 {
    match event_type {
        RewardEventType::Refill => 2,
        RewardEventType::DailyGift | RewardEventType::EndGame => 1,
    }
}

/// Doubling contexts credit `original_reward * reward_multiplier` coins;
/// a refill credits the configured fixed bundle of coins and lives.
pub fn reward_for(
    event_type: RewardEventType,
    original_reward: i64,
    config: &EconomyConfig,
) -> RewardBundle {
    match event_type {
        RewardEventType::DailyGift | RewardEventType::EndGame => RewardBundle {
            coins: original_reward * config.reward_multiplier,
            lives: 0,
        },
        RewardEventType::Refill => RewardBundle {
            coins: config.refill_bundle_coins,
            lives: config.refill_bundle_lives,
        },
    }
}

pub fn credit_source_for(event_type: RewardEventType) -> CreditSource {
    match event_type {
        RewardEventType::DailyGift => CreditSource::DailyGift,
        RewardEventType::EndGame => CreditSource::EndGame,
        RewardEventType::Refill => CreditSource::Refill,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refill_requires_two_watches() {
        assert_eq!(required_watch_count(RewardEventType::Refill), 2);
        assert_eq!(required_watch_count(RewardEventType::DailyGift), 1);
        assert_eq!(required_watch_count(RewardEventType::EndGame), 1);
    }

    #[test]
    fn doubling_contexts_double_the_original_reward() {
        let config = EconomyConfig::default();
        let bundle = reward_for(RewardEventType::EndGame, 150, &config);
        assert_eq!(bundle.coins, 300);
        assert_eq!(bundle.lives, 0);
    }

    #[test]
    fn refill_credits_the_fixed_bundle() {
        let config = EconomyConfig::default();
        let bundle = reward_for(RewardEventType::Refill, 9_999, &config);
        assert_eq!(bundle.coins, config.refill_bundle_coins);
        assert_eq!(bundle.lives, config.refill_bundle_lives);
    }
}
