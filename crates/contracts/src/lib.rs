//! v1 cross-boundary contracts for the economy engine, API, and persistence.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SCHEMA_VERSION_V1: &str = "1.0";
pub const MS_PER_MINUTE: i64 = 60_000;
pub const MS_PER_HOUR: i64 = 3_600_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EconomyConfig {
    pub schema_version: String,
    pub max_lives: i64,
    pub regen_interval_minutes: i64,
    pub session_ttl_hours: i64,
    pub reward_multiplier: i64,
    pub refill_bundle_coins: i64,
    pub refill_bundle_lives: i64,
    pub max_abs_delta_coins: i64,
    pub max_abs_delta_lives: i64,
}

impl EconomyConfig {
    pub fn regen_interval_ms(&self) -> i64 {
        self.regen_interval_minutes * MS_PER_MINUTE
    }

    pub fn session_ttl_ms(&self) -> i64 {
        self.session_ttl_hours * MS_PER_HOUR
    }
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            max_lives: 5,
            regen_interval_minutes: 30,
            session_ttl_hours: 24,
            reward_multiplier: 2,
            refill_bundle_coins: 500,
            refill_bundle_lives: 5,
            max_abs_delta_coins: 100_000,
            max_abs_delta_lives: 1_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CreditSource {
    DailyGift,
    EndGame,
    Refill,
    Purchase,
    Promo,
}

impl CreditSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DailyGift => "daily_gift",
            Self::EndGame => "end_game",
            Self::Refill => "refill",
            Self::Purchase => "purchase",
            Self::Promo => "promo",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "daily_gift" => Some(Self::DailyGift),
            "end_game" => Some(Self::EndGame),
            "refill" => Some(Self::Refill),
            "purchase" => Some(Self::Purchase),
            "promo" => Some(Self::Promo),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
    Purchase,
    Gift,
    Promo,
}

impl TokenSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Gift => "gift",
            Self::Promo => "promo",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "purchase" => Some(Self::Purchase),
            "gift" => Some(Self::Gift),
            "promo" => Some(Self::Promo),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    Granted,
    Active,
    Expired,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RewardEventType {
    DailyGift,
    EndGame,
    Refill,
}

impl RewardEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DailyGift => "daily_gift",
            Self::EndGame => "end_game",
            Self::Refill => "refill",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "daily_gift" => Some(Self::DailyGift),
            "end_game" => Some(Self::EndGame),
            "refill" => Some(Self::Refill),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Completed,
    Expired,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Expired => "expired",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AdPlatform {
    Youtube,
    Vimeo,
    Dailymotion,
}

impl AdPlatform {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Youtube => "youtube",
            Self::Vimeo => "vimeo",
            Self::Dailymotion => "dailymotion",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "youtube" => Some(Self::Youtube),
            "vimeo" => Some(Self::Vimeo),
            "dailymotion" => Some(Self::Dailymotion),
            _ => None,
        }
    }
}

/// Immutable fact: one balance change, keyed for exactly-once effect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub schema_version: String,
    pub entry_id: String,
    pub user_id: String,
    pub delta_coins: i64,
    pub delta_lives: i64,
    pub source: CreditSource,
    pub idempotency_key: String,
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    pub created_at_ms: i64,
}

/// Cached per-user aggregate, reconcilable against the ledger at all times.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub user_id: String,
    pub coins: i64,
    pub lives: i64,
    pub max_lives: i64,
    pub last_regen_at_ms: i64,
}

impl BalanceSnapshot {
    pub fn new_empty(user_id: impl Into<String>, max_lives: i64, now_ms: i64) -> Self {
        Self {
            user_id: user_id.into(),
            coins: 0,
            lives: 0,
            max_lives,
            last_regen_at_ms: now_ms,
        }
    }
}

impl fmt::Display for BalanceSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "user_id={} coins={} lives={}/{}",
            self.user_id, self.coins, self.lives, self.max_lives
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpeedToken {
    pub schema_version: String,
    pub token_id: String,
    pub user_id: String,
    pub duration_minutes: i64,
    pub source: TokenSource,
    pub granted_at_ms: i64,
    pub used_at_ms: Option<i64>,
    pub expires_at_ms: Option<i64>,
}

impl SpeedToken {
    /// Expiry is lazy: a token is whatever its timestamps say at `now_ms`.
    pub fn state(&self, now_ms: i64) -> TokenState {
        match (self.used_at_ms, self.expires_at_ms) {
            (None, _) => TokenState::Granted,
            (Some(_), Some(expires_at_ms)) if expires_at_ms > now_ms => TokenState::Active,
            _ => TokenState::Expired,
        }
    }

    pub fn is_active(&self, now_ms: i64) -> bool {
        self.state(now_ms) == TokenState::Active
    }

    /// Whole minutes left while active, rounded up so a freshly activated
    /// token reports its full duration.
    pub fn remaining_minutes(&self, now_ms: i64) -> Option<i64> {
        let expires_at_ms = self.expires_at_ms?;
        if self.used_at_ms.is_none() || expires_at_ms <= now_ms {
            return None;
        }
        Some((expires_at_ms - now_ms + MS_PER_MINUTE - 1) / MS_PER_MINUTE)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RewardSession {
    pub schema_version: String,
    pub session_id: String,
    pub user_id: String,
    pub event_type: RewardEventType,
    pub required_watch_count: u32,
    pub reserved_item_ids: Vec<String>,
    pub original_reward: i64,
    pub status: SessionStatus,
    pub created_at_ms: i64,
    pub completed_at_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdItem {
    pub item_id: String,
    pub platform: AdPlatform,
    pub embed_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreditRequest {
    pub schema_version: String,
    pub user_id: String,
    pub delta_coins: i64,
    pub delta_lives: i64,
    pub source: CreditSource,
    pub idempotency_key: String,
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl CreditRequest {
    pub fn new(
        user_id: impl Into<String>,
        delta_coins: i64,
        delta_lives: i64,
        source: CreditSource,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            user_id: user_id.into(),
            delta_coins,
            delta_lives,
            source,
            idempotency_key: idempotency_key.into(),
            correlation_id: None,
            metadata: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreditOutcome {
    pub schema_version: String,
    pub applied: bool,
    pub balance: BalanceSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivationOutcome {
    pub schema_version: String,
    pub token: SpeedToken,
    pub remaining_unused: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionOutcome {
    pub schema_version: String,
    pub applied: bool,
    pub coins_delta: i64,
    pub lives_delta: i64,
    pub balance: BalanceSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActiveTokenView {
    pub token_id: String,
    pub expires_at_ms: i64,
    pub remaining_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClockInfo {
    pub server_received_at_ms: i64,
    pub server_responded_at_ms: i64,
    pub offset_estimate_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceView {
    pub schema_version: String,
    pub user_id: String,
    pub coins: i64,
    pub lives: i64,
    pub max_lives: i64,
    pub next_life_at_ms: Option<i64>,
    pub active_token: Option<ActiveTokenView>,
    pub clock: ClockInfo,
}

/// Verified outcome consumed from the payment collaborator. Its
/// `payment_ref` is reused as the idempotency key of the resulting credit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PurchaseFact {
    pub schema_version: String,
    pub payment_ref: String,
    pub user_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub product: PurchaseProduct,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PurchaseProduct {
    pub sku: String,
    pub coins: i64,
    pub lives: i64,
    pub speed_token_minutes: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationFailed,
    Unauthorized,
    ActiveTokenExists,
    InsufficientWatched,
    NoUnusedTokens,
    NoItemsAvailable,
    SessionNotFound,
    SessionExpired,
    StoreUnavailable,
    InternalError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    pub schema_version: String,
    pub error_code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(error_code: ErrorCode, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            error_code,
            message: message.into(),
            details,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.details {
            Some(details) => write!(f, "{:?}: {} ({details})", self.error_code, self.message),
            None => write!(f, "{:?}: {}", self.error_code, self.message),
        }
    }
}
