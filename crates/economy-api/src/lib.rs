//! Engine facade over the SQLite-backed ledger: idempotent credits, the
//! speed-token registry, the two-phase reward session protocol, the balance
//! read model, and the maintenance operations, plus the HTTP server.

mod server;
mod store;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use contracts::{
    ActivationOutcome, ActiveTokenView, ApiError, BalanceSnapshot, BalanceView, CompletionOutcome,
    CreditOutcome, CreditRequest, EconomyConfig, ErrorCode, LedgerEntry, PurchaseFact,
    RewardEventType, RewardSession, SessionStatus, SpeedToken, TokenSource, SCHEMA_VERSION_V1,
};
use economy_core::drift;
use economy_core::inventory::AdInventory;
use economy_core::ledger;
use economy_core::rewards;
use tracing::{debug, info};
use uuid::Uuid;

pub use server::{serve, ServerError};
pub use store::{ActivationResult, CompletionResult, SqliteEconomyStore, StoreError};

const MAX_TOKEN_DURATION_MINUTES: i64 = 24 * 60;

#[derive(Debug)]
pub enum EngineError {
    /// Business-rule rejection the caller must render, never a failure.
    Rejected(ApiError),
    /// Transient store failure; safe to retry with the same inputs.
    Store(StoreError),
}

impl EngineError {
    fn rejected(error_code: ErrorCode, message: impl Into<String>, details: Option<String>) -> Self {
        Self::Rejected(ApiError::new(error_code, message, details))
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(error) => write!(f, "rejected: {error}"),
            Self::Store(error) => write!(f, "store failure: {error}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Caller-asserted identity is only trusted after the external auth
/// collaborator maps the bearer credential to a stable user id.
pub trait IdentityVerifier {
    fn resolve(&self, bearer_token: &str) -> Option<String>;
}

/// Fixed token directory for the CLI server and tests. A deployment swaps
/// in the real verifier behind the same trait.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenDirectory {
    tokens: HashMap<String, String>,
}

impl StaticTokenDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, token: impl Into<String>, user_id: impl Into<String>) {
        self.tokens.insert(token.into(), user_id.into());
    }

    /// Parse "token=user,token=user" pairs, as carried by the
    /// `ECONOMY_AUTH_TOKENS` environment variable.
    pub fn from_pairs(raw: &str) -> Self {
        let mut directory = Self::new();
        for pair in raw.split(',') {
            if let Some((token, user_id)) = pair.split_once('=') {
                let token = token.trim();
                let user_id = user_id.trim();
                if !token.is_empty() && !user_id.is_empty() {
                    directory.insert(token, user_id);
                }
            }
        }
        directory
    }
}

impl IdentityVerifier for StaticTokenDirectory {
    fn resolve(&self, bearer_token: &str) -> Option<String> {
        self.tokens.get(bearer_token).cloned()
    }
}

pub fn wall_clock_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

pub struct EconomyApi {
    config: EconomyConfig,
    store: SqliteEconomyStore,
    inventory: Box<dyn AdInventory + Send>,
}

impl EconomyApi {
    pub fn open(
        config: EconomyConfig,
        path: impl AsRef<Path>,
        inventory: Box<dyn AdInventory + Send>,
    ) -> Result<Self, StoreError> {
        let store = SqliteEconomyStore::open(path)?;
        Ok(Self {
            config,
            store,
            inventory,
        })
    }

    pub fn config(&self) -> &EconomyConfig {
        &self.config
    }

    /// The single choke point for balance changes. Retries with the same
    /// idempotency key converge on the first writer's outcome.
    pub fn credit(&mut self, request: &CreditRequest, now_ms: i64) -> Result<CreditOutcome, EngineError> {
        if let Some(error) = ledger::validate_credit(request, &self.config) {
            return Err(EngineError::Rejected(error));
        }

        let outcome = self
            .store
            .credit(request, &new_entry_id(), now_ms, &self.config)?;
        if !outcome.applied {
            debug!(
                idempotency_key = %request.idempotency_key,
                "credit retry absorbed as no-op"
            );
        }
        Ok(outcome)
    }

    /// Grants carry no collision check: unused tokens may pile up as
    /// inventory. Exclusivity is enforced at activation.
    pub fn grant_token(
        &mut self,
        user_id: &str,
        duration_minutes: i64,
        source: TokenSource,
        now_ms: i64,
    ) -> Result<SpeedToken, EngineError> {
        if user_id.trim().is_empty() {
            return Err(EngineError::rejected(
                ErrorCode::ValidationFailed,
                "user_id must not be empty",
                None,
            ));
        }
        if duration_minutes < 1 || duration_minutes > MAX_TOKEN_DURATION_MINUTES {
            return Err(EngineError::rejected(
                ErrorCode::ValidationFailed,
                "duration_minutes out of range",
                Some(format!(
                    "duration_minutes={duration_minutes} range=1..={MAX_TOKEN_DURATION_MINUTES}"
                )),
            ));
        }

        let token = SpeedToken {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            token_id: new_token_id(),
            user_id: user_id.to_string(),
            duration_minutes,
            source,
            granted_at_ms: now_ms,
            used_at_ms: None,
            expires_at_ms: None,
        };
        self.store.insert_token(&token)?;
        Ok(token)
    }

    pub fn activate_token(
        &mut self,
        user_id: &str,
        now_ms: i64,
    ) -> Result<ActivationOutcome, EngineError> {
        match self.store.activate_token(user_id, now_ms)? {
            ActivationResult::Activated {
                token,
                remaining_unused,
            } => Ok(ActivationOutcome {
                schema_version: SCHEMA_VERSION_V1.to_string(),
                token,
                remaining_unused,
            }),
            ActivationResult::ActiveExists { token } => Err(EngineError::rejected(
                ErrorCode::ActiveTokenExists,
                "a speed boost is already active",
                Some(format!(
                    "remaining_minutes={}",
                    token.remaining_minutes(now_ms).unwrap_or(0)
                )),
            )),
            ActivationResult::NoUnusedTokens => Err(EngineError::rejected(
                ErrorCode::NoUnusedTokens,
                "no unused speed tokens available",
                None,
            )),
        }
    }

    pub fn list_tokens(&self, user_id: &str) -> Result<Vec<SpeedToken>, EngineError> {
        Ok(self.store.list_tokens(user_id)?)
    }

    /// Reporting only; expired tokens need no write to be expired.
    pub fn expired_token_count(&self, user_id: &str, now_ms: i64) -> Result<u64, EngineError> {
        Ok(self.store.expired_token_count(user_id, now_ms)?)
    }

    /// Phase one: reserve eligible ad items and persist a PENDING session
    /// whose id becomes the idempotency key of phase two.
    pub fn start_reward_session(
        &mut self,
        user_id: &str,
        event_type: RewardEventType,
        original_reward: i64,
        now_ms: i64,
    ) -> Result<RewardSession, EngineError> {
        if user_id.trim().is_empty() {
            return Err(EngineError::rejected(
                ErrorCode::ValidationFailed,
                "user_id must not be empty",
                None,
            ));
        }
        if original_reward < 0 {
            return Err(EngineError::rejected(
                ErrorCode::ValidationFailed,
                "original_reward must not be negative",
                Some(format!("original_reward={original_reward}")),
            ));
        }
        let reward = rewards::reward_for(event_type, original_reward, &self.config);
        if reward.coins.abs() > self.config.max_abs_delta_coins {
            return Err(EngineError::rejected(
                ErrorCode::ValidationFailed,
                "computed reward exceeds sanity ceiling",
                Some(format!(
                    "coins={} ceiling={}",
                    reward.coins, self.config.max_abs_delta_coins
                )),
            ));
        }

        let required_watch_count = rewards::required_watch_count(event_type);
        let reserved = self
            .inventory
            .list_eligible(required_watch_count as usize, now_ms);
        if reserved.len() < required_watch_count as usize {
            // Nothing to reserve; no session row is written.
            return Err(EngineError::rejected(
                ErrorCode::NoItemsAvailable,
                "not enough eligible ad items",
                Some(format!(
                    "available={} required={required_watch_count}",
                    reserved.len()
                )),
            ));
        }

        let session = RewardSession {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            session_id: new_session_id(),
            user_id: user_id.to_string(),
            event_type,
            required_watch_count,
            reserved_item_ids: reserved.into_iter().map(|item| item.item_id).collect(),
            original_reward,
            status: SessionStatus::Pending,
            created_at_ms: now_ms,
            completed_at_ms: None,
        };
        self.store.insert_session(&session)?;
        Ok(session)
    }

    /// Phase two: validate watch evidence, credit through the idempotent
    /// choke point keyed by the session id, and close the session.
    pub fn complete_reward_session(
        &mut self,
        session_id: &str,
        watched_item_ids: &[String],
        now_ms: i64,
    ) -> Result<CompletionOutcome, EngineError> {
        let result = self.store.complete_session(
            session_id,
            watched_item_ids.len() as u32,
            &new_entry_id(),
            now_ms,
            &self.config,
        )?;

        match result {
            CompletionResult::Completed(outcome) | CompletionResult::AlreadyCompleted(outcome) => {
                Ok(outcome)
            }
            CompletionResult::NotFound => Err(EngineError::rejected(
                ErrorCode::SessionNotFound,
                "unknown reward session",
                Some(format!("session_id={session_id}")),
            )),
            CompletionResult::ExpiredSession => Err(EngineError::rejected(
                ErrorCode::SessionExpired,
                "reward session can no longer be completed",
                Some(format!("session_id={session_id}")),
            )),
            CompletionResult::InsufficientWatched { required, watched } => {
                Err(EngineError::rejected(
                    ErrorCode::InsufficientWatched,
                    "not enough ad items watched",
                    Some(format!("watched={watched} required={required}")),
                ))
            }
        }
    }

    /// The read model. Regeneration catch-up is materialized
    /// opportunistically first (its own idempotent write); the read itself
    /// never touches the ledger. The caller's request timestamp feeds the
    /// drift estimate so clients can render countdowns on server time.
    pub fn get_balance(
        &mut self,
        user_id: &str,
        client_sent_at_ms: Option<i64>,
        now_ms: i64,
    ) -> Result<BalanceView, EngineError> {
        let snapshot = self
            .store
            .materialize_regen(user_id, &self.config, now_ms)?
            .unwrap_or_else(|| BalanceSnapshot::new_empty(user_id, self.config.max_lives, now_ms));

        let regen = economy_core::regen::accrue(
            snapshot.lives,
            snapshot.max_lives,
            snapshot.last_regen_at_ms,
            self.config.regen_interval_ms(),
            now_ms,
        );

        let active_token = self
            .store
            .active_token(user_id, now_ms)?
            .and_then(|token| {
                let remaining_minutes = token.remaining_minutes(now_ms)?;
                let expires_at_ms = token.expires_at_ms?;
                Some(ActiveTokenView {
                    token_id: token.token_id,
                    expires_at_ms,
                    remaining_minutes,
                })
            });

        Ok(BalanceView {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            user_id: user_id.to_string(),
            coins: snapshot.coins,
            lives: snapshot.lives,
            max_lives: snapshot.max_lives,
            next_life_at_ms: regen.next_life_at_ms,
            active_token,
            clock: drift::clock_info(client_sent_at_ms, now_ms, now_ms),
        })
    }

    /// Consume a verified payment outcome. The payment reference keys the
    /// credit; a token attached to the product uses a deterministic token id
    /// so webhook redelivery cannot mint twice on either leg.
    pub fn apply_purchase(
        &mut self,
        fact: &PurchaseFact,
        now_ms: i64,
    ) -> Result<CreditOutcome, EngineError> {
        if fact.payment_ref.trim().is_empty() {
            return Err(EngineError::rejected(
                ErrorCode::ValidationFailed,
                "payment_ref must not be empty",
                None,
            ));
        }
        if fact.user_id.trim().is_empty() {
            return Err(EngineError::rejected(
                ErrorCode::ValidationFailed,
                "user_id must not be empty",
                None,
            ));
        }
        if fact.product.coins < 0 || fact.product.lives < 0 {
            return Err(EngineError::rejected(
                ErrorCode::ValidationFailed,
                "purchase products only add resources",
                None,
            ));
        }
        let grants_resources = fact.product.coins > 0 || fact.product.lives > 0;
        let token_minutes = fact.product.speed_token_minutes;
        if !grants_resources && token_minutes.is_none() {
            return Err(EngineError::rejected(
                ErrorCode::ValidationFailed,
                "purchase product grants nothing",
                Some(format!("sku={}", fact.product.sku)),
            ));
        }
        if let Some(duration_minutes) = token_minutes {
            if duration_minutes < 1 || duration_minutes > MAX_TOKEN_DURATION_MINUTES {
                return Err(EngineError::rejected(
                    ErrorCode::ValidationFailed,
                    "duration_minutes out of range",
                    Some(format!("duration_minutes={duration_minutes}")),
                ));
            }
        }

        let outcome = if grants_resources {
            let mut request = CreditRequest::new(
                fact.user_id.clone(),
                fact.product.coins,
                fact.product.lives,
                contracts::CreditSource::Purchase,
                fact.payment_ref.clone(),
            );
            request.correlation_id = Some(fact.payment_ref.clone());
            request.metadata.insert(
                "sku".to_string(),
                serde_json::Value::String(fact.product.sku.clone()),
            );
            request.metadata.insert(
                "amount_cents".to_string(),
                serde_json::Value::from(fact.amount_cents),
            );
            self.credit(&request, now_ms)?
        } else {
            let balance = self
                .store
                .load_snapshot(&fact.user_id)?
                .unwrap_or_else(|| {
                    BalanceSnapshot::new_empty(&fact.user_id, self.config.max_lives, now_ms)
                });
            CreditOutcome {
                schema_version: SCHEMA_VERSION_V1.to_string(),
                applied: false,
                balance,
            }
        };

        if let Some(duration_minutes) = token_minutes {
            let token = SpeedToken {
                schema_version: SCHEMA_VERSION_V1.to_string(),
                token_id: format!("token:{}", fact.payment_ref),
                user_id: fact.user_id.clone(),
                duration_minutes,
                source: TokenSource::Purchase,
                granted_at_ms: now_ms,
                used_at_ms: None,
                expires_at_ms: None,
            };
            let inserted = self.store.insert_token(&token)?;
            if !grants_resources {
                // Token-only product: the token insert is the applied signal.
                return Ok(CreditOutcome {
                    applied: inserted,
                    ..outcome
                });
            }
        }

        Ok(outcome)
    }

    pub fn sweep_expired_sessions(&mut self, now_ms: i64) -> Result<u64, EngineError> {
        let cutoff_ms = now_ms - self.config.session_ttl_ms();
        let swept = self.store.sweep_expired_sessions(cutoff_ms)?;
        if swept > 0 {
            info!(swept, "expired stale reward sessions");
        }
        Ok(swept)
    }

    pub fn reconcile_snapshot(
        &mut self,
        user_id: &str,
        now_ms: i64,
    ) -> Result<BalanceSnapshot, EngineError> {
        let rebuilt = self.store.reconcile_snapshot(user_id, &self.config, now_ms)?;
        info!(user_id, coins = rebuilt.coins, lives = rebuilt.lives, "snapshot reconciled from ledger");
        Ok(rebuilt)
    }

    pub fn list_ledger_entries(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, EngineError> {
        Ok(self.store.list_ledger_entries(user_id, limit)?)
    }

    pub fn load_session(&self, session_id: &str) -> Result<Option<RewardSession>, EngineError> {
        Ok(self.store.load_session(session_id)?)
    }

    pub fn list_sessions(&self, user_id: &str) -> Result<Vec<RewardSession>, EngineError> {
        Ok(self.store.list_sessions(user_id)?)
    }
}

fn new_entry_id() -> String {
    format!("entry:{}", Uuid::new_v4())
}

fn new_token_id() -> String {
    format!("token:{}", Uuid::new_v4())
}

fn new_session_id() -> String {
    format!("session:{}", Uuid::new_v4())
}
