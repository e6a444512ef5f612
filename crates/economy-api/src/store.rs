use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use contracts::{
    BalanceSnapshot, CompletionOutcome, CreditOutcome, CreditRequest, CreditSource, EconomyConfig,
    LedgerEntry, RewardEventType, RewardSession, SessionStatus, SpeedToken, TokenSource,
    MS_PER_MINUTE, SCHEMA_VERSION_V1,
};
use economy_core::{ledger, regen, rewards};
use rusqlite::{params, Connection, OptionalExtension, Transaction};

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Serde(serde_json::Error),
    Corrupt(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite error: {err}"),
            Self::Serde(err) => write!(f, "serde error: {err}"),
            Self::Corrupt(detail) => write!(f, "corrupt row: {detail}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

#[derive(Debug)]
pub enum ActivationResult {
    Activated {
        token: SpeedToken,
        remaining_unused: u64,
    },
    ActiveExists {
        token: SpeedToken,
    },
    NoUnusedTokens,
}

#[derive(Debug)]
pub enum CompletionResult {
    Completed(CompletionOutcome),
    AlreadyCompleted(CompletionOutcome),
    ExpiredSession,
    NotFound,
    InsufficientWatched { required: u32, watched: u32 },
}

/// All four tables live here; every mutating operation is one transaction,
/// and the `ledger_entries.idempotency_key` uniqueness constraint is the
/// concurrency-control primitive for credits.
#[derive(Debug)]
pub struct SqliteEconomyStore {
    conn: Connection,
}

impl SqliteEconomyStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let mut store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    fn configure(&mut self) -> Result<(), StoreError> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    fn migrate(&mut self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ledger_entries (
                entry_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                delta_coins INTEGER NOT NULL,
                delta_lives INTEGER NOT NULL,
                source TEXT NOT NULL,
                idempotency_key TEXT NOT NULL UNIQUE,
                correlation_id TEXT,
                metadata_json TEXT NOT NULL,
                created_at_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS balance_snapshots (
                user_id TEXT PRIMARY KEY,
                coins INTEGER NOT NULL,
                lives INTEGER NOT NULL,
                max_lives INTEGER NOT NULL,
                last_regen_at_ms INTEGER NOT NULL,
                updated_at_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS speed_tokens (
                token_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                duration_minutes INTEGER NOT NULL,
                source TEXT NOT NULL,
                granted_at_ms INTEGER NOT NULL,
                used_at_ms INTEGER,
                expires_at_ms INTEGER
            );

            CREATE TABLE IF NOT EXISTS reward_sessions (
                session_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                required_watch_count INTEGER NOT NULL,
                reserved_item_ids_json TEXT NOT NULL,
                original_reward INTEGER NOT NULL,
                status TEXT NOT NULL,
                created_at_ms INTEGER NOT NULL,
                completed_at_ms INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_ledger_entries_user_created
                ON ledger_entries(user_id, created_at_ms);
            CREATE INDEX IF NOT EXISTS idx_speed_tokens_user_used
                ON speed_tokens(user_id, used_at_ms);
            CREATE INDEX IF NOT EXISTS idx_reward_sessions_user_status
                ON reward_sessions(user_id, status);
            CREATE INDEX IF NOT EXISTS idx_reward_sessions_status_created
                ON reward_sessions(status, created_at_ms);
            ",
        )?;

        self.conn.execute(
            "INSERT OR IGNORE INTO schema_migrations(version, name, applied_at_ms)
             VALUES(1, 'initial_v1', 0)",
            [],
        )?;

        Ok(())
    }

    /// Apply one credit with exactly-once effect. The ledger insert and the
    /// snapshot adjustment commit together or not at all.
    pub fn credit(
        &mut self,
        request: &CreditRequest,
        entry_id: &str,
        now_ms: i64,
        config: &EconomyConfig,
    ) -> Result<CreditOutcome, StoreError> {
        let tx = self.conn.transaction()?;
        let outcome = credit_in_tx(&tx, request, entry_id, now_ms, config)?;
        tx.commit()?;
        Ok(outcome)
    }

    pub fn load_snapshot(&self, user_id: &str) -> Result<Option<BalanceSnapshot>, StoreError> {
        load_snapshot_any(&self.conn, user_id)
    }

    /// Newest first; the audit read surface.
    pub fn list_ledger_entries(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT entry_id, user_id, delta_coins, delta_lives, source, idempotency_key,
                    correlation_id, metadata_json, created_at_ms
             FROM ledger_entries
             WHERE user_id = ?1
             ORDER BY created_at_ms DESC, entry_id DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![user_id, limit as i64], entry_row)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(entry_from_raw(row?)?);
        }
        Ok(entries)
    }

    /// Insert a token; `INSERT OR IGNORE` on the primary key makes grants
    /// with caller-deterministic ids (purchase intake) redelivery-safe.
    /// Returns whether a row was actually written.
    pub fn insert_token(&mut self, token: &SpeedToken) -> Result<bool, StoreError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO speed_tokens (
                token_id, user_id, duration_minutes, source, granted_at_ms, used_at_ms, expires_at_ms
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                token.token_id,
                token.user_id,
                token.duration_minutes,
                token.source.as_str(),
                token.granted_at_ms,
                token.used_at_ms,
                token.expires_at_ms,
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn active_token(&self, user_id: &str, now_ms: i64) -> Result<Option<SpeedToken>, StoreError> {
        active_token_any(&self.conn, user_id, now_ms)
    }

    pub fn list_tokens(&self, user_id: &str) -> Result<Vec<SpeedToken>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT token_id, user_id, duration_minutes, source, granted_at_ms, used_at_ms, expires_at_ms
             FROM speed_tokens
             WHERE user_id = ?1
             ORDER BY granted_at_ms ASC, token_id ASC",
        )?;

        let rows = stmt.query_map(params![user_id], token_row)?;
        let mut tokens = Vec::new();
        for row in rows {
            tokens.push(token_from_raw(row?)?);
        }
        Ok(tokens)
    }

    /// Activation: collision guard, FIFO pick, conditional consume — one
    /// transaction, so two racing activations can never both succeed.
    pub fn activate_token(
        &mut self,
        user_id: &str,
        now_ms: i64,
    ) -> Result<ActivationResult, StoreError> {
        let tx = self.conn.transaction()?;

        if let Some(token) = active_token_any(&tx, user_id, now_ms)? {
            return Ok(ActivationResult::ActiveExists { token });
        }

        let oldest = tx
            .query_row(
                "SELECT token_id, user_id, duration_minutes, source, granted_at_ms, used_at_ms, expires_at_ms
                 FROM speed_tokens
                 WHERE user_id = ?1 AND used_at_ms IS NULL
                 ORDER BY granted_at_ms ASC, token_id ASC
                 LIMIT 1",
                params![user_id],
                token_row,
            )
            .optional()?;

        let Some(raw) = oldest else {
            return Ok(ActivationResult::NoUnusedTokens);
        };
        let mut token = token_from_raw(raw)?;

        let expires_at_ms = now_ms + token.duration_minutes * MS_PER_MINUTE;
        let updated = tx.execute(
            "UPDATE speed_tokens
             SET used_at_ms = ?1, expires_at_ms = ?2
             WHERE token_id = ?3 AND used_at_ms IS NULL",
            params![now_ms, expires_at_ms, token.token_id],
        )?;

        if updated == 0 {
            // The optimistic check lost: the row was consumed between the
            // select and the update. Report whatever is true now.
            return match active_token_any(&tx, user_id, now_ms)? {
                Some(token) => Ok(ActivationResult::ActiveExists { token }),
                None => Ok(ActivationResult::NoUnusedTokens),
            };
        }

        token.used_at_ms = Some(now_ms);
        token.expires_at_ms = Some(expires_at_ms);

        let remaining_unused: i64 = tx.query_row(
            "SELECT COUNT(*) FROM speed_tokens WHERE user_id = ?1 AND used_at_ms IS NULL",
            params![user_id],
            |row| row.get(0),
        )?;

        tx.commit()?;

        Ok(ActivationResult::Activated {
            token,
            remaining_unused: remaining_unused.max(0) as u64,
        })
    }

    /// Housekeeping count only; expiry itself needs no write.
    pub fn expired_token_count(&self, user_id: &str, now_ms: i64) -> Result<u64, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM speed_tokens
             WHERE user_id = ?1 AND used_at_ms IS NOT NULL AND expires_at_ms <= ?2",
            params![user_id, now_ms],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    pub fn insert_session(&mut self, session: &RewardSession) -> Result<(), StoreError> {
        let reserved_json = serde_json::to_string(&session.reserved_item_ids)?;
        self.conn.execute(
            "INSERT INTO reward_sessions (
                session_id, user_id, event_type, required_watch_count,
                reserved_item_ids_json, original_reward, status, created_at_ms, completed_at_ms
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                session.session_id,
                session.user_id,
                session.event_type.as_str(),
                session.required_watch_count,
                reserved_json,
                session.original_reward,
                session.status.as_str(),
                session.created_at_ms,
                session.completed_at_ms,
            ],
        )?;
        Ok(())
    }

    pub fn load_session(&self, session_id: &str) -> Result<Option<RewardSession>, StoreError> {
        load_session_any(&self.conn, session_id)
    }

    pub fn list_sessions(&self, user_id: &str) -> Result<Vec<RewardSession>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id, user_id, event_type, required_watch_count,
                    reserved_item_ids_json, original_reward, status, created_at_ms, completed_at_ms
             FROM reward_sessions
             WHERE user_id = ?1
             ORDER BY created_at_ms DESC, session_id DESC",
        )?;

        let rows = stmt.query_map(params![user_id], session_row)?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(session_from_raw(row?)?);
        }
        Ok(sessions)
    }

    /// Phase two of the reward protocol. Status transition, ledger row, and
    /// snapshot adjustment commit together; retries converge on the first
    /// writer's outcome through the session-id idempotency key.
    pub fn complete_session(
        &mut self,
        session_id: &str,
        watched_count: u32,
        entry_id: &str,
        now_ms: i64,
        config: &EconomyConfig,
    ) -> Result<CompletionResult, StoreError> {
        let tx = self.conn.transaction()?;

        let Some(session) = load_session_any(&tx, session_id)? else {
            return Ok(CompletionResult::NotFound);
        };

        match session.status {
            SessionStatus::Completed => {
                let bundle = rewards::reward_for(session.event_type, session.original_reward, config);
                let request = session_credit_request(&session, bundle.coins, bundle.lives);
                let outcome = credit_in_tx(&tx, &request, entry_id, now_ms, config)?;
                tx.commit()?;
                return Ok(CompletionResult::AlreadyCompleted(CompletionOutcome {
                    schema_version: SCHEMA_VERSION_V1.to_string(),
                    applied: outcome.applied,
                    coins_delta: bundle.coins,
                    lives_delta: bundle.lives,
                    balance: outcome.balance,
                }));
            }
            SessionStatus::Expired => return Ok(CompletionResult::ExpiredSession),
            SessionStatus::Pending => {}
        }

        if now_ms - session.created_at_ms >= config.session_ttl_ms() {
            // TTL elapsed but the sweep has not visited yet; expire lazily
            // so stale client state can never credit.
            tx.execute(
                "UPDATE reward_sessions SET status = 'expired'
                 WHERE session_id = ?1 AND status = 'pending'",
                params![session_id],
            )?;
            tx.commit()?;
            return Ok(CompletionResult::ExpiredSession);
        }

        if watched_count < session.required_watch_count {
            return Ok(CompletionResult::InsufficientWatched {
                required: session.required_watch_count,
                watched: watched_count,
            });
        }

        let bundle = rewards::reward_for(session.event_type, session.original_reward, config);
        let request = session_credit_request(&session, bundle.coins, bundle.lives);
        let outcome = credit_in_tx(&tx, &request, entry_id, now_ms, config)?;

        tx.execute(
            "UPDATE reward_sessions SET status = 'completed', completed_at_ms = ?1
             WHERE session_id = ?2 AND status = 'pending'",
            params![now_ms, session_id],
        )?;

        tx.commit()?;

        Ok(CompletionResult::Completed(CompletionOutcome {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            applied: outcome.applied,
            coins_delta: bundle.coins,
            lives_delta: bundle.lives,
            balance: outcome.balance,
        }))
    }

    /// Idempotent maintenance: flip PENDING sessions past the cutoff to
    /// EXPIRED. Running it twice is a no-op the second time.
    pub fn sweep_expired_sessions(&mut self, cutoff_ms: i64) -> Result<u64, StoreError> {
        let swept = self.conn.execute(
            "UPDATE reward_sessions SET status = 'expired'
             WHERE status = 'pending' AND created_at_ms <= ?1",
            params![cutoff_ms],
        )?;
        Ok(swept as u64)
    }

    /// Materialize accrued regeneration into the snapshot. The update is
    /// conditioned on the anchor we read, so concurrent catch-ups cannot
    /// double-accrue; the loser re-reads and returns the winner's row.
    pub fn materialize_regen(
        &mut self,
        user_id: &str,
        config: &EconomyConfig,
        now_ms: i64,
    ) -> Result<Option<BalanceSnapshot>, StoreError> {
        let Some(snapshot) = load_snapshot_any(&self.conn, user_id)? else {
            return Ok(None);
        };

        let outcome = regen::accrue(
            snapshot.lives,
            snapshot.max_lives,
            snapshot.last_regen_at_ms,
            config.regen_interval_ms(),
            now_ms,
        );

        if outcome.lives == snapshot.lives && outcome.last_regen_at_ms == snapshot.last_regen_at_ms {
            return Ok(Some(snapshot));
        }

        let updated = self.conn.execute(
            "UPDATE balance_snapshots
             SET lives = ?1, last_regen_at_ms = ?2, updated_at_ms = ?3
             WHERE user_id = ?4 AND last_regen_at_ms = ?5",
            params![
                outcome.lives,
                outcome.last_regen_at_ms,
                now_ms,
                user_id,
                snapshot.last_regen_at_ms,
            ],
        )?;

        if updated == 0 {
            return load_snapshot_any(&self.conn, user_id);
        }

        Ok(Some(BalanceSnapshot {
            lives: outcome.lives,
            last_regen_at_ms: outcome.last_regen_at_ms,
            ..snapshot
        }))
    }

    /// Replay-based repair of the cached aggregate against the ledger.
    pub fn reconcile_snapshot(
        &mut self,
        user_id: &str,
        config: &EconomyConfig,
        now_ms: i64,
    ) -> Result<BalanceSnapshot, StoreError> {
        let tx = self.conn.transaction()?;

        let mut stmt = tx.prepare(
            "SELECT entry_id, user_id, delta_coins, delta_lives, source, idempotency_key,
                    correlation_id, metadata_json, created_at_ms
             FROM ledger_entries
             WHERE user_id = ?1",
        )?;
        let rows = stmt.query_map(params![user_id], entry_row)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(entry_from_raw(row?)?);
        }
        drop(stmt);

        let max_lives = load_snapshot_any(&tx, user_id)?
            .map(|snapshot| snapshot.max_lives)
            .unwrap_or(config.max_lives);
        let rebuilt = ledger::replay_entries(user_id, max_lives, &entries, now_ms);

        upsert_snapshot(&tx, &rebuilt, now_ms, true)?;
        tx.commit()?;

        Ok(rebuilt)
    }
}

fn credit_in_tx(
    tx: &Transaction<'_>,
    request: &CreditRequest,
    entry_id: &str,
    now_ms: i64,
    config: &EconomyConfig,
) -> Result<CreditOutcome, StoreError> {
    let metadata_json = serde_json::to_string(&request.metadata)?;
    let inserted = tx.execute(
        "INSERT OR IGNORE INTO ledger_entries (
            entry_id, user_id, delta_coins, delta_lives, source,
            idempotency_key, correlation_id, metadata_json, created_at_ms
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            entry_id,
            request.user_id,
            request.delta_coins,
            request.delta_lives,
            request.source.as_str(),
            request.idempotency_key,
            request.correlation_id,
            metadata_json,
            now_ms,
        ],
    )?;

    if inserted == 0 {
        // The first writer on this key already had effect; surface its
        // user's current snapshot as a successful no-op.
        let existing = load_entry_by_key_any(tx, &request.idempotency_key)?.ok_or_else(|| {
            StoreError::Corrupt(format!(
                "idempotency_key={} rejected but no entry found",
                request.idempotency_key
            ))
        })?;
        let balance = load_snapshot_any(tx, &existing.user_id)?.unwrap_or_else(|| {
            BalanceSnapshot::new_empty(&existing.user_id, config.max_lives, now_ms)
        });
        return Ok(CreditOutcome {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            applied: false,
            balance,
        });
    }

    let current = load_snapshot_any(tx, &request.user_id)?
        .unwrap_or_else(|| BalanceSnapshot::new_empty(&request.user_id, config.max_lives, now_ms));
    let next = ledger::apply_delta(&current, request.delta_coins, request.delta_lives);
    upsert_snapshot(tx, &next, now_ms, false)?;

    Ok(CreditOutcome {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        applied: true,
        balance: next,
    })
}

/// On the credit path only coins/lives move; the regeneration anchor is
/// owned by the regen paths. A reconcile overwrites the anchor too.
fn upsert_snapshot(
    conn: &Connection,
    snapshot: &BalanceSnapshot,
    now_ms: i64,
    overwrite_anchor: bool,
) -> Result<(), StoreError> {
    if overwrite_anchor {
        conn.execute(
            "INSERT INTO balance_snapshots (
                user_id, coins, lives, max_lives, last_regen_at_ms, updated_at_ms
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(user_id) DO UPDATE SET
                coins = excluded.coins,
                lives = excluded.lives,
                max_lives = excluded.max_lives,
                last_regen_at_ms = excluded.last_regen_at_ms,
                updated_at_ms = excluded.updated_at_ms",
            params![
                snapshot.user_id,
                snapshot.coins,
                snapshot.lives,
                snapshot.max_lives,
                snapshot.last_regen_at_ms,
                now_ms,
            ],
        )?;
    } else {
        conn.execute(
            "INSERT INTO balance_snapshots (
                user_id, coins, lives, max_lives, last_regen_at_ms, updated_at_ms
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(user_id) DO UPDATE SET
                coins = excluded.coins,
                lives = excluded.lives,
                updated_at_ms = excluded.updated_at_ms",
            params![
                snapshot.user_id,
                snapshot.coins,
                snapshot.lives,
                snapshot.max_lives,
                snapshot.last_regen_at_ms,
                now_ms,
            ],
        )?;
    }
    Ok(())
}

fn load_snapshot_any(conn: &Connection, user_id: &str) -> Result<Option<BalanceSnapshot>, StoreError> {
    let snapshot = conn
        .query_row(
            "SELECT user_id, coins, lives, max_lives, last_regen_at_ms
             FROM balance_snapshots
             WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(BalanceSnapshot {
                    user_id: row.get(0)?,
                    coins: row.get(1)?,
                    lives: row.get(2)?,
                    max_lives: row.get(3)?,
                    last_regen_at_ms: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(snapshot)
}

fn load_entry_by_key_any(
    conn: &Connection,
    idempotency_key: &str,
) -> Result<Option<LedgerEntry>, StoreError> {
    let raw = conn
        .query_row(
            "SELECT entry_id, user_id, delta_coins, delta_lives, source, idempotency_key,
                    correlation_id, metadata_json, created_at_ms
             FROM ledger_entries
             WHERE idempotency_key = ?1",
            params![idempotency_key],
            entry_row,
        )
        .optional()?;

    match raw {
        Some(raw) => Ok(Some(entry_from_raw(raw)?)),
        None => Ok(None),
    }
}

fn active_token_any(
    conn: &Connection,
    user_id: &str,
    now_ms: i64,
) -> Result<Option<SpeedToken>, StoreError> {
    let raw = conn
        .query_row(
            "SELECT token_id, user_id, duration_minutes, source, granted_at_ms, used_at_ms, expires_at_ms
             FROM speed_tokens
             WHERE user_id = ?1 AND used_at_ms IS NOT NULL AND expires_at_ms > ?2
             ORDER BY expires_at_ms DESC
             LIMIT 1",
            params![user_id, now_ms],
            token_row,
        )
        .optional()?;

    match raw {
        Some(raw) => Ok(Some(token_from_raw(raw)?)),
        None => Ok(None),
    }
}

fn load_session_any(conn: &Connection, session_id: &str) -> Result<Option<RewardSession>, StoreError> {
    let raw = conn
        .query_row(
            "SELECT session_id, user_id, event_type, required_watch_count,
                    reserved_item_ids_json, original_reward, status, created_at_ms, completed_at_ms
             FROM reward_sessions
             WHERE session_id = ?1",
            params![session_id],
            session_row,
        )
        .optional()?;

    match raw {
        Some(raw) => Ok(Some(session_from_raw(raw)?)),
        None => Ok(None),
    }
}

fn session_credit_request(session: &RewardSession, coins: i64, lives: i64) -> CreditRequest {
    let mut request = CreditRequest::new(
        session.user_id.clone(),
        coins,
        lives,
        rewards::credit_source_for(session.event_type),
        session.session_id.clone(),
    );
    request.correlation_id = Some(session.session_id.clone());
    request.metadata.insert(
        "event_type".to_string(),
        serde_json::Value::String(session.event_type.as_str().to_string()),
    );
    request
}

type RawEntry = (
    String,
    String,
    i64,
    i64,
    String,
    String,
    Option<String>,
    String,
    i64,
);

fn entry_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn entry_from_raw(raw: RawEntry) -> Result<LedgerEntry, StoreError> {
    let (entry_id, user_id, delta_coins, delta_lives, source, idempotency_key, correlation_id, metadata_json, created_at_ms) =
        raw;
    let source = CreditSource::parse(&source)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown credit source: {source}")))?;
    let metadata: BTreeMap<String, serde_json::Value> = serde_json::from_str(&metadata_json)?;
    Ok(LedgerEntry {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        entry_id,
        user_id,
        delta_coins,
        delta_lives,
        source,
        idempotency_key,
        correlation_id,
        metadata,
        created_at_ms,
    })
}

type RawToken = (String, String, i64, String, i64, Option<i64>, Option<i64>);

fn token_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawToken> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn token_from_raw(raw: RawToken) -> Result<SpeedToken, StoreError> {
    let (token_id, user_id, duration_minutes, source, granted_at_ms, used_at_ms, expires_at_ms) = raw;
    let source = TokenSource::parse(&source)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown token source: {source}")))?;
    Ok(SpeedToken {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        token_id,
        user_id,
        duration_minutes,
        source,
        granted_at_ms,
        used_at_ms,
        expires_at_ms,
    })
}

type RawSession = (
    String,
    String,
    String,
    u32,
    String,
    i64,
    String,
    i64,
    Option<i64>,
);

fn session_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSession> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn session_from_raw(raw: RawSession) -> Result<RewardSession, StoreError> {
    let (session_id, user_id, event_type, required_watch_count, reserved_json, original_reward, status, created_at_ms, completed_at_ms) =
        raw;
    let event_type = RewardEventType::parse(&event_type)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown event type: {event_type}")))?;
    let status = SessionStatus::parse(&status)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown session status: {status}")))?;
    let reserved_item_ids: Vec<String> = serde_json::from_str(&reserved_json)?;
    Ok(RewardSession {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        session_id,
        user_id,
        event_type,
        required_watch_count,
        reserved_item_ids,
        original_reward,
        status,
        created_at_ms,
        completed_at_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db_path(name: &str) -> std::path::PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();

        std::env::temp_dir().join(format!("economy_store_{name}_{nanos}.sqlite"))
    }

    fn open_store(name: &str) -> (SqliteEconomyStore, std::path::PathBuf) {
        let path = temp_db_path(name);
        let store = SqliteEconomyStore::open(&path).expect("store should open");
        (store, path)
    }

    fn cleanup(path: &std::path::Path) {
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(path.with_extension("sqlite-wal"));
        let _ = std::fs::remove_file(path.with_extension("sqlite-shm"));
    }

    #[test]
    fn duplicate_key_is_a_noop_returning_first_writer_state() {
        let (mut store, path) = open_store("dup_key");
        let config = EconomyConfig::default();

        let first = CreditRequest::new("user_1", 500, 5, CreditSource::Refill, "sess-1");
        let outcome = store.credit(&first, "entry:1", 1_000, &config).expect("credit");
        assert!(outcome.applied);
        assert_eq!(outcome.balance.coins, 500);

        // Same key, different deltas: the first writer's effect stands.
        let second = CreditRequest::new("user_1", 9_000, 9, CreditSource::Refill, "sess-1");
        let retry = store.credit(&second, "entry:2", 2_000, &config).expect("retry");
        assert!(!retry.applied);
        assert_eq!(retry.balance.coins, 500);
        assert_eq!(retry.balance.lives, 5);

        let entries = store.list_ledger_entries("user_1", 10).expect("list");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry_id, "entry:1");

        cleanup(&path);
    }

    #[test]
    fn reconcile_repairs_a_drifted_snapshot() {
        let (mut store, path) = open_store("reconcile");
        let config = EconomyConfig::default();

        for (index, coins) in [200_i64, -50, 75].iter().enumerate() {
            let request = CreditRequest::new(
                "user_1",
                *coins,
                0,
                CreditSource::Promo,
                format!("key-{index}"),
            );
            store
                .credit(&request, &format!("entry:{index}"), index as i64 * 10, &config)
                .expect("credit");
        }

        // Corrupt the cache out from under the ledger.
        store
            .conn
            .execute(
                "UPDATE balance_snapshots SET coins = 999999 WHERE user_id = 'user_1'",
                [],
            )
            .expect("corrupt");

        let rebuilt = store
            .reconcile_snapshot("user_1", &config, 5_000)
            .expect("reconcile");
        assert_eq!(rebuilt.coins, 225);
        assert_eq!(rebuilt.last_regen_at_ms, 5_000);

        let reloaded = store.load_snapshot("user_1").expect("load").expect("row");
        assert_eq!(reloaded.coins, 225);

        cleanup(&path);
    }

    #[test]
    fn materialize_regen_is_monotonic_and_race_safe() {
        let (mut store, path) = open_store("regen");
        let config = EconomyConfig::default();
        let interval = config.regen_interval_ms();

        let request = CreditRequest::new("user_1", 0, 2, CreditSource::Promo, "seed");
        store.credit(&request, "entry:seed", 0, &config).expect("credit");

        let caught_up = store
            .materialize_regen("user_1", &config, 2 * interval + 5)
            .expect("regen")
            .expect("snapshot");
        assert_eq!(caught_up.lives, 4);
        assert_eq!(caught_up.last_regen_at_ms, 2 * interval);

        // Re-running at the same instant changes nothing.
        let again = store
            .materialize_regen("user_1", &config, 2 * interval + 5)
            .expect("regen")
            .expect("snapshot");
        assert_eq!(again.lives, 4);
        assert_eq!(again.last_regen_at_ms, 2 * interval);

        cleanup(&path);
    }

    #[test]
    fn deterministic_token_id_absorbs_regrant() {
        let (mut store, path) = open_store("token_regrant");

        let token = SpeedToken {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            token_id: "token:pay_123".to_string(),
            user_id: "user_1".to_string(),
            duration_minutes: 15,
            source: TokenSource::Purchase,
            granted_at_ms: 100,
            used_at_ms: None,
            expires_at_ms: None,
        };

        assert!(store.insert_token(&token).expect("insert"));
        assert!(!store.insert_token(&token).expect("redelivery"));
        assert_eq!(store.list_tokens("user_1").expect("list").len(), 1);

        cleanup(&path);
    }
}
