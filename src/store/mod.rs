//! Durable state store
//!
//! One SQLite database file per role (live trading, A/B testing, smoke
//! tests) so the roles never contend. Every mutator runs in a
//! transaction; trade intent→confirmed/failed transitions are
//! idempotent by trade id.

pub mod ab;

use std::path::Path;
use std::sync::Mutex;

use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Which arm of an A/B session a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    A,
    B,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::A => "A",
            Variant::B => "B",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "A" => Some(Variant::A),
            "B" => Some(Variant::B),
            _ => None,
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a position or paper trade was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TrailingStop,
    TimeExit,
    Graduated,
    Manual,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::TakeProfit => "take_profit",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::TimeExit => "time_exit",
            ExitReason::Graduated => "graduated",
            ExitReason::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "take_profit" => Some(ExitReason::TakeProfit),
            "stop_loss" => Some(ExitReason::StopLoss),
            "trailing_stop" => Some(ExitReason::TrailingStop),
            "time_exit" => Some(ExitReason::TimeExit),
            "graduated" => Some(ExitReason::Graduated),
            "manual" => Some(ExitReason::Manual),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Blacklist entry kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanKind {
    Mint,
    Creator,
}

impl BanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BanKind::Mint => "mint",
            BanKind::Creator => "creator",
        }
    }
}

/// An open live position row
#[derive(Debug, Clone)]
pub struct PositionRow {
    pub token_mint: String,
    pub bonding_curve: String,
    pub entry_amount_sol: f64,
    pub actual_cost_sol: f64,
    pub token_amount: u64,
    pub entry_timestamp_ms: i64,
    pub buy_signature: Option<String>,
    pub is_token_2022: Option<bool>,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Six random lowercase base36 characters
fn base36_suffix() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    (0..6)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Session identifier: `ab_{millisEpoch}_{base36(6)}`
pub fn new_session_id() -> String {
    format!("ab_{}_{}", now_ms(), base36_suffix())
}

/// Trade identifier, same shape as session ids
pub fn new_trade_id() -> String {
    format!("trade_{}_{}", now_ms(), base36_suffix())
}

/// SQLite-backed state store
pub struct StateStore {
    conn: Mutex<Connection>,
}

impl StateStore {
    /// Open (or create) the database at `path` and run migrations
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        info!(path = %path.display(), "state store opened");
        Ok(store)
    }

    /// In-memory store for tests
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| Error::Store("connection lock poisoned".to_string()))?;
        f(&mut conn)
    }

    fn init(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;

            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS seen_pools (
                    bonding_curve TEXT PRIMARY KEY,
                    mint TEXT NOT NULL,
                    first_seen_ms INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS blacklist (
                    address TEXT NOT NULL,
                    kind TEXT NOT NULL CHECK (kind IN ('mint', 'creator')),
                    reason TEXT,
                    added_at_ms INTEGER NOT NULL,
                    PRIMARY KEY (address, kind)
                );

                CREATE TABLE IF NOT EXISTS positions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    token_mint TEXT NOT NULL,
                    bonding_curve TEXT NOT NULL,
                    entry_amount_sol REAL NOT NULL,
                    actual_cost_sol REAL NOT NULL,
                    token_amount INTEGER NOT NULL,
                    entry_timestamp_ms INTEGER NOT NULL,
                    buy_signature TEXT,
                    is_token_2022 INTEGER,
                    status TEXT NOT NULL DEFAULT 'open',
                    close_reason TEXT,
                    closed_at_ms INTEGER
                );
                CREATE UNIQUE INDEX IF NOT EXISTS idx_positions_open_mint
                    ON positions(token_mint) WHERE status = 'open';

                CREATE TABLE IF NOT EXISTS trades (
                    id TEXT PRIMARY KEY,
                    token_mint TEXT NOT NULL,
                    side TEXT NOT NULL,
                    amount_sol REAL NOT NULL,
                    status TEXT NOT NULL DEFAULT 'intent',
                    signature TEXT,
                    actual_sol REAL,
                    error TEXT,
                    created_at_ms INTEGER NOT NULL,
                    updated_at_ms INTEGER
                );
                CREATE INDEX IF NOT EXISTS idx_trades_mint_status
                    ON trades(token_mint, status);

                CREATE TABLE IF NOT EXISTS session_stats (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    started_at_ms INTEGER NOT NULL,
                    ended_at_ms INTEGER,
                    tokens_seen INTEGER NOT NULL DEFAULT 0,
                    trades_entered INTEGER NOT NULL DEFAULT 0,
                    realized_pnl_sol REAL NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS pool_detections (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    signature TEXT NOT NULL,
                    mint TEXT NOT NULL,
                    bonding_curve TEXT NOT NULL,
                    creator TEXT,
                    name TEXT,
                    symbol TEXT,
                    source TEXT NOT NULL,
                    slot INTEGER NOT NULL,
                    detected_at_ms INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_pool_detections_mint
                    ON pool_detections(mint);

                CREATE TABLE IF NOT EXISTS ab_sessions (
                    session_id TEXT PRIMARY KEY,
                    description TEXT,
                    started_at_ms INTEGER NOT NULL,
                    completed_at_ms INTEGER,
                    duration_ms INTEGER NOT NULL,
                    config_a TEXT NOT NULL,
                    config_b TEXT NOT NULL,
                    total_tokens_detected INTEGER NOT NULL DEFAULT 0,
                    status TEXT NOT NULL DEFAULT 'running'
                );

                CREATE TABLE IF NOT EXISTS ab_trades (
                    id TEXT PRIMARY KEY,
                    session_id TEXT NOT NULL REFERENCES ab_sessions(session_id),
                    variant TEXT NOT NULL,
                    token_mint TEXT NOT NULL,
                    entry_timestamp_ms INTEGER NOT NULL,
                    hypothetical_sol_spent REAL NOT NULL,
                    entry_price_per_token REAL NOT NULL,
                    hypothetical_tokens_received INTEGER NOT NULL,
                    pipeline_duration_ms INTEGER NOT NULL,
                    status TEXT NOT NULL DEFAULT 'active',
                    exit_timestamp_ms INTEGER,
                    exit_reason TEXT,
                    exit_price_per_token REAL,
                    exit_sol_received REAL,
                    realized_pnl_sol REAL,
                    realized_pnl_percent REAL,
                    hold_duration_ms INTEGER
                );
                CREATE INDEX IF NOT EXISTS idx_ab_trades_session
                    ON ab_trades(session_id, variant, status);

                CREATE TABLE IF NOT EXISTS ab_pipeline_decisions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    session_id TEXT NOT NULL REFERENCES ab_sessions(session_id),
                    variant TEXT NOT NULL,
                    token_mint TEXT NOT NULL,
                    timestamp_ms INTEGER NOT NULL,
                    passed INTEGER NOT NULL,
                    rejection_stage TEXT,
                    rejection_reason TEXT,
                    pipeline_duration_ms INTEGER NOT NULL
                );
                CREATE UNIQUE INDEX IF NOT EXISTS idx_ab_decisions_once
                    ON ab_pipeline_decisions(session_id, variant, token_mint);

                CREATE TABLE IF NOT EXISTS ab_parameter_diffs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    session_id TEXT NOT NULL REFERENCES ab_sessions(session_id),
                    param_name TEXT NOT NULL,
                    value_a TEXT NOT NULL,
                    value_b TEXT NOT NULL,
                    winner TEXT NOT NULL,
                    winner_value TEXT,
                    pnl_a REAL NOT NULL,
                    pnl_b REAL NOT NULL,
                    pnl_difference REAL NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_ab_diffs_param
                    ON ab_parameter_diffs(param_name);

                CREATE TABLE IF NOT EXISTS paper_trades (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    token_mint TEXT NOT NULL,
                    session_id TEXT,
                    variant TEXT,
                    entry_amount_sol REAL NOT NULL,
                    token_amount INTEGER NOT NULL,
                    entry_timestamp_ms INTEGER NOT NULL,
                    exit_timestamp_ms INTEGER,
                    exit_reason TEXT,
                    exit_sol REAL
                );

                CREATE TABLE IF NOT EXISTS sniper_gate_observations (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    token_mint TEXT NOT NULL,
                    session_id TEXT,
                    variant TEXT,
                    check_number INTEGER NOT NULL,
                    bot_count INTEGER NOT NULL,
                    bot_exit_count INTEGER NOT NULL,
                    organic_count INTEGER NOT NULL,
                    total_buys INTEGER NOT NULL,
                    total_sells INTEGER NOT NULL,
                    unique_buyers INTEGER NOT NULL,
                    pass_conditions_met INTEGER NOT NULL,
                    sniper_wallets TEXT NOT NULL,
                    observed_at_ms INTEGER NOT NULL
                );",
            )?;
            Ok(())
        })
    }

    // ---- detection audit -------------------------------------------------

    /// Record a pool detection audit row and mark the pool seen.
    /// Returns false when the pool was already known.
    pub fn record_detection(
        &self,
        signature: &str,
        mint: &str,
        bonding_curve: &str,
        creator: Option<&str>,
        name: Option<&str>,
        symbol: Option<&str>,
        source: &str,
        slot: u64,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let newly_seen = tx.execute(
                "INSERT OR IGNORE INTO seen_pools (bonding_curve, mint, first_seen_ms)
                 VALUES (?1, ?2, ?3)",
                params![bonding_curve, mint, now_ms()],
            )? > 0;
            tx.execute(
                "INSERT INTO pool_detections
                 (signature, mint, bonding_curve, creator, name, symbol, source, slot, detected_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![signature, mint, bonding_curve, creator, name, symbol, source, slot as i64, now_ms()],
            )?;
            tx.commit()?;
            Ok(newly_seen)
        })
    }

    pub fn is_pool_seen(&self, bonding_curve: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM seen_pools WHERE bonding_curve = ?1",
                    params![bonding_curve],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    // ---- blacklist -------------------------------------------------------

    pub fn add_ban(&self, address: &str, kind: BanKind, reason: Option<&str>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO blacklist (address, kind, reason, added_at_ms)
                 VALUES (?1, ?2, ?3, ?4)",
                params![address, kind.as_str(), reason, now_ms()],
            )?;
            Ok(())
        })
    }

    pub fn load_bans(&self, kind: BanKind) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT address FROM blacklist WHERE kind = ?1")?;
            let rows = stmt.query_map(params![kind.as_str()], |row| row.get::<_, String>(0))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    // ---- trades (intent -> confirmed/failed) -----------------------------

    /// Record intent to trade; the returned id is used for the
    /// idempotent confirm/fail transition.
    pub fn record_trade_intent(&self, mint: &str, side: &str, amount_sol: f64) -> Result<String> {
        let trade_id = new_trade_id();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO trades (id, token_mint, side, amount_sol, status, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4, 'intent', ?5)",
                params![trade_id, mint, side, amount_sol, now_ms()],
            )?;
            Ok(())
        })?;
        debug!(trade_id = %trade_id, mint = %mint, side = %side, "trade intent recorded");
        Ok(trade_id)
    }

    /// Confirm a trade. A second confirmation of the same id is a no-op.
    pub fn confirm_trade(
        &self,
        trade_id: &str,
        signature: &str,
        actual_sol: Option<f64>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE trades
                 SET status = 'confirmed', signature = ?2, actual_sol = ?3, updated_at_ms = ?4
                 WHERE id = ?1 AND status = 'intent'",
                params![trade_id, signature, actual_sol, now_ms()],
            )?;
            Ok(())
        })
    }

    /// Fail a trade. Confirmed trades are never downgraded.
    pub fn fail_trade(&self, trade_id: &str, error: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE trades
                 SET status = 'failed', error = ?2, updated_at_ms = ?3
                 WHERE id = ?1 AND status = 'intent'",
                params![trade_id, error, now_ms()],
            )?;
            Ok(())
        })
    }

    pub fn trade_status(&self, trade_id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT status FROM trades WHERE id = ?1",
                    params![trade_id],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    /// Is there an unresolved buy intent for this mint?
    pub fn has_pending_buy(&self, mint: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM trades
                     WHERE token_mint = ?1 AND side = 'buy' AND status = 'intent'",
                    params![mint],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    // ---- positions -------------------------------------------------------

    pub fn open_position(&self, position: &PositionRow) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO positions
                 (token_mint, bonding_curve, entry_amount_sol, actual_cost_sol, token_amount,
                  entry_timestamp_ms, buy_signature, is_token_2022, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'open')",
                params![
                    position.token_mint,
                    position.bonding_curve,
                    position.entry_amount_sol,
                    position.actual_cost_sol,
                    position.token_amount as i64,
                    position.entry_timestamp_ms,
                    position.buy_signature,
                    position.is_token_2022,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn close_position(&self, mint: &str, reason: ExitReason) -> Result<()> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE positions
                 SET status = 'closed', close_reason = ?2, closed_at_ms = ?3
                 WHERE token_mint = ?1 AND status = 'open'",
                params![mint, reason.as_str(), now_ms()],
            )?;
            if updated == 0 {
                return Err(Error::PositionNotFound(mint.to_string()));
            }
            Ok(())
        })
    }

    pub fn has_open_position(&self, mint: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM positions WHERE token_mint = ?1 AND status = 'open'",
                    params![mint],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    // ---- session stats (live trading) ------------------------------------

    /// Open a live-session stats row; counters are folded in at close
    pub fn begin_session_stats(&self) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO session_stats (started_at_ms) VALUES (?1)",
                params![now_ms()],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn finish_session_stats(
        &self,
        stats_id: i64,
        tokens_seen: u64,
        trades_entered: u64,
        realized_pnl_sol: f64,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE session_stats
                 SET ended_at_ms = ?2, tokens_seen = ?3, trades_entered = ?4,
                     realized_pnl_sol = ?5
                 WHERE id = ?1",
                params![
                    stats_id,
                    now_ms(),
                    tokens_seen as i64,
                    trades_entered as i64,
                    realized_pnl_sol
                ],
            )?;
            Ok(())
        })
    }

    // ---- paper trades ----------------------------------------------------

    pub fn record_paper_open(
        &self,
        mint: &str,
        session_id: Option<&str>,
        variant: Option<Variant>,
        entry_amount_sol: f64,
        token_amount: u64,
        entry_timestamp_ms: i64,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO paper_trades
                 (token_mint, session_id, variant, entry_amount_sol, token_amount, entry_timestamp_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    mint,
                    session_id,
                    variant.map(|v| v.as_str()),
                    entry_amount_sol,
                    token_amount as i64,
                    entry_timestamp_ms,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn record_paper_close(
        &self,
        paper_id: i64,
        reason: ExitReason,
        exit_sol: f64,
        exit_timestamp_ms: i64,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE paper_trades
                 SET exit_timestamp_ms = ?2, exit_reason = ?3, exit_sol = ?4
                 WHERE id = ?1",
                params![paper_id, exit_timestamp_ms, reason.as_str(), exit_sol],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seen_pool_round_trip() {
        let store = StateStore::in_memory().unwrap();

        assert!(!store.is_pool_seen("curve1").unwrap());
        let newly = store
            .record_detection("sig", "mint1", "curve1", None, Some("Tok"), None, "websocket", 5)
            .unwrap();
        assert!(newly);
        assert!(store.is_pool_seen("curve1").unwrap());

        // Second detection of the same pool is not newly seen
        let again = store
            .record_detection("sig2", "mint1", "curve1", None, Some("Tok"), None, "websocket", 6)
            .unwrap();
        assert!(!again);
    }

    #[test]
    fn test_blacklist_round_trip() {
        let store = StateStore::in_memory().unwrap();
        store.add_ban("mintX", BanKind::Mint, Some("rug")).unwrap();
        store.add_ban("devY", BanKind::Creator, None).unwrap();

        assert_eq!(store.load_bans(BanKind::Mint).unwrap(), vec!["mintX"]);
        assert_eq!(store.load_bans(BanKind::Creator).unwrap(), vec!["devY"]);
    }

    #[test]
    fn test_trade_transitions_idempotent() {
        let store = StateStore::in_memory().unwrap();
        let id = store.record_trade_intent("mint1", "buy", 0.05).unwrap();
        assert!(store.has_pending_buy("mint1").unwrap());

        store.confirm_trade(&id, "sig1", Some(0.049)).unwrap();
        assert_eq!(store.trade_status(&id).unwrap().unwrap(), "confirmed");
        assert!(!store.has_pending_buy("mint1").unwrap());

        // A late failure report must not downgrade the confirmation
        store.fail_trade(&id, "timeout").unwrap();
        assert_eq!(store.trade_status(&id).unwrap().unwrap(), "confirmed");

        // Confirming again is a no-op, not an error
        store.confirm_trade(&id, "sig2", None).unwrap();
        assert_eq!(store.trade_status(&id).unwrap().unwrap(), "confirmed");
    }

    #[test]
    fn test_position_lifecycle() {
        let store = StateStore::in_memory().unwrap();
        let row = PositionRow {
            token_mint: "mint1".to_string(),
            bonding_curve: "curve1".to_string(),
            entry_amount_sol: 0.05,
            actual_cost_sol: 0.052,
            token_amount: 1_000_000,
            entry_timestamp_ms: now_ms(),
            buy_signature: Some("sig".to_string()),
            is_token_2022: Some(false),
        };

        store.open_position(&row).unwrap();
        assert!(store.has_open_position("mint1").unwrap());

        // A second open position for the same mint violates the
        // partial unique index
        assert!(store.open_position(&row).is_err());

        store.close_position("mint1", ExitReason::TakeProfit).unwrap();
        assert!(!store.has_open_position("mint1").unwrap());

        // Re-opening after close is allowed
        store.open_position(&row).unwrap();
        assert!(store.has_open_position("mint1").unwrap());
    }

    #[test]
    fn test_close_unknown_position() {
        let store = StateStore::in_memory().unwrap();
        assert!(matches!(
            store.close_position("ghost", ExitReason::Manual),
            Err(Error::PositionNotFound(_))
        ));
    }

    #[test]
    fn test_session_id_shape() {
        let id = new_session_id();
        assert!(id.starts_with("ab_"));
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_session_stats_round_trip() {
        let store = StateStore::in_memory().unwrap();
        let id = store.begin_session_stats().unwrap();
        store.finish_session_stats(id, 120, 4, -0.015).unwrap();
    }

    #[test]
    fn test_paper_trade_round_trip() {
        let store = StateStore::in_memory().unwrap();
        let id = store
            .record_paper_open("mint1", None, Some(Variant::A), 0.05, 1_000_000, 123)
            .unwrap();
        store
            .record_paper_close(id, ExitReason::TrailingStop, 0.054, 456)
            .unwrap();
    }
}
