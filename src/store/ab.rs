//! A/B session persistence: sessions, per-variant trades, pipeline
//! decisions, parameter diffs, sniper gate observations.

use std::collections::HashMap;

use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::VariantConfig;
use crate::error::{Error, Result};
use crate::store::{ExitReason, StateStore, Variant};

/// Which variant won a parameter comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    A,
    B,
    Tie,
}

impl Winner {
    pub fn as_str(&self) -> &'static str {
        match self {
            Winner::A => "A",
            Winner::B => "B",
            Winner::Tie => "tie",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "A" => Some(Winner::A),
            "B" => Some(Winner::B),
            "tie" => Some(Winner::Tie),
            _ => None,
        }
    }
}

/// One persisted A/B session
#[derive(Debug, Clone)]
pub struct AbSessionRow {
    pub session_id: String,
    pub description: Option<String>,
    pub started_at_ms: i64,
    pub completed_at_ms: Option<i64>,
    pub duration_ms: i64,
    pub config_a: VariantConfig,
    pub config_b: VariantConfig,
    pub total_tokens_detected: i64,
    pub status: String,
}

/// One pipeline decision, pass or fail
#[derive(Debug, Clone)]
pub struct DecisionRow {
    pub session_id: String,
    pub variant: Variant,
    pub token_mint: String,
    pub timestamp_ms: i64,
    pub passed: bool,
    pub rejection_stage: Option<String>,
    pub rejection_reason: Option<String>,
    pub pipeline_duration_ms: i64,
}

/// One hypothetical trade, admission through close
#[derive(Debug, Clone)]
pub struct AbTradeRow {
    pub id: String,
    pub session_id: String,
    pub variant: Variant,
    pub token_mint: String,
    pub entry_timestamp_ms: i64,
    pub hypothetical_sol_spent: f64,
    pub entry_price_per_token: f64,
    pub hypothetical_tokens_received: u64,
    pub pipeline_duration_ms: i64,
    pub status: String,
    pub exit_timestamp_ms: Option<i64>,
    pub exit_reason: Option<ExitReason>,
    pub exit_price_per_token: Option<f64>,
    pub exit_sol_received: Option<f64>,
    pub realized_pnl_sol: Option<f64>,
    pub realized_pnl_percent: Option<f64>,
    pub hold_duration_ms: Option<i64>,
}

/// The exit-side fields written when a trade closes
#[derive(Debug, Clone)]
pub struct TradeExit {
    pub exit_timestamp_ms: i64,
    pub exit_reason: ExitReason,
    pub exit_price_per_token: f64,
    pub exit_sol_received: f64,
    pub realized_pnl_sol: f64,
    pub realized_pnl_percent: f64,
    pub hold_duration_ms: i64,
}

/// One parameter that differed between the two variants of a session
#[derive(Debug, Clone)]
pub struct ParameterDiff {
    pub param_name: String,
    pub value_a: serde_json::Value,
    pub value_b: serde_json::Value,
    pub winner: Winner,
    pub winner_value: Option<serde_json::Value>,
    pub pnl_a: f64,
    pub pnl_b: f64,
    pub pnl_difference: f64,
}

/// A parameter diff read back with its session context
#[derive(Debug, Clone)]
pub struct ParameterDiffRow {
    pub session_id: String,
    pub diff: ParameterDiff,
}

/// Per-variant PnL of a completed session
#[derive(Debug, Clone)]
pub struct SessionPnl {
    pub session_id: String,
    pub completed_at_ms: Option<i64>,
    pub config_a: VariantConfig,
    pub config_b: VariantConfig,
    pub pnl_a: f64,
    pub pnl_b: f64,
}

/// Aggregate decision counts for one variant of one session
#[derive(Debug, Clone, Default)]
pub struct DecisionStats {
    pub total: u64,
    pub passed: u64,
    pub rejected: u64,
    pub rejections_by_stage: HashMap<String, u64>,
}

/// One sniper-gate poll snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SniperObservation {
    pub check_number: u32,
    pub bot_count: u64,
    pub bot_exit_count: u64,
    pub organic_count: u64,
    pub total_buys: u64,
    pub total_sells: u64,
    pub unique_buyers: u64,
    pub pass_conditions_met: bool,
    pub sniper_wallets: Vec<String>,
    pub observed_at_ms: i64,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn trade_from_row(row: &Row<'_>) -> rusqlite::Result<AbTradeRow> {
    Ok(AbTradeRow {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        variant: Variant::parse(&row.get::<_, String>("variant")?).unwrap_or(Variant::A),
        token_mint: row.get("token_mint")?,
        entry_timestamp_ms: row.get("entry_timestamp_ms")?,
        hypothetical_sol_spent: row.get("hypothetical_sol_spent")?,
        entry_price_per_token: row.get("entry_price_per_token")?,
        hypothetical_tokens_received: row.get::<_, i64>("hypothetical_tokens_received")? as u64,
        pipeline_duration_ms: row.get("pipeline_duration_ms")?,
        status: row.get("status")?,
        exit_timestamp_ms: row.get("exit_timestamp_ms")?,
        exit_reason: row
            .get::<_, Option<String>>("exit_reason")?
            .and_then(|s| ExitReason::parse(&s)),
        exit_price_per_token: row.get("exit_price_per_token")?,
        exit_sol_received: row.get("exit_sol_received")?,
        realized_pnl_sol: row.get("realized_pnl_sol")?,
        realized_pnl_percent: row.get("realized_pnl_percent")?,
        hold_duration_ms: row.get("hold_duration_ms")?,
    })
}

impl StateStore {
    // ---- sessions --------------------------------------------------------

    pub fn create_ab_session(
        &self,
        session_id: &str,
        description: Option<&str>,
        duration_ms: i64,
        config_a: &VariantConfig,
        config_b: &VariantConfig,
    ) -> Result<()> {
        let config_a = serde_json::to_string(config_a)?;
        let config_b = serde_json::to_string(config_b)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO ab_sessions
                 (session_id, description, started_at_ms, duration_ms, config_a, config_b, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'running')",
                params![session_id, description, now_ms(), duration_ms, config_a, config_b],
            )?;
            Ok(())
        })
    }

    pub fn complete_ab_session(&self, session_id: &str, tokens_detected: i64) -> Result<()> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE ab_sessions
                 SET status = 'completed', completed_at_ms = ?2, total_tokens_detected = ?3
                 WHERE session_id = ?1",
                params![session_id, now_ms(), tokens_detected],
            )?;
            if updated == 0 {
                return Err(Error::SessionNotFound(session_id.to_string()));
            }
            Ok(())
        })
    }

    pub fn get_ab_session(&self, session_id: &str) -> Result<Option<AbSessionRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT session_id, description, started_at_ms, completed_at_ms,
                            duration_ms, config_a, config_b, total_tokens_detected, status
                     FROM ab_sessions WHERE session_id = ?1",
                    params![session_id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, Option<i64>>(3)?,
                            row.get::<_, i64>(4)?,
                            row.get::<_, String>(5)?,
                            row.get::<_, String>(6)?,
                            row.get::<_, i64>(7)?,
                            row.get::<_, String>(8)?,
                        ))
                    },
                )
                .optional()?;

            let Some((id, description, started, completed, duration, a, b, tokens, status)) = row
            else {
                return Ok(None);
            };

            Ok(Some(AbSessionRow {
                session_id: id,
                description,
                started_at_ms: started,
                completed_at_ms: completed,
                duration_ms: duration,
                config_a: serde_json::from_str(&a)?,
                config_b: serde_json::from_str(&b)?,
                total_tokens_detected: tokens,
                status,
            }))
        })
    }

    // ---- pipeline decisions ----------------------------------------------

    /// Persist a decision. At most one row per (session, variant, mint)
    /// survives; replays are ignored.
    pub fn record_pipeline_decision(&self, decision: &DecisionRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO ab_pipeline_decisions
                 (session_id, variant, token_mint, timestamp_ms, passed,
                  rejection_stage, rejection_reason, pipeline_duration_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    decision.session_id,
                    decision.variant.as_str(),
                    decision.token_mint,
                    decision.timestamp_ms,
                    decision.passed,
                    decision.rejection_stage,
                    decision.rejection_reason,
                    decision.pipeline_duration_ms,
                ],
            )?;
            Ok(())
        })
    }

    pub fn decision_stats(&self, session_id: &str, variant: Variant) -> Result<DecisionStats> {
        self.with_conn(|conn| {
            let mut stats = DecisionStats::default();

            let mut stmt = conn.prepare(
                "SELECT passed, rejection_stage, COUNT(*) FROM ab_pipeline_decisions
                 WHERE session_id = ?1 AND variant = ?2
                 GROUP BY passed, rejection_stage",
            )?;
            let rows = stmt.query_map(params![session_id, variant.as_str()], |row| {
                Ok((
                    row.get::<_, bool>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, u64>(2)?,
                ))
            })?;

            for row in rows {
                let (passed, stage, count) = row?;
                stats.total += count;
                if passed {
                    stats.passed += count;
                } else {
                    stats.rejected += count;
                    let stage = stage.unwrap_or_else(|| "unknown".to_string());
                    *stats.rejections_by_stage.entry(stage).or_insert(0) += count;
                }
            }
            Ok(stats)
        })
    }

    // ---- A/B trades ------------------------------------------------------

    pub fn record_trade_entry(&self, trade: &AbTradeRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO ab_trades
                 (id, session_id, variant, token_mint, entry_timestamp_ms,
                  hypothetical_sol_spent, entry_price_per_token,
                  hypothetical_tokens_received, pipeline_duration_ms, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'active')",
                params![
                    trade.id,
                    trade.session_id,
                    trade.variant.as_str(),
                    trade.token_mint,
                    trade.entry_timestamp_ms,
                    trade.hypothetical_sol_spent,
                    trade.entry_price_per_token,
                    trade.hypothetical_tokens_received as i64,
                    trade.pipeline_duration_ms,
                ],
            )?;
            Ok(())
        })
    }

    /// Close a trade. Only an active trade transitions; a replayed
    /// close is ignored.
    pub fn record_trade_exit(&self, trade_id: &str, exit: &TradeExit) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE ab_trades
                 SET status = 'closed', exit_timestamp_ms = ?2, exit_reason = ?3,
                     exit_price_per_token = ?4, exit_sol_received = ?5,
                     realized_pnl_sol = ?6, realized_pnl_percent = ?7, hold_duration_ms = ?8
                 WHERE id = ?1 AND status = 'active'",
                params![
                    trade_id,
                    exit.exit_timestamp_ms,
                    exit.exit_reason.as_str(),
                    exit.exit_price_per_token,
                    exit.exit_sol_received,
                    exit.realized_pnl_sol,
                    exit.realized_pnl_percent,
                    exit.hold_duration_ms,
                ],
            )?;
            Ok(())
        })
    }

    pub fn find_active_trade_id(
        &self,
        session_id: &str,
        variant: Variant,
        mint: &str,
    ) -> Result<Option<String>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id FROM ab_trades
                     WHERE session_id = ?1 AND variant = ?2 AND token_mint = ?3
                       AND status = 'active'
                     ORDER BY entry_timestamp_ms DESC LIMIT 1",
                    params![session_id, variant.as_str(), mint],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    pub fn get_ab_trades(&self, session_id: &str, variant: Variant) -> Result<Vec<AbTradeRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM ab_trades
                 WHERE session_id = ?1 AND variant = ?2
                 ORDER BY entry_timestamp_ms",
            )?;
            let rows = stmt.query_map(params![session_id, variant.as_str()], trade_from_row)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    pub fn get_ab_trade(&self, trade_id: &str) -> Result<Option<AbTradeRow>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT * FROM ab_trades WHERE id = ?1",
                    params![trade_id],
                    trade_from_row,
                )
                .optional()?)
        })
    }

    /// Realised PnL of one variant: closed trades only
    pub fn variant_pnl(&self, session_id: &str, variant: Variant) -> Result<f64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COALESCE(SUM(exit_sol_received - hypothetical_sol_spent), 0.0)
                 FROM ab_trades
                 WHERE session_id = ?1 AND variant = ?2 AND status = 'closed'",
                params![session_id, variant.as_str()],
                |row| row.get(0),
            )?)
        })
    }

    /// Completed sessions with per-variant realised PnL, oldest first
    pub fn get_completed_sessions_with_pnl(&self) -> Result<Vec<SessionPnl>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT s.session_id, s.completed_at_ms, s.config_a, s.config_b,
                        COALESCE((SELECT SUM(exit_sol_received - hypothetical_sol_spent)
                                  FROM ab_trades
                                  WHERE session_id = s.session_id AND variant = 'A'
                                    AND status = 'closed'), 0.0),
                        COALESCE((SELECT SUM(exit_sol_received - hypothetical_sol_spent)
                                  FROM ab_trades
                                  WHERE session_id = s.session_id AND variant = 'B'
                                    AND status = 'closed'), 0.0)
                 FROM ab_sessions s
                 WHERE s.status = 'completed'
                 ORDER BY s.started_at_ms",
            )?;

            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, f64>(5)?,
                ))
            })?;

            let mut out = Vec::new();
            for row in rows {
                let (session_id, completed_at_ms, a, b, pnl_a, pnl_b) = row?;
                out.push(SessionPnl {
                    session_id,
                    completed_at_ms,
                    config_a: serde_json::from_str(&a)?,
                    config_b: serde_json::from_str(&b)?,
                    pnl_a,
                    pnl_b,
                });
            }
            Ok(out)
        })
    }

    // ---- parameter diffs -------------------------------------------------

    /// Persist every diff of a session in one transaction
    pub fn save_parameter_diffs(&self, session_id: &str, diffs: &[ParameterDiff]) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            for diff in diffs {
                tx.execute(
                    "INSERT INTO ab_parameter_diffs
                     (session_id, param_name, value_a, value_b, winner, winner_value,
                      pnl_a, pnl_b, pnl_difference)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        session_id,
                        diff.param_name,
                        diff.value_a.to_string(),
                        diff.value_b.to_string(),
                        diff.winner.as_str(),
                        diff.winner_value.as_ref().map(|v| v.to_string()),
                        diff.pnl_a,
                        diff.pnl_b,
                        diff.pnl_difference,
                    ],
                )?;
            }
            tx.commit()?;
            debug!(session = %session_id, count = diffs.len(), "parameter diffs saved");
            Ok(())
        })
    }

    pub fn get_parameter_history(&self, param_name: &str) -> Result<Vec<ParameterDiffRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id, param_name, value_a, value_b, winner, winner_value,
                        pnl_a, pnl_b, pnl_difference
                 FROM ab_parameter_diffs WHERE param_name = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![param_name], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, f64>(6)?,
                    row.get::<_, f64>(7)?,
                    row.get::<_, f64>(8)?,
                ))
            })?;

            let mut out = Vec::new();
            for row in rows {
                let (session_id, name, a, b, winner, winner_value, pnl_a, pnl_b, pnl_diff) = row?;
                out.push(ParameterDiffRow {
                    session_id,
                    diff: ParameterDiff {
                        param_name: name,
                        value_a: serde_json::from_str(&a)?,
                        value_b: serde_json::from_str(&b)?,
                        winner: Winner::parse(&winner).unwrap_or(Winner::Tie),
                        winner_value: winner_value
                            .map(|v| serde_json::from_str(&v))
                            .transpose()?,
                        pnl_a,
                        pnl_b,
                        pnl_difference: pnl_diff,
                    },
                });
            }
            Ok(out)
        })
    }

    pub fn get_tested_parameters(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT param_name FROM ab_parameter_diffs ORDER BY param_name",
            )?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    // ---- sniper gate observations ----------------------------------------

    /// Persist every snapshot of one gate run in a single transaction
    pub fn save_sniper_observations(
        &self,
        mint: &str,
        session_id: Option<&str>,
        variant: Option<Variant>,
        observations: &[SniperObservation],
    ) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            for obs in observations {
                tx.execute(
                    "INSERT INTO sniper_gate_observations
                     (token_mint, session_id, variant, check_number, bot_count,
                      bot_exit_count, organic_count, total_buys, total_sells,
                      unique_buyers, pass_conditions_met, sniper_wallets, observed_at_ms)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                    params![
                        mint,
                        session_id,
                        variant.map(|v| v.as_str()),
                        obs.check_number,
                        obs.bot_count as i64,
                        obs.bot_exit_count as i64,
                        obs.organic_count as i64,
                        obs.total_buys as i64,
                        obs.total_sells as i64,
                        obs.unique_buyers as i64,
                        obs.pass_conditions_met,
                        serde_json::to_string(&obs.sniper_wallets)?,
                        obs.observed_at_ms,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }
}
