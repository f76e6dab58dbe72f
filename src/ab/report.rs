//! Session report generation
//!
//! Everything is read back from the store rather than carried in
//! memory, so a report can be regenerated for any completed session.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::store::ab::{AbTradeRow, ParameterDiff, Winner};
use crate::store::{StateStore, Variant};

/// Per-variant rollup of decisions and trades
#[derive(Debug, Clone, Serialize)]
pub struct VariantSummary {
    pub variant: String,
    pub tokens_seen: u64,
    pub passed: u64,
    pub rejected: u64,
    pub rejections_by_stage: HashMap<String, u64>,
    pub trades_entered: usize,
    pub trades_closed: usize,
    pub trades_active: usize,
    pub total_sol_deployed: f64,
    pub total_sol_returned: f64,
    pub realized_pnl_sol: f64,
    pub realized_pnl_percent: f64,
    pub wins: usize,
    pub losses: usize,
    pub avg_win_sol: f64,
    pub avg_loss_sol: f64,
    pub best_trade_sol: Option<f64>,
    pub worst_trade_sol: Option<f64>,
    pub avg_hold_ms: f64,
    pub exits_by_reason: HashMap<String, u64>,
}

/// The complete A/B session report
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: String,
    pub description: Option<String>,
    pub started_at_ms: i64,
    pub completed_at_ms: Option<i64>,
    pub duration_ms: i64,
    pub total_tokens_detected: i64,
    pub variant_a: VariantSummary,
    pub variant_b: VariantSummary,
    #[serde(serialize_with = "serialize_winner")]
    pub winner: Winner,
    pub pnl_difference_sol: f64,
    #[serde(skip)]
    pub parameter_diffs: Vec<ParameterDiff>,
}

fn serialize_winner<S: serde::Serializer>(winner: &Winner, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(winner.as_str())
}

fn summarize(trades: &[AbTradeRow]) -> (f64, f64, Vec<f64>, Vec<i64>, HashMap<String, u64>) {
    let mut deployed = 0.0;
    let mut returned = 0.0;
    let mut pnls = Vec::new();
    let mut holds = Vec::new();
    let mut exits: HashMap<String, u64> = HashMap::new();

    for trade in trades {
        if trade.status != "closed" {
            continue;
        }
        deployed += trade.hypothetical_sol_spent;
        returned += trade.exit_sol_received.unwrap_or(0.0);
        pnls.push(trade.realized_pnl_sol.unwrap_or(0.0));
        holds.push(trade.hold_duration_ms.unwrap_or(0));
        if let Some(reason) = trade.exit_reason {
            *exits.entry(reason.as_str().to_string()).or_insert(0) += 1;
        }
    }

    (deployed, returned, pnls, holds, exits)
}

fn variant_summary(
    store: &StateStore,
    session_id: &str,
    variant: Variant,
) -> Result<VariantSummary> {
    let decisions = store.decision_stats(session_id, variant)?;
    let trades = store.get_ab_trades(session_id, variant)?;

    let closed: usize = trades.iter().filter(|t| t.status == "closed").count();
    let active = trades.len() - closed;

    let (deployed, returned, pnls, holds, exits) = summarize(&trades);
    let realized_pnl: f64 = pnls.iter().sum();
    let realized_pct = if deployed > 0.0 {
        realized_pnl / deployed * 100.0
    } else {
        0.0
    };

    let wins: Vec<f64> = pnls.iter().copied().filter(|p| *p > 0.0).collect();
    let losses: Vec<f64> = pnls.iter().copied().filter(|p| *p <= 0.0).collect();
    let avg = |xs: &[f64]| {
        if xs.is_empty() {
            0.0
        } else {
            xs.iter().sum::<f64>() / xs.len() as f64
        }
    };
    let avg_hold = if holds.is_empty() {
        0.0
    } else {
        holds.iter().sum::<i64>() as f64 / holds.len() as f64
    };

    Ok(VariantSummary {
        variant: variant.as_str().to_string(),
        tokens_seen: decisions.total,
        passed: decisions.passed,
        rejected: decisions.rejected,
        rejections_by_stage: decisions.rejections_by_stage,
        trades_entered: trades.len(),
        trades_closed: closed,
        trades_active: active,
        total_sol_deployed: deployed,
        total_sol_returned: returned,
        realized_pnl_sol: realized_pnl,
        realized_pnl_percent: realized_pct,
        wins: wins.len(),
        losses: losses.len(),
        avg_win_sol: avg(&wins),
        avg_loss_sol: avg(&losses),
        best_trade_sol: pnls.iter().copied().fold(None, |best: Option<f64>, p| {
            Some(best.map_or(p, |b| b.max(p)))
        }),
        worst_trade_sol: pnls.iter().copied().fold(None, |worst: Option<f64>, p| {
            Some(worst.map_or(p, |w| w.min(p)))
        }),
        avg_hold_ms: avg_hold,
        exits_by_reason: exits,
    })
}

/// Build the report for a session from its persisted rows
pub fn generate(
    store: &StateStore,
    session_id: &str,
    parameter_diffs: Vec<ParameterDiff>,
) -> Result<SessionReport> {
    let session = store
        .get_ab_session(session_id)?
        .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

    let variant_a = variant_summary(store, session_id, Variant::A)?;
    let variant_b = variant_summary(store, session_id, Variant::B)?;

    let winner = if variant_a.realized_pnl_sol > variant_b.realized_pnl_sol {
        Winner::A
    } else if variant_b.realized_pnl_sol > variant_a.realized_pnl_sol {
        Winner::B
    } else {
        Winner::Tie
    };
    let pnl_difference_sol = (variant_a.realized_pnl_sol - variant_b.realized_pnl_sol).abs();

    Ok(SessionReport {
        session_id: session.session_id,
        description: session.description,
        started_at_ms: session.started_at_ms,
        completed_at_ms: session.completed_at_ms,
        duration_ms: session.duration_ms,
        total_tokens_detected: session.total_tokens_detected,
        variant_a,
        variant_b,
        winner,
        pnl_difference_sol,
        parameter_diffs,
    })
}

impl SessionReport {
    /// Human-readable rendering for the CLI
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("A/B session {}\n", self.session_id));
        if let Some(desc) = &self.description {
            out.push_str(&format!("  {}\n", desc));
        }
        out.push_str(&format!(
            "  tokens detected: {}, duration: {}ms\n",
            self.total_tokens_detected, self.duration_ms
        ));

        for summary in [&self.variant_a, &self.variant_b] {
            out.push_str(&format!(
                "\nVariant {}: {} seen / {} admitted / {} rejected\n",
                summary.variant, summary.tokens_seen, summary.passed, summary.rejected
            ));
            let mut stages: Vec<(&String, &u64)> = summary.rejections_by_stage.iter().collect();
            stages.sort_by(|a, b| b.1.cmp(a.1));
            for (stage, count) in stages {
                out.push_str(&format!("    {} x {}\n", count, stage));
            }
            out.push_str(&format!(
                "  trades: {} entered, {} closed, {} active\n",
                summary.trades_entered, summary.trades_closed, summary.trades_active
            ));
            out.push_str(&format!(
                "  PnL: {:+.6} SOL ({:+.2}%), {} wins / {} losses\n",
                summary.realized_pnl_sol, summary.realized_pnl_percent, summary.wins, summary.losses
            ));
            let mut exits: Vec<(&String, &u64)> = summary.exits_by_reason.iter().collect();
            exits.sort_by(|a, b| b.1.cmp(a.1));
            for (reason, count) in exits {
                out.push_str(&format!("    {} x {}\n", count, reason));
            }
        }

        out.push_str(&format!(
            "\nWinner: {} (pnl difference {:.6} SOL)\n",
            self.winner.as_str(),
            self.pnl_difference_sol
        ));
        for diff in &self.parameter_diffs {
            out.push_str(&format!(
                "  {}: A={} B={} -> {}\n",
                diff.param_name,
                diff.value_a,
                diff.value_b,
                diff.winner.as_str()
            ));
        }
        out
    }
}
