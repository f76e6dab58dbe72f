//! A/B test harness
//!
//! Runs two independently parameterised pipelines and paper trackers
//! off one detection stream. Every pipeline decision, hypothetical
//! trade, and sniper-gate snapshot is persisted; when the session
//! deadline fires, open positions are force-closed, parameter diffs
//! are computed, and the report is generated.

pub mod analyser;
pub mod report;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::{SessionConfig, VariantConfig};
use crate::detect::{DetectionSource, TokenDetection};
use crate::error::{Error, Result};
use crate::guard::Blacklist;
use crate::monitor::{PaperTracker, TradeClosedEvent};
use crate::pipeline::{AdmissionPipeline, PipelineMode};
use crate::rpc::RpcFacade;
use crate::store::ab::{DecisionRow, ParameterDiff, TradeExit, Winner};
use crate::store::{new_session_id, new_trade_id, ExitReason, StateStore, Variant};

pub use report::SessionReport;

/// Grace period for in-flight pipelines and final ticks at teardown
const STOP_GRACE: Duration = Duration::from_secs(3);

/// One variant's pipeline + tracker pair
#[derive(Clone)]
struct Arm {
    variant: Variant,
    config: VariantConfig,
    pipeline: Arc<AdmissionPipeline>,
    tracker: Arc<PaperTracker>,
}

/// The orchestrator for one A/B session
pub struct AbTestRunner {
    session_id: String,
    session: SessionConfig,
    store: Arc<StateStore>,
    rpc: Arc<dyn RpcFacade>,
    source: Arc<dyn DetectionSource>,
    arms: Vec<Arm>,
}

impl AbTestRunner {
    /// Wire up both variants. Construction fails with the enumerated
    /// violation list when either config or the session is invalid.
    pub fn new(
        store: Arc<StateStore>,
        rpc: Arc<dyn RpcFacade>,
        source: Arc<dyn DetectionSource>,
        session: SessionConfig,
        config_a: VariantConfig,
        config_b: VariantConfig,
    ) -> Result<Self> {
        let session_violations = session.violations();
        if !session_violations.is_empty() {
            return Err(Error::ConfigInvalid(session_violations));
        }

        let session_id = new_session_id();
        let blacklist = Arc::new(Blacklist::load(Arc::clone(&store))?);

        let mut arms = Vec::with_capacity(2);
        for (variant, config) in [(Variant::A, config_a), (Variant::B, config_b)] {
            let tracker = Arc::new(
                PaperTracker::new(config.clone(), Arc::clone(&rpc)).with_store(
                    Arc::clone(&store),
                    &session_id,
                    variant,
                ),
            );

            let pipeline = Arc::new(
                AdmissionPipeline::new(
                    format!("variant-{}", variant),
                    PipelineMode::Paper,
                    config.clone(),
                    Arc::clone(&rpc),
                    Arc::clone(&blacklist),
                )?
                .with_position_lookup(Arc::clone(&tracker) as _),
            );

            arms.push(Arm {
                variant,
                config,
                pipeline,
                tracker,
            });
        }

        Ok(Self {
            session_id,
            session,
            store,
            rpc,
            source,
            arms,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Run the session to its deadline and return the report
    pub async fn run(&self) -> Result<SessionReport> {
        let [arm_a, arm_b] = [&self.arms[0], &self.arms[1]];

        self.store.create_ab_session(
            &self.session_id,
            self.session.description.as_deref(),
            self.session.duration_ms as i64,
            &arm_a.config,
            &arm_b.config,
        )?;

        info!(
            session = %self.session_id,
            duration_ms = self.session.duration_ms,
            "A/B session started"
        );

        // Tracker close events funnel into the run loop so exit
        // persistence stays serial with detection handling
        let (exit_tx, mut exit_rx) = mpsc::channel::<(Variant, TradeClosedEvent)>(256);
        for arm in &self.arms {
            let mut closes = arm.tracker.subscribe();
            let exit_tx = exit_tx.clone();
            let variant = arm.variant;
            tokio::spawn(async move {
                loop {
                    match closes.recv().await {
                        Ok(event) => {
                            if exit_tx.send((variant, event)).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(variant = %variant, missed, "close events missed under load");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            });
            arm.tracker.start();
        }

        let (det_tx, mut det_rx) = mpsc::channel::<TokenDetection>(1024);
        self.source.start(det_tx).await?;

        // The session timer is a hard deadline; a stalled stream still
        // produces a report
        let deadline = tokio::time::sleep(Duration::from_millis(self.session.duration_ms));
        tokio::pin!(deadline);

        let mut tokens_detected: i64 = 0;
        let mut stream_alive = true;
        let mut inflight: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    info!(session = %self.session_id, "session deadline reached");
                    break;
                }

                detection = det_rx.recv(), if stream_alive => {
                    let Some(detection) = detection else {
                        // Keep serving exits until the deadline; the
                        // timer still guarantees a report
                        warn!("detection stream ended before the deadline");
                        stream_alive = false;
                        continue;
                    };
                    tokens_detected += 1;
                    self.audit_detection(&detection);
                    if tokens_detected % 25 == 0 {
                        self.log_pipeline_summaries();
                    }

                    let ctx = DetectionContext {
                        session_id: self.session_id.clone(),
                        store: Arc::clone(&self.store),
                        rpc: Arc::clone(&self.rpc),
                        arms: self.arms.clone(),
                    };
                    inflight.spawn(async move { ctx.process(detection).await });
                }

                Some((variant, event)) = exit_rx.recv() => {
                    self.persist_exit(variant, &event);
                }

                Some(_) = inflight.join_next(), if !inflight.is_empty() => {}
            }
        }

        // Teardown: stop the stream, let in-flight gate polls finish,
        // stop the trackers, force-close leftovers
        self.source.stop();

        let drain = tokio::time::timeout(STOP_GRACE, async {
            while inflight.join_next().await.is_some() {}
        });
        if drain.await.is_err() {
            warn!("in-flight pipelines did not finish within the stop grace");
            inflight.abort_all();
        }

        for arm in &self.arms {
            arm.tracker.stop();
            arm.tracker.close_all(ExitReason::Manual).await;
        }

        // Drain the close events produced by the final ticks and the
        // force-close pass
        loop {
            match tokio::time::timeout(Duration::from_millis(250), exit_rx.recv()).await {
                Ok(Some((variant, event))) => self.persist_exit(variant, &event),
                _ => break,
            }
        }

        self.store
            .complete_ab_session(&self.session_id, tokens_detected)?;

        let diffs = self.compute_and_save_diffs()?;
        let report = report::generate(&self.store, &self.session_id, diffs)?;

        info!(
            session = %self.session_id,
            winner = report.winner.as_str(),
            pnl_difference = report.pnl_difference_sol,
            "A/B session completed"
        );

        Ok(report)
    }

    fn log_pipeline_summaries(&self) {
        for arm in &self.arms {
            let snapshot = arm.pipeline.stats().snapshot();
            info!(
                session = %self.session_id,
                variant = %arm.variant,
                seen = snapshot.tokens_seen,
                admitted = snapshot.tokens_admitted,
                "pipeline summary"
            );
        }
    }

    fn audit_detection(&self, det: &TokenDetection) {
        if let Err(e) = self.store.record_detection(
            &det.signature,
            &det.mint.to_string(),
            &det.bonding_curve.to_string(),
            det.creator.map(|c| c.to_string()).as_deref(),
            det.name.as_deref(),
            det.symbol.as_deref(),
            &det.origin.to_string(),
            det.slot,
        ) {
            warn!(mint = %det.mint, "detection audit row not persisted: {}", e);
        }
    }

    fn persist_exit(&self, variant: Variant, event: &TradeClosedEvent) {
        let mint = event.mint.to_string();
        match self
            .store
            .find_active_trade_id(&self.session_id, variant, &mint)
        {
            Ok(Some(trade_id)) => {
                let exit = TradeExit {
                    exit_timestamp_ms: event.exit_timestamp_ms,
                    exit_reason: event.reason,
                    exit_price_per_token: event.exit_price_per_token,
                    exit_sol_received: event.exit_sol,
                    realized_pnl_sol: event.pnl_sol,
                    realized_pnl_percent: event.pnl_percent,
                    hold_duration_ms: event.hold_duration_ms,
                };
                if let Err(e) = self.store.record_trade_exit(&trade_id, &exit) {
                    error!(trade = %trade_id, "trade exit not persisted: {}", e);
                }
            }
            Ok(None) => {
                warn!(
                    mint = %mint,
                    variant = %variant,
                    "close event with no active trade, skipping"
                );
            }
            Err(e) => {
                error!(mint = %mint, "active trade lookup failed: {}", e);
            }
        }
    }

    /// Diff the two configs and attribute the session's PnL split
    fn compute_and_save_diffs(&self) -> Result<Vec<ParameterDiff>> {
        let pnl_a = self.store.variant_pnl(&self.session_id, Variant::A)?;
        let pnl_b = self.store.variant_pnl(&self.session_id, Variant::B)?;

        let diffs = compute_parameter_diffs(
            &self.arms[0].config,
            &self.arms[1].config,
            pnl_a,
            pnl_b,
        )?;
        self.store.save_parameter_diffs(&self.session_id, &diffs)?;
        Ok(diffs)
    }
}

/// Everything a spawned per-detection task needs
struct DetectionContext {
    session_id: String,
    store: Arc<StateStore>,
    rpc: Arc<dyn RpcFacade>,
    arms: Vec<Arm>,
}

impl DetectionContext {
    async fn process(&self, det: TokenDetection) {
        // One shared curve fetch; each variant still copes with None
        let prefetched = match self.rpc.fetch_curve_state(&det.bonding_curve).await {
            Ok(state) => state,
            Err(e) => {
                warn!(mint = %det.mint, "curve prefetch failed: {}", e);
                None
            }
        };

        // Both variants run concurrently with isolated failures
        let (a, b) = tokio::join!(
            self.run_arm(&self.arms[0], &det, prefetched.clone()),
            self.run_arm(&self.arms[1], &det, prefetched),
        );
        for (variant, result) in [(Variant::A, a), (Variant::B, b)] {
            if let Err(e) = result {
                error!(mint = %det.mint, variant = %variant, "variant processing failed: {}", e);
            }
        }
    }

    async fn run_arm(
        &self,
        arm: &Arm,
        det: &TokenDetection,
        prefetched: Option<crate::pump::CurveState>,
    ) -> Result<()> {
        let outcome = arm.pipeline.process(det, prefetched.clone()).await;
        let mint = det.mint.to_string();

        let decision = DecisionRow {
            session_id: self.session_id.clone(),
            variant: arm.variant,
            token_mint: mint.clone(),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            passed: outcome.passed,
            rejection_stage: outcome.rejection_stage.map(|s| s.as_str().to_string()),
            rejection_reason: outcome.reason.clone(),
            pipeline_duration_ms: outcome.duration_ms as i64,
        };
        // A failed decision write must not block the other decisions
        if let Err(e) = self.store.record_pipeline_decision(&decision) {
            error!(mint = %mint, "pipeline decision not persisted: {}", e);
        }

        if !outcome.sniper_observations.is_empty() {
            if let Err(e) = self.store.save_sniper_observations(
                &mint,
                Some(&self.session_id),
                Some(arm.variant),
                &outcome.sniper_observations,
            ) {
                warn!(mint = %mint, "sniper observations not persisted: {}", e);
            }
        }

        if !outcome.passed {
            return Ok(());
        }

        // Admission: open the paper position and the trade row
        let Some(curve_state) = outcome.curve_state else {
            return Err(Error::Internal(
                "admitted without a curve state".to_string(),
            ));
        };

        let entry = arm
            .tracker
            .record_paper_trade(
                det.mint,
                det.bonding_curve,
                arm.config.quote_amount_sol,
                &curve_state,
            )
            .await?;

        self.store.record_trade_entry(&crate::store::ab::AbTradeRow {
            id: new_trade_id(),
            session_id: self.session_id.clone(),
            variant: arm.variant,
            token_mint: mint,
            entry_timestamp_ms: chrono::Utc::now().timestamp_millis(),
            hypothetical_sol_spent: arm.config.quote_amount_sol,
            entry_price_per_token: entry.price_per_token,
            hypothetical_tokens_received: entry.tokens_received,
            pipeline_duration_ms: outcome.duration_ms as i64,
            status: "active".to_string(),
            exit_timestamp_ms: None,
            exit_reason: None,
            exit_price_per_token: None,
            exit_sol_received: None,
            realized_pnl_sol: None,
            realized_pnl_percent: None,
            hold_duration_ms: None,
        })?;

        Ok(())
    }
}

/// Flatten a config into dot-path scalar leaves for comparison
fn flatten_value(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, serde_json::Value)>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, inner) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_value(&path, inner, out);
            }
        }
        other => out.push((prefix.to_string(), other.clone())),
    }
}

/// Compute a diff row for every tunable that differs between variants
pub fn compute_parameter_diffs(
    config_a: &VariantConfig,
    config_b: &VariantConfig,
    pnl_a: f64,
    pnl_b: f64,
) -> Result<Vec<ParameterDiff>> {
    let value_a = serde_json::to_value(config_a)?;
    let value_b = serde_json::to_value(config_b)?;

    let mut flat_a = Vec::new();
    let mut flat_b = Vec::new();
    flatten_value("", &value_a, &mut flat_a);
    flatten_value("", &value_b, &mut flat_b);

    let map_b: std::collections::HashMap<String, serde_json::Value> =
        flat_b.into_iter().collect();

    let winner = if pnl_a > pnl_b {
        Winner::A
    } else if pnl_b > pnl_a {
        Winner::B
    } else {
        Winner::Tie
    };

    let mut diffs = Vec::new();
    let mut seen_keys = std::collections::HashSet::new();

    for (key, a_val) in &flat_a {
        seen_keys.insert(key.clone());
        let b_val = map_b.get(key).cloned().unwrap_or(serde_json::Value::Null);
        if *a_val == b_val {
            continue;
        }
        diffs.push(make_diff(key, a_val.clone(), b_val, winner, pnl_a, pnl_b));
    }
    // Keys only present on the B side (e.g. an optional block enabled
    // there alone)
    for (key, b_val) in map_b {
        if seen_keys.contains(&key) {
            continue;
        }
        diffs.push(make_diff(
            &key,
            serde_json::Value::Null,
            b_val,
            winner,
            pnl_a,
            pnl_b,
        ));
    }

    Ok(diffs)
}

fn make_diff(
    key: &str,
    value_a: serde_json::Value,
    value_b: serde_json::Value,
    winner: Winner,
    pnl_a: f64,
    pnl_b: f64,
) -> ParameterDiff {
    let winner_value = match winner {
        Winner::A => Some(value_a.clone()),
        Winner::B => Some(value_b.clone()),
        Winner::Tie => None,
    };
    ParameterDiff {
        param_name: key.to_string(),
        value_a,
        value_b,
        winner,
        winner_value,
        pnl_a,
        pnl_b,
        pnl_difference: (pnl_a - pnl_b).abs(),
    }
}
