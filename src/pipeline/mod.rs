//! Admission pipeline
//!
//! Ordered gauntlet a detection must clear before a position is taken.
//! Cheap in-memory checks run first, RPC-backed checks last, and the
//! first failing stage short-circuits the rest. Each token's stage
//! decisions accumulate in a per-token buffer and flush as one log
//! block, so concurrent tokens never interleave lines.

pub mod deep;
pub mod momentum;
pub mod pattern;
pub mod seen;
pub mod sniper;
pub mod stats;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use tokio::time::Instant;
use tracing::info;

use crate::config::VariantConfig;
use crate::detect::TokenDetection;
use crate::error::Result;
use crate::guard::{Blacklist, ExposureGuard};
use crate::pump::CurveState;
use crate::rpc::{fetch_mint_info_any, RpcFacade};
use crate::store::ab::SniperObservation;
use crate::store::StateStore;

use momentum::MomentumData;
use seen::SeenCache;
use stats::{PipelineStats, TokenOutcome};

/// Substrings in creation logs that mark a launch as hostile
const SUSPICIOUS_LOG_MARKERS: &[&str] = &["InitializeMayhemState"];

/// Rolling window for the admissions-per-hour stage
const RATE_WINDOW: Duration = Duration::from_secs(3600);

/// The stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectStage {
    Dedup,
    TokenAge,
    RateLimit,
    Blacklist,
    Exposure,
    Pattern,
    SuspiciousInstruction,
    MintInfo,
    DeepFilters,
    Momentum,
    Sniper,
}

impl RejectStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectStage::Dedup => "dedup",
            RejectStage::TokenAge => "token_age",
            RejectStage::RateLimit => "rate_limit",
            RejectStage::Blacklist => "blacklist",
            RejectStage::Exposure => "exposure",
            RejectStage::Pattern => "pattern",
            RejectStage::SuspiciousInstruction => "suspicious_instruction",
            RejectStage::MintInfo => "mint_info",
            RejectStage::DeepFilters => "deep_filters",
            RejectStage::Momentum => "momentum",
            RejectStage::Sniper => "sniper",
        }
    }
}

impl std::fmt::Display for RejectStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a pipeline feeds the paper harness or live trading.
/// Paper pipelines run the token-age and rate-limit stages; live
/// pipelines run the exposure stage instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    Paper,
    Live,
}

/// The result of one detection's run through the pipeline
#[derive(Debug, Clone)]
pub struct AdmissionOutcome {
    pub passed: bool,
    pub rejection_stage: Option<RejectStage>,
    pub reason: Option<String>,
    /// Curve state observed at the deep-filter stage, when reached
    pub curve_state: Option<CurveState>,
    /// Momentum gate data, when that gate resolved the pipeline
    pub momentum: Option<MomentumData>,
    /// Sniper gate snapshots, retained pass or fail
    pub sniper_observations: Vec<SniperObservation>,
    pub duration_ms: u64,
}

/// Open-position and pending-trade visibility for the dedup stage
#[async_trait]
pub trait PositionLookup: Send + Sync {
    async fn has_open_position(&self, mint: &Pubkey) -> bool;
    async fn has_pending_buy(&self, mint: &Pubkey) -> bool;
}

/// Lookup that never matches; paper variants start with this until the
/// tracker is wired in
pub struct NoLookup;

#[async_trait]
impl PositionLookup for NoLookup {
    async fn has_open_position(&self, _mint: &Pubkey) -> bool {
        false
    }

    async fn has_pending_buy(&self, _mint: &Pubkey) -> bool {
        false
    }
}

/// Lookup backed by the durable store (live trading)
pub struct StoreLookup(pub Arc<StateStore>);

#[async_trait]
impl PositionLookup for StoreLookup {
    async fn has_open_position(&self, mint: &Pubkey) -> bool {
        self.0
            .has_open_position(&mint.to_string())
            .unwrap_or(false)
    }

    async fn has_pending_buy(&self, mint: &Pubkey) -> bool {
        self.0.has_pending_buy(&mint.to_string()).unwrap_or(false)
    }
}

/// Per-token log buffer; flushed once at pipeline end
struct TokenLog {
    header: String,
    lines: Vec<String>,
}

impl TokenLog {
    fn new(label: &str, det: &TokenDetection) -> Self {
        Self {
            header: format!(
                "[{}] {} ({})",
                label,
                det.symbol.as_deref().unwrap_or("?"),
                det.mint
            ),
            lines: Vec::new(),
        }
    }

    fn stage(&mut self, stage: RejectStage, passed: bool, detail: &str, elapsed: Duration) {
        self.lines.push(format!(
            "  {} {} ({}ms){}",
            if passed { "PASS" } else { "FAIL" },
            stage,
            elapsed.as_millis(),
            if detail.is_empty() {
                String::new()
            } else {
                format!(": {}", detail)
            },
        ));
    }

    fn flush(self, passed: bool, duration_ms: u64) {
        info!(
            "{} -> {} in {}ms\n{}",
            self.header,
            if passed { "ADMITTED" } else { "REJECTED" },
            duration_ms,
            self.lines.join("\n")
        );
    }
}

/// One variant's admission pipeline.
///
/// `process` is re-entrant over distinct detections; the dedup set and
/// rate window are the only shared state and sit behind their own
/// locks.
pub struct AdmissionPipeline {
    label: String,
    mode: PipelineMode,
    config: VariantConfig,
    rpc: Arc<dyn RpcFacade>,
    blacklist: Arc<Blacklist>,
    positions: Arc<dyn PositionLookup>,
    exposure: Option<Arc<ExposureGuard>>,
    seen: Mutex<SeenCache>,
    rate_window: Mutex<VecDeque<Instant>>,
    stats: Arc<PipelineStats>,
}

impl AdmissionPipeline {
    /// Build a pipeline. Fails with the full violation list when the
    /// variant config is unusable.
    pub fn new(
        label: impl Into<String>,
        mode: PipelineMode,
        config: VariantConfig,
        rpc: Arc<dyn RpcFacade>,
        blacklist: Arc<Blacklist>,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            label: label.into(),
            mode,
            config,
            rpc,
            blacklist,
            positions: Arc::new(NoLookup),
            exposure: None,
            seen: Mutex::new(SeenCache::default()),
            rate_window: Mutex::new(VecDeque::new()),
            stats: Arc::new(PipelineStats::new()),
        })
    }

    pub fn with_position_lookup(mut self, lookup: Arc<dyn PositionLookup>) -> Self {
        self.positions = lookup;
        self
    }

    pub fn with_exposure(mut self, guard: Arc<ExposureGuard>) -> Self {
        self.exposure = Some(guard);
        self
    }

    pub fn config(&self) -> &VariantConfig {
        &self.config
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Run a detection through every stage.
    ///
    /// `prefetched_curve` is the harness's shared curve fetch; a None
    /// here simply means the deep-filter stage fetches for itself.
    pub async fn process(
        &self,
        det: &TokenDetection,
        prefetched_curve: Option<CurveState>,
    ) -> AdmissionOutcome {
        let started = Instant::now();
        let mut log = TokenLog::new(&self.label, det);
        let mut curve_state: Option<CurveState> = None;
        let mut momentum: Option<MomentumData> = None;
        let mut sniper_observations: Vec<SniperObservation> = Vec::new();

        let rejection = self
            .run_stages(
                det,
                prefetched_curve,
                &mut log,
                &mut curve_state,
                &mut momentum,
                &mut sniper_observations,
            )
            .await;

        let duration_ms = started.elapsed().as_millis() as u64;
        let passed = rejection.is_none();

        // Admissions-per-hour window records admissions only, never
        // attempts
        if passed && self.mode == PipelineMode::Paper {
            self.rate_window
                .lock()
                .expect("rate window lock")
                .push_back(Instant::now());
        }

        self.stats.record_outcome(TokenOutcome {
            mint: det.mint.to_string(),
            passed,
            rejected_at: rejection.as_ref().map(|(stage, _)| stage.as_str()),
            at_ms: chrono::Utc::now().timestamp_millis(),
        });

        log.flush(passed, duration_ms);

        let (rejection_stage, reason) = match rejection {
            Some((stage, reason)) => (Some(stage), Some(reason)),
            None => (None, None),
        };

        AdmissionOutcome {
            passed,
            rejection_stage,
            reason,
            curve_state,
            momentum,
            sniper_observations,
            duration_ms,
        }
    }

    async fn run_stages(
        &self,
        det: &TokenDetection,
        prefetched_curve: Option<CurveState>,
        log: &mut TokenLog,
        curve_state: &mut Option<CurveState>,
        momentum: &mut Option<MomentumData>,
        sniper_observations: &mut Vec<SniperObservation>,
    ) -> Option<(RejectStage, String)> {
        // Stage 1: dedup
        if let Some(rejection) = self.check_dedup(det, log).await {
            return Some(rejection);
        }

        if self.mode == PipelineMode::Paper {
            // Stage 2: token age
            if let Some(rejection) = self.check_token_age(det, log) {
                return Some(rejection);
            }
            // Stage 3: rate limit
            if let Some(rejection) = self.check_rate_limit(log) {
                return Some(rejection);
            }
        }

        // Stage 4: blacklist
        if let Some(rejection) = self.check_blacklist(det, log).await {
            return Some(rejection);
        }

        // Stage 5: exposure (live only)
        if self.mode == PipelineMode::Live {
            if let Some(rejection) = self.check_exposure(log).await {
                return Some(rejection);
            }
        }

        // Stage 6: name/symbol patterns
        if let Some(rejection) = self.check_pattern(det, log) {
            return Some(rejection);
        }

        // Stage 7: suspicious instructions in creation logs
        if let Some(rejection) = self.check_suspicious(det, log) {
            return Some(rejection);
        }

        // Stage 8: mint info (1 RPC)
        if let Some(rejection) = self.check_mint_info(det, log).await {
            return Some(rejection);
        }

        // Stage 9: deep curve filters (1 RPC unless prefetched)
        match self.check_deep(det, prefetched_curve, log).await {
            Ok(state) => *curve_state = Some(state),
            Err(rejection) => return Some(rejection),
        }

        // Stage 10: momentum or sniper gate (polling)
        self.check_stage4(det, log, momentum, sniper_observations)
            .await
    }

    async fn check_dedup(
        &self,
        det: &TokenDetection,
        log: &mut TokenLog,
    ) -> Option<(RejectStage, String)> {
        let t = Instant::now();
        let curve_key = det.bonding_curve.to_string();

        let already_seen = {
            let mut seen = self.seen.lock().expect("seen lock");
            if seen.contains(&curve_key) {
                true
            } else {
                seen.insert(&curve_key);
                false
            }
        };
        if already_seen {
            let reason = "ALREADY_PROCESSED: bonding curve seen before".to_string();
            self.fail(log, RejectStage::Dedup, &reason, t);
            return Some((RejectStage::Dedup, reason));
        }

        if self.positions.has_open_position(&det.mint).await {
            let reason = "ALREADY_OWNED: open position exists".to_string();
            self.fail(log, RejectStage::Dedup, &reason, t);
            return Some((RejectStage::Dedup, reason));
        }

        if self.positions.has_pending_buy(&det.mint).await {
            let reason = "PENDING_TRADE: unresolved buy intent".to_string();
            self.fail(log, RejectStage::Dedup, &reason, t);
            return Some((RejectStage::Dedup, reason));
        }

        self.pass(log, RejectStage::Dedup, "", t);
        None
    }

    fn check_token_age(
        &self,
        det: &TokenDetection,
        log: &mut TokenLog,
    ) -> Option<(RejectStage, String)> {
        let t = Instant::now();
        if self.config.max_token_age_seconds == 0 {
            self.pass(log, RejectStage::TokenAge, "disabled", t);
            return None;
        }

        let age = det.age_seconds(chrono::Utc::now().timestamp_millis());
        if age > self.config.max_token_age_seconds as i64 {
            let reason = format!(
                "TOKEN_TOO_OLD: {}s old, limit {}s",
                age, self.config.max_token_age_seconds
            );
            self.fail(log, RejectStage::TokenAge, &reason, t);
            return Some((RejectStage::TokenAge, reason));
        }

        self.pass(log, RejectStage::TokenAge, &format!("{}s old", age), t);
        None
    }

    fn check_rate_limit(&self, log: &mut TokenLog) -> Option<(RejectStage, String)> {
        let t = Instant::now();
        let mut window = self.rate_window.lock().expect("rate window lock");

        while window.front().is_some_and(|t| t.elapsed() >= RATE_WINDOW) {
            window.pop_front();
        }

        let count = window.len() as u32;
        if count >= self.config.max_trades_per_hour {
            let reason = format!(
                "RATE_LIMIT: {} admissions in the last hour, cap {}",
                count, self.config.max_trades_per_hour
            );
            drop(window);
            self.fail(log, RejectStage::RateLimit, &reason, t);
            return Some((RejectStage::RateLimit, reason));
        }
        drop(window);

        self.pass(
            log,
            RejectStage::RateLimit,
            &format!("{}/{} this hour", count, self.config.max_trades_per_hour),
            t,
        );
        None
    }

    async fn check_blacklist(
        &self,
        det: &TokenDetection,
        log: &mut TokenLog,
    ) -> Option<(RejectStage, String)> {
        let t = Instant::now();

        if self.blacklist.is_banned_mint(&det.mint).await {
            let reason = "TOKEN_BLACKLISTED: mint is banned".to_string();
            self.fail(log, RejectStage::Blacklist, &reason, t);
            return Some((RejectStage::Blacklist, reason));
        }

        if let Some(creator) = &det.creator {
            if self.blacklist.is_banned_creator(creator).await {
                let reason = format!("CREATOR_BLACKLISTED: {}", creator);
                self.fail(log, RejectStage::Blacklist, &reason, t);
                return Some((RejectStage::Blacklist, reason));
            }
        }

        self.pass(log, RejectStage::Blacklist, "", t);
        None
    }

    async fn check_exposure(&self, log: &mut TokenLog) -> Option<(RejectStage, String)> {
        let t = Instant::now();
        let Some(guard) = &self.exposure else {
            self.pass(log, RejectStage::Exposure, "no guard wired", t);
            return None;
        };

        match guard.can_trade(self.config.quote_amount_sol).await {
            Ok(()) => {
                self.pass(log, RejectStage::Exposure, "", t);
                None
            }
            Err(denial) => {
                let reason = format!("{}: {}", denial.tag(), denial);
                self.fail(log, RejectStage::Exposure, &reason, t);
                Some((RejectStage::Exposure, reason))
            }
        }
    }

    fn check_pattern(
        &self,
        det: &TokenDetection,
        log: &mut TokenLog,
    ) -> Option<(RejectStage, String)> {
        let t = Instant::now();
        if let Some(violation) =
            pattern::junk_violation(det.name.as_deref(), det.symbol.as_deref())
        {
            let reason = format!("JUNK_NAME: {}", violation);
            self.fail(log, RejectStage::Pattern, &reason, t);
            return Some((RejectStage::Pattern, reason));
        }

        self.pass(log, RejectStage::Pattern, "", t);
        None
    }

    fn check_suspicious(
        &self,
        det: &TokenDetection,
        log: &mut TokenLog,
    ) -> Option<(RejectStage, String)> {
        let t = Instant::now();
        for line in &det.raw_logs {
            for marker in SUSPICIOUS_LOG_MARKERS {
                if line.contains(marker) {
                    let reason = format!("SUSPICIOUS_INSTRUCTION: {}", marker);
                    self.fail(log, RejectStage::SuspiciousInstruction, &reason, t);
                    return Some((RejectStage::SuspiciousInstruction, reason));
                }
            }
        }

        self.pass(log, RejectStage::SuspiciousInstruction, "", t);
        None
    }

    async fn check_mint_info(
        &self,
        det: &TokenDetection,
        log: &mut TokenLog,
    ) -> Option<(RejectStage, String)> {
        let t = Instant::now();

        let info = match fetch_mint_info_any(self.rpc.as_ref(), &det.mint).await {
            Ok(info) => info,
            Err(e) => {
                let reason = format!("MINT_INFO_FETCH_FAILED: {}", e);
                self.fail(log, RejectStage::MintInfo, &reason, t);
                return Some((RejectStage::MintInfo, reason));
            }
        };

        let Some(info) = info else {
            let reason = "MINT_INFO_UNAVAILABLE: not found under either token program".to_string();
            self.fail(log, RejectStage::MintInfo, &reason, t);
            return Some((RejectStage::MintInfo, reason));
        };

        if let Some(violation) = info.admission_violation() {
            let reason = format!("MINT_UNSAFE: {}", violation);
            self.fail(log, RejectStage::MintInfo, &reason, t);
            return Some((RejectStage::MintInfo, reason));
        }

        self.pass(
            log,
            RejectStage::MintInfo,
            if info.is_token_2022 { "token-2022" } else { "spl" },
            t,
        );
        None
    }

    async fn check_deep(
        &self,
        det: &TokenDetection,
        prefetched: Option<CurveState>,
        log: &mut TokenLog,
    ) -> std::result::Result<CurveState, (RejectStage, String)> {
        let t = Instant::now();

        let state = match prefetched {
            Some(state) => Some(state),
            None => match self.rpc.fetch_curve_state(&det.bonding_curve).await {
                Ok(state) => state,
                Err(e) => {
                    let reason = format!("CURVE_FETCH_FAILED: {}", e);
                    self.fail(log, RejectStage::DeepFilters, &reason, t);
                    return Err((RejectStage::DeepFilters, reason));
                }
            },
        };

        let Some(state) = state else {
            let reason = "CURVE_NOT_FOUND: bonding curve account missing".to_string();
            self.fail(log, RejectStage::DeepFilters, &reason, t);
            return Err((RejectStage::DeepFilters, reason));
        };

        if state.complete {
            let reason = "ALREADY_GRADUATED: curve is complete".to_string();
            self.fail(log, RejectStage::DeepFilters, &reason, t);
            return Err((RejectStage::DeepFilters, reason));
        }

        match deep::evaluate(&self.config, &state) {
            deep::DeepVerdict::Pass(scores) => {
                self.pass(
                    log,
                    RejectStage::DeepFilters,
                    &format!("score {:.1}", scores.normalized),
                    t,
                );
                Ok(state)
            }
            deep::DeepVerdict::Reject { reason } => {
                self.fail(log, RejectStage::DeepFilters, &reason, t);
                Err((RejectStage::DeepFilters, reason))
            }
        }
    }

    async fn check_stage4(
        &self,
        det: &TokenDetection,
        log: &mut TokenLog,
        momentum_out: &mut Option<MomentumData>,
        sniper_observations: &mut Vec<SniperObservation>,
    ) -> Option<(RejectStage, String)> {
        let t = Instant::now();

        // Sniper gate takes priority when enabled
        if let Some(sniper_config) = self.config.sniper() {
            let outcome =
                sniper::run(self.rpc.as_ref(), &det.bonding_curve, det.slot, sniper_config).await;
            *sniper_observations = outcome.observations;

            return match outcome.verdict {
                sniper::SniperVerdict::Pass => {
                    self.pass(
                        log,
                        RejectStage::Sniper,
                        &format!("{} checks", sniper_observations.len()),
                        t,
                    );
                    None
                }
                sniper::SniperVerdict::Timeout => {
                    let reason = "TIMEOUT: snipers still holding under exit threshold".to_string();
                    self.fail(log, RejectStage::Sniper, &reason, t);
                    Some((RejectStage::Sniper, reason))
                }
                sniper::SniperVerdict::LowOrganic => {
                    let reason = "LOW_ORGANIC: not enough organic buyers".to_string();
                    self.fail(log, RejectStage::Sniper, &reason, t);
                    Some((RejectStage::Sniper, reason))
                }
                sniper::SniperVerdict::RpcFailed(e) => {
                    let reason = format!("SNIPER_RPC_FETCH_FAILED: {}", e);
                    self.fail(log, RejectStage::Sniper, &reason, t);
                    Some((RejectStage::Sniper, reason))
                }
            };
        }

        match momentum::run(self.rpc.as_ref(), &det.bonding_curve, &self.config).await {
            momentum::MomentumVerdict::Pass(data) => {
                *momentum_out = Some(data);
                self.pass(
                    log,
                    RejectStage::Momentum,
                    &format!("{} buys on check {}", data.buy_count, data.checks_performed),
                    t,
                );
                None
            }
            momentum::MomentumVerdict::ThresholdNotMet(data) => {
                *momentum_out = Some(data);
                let reason = format!(
                    "MOMENTUM_THRESHOLD_NOT_MET: {} buys after {} checks, needed {}",
                    data.buy_count, data.checks_performed, self.config.momentum_min_total_buys
                );
                self.fail(log, RejectStage::Momentum, &reason, t);
                Some((RejectStage::Momentum, reason))
            }
            momentum::MomentumVerdict::RpcFailed(e) => {
                let reason = format!("MOMENTUM_RPC_FETCH_FAILED: {}", e);
                self.fail(log, RejectStage::Momentum, &reason, t);
                Some((RejectStage::Momentum, reason))
            }
        }
    }

    fn pass(&self, log: &mut TokenLog, stage: RejectStage, detail: &str, started: Instant) {
        self.stats.record_stage(stage.as_str(), true);
        log.stage(stage, true, detail, started.elapsed());
    }

    fn fail(&self, log: &mut TokenLog, stage: RejectStage, detail: &str, started: Instant) {
        self.stats.record_stage(stage.as_str(), false);
        log.stage(stage, false, detail, started.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::testutil::detection;
    use crate::pump::program::DISCRIMINATORS;
    use crate::pump::{MintInfo, TokenProgram};
    use crate::rpc::mock::{tx_with_instruction, MockRpc};
    use crate::rpc::SignatureInfo;
    use crate::store::StateStore;

    fn revoked_mint_info() -> MintInfo {
        MintInfo {
            mint_authority: None,
            freeze_authority: None,
            decimals: 6,
            supply: 1_000_000_000_000,
            is_token_2022: false,
        }
    }

    fn healthy_curve() -> CurveState {
        CurveState::new(
            30_000_000_000,
            1_000_000_000_000,
            10_000_000_000, // 10 SOL, inside the default 5..60 band
            800_000_000_000,
            1_000_000_000_000,
            false,
            Pubkey::new_unique(),
        )
    }

    fn buy_b58() -> String {
        let mut data = DISCRIMINATORS::BUY.to_vec();
        data.extend_from_slice(&[0u8; 8]);
        bs58::encode(data).into_string()
    }

    /// Script enough buys for the default momentum gate to pass on the
    /// first check
    fn script_momentum_pass(rpc: &MockRpc, curve: Pubkey, buys: usize) {
        let mut sigs = Vec::new();
        for i in 0..buys {
            let sig = format!("mbuy{}", i);
            sigs.push(SignatureInfo {
                signature: sig.clone(),
                slot: 100,
            });
            rpc.insert_tx(tx_with_instruction(&sig, 100, true, &buy_b58()));
        }
        rpc.push_signatures(curve, sigs);
    }

    /// A pipeline + mock scripted so a clean detection is admitted
    async fn admitting_fixture(config: VariantConfig) -> (AdmissionPipeline, Arc<MockRpc>) {
        let rpc = Arc::new(MockRpc::new());
        let store = Arc::new(StateStore::in_memory().unwrap());
        let blacklist = Arc::new(Blacklist::load(store).unwrap());

        let pipeline = AdmissionPipeline::new(
            "variant-A",
            PipelineMode::Paper,
            config,
            Arc::clone(&rpc) as Arc<dyn RpcFacade>,
            blacklist,
        )
        .unwrap();

        (pipeline, rpc)
    }

    fn fast_config() -> VariantConfig {
        VariantConfig {
            momentum_initial_delay_ms: 10,
            momentum_recheck_interval_ms: 10,
            momentum_min_total_buys: 3,
            momentum_max_checks: 2,
            ..Default::default()
        }
    }

    fn script_admission(rpc: &MockRpc, det: &TokenDetection) {
        rpc.set_mint_info(det.mint, TokenProgram::Spl, revoked_mint_info());
        rpc.set_curve_state(det.bonding_curve, Some(healthy_curve()));
        script_momentum_pass(rpc, det.bonding_curve, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_detection_is_admitted() {
        let (pipeline, rpc) = admitting_fixture(fast_config()).await;
        let det = detection("Solar Flare", "FLARE");
        script_admission(&rpc, &det);

        let outcome = pipeline.process(&det, None).await;
        assert!(outcome.passed, "rejected: {:?}", outcome.reason);
        assert!(outcome.rejection_stage.is_none());
        assert!(outcome.curve_state.is_some());
        let momentum = outcome.momentum.unwrap();
        assert_eq!(momentum.buy_count, 5);
        assert_eq!(momentum.checks_performed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_detection_of_same_curve_rejected() {
        let (pipeline, rpc) = admitting_fixture(fast_config()).await;
        let det = detection("Solar Flare", "FLARE");
        script_admission(&rpc, &det);

        assert!(pipeline.process(&det, None).await.passed);

        let outcome = pipeline.process(&det, None).await;
        assert!(!outcome.passed);
        assert_eq!(outcome.rejection_stage, Some(RejectStage::Dedup));
        assert!(outcome.reason.unwrap().starts_with("ALREADY_PROCESSED"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_position_and_pending_trade_reject() {
        struct FixedLookup {
            owned: bool,
            pending: bool,
        }
        #[async_trait]
        impl PositionLookup for FixedLookup {
            async fn has_open_position(&self, _mint: &Pubkey) -> bool {
                self.owned
            }
            async fn has_pending_buy(&self, _mint: &Pubkey) -> bool {
                self.pending
            }
        }

        let (pipeline, _rpc) = admitting_fixture(fast_config()).await;
        let pipeline = pipeline.with_position_lookup(Arc::new(FixedLookup {
            owned: true,
            pending: false,
        }));
        let outcome = pipeline.process(&detection("Tok", "TOK"), None).await;
        assert!(outcome.reason.unwrap().starts_with("ALREADY_OWNED"));

        let (pipeline, _rpc) = admitting_fixture(fast_config()).await;
        let pipeline = pipeline.with_position_lookup(Arc::new(FixedLookup {
            owned: false,
            pending: true,
        }));
        let outcome = pipeline.process(&detection("Tok", "TOK"), None).await;
        assert!(outcome.reason.unwrap().starts_with("PENDING_TRADE"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_age_rejects_stale_detection() {
        let (pipeline, _rpc) = admitting_fixture(VariantConfig {
            max_token_age_seconds: 30,
            ..fast_config()
        })
        .await;

        let mut det = detection("Tok", "TOK");
        det.detected_at_ms = chrono::Utc::now().timestamp_millis() - 60_000;

        let outcome = pipeline.process(&det, None).await;
        assert_eq!(outcome.rejection_stage, Some(RejectStage::TokenAge));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_rolls_over_after_an_hour() {
        let (pipeline, rpc) = admitting_fixture(VariantConfig {
            max_trades_per_hour: 2,
            ..fast_config()
        })
        .await;

        // Two admissions fill the window
        for i in 0..2 {
            let det = detection(&format!("Tok{}", i), "TOK");
            script_admission(&rpc, &det);
            let outcome = pipeline.process(&det, None).await;
            assert!(outcome.passed, "rejected: {:?}", outcome.reason);
        }

        // Third is rate limited
        let det = detection("Tok2", "TOK");
        script_admission(&rpc, &det);
        let outcome = pipeline.process(&det, None).await;
        assert_eq!(outcome.rejection_stage, Some(RejectStage::RateLimit));

        // One hour after the oldest admission the window frees up
        tokio::time::advance(Duration::from_secs(3601)).await;
        let det = detection("Tok3", "TOK");
        script_admission(&rpc, &det);
        let outcome = pipeline.process(&det, None).await;
        assert!(outcome.passed, "rejected: {:?}", outcome.reason);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blacklisted_creator_rejected_before_any_rpc() {
        let rpc = Arc::new(MockRpc::new());
        let store = Arc::new(StateStore::in_memory().unwrap());
        let blacklist = Arc::new(Blacklist::load(store).unwrap());

        let det = detection("Nice Token", "NICE");
        blacklist
            .ban_creator(det.creator.as_ref().unwrap(), Some("serial rugger"))
            .await
            .unwrap();

        let pipeline = AdmissionPipeline::new(
            "variant-A",
            PipelineMode::Paper,
            fast_config(),
            Arc::clone(&rpc) as Arc<dyn RpcFacade>,
            blacklist,
        )
        .unwrap();

        let outcome = pipeline.process(&det, None).await;
        assert_eq!(outcome.rejection_stage, Some(RejectStage::Blacklist));
        assert!(outcome.reason.unwrap().starts_with("CREATOR_BLACKLISTED"));
        // Rejected before the mint-info or curve stages issued anything
        assert_eq!(
            rpc.curve_fetch_calls.load(std::sync::atomic::Ordering::SeqCst),
            0
        );
        assert_eq!(
            rpc.signature_calls.load(std::sync::atomic::Ordering::SeqCst),
            0
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_junk_name_rejected() {
        let (pipeline, _rpc) = admitting_fixture(fast_config()).await;
        let outcome = pipeline.process(&detection("rugpull", "RUG"), None).await;
        assert_eq!(outcome.rejection_stage, Some(RejectStage::Pattern));
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspicious_log_rejected() {
        let (pipeline, _rpc) = admitting_fixture(fast_config()).await;
        let mut det = detection("Tok", "TOK");
        det.raw_logs
            .push("Program log: Instruction: InitializeMayhemState".to_string());

        let outcome = pipeline.process(&det, None).await;
        assert_eq!(
            outcome.rejection_stage,
            Some(RejectStage::SuspiciousInstruction)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_mint_authority_rejected() {
        let (pipeline, rpc) = admitting_fixture(fast_config()).await;
        let det = detection("Tok", "TOK");
        rpc.set_mint_info(
            det.mint,
            TokenProgram::Spl,
            MintInfo {
                mint_authority: Some(Pubkey::new_unique()),
                ..revoked_mint_info()
            },
        );

        let outcome = pipeline.process(&det, None).await;
        assert_eq!(outcome.rejection_stage, Some(RejectStage::MintInfo));
        assert!(outcome.reason.unwrap().contains("mint authority"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_mint_rejected() {
        let (pipeline, _rpc) = admitting_fixture(fast_config()).await;
        let outcome = pipeline.process(&detection("Tok", "TOK"), None).await;
        assert_eq!(outcome.rejection_stage, Some(RejectStage::MintInfo));
        assert!(outcome.reason.unwrap().starts_with("MINT_INFO_UNAVAILABLE"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_2022_probe_takes_priority() {
        let (pipeline, rpc) = admitting_fixture(fast_config()).await;
        let det = detection("Tok", "TOK");
        rpc.set_mint_info(
            det.mint,
            TokenProgram::Token2022,
            MintInfo {
                is_token_2022: true,
                ..revoked_mint_info()
            },
        );
        rpc.set_curve_state(det.bonding_curve, Some(healthy_curve()));
        script_momentum_pass(&rpc, det.bonding_curve, 5);

        let outcome = pipeline.process(&det, None).await;
        assert!(outcome.passed, "rejected: {:?}", outcome.reason);
    }

    #[tokio::test(start_paused = true)]
    async fn test_graduated_curve_rejected() {
        let (pipeline, rpc) = admitting_fixture(fast_config()).await;
        let det = detection("Tok", "TOK");
        rpc.set_mint_info(det.mint, TokenProgram::Spl, revoked_mint_info());

        let mut graduated = healthy_curve();
        graduated.complete = true;

        // Passed in as the harness prefetch; no further curve fetch
        let outcome = pipeline.process(&det, Some(graduated)).await;
        assert_eq!(outcome.rejection_stage, Some(RejectStage::DeepFilters));
        assert!(outcome.reason.unwrap().starts_with("ALREADY_GRADUATED"));
        assert_eq!(
            rpc.curve_fetch_calls.load(std::sync::atomic::Ordering::SeqCst),
            0
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_momentum_threshold_not_met() {
        let (pipeline, rpc) = admitting_fixture(fast_config()).await;
        let det = detection("Tok", "TOK");
        rpc.set_mint_info(det.mint, TokenProgram::Spl, revoked_mint_info());
        rpc.set_curve_state(det.bonding_curve, Some(healthy_curve()));
        script_momentum_pass(&rpc, det.bonding_curve, 1); // below min 3

        let outcome = pipeline.process(&det, None).await;
        assert_eq!(outcome.rejection_stage, Some(RejectStage::Momentum));
        assert!(outcome
            .reason
            .unwrap()
            .starts_with("MOMENTUM_THRESHOLD_NOT_MET"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sniper_gate_takes_priority_over_momentum() {
        let config = VariantConfig {
            sniper_gate: Some(crate::config::SniperGateConfig {
                enabled: true,
                log_only: true,
                max_checks: 1,
                initial_delay_ms: 10,
                recheck_interval_ms: 10,
                ..Default::default()
            }),
            ..fast_config()
        };
        let (pipeline, rpc) = admitting_fixture(config).await;
        let det = detection("Tok", "TOK");
        rpc.set_mint_info(det.mint, TokenProgram::Spl, revoked_mint_info());
        rpc.set_curve_state(det.bonding_curve, Some(healthy_curve()));

        // Log-only sniper gate passes with a snapshot even on an empty
        // history; momentum scripting is absent on purpose
        let outcome = pipeline.process(&det, None).await;
        assert!(outcome.passed, "rejected: {:?}", outcome.reason);
        assert!(outcome.momentum.is_none());
        assert_eq!(outcome.sniper_observations.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_mode_runs_exposure_not_rate_limit() {
        use crate::guard::{ExposureGuard, ExposureLimits};

        let rpc = Arc::new(MockRpc::new());
        let store = Arc::new(StateStore::in_memory().unwrap());
        let blacklist = Arc::new(Blacklist::load(Arc::clone(&store)).unwrap());

        // Guard with no balance: every trade is refused
        let guard = Arc::new(ExposureGuard::new(ExposureLimits::default()));

        let pipeline = AdmissionPipeline::new(
            "live",
            PipelineMode::Live,
            fast_config(),
            Arc::clone(&rpc) as Arc<dyn RpcFacade>,
            blacklist,
        )
        .unwrap()
        .with_position_lookup(Arc::new(StoreLookup(Arc::clone(&store))))
        .with_exposure(guard);

        let det = detection("Tok", "TOK");
        let outcome = pipeline.process(&det, None).await;
        assert_eq!(outcome.rejection_stage, Some(RejectStage::Exposure));
        assert!(outcome.reason.unwrap().starts_with("INSUFFICIENT_BALANCE"));

        // An open store position rejects at dedup through StoreLookup
        let det2 = detection("Tok2", "TOK2");
        store
            .open_position(&crate::store::PositionRow {
                token_mint: det2.mint.to_string(),
                bonding_curve: det2.bonding_curve.to_string(),
                entry_amount_sol: 0.05,
                actual_cost_sol: 0.05,
                token_amount: 1,
                entry_timestamp_ms: 0,
                buy_signature: None,
                is_token_2022: None,
            })
            .unwrap();
        let outcome = pipeline.process(&det2, None).await;
        assert_eq!(outcome.rejection_stage, Some(RejectStage::Dedup));
        assert!(outcome.reason.unwrap().starts_with("ALREADY_OWNED"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_config_rejected_at_construction() {
        let rpc = Arc::new(MockRpc::new());
        let store = Arc::new(StateStore::in_memory().unwrap());
        let blacklist = Arc::new(Blacklist::load(store).unwrap());

        let result = AdmissionPipeline::new(
            "bad",
            PipelineMode::Paper,
            VariantConfig {
                quote_amount_sol: 0.0,
                ..Default::default()
            },
            rpc as Arc<dyn RpcFacade>,
            blacklist,
        );
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_track_stage_outcomes() {
        let (pipeline, _rpc) = admitting_fixture(fast_config()).await;
        pipeline.process(&detection("rugpull", "RUG"), None).await;

        let snap = pipeline.stats().snapshot();
        assert_eq!(snap.tokens_seen, 1);
        assert_eq!(snap.tokens_admitted, 0);
        assert_eq!(snap.stages["pattern"].failed, 1);
        assert_eq!(snap.stages["dedup"].passed, 1);
        assert_eq!(snap.recent[0].rejected_at, Some("pattern"));
    }
}
