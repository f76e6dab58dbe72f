//! Configuration loading and validation

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Trailing stop parameters. When enabled, the trailing logic replaces
/// the plain take-profit threshold for the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailingStopConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// High-water-mark PnL percent at which the trail arms
    #[serde(default = "default_trailing_activation")]
    pub activation_percent: f64,

    /// Distance below the high-water mark that triggers the exit
    #[serde(default = "default_trailing_distance")]
    pub distance_percent: f64,

    /// Absolute PnL percent that still exits immediately (0 disables)
    #[serde(default)]
    pub hard_take_profit_percent: f64,
}

impl Default for TrailingStopConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            activation_percent: default_trailing_activation(),
            distance_percent: default_trailing_distance(),
            hard_take_profit_percent: 0.0,
        }
    }
}

/// Sniper gate parameters. When enabled, the sniper gate replaces the
/// momentum gate as the final admission stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SniperGateConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Buys within this many slots of curve creation are tagged snipers
    #[serde(default = "default_sniper_slot_threshold")]
    pub slot_threshold: u64,

    /// Percentage of tagged snipers that must have exited before entry
    #[serde(default = "default_min_bot_exit_percent")]
    pub min_bot_exit_percent: f64,

    /// Minimum distinct organic buyers required
    #[serde(default = "default_min_organic_buyers")]
    pub min_organic_buyers: usize,

    #[serde(default = "default_gate_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_gate_recheck_interval_ms")]
    pub recheck_interval_ms: u64,

    #[serde(default = "default_gate_max_checks")]
    pub max_checks: u32,

    /// Data-collection mode: run every check, record snapshots, always pass
    #[serde(default)]
    pub log_only: bool,
}

impl Default for SniperGateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            slot_threshold: default_sniper_slot_threshold(),
            min_bot_exit_percent: default_min_bot_exit_percent(),
            min_organic_buyers: default_min_organic_buyers(),
            initial_delay_ms: default_gate_initial_delay_ms(),
            recheck_interval_ms: default_gate_recheck_interval_ms(),
            max_checks: default_gate_max_checks(),
            log_only: false,
        }
    }
}

/// The full tunable surface of one pipeline variant.
///
/// Immutable for the lifetime of a session; both variants of an A/B
/// session are persisted with it so analytics can diff them later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantConfig {
    /// Take-profit threshold in percent (used when trailing is disabled)
    #[serde(default = "default_take_profit")]
    pub take_profit_percent: f64,

    /// Stop-loss threshold in percent (always active)
    #[serde(default = "default_stop_loss")]
    pub stop_loss_percent: f64,

    /// Maximum hold duration before a forced time exit
    #[serde(default = "default_max_hold_ms")]
    pub max_hold_duration_ms: u64,

    /// Monitor tick interval
    #[serde(default = "default_price_check_interval_ms")]
    pub price_check_interval_ms: u64,

    /// Momentum gate: buys required to pass
    #[serde(default = "default_momentum_min_total_buys")]
    pub momentum_min_total_buys: u64,

    /// Deep filter: minimum real SOL in the curve
    #[serde(default = "default_min_sol_in_curve")]
    pub min_sol_in_curve: f64,

    /// Deep filter: maximum real SOL in the curve (must exceed the minimum)
    #[serde(default = "default_max_sol_in_curve")]
    pub max_sol_in_curve: f64,

    /// Reject detections older than this (0 disables the check)
    #[serde(default = "default_max_token_age_seconds")]
    pub max_token_age_seconds: u64,

    #[serde(default = "default_gate_initial_delay_ms")]
    pub momentum_initial_delay_ms: u64,

    #[serde(default = "default_gate_recheck_interval_ms")]
    pub momentum_recheck_interval_ms: u64,

    #[serde(default = "default_gate_max_checks")]
    pub momentum_max_checks: u32,

    /// Buy slippage in percent, 0-100
    #[serde(default = "default_buy_slippage")]
    pub buy_slippage_percent: f64,

    /// Sell slippage in percent, 0-100
    #[serde(default = "default_sell_slippage")]
    pub sell_slippage_percent: f64,

    /// Rolling-hour admission cap
    #[serde(default = "default_max_trades_per_hour")]
    pub max_trades_per_hour: u32,

    /// SOL committed per admission
    #[serde(default = "default_quote_amount_sol")]
    pub quote_amount_sol: f64,

    /// Deep filter: reject when the normalised composite score is below
    /// this value (None disables score-based rejection)
    #[serde(default)]
    pub min_score_required: Option<f64>,

    #[serde(default)]
    pub trailing_stop: Option<TrailingStopConfig>,

    #[serde(default)]
    pub sniper_gate: Option<SniperGateConfig>,
}

impl Default for VariantConfig {
    fn default() -> Self {
        Self {
            take_profit_percent: default_take_profit(),
            stop_loss_percent: default_stop_loss(),
            max_hold_duration_ms: default_max_hold_ms(),
            price_check_interval_ms: default_price_check_interval_ms(),
            momentum_min_total_buys: default_momentum_min_total_buys(),
            min_sol_in_curve: default_min_sol_in_curve(),
            max_sol_in_curve: default_max_sol_in_curve(),
            max_token_age_seconds: default_max_token_age_seconds(),
            momentum_initial_delay_ms: default_gate_initial_delay_ms(),
            momentum_recheck_interval_ms: default_gate_recheck_interval_ms(),
            momentum_max_checks: default_gate_max_checks(),
            buy_slippage_percent: default_buy_slippage(),
            sell_slippage_percent: default_sell_slippage(),
            max_trades_per_hour: default_max_trades_per_hour(),
            quote_amount_sol: default_quote_amount_sol(),
            min_score_required: None,
            trailing_stop: None,
            sniper_gate: None,
        }
    }
}

impl VariantConfig {
    /// Collect every field violation. An empty list means the config is
    /// usable; callers reject construction otherwise.
    pub fn violations(&self) -> Vec<String> {
        let mut v = Vec::new();

        if self.take_profit_percent <= 0.0 {
            v.push("take_profit_percent must be positive".to_string());
        }
        if self.stop_loss_percent <= 0.0 {
            v.push("stop_loss_percent must be positive".to_string());
        }
        if self.max_hold_duration_ms == 0 {
            v.push("max_hold_duration_ms must be positive".to_string());
        }
        if self.price_check_interval_ms == 0 {
            v.push("price_check_interval_ms must be positive".to_string());
        }
        if self.max_sol_in_curve <= self.min_sol_in_curve {
            v.push(format!(
                "max_sol_in_curve ({}) must exceed min_sol_in_curve ({})",
                self.max_sol_in_curve, self.min_sol_in_curve
            ));
        }
        if self.momentum_max_checks < 1 {
            v.push("momentum_max_checks must be at least 1".to_string());
        }
        if !(0.0..=100.0).contains(&self.buy_slippage_percent) {
            v.push("buy_slippage_percent must be in [0, 100]".to_string());
        }
        if !(0.0..=100.0).contains(&self.sell_slippage_percent) {
            v.push("sell_slippage_percent must be in [0, 100]".to_string());
        }
        if self.max_trades_per_hour < 1 {
            v.push("max_trades_per_hour must be at least 1".to_string());
        }
        if self.quote_amount_sol <= 0.0 {
            v.push("quote_amount_sol must be positive".to_string());
        }
        if let Some(ts) = &self.trailing_stop {
            if ts.enabled {
                if ts.activation_percent <= 0.0 {
                    v.push("trailing_stop.activation_percent must be positive".to_string());
                }
                if ts.distance_percent <= 0.0 {
                    v.push("trailing_stop.distance_percent must be positive".to_string());
                }
                if ts.hard_take_profit_percent < 0.0 {
                    v.push(
                        "trailing_stop.hard_take_profit_percent must not be negative".to_string(),
                    );
                }
            }
        }
        if let Some(sg) = &self.sniper_gate {
            if sg.enabled {
                if sg.max_checks < 1 {
                    v.push("sniper_gate.max_checks must be at least 1".to_string());
                }
                if !(0.0..=100.0).contains(&sg.min_bot_exit_percent) {
                    v.push("sniper_gate.min_bot_exit_percent must be in [0, 100]".to_string());
                }
            }
        }

        v
    }

    /// Validate, returning the enumerated violation list on failure
    pub fn validate(&self) -> Result<()> {
        let violations = self.violations();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::ConfigInvalid(violations))
        }
    }

    /// Trailing stop block if present and enabled
    pub fn trailing(&self) -> Option<&TrailingStopConfig> {
        self.trailing_stop.as_ref().filter(|ts| ts.enabled)
    }

    /// Sniper gate block if present and enabled
    pub fn sniper(&self) -> Option<&SniperGateConfig> {
        self.sniper_gate.as_ref().filter(|sg| sg.enabled)
    }
}

/// Session-level settings for one A/B run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Hard session deadline; the report is generated when it elapses
    #[serde(default = "default_session_duration_ms")]
    pub duration_ms: u64,

    #[serde(default)]
    pub description: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_ms: default_session_duration_ms(),
            description: None,
        }
    }
}

impl SessionConfig {
    pub fn violations(&self) -> Vec<String> {
        let mut v = Vec::new();
        if self.duration_ms < 60_000 {
            v.push("session duration_ms must be at least 60000".to_string());
        }
        v
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcSettings {
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_rpc_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamSettings {
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// 0 = retry forever
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub rpc: RpcSettings,
    pub stream: StreamSettings,

    /// One database file per role to avoid cross-contention
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub variant_a: VariantConfig,

    #[serde(default)]
    pub variant_b: VariantConfig,
}

impl AppConfig {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            .set_default("rpc.endpoint", default_rpc_endpoint())
            .map_err(|e| Error::Config(e.to_string()))?
            .set_default("rpc.timeout_ms", default_rpc_timeout_ms() as i64)
            .map_err(|e| Error::Config(e.to_string()))?
            .set_default("stream.ws_url", default_ws_url())
            .map_err(|e| Error::Config(e.to_string()))?
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix ABLAB_)
            .add_source(
                config::Environment::with_prefix("ABLAB")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| Error::Config(format!("Failed to build configuration: {}", e)))?;

        let config: AppConfig = settings
            .try_deserialize()
            .map_err(|e| Error::Config(format!("Failed to deserialize configuration: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate every section, accumulating the full violation list
    pub fn validate(&self) -> Result<()> {
        let mut violations = Vec::new();

        for (label, cfg) in [("variant_a", &self.variant_a), ("variant_b", &self.variant_b)] {
            for v in cfg.violations() {
                violations.push(format!("{}: {}", label, v));
            }
        }
        for v in self.session.violations() {
            violations.push(format!("session: {}", v));
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::ConfigInvalid(violations))
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_take_profit() -> f64 {
    50.0
}

fn default_stop_loss() -> f64 {
    30.0
}

fn default_max_hold_ms() -> u64 {
    300_000
}

fn default_price_check_interval_ms() -> u64 {
    2_000
}

fn default_momentum_min_total_buys() -> u64 {
    10
}

fn default_min_sol_in_curve() -> f64 {
    5.0
}

fn default_max_sol_in_curve() -> f64 {
    60.0
}

fn default_max_token_age_seconds() -> u64 {
    60
}

fn default_gate_initial_delay_ms() -> u64 {
    2_000
}

fn default_gate_recheck_interval_ms() -> u64 {
    2_000
}

fn default_gate_max_checks() -> u32 {
    3
}

fn default_buy_slippage() -> f64 {
    25.0
}

fn default_sell_slippage() -> f64 {
    25.0
}

fn default_max_trades_per_hour() -> u32 {
    12
}

fn default_quote_amount_sol() -> f64 {
    0.05
}

fn default_trailing_activation() -> f64 {
    10.0
}

fn default_trailing_distance() -> f64 {
    5.0
}

fn default_sniper_slot_threshold() -> u64 {
    3
}

fn default_min_bot_exit_percent() -> f64 {
    50.0
}

fn default_min_organic_buyers() -> usize {
    3
}

fn default_session_duration_ms() -> u64 {
    1_800_000
}

fn default_rpc_endpoint() -> String {
    std::env::var("RPC_ENDPOINT")
        .unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".into())
}

fn default_rpc_timeout_ms() -> u64 {
    10_000
}

fn default_ws_url() -> String {
    "wss://pumpportal.fun/api/data".into()
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_ping_interval_secs() -> u64 {
    30
}

fn default_db_path() -> String {
    "data/abtest.db".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_variant_is_valid() {
        assert!(VariantConfig::default().validate().is_ok());
    }

    #[test]
    fn test_violations_are_enumerated() {
        let cfg = VariantConfig {
            take_profit_percent: 0.0,
            quote_amount_sol: -1.0,
            buy_slippage_percent: 150.0,
            ..Default::default()
        };

        let violations = cfg.violations();
        assert_eq!(violations.len(), 3);
        assert!(violations.iter().any(|v| v.contains("take_profit")));
        assert!(violations.iter().any(|v| v.contains("quote_amount")));
        assert!(violations.iter().any(|v| v.contains("buy_slippage")));
    }

    #[test]
    fn test_curve_bounds_ordering() {
        let cfg = VariantConfig {
            min_sol_in_curve: 10.0,
            max_sol_in_curve: 10.0,
            ..Default::default()
        };
        assert!(cfg
            .violations()
            .iter()
            .any(|v| v.contains("max_sol_in_curve")));
    }

    #[test]
    fn test_session_duration_floor() {
        let session = SessionConfig {
            duration_ms: 30_000,
            description: None,
        };
        assert_eq!(session.violations().len(), 1);
    }

    #[test]
    fn test_trailing_block_gating() {
        let mut cfg = VariantConfig::default();
        assert!(cfg.trailing().is_none());

        cfg.trailing_stop = Some(TrailingStopConfig {
            enabled: false,
            ..Default::default()
        });
        assert!(cfg.trailing().is_none());

        cfg.trailing_stop = Some(TrailingStopConfig::default());
        assert!(cfg.trailing().is_some());
    }

    #[test]
    fn test_variant_config_json_round_trip() {
        let cfg = VariantConfig {
            take_profit_percent: 42.5,
            trailing_stop: Some(TrailingStopConfig::default()),
            sniper_gate: Some(SniperGateConfig {
                enabled: true,
                log_only: true,
                ..Default::default()
            }),
            ..Default::default()
        };

        let json = serde_json::to_string(&cfg).unwrap();
        let back: VariantConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }
}
