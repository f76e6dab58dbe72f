//! Exposure limiter for live trading
//!
//! Caps concurrently deployed SOL, trades per rolling hour, and the
//! wallet buffer that must remain untouched. Mutated only when trades
//! are recorded or released; reads may be concurrent.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

/// Rolling window for the trades-per-hour cap
const HOUR: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct ExposureLimits {
    /// Maximum SOL deployed across open positions at once
    pub max_deployed_sol: f64,
    pub max_trades_per_hour: u32,
    /// SOL that must remain in the wallet after a buy
    pub wallet_buffer_sol: f64,
}

impl Default for ExposureLimits {
    fn default() -> Self {
        Self {
            max_deployed_sol: 0.5,
            max_trades_per_hour: 12,
            wallet_buffer_sol: 0.05,
        }
    }
}

/// Why a trade was refused
#[derive(Debug, Clone, PartialEq)]
pub enum ExposureDenial {
    DeployedCap {
        deployed: f64,
        requested: f64,
        max: f64,
    },
    TradesPerHour {
        count: u32,
        max: u32,
    },
    InsufficientBalance {
        balance: f64,
        requested: f64,
        buffer: f64,
    },
}

impl ExposureDenial {
    /// Stable reason tag for decision rows
    pub fn tag(&self) -> &'static str {
        match self {
            ExposureDenial::DeployedCap { .. } => "EXPOSURE_LIMIT",
            ExposureDenial::TradesPerHour { .. } => "TRADES_PER_HOUR",
            ExposureDenial::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
        }
    }
}

impl std::fmt::Display for ExposureDenial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExposureDenial::DeployedCap {
                deployed,
                requested,
                max,
            } => write!(
                f,
                "deployed {:.4} SOL + {:.4} SOL exceeds cap {:.4} SOL",
                deployed, requested, max
            ),
            ExposureDenial::TradesPerHour { count, max } => {
                write!(f, "{} trades in the last hour, cap is {}", count, max)
            }
            ExposureDenial::InsufficientBalance {
                balance,
                requested,
                buffer,
            } => write!(
                f,
                "balance {:.4} SOL cannot cover {:.4} SOL plus {:.4} SOL buffer",
                balance, requested, buffer
            ),
        }
    }
}

struct ExposureState {
    deployed_sol: f64,
    trade_times: VecDeque<Instant>,
    wallet_balance_sol: f64,
}

pub struct ExposureGuard {
    limits: ExposureLimits,
    state: RwLock<ExposureState>,
}

impl ExposureGuard {
    pub fn new(limits: ExposureLimits) -> Self {
        Self {
            limits,
            state: RwLock::new(ExposureState {
                deployed_sol: 0.0,
                trade_times: VecDeque::new(),
                wallet_balance_sol: 0.0,
            }),
        }
    }

    /// Refresh the known wallet balance (from a balance RPC)
    pub async fn set_wallet_balance(&self, sol: f64) {
        self.state.write().await.wallet_balance_sol = sol;
    }

    /// Check every limit for a prospective trade of `quote_sol`
    pub async fn can_trade(&self, quote_sol: f64) -> Result<(), ExposureDenial> {
        let mut state = self.state.write().await;

        if state.deployed_sol + quote_sol > self.limits.max_deployed_sol {
            return Err(ExposureDenial::DeployedCap {
                deployed: state.deployed_sol,
                requested: quote_sol,
                max: self.limits.max_deployed_sol,
            });
        }

        while state.trade_times.front().is_some_and(|t| t.elapsed() >= HOUR) {
            state.trade_times.pop_front();
        }
        let count = state.trade_times.len() as u32;
        if count >= self.limits.max_trades_per_hour {
            return Err(ExposureDenial::TradesPerHour {
                count,
                max: self.limits.max_trades_per_hour,
            });
        }

        if state.wallet_balance_sol - quote_sol < self.limits.wallet_buffer_sol {
            return Err(ExposureDenial::InsufficientBalance {
                balance: state.wallet_balance_sol,
                requested: quote_sol,
                buffer: self.limits.wallet_buffer_sol,
            });
        }

        Ok(())
    }

    /// Record an executed trade: deploys capital and consumes one
    /// window slot
    pub async fn record_trade(&self, quote_sol: f64) {
        let mut state = self.state.write().await;
        state.deployed_sol += quote_sol;
        state.trade_times.push_back(Instant::now());
        debug!(deployed = state.deployed_sol, "exposure increased");
    }

    /// Release deployed capital when a position closes
    pub async fn release(&self, quote_sol: f64) {
        let mut state = self.state.write().await;
        state.deployed_sol = (state.deployed_sol - quote_sol).max(0.0);
        debug!(deployed = state.deployed_sol, "exposure released");
    }

    pub async fn deployed_sol(&self) -> f64 {
        self.state.read().await.deployed_sol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(max_deployed: f64, max_trades: u32) -> ExposureGuard {
        ExposureGuard::new(ExposureLimits {
            max_deployed_sol: max_deployed,
            max_trades_per_hour: max_trades,
            wallet_buffer_sol: 0.05,
        })
    }

    #[tokio::test]
    async fn test_deployed_cap() {
        let guard = guard(0.1, 100);
        guard.set_wallet_balance(10.0).await;

        assert!(guard.can_trade(0.05).await.is_ok());
        guard.record_trade(0.05).await;
        guard.record_trade(0.04).await;

        let denial = guard.can_trade(0.05).await.unwrap_err();
        assert_eq!(denial.tag(), "EXPOSURE_LIMIT");

        guard.release(0.05).await;
        assert!(guard.can_trade(0.05).await.is_ok());
    }

    #[tokio::test]
    async fn test_trades_per_hour() {
        let guard = guard(100.0, 2);
        guard.set_wallet_balance(10.0).await;

        guard.record_trade(0.01).await;
        guard.record_trade(0.01).await;

        let denial = guard.can_trade(0.01).await.unwrap_err();
        assert_eq!(denial.tag(), "TRADES_PER_HOUR");
    }

    #[tokio::test]
    async fn test_wallet_buffer() {
        let guard = guard(100.0, 100);
        guard.set_wallet_balance(0.06).await;

        let denial = guard.can_trade(0.05).await.unwrap_err();
        assert_eq!(denial.tag(), "INSUFFICIENT_BALANCE");

        guard.set_wallet_balance(0.2).await;
        assert!(guard.can_trade(0.05).await.is_ok());
    }

    #[tokio::test]
    async fn test_release_floors_at_zero() {
        let guard = guard(1.0, 100);
        guard.release(0.5).await;
        assert_eq!(guard.deployed_sol().await, 0.0);
    }
}
