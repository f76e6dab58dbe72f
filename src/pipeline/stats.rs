//! In-memory pipeline counters
//!
//! Tracks pass/fail per stage plus a bounded ring of recent token
//! outcomes. Snapshot and reset are cheap; the harness samples this for
//! periodic summaries and the final report.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Recent-outcome ring capacity
const RECENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageCounter {
    pub passed: u64,
    pub failed: u64,
}

/// The terminal outcome of one token's pipeline run
#[derive(Debug, Clone)]
pub struct TokenOutcome {
    pub mint: String,
    pub passed: bool,
    /// Stage that rejected, None on admission
    pub rejected_at: Option<&'static str>,
    pub at_ms: i64,
}

#[derive(Debug, Clone, Default)]
pub struct StatsSnapshot {
    pub stages: HashMap<&'static str, StageCounter>,
    pub recent: Vec<TokenOutcome>,
    pub tokens_seen: u64,
    pub tokens_admitted: u64,
}

#[derive(Default)]
struct StatsInner {
    stages: HashMap<&'static str, StageCounter>,
    recent: VecDeque<TokenOutcome>,
    tokens_seen: u64,
    tokens_admitted: u64,
}

#[derive(Default)]
pub struct PipelineStats {
    inner: Mutex<StatsInner>,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_stage(&self, stage: &'static str, passed: bool) {
        let mut inner = self.inner.lock().expect("stats lock");
        let counter = inner.stages.entry(stage).or_default();
        if passed {
            counter.passed += 1;
        } else {
            counter.failed += 1;
        }
    }

    pub fn record_outcome(&self, outcome: TokenOutcome) {
        let mut inner = self.inner.lock().expect("stats lock");
        inner.tokens_seen += 1;
        if outcome.passed {
            inner.tokens_admitted += 1;
        }
        if inner.recent.len() >= RECENT_CAPACITY {
            inner.recent.pop_front();
        }
        inner.recent.push_back(outcome);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.lock().expect("stats lock");
        StatsSnapshot {
            stages: inner.stages.clone(),
            recent: inner.recent.iter().cloned().collect(),
            tokens_seen: inner.tokens_seen,
            tokens_admitted: inner.tokens_admitted,
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("stats lock");
        *inner = StatsInner::default();
    }
}
