//! Token detection events and sources
//!
//! The pipelines consume `TokenDetection`s and do not care where they
//! came from. A source pushes decoded events into an mpsc sink; the
//! harness owns the receiving end and fans detections out to both
//! variants.

pub mod pumpportal;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::{broadcast, mpsc};
use tracing::info;

use crate::error::Result;

pub use pumpportal::PumpPortalSource;

/// Where a detection entered the system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionOrigin {
    Websocket,
    Webhook,
}

impl std::fmt::Display for DetectionOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectionOrigin::Websocket => write!(f, "websocket"),
            DetectionOrigin::Webhook => write!(f, "webhook"),
        }
    }
}

/// A newly created token as observed by a detection source
#[derive(Debug, Clone)]
pub struct TokenDetection {
    /// Creation transaction signature
    pub signature: String,
    /// Slot of the creation transaction (0 when the source omits it)
    pub slot: u64,
    pub mint: Pubkey,
    pub bonding_curve: Pubkey,
    pub associated_bonding_curve: Pubkey,
    pub creator: Option<Pubkey>,
    pub name: Option<String>,
    pub symbol: Option<String>,
    /// Program log lines from the creation transaction, in order
    pub raw_logs: Vec<String>,
    /// Wall-clock detection time, ms since epoch
    pub detected_at_ms: i64,
    pub is_token_2022: Option<bool>,
    pub origin: DetectionOrigin,
}

impl TokenDetection {
    /// Age of this detection relative to `now_ms`
    pub fn age_seconds(&self, now_ms: i64) -> i64 {
        (now_ms - self.detected_at_ms) / 1000
    }
}

/// A push source of token detections
#[async_trait]
pub trait DetectionSource: Send + Sync {
    /// Start streaming into the sink. Returns once the background task
    /// is running.
    async fn start(&self, sink: mpsc::Sender<TokenDetection>) -> Result<()>;

    /// Stop streaming. Idempotent.
    fn stop(&self);
}

/// In-process source fed by hand; used by tests and replay tooling
pub struct ChannelSource {
    injector: mpsc::Sender<TokenDetection>,
    receiver: std::sync::Mutex<Option<mpsc::Receiver<TokenDetection>>>,
    shutdown: broadcast::Sender<()>,
}

impl ChannelSource {
    pub fn new(capacity: usize) -> Self {
        let (injector, receiver) = mpsc::channel(capacity);
        let (shutdown, _) = broadcast::channel(1);
        Self {
            injector,
            receiver: std::sync::Mutex::new(Some(receiver)),
            shutdown,
        }
    }

    /// Handle for pushing detections into the source
    pub fn injector(&self) -> mpsc::Sender<TokenDetection> {
        self.injector.clone()
    }
}

#[async_trait]
impl DetectionSource for ChannelSource {
    async fn start(&self, sink: mpsc::Sender<TokenDetection>) -> Result<()> {
        let mut receiver = self
            .receiver
            .lock()
            .expect("channel source receiver lock")
            .take()
            .ok_or_else(|| crate::error::Error::Internal("source already started".to_string()))?;
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    detection = receiver.recv() => {
                        match detection {
                            Some(det) => {
                                if sink.send(det).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
            info!("channel detection source stopped");
        });

        Ok(())
    }

    fn stop(&self) {
        let _ = self.shutdown.send(());
    }
}
