//! PumpPortal WebSocket detection source
//!
//! PumpPortal provides a free WebSocket API for real-time pump.fun data.
//!
//! WebSocket endpoint: wss://pumpportal.fun/api/data
//! Documentation: https://pumpportal.fun/data-api/real-time

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::config::StreamSettings;
use crate::detect::{DetectionOrigin, DetectionSource, TokenDetection};
use crate::error::{Error, Result};

/// Subscription request frame
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionMessage {
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    keys: Option<Vec<String>>,
}

impl SubscriptionMessage {
    fn subscribe_new_tokens() -> Self {
        Self {
            method: "subscribeNewToken".to_string(),
            keys: None,
        }
    }
}

/// New token frame from PumpPortal
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewTokenFrame {
    signature: String,
    mint: String,
    trader_public_key: String,
    tx_type: String,
    bonding_curve_key: String,
    name: String,
    symbol: String,
    #[serde(default)]
    pool: Option<String>,
}

impl NewTokenFrame {
    fn into_detection(self) -> Option<TokenDetection> {
        let mint = Pubkey::from_str(&self.mint).ok()?;
        let bonding_curve = Pubkey::from_str(&self.bonding_curve_key).ok()?;
        let creator = Pubkey::from_str(&self.trader_public_key).ok();

        Some(TokenDetection {
            signature: self.signature,
            // PumpPortal does not carry the slot; gates that need the
            // creation slot fall back to signature history.
            slot: 0,
            mint,
            bonding_curve,
            associated_bonding_curve: bonding_curve,
            creator,
            name: Some(self.name),
            symbol: Some(self.symbol),
            raw_logs: Vec::new(),
            detected_at_ms: chrono::Utc::now().timestamp_millis(),
            is_token_2022: None,
            origin: DetectionOrigin::Websocket,
        })
    }
}

/// PumpPortal-backed detection source with automatic reconnect
pub struct PumpPortalSource {
    settings: StreamSettings,
    shutdown: broadcast::Sender<()>,
}

impl PumpPortalSource {
    pub fn new(settings: StreamSettings) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self { settings, shutdown }
    }

    /// Connect, subscribe, and stream until disconnect or shutdown
    async fn connect_and_stream(
        settings: &StreamSettings,
        sink: &mpsc::Sender<TokenDetection>,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<()> {
        info!(url = %settings.ws_url, "connecting to PumpPortal");

        let (ws_stream, _) = connect_async(settings.ws_url.as_str())
            .await
            .map_err(|e| Error::StreamConnection(format!("WebSocket connect failed: {}", e)))?;

        info!("connected to PumpPortal WebSocket");
        let (mut write, mut read) = ws_stream.split();

        let msg = SubscriptionMessage::subscribe_new_tokens();
        let json = serde_json::to_string(&msg)?;
        write
            .send(Message::Text(json))
            .await
            .map_err(|e| Error::StreamConnection(format!("Failed to subscribe: {}", e)))?;
        info!("subscribed to new token events");

        let ping_interval = Duration::from_secs(settings.ping_interval_secs);
        let mut ping_timer = tokio::time::interval(ping_interval);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("shutdown requested mid-stream");
                    return Ok(());
                }

                // Ping to keep connection alive
                _ = ping_timer.tick() => {
                    if let Err(e) = write.send(Message::Ping(vec![])).await {
                        error!("failed to send ping: {}", e);
                        break;
                    }
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_message(&text, sink).await;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            debug!("received pong");
                        }
                        Some(Ok(Message::Close(_))) => {
                            info!("WebSocket closed by server");
                            break;
                        }
                        Some(Err(e)) => {
                            error!("WebSocket error: {}", e);
                            break;
                        }
                        None => {
                            info!("WebSocket stream ended");
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }

        Err(Error::StreamDisconnected)
    }

    async fn handle_message(text: &str, sink: &mpsc::Sender<TokenDetection>) {
        let Ok(frame) = serde_json::from_str::<NewTokenFrame>(text) else {
            // Subscription acks and trade frames land here; ignore.
            return;
        };
        if frame.tx_type != "create" {
            return;
        }
        if frame.pool.as_deref().is_some_and(|p| p != "pump") {
            return;
        }

        let Some(detection) = frame.into_detection() else {
            warn!("undecodable new-token frame");
            return;
        };

        debug!(
            mint = %detection.mint,
            name = detection.name.as_deref().unwrap_or(""),
            "new token detected"
        );
        if sink.send(detection).await.is_err() {
            warn!("detection sink closed, dropping event");
        }
    }
}

#[async_trait]
impl DetectionSource for PumpPortalSource {
    async fn start(&self, sink: mpsc::Sender<TokenDetection>) -> Result<()> {
        let settings = self.settings.clone();
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut reconnect_attempts = 0u32;

            loop {
                if shutdown_rx.try_recv().is_ok() {
                    info!("PumpPortal source shutting down");
                    break;
                }

                match Self::connect_and_stream(&settings, &sink, &mut shutdown_rx).await {
                    Ok(_) => break, // clean shutdown
                    Err(e) => {
                        error!("PumpPortal stream error: {}", e);
                        reconnect_attempts += 1;

                        if settings.max_reconnect_attempts > 0
                            && reconnect_attempts >= settings.max_reconnect_attempts
                        {
                            error!(
                                "max reconnect attempts ({}) reached",
                                settings.max_reconnect_attempts
                            );
                            break;
                        }
                    }
                }

                let delay = Duration::from_millis(settings.reconnect_delay_ms);
                warn!("reconnecting in {:?}", delay);
                sleep(delay).await;
            }
        });

        Ok(())
    }

    fn stop(&self) {
        let _ = self.shutdown.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_frame_maps_to_detection() {
        let mint = Pubkey::new_unique();
        let curve = Pubkey::new_unique();
        let frame = NewTokenFrame {
            signature: "sig".to_string(),
            mint: mint.to_string(),
            trader_public_key: Pubkey::new_unique().to_string(),
            tx_type: "create".to_string(),
            bonding_curve_key: curve.to_string(),
            name: "Test Token".to_string(),
            symbol: "TEST".to_string(),
            pool: Some("pump".to_string()),
        };

        let detection = frame.into_detection().unwrap();
        assert_eq!(detection.mint, mint);
        assert_eq!(detection.bonding_curve, curve);
        assert_eq!(detection.origin, DetectionOrigin::Websocket);
        assert!(detection.creator.is_some());
    }

    #[test]
    fn test_bad_addresses_dropped() {
        let frame = NewTokenFrame {
            signature: "sig".to_string(),
            mint: "not-a-pubkey".to_string(),
            trader_public_key: "x".to_string(),
            tx_type: "create".to_string(),
            bonding_curve_key: "y".to_string(),
            name: "n".to_string(),
            symbol: "s".to_string(),
            pool: None,
        };
        assert!(frame.into_detection().is_none());
    }

    #[test]
    fn test_subscription_frame_shape() {
        let msg = SubscriptionMessage::subscribe_new_tokens();
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"method":"subscribeNewToken"}"#);
    }
}
