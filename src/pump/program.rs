//! Pump.fun program constants and instruction discriminators
//!
//! # WARNING: These constants may change without notice
//! Pump.fun has historically modified their program behavior. If trade
//! classification stops matching, these values may need updating.
//!
//! # How discriminators are calculated
//! Anchor uses the first 8 bytes of SHA-256("global:<instruction_name>")
//! as the instruction discriminator.

use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

/// Pump.fun program ID
/// WARNING: This may change if pump.fun deploys a new program version
pub const PUMP_PROGRAM_ID_STR: &str = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P";

lazy_static::lazy_static! {
    /// Pump.fun program ID as Pubkey
    pub static ref PUMP_PROGRAM_ID: Pubkey =
        Pubkey::from_str(PUMP_PROGRAM_ID_STR).expect("Invalid pump program ID");
}

/// Instruction discriminators (first 8 bytes of instruction data)
/// Calculated as: SHA-256("global:<instruction_name>")[0..8]
#[allow(non_snake_case)]
pub mod DISCRIMINATORS {
    /// Buy tokens instruction discriminator
    /// SHA-256("global:buy")[0..8]
    pub const BUY: [u8; 8] = [102, 6, 61, 18, 1, 218, 235, 234];

    /// Sell tokens instruction discriminator
    /// SHA-256("global:sell")[0..8]
    pub const SELL: [u8; 8] = [51, 230, 133, 164, 1, 127, 131, 173];
}

/// Side of a pump.fun trade instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "buy"),
            TradeSide::Sell => write!(f, "sell"),
        }
    }
}

/// Classify raw instruction data as a buy or sell.
///
/// Payloads shorter than 8 bytes are ignored. The comparison is done
/// in place against the first 8 bytes; the payload is never copied.
pub fn classify_instruction_data(data: &[u8]) -> Option<TradeSide> {
    if data.len() < 8 {
        return None;
    }

    if data[..8] == DISCRIMINATORS::BUY {
        Some(TradeSide::Buy)
    } else if data[..8] == DISCRIMINATORS::SELL {
        Some(TradeSide::Sell)
    } else {
        None
    }
}

/// Classify base58-encoded instruction data, as it appears in parsed
/// transactions. Undecodable or truncated payloads are ignored.
pub fn classify_base58_data(encoded: &str) -> Option<TradeSide> {
    let data = bs58::decode(encoded).into_vec().ok()?;
    classify_instruction_data(&data)
}

/// Calculate instruction discriminator from name
/// This follows Anchor's convention: SHA-256("global:<name>")[0..8]
pub fn calculate_discriminator(name: &str) -> [u8; 8] {
    use sha2::{Digest, Sha256};

    let preimage = format!("global:{}", name);
    let hash = Sha256::digest(preimage.as_bytes());

    let mut discriminator = [0u8; 8];
    discriminator.copy_from_slice(&hash[..8]);
    discriminator
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discriminator_calculation() {
        // Verify our hardcoded discriminators match the calculation
        assert_eq!(calculate_discriminator("buy"), DISCRIMINATORS::BUY);
        assert_eq!(calculate_discriminator("sell"), DISCRIMINATORS::SELL);
    }

    #[test]
    fn test_classify_instruction_data() {
        let buy_data = [102, 6, 61, 18, 1, 218, 235, 234, 0, 0];
        assert_eq!(classify_instruction_data(&buy_data), Some(TradeSide::Buy));

        let sell_data = [51, 230, 133, 164, 1, 127, 131, 173, 0, 0];
        assert_eq!(classify_instruction_data(&sell_data), Some(TradeSide::Sell));

        let unknown_data = [0u8; 8];
        assert_eq!(classify_instruction_data(&unknown_data), None);
    }

    #[test]
    fn test_truncated_payload_ignored() {
        assert_eq!(classify_instruction_data(&[102, 6, 61]), None);
        assert_eq!(classify_instruction_data(&[]), None);
    }

    #[test]
    fn test_classify_base58() {
        let encoded = bs58::encode(&[102, 6, 61, 18, 1, 218, 235, 234, 1, 2, 3]).into_string();
        assert_eq!(classify_base58_data(&encoded), Some(TradeSide::Buy));

        // Not valid base58
        assert_eq!(classify_base58_data("0OIl"), None);
    }

    #[test]
    fn test_program_id() {
        assert_eq!(
            PUMP_PROGRAM_ID.to_string(),
            "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P"
        );
    }
}
