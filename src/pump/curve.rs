//! Bonding curve account state and pricing math
//!
//! # WARNING: The account layout may change without notice
//! Pump.fun has modified their account layouts in the past. If
//! deserialization fails, this structure may need updating.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::pubkey::Pubkey;

use crate::error::{Error, Result};

/// BondingCurve account discriminator (first 8 bytes of account data)
pub const CURVE_DISCRIMINATOR: [u8; 8] = [23, 183, 248, 55, 96, 216, 172, 96];

/// Lamports the curve accumulates before graduating to the AMM.
/// Used only to derive an advisory progress figure for scoring.
pub const GRADUATION_SOL_TARGET_LAMPORTS: u64 = 85_000_000_000;

/// Bonding curve state for a token
///
/// Holds the virtual reserves used for pricing, the real reserves
/// actually deposited, and whether the curve has completed (graduated
/// and become unbuyable).
#[derive(Debug, Clone, BorshDeserialize, BorshSerialize)]
pub struct CurveState {
    /// Account discriminator (first 8 bytes)
    _discriminator: [u8; 8],

    /// Virtual SOL reserves for price calculation
    pub virtual_sol_reserves: u64,

    /// Virtual token reserves for price calculation
    pub virtual_token_reserves: u64,

    /// Real SOL reserves (actual SOL held in the curve)
    pub real_sol_reserves: u64,

    /// Real token reserves (actual tokens held in the curve)
    pub real_token_reserves: u64,

    /// Total supply of the token
    pub token_total_supply: u64,

    /// Whether the curve is complete (graduated, no further buys)
    pub complete: bool,

    /// Token creator
    pub creator: Pubkey,
}

impl CurveState {
    pub fn new(
        virtual_sol_reserves: u64,
        virtual_token_reserves: u64,
        real_sol_reserves: u64,
        real_token_reserves: u64,
        token_total_supply: u64,
        complete: bool,
        creator: Pubkey,
    ) -> Self {
        Self {
            _discriminator: CURVE_DISCRIMINATOR,
            virtual_sol_reserves,
            virtual_token_reserves,
            real_sol_reserves,
            real_token_reserves,
            token_total_supply,
            complete,
            creator,
        }
    }

    /// Deserialize from account data, verifying the discriminator
    pub fn try_from_account_data(data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(Error::CurveDecode("Account data too short".to_string()));
        }

        if data[..8] != CURVE_DISCRIMINATOR {
            return Err(Error::CurveDecode(format!(
                "Wrong discriminator: expected {:?}, got {:?}",
                CURVE_DISCRIMINATOR,
                &data[..8]
            )));
        }

        BorshDeserialize::try_from_slice(data)
            .map_err(|e| Error::CurveDecode(format!("Borsh decode failed: {}", e)))
    }

    /// Current spot price in lamports per token unit
    /// price = virtual_sol_reserves / virtual_token_reserves
    pub fn spot_price(&self) -> Result<f64> {
        if self.virtual_token_reserves == 0 {
            return Err(Error::PriceOverflow);
        }

        Ok(self.virtual_sol_reserves as f64 / self.virtual_token_reserves as f64)
    }

    /// Token units received for a given lamport amount
    /// Uses constant product formula: x * y = k
    pub fn buy_out(&self, lamports_in: u64) -> Result<u64> {
        if self.virtual_sol_reserves == 0 || self.virtual_token_reserves == 0 {
            return Err(Error::PriceOverflow);
        }

        let new_sol_reserves = self
            .virtual_sol_reserves
            .checked_add(lamports_in)
            .ok_or(Error::PriceOverflow)?;

        // k = virtual_sol * virtual_token
        let k = (self.virtual_sol_reserves as u128)
            .checked_mul(self.virtual_token_reserves as u128)
            .ok_or(Error::PriceOverflow)?;

        let new_token_reserves = k
            .checked_div(new_sol_reserves as u128)
            .ok_or(Error::PriceOverflow)?;

        let tokens_out = (self.virtual_token_reserves as u128)
            .checked_sub(new_token_reserves)
            .ok_or(Error::PriceOverflow)?;

        Ok(tokens_out as u64)
    }

    /// Lamports received for selling a given token amount
    pub fn sell_out(&self, tokens_in: u64) -> Result<u64> {
        if self.virtual_sol_reserves == 0 || self.virtual_token_reserves == 0 {
            return Err(Error::PriceOverflow);
        }

        let new_token_reserves = self
            .virtual_token_reserves
            .checked_add(tokens_in)
            .ok_or(Error::PriceOverflow)?;

        let k = (self.virtual_sol_reserves as u128)
            .checked_mul(self.virtual_token_reserves as u128)
            .ok_or(Error::PriceOverflow)?;

        let new_sol_reserves = k
            .checked_div(new_token_reserves as u128)
            .ok_or(Error::PriceOverflow)?;

        let lamports_out = (self.virtual_sol_reserves as u128)
            .checked_sub(new_sol_reserves)
            .ok_or(Error::PriceOverflow)?;

        Ok(lamports_out as u64)
    }

    /// Advisory graduation progress in [0, 100], from accumulated real SOL
    pub fn graduation_progress(&self) -> f64 {
        let pct =
            self.real_sol_reserves as f64 / GRADUATION_SOL_TARGET_LAMPORTS as f64 * 100.0;
        pct.clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_curve() -> CurveState {
        CurveState::new(
            30_000_000_000,    // virtual_sol_reserves: 30 SOL
            1_000_000_000_000, // virtual_token_reserves
            0,
            1_000_000_000_000,
            1_000_000_000_000,
            false,
            Pubkey::new_unique(),
        )
    }

    #[test]
    fn test_spot_price() {
        let curve = test_curve();
        let price = curve.spot_price().unwrap();
        // 30_000_000_000 / 1_000_000_000_000 = 0.03 lamports per token unit
        assert!((price - 0.03).abs() < 0.001);
    }

    #[test]
    fn test_buy_out() {
        let curve = test_curve();

        // Buy with 1 SOL (1_000_000_000 lamports)
        let tokens = curve.buy_out(1_000_000_000).unwrap();
        // Roughly 32.26B units after constant-product slippage
        assert!(tokens > 30_000_000_000 && tokens < 35_000_000_000);
    }

    #[test]
    fn test_sell_round_trip_loses_to_slippage() {
        let curve = test_curve();

        let tokens = curve.buy_out(1_000_000_000).unwrap();
        let lamports_back = curve.sell_out(tokens).unwrap();
        // Selling the same amount back against the unchanged curve
        // cannot return more than was paid
        assert!(lamports_back <= 1_000_000_000);
        assert!(lamports_back > 900_000_000);
    }

    #[test]
    fn test_zero_reserves_rejected() {
        let curve = CurveState::new(0, 0, 0, 0, 0, false, Pubkey::new_unique());
        assert!(curve.spot_price().is_err());
        assert!(curve.buy_out(1).is_err());
        assert!(curve.sell_out(1).is_err());
    }

    #[test]
    fn test_graduation_progress() {
        let mut curve = test_curve();
        assert_eq!(curve.graduation_progress(), 0.0);

        curve.real_sol_reserves = GRADUATION_SOL_TARGET_LAMPORTS / 2;
        assert!((curve.graduation_progress() - 50.0).abs() < 0.01);

        curve.real_sol_reserves = GRADUATION_SOL_TARGET_LAMPORTS * 2;
        assert_eq!(curve.graduation_progress(), 100.0);
    }

    #[test]
    fn test_account_round_trip() {
        let curve = test_curve();
        let data = borsh::to_vec(&curve).unwrap();
        let decoded = CurveState::try_from_account_data(&data).unwrap();
        assert_eq!(decoded.virtual_sol_reserves, curve.virtual_sol_reserves);
        assert_eq!(decoded.creator, curve.creator);
        assert!(!decoded.complete);
    }

    #[test]
    fn test_bad_discriminator_rejected() {
        let curve = test_curve();
        let mut data = borsh::to_vec(&curve).unwrap();
        data[0] ^= 0xff;
        assert!(CurveState::try_from_account_data(&data).is_err());
    }
}
