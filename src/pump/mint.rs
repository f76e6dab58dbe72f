//! Mint account parsing and admission invariants
//!
//! Pump.fun mints are expected to have both authorities revoked. A mint
//! with a live mint or freeze authority can be inflated or frozen out
//! from under a holder, so admission requires both to be None.

use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Token-2022 program ID (not exported by the classic spl-token crate)
pub const TOKEN_2022_PROGRAM_ID_STR: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb";

lazy_static::lazy_static! {
    pub static ref TOKEN_2022_PROGRAM_ID: Pubkey =
        Pubkey::from_str(TOKEN_2022_PROGRAM_ID_STR).expect("Invalid token-2022 program ID");
}

/// Which token program owns a mint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenProgram {
    Spl,
    Token2022,
}

impl TokenProgram {
    pub fn id(&self) -> Pubkey {
        match self {
            TokenProgram::Spl => spl_token::ID,
            TokenProgram::Token2022 => *TOKEN_2022_PROGRAM_ID,
        }
    }
}

/// Decoded mint account fields relevant to admission
#[derive(Debug, Clone)]
pub struct MintInfo {
    pub mint_authority: Option<Pubkey>,
    pub freeze_authority: Option<Pubkey>,
    pub decimals: u8,
    pub supply: u64,
    pub is_token_2022: bool,
}

/// Base SPL mint account length. Token-2022 mints carry extensions
/// beyond this offset; the base layout is identical.
const MINT_BASE_LEN: usize = 82;

fn read_coption_pubkey(data: &[u8], offset: usize) -> Result<Option<Pubkey>> {
    let tag = u32::from_le_bytes(
        data[offset..offset + 4]
            .try_into()
            .map_err(|_| Error::MintDecode("COption tag out of range".to_string()))?,
    );
    match tag {
        0 => Ok(None),
        1 => {
            let key: [u8; 32] = data[offset + 4..offset + 36]
                .try_into()
                .map_err(|_| Error::MintDecode("COption pubkey out of range".to_string()))?;
            Ok(Some(Pubkey::new_from_array(key)))
        }
        other => Err(Error::MintDecode(format!("Invalid COption tag: {}", other))),
    }
}

impl MintInfo {
    /// Parse a raw mint account.
    ///
    /// Mint account layout (classic SPL and Token-2022 base):
    /// - mint_authority: COption<Pubkey> (36 bytes: 4 + 32)
    /// - supply: u64 (8 bytes)
    /// - decimals: u8 (1 byte)
    /// - is_initialized: bool (1 byte)
    /// - freeze_authority: COption<Pubkey> (36 bytes)
    pub fn parse(data: &[u8], is_token_2022: bool) -> Result<Self> {
        if data.len() < MINT_BASE_LEN {
            return Err(Error::MintDecode(format!(
                "Mint account data too short: {} bytes",
                data.len()
            )));
        }

        let mint_authority = read_coption_pubkey(data, 0)?;
        let supply = u64::from_le_bytes(
            data[36..44]
                .try_into()
                .map_err(|_| Error::MintDecode("supply out of range".to_string()))?,
        );
        let decimals = data[44];
        let freeze_authority = read_coption_pubkey(data, 46)?;

        Ok(Self {
            mint_authority,
            freeze_authority,
            decimals,
            supply,
            is_token_2022,
        })
    }

    /// First admission violation, if any: both authorities must be
    /// revoked and decimals must be sane.
    pub fn admission_violation(&self) -> Option<String> {
        if self.mint_authority.is_some() {
            return Some("mint authority still set".to_string());
        }
        if self.freeze_authority.is_some() {
            return Some("freeze authority still set".to_string());
        }
        if self.decimals > 18 {
            return Some(format!("decimals {} out of range", self.decimals));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_mint(
        mint_authority: Option<Pubkey>,
        freeze_authority: Option<Pubkey>,
        supply: u64,
        decimals: u8,
    ) -> Vec<u8> {
        let mut data = vec![0u8; MINT_BASE_LEN];
        if let Some(key) = mint_authority {
            data[0..4].copy_from_slice(&1u32.to_le_bytes());
            data[4..36].copy_from_slice(key.as_ref());
        }
        data[36..44].copy_from_slice(&supply.to_le_bytes());
        data[44] = decimals;
        data[45] = 1; // is_initialized
        if let Some(key) = freeze_authority {
            data[46..50].copy_from_slice(&1u32.to_le_bytes());
            data[50..82].copy_from_slice(key.as_ref());
        }
        data
    }

    #[test]
    fn test_parse_revoked_mint() {
        let data = encode_mint(None, None, 1_000_000_000_000, 6);
        let info = MintInfo::parse(&data, false).unwrap();

        assert!(info.mint_authority.is_none());
        assert!(info.freeze_authority.is_none());
        assert_eq!(info.decimals, 6);
        assert_eq!(info.supply, 1_000_000_000_000);
        assert!(info.admission_violation().is_none());
    }

    #[test]
    fn test_live_authorities_rejected() {
        let authority = Pubkey::new_unique();

        let data = encode_mint(Some(authority), None, 0, 6);
        let info = MintInfo::parse(&data, false).unwrap();
        assert!(info.admission_violation().unwrap().contains("mint authority"));

        let data = encode_mint(None, Some(authority), 0, 6);
        let info = MintInfo::parse(&data, false).unwrap();
        assert!(info
            .admission_violation()
            .unwrap()
            .contains("freeze authority"));
    }

    #[test]
    fn test_absurd_decimals_rejected() {
        let data = encode_mint(None, None, 0, 19);
        let info = MintInfo::parse(&data, false).unwrap();
        assert!(info.admission_violation().is_some());
    }

    #[test]
    fn test_token_2022_extensions_tolerated() {
        let mut data = encode_mint(None, None, 42, 9);
        data.extend_from_slice(&[0u8; 120]); // extension tail
        let info = MintInfo::parse(&data, true).unwrap();
        assert!(info.is_token_2022);
        assert_eq!(info.supply, 42);
    }

    #[test]
    fn test_short_account_rejected() {
        assert!(MintInfo::parse(&[0u8; 40], false).is_err());
    }
}
