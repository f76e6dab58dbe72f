//! Price and unit conversion helpers

/// SOL decimals (lamports)
pub const SOL_DECIMALS: u8 = 9;

/// Convert lamports to SOL
pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / 10f64.powi(SOL_DECIMALS as i32)
}

/// Convert SOL to lamports
pub fn sol_to_lamports(sol: f64) -> u64 {
    (sol * 10f64.powi(SOL_DECIMALS as i32)) as u64
}

/// Convert a slippage percentage (0-100) to basis points
pub fn percent_to_bps(percent: f64) -> u32 {
    (percent * 100.0).round() as u32
}

/// Calculate minimum SOL to receive for a sell with slippage
pub fn min_sol_with_slippage(expected_sol: u64, slippage_bps: u32) -> u64 {
    let slippage_factor = 10000 - slippage_bps as u64;
    (expected_sol as u128 * slippage_factor as u128 / 10000) as u64
}

/// Calculate maximum SOL to spend for a buy with slippage
pub fn max_sol_with_slippage(expected_sol: u64, slippage_bps: u32) -> u64 {
    let slippage_factor = 10000 + slippage_bps as u64;
    (expected_sol as u128 * slippage_factor as u128 / 10000) as u64
}

/// Calculate percentage change between two values
pub fn percent_change(old: f64, new: f64) -> f64 {
    if old == 0.0 {
        return 0.0;
    }
    ((new - old) / old) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lamports_conversion() {
        assert_eq!(lamports_to_sol(1_000_000_000), 1.0);
        assert_eq!(sol_to_lamports(1.0), 1_000_000_000);
        assert_eq!(sol_to_lamports(0.05), 50_000_000);
    }

    #[test]
    fn test_slippage() {
        // 25% slippage (2500 bps)
        assert_eq!(min_sol_with_slippage(1_000_000, 2500), 750_000);
        assert_eq!(max_sol_with_slippage(1_000_000, 2500), 1_250_000);
    }

    #[test]
    fn test_percent_to_bps() {
        assert_eq!(percent_to_bps(1.0), 100);
        assert_eq!(percent_to_bps(25.0), 2500);
        assert_eq!(percent_to_bps(0.5), 50);
    }

    #[test]
    fn test_percent_change() {
        assert_eq!(percent_change(100.0, 150.0), 50.0);
        assert_eq!(percent_change(100.0, 50.0), -50.0);
        assert_eq!(percent_change(0.0, 10.0), 0.0);
    }
}
