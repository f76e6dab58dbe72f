//! Pump.fun protocol types: program constants, bonding curve state and
//! math, mint account parsing, price conversions.

pub mod curve;
pub mod mint;
pub mod price;
pub mod program;

pub use curve::CurveState;
pub use mint::{MintInfo, TokenProgram};
pub use program::TradeSide;
