//! Deep curve filters
//!
//! Run against the decoded bonding curve state: hard bounds on real SOL
//! in the curve, plus advisory scores that can optionally gate on a
//! composite threshold.

use crate::config::VariantConfig;
use crate::pump::price::lamports_to_sol;
use crate::pump::CurveState;

/// Graduation progress beyond which the max-sol score bottoms out
const SCORE_DECAY_PROGRESS_LIMIT: f64 = 75.0;

/// Highest possible composite (min-sol 20 + max-sol 15)
const MAX_COMPOSITE_SCORE: f64 = 35.0;

/// Outcome of the deep filter stage
#[derive(Debug, Clone)]
pub enum DeepVerdict {
    Pass(DeepScores),
    Reject { reason: String },
}

/// Advisory scores attached to a passing evaluation
#[derive(Debug, Clone, Copy)]
pub struct DeepScores {
    pub min_sol_score: f64,
    pub max_sol_score: f64,
    /// Composite normalised to [0, 100]
    pub normalized: f64,
}

/// Evaluate the deep sub-filters against a decoded curve.
///
/// Graduated curves are rejected before this point; callers guarantee
/// `curve.complete == false`.
pub fn evaluate(config: &VariantConfig, curve: &CurveState) -> DeepVerdict {
    let real_sol = lamports_to_sol(curve.real_sol_reserves);

    if real_sol < config.min_sol_in_curve {
        return DeepVerdict::Reject {
            reason: format!(
                "SOL_IN_CURVE_TOO_LOW: {:.3} SOL below minimum {:.3}",
                real_sol, config.min_sol_in_curve
            ),
        };
    }

    if real_sol > config.max_sol_in_curve {
        return DeepVerdict::Reject {
            reason: format!(
                "SOL_IN_CURVE_TOO_HIGH: {:.3} SOL above maximum {:.3}",
                real_sol, config.max_sol_in_curve
            ),
        };
    }

    // Min-sol score scales 10..20 with how far above the floor the
    // curve sits within the accepted band
    let band = (config.max_sol_in_curve - config.min_sol_in_curve).max(f64::EPSILON);
    let position = ((real_sol - config.min_sol_in_curve) / band).clamp(0.0, 1.0);
    let min_sol_score = 10.0 + 10.0 * position;

    // Max-sol score decays 15 -> 0 as graduation progress approaches 75%
    let progress = curve.graduation_progress();
    let decay = (1.0 - progress / SCORE_DECAY_PROGRESS_LIMIT).clamp(0.0, 1.0);
    let max_sol_score = 15.0 * decay;

    let normalized = (min_sol_score + max_sol_score) / MAX_COMPOSITE_SCORE * 100.0;

    if let Some(required) = config.min_score_required {
        if normalized < required {
            return DeepVerdict::Reject {
                reason: format!(
                    "LOW_SCORE: composite {:.1} below required {:.1}",
                    normalized, required
                ),
            };
        }
    }

    DeepVerdict::Pass(DeepScores {
        min_sol_score,
        max_sol_score,
        normalized,
    })
}
