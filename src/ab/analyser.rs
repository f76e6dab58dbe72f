//! Cross-session parameter analysis
//!
//! Aggregates every persisted parameter diff into per-parameter impact
//! figures, derives a recommended config with confidence grades, and
//! proposes the next experiments.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::Result;
use crate::store::ab::{ParameterDiffRow, Winner};
use crate::store::StateStore;

/// Numeric tunables and their shipped defaults; used to propose
/// experiments for parameters no session has varied yet
const KNOWN_TUNABLES: &[(&str, f64)] = &[
    ("take_profit_percent", 50.0),
    ("stop_loss_percent", 30.0),
    ("max_hold_duration_ms", 300_000.0),
    ("price_check_interval_ms", 2_000.0),
    ("momentum_min_total_buys", 10.0),
    ("min_sol_in_curve", 5.0),
    ("max_sol_in_curve", 60.0),
    ("max_token_age_seconds", 60.0),
    ("momentum_initial_delay_ms", 2_000.0),
    ("momentum_recheck_interval_ms", 2_000.0),
    ("momentum_max_checks", 3.0),
    ("buy_slippage_percent", 25.0),
    ("sell_slippage_percent", 25.0),
    ("max_trades_per_hour", 12.0),
    ("quote_amount_sol", 0.05),
];

/// Aggregate view of one tested parameter
#[derive(Debug, Clone, Serialize)]
pub struct ParameterImpact {
    pub param_name: String,
    pub sessions_tested: usize,
    pub higher_wins: usize,
    pub lower_wins: usize,
    /// Mean |pnl difference| across sessions
    pub avg_pnl_impact: f64,
    pub max_pnl_impact: f64,
    /// Modal winner value among non-tie sessions
    pub best_value: Option<serde_json::Value>,
    /// Share of non-tie sessions the modal value won, in percent
    pub best_value_win_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallConfidence {
    InsufficientData,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize)]
pub struct BestParameter {
    pub param_name: String,
    pub value: serde_json::Value,
    pub confidence: Confidence,
    pub sessions_tested: usize,
    pub win_rate: f64,
}

/// Recommended configuration assembled from modal winners
#[derive(Debug, Clone, Serialize)]
pub struct BestConfig {
    pub parameters: Vec<BestParameter>,
    pub overall_confidence: OverallConfidence,
    pub total_sessions: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestSuggestion {
    pub param_name: String,
    pub value_a: f64,
    pub value_b: f64,
    pub priority: Priority,
    pub rationale: String,
}

/// Full analysis over every completed session
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub total_sessions: usize,
    pub impacts: Vec<ParameterImpact>,
    pub best_config: BestConfig,
    pub suggestions: Vec<TestSuggestion>,
}

fn numeric(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Collapse one parameter's diff history into an impact row
fn impact_from_history(param_name: &str, history: &[ParameterDiffRow]) -> ParameterImpact {
    let mut higher_wins = 0;
    let mut lower_wins = 0;
    let mut impact_sum = 0.0;
    let mut impact_max: f64 = 0.0;
    let mut winner_counts: HashMap<String, (usize, serde_json::Value)> = HashMap::new();
    let mut non_tie = 0;

    for row in history {
        let diff = &row.diff;
        impact_sum += diff.pnl_difference;
        impact_max = impact_max.max(diff.pnl_difference);

        if diff.winner == Winner::Tie {
            continue;
        }
        non_tie += 1;

        let (winner_value, loser_value) = match diff.winner {
            Winner::A => (&diff.value_a, &diff.value_b),
            Winner::B => (&diff.value_b, &diff.value_a),
            Winner::Tie => unreachable!(),
        };

        if let (Some(w), Some(l)) = (numeric(winner_value), numeric(loser_value)) {
            if w > l {
                higher_wins += 1;
            } else {
                lower_wins += 1;
            }
        }

        let entry = winner_counts
            .entry(winner_value.to_string())
            .or_insert((0, winner_value.clone()));
        entry.0 += 1;
    }

    let best = winner_counts
        .into_iter()
        .max_by_key(|(_, (count, _))| *count)
        .map(|(_, (count, value))| (count, value));

    let (best_value, best_value_win_rate) = match best {
        Some((count, value)) if non_tie > 0 => {
            (Some(value), count as f64 / non_tie as f64 * 100.0)
        }
        _ => (None, 0.0),
    };

    ParameterImpact {
        param_name: param_name.to_string(),
        sessions_tested: history.len(),
        higher_wins,
        lower_wins,
        avg_pnl_impact: if history.is_empty() {
            0.0
        } else {
            impact_sum / history.len() as f64
        },
        max_pnl_impact: impact_max,
        best_value,
        best_value_win_rate,
    }
}

/// Impact rows for every parameter any session has varied
pub fn analyze_parameters(store: &StateStore) -> Result<Vec<ParameterImpact>> {
    let mut impacts = Vec::new();
    for param in store.get_tested_parameters()? {
        let history = store.get_parameter_history(&param)?;
        impacts.push(impact_from_history(&param, &history));
    }
    Ok(impacts)
}

fn parameter_confidence(sessions: usize, win_rate: f64) -> Confidence {
    if sessions >= 5 && win_rate >= 70.0 {
        Confidence::High
    } else if sessions >= 3 && win_rate >= 60.0 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

/// Assemble the recommended config from modal winners
pub fn recommend_config(impacts: &[ParameterImpact], total_sessions: usize) -> BestConfig {
    let parameters: Vec<BestParameter> = impacts
        .iter()
        .filter_map(|impact| {
            let value = impact.best_value.clone()?;
            Some(BestParameter {
                param_name: impact.param_name.clone(),
                confidence: parameter_confidence(
                    impact.sessions_tested,
                    impact.best_value_win_rate,
                ),
                value,
                sessions_tested: impact.sessions_tested,
                win_rate: impact.best_value_win_rate,
            })
        })
        .collect();

    let overall_confidence = if total_sessions < 3 {
        OverallConfidence::InsufficientData
    } else {
        let high = parameters
            .iter()
            .filter(|p| p.confidence == Confidence::High)
            .count();
        if !parameters.is_empty() && high * 2 >= parameters.len() {
            OverallConfidence::High
        } else if total_sessions >= 5 {
            OverallConfidence::Medium
        } else {
            OverallConfidence::Low
        }
    };

    BestConfig {
        parameters,
        overall_confidence,
        total_sessions,
    }
}

/// Propose the next A/B experiments, highest priority first
pub fn suggest_tests(impacts: &[ParameterImpact]) -> Vec<TestSuggestion> {
    let tested: HashMap<&str, &ParameterImpact> = impacts
        .iter()
        .map(|i| (i.param_name.as_str(), i))
        .collect();

    let mut suggestions = Vec::new();

    for (name, default) in KNOWN_TUNABLES {
        match tested.get(name) {
            None => {
                suggestions.push(TestSuggestion {
                    param_name: name.to_string(),
                    value_a: default * 0.5,
                    value_b: default * 1.5,
                    priority: Priority::Medium,
                    rationale: "never tested; bracket the default".to_string(),
                });
            }
            Some(impact) if impact.sessions_tested < 3 => {
                if let Some(best) = impact.best_value.as_ref().and_then(numeric) {
                    suggestions.push(TestSuggestion {
                        param_name: name.to_string(),
                        value_a: best * 0.85,
                        value_b: best * 1.15,
                        priority: Priority::High,
                        rationale: format!(
                            "only {} session(s); refine around the winning value",
                            impact.sessions_tested
                        ),
                    });
                }
            }
            Some(_) => {}
        }
    }

    suggestions.sort_by_key(|s| s.priority);
    suggestions
}

/// Analyse everything in one call (the CLI entry point)
pub fn analyze(store: &StateStore) -> Result<Analysis> {
    let total_sessions = store.get_completed_sessions_with_pnl()?.len();
    let impacts = analyze_parameters(store)?;
    let best_config = recommend_config(&impacts, total_sessions);
    let suggestions = suggest_tests(&impacts);

    Ok(Analysis {
        total_sessions,
        impacts,
        best_config,
        suggestions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ab::ParameterDiff;

    fn diff_row(
        session: &str,
        param: &str,
        value_a: f64,
        value_b: f64,
        pnl_a: f64,
        pnl_b: f64,
    ) -> ParameterDiffRow {
        let winner = if pnl_a > pnl_b {
            Winner::A
        } else if pnl_b > pnl_a {
            Winner::B
        } else {
            Winner::Tie
        };
        let winner_value = match winner {
            Winner::A => Some(serde_json::json!(value_a)),
            Winner::B => Some(serde_json::json!(value_b)),
            Winner::Tie => None,
        };
        ParameterDiffRow {
            session_id: session.to_string(),
            diff: ParameterDiff {
                param_name: param.to_string(),
                value_a: serde_json::json!(value_a),
                value_b: serde_json::json!(value_b),
                winner,
                winner_value,
                pnl_a,
                pnl_b,
                pnl_difference: (pnl_a - pnl_b).abs(),
            },
        }
    }

    #[test]
    fn test_single_session_impact() {
        // take_profit 40 vs 60, PnLs +0.2 vs +0.5
        let history = vec![diff_row("s1", "take_profit_percent", 40.0, 60.0, 0.2, 0.5)];
        let impact = impact_from_history("take_profit_percent", &history);

        assert_eq!(impact.sessions_tested, 1);
        assert_eq!(impact.higher_wins, 1);
        assert_eq!(impact.lower_wins, 0);
        assert!((impact.avg_pnl_impact - 0.3).abs() < 1e-12);
        assert_eq!(impact.best_value, Some(serde_json::json!(60.0)));
        assert_eq!(impact.best_value_win_rate, 100.0);
    }

    #[test]
    fn test_modal_best_value() {
        let history = vec![
            diff_row("s1", "stop_loss_percent", 20.0, 30.0, 0.5, 0.1), // 20 wins
            diff_row("s2", "stop_loss_percent", 20.0, 30.0, 0.4, 0.2), // 20 wins
            diff_row("s3", "stop_loss_percent", 20.0, 40.0, 0.1, 0.3), // 40 wins
            diff_row("s4", "stop_loss_percent", 25.0, 30.0, 0.2, 0.2), // tie
        ];
        let impact = impact_from_history("stop_loss_percent", &history);

        assert_eq!(impact.sessions_tested, 4);
        assert_eq!(impact.best_value, Some(serde_json::json!(20.0)));
        // 2 of 3 non-tie sessions
        assert!((impact.best_value_win_rate - 66.666).abs() < 0.01);
        assert_eq!(impact.lower_wins, 2);
        assert_eq!(impact.higher_wins, 1);
        assert!((impact.max_pnl_impact - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_confidence_grades() {
        assert_eq!(parameter_confidence(5, 70.0), Confidence::High);
        assert_eq!(parameter_confidence(5, 69.0), Confidence::Medium);
        assert_eq!(parameter_confidence(3, 60.0), Confidence::Medium);
        assert_eq!(parameter_confidence(2, 100.0), Confidence::Low);
        assert_eq!(parameter_confidence(10, 50.0), Confidence::Low);
    }

    #[test]
    fn test_overall_confidence_rules() {
        let impact = |sessions, rate| ParameterImpact {
            param_name: "p".to_string(),
            sessions_tested: sessions,
            higher_wins: 0,
            lower_wins: 0,
            avg_pnl_impact: 0.0,
            max_pnl_impact: 0.0,
            best_value: Some(serde_json::json!(1.0)),
            best_value_win_rate: rate,
        };

        // Fewer than 3 sessions: insufficient regardless of impact
        let cfg = recommend_config(&[impact(10, 90.0)], 2);
        assert_eq!(cfg.overall_confidence, OverallConfidence::InsufficientData);

        // Half the parameters high
        let cfg = recommend_config(&[impact(10, 90.0), impact(1, 10.0)], 4);
        assert_eq!(cfg.overall_confidence, OverallConfidence::High);

        // No high parameters but 5+ sessions
        let cfg = recommend_config(&[impact(1, 10.0)], 6);
        assert_eq!(cfg.overall_confidence, OverallConfidence::Medium);

        // No high parameters, 3-4 sessions
        let cfg = recommend_config(&[impact(1, 10.0)], 3);
        assert_eq!(cfg.overall_confidence, OverallConfidence::Low);
    }

    #[test]
    fn test_suggestions_for_untested_and_thin() {
        let thin = ParameterImpact {
            param_name: "take_profit_percent".to_string(),
            sessions_tested: 1,
            higher_wins: 1,
            lower_wins: 0,
            avg_pnl_impact: 0.3,
            max_pnl_impact: 0.3,
            best_value: Some(serde_json::json!(60.0)),
            best_value_win_rate: 100.0,
        };

        let suggestions = suggest_tests(&[thin]);

        // Thin parameter gets a high-priority refinement first
        let first = &suggestions[0];
        assert_eq!(first.param_name, "take_profit_percent");
        assert_eq!(first.priority, Priority::High);
        assert!((first.value_a - 51.0).abs() < 1e-9);
        assert!((first.value_b - 69.0).abs() < 1e-9);

        // Untested tunables bracket their defaults at medium priority
        let stop_loss = suggestions
            .iter()
            .find(|s| s.param_name == "stop_loss_percent")
            .unwrap();
        assert_eq!(stop_loss.priority, Priority::Medium);
        assert!((stop_loss.value_a - 15.0).abs() < 1e-9);
        assert!((stop_loss.value_b - 45.0).abs() < 1e-9);

        // Ordering: all high before all medium
        let priorities: Vec<Priority> = suggestions.iter().map(|s| s.priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort();
        assert_eq!(priorities, sorted);
    }

    #[test]
    fn test_well_tested_parameter_not_suggested() {
        let solid = ParameterImpact {
            param_name: "take_profit_percent".to_string(),
            sessions_tested: 6,
            higher_wins: 4,
            lower_wins: 2,
            avg_pnl_impact: 0.2,
            max_pnl_impact: 0.5,
            best_value: Some(serde_json::json!(60.0)),
            best_value_win_rate: 80.0,
        };

        let suggestions = suggest_tests(&[solid]);
        assert!(suggestions
            .iter()
            .all(|s| s.param_name != "take_profit_percent"));
    }
}
