//! Scenario statistics cached in `_info.yaml`: outcome count, opposition
//! level and the fraction of outcomes every party finds rational.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use super::info::ScenarioInfo;
use super::{Outcome, OutcomeSpace, Scenario, ScenarioError, UtilityFunction};

/// Largest outcome set enumerated exactly; bigger spaces are sampled.
pub const MAX_CARDINALITY: usize = 10_000;

const SAMPLING_SEED: u64 = 42;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioStats {
    pub n_outcomes: Option<u64>,
    pub evaluated_outcomes: usize,
    pub opposition: Option<f64>,
    pub rational_fraction: Option<f64>,
}

impl From<&ScenarioStats> for ScenarioInfo {
    fn from(stats: &ScenarioStats) -> Self {
        Self {
            n_outcomes: stats.n_outcomes,
            opposition: stats.opposition,
            rational_fraction: stats.rational_fraction,
            description: None,
        }
    }
}

/// Every outcome when the space has at most `limit`, otherwise a seeded
/// uniform sample of `limit` outcomes.
pub fn sample_outcomes(space: &OutcomeSpace, limit: usize) -> Vec<Outcome> {
    let mut rng = StdRng::seed_from_u64(SAMPLING_SEED);
    space.outcomes(limit, &mut rng)
}

/// Utility table, one row per function.
fn evaluate_all(
    ufuns: &[UtilityFunction],
    outcomes: &[Outcome],
) -> Result<Vec<Vec<f64>>, ScenarioError> {
    ufuns
        .iter()
        .map(|ufun| {
            outcomes
                .iter()
                .map(|outcome| ufun.eval(outcome))
                .collect::<Option<Vec<f64>>>()
                .ok_or_else(|| ScenarioError::Evaluation(ufun.name.clone()))
        })
        .collect()
}

/// Distance from the best outcome to the utopia point, with each function
/// scaled by its maximum. `0.0` means one outcome is best for everybody.
pub fn opposition_level(utilities: &[Vec<f64>]) -> Option<f64> {
    let n_outcomes = utilities.first()?.len();
    if n_outcomes == 0 {
        return None;
    }
    let maxima: Vec<f64> = utilities
        .iter()
        .map(|row| row.iter().copied().fold(f64::NEG_INFINITY, f64::max))
        .collect();

    let mut best = f64::INFINITY;
    for outcome in 0..n_outcomes {
        let distance: f64 = utilities
            .iter()
            .zip(&maxima)
            .map(|(row, max)| {
                let u = row[outcome];
                if *max == 0.0 {
                    u * u
                } else {
                    let gap = 1.0 - u / max;
                    gap * gap
                }
            })
            .sum();
        best = best.min(distance);
    }
    Some(best.sqrt())
}

/// Share of outcomes at or above every reserved value. A missing or
/// non-numeric reserved value accepts everything.
pub fn rational_fraction(utilities: &[Vec<f64>], reserved: &[Option<f64>]) -> Option<f64> {
    let n_outcomes = utilities.first()?.len();
    if n_outcomes == 0 {
        return None;
    }
    let thresholds: Vec<f64> = reserved
        .iter()
        .map(|r| match r {
            Some(v) if !v.is_nan() => *v,
            _ => f64::NEG_INFINITY,
        })
        .collect();
    let rational = (0..n_outcomes)
        .filter(|&outcome| {
            utilities
                .iter()
                .zip(&thresholds)
                .all(|(row, threshold)| row[outcome] >= *threshold)
        })
        .count();
    Some(rational as f64 / n_outcomes as f64)
}

pub fn compute_stats(scenario: &Scenario, limit: usize) -> Result<ScenarioStats, ScenarioError> {
    let outcomes = sample_outcomes(&scenario.outcome_space, limit);
    let utilities = evaluate_all(&scenario.ufuns, &outcomes)?;
    let reserved: Vec<Option<f64>> = scenario.ufuns.iter().map(UtilityFunction::reserved).collect();

    Ok(ScenarioStats {
        n_outcomes: scenario.outcome_space.cardinality().finite(),
        evaluated_outcomes: outcomes.len(),
        opposition: opposition_level(&utilities),
        rational_fraction: rational_fraction(&utilities, &reserved),
    })
}
