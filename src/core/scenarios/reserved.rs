//! Repair of reserved values that are missing, non-numeric, infinite or NaN.
//!
//! A broken reserved value is replaced by the utility function's minimum over
//! the outcome space. Discount wrappers are checked one level down as well,
//! since the negotiation engine reads the wrapped function's value too.

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::formats::{format_for, ReservedTarget};
use super::stats::{sample_outcomes, MAX_CARDINALITY};
use super::{load_scenario, Numeric, Outcome, Scenario, ScenarioError, UtilityFunction};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum FixOutcome {
    Fixed { value: f64 },
    Unfixable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReservedValueFix {
    /// Position in `Scenario::ufuns`.
    pub index: usize,
    pub ufun: String,
    pub target: ReservedTarget,
    /// The value as it was, for reporting.
    pub previous: Option<String>,
    pub outcome: FixOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioFixReport {
    pub scenario: PathBuf,
    pub fixes: Vec<ReservedValueFix>,
    pub written: usize,
    pub write_errors: Vec<String>,
}

impl ScenarioFixReport {
    pub fn fixed(&self) -> usize {
        self.fixes
            .iter()
            .filter(|fix| matches!(fix.outcome, FixOutcome::Fixed { .. }))
            .count()
    }

    pub fn unfixable(&self) -> usize {
        self.fixes.len() - self.fixed()
    }
}

pub fn needs_fix(reserved: Option<&Numeric>) -> bool {
    match reserved.and_then(Numeric::as_f64) {
        Some(value) => !value.is_finite(),
        None => true,
    }
}

fn repair(
    ufun: &mut UtilityFunction,
    outcomes: &[Outcome],
    index: usize,
    target: ReservedTarget,
) -> Option<ReservedValueFix> {
    if !needs_fix(ufun.reserved_value.as_ref()) {
        return None;
    }
    let previous = ufun.reserved_value.as_ref().map(ToString::to_string);
    let outcome = match ufun.min_over(outcomes) {
        Some(min) if min.is_finite() => {
            ufun.reserved_value = Some(Numeric::Value(min));
            FixOutcome::Fixed { value: min }
        }
        Some(min) => FixOutcome::Unfixable {
            reason: format!("minimum utility is {min}"),
        },
        None => FixOutcome::Unfixable {
            reason: "utility function cannot be evaluated".to_string(),
        },
    };
    Some(ReservedValueFix {
        index,
        ufun: ufun.name.clone(),
        target,
        previous,
        outcome,
    })
}

/// Repair the loaded scenario in memory. Nothing is written to disk.
pub fn fix_in_place(scenario: &mut Scenario) -> Vec<ReservedValueFix> {
    let outcomes = sample_outcomes(&scenario.outcome_space, MAX_CARDINALITY);
    let mut fixes = Vec::new();
    for (index, ufun) in scenario.ufuns.iter_mut().enumerate() {
        fixes.extend(repair(ufun, &outcomes, index, ReservedTarget::Outer));
        if let Some(inner) = ufun.inner_mut() {
            fixes.extend(repair(inner, &outcomes, index, ReservedTarget::Inner));
        }
    }
    fixes
}

/// Repair a scenario and, unless `dry_run`, write the new values back to its
/// files. Write failures are collected in the report.
pub fn fix_scenario_dir(path: &Path, dry_run: bool) -> Result<ScenarioFixReport, ScenarioError> {
    let mut scenario = load_scenario(path)?;
    let fixes = fix_in_place(&mut scenario);
    let mut report = ScenarioFixReport {
        scenario: path.to_path_buf(),
        fixes,
        written: 0,
        write_errors: Vec::new(),
    };
    if dry_run {
        return Ok(report);
    }

    let format = format_for(scenario.format);
    for fix in &report.fixes {
        let FixOutcome::Fixed { value } = fix.outcome else {
            continue;
        };
        let Some(source) = scenario.sources.get(fix.index) else {
            continue;
        };
        match format.write_reserved_value(source, fix.target, value) {
            Ok(()) => {
                tracing::debug!(
                    "{}: reserved value of {} set to {value}",
                    source.file.display(),
                    fix.ufun
                );
                report.written += 1;
            }
            Err(e) => report.write_errors.push(e.to_string()),
        }
    }
    Ok(report)
}
