//! GeniusWeb JSON scenarios: a domain object with `issuesValues` and one
//! `LinearAdditiveUtilitySpace` profile per party. Profiles express the
//! reservation as a bid, so the reserved value is that bid's utility.

use std::path::Path;

use serde_json::Value;

use super::{candidate_files, read_text, ReservedTarget, ScenarioFiles, ScenarioFormat, ScenarioFormatKind};
use crate::core::scenarios::{
    file_stem, Issue, IssueValue, Numeric, OutcomeSpace, ScenarioError, UfunSource,
    UtilityFunction, UtilityKind, ValueFunction,
};

const PROFILE_KEY: &str = "LinearAdditiveUtilitySpace";

pub struct GeniusWebFormat;

impl ScenarioFormat for GeniusWebFormat {
    fn kind(&self) -> ScenarioFormatKind {
        ScenarioFormatKind::GeniusWeb
    }

    fn find_files(&self, dir: &Path) -> Result<Option<ScenarioFiles>, ScenarioError> {
        let mut domain = None;
        let mut utilities = Vec::new();
        for path in candidate_files(dir, &["json"])? {
            let doc = match parse_file(&path) {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::debug!("skipping {}: {e}", path.display());
                    continue;
                }
            };
            if doc.get("issuesValues").is_some() {
                if domain.is_none() {
                    domain = Some(path);
                }
            } else if doc.get(PROFILE_KEY).is_some() {
                utilities.push(path);
            }
        }
        Ok(domain.map(|domain| ScenarioFiles { domain, utilities }))
    }

    fn load_domain(&self, file: &Path) -> Result<OutcomeSpace, ScenarioError> {
        let doc = parse_file(file)?;
        let issues = doc
            .get("issuesValues")
            .and_then(Value::as_object)
            .ok_or_else(|| ScenarioError::invalid(file, "issuesValues must be an object"))?;
        let issues = issues
            .iter()
            .map(|(name, spec)| parse_issue(name, spec, file))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(OutcomeSpace::new(issues))
    }

    fn load_utility(
        &self,
        file: &Path,
        space: &OutcomeSpace,
    ) -> Result<UtilityFunction, ScenarioError> {
        let doc = parse_file(file)?;
        let profile = doc
            .get(PROFILE_KEY)
            .ok_or_else(|| ScenarioError::invalid(file, "not a linear additive profile"))?;

        let mut weights = vec![0.0; space.issues.len()];
        if let Some(by_issue) = profile.get("issueWeights").and_then(Value::as_object) {
            for (issue, weight) in by_issue {
                if let Some(index) = space.issue_index(issue) {
                    weights[index] = weight.as_f64().unwrap_or(0.0);
                }
            }
        }

        let mut values = vec![ValueFunction::default(); space.issues.len()];
        if let Some(by_issue) = profile.get("issueUtilities").and_then(Value::as_object) {
            for (issue, spec) in by_issue {
                if let Some(index) = space.issue_index(issue) {
                    values[index] = value_function(spec);
                }
            }
        }

        let mut ufun = UtilityFunction {
            name: profile
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| file_stem(file)),
            type_name: "LinearAdditiveUtilityFunction".to_string(),
            reserved_value: None,
            kind: UtilityKind::LinearAdditive {
                weights,
                values,
                bias: 0.0,
            },
        };

        let reservation = profile
            .get("reservationBid")
            .and_then(|bid| bid.get("issuevalues"))
            .and_then(Value::as_object);
        if let Some(bid) = reservation {
            let outcome: Option<Vec<IssueValue>> = space
                .issues
                .iter()
                .map(|issue| bid.get(&issue.name).and_then(json_value))
                .collect();
            ufun.reserved_value = outcome
                .and_then(|outcome| ufun.eval(&outcome))
                .map(Numeric::Value);
        }
        Ok(ufun)
    }

    fn write_reserved_value(
        &self,
        source: &UfunSource,
        _target: ReservedTarget,
        _value: f64,
    ) -> Result<(), ScenarioError> {
        Err(ScenarioError::Unsupported(format!(
            "{} stores a reservation bid, not a reserved value",
            source.file.display()
        )))
    }
}

fn parse_file(path: &Path) -> Result<Value, ScenarioError> {
    serde_json::from_str(&read_text(path)?).map_err(|e| ScenarioError::Json {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn parse_issue(name: &str, spec: &Value, path: &Path) -> Result<Issue, ScenarioError> {
    if let Some(values) = spec.get("values").and_then(Value::as_array) {
        let values = values
            .iter()
            .map(json_value)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| ScenarioError::invalid(path, format!("issue {name} has bad values")))?;
        return Ok(Issue::discrete(name, values));
    }

    let range = spec.get("range").unwrap_or(spec);
    let low = range.get("low").and_then(number);
    let high = range.get("high").and_then(number);
    let step = range.get("step").and_then(number).unwrap_or(1.0);
    match (low, high) {
        (Some(lo), Some(hi)) if step == 1.0 && lo.fract() == 0.0 && hi.fract() == 0.0 => {
            Ok(Issue::integer(name, lo as i64, hi as i64))
        }
        (Some(lo), Some(hi)) => Ok(Issue::continuous(name, lo, hi)),
        _ => Err(ScenarioError::invalid(
            path,
            format!("issue {name} has neither values nor a range"),
        )),
    }
}

/// Numbers may be written as JSON numbers or numeric strings.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_value(value: &Value) -> Option<IssueValue> {
    match value {
        Value::String(s) => Some(IssueValue::Text(s.clone())),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(IssueValue::Int(i)),
            None => n.as_f64().map(IssueValue::Float),
        },
        _ => None,
    }
}

fn value_function(spec: &Value) -> ValueFunction {
    if let Some(table) = spec
        .get("DiscreteValueSetUtilities")
        .and_then(|d| d.get("valueUtilities"))
        .and_then(Value::as_object)
    {
        return ValueFunction::Table(
            table
                .iter()
                .filter_map(|(value, utility)| Some((value.clone(), utility.as_f64()?)))
                .collect(),
        );
    }
    if let Some(numeric) = spec.get("NumberValueSetUtilities") {
        let field = |key: &str| numeric.get(key).and_then(number);
        if let (Some(lv), Some(lu), Some(hv), Some(hu)) = (
            field("lowValue"),
            field("lowUtility"),
            field("highValue"),
            field("highUtility"),
        ) {
            if hv != lv {
                let slope = (hu - lu) / (hv - lv);
                return ValueFunction::Affine {
                    slope,
                    bias: lu - slope * lv,
                };
            }
        }
    }
    ValueFunction::default()
}
