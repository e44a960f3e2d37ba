//! negmas YAML scenarios: one domain file with an `issues` list and one file
//! per utility function, each tagged with its class in `type`. A scenario can
//! also be a single file holding `outcome_space` and a `ufuns` list.

use std::collections::BTreeMap;
use std::path::Path;

use serde_yaml::{Mapping, Value};

use super::{candidate_files, read_text, ReservedTarget, ScenarioFiles, ScenarioFormat, ScenarioFormatKind};
use crate::core::scenarios::ufun::{OutcomeRange, RangeBound};
use crate::core::scenarios::{
    file_stem, scenario_name, Issue, IssueValue, Numeric, OutcomeSpace, Scenario, ScenarioError,
    UfunSource, UtilityFunction, UtilityKind, ValueFunction,
};

const EXTENSIONS: [&str; 2] = ["yml", "yaml"];

pub struct YamlFormat;

impl ScenarioFormat for YamlFormat {
    fn kind(&self) -> ScenarioFormatKind {
        ScenarioFormatKind::Yaml
    }

    fn find_files(&self, dir: &Path) -> Result<Option<ScenarioFiles>, ScenarioError> {
        let mut domain = None;
        let mut utilities = Vec::new();
        for path in candidate_files(dir, &EXTENSIONS)? {
            let doc = match parse_file(&path) {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::debug!("skipping {}: {e}", path.display());
                    continue;
                }
            };
            if doc.get("issues").is_some() {
                if domain.is_none() {
                    domain = Some(path);
                }
            } else if doc.get("type").is_some() {
                utilities.push(path);
            }
        }
        Ok(domain.map(|domain| ScenarioFiles { domain, utilities }))
    }

    fn load_domain(&self, file: &Path) -> Result<OutcomeSpace, ScenarioError> {
        parse_outcome_space(&parse_file(file)?, file)
    }

    fn load_utility(
        &self,
        file: &Path,
        space: &OutcomeSpace,
    ) -> Result<UtilityFunction, ScenarioError> {
        parse_ufun(&parse_file(file)?, space, &file_stem(file), file)
    }

    fn write_reserved_value(
        &self,
        source: &UfunSource,
        target: ReservedTarget,
        value: f64,
    ) -> Result<(), ScenarioError> {
        let file = &source.file;
        let mut doc = parse_file(file)?;

        let mut node = &mut doc;
        if let Some(position) = source.position {
            node = node
                .get_mut("ufuns")
                .and_then(|ufuns| ufuns.get_mut(position))
                .ok_or_else(|| ScenarioError::invalid(file, format!("no ufuns[{position}]")))?;
        }
        if target == ReservedTarget::Inner {
            node = node
                .get_mut("ufun")
                .ok_or_else(|| ScenarioError::invalid(file, "no inner ufun"))?;
        }
        let mapping = node
            .as_mapping_mut()
            .ok_or_else(|| ScenarioError::invalid(file, "utility function is not a mapping"))?;
        mapping.insert(
            Value::String("reserved_value".to_string()),
            Value::Number(value.into()),
        );

        let text = serde_yaml::to_string(&doc).map_err(|e| ScenarioError::Yaml {
            path: file.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(file, text).map_err(|e| ScenarioError::io(file, e))
    }
}

/// Load a scenario stored as one YAML file.
pub fn load_single_file(path: &Path) -> Result<Scenario, ScenarioError> {
    let doc = parse_file(path)?;
    let space_node = match doc.get("outcome_space") {
        Some(node) => node,
        None if doc.get("issues").is_some() => &doc,
        None => return Err(ScenarioError::NotAScenario(path.to_path_buf())),
    };
    let outcome_space = parse_outcome_space(space_node, path)?;

    let mut ufuns = Vec::new();
    let mut sources = Vec::new();
    if let Some(list) = doc.get("ufuns").and_then(Value::as_sequence) {
        for (position, node) in list.iter().enumerate() {
            let fallback = format!("ufun{position}");
            ufuns.push(parse_ufun(node, &outcome_space, &fallback, path)?);
            sources.push(UfunSource {
                file: path.to_path_buf(),
                position: Some(position),
            });
        }
    }

    let name = doc
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| scenario_name(path));

    Ok(Scenario {
        name,
        path: path.to_path_buf(),
        format: ScenarioFormatKind::Yaml,
        outcome_space,
        ufuns,
        sources,
    })
}

fn parse_file(path: &Path) -> Result<Value, ScenarioError> {
    serde_yaml::from_str(&read_text(path)?).map_err(|e| ScenarioError::Yaml {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Outcome space
// ---------------------------------------------------------------------------

fn parse_outcome_space(node: &Value, path: &Path) -> Result<OutcomeSpace, ScenarioError> {
    let issues = match node.get("issues") {
        Some(Value::Sequence(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| parse_issue(item, &format!("i{i}"), path))
            .collect::<Result<Vec<_>, _>>()?,
        Some(Value::Mapping(items)) => items
            .iter()
            .map(|(name, spec)| {
                let name = scalar_text(name).unwrap_or_default();
                match spec {
                    Value::Mapping(_) => parse_issue(spec, &name, path),
                    other => issue_from_values(&name, Some(other), None, None, "", path),
                }
            })
            .collect::<Result<Vec<_>, _>>()?,
        _ => return Err(ScenarioError::invalid(path, "missing issues")),
    };
    Ok(OutcomeSpace::new(issues))
}

fn parse_issue(item: &Value, fallback_name: &str, path: &Path) -> Result<Issue, ScenarioError> {
    let name = item
        .get("name")
        .and_then(scalar_text)
        .unwrap_or_else(|| fallback_name.to_string());
    let tag = item
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_ascii_lowercase();
    let min = item.get("min_value").or_else(|| item.get("min"));
    let max = item.get("max_value").or_else(|| item.get("max"));
    issue_from_values(&name, item.get("values"), min, max, &tag, path)
}

fn issue_from_values(
    name: &str,
    values: Option<&Value>,
    min: Option<&Value>,
    max: Option<&Value>,
    tag: &str,
    path: &Path,
) -> Result<Issue, ScenarioError> {
    let bounds = match (values, min, max) {
        (Some(Value::Sequence(pair)), _, _) if pair.len() == 2 && !tag.contains("categorical") => {
            Some((&pair[0], &pair[1]))
        }
        (_, Some(lo), Some(hi)) => Some((lo, hi)),
        _ => None,
    };

    if tag.contains("continuous") {
        let (lo, hi) = bounds
            .and_then(|(lo, hi)| Some((lo.as_f64()?, hi.as_f64()?)))
            .ok_or_else(|| ScenarioError::invalid(path, format!("issue {name} has no range")))?;
        return Ok(Issue::continuous(name, lo, hi));
    }
    if tag.contains("contiguous") || tag.contains("integer") || tag.contains("range") {
        if let Some((lo, hi)) = bounds.and_then(|(lo, hi)| Some((lo.as_i64()?, hi.as_i64()?))) {
            return Ok(Issue::integer(name, lo, hi));
        }
    }

    match values {
        Some(Value::Sequence(items)) => {
            let values = items
                .iter()
                .map(issue_value)
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| {
                    ScenarioError::invalid(path, format!("issue {name} has a non-scalar value"))
                })?;
            Ok(Issue::discrete(name, values))
        }
        Some(Value::Number(n)) if n.as_i64().is_some() => {
            let count = n.as_i64().unwrap_or(0);
            Ok(Issue::integer(name, 0, count - 1))
        }
        _ => match bounds {
            Some((lo, hi)) => match (lo.as_i64(), hi.as_i64()) {
                (Some(lo), Some(hi)) => Ok(Issue::integer(name, lo, hi)),
                _ => match (lo.as_f64(), hi.as_f64()) {
                    (Some(lo), Some(hi)) => Ok(Issue::continuous(name, lo, hi)),
                    _ => Err(ScenarioError::invalid(path, format!("issue {name} has a bad range"))),
                },
            },
            None => Err(ScenarioError::invalid(
                path,
                format!("issue {name} has no values"),
            )),
        },
    }
}

fn issue_value(value: &Value) -> Option<IssueValue> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(IssueValue::Int(i)),
            None => n.as_f64().map(IssueValue::Float),
        },
        Value::String(s) => Some(IssueValue::Text(s.clone())),
        Value::Bool(b) => Some(IssueValue::Text(b.to_string())),
        _ => None,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    issue_value(value).map(|v| v.to_string())
}

// ---------------------------------------------------------------------------
// Utility functions
// ---------------------------------------------------------------------------

fn short_type(node: &Value) -> String {
    node.get("type")
        .and_then(Value::as_str)
        .and_then(|tag| tag.rsplit('.').next())
        .unwrap_or_default()
        .to_string()
}

fn parse_ufun(
    node: &Value,
    space: &OutcomeSpace,
    fallback_name: &str,
    path: &Path,
) -> Result<UtilityFunction, ScenarioError> {
    let type_name = short_type(node);
    let name = node
        .get("name")
        .and_then(scalar_text)
        .unwrap_or_else(|| fallback_name.to_string());
    let reserved_value = node.get("reserved_value").and_then(numeric);
    let bias = node.get("bias").and_then(Value::as_f64).unwrap_or(0.0);

    let kind = match type_name.as_str() {
        t if t.contains("Discounted") || node.get("ufun").is_some() => {
            let inner_node = node
                .get("ufun")
                .ok_or_else(|| ScenarioError::invalid(path, format!("{name} has no inner ufun")))?;
            let inner = parse_ufun(inner_node, space, &name, path)?;
            UtilityKind::Discounted {
                inner: Box::new(inner),
                discount: node.get("discount").and_then(Value::as_f64).unwrap_or(1.0),
                exponent: node
                    .get("power")
                    .or_else(|| node.get("exponent"))
                    .and_then(Value::as_f64)
                    .unwrap_or(1.0),
            }
        }
        "LinearAdditiveUtilityFunction" | "LinearAdditiveUFun" | "LinearAdditive" => {
            let values = per_issue(node.get("values"), space, path, value_function)?;
            UtilityKind::LinearAdditive {
                weights: weights(node.get("weights"), space, path)?
                    .unwrap_or_else(|| vec![1.0; values.len()]),
                values,
                bias,
            }
        }
        "LinearUtilityFunction" | "LinearUtilityAggregationFunction" | "LinearUFun" => {
            UtilityKind::Linear {
                weights: weights(node.get("weights"), space, path)?
                    .unwrap_or_else(|| vec![1.0; space.issues.len()]),
                bias,
            }
        }
        "HyperRectangleUtilityFunction" | "HyperVolumeUtilityFunction" => {
            UtilityKind::HyperRectangle {
                outcome_ranges: outcome_ranges(node.get("outcome_ranges"), space, path)?,
                mappings: node
                    .get("mappings")
                    .and_then(Value::as_sequence)
                    .map(|items| items.iter().filter_map(Value::as_f64).collect())
                    .unwrap_or_default(),
                bias,
            }
        }
        "MappingUtilityFunction" | "ValueMappingUtilityFunction" => UtilityKind::ValueMapping {
            values: per_issue(
                node.get("values").or_else(|| node.get("mapping")),
                space,
                path,
                value_function,
            )?,
        },
        _ => UtilityKind::Other,
    };

    Ok(UtilityFunction {
        name,
        type_name,
        reserved_value,
        kind,
    })
}

fn numeric(value: &Value) -> Option<Numeric> {
    match value {
        Value::Null => None,
        Value::Number(n) => n.as_f64().map(Numeric::Value),
        Value::String(s) => Some(Numeric::Raw(s.clone())),
        other => Some(Numeric::Raw(
            serde_yaml::to_string(other)
                .unwrap_or_default()
                .trim()
                .to_string(),
        )),
    }
}

fn weights(
    node: Option<&Value>,
    space: &OutcomeSpace,
    path: &Path,
) -> Result<Option<Vec<f64>>, ScenarioError> {
    match node {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Mapping(by_issue)) => {
            let mut weights = vec![0.0; space.issues.len()];
            for (key, weight) in by_issue {
                let index = issue_index(key, space, path)?;
                weights[index] = weight.as_f64().unwrap_or(0.0);
            }
            Ok(Some(weights))
        }
        Some(Value::Sequence(items)) => Ok(Some(
            items.iter().map(|w| w.as_f64().unwrap_or(0.0)).collect(),
        )),
        Some(_) => Err(ScenarioError::invalid(path, "weights must be a list or mapping")),
    }
}

/// Items listed in issue order, or keyed by issue name.
fn per_issue<T>(
    node: Option<&Value>,
    space: &OutcomeSpace,
    path: &Path,
    parse: fn(&Value, &Path) -> Result<T, ScenarioError>,
) -> Result<Vec<T>, ScenarioError>
where
    T: Clone + Default,
{
    match node {
        Some(Value::Sequence(items)) => items.iter().map(|item| parse(item, path)).collect(),
        Some(Value::Mapping(by_issue)) => {
            let mut parsed = vec![T::default(); space.issues.len()];
            for (key, item) in by_issue {
                let index = issue_index(key, space, path)?;
                parsed[index] = parse(item, path)?;
            }
            Ok(parsed)
        }
        _ => Err(ScenarioError::invalid(path, "missing per-issue values")),
    }
}

fn issue_index(key: &Value, space: &OutcomeSpace, path: &Path) -> Result<usize, ScenarioError> {
    let name = scalar_text(key).unwrap_or_default();
    space
        .issue_index(&name)
        .ok_or_else(|| ScenarioError::invalid(path, format!("unknown issue {name}")))
}

fn value_function(node: &Value, path: &Path) -> Result<ValueFunction, ScenarioError> {
    match node {
        Value::Number(n) => Ok(ValueFunction::Affine {
            slope: 0.0,
            bias: n.as_f64().unwrap_or(0.0),
        }),
        Value::Mapping(map) => {
            let tag = short_type(node).to_ascii_lowercase();
            if tag.contains("identity") {
                Ok(ValueFunction::Identity)
            } else if tag.contains("affine") || tag.contains("linear") {
                Ok(ValueFunction::Affine {
                    slope: node.get("slope").and_then(Value::as_f64).unwrap_or(1.0),
                    bias: node.get("bias").and_then(Value::as_f64).unwrap_or(0.0),
                })
            } else if tag.contains("const") {
                Ok(ValueFunction::Affine {
                    slope: 0.0,
                    bias: node.get("value").and_then(Value::as_f64).unwrap_or(0.0),
                })
            } else if let Some(Value::Mapping(table)) = node.get("mapping") {
                Ok(ValueFunction::Table(table_of(table)))
            } else if tag.is_empty() {
                Ok(ValueFunction::Table(table_of(map)))
            } else {
                Err(ScenarioError::invalid(
                    path,
                    format!("unsupported value function {tag}"),
                ))
            }
        }
        _ => Err(ScenarioError::invalid(path, "value function must be a mapping")),
    }
}

fn table_of(map: &Mapping) -> BTreeMap<String, f64> {
    map.iter()
        .filter_map(|(key, value)| Some((scalar_text(key)?, value.as_f64()?)))
        .collect()
}

fn outcome_ranges(
    node: Option<&Value>,
    space: &OutcomeSpace,
    path: &Path,
) -> Result<Vec<OutcomeRange>, ScenarioError> {
    let Some(items) = node.and_then(Value::as_sequence) else {
        return Ok(Vec::new());
    };
    items
        .iter()
        .map(|item| {
            let map = item
                .as_mapping()
                .ok_or_else(|| ScenarioError::invalid(path, "outcome range must be a mapping"))?;
            let mut constraints = Vec::with_capacity(map.len());
            for (key, bound) in map {
                let index = issue_index(key, space, path)?;
                constraints.push((index, range_bound(bound, path)?));
            }
            Ok(OutcomeRange { constraints })
        })
        .collect()
}

fn range_bound(node: &Value, path: &Path) -> Result<RangeBound, ScenarioError> {
    let interval = match node {
        Value::Sequence(pair) if pair.len() == 2 => pair[0].as_f64().zip(pair[1].as_f64()),
        Value::Mapping(_) => node
            .get("min")
            .and_then(Value::as_f64)
            .zip(node.get("max").and_then(Value::as_f64)),
        _ => None,
    };
    if let Some((min, max)) = interval {
        return Ok(RangeBound::Interval { min, max });
    }
    issue_value(node)
        .map(RangeBound::Exact)
        .ok_or_else(|| ScenarioError::invalid(path, "unsupported outcome range bound"))
}
