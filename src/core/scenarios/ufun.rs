use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{IssueValue, Outcome};

/// A reserved value as found on disk: a number, or text that may or may not
/// parse as one (`"inf"`, `"none"`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
    Value(f64),
    Raw(String),
}

impl Numeric {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(*v),
            Self::Raw(text) => parse_float(text),
        }
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self, self.as_f64()) {
            (_, Some(v)) => write!(f, "{v:.3}"),
            (Self::Raw(text), None) => f.write_str(text),
            (Self::Value(v), None) => write!(f, "{v}"),
        }
    }
}

/// Parses plain floats plus the YAML spellings of infinity and NaN.
pub(crate) fn parse_float(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        ".inf" | "+.inf" | "inf" | "+inf" | "infinity" => Some(f64::INFINITY),
        "-.inf" | "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
        ".nan" | "nan" => Some(f64::NAN),
        _ => trimmed.parse().ok(),
    }
}

/// Per-issue value function.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueFunction {
    /// Lookup by the value's display form.
    Table(BTreeMap<String, f64>),
    Affine { slope: f64, bias: f64 },
    Identity,
}

impl ValueFunction {
    pub fn eval(&self, value: &IssueValue) -> Option<f64> {
        match self {
            Self::Table(mapping) => mapping.get(&value.to_string()).copied(),
            Self::Affine { slope, bias } => value.as_f64().map(|x| slope * x + bias),
            Self::Identity => value.as_f64(),
        }
    }
}

/// The zero function, used for issues a utility function leaves out.
impl Default for ValueFunction {
    fn default() -> Self {
        Self::Affine {
            slope: 0.0,
            bias: 0.0,
        }
    }
}

/// Satisfied when every constrained issue lies within its bound.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeRange {
    pub constraints: Vec<(usize, RangeBound)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RangeBound {
    Exact(IssueValue),
    Interval { min: f64, max: f64 },
}

impl OutcomeRange {
    pub fn contains(&self, outcome: &[IssueValue]) -> bool {
        self.constraints.iter().all(|(index, bound)| {
            let Some(value) = outcome.get(*index) else {
                return false;
            };
            match bound {
                RangeBound::Exact(expected) => value == expected,
                RangeBound::Interval { min, max } => value
                    .as_f64()
                    .map(|x| (*min..=*max).contains(&x))
                    .unwrap_or(false),
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UtilityKind {
    LinearAdditive {
        weights: Vec<f64>,
        values: Vec<ValueFunction>,
        bias: f64,
    },
    Linear {
        weights: Vec<f64>,
        bias: f64,
    },
    Discounted {
        inner: Box<UtilityFunction>,
        discount: f64,
        exponent: f64,
    },
    HyperRectangle {
        outcome_ranges: Vec<OutcomeRange>,
        mappings: Vec<f64>,
        bias: f64,
    },
    ValueMapping {
        values: Vec<ValueFunction>,
    },
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UtilityFunction {
    pub name: String,
    /// Short class name as written in the scenario file.
    pub type_name: String,
    pub reserved_value: Option<Numeric>,
    pub kind: UtilityKind,
}

impl UtilityFunction {
    /// Utility of `outcome`. Discounted functions are evaluated at time zero,
    /// where the discount has no effect. `None` when the function cannot be
    /// evaluated on this outcome.
    pub fn eval(&self, outcome: &Outcome) -> Option<f64> {
        match &self.kind {
            UtilityKind::LinearAdditive {
                weights,
                values,
                bias,
            } => {
                let mut total = *bias;
                for (index, value_fn) in values.iter().enumerate() {
                    let weight = weights.get(index).copied().unwrap_or(1.0);
                    total += weight * value_fn.eval(outcome.get(index)?)?;
                }
                Some(total)
            }
            UtilityKind::Linear { weights, bias } => {
                let mut total = *bias;
                for (weight, value) in weights.iter().zip(outcome) {
                    total += weight * value.as_f64()?;
                }
                Some(total)
            }
            UtilityKind::Discounted { inner, .. } => inner.eval(outcome),
            UtilityKind::HyperRectangle {
                outcome_ranges,
                mappings,
                bias,
            } => Some(
                outcome_ranges
                    .iter()
                    .zip(mappings)
                    .filter(|(range, _)| range.contains(outcome))
                    .map(|(_, value)| value)
                    .sum::<f64>()
                    + bias,
            ),
            UtilityKind::ValueMapping { values } => {
                let mut total = 0.0;
                for (value_fn, value) in values.iter().zip(outcome) {
                    total += value_fn.eval(value)?;
                }
                Some(total)
            }
            UtilityKind::Other => None,
        }
    }

    pub fn reserved(&self) -> Option<f64> {
        self.reserved_value.as_ref().and_then(Numeric::as_f64)
    }

    /// The wrapped function of a discount wrapper.
    pub fn inner(&self) -> Option<&UtilityFunction> {
        match &self.kind {
            UtilityKind::Discounted { inner, .. } => Some(inner),
            _ => None,
        }
    }

    pub fn inner_mut(&mut self) -> Option<&mut UtilityFunction> {
        match &mut self.kind {
            UtilityKind::Discounted { inner, .. } => Some(inner),
            _ => None,
        }
    }

    /// Minimum over `outcomes`, or `None` when empty or not evaluable.
    pub fn min_over(&self, outcomes: &[Outcome]) -> Option<f64> {
        let mut min: Option<f64> = None;
        for outcome in outcomes {
            let value = self.eval(outcome)?;
            min = Some(min.map_or(value, |m| m.min(value)));
        }
        min
    }

    /// Summary fragments for the function's variant, without the reserved
    /// value.
    pub fn kind_fragments(&self) -> Vec<String> {
        match &self.kind {
            UtilityKind::LinearAdditive { weights, bias, .. }
            | UtilityKind::Linear { weights, bias } => vec![
                format!("Weights: {}", format_list(weights)),
                format!("Bias: {bias:.3}"),
            ],
            UtilityKind::Discounted {
                inner,
                discount,
                exponent,
            } => {
                let mut fragments = vec![
                    format!("Base: ({})", inner.summary()),
                    format!("Discount: {discount:.3}"),
                ];
                if *exponent != 1.0 {
                    fragments.push(format!("Exponent: {exponent:.3}"));
                }
                fragments
            }
            UtilityKind::HyperRectangle { outcome_ranges, .. } => {
                vec![format!("Outcome ranges: {}", outcome_ranges.len())]
            }
            UtilityKind::ValueMapping { values } => {
                vec![format!("Value functions: {}", values.len())]
            }
            UtilityKind::Other => Vec::new(),
        }
    }

    /// Pipe-joined summary of reserved value and variant fragments; falls
    /// back to the `Display` form.
    pub fn summary(&self) -> String {
        let mut fragments = Vec::new();
        if let Some(reserved) = &self.reserved_value {
            fragments.push(format!("Reserved: {reserved}"));
        }
        fragments.extend(self.kind_fragments());
        if fragments.is_empty() {
            self.to_string()
        } else {
            fragments.join(" | ")
        }
    }
}

impl fmt::Display for UtilityFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(name={})", self.type_name, self.name)
    }
}

fn format_list(values: &[f64]) -> String {
    let items: Vec<String> = values.iter().map(|v| format!("{v:.3}")).collect();
    format!("[{}]", items.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table(pairs: &[(&str, f64)]) -> ValueFunction {
        ValueFunction::Table(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), *v))
                .collect(),
        )
    }

    fn linear_additive(reserved: Option<Numeric>) -> UtilityFunction {
        UtilityFunction {
            name: "buyer".into(),
            type_name: "LinearAdditiveUtilityFunction".into(),
            reserved_value: reserved,
            kind: UtilityKind::LinearAdditive {
                weights: vec![0.6, 0.4],
                values: vec![
                    table(&[("red", 1.0), ("blue", 0.0)]),
                    ValueFunction::Affine {
                        slope: 0.5,
                        bias: -0.5,
                    },
                ],
                bias: 0.0,
            },
        }
    }

    fn discounted(inner: UtilityFunction, discount: f64, exponent: f64) -> UtilityFunction {
        UtilityFunction {
            name: inner.name.clone(),
            type_name: "ExpDiscountedUFun".into(),
            reserved_value: None,
            kind: UtilityKind::Discounted {
                inner: Box::new(inner),
                discount,
                exponent,
            },
        }
    }

    #[test]
    fn test_linear_additive_eval() {
        let ufun = linear_additive(None);
        let outcome = vec![IssueValue::Text("red".into()), IssueValue::Int(3)];
        let value = ufun.eval(&outcome).unwrap();
        assert!((value - (0.6 + 0.4)).abs() < 1e-9);

        let unknown = vec![IssueValue::Text("green".into()), IssueValue::Int(3)];
        assert_eq!(ufun.eval(&unknown), None);
    }

    #[test]
    fn test_hyper_rectangle_sums_matching_ranges() {
        let ufun = UtilityFunction {
            name: "u".into(),
            type_name: "HyperRectangleUtilityFunction".into(),
            reserved_value: None,
            kind: UtilityKind::HyperRectangle {
                outcome_ranges: vec![
                    OutcomeRange {
                        constraints: vec![(0, RangeBound::Interval { min: 0.0, max: 5.0 })],
                    },
                    OutcomeRange {
                        constraints: vec![(1, RangeBound::Exact(IssueValue::Text("a".into())))],
                    },
                ],
                mappings: vec![2.0, 3.0],
                bias: 1.0,
            },
        };
        let both = vec![IssueValue::Int(4), IssueValue::Text("a".into())];
        let first = vec![IssueValue::Int(4), IssueValue::Text("b".into())];
        let none = vec![IssueValue::Int(9), IssueValue::Text("b".into())];
        assert_eq!(ufun.eval(&both), Some(6.0));
        assert_eq!(ufun.eval(&first), Some(3.0));
        assert_eq!(ufun.eval(&none), Some(1.0));
    }

    #[test]
    fn test_summary_of_linear_additive() {
        let ufun = linear_additive(Some(Numeric::Value(0.25)));
        assert_eq!(
            ufun.summary(),
            "Reserved: 0.250 | Weights: [0.600, 0.400] | Bias: 0.000"
        );
    }

    #[test]
    fn test_summary_prints_raw_reserved_text() {
        let ufun = linear_additive(Some(Numeric::Raw("unknown".into())));
        assert!(ufun.summary().starts_with("Reserved: unknown | "));

        let parsed = linear_additive(Some(Numeric::Raw("0.5".into())));
        assert!(parsed.summary().starts_with("Reserved: 0.500 | "));
    }

    #[test]
    fn test_summary_of_discounted_skips_unit_exponent() {
        let ufun = discounted(linear_additive(None), 0.9, 1.0);
        assert_eq!(
            ufun.summary(),
            "Base: (Weights: [0.600, 0.400] | Bias: 0.000) | Discount: 0.900"
        );

        let with_exponent = discounted(linear_additive(None), 0.9, 2.0);
        assert!(with_exponent.summary().ends_with(" | Exponent: 2.000"));
    }

    #[test]
    fn test_summary_recurses_through_nested_discounts() {
        let nested = discounted(discounted(linear_additive(None), 0.5, 1.0), 0.8, 1.0);
        assert_eq!(
            nested.summary(),
            "Base: (Base: (Weights: [0.600, 0.400] | Bias: 0.000) | Discount: 0.500) | Discount: 0.800"
        );
    }

    #[test]
    fn test_summary_counts_for_mapping_and_rectangles() {
        let mapping = UtilityFunction {
            name: "m".into(),
            type_name: "MappingUtilityFunction".into(),
            reserved_value: None,
            kind: UtilityKind::ValueMapping {
                values: vec![ValueFunction::Identity, ValueFunction::Identity],
            },
        };
        assert_eq!(mapping.summary(), "Value functions: 2");

        let rectangles = UtilityFunction {
            name: "r".into(),
            type_name: "HyperRectangleUtilityFunction".into(),
            reserved_value: None,
            kind: UtilityKind::HyperRectangle {
                outcome_ranges: vec![OutcomeRange {
                    constraints: Vec::new(),
                }],
                mappings: vec![1.0],
                bias: 0.0,
            },
        };
        assert_eq!(rectangles.summary(), "Outcome ranges: 1");
    }

    #[test]
    fn test_summary_falls_back_to_display() {
        let other = UtilityFunction {
            name: "mystery".into(),
            type_name: "RankOnlyUtilityFunction".into(),
            reserved_value: None,
            kind: UtilityKind::Other,
        };
        assert_eq!(other.summary(), "RankOnlyUtilityFunction(name=mystery)");
    }

    #[test]
    fn test_parse_float_handles_yaml_specials() {
        assert_eq!(parse_float(".inf"), Some(f64::INFINITY));
        assert_eq!(parse_float("-inf"), Some(f64::NEG_INFINITY));
        assert!(parse_float(".nan").unwrap().is_nan());
        assert_eq!(parse_float(" 0.3 "), Some(0.3));
        assert_eq!(parse_float("none"), None);
    }
}
