//! Negotiation scenarios: outcome spaces, utility functions and the on-disk
//! formats they are read from.
//!
//! A scenario is a directory (or a single YAML file) holding one domain
//! definition and one utility function per negotiating party. Three formats
//! are understood, tried in a fixed order: negmas YAML, Genius XML and
//! GeniusWeb JSON. See [`formats`] for discovery and [`introspect`] for the
//! read-only views served to the front end.

pub mod cache;
pub mod formats;
pub mod info;
pub mod introspect;
pub mod reserved;
pub mod stats;
pub mod ufun;

use std::fmt;
use std::path::{Path, PathBuf};

use rand::Rng;
use serde::{Deserialize, Serialize};

pub use formats::{ScenarioFiles, ScenarioFormatKind};
pub use ufun::{Numeric, UtilityFunction, UtilityKind, ValueFunction};

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("not a scenario: {0}")]
    NotAScenario(PathBuf),
    #[error("invalid yaml in {path}: {message}")]
    Yaml { path: PathBuf, message: String },
    #[error("invalid xml in {path}: {message}")]
    Xml { path: PathBuf, message: String },
    #[error("invalid json in {path}: {message}")]
    Json { path: PathBuf, message: String },
    #[error("invalid scenario definition in {path}: {message}")]
    Invalid { path: PathBuf, message: String },
    #[error("utility function {0} cannot be evaluated on this outcome space")]
    Evaluation(String),
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl ScenarioError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn invalid(path: &Path, message: impl Into<String>) -> Self {
        Self::Invalid {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome space
// ---------------------------------------------------------------------------

/// A single issue value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IssueValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl IssueValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(v) => v.trim().parse().ok(),
        }
    }
}

impl fmt::Display for IssueValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

/// One value per issue, in issue order.
pub type Outcome = Vec<IssueValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueValues {
    Discrete { values: Vec<IssueValue> },
    Integer { min: i64, max: i64 },
    Continuous { min: f64, max: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Finite(u64),
    Infinite,
}

impl Cardinality {
    pub fn finite(self) -> Option<u64> {
        match self {
            Self::Finite(n) => Some(n),
            Self::Infinite => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub name: String,
    #[serde(flatten)]
    pub values: IssueValues,
}

impl Issue {
    pub fn discrete(name: impl Into<String>, values: Vec<IssueValue>) -> Self {
        Self {
            name: name.into(),
            values: IssueValues::Discrete { values },
        }
    }

    pub fn integer(name: impl Into<String>, min: i64, max: i64) -> Self {
        Self {
            name: name.into(),
            values: IssueValues::Integer {
                min: min.min(max),
                max: max.max(min),
            },
        }
    }

    pub fn continuous(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            name: name.into(),
            values: IssueValues::Continuous {
                min: min.min(max),
                max: max.max(min),
            },
        }
    }

    pub fn cardinality(&self) -> Cardinality {
        match &self.values {
            IssueValues::Discrete { values } => Cardinality::Finite(values.len() as u64),
            IssueValues::Integer { min, max } => {
                Cardinality::Finite(max.abs_diff(*min).saturating_add(1))
            }
            IssueValues::Continuous { .. } => Cardinality::Infinite,
        }
    }

    fn value_at(&self, index: u64) -> Option<IssueValue> {
        match &self.values {
            IssueValues::Discrete { values } => values.get(index as usize).cloned(),
            IssueValues::Integer { min, .. } => {
                Some(IssueValue::Int(min.saturating_add(index as i64)))
            }
            IssueValues::Continuous { .. } => None,
        }
    }

    fn sample(&self, rng: &mut impl Rng) -> Option<IssueValue> {
        match &self.values {
            IssueValues::Discrete { values } if values.is_empty() => None,
            IssueValues::Discrete { values } => {
                Some(values[rng.gen_range(0..values.len())].clone())
            }
            IssueValues::Integer { min, max } => Some(IssueValue::Int(rng.gen_range(*min..=*max))),
            IssueValues::Continuous { min, max } => {
                Some(IssueValue::Float(rng.gen_range(*min..=*max)))
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeSpace {
    pub issues: Vec<Issue>,
}

impl OutcomeSpace {
    pub fn new(issues: Vec<Issue>) -> Self {
        Self { issues }
    }

    /// Product of issue cardinalities; overflowing `u64` counts as infinite.
    pub fn cardinality(&self) -> Cardinality {
        let mut total: u64 = 1;
        for issue in &self.issues {
            match issue.cardinality() {
                Cardinality::Infinite => return Cardinality::Infinite,
                Cardinality::Finite(n) => match total.checked_mul(n) {
                    Some(product) => total = product,
                    None => return Cardinality::Infinite,
                },
            }
        }
        Cardinality::Finite(total)
    }

    pub fn issue_index(&self, name: &str) -> Option<usize> {
        self.issues.iter().position(|issue| issue.name == name)
    }

    /// All outcomes when there are at most `limit`, otherwise `limit`
    /// uniformly sampled ones.
    pub fn outcomes(&self, limit: usize, rng: &mut impl Rng) -> Vec<Outcome> {
        match self.cardinality() {
            Cardinality::Finite(n) if n <= limit as u64 => self.enumerate(n),
            _ => (0..limit)
                .filter_map(|_| {
                    self.issues
                        .iter()
                        .map(|issue| issue.sample(rng))
                        .collect::<Option<Outcome>>()
                })
                .collect(),
        }
    }

    fn enumerate(&self, total: u64) -> Vec<Outcome> {
        let radices: Vec<u64> = self
            .issues
            .iter()
            .map(|issue| issue.cardinality().finite().unwrap_or(0))
            .collect();
        let mut outcomes = Vec::with_capacity(total as usize);
        for flat in 0..total {
            let mut rest = flat;
            let mut outcome = Vec::with_capacity(self.issues.len());
            for (issue, radix) in self.issues.iter().zip(&radices).rev() {
                let index = rest % radix;
                rest /= radix;
                match issue.value_at(index) {
                    Some(value) => outcome.push(value),
                    None => break,
                }
            }
            if outcome.len() == self.issues.len() {
                outcome.reverse();
                outcomes.push(outcome);
            }
        }
        outcomes
    }
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

/// Where a utility function was read from; `position` indexes the `ufuns`
/// list of a single-file scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct UfunSource {
    pub file: PathBuf,
    pub position: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub path: PathBuf,
    pub format: ScenarioFormatKind,
    pub outcome_space: OutcomeSpace,
    pub ufuns: Vec<UtilityFunction>,
    /// Parallel to `ufuns`.
    pub sources: Vec<UfunSource>,
}

/// Load a scenario directory, or a single-file YAML scenario.
pub fn load_scenario(path: &Path) -> Result<Scenario, ScenarioError> {
    if path.is_file() {
        return formats::yaml::load_single_file(path);
    }
    if !path.is_dir() {
        return Err(ScenarioError::NotAScenario(path.to_path_buf()));
    }

    let (format, files) = formats::discover(path)?
        .ok_or_else(|| ScenarioError::NotAScenario(path.to_path_buf()))?;

    let outcome_space = format.load_domain(&files.domain)?;
    let mut ufuns = Vec::with_capacity(files.utilities.len());
    let mut sources = Vec::with_capacity(files.utilities.len());
    for file in &files.utilities {
        ufuns.push(format.load_utility(file, &outcome_space)?);
        sources.push(UfunSource {
            file: file.clone(),
            position: None,
        });
    }

    tracing::debug!(
        "loaded {} scenario {} with {} issues and {} utility functions",
        format.kind(),
        path.display(),
        outcome_space.issues.len(),
        ufuns.len()
    );

    Ok(Scenario {
        name: scenario_name(path),
        path: path.to_path_buf(),
        format: format.kind(),
        outcome_space,
        ufuns,
        sources,
    })
}

pub(crate) fn scenario_name(path: &Path) -> String {
    path.file_stem()
        .or_else(|| path.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Small scenarios written to temp directories, one per format.

    use std::path::Path;

    pub const LAPTOP_DOMAIN_YAML: &str = r#"name: Laptop
issues:
  - name: brand
    type: negmas.outcomes.categorical_issue.CategoricalIssue
    values: [Dell, Macintosh, HP]
  - name: screen
    type: negmas.outcomes.contiguous_issue.ContiguousIssue
    values: [13, 15]
"#;

    pub const LAPTOP_BUYER_YAML: &str = r#"type: negmas.preferences.crisp.linear.LinearAdditiveUtilityFunction
name: buyer
reserved_value: 0.2
weights: [0.6, 0.4]
values:
  - type: negmas.preferences.value_fun.TableFun
    mapping: {Dell: 0.2, Macintosh: 1.0, HP: 0.5}
  - type: negmas.preferences.value_fun.AffineFun
    slope: 0.25
    bias: -3.25
bias: 0.0
"#;

    pub const LAPTOP_SELLER_YAML: &str = r#"type: negmas.preferences.discounted.ExpDiscountedUFun
name: seller
discount: 0.9
reserved_value: .inf
ufun:
  type: negmas.preferences.crisp.linear.LinearAdditiveUtilityFunction
  name: seller
  reserved_value: 0.1
  weights: [0.5, 0.5]
  values:
    - mapping: {Dell: 1.0, Macintosh: 0.0, HP: 0.5}
    - type: negmas.preferences.value_fun.AffineFun
      slope: -0.5
      bias: 7.5
"#;

    pub fn write_yaml_laptop(dir: &Path) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join("Laptop.yml"), LAPTOP_DOMAIN_YAML).unwrap();
        std::fs::write(dir.join("Laptop-A-prof1.yml"), LAPTOP_BUYER_YAML).unwrap();
        std::fs::write(dir.join("Laptop-B-prof2.yml"), LAPTOP_SELLER_YAML).unwrap();
        std::fs::write(dir.join("_info.yaml"), "description: laptops\n").unwrap();
    }

    pub const ITEX_DOMAIN_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<negotiation_template>
  <utility_space number_of_issues="2">
    <objective index="0" description="" name="root" type="objective" etype="objective">
      <issue name="Price" index="1" etype="discrete" type="discrete" vtype="discrete">
        <item index="1" value="low"/>
        <item index="2" value="high"/>
      </issue>
      <issue name="Delivery" index="2" etype="discrete" type="discrete" vtype="discrete">
        <item index="1" value="1 week"/>
        <item index="2" value="1 month"/>
        <item index="3" value="3 months"/>
      </issue>
    </objective>
  </utility_space>
</negotiation_template>
"#;

    pub const ITEX_BUYER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<utility_space type="linear">
  <objective index="0" name="root" type="objective" etype="objective">
    <issue name="Price" index="1" etype="discrete" type="discrete" vtype="discrete">
      <item index="1" value="low" evaluation="4"/>
      <item index="2" value="high" evaluation="2"/>
    </issue>
    <weight index="1" value="0.75"/>
    <issue name="Delivery" index="2" etype="discrete" type="discrete" vtype="discrete">
      <item index="1" value="1 week" evaluation="10"/>
      <item index="2" value="1 month" evaluation="5"/>
      <item index="3" value="3 months" evaluation="0"/>
    </issue>
    <weight index="2" value="0.25"/>
  </objective>
  <reservation value="0.35"/>
  <discount_factor value="0.8"/>
</utility_space>
"#;

    pub const ITEX_SELLER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<utility_space type="linear">
  <objective index="0" name="root" type="objective" etype="objective">
    <issue name="Price" index="1" etype="discrete" type="discrete" vtype="discrete">
      <item index="1" value="low" evaluation="1"/>
      <item index="2" value="high" evaluation="3"/>
    </issue>
    <weight index="1" value="0.5"/>
    <issue name="Delivery" index="2" etype="discrete" type="discrete" vtype="discrete">
      <item index="1" value="1 week" evaluation="1"/>
      <item index="2" value="1 month" evaluation="2"/>
      <item index="3" value="3 months" evaluation="4"/>
    </issue>
    <weight index="2" value="0.5"/>
  </objective>
</utility_space>
"#;

    pub fn write_xml_itex(dir: &Path) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join("itex_domain.xml"), ITEX_DOMAIN_XML).unwrap();
        std::fs::write(dir.join("itex_buyer.xml"), ITEX_BUYER_XML).unwrap();
        std::fs::write(dir.join("itex_seller.xml"), ITEX_SELLER_XML).unwrap();
        std::fs::write(dir.join("itex_pareto.xml"), "<pareto/>").unwrap();
    }

    pub const JOBS_DOMAIN_JSON: &str = r#"{
  "name": "jobs",
  "issuesValues": {
    "salary": {"values": ["2000", "3000", "4000"]},
    "fte": {"range": {"low": 1, "high": 3, "step": 1}}
  }
}"#;

    pub const JOBS_EMPLOYER_JSON: &str = r#"{
  "LinearAdditiveUtilitySpace": {
    "name": "employer",
    "domain": {"name": "jobs"},
    "issueWeights": {"salary": 0.7, "fte": 0.3},
    "issueUtilities": {
      "salary": {"DiscreteValueSetUtilities": {"valueUtilities": {"2000": 1.0, "3000": 0.5, "4000": 0.0}}},
      "fte": {"NumberValueSetUtilities": {"lowValue": 1, "lowUtility": 0.0, "highValue": 3, "highUtility": 1.0}}
    },
    "reservationBid": {"issuevalues": {"salary": "4000", "fte": 1}}
  }
}"#;

    pub const JOBS_EMPLOYEE_JSON: &str = r#"{
  "LinearAdditiveUtilitySpace": {
    "name": "employee",
    "domain": {"name": "jobs"},
    "issueWeights": {"salary": 0.5, "fte": 0.5},
    "issueUtilities": {
      "salary": {"DiscreteValueSetUtilities": {"valueUtilities": {"2000": 0.0, "3000": 0.5, "4000": 1.0}}},
      "fte": {"NumberValueSetUtilities": {"lowValue": 1, "lowUtility": 1.0, "highValue": 3, "highUtility": 0.0}}
    }
  }
}"#;

    pub fn write_geniusweb_jobs(dir: &Path) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join("jobs.json"), JOBS_DOMAIN_JSON).unwrap();
        std::fs::write(dir.join("employee.json"), JOBS_EMPLOYEE_JSON).unwrap();
        std::fs::write(dir.join("employer.json"), JOBS_EMPLOYER_JSON).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    fn space() -> OutcomeSpace {
        OutcomeSpace::new(vec![
            Issue::discrete(
                "color",
                vec![IssueValue::Text("red".into()), IssueValue::Text("blue".into())],
            ),
            Issue::integer("quantity", 1, 3),
        ])
    }

    #[test]
    fn test_cardinality_of_mixed_space() {
        assert_eq!(space().cardinality(), Cardinality::Finite(6));

        let mut with_price = space();
        with_price.issues.push(Issue::continuous("price", 0.0, 1.0));
        assert_eq!(with_price.cardinality(), Cardinality::Infinite);
    }

    #[test]
    fn test_enumerates_every_outcome_below_limit() {
        let mut rng = StdRng::seed_from_u64(1);
        let outcomes = space().outcomes(100, &mut rng);
        assert_eq!(outcomes.len(), 6);
        assert_eq!(
            outcomes[0],
            vec![IssueValue::Text("red".into()), IssueValue::Int(1)]
        );
        assert_eq!(
            outcomes[5],
            vec![IssueValue::Text("blue".into()), IssueValue::Int(3)]
        );
    }

    #[test]
    fn test_samples_when_above_limit() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut big = space();
        big.issues.push(Issue::continuous("price", 10.0, 20.0));
        let outcomes = big.outcomes(25, &mut rng);
        assert_eq!(outcomes.len(), 25);
        for outcome in outcomes {
            let price = outcome[2].as_f64().unwrap();
            assert!((10.0..=20.0).contains(&price));
        }
    }

    #[test]
    fn test_load_yaml_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("Laptop");
        fixtures::write_yaml_laptop(&dir);

        let scenario = load_scenario(&dir).unwrap();
        assert_eq!(scenario.name, "Laptop");
        assert_eq!(scenario.format, ScenarioFormatKind::Yaml);
        assert_eq!(scenario.outcome_space.issues.len(), 2);
        assert_eq!(scenario.outcome_space.cardinality(), Cardinality::Finite(9));
        let names: Vec<&str> = scenario.ufuns.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["buyer", "seller"]);
        assert_eq!(scenario.sources.len(), 2);
    }

    #[test]
    fn test_load_missing_path_is_not_a_scenario() {
        let tmp = TempDir::new().unwrap();
        let err = load_scenario(&tmp.path().join("missing")).unwrap_err();
        assert!(matches!(err, ScenarioError::NotAScenario(_)));

        let empty = load_scenario(tmp.path()).unwrap_err();
        assert!(matches!(empty, ScenarioError::NotAScenario(_)));
    }
}
