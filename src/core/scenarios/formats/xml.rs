//! Genius XML scenarios: a `negotiation_template` domain and one
//! `utility_space` profile per party. Profiles carry the reserved value in a
//! `<reservation value=".."/>` element and an optional `<discount_factor>`.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

use super::{candidate_files, read_text, ReservedTarget, ScenarioFiles, ScenarioFormat, ScenarioFormatKind};
use crate::core::scenarios::ufun::parse_float;
use crate::core::scenarios::{
    file_stem, Issue, IssueValue, IssueValues, Numeric, OutcomeSpace, ScenarioError, UfunSource,
    UtilityFunction, UtilityKind, ValueFunction,
};

const DOMAIN_ROOT: &str = "negotiation_template";
const PROFILE_ROOT: &str = "utility_space";

pub struct XmlFormat;

impl ScenarioFormat for XmlFormat {
    fn kind(&self) -> ScenarioFormatKind {
        ScenarioFormatKind::Xml
    }

    fn find_files(&self, dir: &Path) -> Result<Option<ScenarioFiles>, ScenarioError> {
        let mut domain = None;
        let mut utilities = Vec::new();
        for path in candidate_files(dir, &["xml"])? {
            let root = match scan(&path) {
                Ok(doc) => doc.root,
                Err(e) => {
                    tracing::debug!("skipping {}: {e}", path.display());
                    continue;
                }
            };
            match root.as_str() {
                DOMAIN_ROOT if domain.is_none() => domain = Some(path),
                PROFILE_ROOT => utilities.push(path),
                _ => {}
            }
        }
        Ok(domain.map(|domain| ScenarioFiles { domain, utilities }))
    }

    fn load_domain(&self, file: &Path) -> Result<OutcomeSpace, ScenarioError> {
        let doc = scan(file)?;
        let issues = doc
            .issues
            .iter()
            .map(|node| node.to_issue(file))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(OutcomeSpace::new(issues))
    }

    fn load_utility(
        &self,
        file: &Path,
        space: &OutcomeSpace,
    ) -> Result<UtilityFunction, ScenarioError> {
        let doc = scan(file)?;
        let name = file_stem(file);

        let mut weights = vec![0.0; space.issues.len()];
        let mut values = vec![ValueFunction::default(); space.issues.len()];
        for node in &doc.issues {
            let Some(position) = space.issue_index(&node.name) else {
                tracing::debug!("{}: issue {} not in domain", file.display(), node.name);
                continue;
            };
            weights[position] = node
                .index
                .as_ref()
                .and_then(|index| doc.weights.get(index))
                .copied()
                .unwrap_or(0.0);
            values[position] = node.value_function(&space.issues[position]);
        }

        let reserved_value = doc.reservation.as_deref().map(|raw| match parse_float(raw) {
            Some(v) => Numeric::Value(v),
            None => Numeric::Raw(raw.to_string()),
        });
        let base = UtilityFunction {
            name: name.clone(),
            type_name: "LinearAdditiveUtilityFunction".to_string(),
            reserved_value: reserved_value.clone(),
            kind: UtilityKind::LinearAdditive {
                weights,
                values,
                bias: 0.0,
            },
        };

        let discount = doc.discount.as_deref().and_then(parse_float);
        Ok(match discount {
            Some(d) if d > 0.0 && d < 1.0 => UtilityFunction {
                name,
                type_name: "ExpDiscountedUFun".to_string(),
                reserved_value,
                kind: UtilityKind::Discounted {
                    inner: Box::new(base),
                    discount: d,
                    exponent: 1.0,
                },
            },
            _ => base,
        })
    }

    /// Both a discounted profile and its base read the same element, so the
    /// target makes no difference here.
    fn write_reserved_value(
        &self,
        source: &UfunSource,
        _target: ReservedTarget,
        value: f64,
    ) -> Result<(), ScenarioError> {
        let file = &source.file;
        let text = read_text(file)?;
        let updated = rewrite_reservation(&text, value).map_err(|message| ScenarioError::Xml {
            path: file.clone(),
            message,
        })?;
        std::fs::write(file, updated).map_err(|e| ScenarioError::io(file, e))
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct XmlDoc {
    root: String,
    issues: Vec<IssueNode>,
    weights: HashMap<String, f64>,
    reservation: Option<String>,
    discount: Option<String>,
}

#[derive(Debug, Default)]
struct IssueNode {
    name: String,
    index: Option<String>,
    etype: String,
    lower: Option<String>,
    upper: Option<String>,
    items: Vec<(String, Option<f64>)>,
    evaluator: Option<HashMap<String, String>>,
}

impl IssueNode {
    fn to_issue(&self, path: &Path) -> Result<Issue, ScenarioError> {
        let bounds = || {
            let lo = self.lower.as_deref().and_then(parse_float);
            let hi = self.upper.as_deref().and_then(parse_float);
            lo.zip(hi).ok_or_else(|| {
                ScenarioError::invalid(path, format!("issue {} has no bounds", self.name))
            })
        };
        match self.etype.as_str() {
            "integer" => {
                let (lo, hi) = bounds()?;
                Ok(Issue::integer(&self.name, lo as i64, hi as i64))
            }
            "real" => {
                let (lo, hi) = bounds()?;
                Ok(Issue::continuous(&self.name, lo, hi))
            }
            _ => Ok(Issue::discrete(
                &self.name,
                self.items
                    .iter()
                    .map(|(value, _)| IssueValue::Text(value.clone()))
                    .collect(),
            )),
        }
    }

    /// Discrete evaluations are normalised by their maximum; numeric issues
    /// use the linear evaluator when one is given.
    fn value_function(&self, issue: &Issue) -> ValueFunction {
        if !self.items.is_empty() {
            let max = self
                .items
                .iter()
                .filter_map(|(_, evaluation)| *evaluation)
                .fold(0.0_f64, f64::max);
            let scale = if max > 0.0 { max } else { 1.0 };
            return ValueFunction::Table(
                self.items
                    .iter()
                    .map(|(value, evaluation)| (value.clone(), evaluation.unwrap_or(0.0) / scale))
                    .collect::<BTreeMap<_, _>>(),
            );
        }

        let Some(evaluator) = &self.evaluator else {
            return ValueFunction::Identity;
        };
        let attr = |key: &str| evaluator.get(key).and_then(|v| parse_float(v));
        if let Some(slope) = attr("slope") {
            return ValueFunction::Affine {
                slope,
                bias: attr("offset").unwrap_or(0.0),
            };
        }
        let range = match &issue.values {
            IssueValues::Integer { min, max } => Some((*min as f64, *max as f64)),
            IssueValues::Continuous { min, max } => Some((*min, *max)),
            IssueValues::Discrete { .. } => None,
        };
        match (range, attr("utilityLowestValue"), attr("utilityHighestValue")) {
            (Some((lo, hi)), Some(u_lo), Some(u_hi)) if hi > lo => {
                let slope = (u_hi - u_lo) / (hi - lo);
                ValueFunction::Affine {
                    slope,
                    bias: u_lo - slope * lo,
                }
            }
            _ => ValueFunction::Identity,
        }
    }
}

fn xml_error(path: &Path, message: impl ToString) -> ScenarioError {
    ScenarioError::Xml {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

fn attributes(element: &BytesStart) -> Result<HashMap<String, String>, String> {
    element
        .attributes()
        .map(|attr| {
            let attr = attr.map_err(|e| e.to_string())?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value().map_err(|e| e.to_string())?.into_owned();
            Ok((key, value))
        })
        .collect()
}

fn scan(path: &Path) -> Result<XmlDoc, ScenarioError> {
    let text = read_text(path)?;
    let mut reader = Reader::from_str(&text);
    reader.config_mut().trim_text(true);

    let mut doc = XmlDoc::default();
    let mut current: Option<IssueNode> = None;
    loop {
        match reader.read_event().map_err(|e| xml_error(path, e))? {
            Event::Start(element) => {
                open_element(&mut doc, &mut current, &element, false)
                    .map_err(|e| xml_error(path, e))?;
            }
            Event::Empty(element) => {
                open_element(&mut doc, &mut current, &element, true)
                    .map_err(|e| xml_error(path, e))?;
            }
            Event::End(element) if element.local_name().as_ref() == b"issue" => {
                if let Some(issue) = current.take() {
                    doc.issues.push(issue);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if doc.root.is_empty() {
        return Err(xml_error(path, "document has no root element"));
    }
    Ok(doc)
}

fn open_element(
    doc: &mut XmlDoc,
    current: &mut Option<IssueNode>,
    element: &BytesStart,
    empty: bool,
) -> Result<(), String> {
    let local = element.local_name();
    let tag = String::from_utf8_lossy(local.as_ref()).into_owned();
    if doc.root.is_empty() {
        doc.root = tag.clone();
    }
    let mut attrs = attributes(element)?;

    match tag.as_str() {
        "issue" => {
            let etype = attrs
                .get("etype")
                .or_else(|| attrs.get("type"))
                .map(|t| t.to_ascii_lowercase())
                .unwrap_or_else(|| "discrete".to_string());
            let node = IssueNode {
                name: attrs.remove("name").unwrap_or_default(),
                index: attrs.remove("index"),
                etype,
                lower: attrs.remove("lowerbound"),
                upper: attrs.remove("upperbound"),
                ..IssueNode::default()
            };
            if empty {
                doc.issues.push(node);
            } else {
                *current = Some(node);
            }
        }
        "item" => {
            if let Some(issue) = current.as_mut() {
                let evaluation = attrs.get("evaluation").and_then(|v| parse_float(v));
                issue
                    .items
                    .push((attrs.remove("value").unwrap_or_default(), evaluation));
            }
        }
        "evaluator" => {
            if let Some(issue) = current.as_mut() {
                issue.evaluator = Some(attrs);
            }
        }
        "weight" => {
            if let (Some(index), Some(value)) = (
                attrs.remove("index"),
                attrs.get("value").and_then(|v| parse_float(v)),
            ) {
                doc.weights.insert(index, value);
            }
        }
        "reservation" => doc.reservation = attrs.remove("value"),
        "discount_factor" => doc.discount = attrs.remove("value"),
        _ => {}
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

fn reservation_element(source: Option<&BytesStart>, value: f64) -> Result<BytesStart<'static>, String> {
    let mut element = BytesStart::new("reservation");
    if let Some(source) = source {
        for attr in source.attributes() {
            let attr = attr.map_err(|e| e.to_string())?;
            if attr.key.as_ref() != b"value" {
                element.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
            }
        }
    }
    element.push_attribute(("value", value.to_string().as_str()));
    Ok(element)
}

/// Replace the value of the first `<reservation>` element, or add one just
/// before the root closes. Everything else is written back untouched.
fn rewrite_reservation(text: &str, value: f64) -> Result<String, String> {
    let mut reader = Reader::from_str(text);
    let mut writer = Writer::new(Vec::new());
    let mut depth = 0usize;
    let mut replaced = false;

    loop {
        let event = reader.read_event().map_err(|e| e.to_string())?;
        let result = match event {
            Event::Eof => break,
            Event::Empty(element)
                if !replaced && element.local_name().as_ref() == b"reservation" =>
            {
                replaced = true;
                writer.write_event(Event::Empty(reservation_element(Some(&element), value)?))
            }
            Event::Start(element)
                if !replaced && element.local_name().as_ref() == b"reservation" =>
            {
                replaced = true;
                depth += 1;
                writer.write_event(Event::Start(reservation_element(Some(&element), value)?))
            }
            Event::Start(element) => {
                depth += 1;
                writer.write_event(Event::Start(element))
            }
            Event::End(element) => {
                depth = depth.saturating_sub(1);
                if depth == 0 && !replaced {
                    replaced = true;
                    writer
                        .write_event(Event::Empty(reservation_element(None, value)?))
                        .map_err(|e| e.to_string())?;
                }
                writer.write_event(Event::End(element))
            }
            other => writer.write_event(other),
        };
        result.map_err(|e| e.to_string())?;
    }

    String::from_utf8(writer.into_inner()).map_err(|e| e.to_string())
}
