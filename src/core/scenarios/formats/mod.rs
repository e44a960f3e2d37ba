//! On-disk scenario formats.
//!
//! Each format knows how to recognise its files inside a scenario directory,
//! parse them, and write a repaired reserved value back. [`STRATEGIES`] lists
//! them in discovery order; the first one that finds a domain file owns the
//! directory.

pub mod geniusweb;
pub mod xml;
pub mod yaml;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{OutcomeSpace, ScenarioError, UfunSource, UtilityFunction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioFormatKind {
    Yaml,
    Xml,
    GeniusWeb,
}

impl fmt::Display for ScenarioFormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Yaml => "yaml",
            Self::Xml => "xml",
            Self::GeniusWeb => "geniusweb",
        })
    }
}

/// Absolute paths of the files making up one scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioFiles {
    pub domain: PathBuf,
    pub utilities: Vec<PathBuf>,
}

/// Which reserved value of a utility function to rewrite: its own, or the
/// one of the function wrapped by a discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservedTarget {
    Outer,
    Inner,
}

pub trait ScenarioFormat: Sync {
    fn kind(&self) -> ScenarioFormatKind;

    /// `Ok(None)` when the directory holds no domain file of this format.
    fn find_files(&self, dir: &Path) -> Result<Option<ScenarioFiles>, ScenarioError>;

    fn load_domain(&self, file: &Path) -> Result<OutcomeSpace, ScenarioError>;

    fn load_utility(
        &self,
        file: &Path,
        space: &OutcomeSpace,
    ) -> Result<UtilityFunction, ScenarioError>;

    fn write_reserved_value(
        &self,
        source: &UfunSource,
        target: ReservedTarget,
        value: f64,
    ) -> Result<(), ScenarioError>;
}

pub static STRATEGIES: [&dyn ScenarioFormat; 3] = [
    &yaml::YamlFormat,
    &xml::XmlFormat,
    &geniusweb::GeniusWebFormat,
];

/// First strategy that finds a domain file in `dir`, with its files.
pub fn discover(
    dir: &Path,
) -> Result<Option<(&'static dyn ScenarioFormat, ScenarioFiles)>, ScenarioError> {
    for format in STRATEGIES.iter().copied() {
        if let Some(files) = format.find_files(dir)? {
            return Ok(Some((format, files)));
        }
    }
    Ok(None)
}

pub fn format_for(kind: ScenarioFormatKind) -> &'static dyn ScenarioFormat {
    match kind {
        ScenarioFormatKind::Yaml => &yaml::YamlFormat,
        ScenarioFormatKind::Xml => &xml::XmlFormat,
        ScenarioFormatKind::GeniusWeb => &geniusweb::GeniusWebFormat,
    }
}

/// Regular, non-underscore files in `dir` with one of `extensions`, sorted.
pub(crate) fn candidate_files(
    dir: &Path,
    extensions: &[&str],
) -> Result<Vec<PathBuf>, ScenarioError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ScenarioError::io(dir, e))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .map(|name| !name.to_string_lossy().starts_with('_'))
                .unwrap_or(false)
        })
        .filter(|path| {
            path.extension()
                .map(|ext| {
                    let ext = ext.to_string_lossy().to_ascii_lowercase();
                    extensions.contains(&ext.as_str())
                })
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

pub(crate) fn read_text(path: &Path) -> Result<String, ScenarioError> {
    std::fs::read_to_string(path).map_err(|e| ScenarioError::io(path, e))
}
