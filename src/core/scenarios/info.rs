//! The per-scenario `_info.yaml` cache.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use super::ScenarioError;

pub const INFO_FILE: &str = "_info.yaml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_outcomes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opposition: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rational_fraction: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

pub fn info_path(scenario_dir: &Path) -> PathBuf {
    scenario_dir.join(INFO_FILE)
}

pub fn has_info(scenario_dir: &Path) -> bool {
    info_path(scenario_dir).is_file()
}

/// `Ok(None)` when the scenario has no cache yet. Unknown keys are ignored.
pub fn read_info(scenario_dir: &Path) -> Result<Option<ScenarioInfo>, ScenarioError> {
    let path = info_path(scenario_dir);
    if !path.is_file() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&path).map_err(|e| ScenarioError::io(&path, e))?;
    if text.trim().is_empty() {
        return Ok(Some(ScenarioInfo::default()));
    }
    serde_yaml::from_str(&text)
        .map(Some)
        .map_err(|e| ScenarioError::Yaml {
            path,
            message: e.to_string(),
        })
}

/// Write the set fields of `updates` over the existing cache, keeping every
/// other key already in the file.
pub fn merge_info(
    scenario_dir: &Path,
    updates: &ScenarioInfo,
) -> Result<ScenarioInfo, ScenarioError> {
    let path = info_path(scenario_dir);
    let yaml_error = |e: serde_yaml::Error| ScenarioError::Yaml {
        path: path.clone(),
        message: e.to_string(),
    };

    let mut merged = if path.is_file() {
        let text = std::fs::read_to_string(&path).map_err(|e| ScenarioError::io(&path, e))?;
        match serde_yaml::from_str::<Value>(&text).map_err(yaml_error)? {
            Value::Mapping(existing) => existing,
            Value::Null => Mapping::new(),
            _ => return Err(ScenarioError::invalid(&path, "info cache is not a mapping")),
        }
    } else {
        Mapping::new()
    };

    if let Value::Mapping(new_keys) = serde_yaml::to_value(updates).map_err(yaml_error)? {
        for (key, value) in new_keys {
            merged.insert(key, value);
        }
    }

    let merged = Value::Mapping(merged);
    let text = serde_yaml::to_string(&merged).map_err(yaml_error)?;
    std::fs::write(&path, text).map_err(|e| ScenarioError::io(&path, e))?;
    serde_yaml::from_value(merged).map_err(yaml_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_read_missing_cache() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(read_info(tmp.path()).unwrap(), None);
        assert!(!has_info(tmp.path()));
    }

    #[test]
    fn test_merge_creates_file() {
        let tmp = TempDir::new().unwrap();
        let updates = ScenarioInfo {
            n_outcomes: Some(9),
            opposition: Some(0.5),
            ..ScenarioInfo::default()
        };
        let merged = merge_info(tmp.path(), &updates).unwrap();
        assert_eq!(merged, updates);
        assert_eq!(read_info(tmp.path()).unwrap(), Some(updates));
    }

    #[test]
    fn test_merge_overrides_and_preserves_keys() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            info_path(tmp.path()),
            "description: laptops\nopposition: 0.1\nauthor: someone\n",
        )
        .unwrap();

        let updates = ScenarioInfo {
            opposition: Some(0.75),
            rational_fraction: Some(0.25),
            ..ScenarioInfo::default()
        };
        let merged = merge_info(tmp.path(), &updates).unwrap();
        assert_eq!(merged.description.as_deref(), Some("laptops"));
        assert_eq!(merged.opposition, Some(0.75));
        assert_eq!(merged.rational_fraction, Some(0.25));

        let raw = std::fs::read_to_string(info_path(tmp.path())).unwrap();
        assert!(raw.contains("author: someone"));
    }

    #[test]
    fn test_unset_fields_do_not_erase() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(info_path(tmp.path()), "n_outcomes: 12\n").unwrap();
        let merged = merge_info(
            tmp.path(),
            &ScenarioInfo {
                opposition: Some(0.0),
                ..ScenarioInfo::default()
            },
        )
        .unwrap();
        assert_eq!(merged.n_outcomes, Some(12));
    }
}
