//! Read-only views of scenarios for the front end: utility-function summaries
//! and the files backing them, relative to the scenario directory.

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::formats::{self, ScenarioFiles};
use super::UtilityFunction;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UtilityFunctionInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub string_representation: String,
    pub file_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioFilesView {
    pub domain: PathBuf,
    pub utilities: Vec<PathBuf>,
}

pub fn get_ufun_info(ufun: &UtilityFunction, scenario_path: &Path) -> UtilityFunctionInfo {
    let file_path = if scenario_path.is_dir() {
        find_ufun_file(ufun, scenario_path)
    } else {
        None
    };
    UtilityFunctionInfo {
        name: ufun.name.clone(),
        type_name: ufun.type_name.clone(),
        string_representation: detailed_representation(ufun),
        file_path,
    }
}

/// `Reserved: .. | Weights: [..] | ...`, recursing through discount
/// wrappers as `Base: (..)`.
pub fn detailed_representation(ufun: &UtilityFunction) -> String {
    ufun.summary()
}

/// The utility file whose stem equals the function's name, else one whose
/// stem contains it or is contained in it.
pub fn find_ufun_file(ufun: &UtilityFunction, scenario_path: &Path) -> Option<PathBuf> {
    let files = discovered_files(scenario_path)?;
    let name = ufun.name.as_str();
    let stem_of = |path: &PathBuf| {
        path.file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    };

    let exact = files.utilities.iter().find(|path| stem_of(path) == name);
    let fuzzy = || {
        if name.is_empty() {
            return None;
        }
        files.utilities.iter().find(|path| {
            let stem = stem_of(path);
            !stem.is_empty() && (stem.contains(name) || name.contains(stem.as_str()))
        })
    };
    exact
        .or_else(fuzzy)
        .map(|path| relative_to(path, scenario_path))
}

pub fn get_scenario_files(scenario_path: &Path) -> Option<ScenarioFilesView> {
    let files = discovered_files(scenario_path)?;
    Some(ScenarioFilesView {
        domain: relative_to(&files.domain, scenario_path),
        utilities: files
            .utilities
            .iter()
            .map(|path| relative_to(path, scenario_path))
            .collect(),
    })
}

fn discovered_files(scenario_path: &Path) -> Option<ScenarioFiles> {
    match formats::discover(scenario_path) {
        Ok(found) => found.map(|(_, files)| files),
        Err(e) => {
            tracing::debug!("no scenario files in {}: {e}", scenario_path.display());
            None
        }
    }
}

fn relative_to(path: &Path, base: &Path) -> PathBuf {
    match path.strip_prefix(base) {
        Ok(relative) => relative.to_path_buf(),
        Err(_) => path.file_name().map(PathBuf::from).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scenarios::{fixtures, load_scenario, Numeric, UtilityKind};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn named(name: &str) -> UtilityFunction {
        UtilityFunction {
            name: name.to_string(),
            type_name: "LinearUtilityFunction".into(),
            reserved_value: Some(Numeric::Value(0.5)),
            kind: UtilityKind::Linear {
                weights: vec![1.0],
                bias: 0.0,
            },
        }
    }

    #[test]
    fn test_exact_stem_match_wins() {
        let tmp = TempDir::new().unwrap();
        fixtures::write_xml_itex(tmp.path());
        // "itex_buyer" is also a substring of this one, but sorts after it.
        std::fs::write(
            tmp.path().join("itex_buyer_alt.xml"),
            fixtures::ITEX_SELLER_XML,
        )
        .unwrap();

        let path = find_ufun_file(&named("itex_buyer"), tmp.path()).unwrap();
        assert_eq!(path, PathBuf::from("itex_buyer.xml"));

        let alt = find_ufun_file(&named("itex_buyer_alt"), tmp.path()).unwrap();
        assert_eq!(alt, PathBuf::from("itex_buyer_alt.xml"));
    }

    #[test]
    fn test_substring_match_either_direction() {
        let tmp = TempDir::new().unwrap();
        fixtures::write_xml_itex(tmp.path());

        assert_eq!(
            find_ufun_file(&named("seller"), tmp.path()),
            Some(PathBuf::from("itex_seller.xml"))
        );
        assert_eq!(
            find_ufun_file(&named("itex_seller_v2"), tmp.path()),
            Some(PathBuf::from("itex_seller.xml"))
        );
        assert_eq!(find_ufun_file(&named("broker"), tmp.path()), None);
    }

    #[test]
    fn test_paths_are_relative() {
        let tmp = TempDir::new().unwrap();
        fixtures::write_yaml_laptop(tmp.path());

        let files = get_scenario_files(tmp.path()).unwrap();
        assert_eq!(files.domain, PathBuf::from("Laptop.yml"));
        assert!(files.utilities.iter().all(|p| p.is_relative()));
        assert_eq!(files.utilities.len(), 2);
    }

    #[test]
    fn test_missing_directory_yields_none() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        assert_eq!(get_scenario_files(&missing), None);
        assert_eq!(find_ufun_file(&named("x"), &missing), None);
    }

    #[test]
    fn test_get_ufun_info_for_loaded_scenario() {
        let tmp = TempDir::new().unwrap();
        fixtures::write_geniusweb_jobs(tmp.path());
        let scenario = load_scenario(tmp.path()).unwrap();

        let infos: Vec<UtilityFunctionInfo> = scenario
            .ufuns
            .iter()
            .map(|ufun| get_ufun_info(ufun, tmp.path()))
            .collect();
        let employer = infos.iter().find(|info| info.name == "employer").unwrap();
        assert_eq!(employer.type_name, "LinearAdditiveUtilityFunction");
        assert_eq!(employer.file_path, Some(PathBuf::from("employer.json")));
        assert!(employer
            .string_representation
            .starts_with("Reserved: 0.000 | Weights: [0.300, 0.700]"));
    }

    #[test]
    fn test_no_file_path_for_single_file_scenario() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("laptop.yml");
        std::fs::write(&file, "issues: []\n").unwrap();
        let info = get_ufun_info(&named("buyer"), &file);
        assert_eq!(info.file_path, None);
        assert_eq!(
            info.string_representation,
            "Reserved: 0.500 | Weights: [1.000] | Bias: 0.000"
        );
    }
}
