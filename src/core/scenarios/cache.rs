use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;

use super::reserved::{fix_in_place, FixOutcome};
use super::{load_scenario, Scenario, ScenarioError};

/// Loaded scenarios keyed by path. Reserved values are repaired in memory on
/// load, so callers always see numbers; files are left alone.
#[derive(Default)]
pub struct ScenarioCache {
    entries: DashMap<PathBuf, Arc<Scenario>>,
}

impl ScenarioCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load(&self, path: &Path) -> Result<Arc<Scenario>, ScenarioError> {
        if let Some(hit) = self.entries.get(path) {
            return Ok(hit.value().clone());
        }

        let mut scenario = load_scenario(path)?;
        for fix in fix_in_place(&mut scenario) {
            match fix.outcome {
                FixOutcome::Fixed { value } => tracing::debug!(
                    "{}: using {value} as reserved value of {}",
                    path.display(),
                    fix.ufun
                ),
                FixOutcome::Unfixable { reason } => tracing::warn!(
                    "{}: reserved value of {} left as is: {reason}",
                    path.display(),
                    fix.ufun
                ),
            }
        }

        let scenario = Arc::new(scenario);
        self.entries.insert(path.to_path_buf(), scenario.clone());
        Ok(scenario)
    }

    pub fn invalidate(&self, path: &Path) {
        self.entries.remove(path);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scenarios::fixtures;
    use tempfile::TempDir;

    #[test]
    fn test_caches_and_repairs_without_writing() {
        let tmp = TempDir::new().unwrap();
        fixtures::write_yaml_laptop(tmp.path());
        let cache = ScenarioCache::new();

        let first = cache.get_or_load(tmp.path()).unwrap();
        assert_eq!(first.ufuns[1].reserved(), Some(0.0));
        let second = cache.get_or_load(tmp.path()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        let raw = std::fs::read_to_string(tmp.path().join("Laptop-B-prof2.yml")).unwrap();
        assert!(raw.contains(".inf"));

        cache.invalidate(tmp.path());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_load_errors_are_not_cached() {
        let tmp = TempDir::new().unwrap();
        let cache = ScenarioCache::new();
        assert!(cache.get_or_load(tmp.path()).is_err());
        assert!(cache.is_empty());
    }
}
