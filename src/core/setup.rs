//! User directory provisioning and bundled scenario extraction.
//!
//! Everything here is synchronous and touches the filesystem directly. Handlers
//! run these functions on a blocking thread.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use zip::ZipArchive;

/// Subdirectories created under the user base directory.
pub const USER_SUBDIRECTORIES: [&str; 4] = ["scenarios", "settings", "negotiations", "tournaments"];

/// Prefix stripped from archive entry names.
pub const ARCHIVE_PREFIX: &str = "scenarios/";

/// Derived files that `skip_cache` leaves out of an extraction.
pub const CACHE_FILES: [&str; 4] = ["_info.yaml", "_info.yml", "_stats.yaml", "_plot.webp"];
pub const PLOTS_DIR: &str = "_plots";

/// Extensions of files that make a directory a scenario.
pub const SCENARIO_EXTENSIONS: [&str; 4] = ["xml", "yml", "yaml", "json"];

// ---------------------------------------------------------------------------
// User directories
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserDirectories {
    pub base: PathBuf,
    pub scenarios: PathBuf,
    pub settings: PathBuf,
    pub negotiations: PathBuf,
    pub tournaments: PathBuf,
}

impl UserDirectories {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            scenarios: base.join(USER_SUBDIRECTORIES[0]),
            settings: base.join(USER_SUBDIRECTORIES[1]),
            negotiations: base.join(USER_SUBDIRECTORIES[2]),
            tournaments: base.join(USER_SUBDIRECTORIES[3]),
            base,
        }
    }

    pub fn all(&self) -> [&Path; 4] {
        [
            &self.scenarios,
            &self.settings,
            &self.negotiations,
            &self.tournaments,
        ]
    }
}

/// Create the user directory tree under `base`. Safe to call repeatedly.
pub fn ensure_user_directories(base: &Path) -> std::io::Result<UserDirectories> {
    let dirs = UserDirectories::new(base);
    for dir in dirs.all() {
        std::fs::create_dir_all(dir)?;
    }
    Ok(dirs)
}

// ---------------------------------------------------------------------------
// Bundled scenarios
// ---------------------------------------------------------------------------

/// Outcome of a bundled scenario extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CopyReport {
    pub total_files: usize,
    pub copied: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

impl CopyReport {
    fn failed(message: String) -> Self {
        Self {
            errors: vec![message],
            ..Self::default()
        }
    }
}

/// Extract the bundled scenario archive into `target_dir`.
///
/// Never fails: per-entry problems land in [`CopyReport::errors`], and an
/// archive that cannot be opened yields a single error with zero counts.
/// Existing files are left alone unless `force` is set.
pub fn copy_bundled_scenarios(
    archive: &Path,
    target_dir: &Path,
    force: bool,
    skip_cache: bool,
) -> CopyReport {
    let file = match File::open(archive) {
        Ok(file) => file,
        Err(e) => {
            tracing::warn!("cannot open bundled archive {}: {e}", archive.display());
            return CopyReport::failed(format!(
                "failed to open archive {}: {e}",
                archive.display()
            ));
        }
    };
    let mut zip = match ZipArchive::new(BufReader::new(file)) {
        Ok(zip) => zip,
        Err(e) => {
            tracing::warn!("invalid bundled archive {}: {e}", archive.display());
            return CopyReport::failed(format!("invalid archive {}: {e}", archive.display()));
        }
    };

    let mut report = CopyReport::default();
    for index in 0..zip.len() {
        let mut entry = match zip.by_index(index) {
            Ok(entry) => entry,
            Err(e) => {
                report.errors.push(format!("entry #{index}: {e}"));
                continue;
            }
        };
        if entry.is_dir() {
            continue;
        }

        let raw_name = entry.name().replace('\\', "/");
        let relative = raw_name.strip_prefix(ARCHIVE_PREFIX).unwrap_or(&raw_name);
        if relative.is_empty() || relative.ends_with('/') {
            continue;
        }
        if is_hidden(relative) {
            continue;
        }
        if skip_cache && is_cache_path(relative) {
            continue;
        }

        report.total_files += 1;

        let Some(safe_relative) = sanitize_entry_path(relative) else {
            report
                .errors
                .push(format!("{raw_name}: entry path escapes the target directory"));
            continue;
        };
        let target = target_dir.join(safe_relative);
        if target.exists() && !force {
            report.skipped += 1;
            continue;
        }

        match extract_entry(&mut entry, &target) {
            Ok(()) => report.copied += 1,
            Err(e) => report.errors.push(format!("{relative}: {e}")),
        }
    }

    tracing::info!(
        "bundled scenarios: {} files, {} copied, {} skipped, {} errors",
        report.total_files,
        report.copied,
        report.skipped,
        report.errors.len()
    );
    report
}

fn extract_entry(entry: &mut impl Read, target: &Path) -> std::io::Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = File::create(target)?;
    std::io::copy(entry, &mut out)?;
    Ok(())
}

fn is_hidden(relative: &str) -> bool {
    relative
        .split('/')
        .any(|component| component.starts_with('.') && component != "." && component != "..")
}

fn is_cache_path(relative: &str) -> bool {
    let mut components = relative.split('/').filter(|c| !c.is_empty());
    let file_name = relative.rsplit('/').next().unwrap_or_default();
    CACHE_FILES.contains(&file_name) || components.any(|c| c == PLOTS_DIR)
}

/// Turn an archive entry name into a relative path that stays inside the
/// extraction root, or `None` when it would escape it.
fn sanitize_entry_path(relative: &str) -> Option<PathBuf> {
    if relative.starts_with('/') {
        return None;
    }
    let mut path = PathBuf::new();
    for component in relative.split('/') {
        match component {
            "" | "." => continue,
            ".." => return None,
            c if c.contains(':') => return None,
            c => path.push(c),
        }
    }
    if path.as_os_str().is_empty() {
        None
    } else {
        Some(path)
    }
}

// ---------------------------------------------------------------------------
// Scenario discovery
// ---------------------------------------------------------------------------

/// Number of scenario directories below `directory`.
pub fn count_scenarios(directory: &Path) -> usize {
    find_scenario_dirs(directory).len()
}

/// Directories below `directory` (the root itself excluded) that directly
/// contain a scenario file. Hidden directories and everything under them are
/// ignored. Sorted; empty when the root does not exist.
pub fn find_scenario_dirs(directory: &Path) -> Vec<PathBuf> {
    if !directory.is_dir() {
        return Vec::new();
    }

    let walker = ignore::WalkBuilder::new(directory)
        .standard_filters(false)
        .hidden(true)
        .follow_links(false)
        .build();

    let mut found = BTreeSet::new();
    for entry in walker.flatten() {
        if entry.depth() < 2 || !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        if !is_scenario_file(entry.path()) {
            continue;
        }
        if let Some(parent) = entry.path().parent() {
            found.insert(parent.to_path_buf());
        }
    }
    found.into_iter().collect()
}

/// Content file sniffing: a non-underscore file with a scenario extension.
pub fn is_scenario_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.starts_with('_') {
        return false;
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .is_some_and(|ext| SCENARIO_EXTENSIONS.contains(&ext.as_str()))
}
