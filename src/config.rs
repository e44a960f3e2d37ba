//! Runtime configuration, read from the environment (and a `.env` file when
//! present). The server binary overrides individual fields from its flags.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::setup::UserDirectories;

pub const ENV_APP_DIR: &str = "NEGMAS_APP_DIR";
pub const ENV_BIND: &str = "NEGMAS_APP_BIND";
pub const ENV_STATIC_DIR: &str = "NEGMAS_APP_STATIC_DIR";
pub const ENV_BUNDLE: &str = "NEGMAS_APP_BUNDLE";
pub const ENV_NEGOTIATE_CMD: &str = "NEGMAS_NEGOTIATE_CMD";
pub const ENV_DIALOG_TIMEOUT: &str = "NEGMAS_DIALOG_TIMEOUT_SECS";

pub const DEFAULT_BIND: &str = "127.0.0.1:8019";
pub const DEFAULT_NEGOTIATE_CMD: &str = "negotiate";
pub const DEFAULT_DIALOG_TIMEOUT_SECS: u64 = 300;
pub const BUNDLE_FILE_NAME: &str = "scenarios.zip";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid bind address {value:?}: {reason}")]
    InvalidBind { value: String, reason: String },
    #[error("invalid dialog timeout {0:?}: expected whole seconds")]
    InvalidTimeout(String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Root of the per-user data tree (`scenarios/`, `settings/`, ...).
    pub base_dir: PathBuf,
    pub bind: SocketAddr,
    /// Front-end assets served for every non-API path.
    pub static_dir: Option<PathBuf>,
    pub bundled_archive: PathBuf,
    /// Program (plus leading arguments) that runs one negotiation.
    pub negotiate_command: String,
    pub dialog_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bind_raw = get(ENV_BIND).unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::InvalidBind {
                value: bind_raw.clone(),
                reason: e.to_string(),
            })?;

        let dialog_timeout = match get(ENV_DIALOG_TIMEOUT) {
            Some(raw) => Duration::from_secs(
                raw.parse()
                    .map_err(|_| ConfigError::InvalidTimeout(raw.clone()))?,
            ),
            None => Duration::from_secs(DEFAULT_DIALOG_TIMEOUT_SECS),
        };

        Ok(Self {
            base_dir: get(ENV_APP_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(default_base_dir),
            bind,
            static_dir: get(ENV_STATIC_DIR).map(PathBuf::from),
            bundled_archive: bundled_archive_path(get(ENV_BUNDLE).map(PathBuf::from)),
            negotiate_command: get(ENV_NEGOTIATE_CMD)
                .unwrap_or_else(|| DEFAULT_NEGOTIATE_CMD.to_string()),
            dialog_timeout,
        })
    }

    pub fn directories(&self) -> UserDirectories {
        UserDirectories::new(&self.base_dir)
    }
}

pub fn home_dir() -> Option<PathBuf> {
    ["HOME", "USERPROFILE"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// `~/negmas/app`, or a relative `negmas/app` when no home is known.
pub fn default_base_dir() -> PathBuf {
    home_dir()
        .map(|home| home.join("negmas").join("app"))
        .unwrap_or_else(|| PathBuf::from("negmas").join("app"))
}

/// The configured archive, else `scenarios.zip` beside the executable, else
/// the one in the crate root.
pub fn bundled_archive_path(configured: Option<PathBuf>) -> PathBuf {
    if let Some(path) = configured {
        return path;
    }
    if let Some(beside_exe) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(BUNDLE_FILE_NAME)))
    {
        if beside_exe.is_file() {
            return beside_exe;
        }
    }
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(BUNDLE_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind, DEFAULT_BIND.parse::<SocketAddr>().unwrap());
        assert_eq!(config.negotiate_command, "negotiate");
        assert_eq!(config.dialog_timeout, Duration::from_secs(300));
        assert_eq!(config.static_dir, None);
        assert!(config.base_dir.ends_with("negmas/app"));
        assert!(config.bundled_archive.ends_with(BUNDLE_FILE_NAME));
    }

    #[test]
    fn test_overrides_and_blank_values() {
        let config = AppConfig::from_lookup(lookup(&[
            (ENV_APP_DIR, "/srv/negmas"),
            (ENV_BIND, "0.0.0.0:9000"),
            (ENV_STATIC_DIR, "   "),
            (ENV_BUNDLE, "/opt/bundle.zip"),
            (ENV_NEGOTIATE_CMD, "negmas negotiate"),
            (ENV_DIALOG_TIMEOUT, "30"),
        ]))
        .unwrap();
        assert_eq!(config.base_dir, PathBuf::from("/srv/negmas"));
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.static_dir, None);
        assert_eq!(config.bundled_archive, PathBuf::from("/opt/bundle.zip"));
        assert_eq!(config.negotiate_command, "negmas negotiate");
        assert_eq!(config.dialog_timeout, Duration::from_secs(30));
        assert_eq!(
            config.directories().scenarios,
            PathBuf::from("/srv/negmas/scenarios")
        );
    }

    #[test]
    fn test_invalid_values() {
        let bind = AppConfig::from_lookup(lookup(&[(ENV_BIND, "not-an-address")]));
        assert!(matches!(bind, Err(ConfigError::InvalidBind { .. })));

        let timeout = AppConfig::from_lookup(lookup(&[(ENV_DIALOG_TIMEOUT, "soon")]));
        assert!(matches!(timeout, Err(ConfigError::InvalidTimeout(_))));
    }
}
