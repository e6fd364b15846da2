use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::services::OPEN_STAGES;

pub const ENV_CRM_FILE: &str = "DEALBOARD_CRM_FILE";
pub const ENV_OFFLINE: &str = "DEALBOARD_OFFLINE";
pub const ENV_LOG: &str = "DEALBOARD_LOG";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not locate a data directory")]
    NoDataDir,
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crm_file: Option<PathBuf>,
    pub offline: bool,
    pub admin_ids: Vec<String>,
    pub stages: Vec<String>,
    pub record_url_template: Option<String>,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            crm_file: None,
            offline: false,
            admin_ids: Vec::new(),
            stages: OPEN_STAGES.iter().map(|s| s.to_string()).collect(),
            record_url_template: None,
            log: LogConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: "info".into(),
            file: None,
        }
    }
}

impl Config {
    /// Path of the CRM document, falling back to the platform data dir.
    pub fn crm_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.crm_file {
            Some(path) => Ok(path.clone()),
            None => Ok(project_dirs()?.data_dir().join("crm.yml")),
        }
    }

    pub fn log_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.log.file {
            Some(path) => Ok(path.clone()),
            None => Ok(project_dirs()?.data_dir().join("dealboard.log")),
        }
    }
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(project_dirs()?.config_dir().join("config.yml"))
}

/// Reads the config file (missing file means defaults), then applies
/// environment overrides.
pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };
    let mut config = load_file(&path)?.unwrap_or_default();
    apply_env_overrides(&mut config, |key| env::var(key).ok());
    Ok(config)
}

pub fn load_file(path: &Path) -> Result<Option<Config>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&contents)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = lookup(ENV_CRM_FILE).filter(|v| !v.is_empty()) {
        config.crm_file = Some(PathBuf::from(path));
    }
    if let Some(flag) = lookup(ENV_OFFLINE) {
        config.offline = matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
    }
    if let Some(level) = lookup(ENV_LOG).filter(|v| !v.is_empty()) {
        config.log.level = level;
    }
}

fn project_dirs() -> Result<ProjectDirs, ConfigError> {
    ProjectDirs::from("", "", "dealboard").ok_or(ConfigError::NoDataDir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loaded = load_file(&dir.path().join("nope.yml")).expect("load");
        assert!(loaded.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.yml");
        fs::write(&path, "offline: true\nadmin_ids: ['42']\nlog:\n  level: debug\n").unwrap();
        let config = load_file(&path).expect("load").expect("present");
        assert!(config.offline);
        assert_eq!(config.admin_ids, vec!["42"]);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.stages.len(), OPEN_STAGES.len());
        assert!(config.crm_file.is_none());
    }

    #[test]
    fn test_malformed_file_reports_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.yml");
        fs::write(&path, "offline: [not a bool\n").unwrap();
        let err = load_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.yml"));
    }

    #[test]
    fn test_env_overrides_win() {
        let env: HashMap<&str, &str> = [
            (ENV_CRM_FILE, "/tmp/other.yml"),
            (ENV_OFFLINE, "yes"),
            (ENV_LOG, "dealboard=trace"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.crm_file, Some(PathBuf::from("/tmp/other.yml")));
        assert!(config.offline);
        assert_eq!(config.log.level, "dealboard=trace");

        apply_env_overrides(&mut config, |k| (k == ENV_OFFLINE).then(|| "0".to_string()));
        assert!(!config.offline);
    }
}
