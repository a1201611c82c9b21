use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::retry::{RetryConfig, RetrySettings};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub autosave_interval_secs: u64,
    pub tick_interval_ms: u64,
    pub warning_seconds: Option<u64>,
    pub save_retry: RetrySettings,
    pub submit_retry: RetrySettings,
    pub data_dir: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            autosave_interval_secs: 15,
            tick_interval_ms: 1000,
            warning_seconds: Some(120),
            save_retry: RetrySettings::default(),
            submit_retry: (&RetryConfig::for_submission()).into(),
            data_dir: None,
            log_file: None,
        }
    }
}

impl SessionConfig {
    /// Reads `path` if given, else the per-user config file if present,
    /// else falls back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let candidate = match path {
            Some(p) => Some(p.to_path_buf()),
            None => project_dirs()
                .map(|d| d.config_dir().join("config.yaml"))
                .filter(|p| p.exists()),
        };
        let Some(file) = candidate else {
            return Ok(Self::default());
        };
        let content = fs::read_to_string(&file).map_err(|source| ConfigError::Io {
            path: file.clone(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml { path: file, source })
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs.max(1))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(10))
    }

    pub fn save_retry(&self) -> RetryConfig {
        (&self.save_retry).into()
    }

    pub fn submit_retry(&self) -> RetryConfig {
        (&self.submit_retry).into()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .or_else(|| project_dirs().map(|d| d.data_dir().to_path_buf()))
            .unwrap_or_else(|| PathBuf::from(".quizsession"))
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.data_dir().join("session.log"))
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "quizsession")
}
