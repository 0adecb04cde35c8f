//! Host configuration
//!
//! Which worker library to load, where to look for more, how loud to log and how
//! media jobs treat failed frames.

use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use workerlink_host::{FrameFailurePolicy, DEFAULT_WORKER_LIBRARY, WORKER_LIBRARY_ENV};

/// Embedded default configuration file
const DEFAULT_CONFIG: &str = include_str!("../../workerlink.config.toml");

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "workerlink.config.toml";

/// Environment variable pointing at an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "WORKERLINK_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct HostConfig {
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub media: MediaConfig,
}

impl HostConfig {
    /// Load configuration from the first file found, else the embedded default
    ///
    /// Looks in the current directory, then `~/.workerlink/`, then the file named
    /// by `WORKERLINK_CONFIG`. Unlike [`HostConfig::load_from_file`] nothing is
    /// written to disk.
    pub fn load() -> Result<Self> {
        if let Ok(content) = std::fs::read_to_string(CONFIG_FILE_NAME) {
            return toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", CONFIG_FILE_NAME));
        }

        if let Some(base_dirs) = BaseDirs::new() {
            let home_config = base_dirs
                .home_dir()
                .join(".workerlink")
                .join(CONFIG_FILE_NAME);
            if let Ok(content) = std::fs::read_to_string(&home_config) {
                return toml::from_str(&content)
                    .with_context(|| format!("Failed to parse {}", home_config.display()));
            }
        }

        if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
            if let Ok(content) = std::fs::read_to_string(&config_path) {
                return toml::from_str(&content)
                    .with_context(|| format!("Failed to parse {}", config_path));
            }
        }

        Self::embedded_default()
    }

    /// Load configuration from a specific file path
    /// If the file doesn't exist, creates it with default settings
    pub fn load_from_file(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                eprintln!(
                    "Configuration file not found at {}. Creating with default settings...",
                    path.display()
                );

                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)
                            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
                    }
                }
                std::fs::write(path, DEFAULT_CONFIG)
                    .with_context(|| format!("Failed to create config file at {}", path.display()))?;

                Self::embedded_default()
            }
            Err(e) => Err(e).with_context(|| format!("Failed to read config file {}", path.display())),
        }
    }

    pub fn embedded_default() -> Result<Self> {
        toml::from_str(DEFAULT_CONFIG).context("Failed to parse embedded default config")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.worker.library.trim().is_empty() {
            return Err(anyhow::anyhow!("Worker library path cannot be empty"));
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(anyhow::anyhow!("Invalid log level: {}", self.logging.level)),
        }

        self.media
            .frame_failure_policy
            .parse::<FrameFailurePolicy>()
            .map_err(|e| anyhow::anyhow!(e))?;

        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    pub fn apply_env_overrides(&mut self) {
        fn non_empty(key: &str) -> Option<String> {
            std::env::var(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        if let Some(library) = non_empty(WORKER_LIBRARY_ENV) {
            self.worker.library = library;
        }
        if let Some(directory) = non_empty("WORKERLINK_WORKER_DIR") {
            self.worker.directory = Some(directory);
        }
        if let Some(level) = non_empty("WORKERLINK_LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }
        if let Some(policy) = non_empty("WORKERLINK_FRAME_FAILURE_POLICY") {
            self.media.frame_failure_policy = policy.to_lowercase();
        }
    }

    /// Worker library path with `~` expanded
    pub fn library_path(&self) -> PathBuf {
        workerlink_host::expand_tilde(Path::new(&self.worker.library))
    }

    /// Worker directory with `~` expanded, if configured
    pub fn worker_directory(&self) -> Option<PathBuf> {
        self.worker
            .directory
            .as_deref()
            .map(|d| workerlink_host::expand_tilde(Path::new(d)))
    }

    /// Frame failure policy; call [`HostConfig::validate`] first
    pub fn frame_failure_policy(&self) -> FrameFailurePolicy {
        self.media.frame_failure_policy.parse().unwrap_or_default()
    }

    /// Get a summary of the configuration
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str("Configuration loaded:\n");
        summary.push_str(&format!("Worker Library: {}\n", self.worker.library));
        if let Some(directory) = &self.worker.directory {
            summary.push_str(&format!("Worker Directory: {}\n", directory));
        }
        summary.push_str(&format!("Logging Level: {}\n", self.logging.level));
        summary.push_str(&format!(
            "Frame Failure Policy: {}\n",
            self.media.frame_failure_policy
        ));
        summary
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerConfig {
    /// Library loaded for single-worker commands
    #[serde(default = "default_library")]
    pub library: String,
    /// Directory scanned for worker libraries
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_library() -> String {
    DEFAULT_WORKER_LIBRARY.to_string()
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            library: default_library(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaConfig {
    /// `skip` or `abort`
    #[serde(default = "default_policy")]
    pub frame_failure_policy: String,
}

fn default_policy() -> String {
    "skip".to_string()
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            frame_failure_policy: default_policy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_default_is_valid() {
        let config = HostConfig::embedded_default().unwrap();
        assert_eq!(DEFAULT_WORKER_LIBRARY, config.worker.library);
        assert_eq!("info", config.logging.level);
        assert_eq!(FrameFailurePolicy::Skip, config.frame_failure_policy());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config: HostConfig = toml::from_str("[logging]\nlevel = \"debug\"\n").unwrap();
        assert_eq!(WorkerConfig::default(), config.worker);
        assert_eq!(MediaConfig::default(), config.media);
        assert_eq!("debug", config.logging.level);
    }

    #[test]
    fn test_summary_lists_settings() {
        let summary = HostConfig::default().summary();
        assert!(summary.contains("Worker Library: libworker.so"));
        assert!(summary.contains("Frame Failure Policy: skip"));
        assert!(!summary.contains("Worker Directory"));
    }
}
