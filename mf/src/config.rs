//! multifetch configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::scheduler::SchedulerConfig;

/// Main multifetch configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Scheduler limits and toggles
    pub scheduler: SchedulerConfig,

    /// HTTP client settings
    pub http: HttpConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .multifetch.yml
        let local_config = PathBuf::from(".multifetch.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/multifetch/multifetch.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("multifetch").join("multifetch.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates = [
            config_path.cloned(),
            Some(PathBuf::from(".multifetch.yml")),
            dirs::config_dir().map(|d| d.join("multifetch").join("multifetch.yml")),
        ];
        candidates
            .iter()
            .flatten()
            .find(|p| p.exists())
            .and_then(|p| Self::load_from_file(p).ok())
            .and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// HTTP client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Whole-request timeout in milliseconds (0 disables)
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Connect timeout in milliseconds (0 disables)
    #[serde(rename = "connect-timeout-ms")]
    pub connect_timeout_ms: u64,

    /// User-Agent header sent with every request
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Redirects followed before giving up (0 disables following)
    #[serde(rename = "max-redirects")]
    pub max_redirects: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            user_agent: format!("multifetch/{}", env!("CARGO_PKG_VERSION")),
            max_redirects: 10,
        }
    }
}

impl HttpConfig {
    /// Build the shared reqwest client
    pub fn build_client(&self) -> Result<reqwest::Client> {
        let redirect = if self.max_redirects == 0 {
            reqwest::redirect::Policy::none()
        } else {
            reqwest::redirect::Policy::limited(self.max_redirects)
        };

        let mut builder = reqwest::Client::builder().user_agent(&self.user_agent).redirect(redirect);
        if self.timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(self.timeout_ms));
        }
        if self.connect_timeout_ms > 0 {
            builder = builder.connect_timeout(Duration::from_millis(self.connect_timeout_ms));
        }
        builder.build().context("Failed to build HTTP client")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.scheduler.max_concurrent, 10);
        assert_eq!(config.http.timeout_ms, 30_000);
        assert!(config.http.user_agent.starts_with("multifetch/"));
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "log-level: debug\nscheduler:\n  max-concurrent: 4\n  auto-close-handles: false\nhttp:\n  timeout-ms: 500\n"
        )
        .unwrap();

        let path = file.path().to_path_buf();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.scheduler.max_concurrent, 4);
        assert!(!config.scheduler.auto_close_handles);
        assert!(config.scheduler.parse_headers);
        assert_eq!(config.http.timeout_ms, 500);
        assert_eq!(config.http.max_redirects, 10);

        assert_eq!(Config::load_log_level(Some(&path)).as_deref(), Some("debug"));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let path = PathBuf::from("/nonexistent/multifetch.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_build_client() {
        let http = HttpConfig {
            max_redirects: 0,
            timeout_ms: 0,
            ..Default::default()
        };
        assert!(http.build_client().is_ok());
    }
}
