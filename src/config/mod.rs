//! Configuration management for APSpace

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::{CachingStrategy, PipelineSettings, RetryPolicy};
use crate::error::{ConfigError, Result};
use crate::network::Runtime;
use crate::timetable::DEFAULT_TIMETABLE_URL;

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "APSPACE_CONFIG";

pub const DEFAULT_CAS_URL: &str = "https://cas.apiit.edu.my/cas";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// CAS server base URL
    #[serde(default = "default_cas_url")]
    pub cas_url: String,

    /// Web-service base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Open weekly timetable feed
    #[serde(default = "default_timetable_url")]
    pub timetable_url: String,

    /// Last user to log in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Device runtimes answer GETs from the cache while offline
    #[serde(default)]
    pub runtime: Runtime,

    /// Default caching strategy for GETs
    #[serde(default)]
    pub caching: CachingStrategy,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default = "default_ticket_timeout_secs")]
    pub ticket_timeout_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_cas_url() -> String {
    DEFAULT_CAS_URL.to_string()
}

fn default_api_url() -> String {
    crate::client::pipeline::DEFAULT_API_URL.to_string()
}

fn default_timetable_url() -> String {
    DEFAULT_TIMETABLE_URL.to_string()
}

fn default_ticket_timeout_secs() -> u64 {
    crate::cas::service::DEFAULT_TICKET_TIMEOUT.as_secs()
}

fn default_request_timeout_secs() -> u64 {
    crate::client::pipeline::DEFAULT_REQUEST_TIMEOUT.as_secs()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cas_url: default_cas_url(),
            api_url: default_api_url(),
            timetable_url: default_timetable_url(),
            username: None,
            runtime: Runtime::default(),
            caching: CachingStrategy::default(),
            retry: RetryPolicy::default(),
            ticket_timeout_secs: default_ticket_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::Invalid(
            "Could not determine home directory".to_string(),
        ))?;

        Ok(home.join(".apspace").join("config.yaml"))
    }

    /// Resolve the config path: explicit override, then `APSPACE_CONFIG`,
    /// then the default location
    pub fn resolve_path(path: Option<&str>) -> Result<PathBuf> {
        match path {
            Some(p) => Ok(PathBuf::from(p)),
            None => match std::env::var(CONFIG_ENV) {
                Ok(p) if !p.is_empty() => Ok(PathBuf::from(p)),
                _ => Self::default_path(),
            },
        }
    }

    /// Load configuration; a missing file yields the defaults
    pub fn load_at(path: Option<&str>) -> Result<Self> {
        Self::load_from(Self::resolve_path(path)?)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)?;
        let config: Config = serde_yaml::from_str(&contents).map_err(ConfigError::from)?;
        config.validate()?;

        Ok(config)
    }

    pub fn save_at(&self, path: Option<&str>) -> Result<()> {
        self.save_to(Self::resolve_path(path)?)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents =
            serde_yaml::to_string(self).map_err(|e| ConfigError::SaveError(e.to_string()))?;

        std::fs::write(&path, contents)?;

        // Set file permissions to 600 on Unix systems
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(&path, perms)?;
        }

        Ok(())
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("cas_url", &self.cas_url),
            ("api_url", &self.api_url),
            ("timetable_url", &self.timetable_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!("{} must be an http(s) URL: {}", name, url)).into());
            }
        }
        if self.ticket_timeout_secs == 0 {
            return Err(ConfigError::Invalid("ticket_timeout_secs must be positive".to_string()).into());
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("request_timeout_secs must be positive".to_string()).into());
        }
        Ok(())
    }

    pub fn require_username(&self) -> Result<&str> {
        self.username
            .as_deref()
            .ok_or_else(|| ConfigError::MissingUsername.into())
    }

    pub fn ticket_timeout(&self) -> Duration {
        Duration::from_secs(self.ticket_timeout_secs)
    }

    /// Pipeline settings derived from this configuration
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            api_url: self.api_url.trim_end_matches('/').to_string(),
            retry: self.retry,
            caching: self.caching,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}
