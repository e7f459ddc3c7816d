//! Bootstrap configuration loading and config file resolution
//!
//! Settings sources, highest priority first:
//! 1. Command-line argument / environment variable (handled by the binary via clap)
//! 2. TOML config file
//! 3. Compiled defaults
//!
//! A missing config file is not an error: the service logs a warning and
//! starts with defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "LAUD_CONFIG";

/// Top-level TOML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// HTTP server port
    pub port: u16,

    /// Address the HTTP server binds to
    pub bind_address: String,

    /// Where `GET /` redirects browsers
    pub site_url: String,

    /// Ingress admission (rate limit) settings
    pub rate_limits: RateLimitConfig,

    /// Gateway session settings
    pub gateway: GatewayConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            bind_address: "0.0.0.0".to_string(),
            site_url: "https://laudiolin.seikimo.moe".to_string(),
            rate_limits: RateLimitConfig::default(),
            gateway: GatewayConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Outcome applied when an admission decision cannot be computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailMode {
    /// Let the request through
    Open,
    /// Reject the request as rate limited
    Closed,
}

/// Per-client rate limit settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Request count at which a client is blocked
    pub max_requests: u32,

    /// Sweep period: counts below the limit decay, the rest are blocked
    #[serde(with = "humantime_serde")]
    pub within_window: Duration,

    /// Period after which the whole block list is cleared
    #[serde(with = "humantime_serde")]
    pub reset_window: Duration,

    /// Addresses never limited
    pub exempt: Vec<IpAddr>,

    /// Decision when the client address or limiter state is unavailable
    pub fail_mode: FailMode,

    /// Take the client address from `X-Forwarded-For` instead of the peer
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            within_window: Duration::from_secs(60),
            reset_window: Duration::from_secs(300),
            exempt: vec![IpAddr::from([127, 0, 0, 1])],
            fail_mode: FailMode::Open,
            trust_forwarded_for: false,
        }
    }
}

/// Gateway session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Upper bound an HTTP handler waits for a queue response
    #[serde(with = "humantime_serde")]
    pub queue_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            queue_timeout: Duration::from_secs(5),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Reject values the services cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.rate_limits.max_requests == 0 {
            return Err(Error::Config(
                "rate_limits.max_requests must be at least 1".to_string(),
            ));
        }
        if self.rate_limits.within_window.is_zero() {
            return Err(Error::Config(
                "rate_limits.within_window must be non-zero".to_string(),
            ));
        }
        if self.rate_limits.reset_window.is_zero() {
            return Err(Error::Config(
                "rate_limits.reset_window must be non-zero".to_string(),
            ));
        }
        if self.gateway.queue_timeout.is_zero() {
            return Err(Error::Config(
                "gateway.queue_timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Locates the config file for a service
///
/// Resolution order:
/// 1. Explicit path (command line)
/// 2. `LAUD_CONFIG` environment variable
/// 3. `<user config dir>/laudiolin/config.toml`
/// 4. `/etc/laudiolin/config.toml` (Unix)
pub struct ConfigResolver {
    explicit: Option<PathBuf>,
}

impl ConfigResolver {
    /// Create resolver with an optional command-line path
    pub fn new(explicit: Option<PathBuf>) -> Self {
        Self { explicit }
    }

    /// Return the first candidate path that should be used, if any
    pub fn resolve(&self) -> Option<PathBuf> {
        if let Some(path) = &self.explicit {
            return Some(path.clone());
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        let user_config = dirs::config_dir().map(|d| d.join("laudiolin").join("config.toml"));
        if let Some(path) = user_config {
            if path.exists() {
                return Some(path);
            }
        }

        if cfg!(unix) {
            let system_config = PathBuf::from("/etc/laudiolin/config.toml");
            if system_config.exists() {
                return Some(system_config);
            }
        }

        None
    }

    /// Load the resolved config, falling back to defaults when no file exists
    ///
    /// An explicitly named file that is missing or malformed is an error;
    /// an absent default location is not.
    pub fn load(&self) -> Result<TomlConfig> {
        match self.resolve() {
            Some(path) if path.exists() => TomlConfig::load(&path),
            Some(path) => Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            ))),
            None => Ok(TomlConfig::default()),
        }
    }
}
