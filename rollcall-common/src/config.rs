//! Configuration loading and resolution
//!
//! Every setting resolves with the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Default job service base URL
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5056/api";
/// Seconds between status queries
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
/// Wall-clock budget for one import session (30 minutes)
pub const DEFAULT_IMPORT_DEADLINE_SECS: u64 = 30 * 60;
/// Back-to-back failed status queries tolerated before giving up
pub const DEFAULT_MAX_CONSECUTIVE_POLL_ERRORS: u32 = 5;
/// Timeout for status and commit requests
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
/// Timeout for the document upload request
pub const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 600;

/// Environment variable overriding the job service base URL
pub const API_URL_ENV: &str = "ROLLCALL_API_URL";
/// Environment variable carrying the bearer token
pub const AUTH_TOKEN_ENV: &str = "ROLLCALL_AUTH_TOKEN";

/// Logging section of the TOML file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, e.g. "rollcall_import=debug"
    pub level: Option<String>,
}

/// On-disk configuration; every field is optional
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TomlConfig {
    pub api_base_url: Option<String>,
    pub auth_token: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub import_deadline_secs: Option<u64>,
    pub max_consecutive_poll_errors: Option<u32>,
    pub request_timeout_secs: Option<u64>,
    pub upload_timeout_secs: Option<u64>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TomlConfig {
    /// Parse a TOML file; the file must exist
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
    }

    /// Load the explicit file if given, otherwise the per-user default file if present.
    ///
    /// A missing default file yields an empty config; a missing explicit file is an error.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            info!("Loading config from {}", path.display());
            return Self::load(path);
        }

        match default_config_path() {
            Some(path) if path.exists() => {
                info!("Loading config from {}", path.display());
                Self::load(&path)
            }
            _ => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Per-user config file location: `<config_dir>/rollcall/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("rollcall").join("config.toml"))
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub api_base_url: Option<String>,
    pub auth_token: Option<String>,
}

/// Fully resolved client configuration
#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub api_base_url: String,
    pub auth_token: Option<String>,
    pub poll_interval: Duration,
    pub import_deadline: Duration,
    pub max_consecutive_poll_errors: u32,
    pub request_timeout: Duration,
    pub upload_timeout: Duration,
    pub log_level: Option<String>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            auth_token: None,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            import_deadline: Duration::from_secs(DEFAULT_IMPORT_DEADLINE_SECS),
            max_consecutive_poll_errors: DEFAULT_MAX_CONSECUTIVE_POLL_ERRORS,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            upload_timeout: Duration::from_secs(DEFAULT_UPLOAD_TIMEOUT_SECS),
            log_level: None,
        }
    }
}

impl ImportConfig {
    /// Merge command line, environment and TOML values over the defaults
    pub fn resolve(cli: &CliOverrides, toml_config: &TomlConfig) -> Result<Self> {
        let defaults = Self::default();

        let api_base_url = resolve_setting(
            cli.api_base_url.as_deref(),
            API_URL_ENV,
            toml_config.api_base_url.as_deref(),
        )
        .unwrap_or(defaults.api_base_url);

        let auth_token = resolve_setting(
            cli.auth_token.as_deref(),
            AUTH_TOKEN_ENV,
            toml_config.auth_token.as_deref(),
        );

        let secs = |value: Option<u64>, fallback: Duration| {
            value.map(Duration::from_secs).unwrap_or(fallback)
        };

        let config = Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            auth_token,
            poll_interval: secs(toml_config.poll_interval_secs, defaults.poll_interval),
            import_deadline: secs(toml_config.import_deadline_secs, defaults.import_deadline),
            max_consecutive_poll_errors: toml_config
                .max_consecutive_poll_errors
                .unwrap_or(defaults.max_consecutive_poll_errors),
            request_timeout: secs(toml_config.request_timeout_secs, defaults.request_timeout),
            upload_timeout: secs(toml_config.upload_timeout_secs, defaults.upload_timeout),
            log_level: toml_config.logging.level.clone(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the import loop meaningless
    pub fn validate(&self) -> Result<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(Error::Config("api_base_url must not be empty".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::Config("poll_interval_secs must be greater than 0".to_string()));
        }
        if self.import_deadline.is_zero() {
            return Err(Error::Config("import_deadline_secs must be greater than 0".to_string()));
        }
        if self.max_consecutive_poll_errors == 0 {
            return Err(Error::Config(
                "max_consecutive_poll_errors must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// First non-blank value in CLI → ENV → TOML order
fn resolve_setting(cli: Option<&str>, env_var: &str, toml_value: Option<&str>) -> Option<String> {
    if let Some(value) = cli.filter(|v| is_present(v)) {
        return Some(value.trim().to_string());
    }

    if let Some(value) = std::env::var(env_var).ok().filter(|v| is_present(v)) {
        debug!("{} taken from environment", env_var);
        return Some(value.trim().to_string());
    }

    toml_value.filter(|v| is_present(v)).map(|v| v.trim().to_string())
}

fn is_present(value: &str) -> bool {
    !value.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn clear_env() {
        std::env::remove_var(API_URL_ENV);
        std::env::remove_var(AUTH_TOKEN_ENV);
    }

    #[test]
    #[serial]
    fn test_defaults_when_nothing_configured() {
        clear_env();
        let config = ImportConfig::resolve(&CliOverrides::default(), &TomlConfig::default()).unwrap();

        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.import_deadline, Duration::from_secs(1800));
        assert_eq!(config.max_consecutive_poll_errors, 5);
        assert!(config.auth_token.is_none());
    }

    #[test]
    #[serial]
    fn test_cli_beats_env_beats_toml() {
        clear_env();
        let toml_config = TomlConfig {
            api_base_url: Some("http://toml:1/api".to_string()),
            auth_token: Some("toml-token".to_string()),
            ..Default::default()
        };

        std::env::set_var(API_URL_ENV, "http://env:2/api/");
        let config = ImportConfig::resolve(&CliOverrides::default(), &toml_config).unwrap();
        assert_eq!(config.api_base_url, "http://env:2/api");
        assert_eq!(config.auth_token.as_deref(), Some("toml-token"));

        let cli = CliOverrides {
            api_base_url: Some("http://cli:3/api".to_string()),
            auth_token: None,
        };
        let config = ImportConfig::resolve(&cli, &toml_config).unwrap();
        assert_eq!(config.api_base_url, "http://cli:3/api");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_blank_token_is_absent() {
        clear_env();
        std::env::set_var(AUTH_TOKEN_ENV, "   ");
        let config = ImportConfig::resolve(&CliOverrides::default(), &TomlConfig::default()).unwrap();
        assert!(config.auth_token.is_none());
        clear_env();
    }

    #[test]
    fn test_load_toml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
api_base_url = "http://10.0.0.2:5056/api"
poll_interval_secs = 2
max_consecutive_poll_errors = 3

[logging]
level = "rollcall_import=debug"
"#
        )
        .unwrap();

        let toml_config = TomlConfig::load(file.path()).unwrap();
        assert_eq!(toml_config.poll_interval_secs, Some(2));
        assert_eq!(toml_config.max_consecutive_poll_errors, Some(3));
        assert_eq!(toml_config.logging.level.as_deref(), Some("rollcall_import=debug"));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result = TomlConfig::load_or_default(Some(Path::new("/nonexistent/rollcall.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    #[serial]
    fn test_zero_budget_rejected() {
        clear_env();
        let toml_config = TomlConfig {
            max_consecutive_poll_errors: Some(0),
            ..Default::default()
        };
        let result = ImportConfig::resolve(&CliOverrides::default(), &toml_config);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
