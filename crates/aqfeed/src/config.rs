//! Configuration management for aqfeed.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    value::{Uncased, UncasedStr},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Directory name under the platform config dir.
const CONFIG_DIR_NAME: &str = "aqfeed";

/// Prefix shared by every environment override.
const ENV_PREFIX: &str = "AIRQO_";

/// Environment variable holding the API token.
pub const TOKEN_ENV: &str = "AIRQO_TOKEN";

/// Environment variable holding the cohort id.
pub const COHORT_ENV: &str = "AIRQO_COHORT_ID";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (`AIRQO_TOKEN`, `AIRQO_COHORT_ID`, and
///    `AIRQO_<SECTION>__<KEY>` for everything else)
/// 2. TOML config file at `~/.config/aqfeed/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sensor API configuration.
    pub api: ApiConfig,
    /// Snapshot and archive output configuration.
    pub archive: ArchiveConfig,
    /// Widget rendering configuration.
    pub widget: WidgetConfig,
}

/// Sensor API configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the AirQo v2 API.
    pub base_url: String,
    /// Bearer token.
    pub token: Option<String>,
    /// Cohort whose device measurements are fetched.
    pub cohort_id: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

/// Output file configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Where the raw latest response is written.
    pub snapshot_path: PathBuf,
    /// Append-only CSV archive of readings.
    pub csv_path: PathBuf,
}

/// Widget configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetConfig {
    /// Heading shown above the readings.
    pub title: String,
    /// Static text shown when live data cannot be displayed.
    pub fallback_message: String,
    /// Maximum number of readings shown.
    pub max_readings: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.airqo.net/api/v2".to_string(),
            token: None,
            cohort_id: None,
            timeout_secs: 45,
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("data/uganda_recent.json"),
            csv_path: PathBuf::from("data/uganda_pm25_archive.csv"),
        }
    }
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            title: "Live air quality".to_string(),
            fallback_message: "Live air-quality data is currently unavailable.".to_string(),
            max_readings: 12,
        }
    }
}

/// Map an environment key (prefix already stripped) to a config path.
fn env_key(key: &UncasedStr) -> Uncased<'_> {
    let key = key.as_str().to_ascii_lowercase();
    match key.as_str() {
        "token" => "api.token".into(),
        "cohort_id" => "api.cohort_id".into(),
        _ => key.replace("__", ".").into(),
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).map(env_key));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Validate the configuration.
    ///
    /// Credentials are not checked here; they are only required by commands
    /// that talk to the API.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if !(self.api.base_url.starts_with("http://") || self.api.base_url.starts_with("https://"))
        {
            return Err(Error::ConfigValidation {
                message: format!("api.base_url must be an http(s) URL: {}", self.api.base_url),
            });
        }

        if self.api.timeout_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "api.timeout_secs must be greater than 0".to_string(),
            });
        }

        if self.widget.max_readings == 0 {
            return Err(Error::ConfigValidation {
                message: "widget.max_readings must be greater than 0".to_string(),
            });
        }

        if self.widget.fallback_message.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "widget.fallback_message must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Get the request timeout as a Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    /// The configured token, ignoring surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingCredential`] if no token is set.
    pub fn token(&self) -> Result<&str> {
        non_blank(self.api.token.as_deref()).ok_or(Error::MissingCredential {
            name: "API token",
            env_var: TOKEN_ENV,
        })
    }

    /// The configured cohort id, ignoring surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingCredential`] if no cohort id is set.
    pub fn cohort_id(&self) -> Result<&str> {
        non_blank(self.api.cohort_id.as_deref()).ok_or(Error::MissingCredential {
            name: "cohort id",
            env_var: COHORT_ENV,
        })
    }

    /// The cohort measurements endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the cohort id is not configured.
    pub fn measurements_url(&self) -> Result<String> {
        Ok(format!(
            "{}/devices/measurements/cohorts/{}",
            self.api.base_url.trim_end_matches('/'),
            self.cohort_id()?
        ))
    }

    /// A copy safe to print: the token is masked.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.api.token.is_some() {
            config.api.token = Some("********".to_string());
        }
        config
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
