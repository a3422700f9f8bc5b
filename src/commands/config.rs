use crate::Result;
use crate::integrations::{Endpoints, WeatherDefaults};
use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use ohno::{IntoAppError, app_err};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;

/// The default configuration TOML content, embedded from `default_config.toml`
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../../default_config.toml");

/// Name of the configuration file looked for in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "life-stats.toml";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// First component of every secret path
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// User reported when no user has completed a run yet
    #[serde(default = "default_user")]
    pub default_user: String,

    /// Directory holding the metrics and run tables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<Utf8PathBuf>,

    /// TOML file of secret path -> value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets_file: Option<Utf8PathBuf>,

    /// Whether secrets missing from the file are looked up in the environment
    #[serde(default = "default_secrets_from_env")]
    pub secrets_from_env: bool,

    /// Number of (metric, user) pairs processed at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Timeout for each HTTP request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub endpoints: Endpoints,

    #[serde(default)]
    pub weather: WeatherDefaults,
}

fn default_namespace() -> String {
    "life-stats".to_string()
}

fn default_user() -> String {
    crate::store::DEFAULT_USER.to_string()
}

const fn default_secrets_from_env() -> bool {
    true
}

const fn default_concurrency() -> usize {
    1
}

const fn default_request_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Load configuration from a file or use defaults
    ///
    /// Without an explicit path, `life-stats.toml` in `base_dir` is used if it exists.
    pub fn load(base_dir: &Utf8Path, config_path: Option<&Utf8PathBuf>) -> Result<Self> {
        let (final_path, text) = if let Some(path) = config_path {
            let text = fs::read_to_string(path).into_app_err_with(|| format!("reading configuration file '{path}'"))?;
            (path.clone(), text)
        } else {
            let path = base_dir.join(DEFAULT_CONFIG_FILE);
            match fs::read_to_string(&path) {
                Ok(text) => (path, text),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Ok(Self::default());
                }
                Err(e) => return Err(e).into_app_err_with(|| format!("reading configuration file '{path}'")),
            }
        };

        let config: Self = toml::from_str(&text).into_app_err_with(|| format!("parsing configuration file '{final_path}'"))?;
        config.validate()?;

        Ok(config)
    }

    /// Save the default configuration to a TOML file
    pub fn save_default(output_path: &Utf8Path) -> Result<()> {
        fs::write(output_path, DEFAULT_CONFIG_TOML).into_app_err_with(|| format!("writing default configuration to {output_path}"))?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() || self.namespace.contains('/') {
            return Err(app_err!("namespace must be a non-empty name without '/', got '{}'", self.namespace));
        }

        if self.default_user.trim().is_empty() {
            return Err(app_err!("default_user must not be empty"));
        }

        if self.concurrency == 0 {
            return Err(app_err!("concurrency must be at least 1"));
        }

        if self.request_timeout_secs == 0 {
            return Err(app_err!("request_timeout_secs must be at least 1"));
        }

        if !(-90.0..=90.0).contains(&self.weather.latitude) {
            return Err(app_err!("weather.latitude must be between -90 and 90, got {}", self.weather.latitude));
        }

        if !(-180.0..=180.0).contains(&self.weather.longitude) {
            return Err(app_err!(
                "weather.longitude must be between -180 and 180, got {}",
                self.weather.longitude
            ));
        }

        if self.weather.timezone.trim().is_empty() {
            return Err(app_err!("weather.timezone must not be empty"));
        }

        Ok(())
    }

    /// The configured data directory, or `life-stats` under the platform data directory
    pub fn data_dir(&self) -> Result<Utf8PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }

        let dir = BaseDirs::new()
            .into_app_err("could not determine the data directory")?
            .data_dir()
            .join("life-stats");

        Utf8PathBuf::from_path_buf(dir).map_err(|p| app_err!("data directory '{}' is not valid UTF-8", p.display()))
    }
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG_TOML).expect("default_config.toml should be valid TOML that deserializes to Config")
    }
}
