//! Per-user credential and configuration lookup
//!
//! Integrations resolve their credentials when they are constructed, from parameters named
//! `/<namespace>/<provider>/<user_id>/<credential>`. The [`ParameterStore`] serves these
//! from a TOML file and, optionally, from environment variables.

use crate::{Error, Result};
use camino::Utf8Path;
use ohno::{IntoAppError, app_err};
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::sync::Arc;

const LOG_TARGET: &str = "   secrets";

/// Source of per-user secrets.
pub trait SecretStore: Send + Sync + core::fmt::Debug {
    /// Look up a parameter by path. Returns `Ok(None)` if it does not exist.
    fn get(&self, path: &str) -> Result<Option<String>>;
}

/// Build the parameter path for a provider credential.
#[must_use]
pub fn secret_path(namespace: &str, provider: &str, user_id: &str, credential: &str) -> String {
    format!("/{namespace}/{provider}/{user_id}/{credential}")
}

/// Fetch a parameter that must exist, classifying any failure as a credential error.
pub fn require(store: &dyn SecretStore, path: &str) -> Result<String, Error> {
    match store.get(path) {
        Ok(Some(value)) if !value.trim().is_empty() => Ok(value),
        Ok(_) => Err(Error::Credential(app_err!("parameter '{path}' not found"))),
        Err(e) => Err(Error::Credential(e)),
    }
}

/// Fetch a parameter that may be absent.
pub fn optional(store: &dyn SecretStore, path: &str) -> Result<Option<String>, Error> {
    store.get(path).map_err(Error::Credential)
}

/// Reads one environment variable.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<OsString> + Send + Sync>;

/// Map-backed secret store.
#[derive(Default, Clone)]
pub struct ParameterStore {
    values: HashMap<String, String>,
    env: Option<EnvLookup>,
}

impl core::fmt::Debug for ParameterStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // values are secrets
        f.debug_struct("ParameterStore")
            .field("parameters", &self.values.len())
            .field("env_fallback", &self.env.is_some())
            .finish()
    }
}

impl ParameterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load parameters from a TOML file whose top-level keys are parameter paths.
    ///
    /// ```toml
    /// "/life-stats/clickup/alice/token" = "pk_123"
    /// ```
    pub fn from_file(path: &Utf8Path) -> Result<Self> {
        let text = fs::read_to_string(path).into_app_err_with(|| format!("reading secrets file '{path}'"))?;
        let values: HashMap<String, String> = toml::from_str(&text).into_app_err_with(|| format!("parsing secrets file '{path}'"))?;

        log::debug!(target: LOG_TARGET, "Loaded {} parameter(s) from '{path}'", values.len());

        Ok(Self { values, env: None })
    }

    /// Also consult the process environment for parameters missing from the map.
    #[must_use]
    pub fn with_env_fallback(self, enabled: bool) -> Self {
        if enabled {
            self.with_env_lookup(|name: &str| std::env::var_os(name))
        } else {
            Self { env: None, ..self }
        }
    }

    /// Consult `lookup` for parameters missing from the map, passing it the variable name.
    #[must_use]
    pub fn with_env_lookup(mut self, lookup: impl Fn(&str) -> Option<OsString> + Send + Sync + 'static) -> Self {
        self.env = Some(Arc::new(lookup));
        self
    }

    #[must_use]
    pub fn with(mut self, path: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.values.insert(path.into(), value.into());
        self
    }
}

impl SecretStore for ParameterStore {
    fn get(&self, path: &str) -> Result<Option<String>> {
        if let Some(value) = self.values.get(path) {
            return Ok(Some(value.clone()));
        }

        let Some(lookup) = &self.env else {
            return Ok(None);
        };

        let var = env_var_name(path);
        let Some(raw) = lookup(&var) else {
            return Ok(None);
        };

        let value = raw
            .into_string()
            .map_err(|raw| app_err!("environment variable {var} is not valid unicode: {}", raw.display()))?;
        log::debug!(target: LOG_TARGET, "Resolved '{path}' from environment variable {var}");
        Ok(Some(value))
    }
}

/// `/life-stats/clickup/alice/list-id` becomes `LIFE_STATS_CLICKUP_ALICE_LIST_ID`.
fn env_var_name(path: &str) -> String {
    path.trim_start_matches('/')
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}
