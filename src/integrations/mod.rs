//! Data sources
//!
//! Each data source implements [`Integration`]. An instance is bound to a single user and
//! resolves that user's credentials when it is constructed, so a user with missing
//! credentials fails loudly instead of quietly producing no data. [`Integration::fetch`]
//! resolves the fetch window with [`crate::date_range`], calls the provider, and maps the
//! provider's response into [`DataPoint`]s.
//!
//! Integrations never turn a failure into an empty result: no points means "no activity",
//! not "fetch failed".
//!
//! Built-in sources:
//!
//! - [`steps`]: daily step counts from Google Fit
//! - [`weather`]: daily weather summaries from the Open-Meteo archive
//! - [`tasks`]: hours spent per task type from ClickUp, one metric per task type
//!
//! New sources are added through the [`Registry`] without touching the orchestrator.

mod registry;
mod resilient_http;
pub mod steps;
pub mod tasks;
pub mod weather;

use crate::Error;
use crate::points::DataPoint;
use crate::secrets::SecretStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use registry::{Constructor, Registry};
pub use resilient_http::RetryPolicy;

/// A per-user data source.
#[async_trait]
pub trait Integration: Send + Sync + core::fmt::Debug {
    /// The user this instance fetches data for.
    fn user_id(&self) -> &str;

    /// Fetch the points for the window described by `since` and `until`.
    ///
    /// See [`crate::date_range::resolve`] for how the two strings are interpreted. Calling
    /// this twice for the same window yields the same points, apart from their timestamps.
    async fn fetch(&self, since: Option<&str>, until: Option<&str>) -> Result<Vec<DataPoint>, Error>;
}

/// Base URLs of the provider APIs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Endpoints {
    #[serde(default = "default_google_fit")]
    pub google_fit: String,

    /// Used to refresh Google access tokens when the stored token does not name one.
    #[serde(default = "default_google_token")]
    pub google_token: String,

    #[serde(default = "default_open_meteo")]
    pub open_meteo: String,

    #[serde(default = "default_clickup")]
    pub clickup: String,
}

fn default_google_fit() -> String {
    "https://www.googleapis.com/fitness/v1".to_string()
}

fn default_google_token() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_open_meteo() -> String {
    "https://archive-api.open-meteo.com".to_string()
}

fn default_clickup() -> String {
    "https://api.clickup.com/api/v2".to_string()
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            google_fit: default_google_fit(),
            google_token: default_google_token(),
            open_meteo: default_open_meteo(),
            clickup: default_clickup(),
        }
    }
}

impl Endpoints {
    /// Point every provider at the same base URL.
    #[must_use]
    pub fn all(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            google_fit: base.clone(),
            google_token: format!("{base}/token"),
            open_meteo: base.clone(),
            clickup: base,
        }
    }
}

/// Location used for weather when a user has not configured their own.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WeatherDefaults {
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
}

impl Default for WeatherDefaults {
    // Eau Claire, Calgary
    fn default() -> Self {
        Self {
            latitude: 51.05306,
            longitude: -114.07139,
            timezone: "America/Edmonton".to_string(),
        }
    }
}

/// Everything an integration needs besides its user id.
#[derive(Debug, Clone)]
pub struct IntegrationContext {
    pub client: reqwest::Client,
    pub secrets: Arc<dyn SecretStore>,

    /// First component of every secret path.
    pub namespace: String,

    pub endpoints: Endpoints,
    pub weather: WeatherDefaults,
    pub retry: RetryPolicy,

    /// Fixed "now" for deterministic window resolution.
    pub fixed_now: Option<DateTime<Utc>>,
}

impl IntegrationContext {
    #[must_use]
    pub fn new(client: reqwest::Client, secrets: Arc<dyn SecretStore>, namespace: impl Into<String>) -> Self {
        Self {
            client,
            secrets,
            namespace: namespace.into(),
            endpoints: Endpoints::default(),
            weather: WeatherDefaults::default(),
            retry: RetryPolicy::default(),
            fixed_now: None,
        }
    }

    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    #[must_use]
    pub fn with_weather(mut self, weather: WeatherDefaults) -> Self {
        self.weather = weather;
        self
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub const fn with_fixed_now(mut self, now: DateTime<Utc>) -> Self {
        self.fixed_now = Some(now);
        self
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.fixed_now.unwrap_or_else(Utc::now)
    }

    /// Path of a per-user parameter for `provider`.
    #[must_use]
    pub fn secret_path(&self, provider: &str, user_id: &str, credential: &str) -> String {
        crate::secrets::secret_path(&self.namespace, provider, user_id, credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::ParameterStore;

    #[test]
    fn test_endpoints_all_share_base() {
        let endpoints = Endpoints::all("http://127.0.0.1:4000/");
        assert_eq!(endpoints.google_fit, "http://127.0.0.1:4000");
        assert_eq!(endpoints.google_token, "http://127.0.0.1:4000/token");
        assert_eq!(endpoints.clickup, "http://127.0.0.1:4000");
    }

    #[test]
    fn test_context_secret_path_uses_namespace() {
        let ctx = IntegrationContext::new(reqwest::Client::new(), Arc::new(ParameterStore::new()), "life-stats");
        assert_eq!(ctx.secret_path("clickup", "alice", "token"), "/life-stats/clickup/alice/token");
    }

    #[test]
    fn test_fixed_now() {
        let now = DateTime::parse_from_rfc3339("2026-01-20T12:00:00Z").unwrap().with_timezone(&Utc);
        let ctx = IntegrationContext::new(reqwest::Client::new(), Arc::new(ParameterStore::new()), "ns").with_fixed_now(now);
        assert_eq!(ctx.now(), now);
    }
}
