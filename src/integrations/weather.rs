//! Daily weather summaries from the Open-Meteo historical archive.
//!
//! No credentials are needed. A user may override the configured location with the
//! optional `latitude`, `longitude`, and `timezone` parameters under
//! `/<namespace>/open-meteo/<user>/`.

use super::resilient_http::{HttpRequest, read_json, resilient_send};
use super::{Integration, IntegrationContext, WeatherDefaults};
use crate::Error;
use crate::date_range::resolve_at;
use crate::points::{DataPoint, FieldValue, PointValue};
use crate::secrets::optional;
use async_trait::async_trait;
use chrono::NaiveDate;
use ohno::{IntoAppError, app_err};
use serde::Deserialize;

const LOG_TARGET: &str = "   weather";

pub const METRIC: &str = "weather";
pub const PROVIDER: &str = "open-meteo";

/// Daily variables requested from the archive, and the field each is stored under.
const DAILY_FIELDS: [(&str, &str); 7] = [
    ("temperature_2m_max", "temp_max"),
    ("temperature_2m_min", "temp_min"),
    ("relative_humidity_2m_mean", "humidity_mean"),
    ("surface_pressure_mean", "pressure_mean"),
    ("precipitation_sum", "precipitation"),
    ("wind_speed_10m_max", "wind_max"),
    ("sunshine_duration", "sunshine_duration"),
];

#[derive(Deserialize)]
struct ArchiveResponse {
    #[serde(default)]
    daily: Daily,
}

#[derive(Deserialize, Default)]
struct Daily {
    #[serde(default)]
    time: Vec<String>,

    #[serde(flatten)]
    series: std::collections::HashMap<String, serde_json::Value>,
}

impl Daily {
    /// Value of `variable` on day `index`; missing or null values read as 0.
    fn value(&self, variable: &str, index: usize) -> f64 {
        self.series
            .get(variable)
            .and_then(|series| series.get(index))
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(0.0)
    }
}

/// Weather for one user's location.
#[derive(Debug)]
pub struct WeatherIntegration {
    context: IntegrationContext,
    user_id: String,
    location: WeatherDefaults,
}

impl WeatherIntegration {
    pub fn new(context: &IntegrationContext, user_id: &str) -> Result<Self, Error> {
        let mut location = context.weather.clone();

        if let Some(latitude) = coordinate(context, user_id, "latitude", 90.0)? {
            location.latitude = latitude;
        }

        if let Some(longitude) = coordinate(context, user_id, "longitude", 180.0)? {
            location.longitude = longitude;
        }

        let tz_path = context.secret_path(PROVIDER, user_id, "timezone");
        if let Some(timezone) = optional(context.secrets.as_ref(), &tz_path)? {
            location.timezone = timezone.trim().to_string();
        }

        Ok(Self {
            context: context.clone(),
            user_id: user_id.to_string(),
            location,
        })
    }
}

fn coordinate(context: &IntegrationContext, user_id: &str, name: &str, limit: f64) -> Result<Option<f64>, Error> {
    let path = context.secret_path(PROVIDER, user_id, name);
    let Some(raw) = optional(context.secrets.as_ref(), &path)? else {
        return Ok(None);
    };

    let value = raw
        .trim()
        .parse::<f64>()
        .into_app_err_with(|| format!("parameter '{path}' is not a number: '{raw}'"))
        .map_err(Error::Validation)?;

    if !(-limit..=limit).contains(&value) {
        return Err(Error::Validation(app_err!("parameter '{path}' must be between -{limit} and {limit}, got {value}")));
    }

    Ok(Some(value))
}

#[async_trait]
impl Integration for WeatherIntegration {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    async fn fetch(&self, since: Option<&str>, until: Option<&str>) -> Result<Vec<DataPoint>, Error> {
        let now = self.context.now();
        let range = resolve_at(since, until, now)?;

        let start = range.start_date().format("%Y-%m-%d").to_string();
        let end = range.end_date().format("%Y-%m-%d").to_string();
        log::info!(target: LOG_TARGET, "Fetching weather for '{}' from {start} to {end}", self.user_id);

        if range.is_empty() {
            return Ok(Vec::new());
        }

        let daily = DAILY_FIELDS.map(|(variable, _)| variable).join(",");
        let url = format!("{}/v1/archive", self.context.endpoints.open_meteo);
        let request = HttpRequest::get(url).query([
            ("latitude", self.location.latitude.to_string()),
            ("longitude", self.location.longitude.to_string()),
            ("start_date", start),
            ("end_date", end),
            ("daily", daily),
            ("timezone", self.location.timezone.clone()),
        ]);

        let response: ArchiveResponse = read_json(resilient_send(&self.context.client, &self.context.retry, request).await?).await?;
        let daily = response.daily;

        let mut points = Vec::with_capacity(daily.time.len());
        for (index, day) in daily.time.iter().enumerate() {
            let date = NaiveDate::parse_from_str(day, "%Y-%m-%d")
                .into_app_err_with(|| format!("invalid date '{day}' in weather response"))
                .map_err(Error::Transport)?;

            let value = PointValue::record(
                DAILY_FIELDS
                    .iter()
                    .map(|(variable, field)| (*field, FieldValue::Number(daily.value(variable, index)))),
            );

            log::debug!(target: LOG_TARGET, "Fetched weather for {date}");
            points.push(DataPoint::new(date, value, now));
        }

        log::info!(target: LOG_TARGET, "Fetched {} weather data point(s) for '{}'", points.len(), self.user_id);
        Ok(points)
    }
}
