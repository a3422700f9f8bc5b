//! Daily step counts from Google Fit.
//!
//! The user's OAuth token is stored as a JSON document under
//! `/<namespace>/google-fit/<user>/token`:
//!
//! ```json
//! { "token": "...", "refresh_token": "...", "token_uri": "...", "client_id": "...", "client_secret": "..." }
//! ```
//!
//! When a refresh token and client credentials are present, a fresh access token is
//! requested before each fetch. Steps are read with an aggregate query over
//! `com.google.step_count.delta` bucketed by day.

use super::resilient_http::{HttpRequest, read_json, resilient_send, send_once};
use super::{Integration, IntegrationContext};
use crate::Error;
use crate::date_range::{DateRange, resolve_at};
use crate::points::{DataPoint, PointValue};
use crate::secrets::require;
use async_trait::async_trait;
use chrono::DateTime;
use ohno::{IntoAppError, app_err};
use serde::Deserialize;
use serde_json::json;

const LOG_TARGET: &str = "     steps";

pub const METRIC: &str = "steps";
pub const PROVIDER: &str = "google-fit";

const DATA_TYPE: &str = "com.google.step_count.delta";
const DATA_SOURCE: &str = "derived:com.google.step_count.delta:com.google.android.gms:estimated_steps";
const DAY_MILLIS: i64 = 86_400_000;

#[derive(Deserialize)]
struct StoredToken {
    token: Option<String>,
    refresh_token: Option<String>,
    token_uri: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

impl core::fmt::Debug for StoredToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StoredToken")
            .field("has_token", &self.token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct AggregateResponse {
    #[serde(default)]
    bucket: Vec<Bucket>,
}

#[derive(Deserialize)]
struct Bucket {
    #[serde(default)]
    dataset: Vec<Dataset>,
}

#[derive(Deserialize)]
struct Dataset {
    #[serde(default)]
    point: Vec<FitPoint>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FitPoint {
    start_time_nanos: String,

    #[serde(default)]
    value: Vec<FitValue>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FitValue {
    #[serde(default)]
    int_val: Option<u64>,
}

/// Step counts for one user.
#[derive(Debug)]
pub struct StepsIntegration {
    context: IntegrationContext,
    user_id: String,
    credentials: StoredToken,
}

impl StepsIntegration {
    pub fn new(context: &IntegrationContext, user_id: &str) -> Result<Self, Error> {
        let path = context.secret_path(PROVIDER, user_id, "token");
        let raw = require(context.secrets.as_ref(), &path)?;

        let credentials: StoredToken = serde_json::from_str(&raw)
            .into_app_err_with(|| format!("parameter '{path}' is not a valid token document"))
            .map_err(Error::Credential)?;

        if credentials.token.is_none() && credentials.refresh_token.is_none() {
            return Err(Error::Credential(app_err!("parameter '{path}' holds neither an access nor a refresh token")));
        }

        log::info!(target: LOG_TARGET, "Retrieved credentials for user '{user_id}'");

        Ok(Self {
            context: context.clone(),
            user_id: user_id.to_string(),
            credentials,
        })
    }

    async fn access_token(&self) -> Result<String, Error> {
        let creds = &self.credentials;
        if let (Some(refresh_token), Some(client_id), Some(client_secret)) =
            (&creds.refresh_token, &creds.client_id, &creds.client_secret)
        {
            let token_uri = creds.token_uri.as_deref().unwrap_or(&self.context.endpoints.google_token);
            log::debug!(target: LOG_TARGET, "Refreshing access token for user '{}'", self.user_id);

            let request = self.context.client.post(token_uri).form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
            ]);

            let response: TokenResponse = read_json(send_once(request).await?).await?;
            return Ok(response.access_token);
        }

        creds
            .token
            .clone()
            .ok_or_else(|| Error::Credential(app_err!("no access token for user '{}' and no way to refresh one", self.user_id)))
    }

    async fn aggregate(&self, range: &DateRange, token: &str) -> Result<AggregateResponse, Error> {
        let body = json!({
            "aggregateBy": [{
                "dataTypeName": DATA_TYPE,
                "dataSourceId": DATA_SOURCE,
            }],
            "bucketByTime": { "durationMillis": DAY_MILLIS },
            "startTimeMillis": range.start.timestamp_millis(),
            "endTimeMillis": range.end.timestamp_millis(),
        });

        let url = format!("{}/users/me/dataset:aggregate", self.context.endpoints.google_fit);
        let request = HttpRequest::post_json(url, body).bearer(token);
        read_json(resilient_send(&self.context.client, &self.context.retry, request).await?).await
    }
}

#[async_trait]
impl Integration for StepsIntegration {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    async fn fetch(&self, since: Option<&str>, until: Option<&str>) -> Result<Vec<DataPoint>, Error> {
        let now = self.context.now();
        let range = resolve_at(since, until, now)?;
        log::info!(target: LOG_TARGET, "Fetching steps for '{}' from {range}", self.user_id);

        if range.is_empty() {
            return Ok(Vec::new());
        }

        let token = self.access_token().await?;
        let response = self.aggregate(&range, &token).await?;

        let mut points = Vec::new();
        for fit_point in response.bucket.iter().flat_map(|b| &b.dataset).flat_map(|d| &d.point) {
            if fit_point.value.is_empty() {
                continue;
            }

            let nanos = fit_point
                .start_time_nanos
                .parse::<i64>()
                .into_app_err_with(|| format!("invalid startTimeNanos '{}'", fit_point.start_time_nanos))
                .map_err(Error::Transport)?;
            let date = DateTime::from_timestamp_nanos(nanos).date_naive();
            let steps: u64 = fit_point.value.iter().filter_map(|v| v.int_val).sum();

            log::debug!(target: LOG_TARGET, "Fetched steps for {date}: {steps}");
            points.push(DataPoint::new(date, PointValue::Count(steps), now));
        }

        log::info!(target: LOG_TARGET, "Fetched {} step data point(s) for '{}'", points.len(), self.user_id);
        Ok(points)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::integrations::{Endpoints, RetryPolicy};
    use crate::secrets::ParameterStore;
    use chrono::{NaiveDate, Utc};
    use std::sync::Arc;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const NOW: &str = "2026-01-20T12:00:00Z";

    fn context(server: &MockServer, token_json: &str) -> IntegrationContext {
        let secrets = ParameterStore::new().with("/life-stats/google-fit/alice/token", token_json);
        IntegrationContext::new(reqwest::Client::new(), Arc::new(secrets), "life-stats")
            .with_endpoints(Endpoints::all(&server.uri()))
            .with_retry(RetryPolicy {
                max_retries: 2,
                base_delay: core::time::Duration::from_millis(1),
            })
            .with_fixed_now(DateTime::parse_from_rfc3339(NOW).unwrap().with_timezone(&Utc))
    }

    fn nanos(day: &str) -> String {
        let date = NaiveDate::parse_from_str(day, "%Y-%m-%d").unwrap();
        crate::date_range::start_of_day(date).timestamp_nanos_opt().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_daily_buckets_become_points() {
        let server = MockServer::start().await;
        let body = json!({
            "bucket": [
                { "dataset": [{ "point": [{ "startTimeNanos": nanos("2026-01-17"), "value": [{ "intVal": 8000 }, { "intVal": 542 }] }] }] },
                { "dataset": [{ "point": [] }] },
                { "dataset": [{ "point": [{ "startTimeNanos": nanos("2026-01-18"), "value": [] }] }] },
                { "dataset": [{ "point": [{ "startTimeNanos": nanos("2026-01-19"), "value": [{ "intVal": 12 }] }] }] },
            ]
        });

        Mock::given(method("POST"))
            .and(path("/users/me/dataset:aggregate"))
            .and(header("authorization", "Bearer access-123"))
            .and(body_string_contains("com.google.step_count.delta"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(&server)
            .await;

        let integration = StepsIntegration::new(&context(&server, r#"{"token":"access-123"}"#), "alice").unwrap();
        let points = integration.fetch(None, None).await.unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date.to_string(), "2026-01-17");
        assert_eq!(points[0].value, PointValue::Count(8542));
        assert!(points[0].metric_type.is_none());
        assert_eq!(points[1].value, PointValue::Count(12));
    }

    #[tokio::test]
    async fn test_refresh_token_used_when_present() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "fresh" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/users/me/dataset:aggregate"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "bucket": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let token = r#"{"token":"stale","refresh_token":"r","client_id":"c","client_secret":"s"}"#;
        let integration = StepsIntegration::new(&context(&server, token), "alice").unwrap();

        assert!(integration.fetch(Some("2026-01-17"), Some("2026-01-18")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_aggregate_retried_after_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users/me/dataset:aggregate"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/users/me/dataset:aggregate"))
            .and(header("authorization", "Bearer t"))
            .and(body_string_contains("com.google.step_count.delta"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "bucket": [{ "dataset": [{ "point": [{ "startTimeNanos": nanos("2026-01-19"), "value": [{ "intVal": 300 }] }] }] }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let integration = StepsIntegration::new(&context(&server, r#"{"token":"t"}"#), "alice").unwrap();
        let points = integration.fetch(None, None).await.unwrap();

        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, PointValue::Count(300));
    }

    #[tokio::test]
    async fn test_token_refresh_sent_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/users/me/dataset:aggregate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "bucket": [] })))
            .expect(0)
            .mount(&server)
            .await;

        let token = r#"{"refresh_token":"r","client_id":"c","client_secret":"s"}"#;
        let integration = StepsIntegration::new(&context(&server, token), "alice").unwrap();
        let err = integration.fetch(None, None).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_aggregate_failure_propagates() {
        let server = MockServer::start().await;
        // original attempt plus two retries
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(500)).expect(3).mount(&server).await;

        let integration = StepsIntegration::new(&context(&server, r#"{"token":"t"}"#), "alice").unwrap();
        let err = integration.fetch(None, None).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_malformed_start_time_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "bucket": [{ "dataset": [{ "point": [{ "startTimeNanos": "yesterday", "value": [{ "intVal": 1 }] }] }] }]
            })))
            .mount(&server)
            .await;

        let integration = StepsIntegration::new(&context(&server, r#"{"token":"t"}"#), "alice").unwrap();
        let err = integration.fetch(None, None).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.to_string().contains("yesterday"));
    }

    #[tokio::test]
    async fn test_missing_token_is_credential_error() {
        let server = MockServer::start().await;
        let ctx = IntegrationContext::new(reqwest::Client::new(), Arc::new(ParameterStore::new()), "life-stats")
            .with_endpoints(Endpoints::all(&server.uri()));

        assert_eq!(StepsIntegration::new(&ctx, "alice").unwrap_err().kind(), ErrorKind::Credential);
        assert_eq!(
            StepsIntegration::new(&context(&server, "{}"), "alice").unwrap_err().kind(),
            ErrorKind::Credential
        );
        assert_eq!(
            StepsIntegration::new(&context(&server, "not json"), "alice").unwrap_err().kind(),
            ErrorKind::Credential
        );
    }
}
