//! HTTP request helpers with retry and timeout middleware.
//!
//! Provider reads go through [`resilient_send`], which wraps the request in [`seatbelt`]
//! retry and timeout layers so that connection failures, 5xx and 429 responses are retried
//! with exponential backoff. Requests that must not be replayed are sent once with
//! [`send_once`]. Either way the final outcome is classified into the crate's error
//! taxonomy: rejected credentials become [`Error::Credential`], anything else that is not
//! a success becomes [`Error::Transport`].

use crate::Error;
use core::time::Duration;
use layered::{Execute, Service, Stack};
use ohno::{IntoAppError, app_err};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use seatbelt::retry::{Backoff, Retry};
use seatbelt::timeout::Timeout;
use seatbelt::{RecoveryInfo, ResilienceContext};
use serde::de::DeserializeOwned;
use tick::Clock;

const LOG_TARGET: &str = "      http";

/// Upper bound for a single attempt, on top of the client's own timeout.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum retry attempts (on top of the original request).
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff between retries.
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Wait applied to a 429 that carries no `Retry-After`.
const RATE_LIMIT_DEFAULT_DELAY: u64 = 5;

/// How failed reads are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRY_ATTEMPTS,
            base_delay: RETRY_BASE_DELAY,
        }
    }
}

/// A request that can be rebuilt for every attempt.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: Method,
    url: String,
    query: Vec<(String, String)>,
    authorization: Option<String>,
    json: Option<serde_json::Value>,
}

impl HttpRequest {
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            query: Vec::new(),
            authorization: None,
            json: None,
        }
    }

    /// A POST whose body is the given JSON document.
    #[must_use]
    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            json: Some(body),
            ..Self::get(url)
        }
    }

    #[must_use]
    pub fn query<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.query.extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Send `value` verbatim in the `Authorization` header.
    #[must_use]
    pub fn authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    #[must_use]
    pub fn bearer(self, token: &str) -> Self {
        self.authorization(format!("Bearer {token}"))
    }

    fn build(&self, client: &Client) -> RequestBuilder {
        let mut builder = client.request(self.method.clone(), &self.url);
        if !self.query.is_empty() {
            builder = builder.query(&self.query);
        }
        if let Some(value) = &self.authorization {
            builder = builder.header(reqwest::header::AUTHORIZATION, value);
        }
        if let Some(body) = &self.json {
            builder = builder.json(body);
        }
        builder
    }
}

/// Parse the `Retry-After` header value as seconds.
fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    let s = headers.get(reqwest::header::RETRY_AFTER).and_then(|h| h.to_str().ok())?;
    s.trim().parse::<u64>().ok()
}

/// Classify an HTTP outcome for retry purposes.
fn should_retry_response(result: &crate::Result<Response>) -> RecoveryInfo {
    match result {
        // Network / connection errors and attempt timeouts are transient
        Err(_) => RecoveryInfo::retry(),

        Ok(resp) if resp.status().is_server_error() => RecoveryInfo::retry(),

        Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
            let delay = parse_retry_after(resp.headers()).unwrap_or(RATE_LIMIT_DEFAULT_DELAY);
            RecoveryInfo::retry().delay(Duration::from_secs(delay))
        }

        // Success, rejected credentials and other client errors
        _ => RecoveryInfo::never(),
    }
}

/// Send a provider read, retrying transient failures.
pub async fn resilient_send(client: &Client, policy: &RetryPolicy, request: HttpRequest) -> Result<Response, Error> {
    let clock = Clock::new_tokio();
    let context = ResilienceContext::new(&clock).name("provider_read");

    let method = request.method.clone();
    let client = client.clone();
    let service = (
        Retry::layer("retry", &context)
            .clone_input()
            .recovery_with(|result: &crate::Result<Response>, _| should_retry_response(result))
            .max_retry_attempts(policy.max_retries)
            .base_delay(policy.base_delay)
            .backoff(Backoff::Exponential)
            .on_retry(move |_output, args| {
                log::debug!(
                    target: LOG_TARGET,
                    "Retrying HTTP {method} (attempt {}, delay {}ms)",
                    args.attempt().index() + 1,
                    args.retry_delay().as_millis(),
                );
            }),
        Timeout::layer("timeout", &context)
            .timeout_error(|_| app_err!("HTTP request timed out"))
            .timeout(DEFAULT_REQUEST_TIMEOUT),
        Execute::new(move |request: HttpRequest| {
            let client = client.clone();
            async move { request.build(&client).send().await.map_err(ohno::AppError::from) }
        }),
    )
        .into_service();

    check(service.execute(request).await)
}

/// Send a request exactly once.
pub async fn send_once(request: RequestBuilder) -> Result<Response, Error> {
    check(request.send().await.map_err(ohno::AppError::from))
}

/// Decode a JSON response body.
pub async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, Error> {
    let url = response.url().clone();
    response
        .json::<T>()
        .await
        .into_app_err_with(|| format!("unable to decode response from '{url}'"))
        .map_err(Error::Transport)
}

fn check(result: crate::Result<Response>) -> Result<Response, Error> {
    let resp = result.map_err(Error::Transport)?;
    let status = resp.status();

    if status.is_success() {
        return Ok(resp);
    }

    let url = resp.url().clone();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(Error::Credential(app_err!("'{url}' rejected the credentials: {status}")));
    }

    Err(Error::Transport(app_err!("'{url}' returned {status}")))
}
