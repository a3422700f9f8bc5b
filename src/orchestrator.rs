//! The fetch-and-store pipeline
//!
//! A run processes every requested `(metric, user)` pair independently:
//!
//! 1. Build the metric's integration for the user.
//! 2. Determine `since`: the request's `start_date` if given, else the pair's watermark.
//! 3. Fetch the points for the window.
//! 4. Store them, fanning out to one metric type per group when the integration tags its
//!    points with explicit metric types.
//! 5. On automatic runs, advance the pair's watermark once.
//!
//! A failure in any step is recorded against its pair and never stops the others. Only a
//! failure to enumerate the pairs (listing users) aborts the whole run.
//!
//! Pairs are processed in batches of `concurrency`; results are always reported in
//! metric-major order regardless of completion order.

use crate::integrations::Registry;
use crate::points::group_by_metric_type;
use crate::store::MetricsStore;
use crate::{Error, ErrorKind};
use futures::future::join_all;
use ohno::IntoAppError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::Display;

const LOG_TARGET: &str = "  pipeline";

/// Parameters of one invocation.
///
/// Unknown fields are ignored so that scheduler envelopes can be passed through as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RunRequest {
    /// Metric to run; all registered metrics when absent.
    #[serde(default)]
    pub metric: Option<String>,

    /// User to run for; all known users when absent.
    #[serde(default)]
    pub user_id: Option<String>,

    /// Manual window start (`YYYY-MM-DD`), replacing the watermark.
    #[serde(default)]
    pub start_date: Option<String>,

    /// Manual window end (`YYYY-MM-DD`).
    #[serde(default)]
    pub end_date: Option<String>,

    /// Free-form description of who triggered the run. Only logged.
    #[serde(default)]
    pub source: Option<String>,
}

impl RunRequest {
    /// Parse a request from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json)
            .into_app_err("parsing run request")
            .map_err(Error::Validation)
    }

    /// A run with an explicit date in either direction never advances watermarks.
    #[must_use]
    pub const fn is_manual(&self) -> bool {
        self.start_date.is_some() || self.end_date.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PairStatus {
    Success,
    NoData,
}

/// A pair that completed, with or without data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairOutcome {
    pub user_id: String,
    pub metric: String,

    /// Points stored across all metric types.
    pub count: usize,

    pub status: PairStatus,
}

/// A pair that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairError {
    pub user_id: String,
    pub metric: String,
    pub kind: ErrorKind,
    pub error: String,
}

/// Everything that happened during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub results: Vec<PairOutcome>,
    pub errors: Vec<PairError>,
    pub total_processed: usize,
    pub total_errors: usize,
}

impl RunSummary {
    fn record(&mut self, metric: &str, user_id: &str, outcome: Result<PairOutcome, Error>) {
        match outcome {
            Ok(outcome) => {
                self.results.push(outcome);
                self.total_processed += 1;
            }
            Err(e) => {
                log::error!(target: LOG_TARGET, "Error processing {metric} for {user_id}: {e}");
                self.errors.push(PairError {
                    user_id: user_id.to_string(),
                    metric: metric.to_string(),
                    kind: e.kind(),
                    error: e.to_string(),
                });
                self.total_errors += 1;
            }
        }
    }

    #[must_use]
    pub fn status(&self) -> RunStatus {
        if self.errors.is_empty() {
            RunStatus::Succeeded
        } else {
            RunStatus::Partial
        }
    }
}

/// Overall result of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every pair completed.
    Succeeded,

    /// Some pairs failed.
    Partial,

    /// The run could not start.
    Fatal,
}

impl RunStatus {
    #[must_use]
    pub const fn status_code(self) -> u16 {
        match self {
            Self::Succeeded => 200,
            Self::Partial => 207,
            Self::Fatal => 500,
        }
    }
}

/// The response envelope. `body` holds JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub status_code: u16,
    pub body: String,
}

impl Response {
    #[must_use]
    pub fn from_summary(summary: &RunSummary) -> Self {
        // plain strings, numbers and enums only
        let body = serde_json::to_string(summary).expect("run summary serializes to JSON");
        Self {
            status_code: summary.status().status_code(),
            body,
        }
    }

    /// Response for a run that could not start.
    #[must_use]
    pub fn fatal(error: &impl core::fmt::Display) -> Self {
        Self {
            status_code: RunStatus::Fatal.status_code(),
            body: serde_json::json!({ "error": error.to_string() }).to_string(),
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

/// Runs requests against a registry and a store.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    registry: Arc<Registry>,
    store: Arc<dyn MetricsStore>,
    concurrency: usize,
}

impl Orchestrator {
    /// An orchestrator processing one pair at a time.
    #[must_use]
    pub fn new(registry: Arc<Registry>, store: Arc<dyn MetricsStore>) -> Self {
        Self {
            registry,
            store,
            concurrency: 1,
        }
    }

    /// Process up to `concurrency` pairs at once.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Run a request and wrap the outcome in a response envelope.
    pub async fn handle(&self, request: &RunRequest) -> Response {
        match self.run(request).await {
            Ok(summary) => Response::from_summary(&summary),
            Err(e) => {
                log::error!(target: LOG_TARGET, "Fatal error: {e}");
                Response::fatal(&e)
            }
        }
    }

    /// Run a request.
    ///
    /// Per-pair failures are reported in the summary. An `Err` means the run could not
    /// start at all.
    pub async fn run(&self, request: &RunRequest) -> Result<RunSummary, Error> {
        log_banner(request);

        let metrics = request.metric.clone().map_or_else(|| self.registry.list(), |metric| vec![metric]);
        log::info!(target: LOG_TARGET, "Running metrics: {}", metrics.join(", "));

        let users: Vec<String> = match &request.user_id {
            Some(user_id) => vec![user_id.clone()],
            None => self.store.list_users().await?.into_iter().collect(),
        };
        log::info!(target: LOG_TARGET, "Processing {} user(s)", users.len());

        let pairs: Vec<(&str, &str)> = metrics
            .iter()
            .flat_map(|metric| users.iter().map(move |user| (metric.as_str(), user.as_str())))
            .collect();

        let mut summary = RunSummary::default();
        for batch in pairs.chunks(self.concurrency) {
            let outcomes = join_all(batch.iter().map(|&(metric, user_id)| self.process_pair(metric, user_id, request))).await;
            for (&(metric, user_id), outcome) in batch.iter().zip(outcomes) {
                summary.record(metric, user_id, outcome);
            }
        }

        log::info!(
            target: LOG_TARGET,
            "Run completed: {} successful, {} error(s)",
            summary.total_processed,
            summary.total_errors
        );
        Ok(summary)
    }

    async fn process_pair(&self, metric: &str, user_id: &str, request: &RunRequest) -> Result<PairOutcome, Error> {
        log::info!(target: LOG_TARGET, "Processing metric '{metric}' for user '{user_id}'");

        let integration = self.registry.get(metric, user_id)?;

        let since = if let Some(start_date) = &request.start_date {
            log::info!(target: LOG_TARGET, "Using provided start date {start_date}");
            Some(start_date.clone())
        } else {
            let last_run = self.store.get_last_run(user_id, metric).await?;
            match last_run {
                Some(t) => log::info!(target: LOG_TARGET, "Last run for {user_id}/{metric}: {}", t.to_rfc3339()),
                None => log::info!(target: LOG_TARGET, "No previous run for {user_id}/{metric}"),
            }
            last_run.map(|t| t.to_rfc3339())
        };

        let points = integration.fetch(since.as_deref(), request.end_date.as_deref()).await?;
        log::info!(target: LOG_TARGET, "Fetched {} data point(s)", points.len());

        if points.is_empty() {
            log::info!(target: LOG_TARGET, "No new data for {user_id}/{metric}");
            return Ok(PairOutcome {
                user_id: user_id.to_string(),
                metric: metric.to_string(),
                count: 0,
                status: PairStatus::NoData,
            });
        }

        for point in &points {
            log::debug!(
                target: LOG_TARGET,
                "{user_id}/{} - {}: {}",
                point.metric_type.as_deref().unwrap_or(metric),
                point.date,
                point.value
            );
        }

        let mut count = 0;
        for (metric_type, group) in group_by_metric_type(metric, points) {
            count += self.store.store_metrics(user_id, &metric_type, &group).await?;
        }

        if request.is_manual() {
            log::debug!(target: LOG_TARGET, "Manual run, watermark for {user_id}/{metric} left unchanged");
        } else {
            let _ = self.store.update_last_run(user_id, metric).await?;
        }

        log::info!(target: LOG_TARGET, "Stored {count} point(s) for {user_id}/{metric}");
        Ok(PairOutcome {
            user_id: user_id.to_string(),
            metric: metric.to_string(),
            count,
            status: PairStatus::Success,
        })
    }
}

fn log_banner(request: &RunRequest) {
    let run_type = if request.is_manual() { "MANUAL" } else { "AUTOMATIC" };
    log::info!(target: LOG_TARGET, "=== Invocation ({run_type}) ===");
    log::info!(target: LOG_TARGET, "User ID: {}", request.user_id.as_deref().unwrap_or("all users"));
    log::info!(target: LOG_TARGET, "Metric: {}", request.metric.as_deref().unwrap_or("all metrics"));
    log::info!(target: LOG_TARGET, "Start Date: {}", request.start_date.as_deref().unwrap_or("from last run"));
    log::info!(target: LOG_TARGET, "End Date: {}", request.end_date.as_deref().unwrap_or("now"));
    if let Some(source) = &request.source {
        log::info!(target: LOG_TARGET, "Source: {source}");
    }
}
