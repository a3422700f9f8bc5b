//! Hours spent per task type, from completed ClickUp tasks.
//!
//! Each completed task contributes the time between its start and its completion. Tasks
//! that cross midnight (UTC) are split into one piece per day. Pieces are grouped by day
//! and task type, where the type comes from the team's custom task types (anything that
//! cannot be resolved counts as `unknown`). Every group becomes one point whose metric
//! type is derived from the task type, so a single fetch fans out into several metrics:
//!
//! ```text
//! date        metric_type  value
//! 2026-01-17  deep_work    {"hours": 3.25, "tags": ["rust", "writing"]}
//! 2026-01-17  unknown      {"hours": 0.5,  "tags": []}
//! ```
//!
//! Credentials live under `/<namespace>/clickup/<user>/` as `token`, `list-id`, and
//! `team-id`.

mod day_split;

pub use day_split::{DaySpan, category_metric_type, round_hours, split_by_day};

use super::resilient_http::{HttpRequest, read_json, resilient_send};
use super::{Integration, IntegrationContext};
use crate::Error;
use crate::date_range::{DateRange, resolve_at};
use crate::points::{DataPoint, FieldValue, PointValue};
use crate::secrets::require;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

const LOG_TARGET: &str = "     tasks";

pub const METRIC: &str = "tasks";
pub const PROVIDER: &str = "clickup";

/// Category used when a task's custom type cannot be resolved.
pub const UNKNOWN_CATEGORY: &str = "unknown";

#[derive(Deserialize)]
struct CustomItemsResponse {
    #[serde(default)]
    custom_items: Vec<CustomItem>,
}

#[derive(Deserialize)]
struct CustomItem {
    id: i64,
    name: String,
}

#[derive(Deserialize)]
struct TasksResponse {
    #[serde(default)]
    tasks: Vec<Task>,
}

#[derive(Debug, Deserialize)]
struct Task {
    #[serde(default)]
    id: Option<String>,

    /// Milliseconds since the epoch, as a string.
    #[serde(default)]
    start_date: Option<String>,

    /// Milliseconds since the epoch, as a string.
    #[serde(default)]
    date_done: Option<String>,

    #[serde(default)]
    custom_item_id: Option<i64>,

    #[serde(default)]
    tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}

#[derive(Debug, Default)]
struct Group {
    hours: f64,
    tags: BTreeSet<String>,
}

/// Completed task hours for one user.
pub struct TasksIntegration {
    context: IntegrationContext,
    user_id: String,
    token: String,
    list_id: String,
    team_id: String,
}

impl core::fmt::Debug for TasksIntegration {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TasksIntegration")
            .field("user_id", &self.user_id)
            .field("list_id", &self.list_id)
            .field("team_id", &self.team_id)
            .finish_non_exhaustive()
    }
}

impl TasksIntegration {
    pub fn new(context: &IntegrationContext, user_id: &str) -> Result<Self, Error> {
        let secrets = context.secrets.as_ref();
        let token = require(secrets, &context.secret_path(PROVIDER, user_id, "token"))?;
        let list_id = require(secrets, &context.secret_path(PROVIDER, user_id, "list-id"))?;
        let team_id = require(secrets, &context.secret_path(PROVIDER, user_id, "team-id"))?;

        Ok(Self {
            context: context.clone(),
            user_id: user_id.to_string(),
            token: token.trim().to_string(),
            list_id: list_id.trim().to_string(),
            team_id: team_id.trim().to_string(),
        })
    }

    fn get(&self, endpoint: &str) -> HttpRequest {
        HttpRequest::get(format!("{}{endpoint}", self.context.endpoints.clickup)).authorization(self.token.as_str())
    }

    async fn send(&self, request: HttpRequest) -> Result<reqwest::Response, Error> {
        resilient_send(&self.context.client, &self.context.retry, request).await
    }

    /// Custom task type id -> name. A failure here only loses the type names.
    async fn custom_types(&self) -> HashMap<i64, String> {
        let request = self.get(&format!("/team/{}/custom_item", self.team_id));
        let result = match self.send(request).await {
            Ok(response) => read_json::<CustomItemsResponse>(response).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(response) => {
                let types: HashMap<_, _> = response.custom_items.into_iter().map(|item| (item.id, item.name)).collect();
                log::info!(target: LOG_TARGET, "Loaded {} custom task type(s)", types.len());
                types
            }
            Err(e) => {
                log::warn!(target: LOG_TARGET, "Could not load custom task types, all tasks will count as '{UNKNOWN_CATEGORY}': {e}");
                HashMap::new()
            }
        }
    }

    async fn completed_tasks(&self) -> Result<Vec<Task>, Error> {
        let request = self
            .get(&format!("/list/{}/task", self.list_id))
            .query([("archived", "false"), ("include_closed", "true"), ("statuses[]", "done")]);

        let response: TasksResponse = read_json(self.send(request).await?).await?;
        log::info!(target: LOG_TARGET, "Fetched {} completed task(s)", response.tasks.len());
        Ok(response.tasks)
    }
}

fn millis(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let ms: i64 = raw?.trim().parse().ok()?;
    DateTime::from_timestamp_millis(ms)
}

/// Group the tasks' per-day pieces by (date, category).
fn group_tasks(tasks: &[Task], custom_types: &HashMap<i64, String>, range: &DateRange) -> BTreeMap<(NaiveDate, String), Group> {
    let mut groups: BTreeMap<(NaiveDate, String), Group> = BTreeMap::new();

    for task in tasks {
        let task_id = task.id.as_deref().unwrap_or("?");
        let (Some(start), Some(done)) = (millis(task.start_date.as_deref()), millis(task.date_done.as_deref())) else {
            log::debug!(target: LOG_TARGET, "Skipping task {task_id}: missing start or completion time");
            continue;
        };

        if done < start {
            log::debug!(target: LOG_TARGET, "Skipping task {task_id}: completed before it started");
            continue;
        }

        let category = task
            .custom_item_id
            .and_then(|id| custom_types.get(&id))
            .map_or(UNKNOWN_CATEGORY, String::as_str);

        for span in split_by_day(start, done) {
            if !range.contains(span.start) {
                continue;
            }

            let group = groups.entry((span.start.date_naive(), category.to_string())).or_default();
            group.hours += span.hours();
            group.tags.extend(task.tags.iter().map(|t| t.name.clone()));
        }
    }

    groups
}

#[async_trait]
impl Integration for TasksIntegration {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    async fn fetch(&self, since: Option<&str>, until: Option<&str>) -> Result<Vec<DataPoint>, Error> {
        let now = self.context.now();
        let range = resolve_at(since, until, now)?;
        log::info!(target: LOG_TARGET, "Fetching ClickUp tasks for '{}' from {range}", self.user_id);

        let custom_types = self.custom_types().await;
        let tasks = self.completed_tasks().await?;

        let points: Vec<_> = group_tasks(&tasks, &custom_types, &range)
            .into_iter()
            .map(|((date, category), group)| {
                let hours = round_hours(group.hours);
                log::debug!(target: LOG_TARGET, "Task type '{category}' on {date}: {hours} hours");

                let value = PointValue::record([
                    ("hours", FieldValue::Number(hours)),
                    ("tags", FieldValue::List(group.tags.into_iter().collect())),
                ]);
                DataPoint::new(date, value, now).with_metric_type(category_metric_type(&category))
            })
            .collect();

        log::info!(target: LOG_TARGET, "Produced {} task type/date point(s) for '{}'", points.len(), self.user_id);
        Ok(points)
    }
}
