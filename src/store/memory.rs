use super::{DEFAULT_USER, MetricsStore, users_or_default};
use crate::Error;
use crate::points::{DataPoint, MetricRecord, RunWatermark};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Tables {
    /// user -> sort key -> record
    metrics: BTreeMap<String, BTreeMap<String, MetricRecord>>,

    /// (user, metric type) -> watermark
    runs: BTreeMap<(String, String), RunWatermark>,
}

/// In-process store, mainly for tests and dry runs.
#[derive(Debug)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    default_user: String,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_USER)
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new(default_user: impl Into<String>) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            default_user: default_user.into(),
        }
    }

    /// Seed a watermark directly.
    pub fn set_last_run(&self, user_id: &str, metric_type: &str, last_run_time: DateTime<Utc>) {
        let mut tables = self.tables.lock().expect("lock not poisoned");
        let _ = tables.runs.insert(
            (user_id.to_string(), metric_type.to_string()),
            RunWatermark {
                user_id: user_id.to_string(),
                metric_type: metric_type.to_string(),
                last_run_time,
            },
        );
    }

    /// Total number of metric records across all users.
    #[must_use]
    pub fn record_count(&self) -> usize {
        let tables = self.tables.lock().expect("lock not poisoned");
        tables.metrics.values().map(BTreeMap::len).sum()
    }
}

#[async_trait]
impl MetricsStore for MemoryStore {
    async fn store_metrics(&self, user_id: &str, metric_type: &str, points: &[DataPoint]) -> Result<usize, Error> {
        let mut tables = self.tables.lock().expect("lock not poisoned");
        let user_records = tables.metrics.entry(user_id.to_string()).or_default();

        for point in points {
            let record = MetricRecord::from_point(user_id, metric_type, point);
            let _ = user_records.insert(record.sort_key(), record);
        }

        Ok(points.len())
    }

    async fn get_last_run(&self, user_id: &str, metric_type: &str) -> Result<Option<DateTime<Utc>>, Error> {
        let tables = self.tables.lock().expect("lock not poisoned");
        Ok(tables
            .runs
            .get(&(user_id.to_string(), metric_type.to_string()))
            .map(|w| w.last_run_time))
    }

    async fn update_last_run(&self, user_id: &str, metric_type: &str) -> Result<DateTime<Utc>, Error> {
        let now = Utc::now();
        self.set_last_run(user_id, metric_type, now);
        Ok(now)
    }

    async fn list_users(&self) -> Result<BTreeSet<String>, Error> {
        let tables = self.tables.lock().expect("lock not poisoned");
        let users = tables.runs.keys().map(|(user, _)| user.clone()).collect();
        Ok(users_or_default(users, &self.default_user))
    }

    async fn query_metrics(&self, user_id: &str, metric_type: &str) -> Result<Vec<MetricRecord>, Error> {
        let tables = self.tables.lock().expect("lock not poisoned");
        let mut records: Vec<_> = tables
            .metrics
            .get(user_id)
            .into_iter()
            .flat_map(BTreeMap::values)
            .filter(|r| r.metric_type == metric_type)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.date);
        Ok(records)
    }
}
