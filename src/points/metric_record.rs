use crate::points::{DataPoint, PointValue};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Build the sort key under which a record is stored for a user: `"<date>#<metric_type>"`.
#[must_use]
pub fn sort_key(date: NaiveDate, metric_type: &str) -> String {
    format!("{}#{metric_type}", date.format("%Y-%m-%d"))
}

/// The persisted form of a data point.
///
/// Records are keyed by `(user_id, "<date>#<metric_type>")`. A later write for the same key
/// replaces the earlier one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub user_id: String,
    pub metric_type: String,
    pub date: NaiveDate,
    pub value: PointValue,
    pub timestamp: DateTime<Utc>,
}

impl MetricRecord {
    #[must_use]
    pub fn from_point(user_id: &str, metric_type: &str, point: &DataPoint) -> Self {
        Self {
            user_id: user_id.to_string(),
            metric_type: metric_type.to_string(),
            date: point.date,
            value: point.value.clone(),
            timestamp: point.timestamp,
        }
    }

    #[must_use]
    pub fn sort_key(&self) -> String {
        sort_key(self.date, &self.metric_type)
    }
}

/// Time of the last successful automatic run for a (user, metric).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunWatermark {
    pub user_id: String,
    pub metric_type: String,
    pub last_run_time: DateTime<Utc>,
}
