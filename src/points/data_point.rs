use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One normalized (date, value) observation produced by an integration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Calendar day the observation belongs to.
    pub date: NaiveDate,

    pub value: PointValue,

    /// When the point was fetched.
    pub timestamp: DateTime<Utc>,

    /// Explicit metric type, set only by integrations whose output fans out over several
    /// logical metrics. Points without one are stored under the invoked metric name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_type: Option<String>,
}

impl DataPoint {
    #[must_use]
    pub const fn new(date: NaiveDate, value: PointValue, timestamp: DateTime<Utc>) -> Self {
        Self {
            date,
            value,
            timestamp,
            metric_type: None,
        }
    }

    #[must_use]
    pub fn with_metric_type(mut self, metric_type: impl Into<String>) -> Self {
        self.metric_type = Some(metric_type.into());
        self
    }
}

/// The value carried by a data point.
///
/// The shape is fixed per integration: step counts are plain counts, weather is a record of
/// numeric fields, task hours are a record with a numeric total and a list of tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointValue {
    Count(u64),
    Number(f64),
    Record(BTreeMap<String, FieldValue>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl PointValue {
    /// Build a record value from `(name, value)` pairs.
    pub fn record<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, FieldValue)>,
    {
        Self::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Look up a field of a record value.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        match self {
            Self::Record(fields) => fields.get(name),
            Self::Count(_) | Self::Number(_) => None,
        }
    }
}

impl core::fmt::Display for PointValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Count(n) => write!(f, "{n}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Record(fields) => {
                let json = serde_json::to_string(fields).map_err(|_e| core::fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}
