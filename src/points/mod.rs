//! Normalized observations and their persisted forms
//!
//! Every integration produces [`DataPoint`]s regardless of the provider's native format.
//! The orchestrator partitions them with [`group_by_metric_type`] and the store persists
//! each one as a [`MetricRecord`]. Incremental progress is tracked per (user, metric) by a
//! [`RunWatermark`].

mod data_point;
mod grouping;
mod metric_record;

pub use data_point::{DataPoint, FieldValue, PointValue};
pub use grouping::group_by_metric_type;
pub use metric_record::{MetricRecord, RunWatermark, sort_key};
