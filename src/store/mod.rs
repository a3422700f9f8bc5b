//! Durable storage for collected metrics
//!
//! Two logical tables back the pipeline:
//!
//! - **metrics**: one [`MetricRecord`] per `(user_id, "<date>#<metric_type>")`. Writes are
//!   upserts, so storing the same points twice leaves a single record per key.
//! - **runs**: one [`RunWatermark`](crate::points::RunWatermark) per `(user_id, metric_type)`
//!   recording the last successful automatic run.
//!
//! The two tables are never updated atomically together. A failure between storing points
//! and advancing the watermark only causes the next run to fetch and overwrite the same
//! range again.
//!
//! [`MemoryStore`] keeps everything in process; [`FileStore`] persists JSON documents under
//! a data directory.

mod doc;
mod file;
mod memory;

use crate::Error;
use crate::points::{DataPoint, MetricRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

pub use file::FileStore;
pub use memory::MemoryStore;

/// User reported by [`MetricsStore::list_users`] when no watermark exists yet.
pub const DEFAULT_USER: &str = "default";

/// The metrics and run-watermark tables.
///
/// Implementations must tolerate concurrent calls for distinct keys.
#[async_trait]
pub trait MetricsStore: Send + Sync + core::fmt::Debug {
    /// Upsert one record per point under `metric_type`, returning the number written.
    ///
    /// A failure part way through may leave a subset of the points written.
    async fn store_metrics(&self, user_id: &str, metric_type: &str, points: &[DataPoint]) -> Result<usize, Error>;

    /// Time of the last successful automatic run, or `None` if there has been none.
    async fn get_last_run(&self, user_id: &str, metric_type: &str) -> Result<Option<DateTime<Utc>>, Error>;

    /// Set the watermark for `(user_id, metric_type)` to the current time, returning it.
    async fn update_last_run(&self, user_id: &str, metric_type: &str) -> Result<DateTime<Utc>, Error>;

    /// Distinct users present in the runs table, or the default user if it is empty.
    async fn list_users(&self) -> Result<BTreeSet<String>, Error>;

    /// Records stored for `(user_id, metric_type)`, ordered by date.
    async fn query_metrics(&self, user_id: &str, metric_type: &str) -> Result<Vec<MetricRecord>, Error>;
}

fn users_or_default(users: BTreeSet<String>, default_user: &str) -> BTreeSet<String> {
    if users.is_empty() {
        BTreeSet::from([default_user.to_string()])
    } else {
        users
    }
}
