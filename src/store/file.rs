use super::doc::{load_or_default, save};
use super::{MetricsStore, users_or_default};
use crate::Error;
use crate::points::{DataPoint, MetricRecord, RunWatermark};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use fs4::fs_std::FileExt;
use ohno::IntoAppError;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use tokio::sync::Mutex;

const LOG_TARGET: &str = "     store";

const METRICS_DIR: &str = "metrics";
const RUNS_DIR: &str = "runs";
const LOCK_FILE: &str = "store.lock";

/// Bytes escaped in document file names. `%` is escaped, so the encoding is reversible.
const FILE_NAME_ESCAPES: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_');

/// user -> sort key -> record
///
/// Users stay separate inside a document even if their file names fold together, as
/// they do on case-insensitive filesystems.
type MetricsDoc = BTreeMap<String, BTreeMap<String, MetricRecord>>;

/// user -> metric type -> watermark
type RunsDoc = BTreeMap<String, BTreeMap<String, RunWatermark>>;

/// Store persisting both tables as JSON documents under a data directory.
///
/// ```text
/// <data_dir>/
///   store.lock
///   metrics/<encoded user>.json
///   runs/<encoded user>.json
/// ```
///
/// User ids are percent-encoded into file names. `store.lock` is held exclusively for the
/// lifetime of the store, so a second process opening the same directory waits.
#[derive(Debug)]
pub struct FileStore {
    root: Utf8PathBuf,
    default_user: String,

    // serializes read-modify-write cycles on the documents
    write_guard: Mutex<()>,

    lock_file: File,
}

impl FileStore {
    /// Open (creating if needed) the store rooted at `root`, waiting for any other holder
    /// of the directory to let go.
    pub async fn open(root: impl Into<Utf8PathBuf>, default_user: impl Into<String>) -> crate::Result<Self> {
        let root = root.into();

        for dir in [root.clone(), root.join(METRICS_DIR), root.join(RUNS_DIR)] {
            fs::create_dir_all(&dir).into_app_err_with(|| format!("unable to create directory '{dir}'"))?;
        }

        let lock_path = root.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .into_app_err_with(|| format!("unable to open lock file '{lock_path}'"))?;

        let lock_file = tokio::task::spawn_blocking(move || {
            lock_file
                .lock_exclusive()
                .into_app_err_with(|| format!("unable to lock '{lock_path}'"))?;
            Ok::<_, ohno::AppError>(lock_file)
        })
        .await
        .into_app_err("store lock task panicked")??;

        log::debug!(target: LOG_TARGET, "Opened file store at '{root}'");

        Ok(Self {
            root,
            default_user: default_user.into(),
            write_guard: Mutex::new(()),
            lock_file,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn doc_path(&self, table: &str, user_id: &str) -> Utf8PathBuf {
        self.root.join(table).join(format!("{}.json", file_stem(user_id)))
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.lock_file) {
            log::warn!(target: LOG_TARGET, "Could not unlock file store at '{}': {e:#}", self.root);
        }
    }
}

fn file_stem(user_id: &str) -> String {
    utf8_percent_encode(user_id, FILE_NAME_ESCAPES).to_string()
}

#[async_trait]
impl MetricsStore for FileStore {
    async fn store_metrics(&self, user_id: &str, metric_type: &str, points: &[DataPoint]) -> Result<usize, Error> {
        let _guard = self.write_guard.lock().await;
        let path = self.doc_path(METRICS_DIR, user_id);

        let mut doc: MetricsDoc = load_or_default(&path).map_err(Error::Storage)?;
        let records = doc.entry(user_id.to_string()).or_default();
        for point in points {
            let record = MetricRecord::from_point(user_id, metric_type, point);
            let _ = records.insert(record.sort_key(), record);
        }
        save(&doc, &path).map_err(Error::Storage)?;

        log::trace!(target: LOG_TARGET, "Wrote {} '{metric_type}' record(s) for user '{user_id}'", points.len());
        Ok(points.len())
    }

    async fn get_last_run(&self, user_id: &str, metric_type: &str) -> Result<Option<DateTime<Utc>>, Error> {
        let doc: RunsDoc = load_or_default(self.doc_path(RUNS_DIR, user_id)).map_err(Error::Storage)?;
        Ok(doc.get(user_id).and_then(|runs| runs.get(metric_type)).map(|w| w.last_run_time))
    }

    async fn update_last_run(&self, user_id: &str, metric_type: &str) -> Result<DateTime<Utc>, Error> {
        let _guard = self.write_guard.lock().await;
        let path = self.doc_path(RUNS_DIR, user_id);

        let mut doc: RunsDoc = load_or_default(&path).map_err(Error::Storage)?;
        let now = Utc::now();
        let _ = doc.entry(user_id.to_string()).or_default().insert(
            metric_type.to_string(),
            RunWatermark {
                user_id: user_id.to_string(),
                metric_type: metric_type.to_string(),
                last_run_time: now,
            },
        );
        save(&doc, &path).map_err(Error::Storage)?;

        Ok(now)
    }

    async fn list_users(&self) -> Result<BTreeSet<String>, Error> {
        let runs_dir = self.root.join(RUNS_DIR);
        let entries = runs_dir
            .read_dir_utf8()
            .into_app_err_with(|| format!("unable to list directory '{runs_dir}'"))
            .map_err(Error::Storage)?;

        let mut users = BTreeSet::new();
        for entry in entries {
            let entry = entry
                .into_app_err_with(|| format!("unable to list directory '{runs_dir}'"))
                .map_err(Error::Storage)?;

            if entry.path().extension() != Some("json") {
                continue;
            }

            let doc: RunsDoc = load_or_default(entry.path()).map_err(Error::Storage)?;
            users.extend(doc.into_keys());
        }

        Ok(users_or_default(users, &self.default_user))
    }

    async fn query_metrics(&self, user_id: &str, metric_type: &str) -> Result<Vec<MetricRecord>, Error> {
        let mut doc: MetricsDoc = load_or_default(self.doc_path(METRICS_DIR, user_id)).map_err(Error::Storage)?;
        let mut records: Vec<_> = doc
            .remove(user_id)
            .unwrap_or_default()
            .into_values()
            .filter(|r| r.metric_type == metric_type)
            .collect();
        records.sort_by_key(|r| r.date);
        Ok(records)
    }
}
