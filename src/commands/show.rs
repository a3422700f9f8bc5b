use super::Host;
use super::collect::OutputFormat;
use super::common::{Common, CommonArgs};
use crate::Result;
use crate::store::MetricsStore;
use clap::Parser;
use ohno::IntoAppError;
use owo_colors::OwoColorize;
use std::io::Write;

#[derive(Parser, Debug)]
pub struct ShowArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// User whose records to print
    #[arg(long, value_name = "ID")]
    pub user_id: String,

    /// Metric type to print, e.g. `steps` or a task category such as `deep_work`
    #[arg(long, value_name = "NAME")]
    pub metric_type: String,

    /// Output format
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    pub format: OutputFormat,
}

/// Print the stored records of one user and metric type, oldest first.
pub async fn show_records<H: Host>(host: &mut H, args: &ShowArgs) -> Result<()> {
    let common = Common::new(&args.common)?;
    let store = common.open_store().await?;
    let records = store.query_metrics(&args.user_id, &args.metric_type).await?;

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&records).into_app_err("serializing records")?;
            let _ = writeln!(host.output(), "{json}");
        }
        OutputFormat::Text => {
            if records.is_empty() {
                let _ = writeln!(host.error(), "No records for {}/{}", args.user_id, args.metric_type);
            }

            for record in &records {
                if common.use_colors {
                    let _ = writeln!(host.output(), "{}  {}", record.date.cyan(), record.value);
                } else {
                    let _ = writeln!(host.output(), "{}  {}", record.date, record.value);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::commands::common::{ColorMode, LogLevel};
    use crate::commands::host::TestHost;
    use crate::points::{DataPoint, PointValue};
    use crate::store::FileStore;
    use camino::Utf8PathBuf;
    use chrono::{NaiveDate, Utc};

    fn args(dir: &Utf8PathBuf, format: OutputFormat) -> ShowArgs {
        let config = dir.join("life-stats.toml");
        std::fs::write(&config, "").unwrap();

        ShowArgs {
            common: CommonArgs {
                config: Some(config),
                data_dir: Some(dir.join("data")),
                color: ColorMode::Never,
                log_level: LogLevel::None,
            },
            user_id: "alice".to_string(),
            metric_type: "steps".to_string(),
            format,
        }
    }

    async fn seed(dir: &Utf8PathBuf) {
        let store = FileStore::open(dir.join("data"), "default").await.unwrap();
        let points = [
            DataPoint::new(NaiveDate::from_ymd_opt(2026, 1, 11).unwrap(), PointValue::Count(900), Utc::now()),
            DataPoint::new(NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(), PointValue::Count(1200), Utc::now()),
        ];
        let _ = store.store_metrics("alice", "steps", &points).await.unwrap();
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    async fn test_text_output_is_ordered_by_date() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();
        seed(&dir).await;

        let mut host = TestHost::new();
        show_records(&mut host, &args(&dir, OutputFormat::Text)).await.unwrap();
        assert_eq!(host.output_text(), "2026-01-10  1200\n2026-01-11  900\n");
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    async fn test_json_output() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();
        seed(&dir).await;

        let mut host = TestHost::new();
        show_records(&mut host, &args(&dir, OutputFormat::Json)).await.unwrap();

        let records: serde_json::Value = serde_json::from_str(&host.output_text()).unwrap();
        assert_eq!(records.as_array().unwrap().len(), 2);
        assert_eq!(records[0]["date"], "2026-01-10");
        assert_eq!(records[0]["metric_type"], "steps");
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    async fn test_no_records() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();

        let mut host = TestHost::new();
        show_records(&mut host, &args(&dir, OutputFormat::Text)).await.unwrap();
        assert!(host.output_text().is_empty());
        assert_eq!(host.error_text(), "No records for alice/steps\n");
    }
}
