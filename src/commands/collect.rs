use super::Host;
use super::common::{Common, CommonArgs};
use crate::Result;
use crate::orchestrator::{Orchestrator, PairStatus, Response, RunRequest, RunSummary};
use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum};
use ohno::IntoAppError;
use owo_colors::OwoColorize;
use std::io::Write;
use std::sync::Arc;

const LOG_TARGET: &str = "   collect";

/// How the run result is printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// The response envelope as JSON
    Json,

    /// One line per processed pair
    Text,
}

#[derive(Parser, Debug)]
pub struct CollectArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// JSON file holding the run request; flags given on the command line take precedence
    #[arg(long, value_name = "PATH")]
    pub event: Option<Utf8PathBuf>,

    /// Only collect this metric (default is every registered metric)
    #[arg(long, value_name = "NAME")]
    pub metric: Option<String>,

    /// Only collect for this user (default is every known user)
    #[arg(long, value_name = "ID")]
    pub user_id: Option<String>,

    /// First day to collect (YYYY-MM-DD); makes the run manual
    #[arg(long, value_name = "DATE")]
    pub start_date: Option<String>,

    /// Last day to collect (YYYY-MM-DD); makes the run manual
    #[arg(long, value_name = "DATE")]
    pub end_date: Option<String>,

    /// Who or what triggered the run, for the logs
    #[arg(long, value_name = "TEXT")]
    pub source: Option<String>,

    /// Output format
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    pub format: OutputFormat,
}

impl CollectArgs {
    fn request(&self) -> Result<RunRequest> {
        let mut request = match &self.event {
            Some(path) => {
                let json = std::fs::read_to_string(path).into_app_err_with(|| format!("reading run request '{path}'"))?;
                RunRequest::from_json(&json).into_app_err_with(|| format!("parsing run request '{path}'"))?
            }
            None => RunRequest::default(),
        };

        for (field, arg) in [
            (&mut request.metric, &self.metric),
            (&mut request.user_id, &self.user_id),
            (&mut request.start_date, &self.start_date),
            (&mut request.end_date, &self.end_date),
            (&mut request.source, &self.source),
        ] {
            if arg.is_some() {
                field.clone_from(arg);
            }
        }

        if request.source.is_none() {
            request.source = Some("cli".to_string());
        }

        Ok(request)
    }
}

/// Run the pipeline once and report the outcome.
///
/// Exits with status 1 unless every pair succeeded.
pub async fn collect<H: Host>(host: &mut H, args: &CollectArgs) -> Result<()> {
    let common = Common::new(&args.common)?;
    let outcome = match prepare(args, &common).await {
        Ok((orchestrator, request)) => orchestrator.run(&request).await.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    let response = match &outcome {
        Ok(summary) => Response::from_summary(summary),
        Err(message) => {
            log::error!(target: LOG_TARGET, "Fatal error: {message}");
            Response::fatal(message)
        }
    };

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&response).into_app_err("serializing response")?;
            let _ = writeln!(host.output(), "{json}");
        }
        OutputFormat::Text => match &outcome {
            Ok(summary) => write_summary(&mut host.output(), summary, common.use_colors)?,
            Err(message) => {
                let _ = writeln!(host.error(), "❌ Run failed: {message}");
            }
        },
    }

    if !response.is_success() {
        host.exit(1);
    }

    Ok(())
}

async fn prepare(args: &CollectArgs, common: &Common) -> Result<(Orchestrator, RunRequest)> {
    let request = args.request()?;
    let registry = common.registry()?;
    let store = common.open_store().await?;

    let orchestrator = Orchestrator::new(Arc::new(registry), Arc::new(store)).with_concurrency(common.config.concurrency);
    Ok((orchestrator, request))
}

fn write_summary(w: &mut impl Write, summary: &RunSummary, use_colors: bool) -> Result<()> {
    for result in &summary.results {
        let line = match result.status {
            PairStatus::Success => format!("{}/{}: stored {} point(s)", result.user_id, result.metric, result.count),
            PairStatus::NoData => format!("{}/{}: no new data", result.user_id, result.metric),
        };

        if use_colors {
            match result.status {
                PairStatus::Success => writeln!(w, "{}", line.green())?,
                PairStatus::NoData => writeln!(w, "{}", line.yellow())?,
            }
        } else {
            writeln!(w, "{line}")?;
        }
    }

    for error in &summary.errors {
        let line = format!("{}/{}: {}", error.user_id, error.metric, error.error);
        if use_colors {
            writeln!(w, "{}", line.red())?;
        } else {
            writeln!(w, "{line}")?;
        }
    }

    writeln!(w, "{} processed, {} failed", summary.total_processed, summary.total_errors)?;
    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::commands::common::{ColorMode, LogLevel};
    use crate::commands::host::TestHost;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        _tmp: tempfile::TempDir,
        dir: Utf8PathBuf,
    }

    impl Fixture {
        fn new(server: &MockServer) -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let dir = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();

            std::fs::write(
                dir.join("secrets.toml"),
                "\"/life-stats/clickup/alice/token\" = \"pk_1\"\n\
                 \"/life-stats/clickup/alice/list-id\" = \"L1\"\n\
                 \"/life-stats/clickup/alice/team-id\" = \"T1\"\n",
            )
            .unwrap();

            let base = server.uri();
            std::fs::write(
                dir.join("life-stats.toml"),
                format!(
                    "data_dir = \"{dir}/data\"\n\
                     secrets_file = \"{dir}/secrets.toml\"\n\
                     secrets_from_env = false\n\
                     [endpoints]\n\
                     google_fit = \"{base}\"\n\
                     google_token = \"{base}/token\"\n\
                     open_meteo = \"{base}\"\n\
                     clickup = \"{base}\"\n"
                ),
            )
            .unwrap();

            Self { _tmp: tmp, dir }
        }

        fn args(&self, format: OutputFormat) -> CollectArgs {
            CollectArgs {
                common: CommonArgs {
                    config: Some(self.dir.join("life-stats.toml")),
                    data_dir: None,
                    color: ColorMode::Never,
                    log_level: LogLevel::None,
                },
                event: None,
                metric: None,
                user_id: None,
                start_date: None,
                end_date: None,
                source: None,
                format,
            }
        }
    }

    async fn mount_weather(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/v1/archive"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "daily": {
                    "time": ["2026-01-10", "2026-01-11"],
                    "temperature_2m_max": [1.0, 2.0],
                    "temperature_2m_min": [-5.0, -4.0]
                }
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    async fn test_manual_weather_run_text_output() {
        let server = MockServer::start().await;
        mount_weather(&server).await;
        let fixture = Fixture::new(&server);

        let mut args = fixture.args(OutputFormat::Text);
        args.metric = Some("weather".to_string());
        args.user_id = Some("alice".to_string());
        args.start_date = Some("2026-01-10".to_string());
        args.end_date = Some("2026-01-11".to_string());

        let mut host = TestHost::new();
        collect(&mut host, &args).await.unwrap();

        assert_eq!(host.exit_code, None);
        let out = host.output_text();
        assert!(out.contains("alice/weather: stored 2 point(s)"), "{out}");
        assert!(out.contains("1 processed, 0 failed"), "{out}");
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    async fn test_partial_failure_json_output_exits_with_error() {
        let server = MockServer::start().await;
        mount_weather(&server).await;
        let fixture = Fixture::new(&server);

        // bob has no ClickUp credentials
        let mut args = fixture.args(OutputFormat::Json);
        args.user_id = Some("bob".to_string());
        args.start_date = Some("2026-01-10".to_string());
        args.end_date = Some("2026-01-11".to_string());
        args.metric = Some("tasks".to_string());

        let mut host = TestHost::new();
        collect(&mut host, &args).await.unwrap();

        assert_eq!(host.exit_code, Some(1));
        let envelope: serde_json::Value = serde_json::from_str(&host.output_text()).unwrap();
        assert_eq!(envelope["statusCode"], 207);

        let body: serde_json::Value = serde_json::from_str(envelope["body"].as_str().unwrap()).unwrap();
        assert_eq!(body["total_errors"], 1);
        assert_eq!(body["errors"][0]["kind"], "credential");
        assert_eq!(body["errors"][0]["user_id"], "bob");
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    async fn test_event_file_with_flag_override() {
        let server = MockServer::start().await;
        mount_weather(&server).await;
        let fixture = Fixture::new(&server);

        let event = fixture.dir.join("event.json");
        std::fs::write(
            &event,
            r#"{"metric": "steps", "user_id": "alice", "start_date": "2026-01-10", "end_date": "2026-01-11", "source": "schedule", "detail-type": "Scheduled Event"}"#,
        )
        .unwrap();

        let mut args = fixture.args(OutputFormat::Text);
        args.event = Some(event);
        args.metric = Some("weather".to_string());

        let request = args.request().unwrap();
        assert_eq!(request.metric.as_deref(), Some("weather"));
        assert_eq!(request.user_id.as_deref(), Some("alice"));
        assert_eq!(request.source.as_deref(), Some("schedule"));
        assert!(request.is_manual());

        let mut host = TestHost::new();
        collect(&mut host, &args).await.unwrap();
        assert!(host.output_text().contains("alice/weather: stored 2 point(s)"));
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    async fn test_unreadable_event_is_fatal() {
        let server = MockServer::start().await;
        let fixture = Fixture::new(&server);

        let mut args = fixture.args(OutputFormat::Json);
        args.event = Some(fixture.dir.join("missing.json"));

        let mut host = TestHost::new();
        collect(&mut host, &args).await.unwrap();

        assert_eq!(host.exit_code, Some(1));
        let envelope: serde_json::Value = serde_json::from_str(&host.output_text()).unwrap();
        assert_eq!(envelope["statusCode"], 500);
        assert!(envelope["body"].as_str().unwrap().contains("error"));
    }

    #[test]
    fn test_default_source_is_cli() {
        let args = CollectArgs {
            common: CommonArgs {
                config: None,
                data_dir: None,
                color: ColorMode::Never,
                log_level: LogLevel::None,
            },
            event: None,
            metric: None,
            user_id: None,
            start_date: None,
            end_date: None,
            source: None,
            format: OutputFormat::Text,
        };

        let request = args.request().unwrap();
        assert_eq!(request.source.as_deref(), Some("cli"));
        assert!(!request.is_manual());
    }

    #[test]
    fn test_write_summary_lists_errors_after_results() {
        use crate::ErrorKind;
        use crate::orchestrator::{PairError, PairOutcome};

        let summary = RunSummary {
            results: vec![PairOutcome {
                user_id: "alice".to_string(),
                metric: "steps".to_string(),
                count: 0,
                status: PairStatus::NoData,
            }],
            errors: vec![PairError {
                user_id: "alice".to_string(),
                metric: "tasks".to_string(),
                kind: ErrorKind::Transport,
                error: "transport error: boom".to_string(),
            }],
            total_processed: 1,
            total_errors: 1,
        };

        let mut out = Vec::new();
        write_summary(&mut out, &summary, false).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "alice/steps: no new data\nalice/tasks: transport error: boom\n1 processed, 1 failed\n"
        );
    }
}
