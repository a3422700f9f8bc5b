//! Setup shared by the commands that touch the store or the providers.

use super::config::Config;
use crate::Result;
use crate::integrations::{IntegrationContext, Registry};
use crate::secrets::ParameterStore;
use crate::store::FileStore;
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, ValueEnum};
use core::time::Duration;
use ohno::IntoAppError;
use std::sync::Arc;

const LOG_TARGET: &str = "    common";

/// Color mode configuration for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Always use colors
    Always,

    /// Never use colors
    Never,

    /// Use colors if the output is a terminal, otherwise don't use colors
    Auto,
}

impl ColorMode {
    pub fn use_colors(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => {
                use std::io::{IsTerminal, stdout};
                stdout().is_terminal()
            }
        }
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    None,

    /// Only error messages
    Error,

    /// Warning and error messages
    Warn,

    /// Info, warning, and error messages
    Info,

    /// Debug, info, warning, and error messages
    Debug,

    /// Trace, debug, info, warning, and error messages
    Trace,
}

/// Arguments shared by every command that loads the configuration
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Path to configuration file (default is `life-stats.toml`)
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,

    /// Directory holding collected metrics (overrides the configuration)
    #[arg(long, value_name = "PATH", env = "LIFE_STATS_DATA_DIR")]
    pub data_dir: Option<Utf8PathBuf>,

    /// Control when to use colored output
    #[arg(long, value_name = "WHEN", default_value = "auto")]
    pub color: ColorMode,

    /// Set the logging level for diagnostic output
    #[arg(long, value_name = "LEVEL", default_value = "none", global = true)]
    pub log_level: LogLevel,
}

/// Loaded configuration plus the resolved data directory.
#[derive(Debug)]
pub struct Common {
    pub config: Config,
    pub data_dir: Utf8PathBuf,
    pub use_colors: bool,
}

impl Common {
    /// Initialize logging and load the configuration from the working directory.
    pub fn new(args: &CommonArgs) -> Result<Self> {
        init_logging(args.log_level);
        Self::load(Utf8Path::new("."), args)
    }

    fn load(base_dir: &Utf8Path, args: &CommonArgs) -> Result<Self> {
        let config = Config::load(base_dir, args.config.as_ref())?;
        let data_dir = match &args.data_dir {
            Some(dir) => dir.clone(),
            None => config.data_dir()?,
        };

        log::debug!(target: LOG_TARGET, "Using data directory '{data_dir}'");

        Ok(Self {
            config,
            data_dir,
            use_colors: args.color.use_colors(),
        })
    }

    /// Build the registry of built-in integrations from the configuration.
    pub fn registry(&self) -> Result<Registry> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.request_timeout_secs))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .into_app_err("creating HTTP client")?;

        let secrets = match &self.config.secrets_file {
            Some(path) => ParameterStore::from_file(path)?,
            None => ParameterStore::new(),
        }
        .with_env_fallback(self.config.secrets_from_env);

        let context = IntegrationContext::new(client, Arc::new(secrets), self.config.namespace.clone())
            .with_endpoints(self.config.endpoints.clone())
            .with_weather(self.config.weather.clone());

        Ok(Registry::with_defaults(context))
    }

    /// Open the file store under the data directory.
    pub async fn open_store(&self) -> Result<FileStore> {
        FileStore::open(self.data_dir.clone(), self.config.default_user.clone()).await
    }
}

pub fn init_logging(log_level: LogLevel) {
    let level = match log_level {
        LogLevel::None => return,
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };

    let env = env_logger::Env::default().filter_or("RUST_LOG", level);

    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(matches!(log_level, LogLevel::Debug | LogLevel::Trace))
        .init();
}
