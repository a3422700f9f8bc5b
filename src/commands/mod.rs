//! Command-line interface for life-stats
//!
//! The binary wraps the pipeline in a handful of commands:
//!
//! - **collect**: build the integration registry and the file store from the
//!   configuration, run one invocation of the orchestrator and print the
//!   response envelope or a per-pair summary.
//! - **metrics**: list the registered metric names.
//! - **users**: list the users that have completed a run.
//! - **show**: print the stored records of one user and metric type.
//! - **init**: write the default configuration file.
//! - **validate**: check a configuration file.
//!
//! The `run` function parses the arguments with clap and routes to the handler.
//! Handlers write through a [`Host`] so that tests can capture output and exit
//! codes. The `common` module holds the logging setup and the construction of the
//! registry and store shared by the commands that need them.

mod collect;
mod common;
mod config;
mod host;
mod init;
mod metrics;
mod run;
mod show;
mod users;
mod validate;

pub use collect::{CollectArgs, OutputFormat, collect};
pub use common::{ColorMode, CommonArgs, LogLevel};
pub use config::Config;
pub use host::Host;
pub use init::{InitArgs, init_config};
pub use metrics::{MetricsArgs, list_metrics};
pub use run::run;
pub use show::{ShowArgs, show_records};
pub use users::{UsersArgs, list_users};
pub use validate::{ValidateArgs, validate_config};
