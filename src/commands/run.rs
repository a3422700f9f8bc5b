//! Command dispatch logic for life-stats

use super::{
    CollectArgs, InitArgs, MetricsArgs, ShowArgs, UsersArgs, ValidateArgs, collect, init_config, list_metrics, list_users,
    show_records, validate_config,
};
use crate::{Host, Result};
use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use clap::{Parser, Subcommand};

const CLAP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[derive(Parser, Debug)]
#[command(name = "life-stats", version, author, long_about = None)]
#[command(about = "Collect personal metrics from third-party APIs into a per-user time series store")]
#[command(styles = CLAP_STYLES)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch new data for every (metric, user) pair and store it
    Collect(Box<CollectArgs>),
    /// List the registered metrics
    Metrics(MetricsArgs),
    /// List the users known to the store
    Users(UsersArgs),
    /// Print the stored records of one user and metric type
    Show(Box<ShowArgs>),
    /// Generate a default configuration file
    Init(InitArgs),
    /// Validate a configuration file
    Validate(ValidateArgs),
}

/// Dispatch command-line arguments to the appropriate handler
///
/// # Arguments
///
/// * `args` - An iterator of command-line arguments (typically from `std::env::args()`)
///
/// # Errors
///
/// Returns an error if command parsing fails or if the executed command fails
pub async fn run<I, T, H>(host: &mut H, args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
    H: Host,
{
    match &Cli::parse_from(args).command {
        Command::Collect(collect_args) => collect(host, collect_args).await,
        Command::Metrics(metrics_args) => list_metrics(host, metrics_args),
        Command::Users(users_args) => list_users(host, users_args).await,
        Command::Show(show_args) => show_records(host, show_args).await,
        Command::Init(init_args) => init_config(host, init_args),
        Command::Validate(validate_args) => validate_config(host, validate_args),
    }
}
