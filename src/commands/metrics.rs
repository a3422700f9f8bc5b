use super::Host;
use super::common::{Common, CommonArgs};
use crate::Result;
use clap::Parser;
use std::io::Write;

#[derive(Parser, Debug)]
pub struct MetricsArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

/// Print the name of every registered metric, one per line.
pub fn list_metrics<H: Host>(host: &mut H, args: &MetricsArgs) -> Result<()> {
    let common = Common::new(&args.common)?;
    let registry = common.registry()?;

    for name in registry.list() {
        let _ = writeln!(host.output(), "{name}");
    }

    Ok(())
}
