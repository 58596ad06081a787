//! CLI entrypoint for vdesk.

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = vdesk::Cli::parse();
    let _telemetry = vdesk::telemetry::init_tracing("info");
    let exit_code = vdesk::run(cli)?;
    std::process::exit(exit_code);
}
