use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

mod dispatch;
mod logging;
mod render;

#[derive(Parser, Debug)]
#[command(name = "devstrap", version)]
#[command(
    about = "Provision a developer workstation: CLI tools, shell setup and config files",
    long_about = None
)]
struct Cli {
    /// Announce every action without installing or writing anything.
    #[arg(long)]
    dry_run: bool,
    /// Provisioning plan to use instead of the built-in one.
    #[arg(long, env = "DEVSTRAP_PLAN", value_name = "PATH")]
    plan: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing()?;
    dispatch::run_cli(cli)
}
