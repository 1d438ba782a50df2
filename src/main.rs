use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn try_main() -> anyhow::Result<()> {
    let cli = sidenav_sync::cli::Cli::parse();
    sidenav_sync::logging::init(cli.verbose).context("init logging")?;
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        sidenav_sync::cli::Command::Sync(args) => {
            sidenav_sync::sync::run(args).context("sync")?;
        }
        sidenav_sync::cli::Command::Pull(args) => {
            sidenav_sync::pull::run(args).context("pull")?;
        }
    }

    Ok(())
}
