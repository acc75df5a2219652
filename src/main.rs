use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    shelfimport::logging::init().context("init logging")?;

    let cli = shelfimport::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        shelfimport::cli::Command::Init(args) => {
            shelfimport::catalog::init(args).context("init")?;
        }
        shelfimport::cli::Command::Collect(args) => {
            shelfimport::collect::run(args).await.context("collect")?;
        }
        shelfimport::cli::Command::Import(args) => {
            shelfimport::import::run(args).await.context("import")?;
        }
        shelfimport::cli::Command::Resolve(args) => {
            shelfimport::resolver::run(args).context("resolve")?;
        }
        shelfimport::cli::Command::Dedupe(args) => {
            shelfimport::resolver::dedupe(args).context("dedupe")?;
        }
    }

    Ok(())
}
