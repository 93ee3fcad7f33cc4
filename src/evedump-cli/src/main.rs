mod cli;
mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands};

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Extract(args) => {
            commands::extract::handle(&args, &config)?;
        }

        Commands::Labels(args) => {
            let data_dir = config.data_dir(args.data_dir.as_deref());
            let dir = commands::labels::json_dir(args.json_dir.as_deref(), &data_dir);
            commands::labels::handle(&dir, &config)?;
        }

        Commands::Run { extract, json_dir } => {
            commands::run::handle(&extract, json_dir.as_deref(), &config)?;
        }

        Commands::Decode {
            input,
            output,
            compact,
        } => {
            commands::decode::handle(&input, output.as_deref(), compact)?;
        }

        Commands::Sniff { files } => {
            commands::sniff::handle(&files)?;
        }
    }

    Ok(())
}
