mod cli;
mod commands;
mod config;
mod error;
mod export;
mod kie;
mod poller;
mod prompts;
mod session;
mod submitter;
mod tracking;
mod ui;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command};
use commands::GenerateArgs;
use config::VeoConfig;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "veobatch=debug" } else { "veobatch=info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = VeoConfig::load()?;

    match cli.command {
        Command::Generate {
            prompts,
            file,
            concurrency,
            session,
            aspect_ratio,
            no_watch,
            force,
        } => {
            let args = GenerateArgs {
                prompts,
                file,
                concurrency,
                session,
                aspect_ratio,
                no_watch,
                force,
            };
            commands::generate(&config, args).await
        }
        Command::Resume {
            session,
            concurrency,
        } => commands::resume(&config, session, concurrency).await,
        Command::Status { session } => commands::status(&config, session),
        Command::Select { ids, off, session } => commands::select(&config, &ids, off, session),
        Command::Export {
            session,
            output,
            bom,
        } => commands::export(&config, session, output, bom),
    }
}
