use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod error;
mod http;
mod i18n;
mod media;
mod store;
mod translate;

use config::Config;
use store::Store;

/// A self-hosted image tagging web application.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (the default).
    Serve,
    /// Clear the existing database and (re)create the tables.
    InitDb,
    /// Bump the version of localization resource files after a release
    /// that changed no localized text.
    BumpResources,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => http::serve(cfg).await,
        Command::InitDb => {
            let store = Store::new(&cfg.database);
            store.reset_schema().context("resetting the database schema")?;
            info!("Initialized the database at {}", store.path().display());
            Ok(())
        }
        Command::BumpResources => {
            let renamed = i18n::bump_versions(&cfg.resources_folder)
                .context("bumping resource file versions")?;
            info!("Version bump complete: {renamed} file(s) renamed");
            Ok(())
        }
    }
}
