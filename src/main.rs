//! Garage Ledger Server
//!
//! Task, point and work-hour tracking for a small repair shop, with
//! realtime change notifications.

use anyhow::Result;
use clap::Parser;
use garage_ledger::api;
use garage_ledger::cli::{Cli, Command, ServeArgs, points};
use garage_ledger::config::Config;
use garage_ledger::db::Database;
use std::fs::OpenOptions;
use std::path::Path;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on --log option
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    match cli.log.as_str() {
        "0" | "off" => {
            // No logging
        }
        "1" | "stdout" => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(std::io::stdout)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        "2" | "stderr" => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        filename => {
            // Log to file (append mode)
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(filename)?;
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(file)
                .with_ansi(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    let mut config = Config::discover(cli.config.as_deref().map(Path::new))?;

    // Override paths from CLI arguments
    if let Some(db_path) = &cli.database {
        config.server.db_path = db_path.into();
    }

    match cli.command {
        Some(Command::ResetPoints(args)) => {
            let db = open_database(&config)?;
            points::run_reset_points(&db, &args)?;
        }
        Some(Command::Points) => {
            let db = open_database(&config)?;
            points::run_points(&db)?;
        }
        Some(Command::Serve(args)) => run_server(config, args).await?,
        None => run_server(config, ServeArgs::default()).await?,
    }

    Ok(())
}

fn open_database(config: &Config) -> Result<Database> {
    config.ensure_db_dir()?;
    let db = Database::open(&config.server.db_path)?;
    info!(path = %config.server.db_path.display(), "Database opened");
    Ok(db)
}

async fn run_server(mut config: Config, args: ServeArgs) -> Result<()> {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let db = open_database(&config)?;
    let (shutdown_tx, _addr, handle) = api::start_server(db, &config).await?;

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl-C");
    let _ = shutdown_tx.send(());
    handle.await?;

    Ok(())
}
