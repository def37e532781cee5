//! tgpg CLI: run the bot dispatcher and poke at its database.

use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tgpg::action::LogAction;
use tgpg::config::Config;
use tgpg::db::Db;
use tgpg::engine::{ControlConfig, ControlPlane, DispatcherConfig, LISTEN_CHANNEL};
use tgpg::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "tgpg", about = "Telegram bot notification dispatcher")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the dispatcher daemon
    Serve {
        /// Override the concurrency cap (defaults to the pool size)
        #[arg(long)]
        max_queue: Option<usize>,
    },
    /// Send a notification on the bot channel
    Notify {
        /// JSON payload
        payload: String,
    },
    /// Call the heartbeat function once
    Heartbeat,
    /// Check database connectivity
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { max_queue } => cmd_serve(max_queue).await,
        Command::Notify { payload } => cmd_notify(&connect().await?, &payload).await,
        Command::Heartbeat => {
            connect().await?.heartbeat().await?;
            println!("heartbeat ok");
            Ok(())
        }
        Command::Check => {
            connect().await?.health_check().await?;
            println!("database ok");
            Ok(())
        }
    }
}

/// Single-connection handle for one-shot commands.
async fn connect() -> anyhow::Result<Db> {
    let config = Config::from_env()?;
    Ok(Db::connect(config.database_url.expose_secret(), 1).await?)
}

async fn cmd_serve(max_queue: Option<usize>) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        log_level: config.log_level.clone(),
        endpoint: config.otel_endpoint.clone(),
        service_name: "tgpg".to_string(),
    })?;

    let db = Db::connect(config.database_url.expose_secret(), config.pool_size as u32).await?;

    let mut dispatcher = config.dispatcher();
    if let Some(max_queue) = max_queue {
        anyhow::ensure!(max_queue > 0, "--max-queue must be at least 1");
        dispatcher.max_queue = max_queue;
    }

    let control = ControlPlane::new(
        Arc::new(db),
        Arc::new(LogAction),
        ControlConfig {
            tick_interval: config.tick_interval,
            dispatcher,
            ..ControlConfig::default()
        },
    )
    .with_reloader(Arc::new(move || -> tgpg::error::Result<DispatcherConfig> {
        dotenvy::dotenv().ok();
        let mut reloaded = Config::from_env()?.dispatcher();
        if let Some(max_queue) = max_queue {
            reloaded.max_queue = max_queue;
        }
        Ok(reloaded)
    }));

    control.run().await?;
    Ok(())
}

async fn cmd_notify(db: &Db, payload: &str) -> anyhow::Result<()> {
    // Reject bad JSON here rather than let the dispatcher log it.
    let value: serde_json::Value = serde_json::from_str(payload)?;
    db.notify(LISTEN_CHANNEL, &value.to_string()).await?;
    println!("notified {LISTEN_CHANNEL}");
    Ok(())
}
