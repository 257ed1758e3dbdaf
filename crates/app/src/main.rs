//! Poker - real-time planning poker
//!
//! `poker serve` shares a store over TCP; `host`, `join` and `local` open a
//! line console on a game.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use poker_core::{LocalStore, SessionController, SessionStore};
use poker_net::{InviteTarget, InviteUrl, RemoteStore, StoreServer};

mod clipboard;
mod command;
mod config;
mod console;
mod render;

use config::AppConfig;
use console::Console;

#[derive(Parser, Debug)]
#[command(name = "poker", version, about = "Real-time planning poker")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Serve a shared session store
    Serve {
        #[arg(long)]
        port: Option<u16>,
        /// SQLite file to keep games in
        #[arg(long)]
        database: Option<PathBuf>,
    },
    /// Create a game on a server and host it
    Host {
        /// Game name
        #[arg(long)]
        game: String,
        /// Your display name
        #[arg(long)]
        name: Option<String>,
        /// Server as host[:port]
        #[arg(long)]
        server: Option<String>,
    },
    /// Join a game by invite code or poker:// link
    Join {
        invite: String,
        #[arg(long)]
        name: Option<String>,
        /// Server as host[:port], ignored when the invite is a link
        #[arg(long)]
        server: Option<String>,
    },
    /// Play a single-machine game with an in-memory store
    Local {
        #[arg(long)]
        game: String,
        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they don't interleave with the console on stdout
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.mode {
        Mode::Serve { port, database } => serve(config, port, database).await,
        Mode::Host { game, name, server } => {
            let name = player_name(name, &config)?;
            let server = server.unwrap_or_else(|| config.server.clone());
            host(&server, &game, &name).await
        }
        Mode::Join {
            invite,
            name,
            server,
        } => {
            let name = player_name(name, &config)?;
            join(&invite, server, &name, &config).await
        }
        Mode::Local { game, name } => {
            let name = player_name(name, &config)?;
            local(&game, &name).await
        }
    }
}

fn player_name(flag: Option<String>, config: &AppConfig) -> anyhow::Result<String> {
    match flag.or_else(|| config.player_name.clone()) {
        Some(name) if !name.trim().is_empty() => Ok(name.trim().to_string()),
        _ => bail!("a player name is required, pass --name or set player_name in the config"),
    }
}

async fn serve(
    mut config: AppConfig,
    port: Option<u16>,
    database: Option<PathBuf>,
) -> anyhow::Result<()> {
    if let Some(database) = database {
        config.database = database;
    }
    let path = config.prepare_database()?;
    let store = LocalStore::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let server = StoreServer::start(port.unwrap_or(config.port), Arc::new(store)).await?;
    println!("Serving games on {} (Ctrl-C to stop)", server.addr());

    tokio::signal::ctrl_c().await?;
    server.shutdown();
    Ok(())
}

async fn connect(server: &str) -> anyhow::Result<Arc<dyn SessionStore>> {
    let remote = RemoteStore::connect(server)
        .await
        .with_context(|| format!("could not reach a poker server at {}", server))?;
    tracing::info!(server = %server, "Connected");
    Ok(Arc::new(remote))
}

async fn host(server: &str, game: &str, name: &str) -> anyhow::Result<()> {
    let store = connect(server).await?;
    let mut controller = SessionController::new(store);
    let code = controller.create_game(game, name).await?;
    let invite = InviteUrl::for_server(server, code)?;
    Console::new(controller, Some(invite)).run().await
}

async fn join(
    invite: &str,
    server: Option<String>,
    name: &str,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let target = InviteTarget::parse(invite)?;
    let server = target
        .server()
        .or(server)
        .unwrap_or_else(|| config.server.clone());

    let store = connect(&server).await?;
    let mut controller = SessionController::new(store);
    controller.join_game(target.code().as_str(), name).await?;
    let invite = InviteUrl::for_server(&server, target.code().clone())?;
    Console::new(controller, Some(invite)).run().await
}

async fn local(game: &str, name: &str) -> anyhow::Result<()> {
    let store: Arc<dyn SessionStore> = Arc::new(LocalStore::open_in_memory()?);
    let mut controller = SessionController::new(store);
    controller.create_game(game, name).await?;
    Console::new(controller, None).run().await
}
