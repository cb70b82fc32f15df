//! HomeLink Agent
//!
//! Thin binary over `homelink-engine`: loads the TOML config, initializes
//! logging, wires the engine services together and exposes a small CLI for
//! inspecting ledger state, tailing the conversation list and clearing the
//! viewed-property history. The remote seams are served by the in-memory
//! stubs until a backend adapter is configured.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use homelink_engine::remote::stubs::stub_pair;
use homelink_engine::{
    CreditLedger, CreditLedgerConfig, IdentityResolver, LocalStore, Role, SqliteStore, SyncConfig,
    SyncService, UserId, ViewedHistory,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;

#[derive(Parser)]
#[command(name = "homelink-agent", about = "HomeLink client engine agent", version)]
struct Cli {
    /// Config file path (default: platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the current credit ledger state
    Status,
    /// Run the conversation synchronizer and log published views
    Run {
        /// Authenticated user id
        #[arg(long)]
        user: String,
        /// Side of the marketplace the user is on
        #[arg(long, value_enum, default_value_t = RoleArg::Buyer)]
        role: RoleArg,
    },
    /// Viewed-property history operations
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },
}

#[derive(Subcommand)]
enum HistoryCommand {
    /// List history entries, newest first
    List,
    /// Clear the whole history
    Clear,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RoleArg {
    Buyer,
    Seller,
    Agent,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Buyer => Role::Buyer,
            RoleArg::Seller => Role::Seller,
            RoleArg::Agent => Role::Agent,
        }
    }
}

fn open_store(config: &Config) -> Result<Arc<dyn LocalStore>> {
    let store = match &config.storage.path {
        Some(path) => SqliteStore::open(path),
        None => SqliteStore::new(),
    }
    .context("failed to open engine store")?;
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let config = Config::load_or_create(&config_path)?;
    info!(config = %config_path.display(), "agent starting");

    match cli.command {
        Command::Status => {
            let store = open_store(&config)?;
            let ledger = CreditLedger::initialize(
                store,
                CreditLedgerConfig {
                    max_credits: config.credits.max,
                },
            )
            .await;
            let state = ledger.state().await;
            println!("credits: {}/{}", state.remaining, state.max);
        }
        Command::Run { user, role } => {
            let (conversations, listings) = stub_pair();
            let identity = Arc::new(IdentityResolver::new(conversations.clone(), listings));
            let sync = SyncService::new(
                conversations,
                identity,
                SyncConfig {
                    pull_timeout: Duration::from_secs(config.sync.pull_timeout_secs),
                },
            );

            let handle = sync.start(UserId::new(user), role.into()).await?;
            let mut view = handle.view();
            info!("sync running, press Ctrl-C to stop");
            loop {
                tokio::select! {
                    changed = view.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let items = view.borrow().clone();
                        info!(count = items.len(), "conversation list updated");
                        for item in &items {
                            println!(
                                "{}  {}  [{}] {}",
                                item.last_activity_at,
                                item.counterparty.display_name,
                                item.listing_id,
                                item.last_message_preview,
                            );
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        handle.stop();
                        break;
                    }
                }
            }
        }
        Command::History { command } => {
            let store = open_store(&config)?;
            let history = ViewedHistory::load(store).await;
            match command {
                HistoryCommand::List => {
                    for entry in history.all().await {
                        println!(
                            "{}  {}  {}  ({:?})",
                            entry.viewed_at, entry.listing_id, entry.listing_title, entry.action,
                        );
                    }
                }
                HistoryCommand::Clear => {
                    history.clear().await?;
                    println!("history cleared");
                }
            }
        }
    }

    Ok(())
}
