//! chat-cli - terminal chat client with typing indicators and read receipts
//!
//! Talks to a history service over HTTP and to a relay over WebSocket. The
//! relay itself ships in the same binary (`serve`).

mod api;
mod channel;
mod config;
mod conversation;
mod error;
mod models;
mod relay;
mod tui;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chat-cli")]
#[command(about = "Terminal chat client with typing indicators and read receipts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Save the username (and optionally the history service URL)
    Init {
        /// Username to chat as
        #[arg(short, long)]
        username: String,

        /// History service base URL, e.g. http://localhost:5000
        #[arg(short, long)]
        backend: Option<String>,
    },

    /// List contacts
    Users,

    /// Print the conversation with a contact
    Read {
        /// Contact username
        peer: String,
    },

    /// Send a message
    Send {
        /// Contact username
        #[arg(short, long)]
        to: String,

        /// Message content
        message: String,

        /// Print the frames that would be sent instead of connecting
        #[arg(long)]
        dry_run: bool,
    },

    /// Connect to the channel and print incoming events
    Listen,

    /// Run the relay server
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:5000")]
        bind: String,
    },

    /// Launch the terminal user interface
    Tui,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let filter = if cli.verbose { "debug" } else { "info" };

    // The TUI owns the terminal, so its logs go to the status feed instead.
    if let Commands::Tui = cli.command {
        let feed = tui::LogFeed::new();
        tracing_subscriber::registry()
            .with(env_filter(filter))
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(feed.clone()),
            )
            .init();
        return tui::run(feed).await;
    }

    tracing_subscriber::registry()
        .with(env_filter(filter))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Init { username, backend } => {
            config::init(&username, backend.as_deref())?;
        }
        Commands::Users => {
            api::list_users().await?;
        }
        Commands::Read { peer } => {
            api::read_messages(&peer).await?;
        }
        Commands::Send {
            to,
            message,
            dry_run,
        } => {
            tracing::info!("Sending message...");
            api::send_message(&to, &message, dry_run).await?;
        }
        Commands::Listen => {
            channel::listen().await?;
        }
        Commands::Serve { bind } => {
            relay::serve(&bind).await?;
        }
        Commands::Tui => {}
    }

    Ok(())
}

/// `RUST_LOG` wins over the `--verbose` default.
fn env_filter(default: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into())
}
