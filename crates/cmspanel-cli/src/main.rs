//! cmspanel - manage a cmspanel-powered website from the terminal.
//!
//! This binary is the composition root: it picks the credential store,
//! wires the session context, API client and session controller together,
//! and decides what happens when the server ends a session.

mod commands;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cmspanel_core::{ApiClient, Config, Resource, SessionContext, SessionController};

use commands::Panel;

#[derive(Parser)]
#[command(name = "cmspanel", version, about = "Manage website content from the command line")]
struct Cli {
    /// API base URL, overriding the config file and CMSPANEL_API_URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

impl From<Toggle> for bool {
    fn from(toggle: Toggle) -> bool {
        matches!(toggle, Toggle::On)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and store the session
    Login {
        #[arg(long)]
        email: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show who the stored session belongs to
    Whoami,
    /// List the records of a collection
    List { resource: Resource },
    /// Show one record
    Get { resource: Resource, id: String },
    /// Create a record from a JSON object
    Create {
        resource: Resource,
        #[arg(long)]
        data: String,
    },
    /// Update a record from a JSON object
    Update {
        resource: Resource,
        id: String,
        #[arg(long)]
        data: String,
    },
    /// Delete a record
    Delete { resource: Resource, id: String },
    /// Show or change the maintenance and coming-soon toggles
    Settings {
        #[arg(long)]
        maintenance: Option<Toggle>,
        #[arg(long)]
        coming_soon: Option<Toggle>,
    },
    /// Show notifications, optionally polling for new ones
    Notifications {
        #[arg(long)]
        watch: bool,
        /// Mark a notification as read
        #[arg(long)]
        read: Option<i64>,
    },
    /// Update your own profile
    Profile {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Record counts for every collection
    Dashboard,
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: Option<&PathBuf>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "cmspanel.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_dir.as_ref());

    let mut config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        Config::default()
    });
    config.api_url_override = cli.api_url.clone();
    info!(api = %config.api_base_url(), store = ?config.store, "cmspanel starting");

    let session = SessionContext::new(config.credential_store()?);
    let events = session.subscribe_events();
    let api = ApiClient::new(config.client_options(), session)?;
    let controller = SessionController::new(api).revoke_on_logout(config.revoke_on_logout);

    let mut panel = Panel::new(config, controller, events);
    let result = panel.run(cli.command).await;
    panel.route_session_events();
    result
}
