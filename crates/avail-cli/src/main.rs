//! Avail CLI - Command-line interface for the availability service
//!
//! `avail serve` runs the WebSocket server. Every other command talks to a
//! running server over the Availability Protocol, because the store's
//! database can only be opened by one process at a time.

use avail_core::{AvailabilityStatus, Profession, ProfessionalId, SlotId};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "avail")]
#[command(author = "Avail Contributors")]
#[command(version)]
#[command(about = "Real-time availability for on-call professionals", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Server URL (defaults to the address in .avail/config.json)
    #[arg(long, global = true)]
    url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a project directory with a default config
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Start the availability server
    Serve {
        /// Port to listen on (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,

        /// Headless mode: bind to 0.0.0.0 for remote access
        #[arg(long)]
        headless: bool,

        /// Project directory holding .avail/ (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Register a professional
    Register {
        /// Display name
        name: String,

        /// Profession (healthcare_professional, emergency_services, it_support, customer_service)
        #[arg(short, long)]
        profession: Profession,

        /// Identifier (generated when omitted)
        #[arg(long)]
        id: Option<ProfessionalId>,

        /// Initial status (defaults to offline)
        #[arg(short, long)]
        status: Option<AvailabilityStatus>,
    },

    /// Change a professional's status
    Set {
        id: ProfessionalId,

        /// available, busy, offline or emergency
        status: AvailabilityStatus,

        /// Why the status changed
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Show one professional, or everyone when no id is given
    Status { id: Option<ProfessionalId> },

    /// Show the status history of a professional
    History {
        id: ProfessionalId,

        /// Maximum events to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show the latest status changes across every professional
    Recent {
        /// Maximum events to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Register every professional listed in a roster JSON file
    Import { file: PathBuf },

    /// Print status changes of the given professionals as they happen
    Watch {
        #[arg(required = true)]
        ids: Vec<ProfessionalId>,
    },

    /// Manage scheduled availability slots
    Slot {
        #[command(subcommand)]
        command: SlotCommands,
    },

    /// Show server statistics
    Info,
}

#[derive(Subcommand)]
enum SlotCommands {
    /// Schedule a status for a time window
    Add {
        id: ProfessionalId,

        /// Window start (RFC 3339)
        start: DateTime<Utc>,

        /// Window end (RFC 3339), exclusive
        end: DateTime<Utc>,

        /// Status applied while the window is active
        status: AvailabilityStatus,
    },

    /// List a professional's slots
    List { id: ProfessionalId },

    /// Remove a slot
    Remove { id: ProfessionalId, slot: SlotId },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let url = cli.url;
    let result = match cli.command {
        Commands::Init { path } => commands::init(&path),
        Commands::Serve {
            port,
            headless,
            path,
        } => commands::serve(port, headless, &path).await,
        Commands::Register {
            name,
            profession,
            id,
            status,
        } => commands::register(url, name, profession, id, status).await,
        Commands::Set { id, status, reason } => commands::set(url, id, status, reason).await,
        Commands::Status { id } => commands::status(url, id).await,
        Commands::History { id, limit } => commands::history(url, id, limit).await,
        Commands::Recent { limit } => commands::recent(url, limit).await,
        Commands::Import { file } => commands::import(url, &file).await,
        Commands::Watch { ids } => commands::watch(url, ids).await,
        Commands::Slot { command } => match command {
            SlotCommands::Add {
                id,
                start,
                end,
                status,
            } => commands::slot_add(url, id, start, end, status).await,
            SlotCommands::List { id } => commands::slot_list(url, id).await,
            SlotCommands::Remove { id, slot } => commands::slot_remove(url, id, slot).await,
        },
        Commands::Info => commands::info(url).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_set() {
        let cli = Cli::try_parse_from(["avail", "set", "dr-grey", "Busy", "-r", "surgery"]).unwrap();
        let Commands::Set { id, status, reason } = cli.command else {
            panic!("expected set");
        };
        assert_eq!(id.as_str(), "dr-grey");
        assert_eq!(status, AvailabilityStatus::Busy);
        assert_eq!(reason.as_deref(), Some("surgery"));
    }

    #[test]
    fn test_parse_rejects_unknown_status() {
        assert!(Cli::try_parse_from(["avail", "set", "dr-grey", "napping"]).is_err());
    }

    #[test]
    fn test_parse_recent_limit() {
        let cli = Cli::try_parse_from(["avail", "recent", "-l", "5"]).unwrap();
        assert!(matches!(cli.command, Commands::Recent { limit: 5 }));

        let cli = Cli::try_parse_from(["avail", "recent"]).unwrap();
        assert!(matches!(cli.command, Commands::Recent { limit: 20 }));
    }

    #[test]
    fn test_parse_slot_add() {
        let cli = Cli::try_parse_from([
            "avail",
            "--url",
            "ws://127.0.0.1:9999",
            "slot",
            "add",
            "medic-7",
            "2030-01-01T09:00:00Z",
            "2030-01-01T17:00:00Z",
            "available",
        ])
        .unwrap();
        assert_eq!(cli.url.as_deref(), Some("ws://127.0.0.1:9999"));
        let Commands::Slot {
            command: SlotCommands::Add { start, end, .. },
        } = cli.command
        else {
            panic!("expected slot add");
        };
        assert!(start < end);
    }
}
