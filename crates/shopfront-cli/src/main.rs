//! Shopfront CLI - sign in to a shopfront GraphQL API and run operations
//! with the persisted session.
//!
//! # Usage
//!
//! ```bash
//! shopfront login -e ada@example.com
//! shopfront whoami
//! shopfront query orders.graphql --variables '{"first": 10}'
//! shopfront status
//! shopfront logout
//! ```
//!
//! The session survives between runs in the storage backend chosen in the
//! config file. Expired access tokens are refreshed transparently.

#![cfg_attr(not(test), forbid(unsafe_code))]

mod commands;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use shopfront_core::{Config, GraphQLClient, SessionStore};

/// Directory for a daily rolling log file, in addition to stderr
const LOG_DIR_ENV: &str = "SHOPFRONT_LOG_DIR";

const LOG_FILE_PREFIX: &str = "shopfront.log";

#[derive(Parser)]
#[command(name = "shopfront")]
#[command(author, version, about = "Shopfront GraphQL client")]
struct Cli {
    /// GraphQL endpoint, overriding config and SHOPFRONT_API_URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login {
        /// Account email (defaults to the last one used)
        #[arg(short, long)]
        email: Option<String>,
    },
    /// Create an account and sign in
    Register {
        #[arg(short, long)]
        email: String,

        /// Display name
        #[arg(short, long)]
        name: String,
    },
    /// Show the account behind the current session
    Whoami,
    /// Show local session state without contacting the server
    Status,
    /// Run a GraphQL document from a file
    Query {
        /// File containing the operation
        file: PathBuf,

        /// Variables as a JSON object
        #[arg(long)]
        variables: Option<String>,

        /// Operation to run when the file holds several
        #[arg(long)]
        operation: Option<String>,
    },
    /// End the session
    Logout,
}

/// Initialize the tracing subscriber for logging.
///
/// RUST_LOG controls the level (defaults to `warn`). The returned guard must
/// be held until exit so buffered file output is flushed.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var_os(LOG_DIR_ENV) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
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
async fn main() {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _guard = init_tracing();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load()?;

    let mut transport = config.transport();
    if let Some(url) = cli.api_url {
        transport.endpoint = url;
    }

    let storage = config.open_storage(&transport.endpoint)?;
    let session = Arc::new(SessionStore::new(storage));
    let restored = session.hydrate();
    info!(endpoint = %transport.endpoint, restored, "Starting");

    let client = GraphQLClient::new(transport, session).context("Failed to create HTTP client")?;

    match cli.command {
        Commands::Login { email } => commands::login(&client, &mut config, email).await,
        Commands::Register { email, name } => {
            commands::register(&client, &mut config, email, name).await
        }
        Commands::Whoami => commands::whoami(&client).await,
        Commands::Status => {
            commands::status(&client, &config);
            Ok(())
        }
        Commands::Query {
            file,
            variables,
            operation,
        } => commands::query(&client, &file, variables.as_deref(), operation).await,
        Commands::Logout => {
            client.logout().await;
            println!("Logged out");
            Ok(())
        }
    }
}
