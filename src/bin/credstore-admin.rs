//! Credential store administration CLI.
//!
//! Inspects and maintains client registrations and issued tokens directly in
//! the configured backend.
//!
//! ## Usage Examples
//!
//! ```bash
//! # Register a client
//! credstore-admin clients create --id my-client --secret s3cret \
//!   --domain example.com --user-id alice
//!
//! # Look up a token by its access value
//! credstore-admin tokens get --access "access_token_here"
//!
//! # Remove expired tokens now instead of waiting for the reclaimer
//! credstore-admin tokens reclaim
//! ```
//!
//! ## Environment Variables
//!
//! - `STORAGE_BACKEND`: `memory`, `sqlite` (default), or `postgres`
//! - `DATABASE_URL`: connection string for the selected backend (required for postgres)
//! - `CLIENTS_TABLE_NAME`, `TOKENS_TABLE_NAME`: table overrides
//! - `RUST_LOG`: log filter
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error (configuration, connection, storage)
//! - 2: Record not found

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use credstore::{
    config::{BackendConfig, StoreConfig},
    errors::StorageError,
    oauth::{ClientRecord, ClientRegistry, CredentialStore},
    storage::{ClientStore, TokenStore, create_storage_backend, parse_storage_backend},
};
use serde_json::json;
use std::process;
use tracing_subscriber::prelude::*;

/// Main CLI application structure
#[derive(Parser)]
#[command(
    name = "credstore-admin",
    about = "Credential store administration tool",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage client registrations
    #[command(subcommand)]
    Clients(ClientCommands),

    /// Manage issued tokens
    #[command(subcommand)]
    Tokens(TokenCommands),
}

#[derive(Subcommand)]
enum ClientCommands {
    /// Register a new client
    Create(CreateClientArgs),
    /// Show a client
    Get(ClientIdArgs),
    /// Delete a client
    Remove(ClientIdArgs),
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Show the token holding a key
    Get(TokenKeyArgs),
    /// Delete the token holding a key
    Remove(TokenKeyArgs),
    /// Delete every expired token now
    Reclaim,
}

#[derive(Args)]
struct CreateClientArgs {
    #[arg(long)]
    id: String,
    #[arg(long)]
    secret: String,
    #[arg(long)]
    domain: String,
    #[arg(long = "user-id")]
    user_id: String,
}

#[derive(Args)]
struct ClientIdArgs {
    #[arg(long)]
    id: String,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct TokenKeyArgs {
    /// Authorization code
    #[arg(long)]
    code: Option<String>,
    /// Access token
    #[arg(long)]
    access: Option<String>,
    /// Refresh token
    #[arg(long)]
    refresh: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "credstore=info,warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!("Error: {err:#}");
        let not_found = err
            .downcast_ref::<StorageError>()
            .is_some_and(StorageError::is_not_found);
        process::exit(if not_found { 2 } else { 1 });
    }
}

async fn run(cli: Cli) -> Result<()> {
    let backend_config = BackendConfig::new()?;
    let backend = parse_storage_backend(
        &backend_config.storage_backend,
        backend_config.database_url.as_deref(),
    )?;
    tracing::debug!(?backend, "Opening storage backend");
    let records = create_storage_backend(backend).await?;

    match cli.command {
        Commands::Clients(command) => {
            let config = StoreConfig::from_env("CLIENTS", StoreConfig::clients())?;
            let registry = ClientRegistry::new(records, config).await?;
            let result = run_client_command(&registry, command).await;
            registry.close();
            result
        }
        Commands::Tokens(command) => {
            let config = StoreConfig::from_env("TOKENS", StoreConfig::tokens())?;
            let store = CredentialStore::new(records, config).await?;
            let result = run_token_command(&store, command).await;
            store.shutdown().await;
            result
        }
    }
}

async fn run_client_command(registry: &ClientRegistry, command: ClientCommands) -> Result<()> {
    match command {
        ClientCommands::Create(args) => {
            let client = ClientRecord::new(args.id, args.secret, args.domain, args.user_id);
            registry.create(&client).await?;
            tracing::info!(client_id = %client.id, "Client registered");
            print_json(&json!({ "created": client.id }))
        }
        ClientCommands::Get(args) => {
            let client = registry.get_by_id(&args.id).await?;
            print_json(&client)
        }
        ClientCommands::Remove(args) => {
            registry.remove_by_id(&args.id).await?;
            print_json(&json!({ "removed": args.id }))
        }
    }
}

async fn run_token_command(store: &CredentialStore, command: TokenCommands) -> Result<()> {
    match command {
        TokenCommands::Get(key) => {
            let token = match key {
                TokenKeyArgs { code: Some(code), .. } => store.get_by_code(&code).await?,
                TokenKeyArgs {
                    access: Some(access),
                    ..
                } => store.get_by_access(&access).await?,
                TokenKeyArgs {
                    refresh: Some(refresh),
                    ..
                } => store.get_by_refresh(&refresh).await?,
                _ => None,
            };
            print_json(&token)
        }
        TokenCommands::Remove(key) => {
            match key {
                TokenKeyArgs { code: Some(code), .. } => store.remove_by_code(&code).await?,
                TokenKeyArgs {
                    access: Some(access),
                    ..
                } => store.remove_by_access(&access).await?,
                TokenKeyArgs {
                    refresh: Some(refresh),
                    ..
                } => store.remove_by_refresh(&refresh).await?,
                _ => {}
            }
            print_json(&json!({ "removed": true }))
        }
        TokenCommands::Reclaim => {
            let removed = store.reclaim_now().await?;
            tracing::info!(removed, "Expired tokens reclaimed");
            print_json(&json!({ "removed": removed }))
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
