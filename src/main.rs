use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use credbroker::client::JenkinsClientFactory;
use credbroker::config::ConfigWrite;
use credbroker::duration::parse_ttl;
use credbroker::lease::Lease;
use credbroker::settings::{default_settings_path, ResolvedSettings};
use credbroker::storage::JsonFileStorage;
use credbroker::users::NewUser;
use credbroker::Backend;
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "credbroker")]
#[command(about = "Issue short-lived Jenkins users and API tokens")]
struct Cli {
    /// Path to settings file
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage the Jenkins connection configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Manage ephemeral Jenkins users
    Users {
        #[command(subcommand)]
        command: UsersCommand,
    },
    /// Generate API tokens for the configured user
    Tokens {
        #[command(subcommand)]
        command: TokensCommand,
    },
    /// Renew or revoke an issued lease
    Lease {
        #[command(subcommand)]
        command: LeaseCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Show the configuration (without the password)
    Read,
    /// Create or update the configuration
    Write {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        url: Option<String>,
        /// Skip the connection check after saving
        #[arg(long)]
        no_validate: bool,
    },
    /// Remove the configuration
    Delete,
}

#[derive(Subcommand)]
enum UsersCommand {
    /// Create a user
    Create {
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "")]
        fullname: String,
        #[arg(long, default_value = "")]
        email: String,
        /// Lease TTL, e.g. "1h" or "3600"
        #[arg(long, value_parser = parse_ttl)]
        ttl: Option<Duration>,
        #[arg(long, value_parser = parse_ttl)]
        max_ttl: Option<Duration>,
    },
    /// Show a user created through this broker
    Read { username: String },
    /// List users created through this broker
    List,
    /// Delete a user
    Delete { username: String },
}

#[derive(Subcommand)]
enum TokensCommand {
    /// Generate a token
    Create {
        name: String,
        #[arg(long, value_parser = parse_ttl)]
        ttl: Option<Duration>,
        #[arg(long, value_parser = parse_ttl)]
        max_ttl: Option<Duration>,
    },
}

#[derive(Subcommand)]
enum LeaseCommand {
    /// Renew a lease read from a JSON file
    Renew { lease: PathBuf },
    /// Revoke a lease read from a JSON file
    Revoke { lease: PathBuf },
}

fn init_tracing(json_logs: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry
            .with(fmt::layer().with_writer(std::io::stderr).json())
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_lease(path: &Path) -> Result<Lease> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read lease file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse lease file: {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let settings_path = cli.settings.unwrap_or_else(default_settings_path);
    let settings = ResolvedSettings::load_or_default(&settings_path)
        .with_context(|| format!("Failed to load settings: {}", settings_path.display()))?;
    tracing::debug!(data_dir = %settings.data_dir.display(), "Loaded settings");

    let storage = Arc::new(JsonFileStorage::new(&settings.data_dir));
    let factory = Arc::new(JenkinsClientFactory::new().with_timeout(settings.http.timeout));
    let backend = Backend::new(storage, factory);
    let defaults = settings.lease.defaults();

    match cli.command {
        Command::Config { command } => match command {
            ConfigCommand::Read => {
                let view = backend.config().read().await?;
                print_json(&view)?;
            }
            ConfigCommand::Write {
                username,
                password,
                url,
                no_validate,
            } => {
                let params = ConfigWrite {
                    username,
                    password: password.map(Into::into),
                    url,
                    validate: Some(!no_validate),
                };
                backend.config().write(params).await?;
                print_json(&json!({ "success": true }))?;
            }
            ConfigCommand::Delete => {
                backend.config().delete().await?;
                print_json(&json!({ "success": true }))?;
            }
        },
        Command::Users { command } => match command {
            UsersCommand::Create {
                username,
                password,
                fullname,
                email,
                ttl,
                max_ttl,
            } => {
                let user = NewUser::new(username, password, fullname, email)
                    .with_ttl(ttl.unwrap_or_default())
                    .with_max_ttl(max_ttl.unwrap_or_default());
                let response = backend.users().create(user).await?;
                print_json(&json!({
                    "data": response.data,
                    "lease": response.lease,
                    "effective_ttl": response.lease.effective_ttl(&defaults).as_secs(),
                }))?;
            }
            UsersCommand::Read { username } => {
                let user = backend.users().read(&username).await?;
                print_json(&user)?;
            }
            UsersCommand::List => {
                let keys = backend.users().list().await?;
                print_json(&json!({ "keys": keys }))?;
            }
            UsersCommand::Delete { username } => {
                backend.users().delete(&username).await?;
                print_json(&json!({ "success": true }))?;
            }
        },
        Command::Tokens { command } => match command {
            TokensCommand::Create { name, ttl, max_ttl } => {
                let response = backend
                    .tokens()
                    .create(&name, ttl.unwrap_or_default(), max_ttl.unwrap_or_default())
                    .await?;
                print_json(&json!({
                    "data": response.data,
                    "lease": response.lease,
                    "effective_ttl": response.lease.effective_ttl(&defaults).as_secs(),
                }))?;
            }
        },
        Command::Lease { command } => match command {
            LeaseCommand::Renew { lease } => {
                let lease = read_lease(&lease)?;
                let renewed = backend.leases().renew(&lease)?;
                print_json(&json!({
                    "lease": renewed,
                    "effective_ttl": renewed.effective_ttl(&defaults).as_secs(),
                }))?;
            }
            LeaseCommand::Revoke { lease } => {
                let lease = read_lease(&lease)?;
                backend.leases().revoke(&lease).await?;
                print_json(&json!({ "success": true }))?;
            }
        },
    }

    Ok(())
}
