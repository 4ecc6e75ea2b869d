use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod auth;
mod config;
mod drive_api;
mod remote;
mod sync;
mod util;

use remote::{DriveConnector, RemoteConnector};

#[derive(Parser)]
#[command(
    name = "drivepush",
    version,
    about = "One-way upload sync of a local folder tree to Google Drive"
)]
struct Cli {
    /// Path to config file [default: ~/.config/drivepush/config.toml]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Authorize drivepush with Google Drive (opens browser for OAuth)
    Auth,
    /// Upload new local files to the target Drive folder
    Sync {
        /// Report what would be uploaded without uploading
        #[arg(long)]
        dry_run: bool,
    },
    /// List every file under a Drive folder
    Tree {
        /// Folder id to list [default: sync.target_folder_id]
        #[arg(long)]
        folder: Option<String>,
    },
}

fn init_tracing(verbosity: u8) {
    let default_filter = match verbosity {
        0 => "drivepush=info",
        1 => "drivepush=debug",
        2 => "drivepush=trace",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = config::resolve_config_path(cli.config.as_deref())?;

    match cli.command {
        Command::Auth => run_auth(&config_path).await,
        Command::Sync { dry_run } => run_sync(&config_path, dry_run).await,
        Command::Tree { folder } => run_tree(&config_path, folder).await,
    }
}

/// Load the config and obtain fresh credentials. Errors here end the run.
async fn connect(config_path: &Path) -> Result<(config::Config, auth::Credentials)> {
    let cfg = config::load_config(config_path)?;
    let secret = cfg.auth.client_secret(config_path.parent())?;
    let credentials = auth::authenticate(&secret, &cfg.auth).await?;
    Ok((cfg, credentials))
}

async fn run_sync(config_path: &Path, dry_run: bool) -> Result<()> {
    let (cfg, credentials) = connect(config_path).await?;
    let workers = sync::dispatcher::pool_size(cfg.general.max_workers);
    tracing::info!(
        local = %cfg.sync.local_folder_path.display(),
        target = %cfg.sync.target_folder_id,
        workers,
        dry_run,
        "starting sync"
    );

    let connector = Arc::new(DriveConnector::new(cfg.general.page_size));
    let options = sync::SyncOptions {
        dry_run,
        show_progress: std::io::stderr().is_terminal(),
    };
    let engine = sync::SyncEngine::new(connector, credentials, cfg.sync, workers, options);
    let stats = engine.run().await?;
    stats.print_summary(dry_run);
    Ok(())
}

async fn run_tree(config_path: &Path, folder: Option<String>) -> Result<()> {
    let (cfg, credentials) = connect(config_path).await?;
    let folder_id = folder.unwrap_or_else(|| cfg.sync.target_folder_id.clone());
    let store = DriveConnector::new(cfg.general.page_size).connect(credentials)?;
    let entries = sync::tree::walk_remote(
        &store,
        &folder_id,
        "",
        &cfg.sync.skip_patterns,
        cfg.sync.match_mode,
    )
    .await?;

    for entry in &entries {
        match entry.size {
            Some(size) => println!("{}  ({size} bytes)", entry.relative_path),
            None => println!("{}", entry.relative_path),
        }
    }
    println!();
    println!("{} files", entries.len());
    Ok(())
}

/// Works without a config file when credentials are built in.
async fn run_auth(config_path: &Path) -> Result<()> {
    let auth_cfg = match config::load_config(config_path) {
        Ok(c) => c.auth,
        Err(_) if !config_path.exists() => {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            config::AuthConfig::default()
        }
        Err(e) => return Err(e),
    };
    let secret = auth_cfg.client_secret(config_path.parent())?;
    let tokens = auth::run_auth_flow(&secret, &auth_cfg).await?;

    let credentials = auth::Credentials {
        client_id: secret.client_id,
        client_secret: secret.client_secret,
        tokens,
    };
    let client = DriveConnector::new(config::GeneralConfig::default().page_size).connect(credentials)?;
    match client.about_user().await {
        Ok(user) => println!("Authenticated as {user}"),
        Err(e) => tracing::warn!(error = %format!("{e:#}"), "authorized, but could not fetch account info"),
    }
    Ok(())
}
