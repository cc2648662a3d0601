use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commitpulse::config::LoggingConfig;
use commitpulse::{server, Config, GitHubClient, RepositoryLister, SyncService};

#[derive(Parser)]
#[command(name = "commitpulse")]
#[command(about = "Collect a GitHub account's commits and serve daily commit counts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// Show which GitHub account and credentials would be used
    Auth,

    /// Run the HTTP server (/sync and /counts)
    Serve,

    /// Run one sync now and exit
    Sync,

    /// Print per-day commit counts for the lookback window
    Counts {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List the repositories a sync would scan
    Repos,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Commands::Init { force } = cli.command {
        init_logging(cli.verbose, &LoggingConfig::default());
        return cmd_init(cli.config, force);
    }

    let config = load_config(cli.config)?;
    init_logging(cli.verbose, &config.logging);
    info!("Starting commitpulse v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Auth => cmd_auth(&config).await,
        Commands::Serve => cmd_serve(&config).await,
        Commands::Sync => cmd_sync(&config).await,
        Commands::Counts { json } => cmd_counts(json, &config).await,
        Commands::Repos => cmd_repos(&config).await,
    }
}

/// Initialize logging from config, `--verbose` or `RUST_LOG`.
/// Logs go to stderr so `counts --json` stays machine-readable.
fn init_logging(verbose: bool, logging: &LoggingConfig) {
    let default_level = if verbose { "debug" } else { logging.level.as_str() };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);

    if logging.format == "full" {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load(&path),
        None => Config::load_or_default(),
    }
}

/// Write a default configuration file
fn cmd_init(config_path: Option<PathBuf>, force: bool) -> Result<()> {
    let config_path = match config_path {
        Some(path) => path,
        None => Config::default_config_path()?,
    };

    if config_path.exists() && !force {
        bail!(
            "Configuration already exists at {:?} (use --force to overwrite)",
            config_path
        );
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let config = Config::default();
    config.save(&config_path)?;

    println!("✅ commitpulse initialized successfully!");
    println!("   Config: {:?}", config_path);
    println!("   Database: {}", config.storage.database_path);
    println!("   Next: authenticate with `gh auth login` (or set GITHUB_API_TOKEN) and run 'commitpulse sync'");

    Ok(())
}

async fn cmd_auth(config: &Config) -> Result<()> {
    match GitHubClient::new(config).await {
        Ok(client) => {
            println!("✅ Authentication successful");
            println!("   Username: {}", client.username());
            println!("   API: {}", config.github.api_url);
            Ok(())
        }
        Err(e) => {
            println!("❌ Authentication failed: {:#}", e);
            Err(e)
        }
    }
}

async fn cmd_serve(config: &Config) -> Result<()> {
    let service = SyncService::from_config(config).await?;
    server::serve(&config.server, Arc::new(service)).await
}

async fn cmd_sync(config: &Config) -> Result<()> {
    let service = SyncService::from_config(config).await?;

    println!("🔄 Syncing commits from the last {} weeks...", config.sync.lookback_weeks);
    let report = service.trigger_sync().await?;

    println!("\n🎉 Sync Complete!");
    println!("   📁 Repositories scanned: {}", report.repositories);
    println!("   📥 Commits fetched: {}", report.commits_fetched);
    println!("   ✅ New commits stored: {}", report.commits_inserted);
    println!("   ⏱️  Duration: {:.2}s", report.elapsed.as_secs_f64());

    Ok(())
}

async fn cmd_counts(json: bool, config: &Config) -> Result<()> {
    let db_path = config.database_path();
    let store = commitpulse::CommitStore::open(&db_path)
        .with_context(|| format!("Failed to open commit database at {:?}", db_path))?;

    let window = commitpulse::SyncWindow::lookback(config.sync.lookback_weeks);
    let mut counts = store.rollup(window.since_day())?;
    counts.sort_by_key(|count| count.date);

    if json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
        return Ok(());
    }

    if counts.is_empty() {
        println!("No commits recorded after {}", window.since_day());
        return Ok(());
    }

    let total: u64 = counts.iter().map(|c| u64::from(c.commit_count)).sum();
    for count in &counts {
        println!("{}  {:>4}", count.date, count.commit_count);
    }
    println!("\n📊 {} commits over {} active days", total, counts.len());

    Ok(())
}

async fn cmd_repos(config: &Config) -> Result<()> {
    let client = GitHubClient::new(config).await?;
    let repositories = client.list_repositories().await?;

    println!("Repositories ({}): ", repositories.len());
    for repo in repositories {
        println!("  📁 {}", repo.full_name);
    }

    Ok(())
}
