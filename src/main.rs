use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use repovault::config::LoggingConfig;
use repovault::github::resolve_credential;
use repovault::health::CheckResult;
use repovault::script::{generate_clone_script, write_clone_script, DEFAULT_SCRIPT_NAME};
use repovault::{server, Config, Credential, GitHubClient, HealthCheck, Orchestrator, RepositoryLister, SyncResult};

#[derive(Parser)]
#[command(name = "repovault")]
#[command(about = "Mirror every repository of a GitHub account to local disk")]
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
    /// Run the HTTP control surface
    Serve {
        /// Do not start a backup when the server comes up
        #[arg(long)]
        no_initial_backup: bool,
    },

    /// Run one backup now and exit
    Backup,

    /// List repositories of the authenticated account
    List {
        /// Show clone URL and default branch
        #[arg(long)]
        details: bool,
    },

    /// Write a shell script with one git clone per repository
    Script {
        /// Output file
        #[arg(short, long, default_value = DEFAULT_SCRIPT_NAME)]
        output: PathBuf,

        /// Put the token into every https clone URL
        #[arg(long)]
        embed_token: bool,
    },

    /// System health check and diagnostics
    Doctor,

    /// Write a configuration file with defaults
    Init {
        /// Root directory for repository mirrors
        #[arg(short, long)]
        backup_dir: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        // Init writes the file, so it must not depend on an existing one
        Commands::Init { backup_dir } => {
            init_logging(&LoggingConfig::default(), cli.verbose);
            cmd_init(backup_dir, cli.config.clone())
        }
        Commands::Serve { no_initial_backup } => {
            cmd_serve(!no_initial_backup, &setup(config_path, cli.verbose)?).await
        }
        Commands::Backup => cmd_backup(&setup(config_path, cli.verbose)?).await,
        Commands::List { details } => cmd_list(details, &setup(config_path, cli.verbose)?).await,
        Commands::Script { output, embed_token } => {
            cmd_script(output, embed_token, &setup(config_path, cli.verbose)?).await
        }
        Commands::Doctor => cmd_doctor(&setup(config_path, cli.verbose)?).await,
    }
}

/// Load configuration, then start logging with its settings
fn setup(config_path: Option<&Path>, verbose: bool) -> Result<Config> {
    let config = load_config(config_path)?;
    init_logging(&config.logging, verbose);
    info!("Starting RepoVault v{}", env!("CARGO_PKG_VERSION"));
    Ok(config)
}

/// Initialize logging: RUST_LOG wins, then --verbose, then the configured level
fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let fallback = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(logging.color);
    let layer = match logging.format.as_str() {
        "pretty" => layer.pretty().boxed(),
        "full" => layer.boxed(),
        _ => layer.compact().boxed(),
    };

    tracing_subscriber::registry().with(layer).with(filter).init();
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<&Path>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load_with_env(path),
        None => Config::load_or_default(),
    }
}

/// Credential and writable backup root, or abort before any run
fn startup_checks(config: &Config) -> Result<Credential> {
    let credential = resolve_credential(config)?;
    let backup_dir = config.prepare_backup_dir()?;
    info!("Backup directory: {}", backup_dir.display());
    Ok(credential)
}

async fn cmd_serve(initial_backup: bool, config: &Config) -> Result<()> {
    let credential = startup_checks(config)?;
    let orchestrator = Orchestrator::from_config(config, credential)?;

    server::serve(config, orchestrator, initial_backup && config.server.backup_on_start).await
}

async fn cmd_backup(config: &Config) -> Result<()> {
    let credential = startup_checks(config)?;
    let orchestrator = Orchestrator::from_config(config, credential)?;

    println!("🔄 Backing up repositories to {}", config.backup_directory);
    let summary = match orchestrator.perform_backup().await {
        Ok(summary) => summary,
        Err(e) => {
            error!("Backup failed: {}", e);
            return Err(e.into());
        }
    };

    println!("\n🎉 Backup Complete!");
    println!("   📊 Total repositories: {}", summary.total_repositories);
    println!("   📥 Cloned: {}", summary.cloned);
    println!("   🔄 Updated: {}", summary.updated);
    println!("   🩹 Recovered: {}", summary.recovered);
    println!("   ❌ Failed: {}", summary.failed);
    println!("   ⏱️  Duration: {:.2}s", summary.duration.as_secs_f64());

    if summary.failed > 0 {
        println!("\n🔍 Skipped Repositories:");
        for result in summary.failures() {
            if let SyncResult::Failed { name, error, .. } = result {
                println!("   ❌ {}: {}", name, error);
            }
        }
    }

    Ok(())
}

async fn cmd_list(details: bool, config: &Config) -> Result<()> {
    let credential = resolve_credential(config)?;
    let client = GitHubClient::new(config, &credential)?;
    let repositories = client.list_all_repositories().await?;

    println!("Repositories ({}):", repositories.len());
    for repo in repositories {
        if details {
            println!("📁 {}", repo.name);
            println!("   🔗 {}", repo.clone_url);
            println!("   🌿 {}", repo.default_branch);
            println!();
        } else {
            println!("  📁 {}", repo.name);
        }
    }

    Ok(())
}

async fn cmd_script(output: PathBuf, embed_token: bool, config: &Config) -> Result<()> {
    let credential = resolve_credential(config)?;
    let client = GitHubClient::new(config, &credential)?;

    println!("Fetching your GitHub repositories...");
    let repositories = client.list_all_repositories().await?;
    println!("Found {} repositories. Generating clone script...", repositories.len());

    let script = generate_clone_script(&repositories, embed_token.then_some(&credential));
    write_clone_script(&output, &script)?;

    println!("✅ Clone script written to {}", output.display());
    if embed_token {
        println!("⚠️  The script contains your token; keep it private");
    }
    println!("   Run it with: bash {}", output.display());

    Ok(())
}

async fn cmd_doctor(config: &Config) -> Result<()> {
    let health = HealthCheck::run(config).await;
    print_health_report(&health);

    if !health.all_passed() {
        bail!("{} health check(s) failed", health.errors().len());
    }
    Ok(())
}

fn cmd_init(backup_dir: Option<String>, config_path: Option<PathBuf>) -> Result<()> {
    info!("Initializing RepoVault...");

    let config_path = match config_path {
        Some(path) => path,
        None => Config::default_config_path()?,
    };
    if config_path.exists() {
        bail!("Configuration already exists at {:?}", config_path);
    }

    let mut config = Config::default();
    if let Some(dir) = backup_dir {
        config.backup_directory = dir;
    }
    config.save(&config_path)?;

    println!("✅ RepoVault initialized successfully!");
    println!("   Config: {:?}", config_path);
    println!("   Backup directory: {}", config.backup_directory);
    println!("   Next: export GITHUB_TOKEN and run 'repovault backup'");

    Ok(())
}

/// Print health check report to stdout
fn print_health_report(health: &HealthCheck) {
    fn print_check(name: &str, result: &CheckResult) {
        println!("{}:", name);
        let icon = if result.passed {
            if result.is_warning { "⚠️ " } else { "✅" }
        } else {
            "❌"
        };
        println!("  {} {}", icon, result.message);
        if let Some(details) = &result.details {
            for line in details.lines() {
                println!("     {}", line);
            }
        }
    }

    println!("🔍 RepoVault System Diagnostics");
    println!();

    for (name, result) in health.all_checks() {
        print_check(name, result);
        println!();
    }

    if health.all_passed() {
        println!("✅ All checks passed");
    } else {
        println!("❌ Some checks failed");
    }
}
