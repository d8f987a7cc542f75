mod commands;
mod harness;
mod workspace;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use stackmig_framework::CancelToken;
use stackmig_provider::{Provider, ProviderError};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stackmig")]
#[command(about = "Upload configurations to Terraform stacks and follow them to convergence", long_about = None)]
struct Cli {
    /// Directory holding the migrations file and `.stackmig/` state
    #[arg(short = 'C', long, global = true, default_value = ".")]
    dir: PathBuf,

    /// Migrations file, relative to --dir
    #[arg(short, long, global = true, default_value = workspace::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// API token (overrides the migrations file and the credentials store)
    #[arg(long, global = true)]
    token: Option<String>,

    /// Seconds to wait for a configuration to settle
    #[arg(long, global = true, env = "STACKMIG_TIMEOUT")]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what apply would upload or wait for
    Plan,
    /// Upload changed configurations and wait for them to converge
    Apply,
    /// Re-read stacks and record their latest configuration
    Refresh,
    /// Forget all stack migrations (remote stacks are left untouched)
    Destroy,
    /// Show version information
    Version,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn configure(cli: &Cli, ws: &workspace::Workspace) -> anyhow::Result<Provider> {
    let mut config = ws.config.provider.clone();
    if let Some(token) = &cli.token {
        config.token = Some(token.clone());
    }

    let provider = Provider::configure(&config).map_err(|e| match e {
        ProviderError::Config(e) => anyhow::anyhow!(e.user_message()),
        e => anyhow::Error::new(e),
    })?;

    Ok(match cli.timeout {
        Some(secs) => provider.with_await_timeout(Duration::from_secs(secs)),
        None => provider,
    })
}

/// Ctrl-C cancels the running await; the current state is still saved
fn cancel_on_interrupt() -> CancelToken {
    let cancel = CancelToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!("{}", "Interrupted, finishing up...".yellow());
            token.cancel();
        }
    });
    cancel
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    if matches!(cli.command, Commands::Version) {
        println!("stackmig {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let ws = workspace::Workspace::load(&cli.dir, &cli.config)
        .with_context(|| format!("cannot open workspace {}", cli.dir.display()))?;
    let provider = configure(&cli, &ws)?;
    let resource = provider.stack_migration();
    let cancel = cancel_on_interrupt();

    match cli.command {
        Commands::Plan => commands::plan::handle(&ws, &resource, &cancel).await,
        Commands::Apply => commands::apply::handle(&ws, &resource, &cancel).await,
        Commands::Refresh => commands::refresh::handle(&ws, &resource, &cancel).await,
        Commands::Destroy => commands::destroy::handle(&ws, &resource, &cancel).await,
        Commands::Version => Ok(()),
    }
}
