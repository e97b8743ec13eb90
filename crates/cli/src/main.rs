mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kgitops_lib::config::Settings;

use crate::output::OutputFormat;

/// GitOps synchronization for Keptn
#[derive(Parser)]
#[command(name = "kgitops")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
  output: OutputFormat,

  /// Directory of the resource store
  #[arg(long, global = true, env = "KGITOPS_STORE_DIR")]
  store_dir: Option<PathBuf>,

  /// Control plane URL used when no Instance manifest names one
  #[arg(long, global = true, env = "KEPTN_API_URL")]
  api_url: Option<String>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Register or update a KeptnGitRepository manifest
  Register {
    /// YAML file holding one or more KeptnGitRepository documents
    file: PathBuf,
  },

  /// Run one apply pass for a registered repository
  Sync {
    /// Name of the KeptnGitRepository
    name: String,
  },

  /// Reconcile every registered repository until interrupted
  Watch,

  /// Show repository sync status and record counts
  Status {
    /// Only show this repository
    name: Option<String>,
  },

  /// Deliver a promoted artifact to a stage branch
  Deliver {
    #[arg(long)]
    project: String,
    #[arg(long)]
    stage: String,
    #[arg(long)]
    service: String,
    #[arg(long)]
    version: String,
    #[arg(long)]
    config_version: Option<String>,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let mut settings = Settings::from_env().context("Invalid environment configuration")?;
  if let Some(store_dir) = cli.store_dir {
    settings.store_dir = store_dir;
  }
  if cli.api_url.is_some() {
    settings.api_url = cli.api_url;
  }

  let result = match cli.command {
    Commands::Register { file } => cmd::cmd_register(&settings, &file, cli.output),
    Commands::Sync { name } => cmd::cmd_sync(&settings, &name, cli.output),
    Commands::Watch => cmd::cmd_watch(&settings),
    Commands::Status { name } => cmd::cmd_status(&settings, name.as_deref(), cli.verbose, cli.output),
    Commands::Deliver {
      project,
      stage,
      service,
      version,
      config_version,
    } => cmd::cmd_deliver(
      &settings,
      &project,
      cmd::DeliverArgs {
        stage,
        service,
        version,
        config_version,
      },
      cli.output,
    ),
  };

  if let Err(e) = &result {
    output::print_error(&format!("{e:#}"));
    std::process::exit(1);
  }
  Ok(())
}
