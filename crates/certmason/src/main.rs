//! certmason - Main entry point
//!
//! Runs a single reconciliation pass against a host state directory and exits.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing::{error, info};

use certmason::acme::{AccountManager, InstantAcmeDirectory};
use certmason::dns::ProviderRegistry;
use certmason::host::{FileHost, UnitStatusSink};
use certmason::Reconciler;
use certmason_common::UnitStatus;
use certmason_config::OperatorConfig;

const DEFAULT_CONFIG_FILE: &str = "certmason.kdl";

/// certmason - ACME DNS-01 certificates for requesting units
#[derive(Parser, Debug)]
#[command(name = "certmason")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Host state directory (secrets, requests, issued certificates, status)
    #[arg(
        short = 's',
        long = "state-dir",
        env = "CERTMASON_STATE_DIR",
        default_value = "."
    )]
    state_dir: PathBuf,

    /// Configuration file path (default: <state-dir>/certmason.kdl)
    #[arg(short = 'c', long = "config", env = "CERTMASON_CONFIG")]
    config: Option<PathBuf>,

    /// Whether this unit is the leader; only the leader issues certificates
    #[arg(
        long = "leader",
        env = "CERTMASON_LEADER",
        default_value_t = true,
        action = ArgAction::Set
    )]
    leader: bool,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose")]
    verbose: bool,

    /// Log output format
    #[arg(
        long = "log-format",
        env = "CERTMASON_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Text
    )]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one reconciliation pass
    Reconcile,
    /// Load and validate the configuration without touching the network
    Check,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_format);

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.state_dir.join(DEFAULT_CONFIG_FILE));

    match cli.command {
        Commands::Check => check_config(&config_path),
        Commands::Reconcile => reconcile(&cli.state_dir, &config_path, cli.leader),
    }
}

fn init_logging(verbose: bool, format: LogFormat) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init(),
    }
}

fn check_config(config_path: &Path) -> Result<ExitCode> {
    let config =
        OperatorConfig::from_file(config_path).context("Failed to load configuration file")?;
    config.validate().context("Configuration validation failed")?;

    let registry = ProviderRegistry::with_builtin();
    if !registry.contains(&config.plugin) {
        anyhow::bail!(
            "DNS plugin '{}' is not supported (available: {})",
            config.plugin,
            registry.plugin_ids().join(", ")
        );
    }

    info!(
        email = %config.email,
        server = %config.server,
        plugin = %config.plugin,
        "Configuration test successful"
    );
    println!(
        "certmason: configuration file {} test is successful",
        config_path.display()
    );
    Ok(ExitCode::SUCCESS)
}

fn reconcile(state_dir: &Path, config_path: &Path, leader: bool) -> Result<ExitCode> {
    let host = FileHost::new(state_dir, leader);

    let config = match OperatorConfig::from_file(config_path) {
        Ok(config) => config,
        Err(e) => {
            let status = UnitStatus::blocked(format!("invalid configuration: {}", e));
            if let Err(status_err) = host.set_status(&status) {
                error!(error = %status_err, "Failed to set unit status");
            }
            return Err(e).context("Failed to load configuration file");
        }
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build async runtime")?;

    let reconciler = Reconciler::new(
        host,
        AccountManager::new(Arc::new(InstantAcmeDirectory)),
        ProviderRegistry::with_builtin(),
    );
    let report = runtime.block_on(reconciler.run_pass(&config));

    println!("certmason: {}", report.status);
    if report.status.is_active() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(2))
    }
}
