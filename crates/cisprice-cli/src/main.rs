use std::path::PathBuf;

use anyhow::{Context, Result};
use cisprice_sync::{run_import, ImportConfig};
use clap::{Args, Parser, Subcommand};
use tracing::info;

mod logging;

#[derive(Debug, Parser)]
#[command(name = "cisprice-cli")]
#[command(about = "Import CIS part price exports into the price history table")]
struct Cli {
    /// YAML config file; environment variables override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Also write a timestamped log file into this directory.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    /// Level or filter directive; defaults to RUST_LOG, then `info`.
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Import every dated export in the source folder.
    Import(ImportArgs),
    /// Print the effective configuration after validation.
    ShowConfig,
}

#[derive(Debug, Default, Args)]
struct ImportArgs {
    #[arg(long)]
    source_dir: Option<PathBuf>,
    #[arg(long)]
    database_url: Option<String>,
    /// Run against an in-memory store; nothing is written to the database.
    #[arg(long)]
    dry_run: bool,
    /// Print the run summary as JSON.
    #[arg(long)]
    json: bool,
    /// Write the run summary as JSON to this path.
    #[arg(long)]
    report: Option<PathBuf>,
}

fn load_config(config_path: Option<&PathBuf>, args: &ImportArgs) -> Result<ImportConfig> {
    load_config_with(config_path, args, |key| std::env::var(key).ok())
}

/// Config file or defaults, then `lookup` as the environment, then command-line flags.
fn load_config_with(
    config_path: Option<&PathBuf>,
    args: &ImportArgs,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ImportConfig> {
    let mut config = match config_path {
        Some(path) => ImportConfig::from_yaml_file_with(path, lookup)?,
        None => ImportConfig::from_lookup(lookup)?,
    };
    if let Some(dir) = &args.source_dir {
        config.source_dir = dir.clone();
    }
    if let Some(url) = &args.database_url {
        config.database.url = Some(url.clone());
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_path = logging::setup_logging(cli.log_level.as_deref(), cli.log_dir.as_deref())?;
    if let Some(path) = &log_path {
        info!(path = %path.display(), "logging to file");
    }

    match cli.command.unwrap_or(Commands::Import(ImportArgs::default())) {
        Commands::Import(args) => {
            let config = load_config(cli.config.as_ref(), &args)?;
            let summary = run_import(config, args.dry_run).await?;

            if let Some(report) = &args.report {
                summary.write_json(report).await?;
            }
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&summary).context("serializing run summary")?
                );
            } else {
                println!("{}", summary.render_line());
            }
        }
        Commands::ShowConfig => {
            let mut config = load_config(cli.config.as_ref(), &ImportArgs::default())?;
            config.validate()?;
            if config.database.password.is_some() {
                config.database.password = Some("********".to_string());
            }
            if config.database.url.is_some() {
                config.database.url = Some("<redacted>".to_string());
            }
            print!("{}", serde_yaml::to_string(&config).context("rendering config")?);
        }
    }

    Ok(())
}
