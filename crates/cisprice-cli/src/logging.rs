use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use chrono::{DateTime, Local};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// `cis_price_import_<YYYYmmdd_HHMMSS>.log`
pub fn log_file_name(now: DateTime<Local>) -> String {
    format!("cis_price_import_{}.log", now.format("%Y%m%d_%H%M%S"))
}

/// Accepts tracing directives as well as the classic level names.
fn filter_for(log_level: Option<&str>) -> EnvFilter {
    let Some(level) = log_level else {
        return EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    };
    let normalised = match level.to_uppercase().as_str() {
        "WARNING" => "warn".to_string(),
        "CRITICAL" | "FATAL" => "error".to_string(),
        _ => level.to_lowercase(),
    };
    EnvFilter::try_new(normalised).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber: stderr always, plus a plain-text log file
/// when `log_dir` is set. Returns the log file path.
pub fn setup_logging(log_level: Option<&str>, log_dir: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    let (file_layer, log_path) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir).with_context(|| format!("creating log dir {}", dir.display()))?;
            let path = dir.join(log_file_name(Local::now()));
            let file = File::create(&path).with_context(|| format!("creating log file {}", path.display()))?;
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter_for(log_level))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("installing tracing subscriber")?;

    Ok(log_path)
}
