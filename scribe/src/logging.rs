//! File logging.
//!
//! The terminal belongs to the TUI, so `tracing` output goes to
//! `<data_dir>/scribe.log`. The filter comes from `SCRIBE_LOG` (same syntax
//! as `RUST_LOG`) and defaults to `info`.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const FILTER_ENV: &str = "SCRIBE_LOG";

/// Installs the global subscriber. Returns the log file path.
pub fn init(data_dir: &Path) -> std::io::Result<PathBuf> {
    let log_path = data_dir.join("scribe.log");
    let file = File::options().create(true).append(true).open(&log_path)?;

    let filter = EnvFilter::try_from_env(FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(Mutex::new(file)),
        )
        .with(filter)
        .try_init()
        .map_err(std::io::Error::other)?;

    Ok(log_path)
}
