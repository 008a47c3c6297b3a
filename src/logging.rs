use anyhow::{Context, Result};
use chrono::Local;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::agent::Mode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Console {
    Stdout,
    Stderr,
}

/// `<dir>/2024-01-31_13-05-59.log`
pub fn session_log_path(log_dir: &Path) -> PathBuf {
    log_dir.join(format!("{}.log", Local::now().format("%Y-%m-%d_%H-%M-%S")))
}

/// Installs the global subscriber for this process: a plain-text file per
/// session, plus a console copy while playing. `RUST_LOG` overrides the
/// default `debug` level.
pub fn init_session(log_dir: &Path, mode: Mode, console: Console) -> Result<PathBuf> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let path = session_log_path(log_dir);
    let file = File::create(&path)
        .with_context(|| format!("Failed to create log file {}", path.display()))?;

    let filter = EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "debug".to_string()));
    let file_layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
    let console_layer = (mode == Mode::Play).then(|| {
        let writer = match console {
            Console::Stdout => BoxMakeWriter::new(std::io::stdout),
            Console::Stderr => BoxMakeWriter::new(std::io::stderr),
        };
        fmt::layer().with_writer(writer)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install log subscriber")?;
    Ok(path)
}
