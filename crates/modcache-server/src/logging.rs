//! Logging initialization.
//!
//! The subscriber's level is keyed off the config's `log_level` string
//! rather than CLI flags, since this service has no other verbosity knobs.
//! An empty value is treated as `trace` (the most verbose setting), matching
//! the proxy this crate replaces.

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Installs the global tracing subscriber at the level named by `log_level`.
///
/// # Errors
///
/// Returns an error if a global subscriber has already been installed.
pub fn init(log_level: &str) -> Result<()> {
    let level = match log_level.trim().to_ascii_lowercase().as_str() {
        "" | "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" | "fatal" | "panic" => Level::ERROR,
        other => {
            eprintln!("unrecognized log_level {other:?}, defaulting to info");
            Level::INFO
        },
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
