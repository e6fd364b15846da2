use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

/// Directive used for the run: `-v` wins over the configured level.
pub fn filter_directive(configured: &str, verbosity: u8) -> String {
    match verbosity {
        0 if configured.trim().is_empty() => "info".to_string(),
        0 => configured.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Logs go to a file so the TUI owns the terminal. Returns false if a
/// subscriber was already installed.
pub fn init(log_file: &Path, configured: &str, verbosity: u8) -> anyhow::Result<bool> {
    if let Some(parent) = log_file.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(log_file)?;
    let directive = filter_directive(configured, verbosity);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .is_ok();
    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_raises_level() {
        assert_eq!(filter_directive("warn", 0), "warn");
        assert_eq!(filter_directive("  ", 0), "info");
        assert_eq!(filter_directive("warn", 1), "debug");
        assert_eq!(filter_directive("warn", 3), "trace");
    }
}
