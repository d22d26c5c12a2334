//! Common utility functions for the command line front-end.
//!
//! This module contains shared utilities including:
//! - Logger initialization
//! - Output path preparation

use std::error::Error;
use std::path::{Path, PathBuf};

/// Initialize the logger with the specified configuration.
///
/// # Arguments
/// * `log_level` - Log level string (off, error, warn, info, debug, trace)
/// * `log_file` - Optional path to log file (logs to stderr if None)
///
/// # Errors
/// Returns an error if the log file cannot be opened or logger initialization fails.
pub fn init_logger(log_level: &str, log_file: Option<&PathBuf>) -> Result<(), Box<dyn Error>> {
    use std::io::Write;

    let level = parse_level(log_level);
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] - {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.args()
        )
    });

    if let Some(log_path) = log_file {
        ensure_parent_dir(log_path)?;
        let target = Box::new(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)?,
        );
        builder.target(env_logger::Target::Pipe(target));
    }

    builder.try_init()?;
    Ok(())
}

/// Parse a level name, falling back to `info` for anything unrecognized.
pub fn parse_level(log_level: &str) -> log::LevelFilter {
    log_level.parse::<log::LevelFilter>().unwrap_or_else(|_| {
        eprintln!("Invalid log level '{}', defaulting to 'info'", log_level);
        log::LevelFilter::Info
    })
}

/// Create the parent directory of an output file if it is missing.
pub fn ensure_parent_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Validate an output directory, creating it if it does not exist.
///
/// # Errors
/// Returns an error if the path exists but is not a directory, or creation fails.
pub fn validate_output_dir(output: &Path) -> Result<(), Box<dyn Error>> {
    if output.exists() {
        if !output.is_dir() {
            return Err(format!("{} exists and is not a directory", output.display()).into());
        }
    } else {
        std::fs::create_dir_all(output)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), log::LevelFilter::Debug);
        assert_eq!(parse_level("OFF"), log::LevelFilter::Off);
        assert_eq!(parse_level("loud"), log::LevelFilter::Info);
    }

    #[test]
    fn test_ensure_parent_dir_creates_nested() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("a").join("b").join("out.csv");
        ensure_parent_dir(&file_path).unwrap();
        assert!(dir.path().join("a").join("b").is_dir());
        // bare file names have no parent to create
        assert!(ensure_parent_dir(Path::new("out.csv")).is_ok());
    }

    #[test]
    fn test_validate_output_dir() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("snapshots");
        validate_output_dir(&target).unwrap();
        assert!(target.is_dir());
        assert!(validate_output_dir(&target).is_ok());

        let file_path = dir.path().join("file.csv");
        File::create(&file_path).unwrap();
        assert!(validate_output_dir(&file_path).is_err());
    }
}
