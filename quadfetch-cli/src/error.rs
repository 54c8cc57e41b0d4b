//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and exit codes.

use std::fmt;
use std::process;

use quadfetch::cache::StoreError;
use quadfetch::config::ConfigFileError;
use quadfetch::coord::CoordError;
use quadfetch::prefetch::PrefetchError;
use quadfetch::provider::{FetchError, FetchErrorKind};

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Config file could not be loaded
    ConfigFile(ConfigFileError),
    /// Failed to start the async runtime
    Runtime(std::io::Error),
    /// Failed to set up the HTTP fetcher
    Fetcher(FetchError),
    /// Disk cache error
    Store(StoreError),
    /// Prefetch request rejected
    Request(PrefetchError),
    /// Invalid tile coordinates or quadkey
    Coord(CoordError),
    /// Failed to install the Ctrl-C handler
    Signal(String),
    /// A global error stopped the prefetch
    PrefetchFailed(FetchError),
    /// Failed to serialize output
    Output(serde_json::Error),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::PrefetchFailed(e)
                if matches!(e.kind, FetchErrorKind::Unauthorized | FetchErrorKind::Forbidden) =>
            {
                eprintln!();
                eprintln!("The layer rejected the credentials. Check the token in");
                eprintln!("the [layer] section of config.ini or pass --token.");
            }
            CliError::Config(_) | CliError::ConfigFile(_) => {
                eprintln!();
                eprintln!(
                    "Configuration is read from {}",
                    quadfetch::config::config_file_path().display()
                );
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ConfigFile(e) => write!(f, "{}", e),
            CliError::Runtime(e) => write!(f, "Failed to start runtime: {}", e),
            CliError::Fetcher(e) => write!(f, "Failed to create fetcher: {}", e),
            CliError::Store(e) => write!(f, "Disk cache error: {}", e),
            CliError::Request(e) => write!(f, "Invalid prefetch request: {}", e),
            CliError::Coord(e) => write!(f, "{}", e),
            CliError::Signal(msg) => write!(f, "Failed to set signal handler: {}", msg),
            CliError::PrefetchFailed(e) => write!(f, "Prefetch failed: {}", e),
            CliError::Output(e) => write!(f, "Failed to write output: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ConfigFile(e) => Some(e),
            CliError::Runtime(e) => Some(e),
            CliError::Fetcher(e) | CliError::PrefetchFailed(e) => Some(e),
            CliError::Store(e) => Some(e),
            CliError::Request(e) => Some(e),
            CliError::Coord(e) => Some(e),
            CliError::Output(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<PrefetchError> for CliError {
    fn from(e: PrefetchError) -> Self {
        CliError::Request(e)
    }
}

impl From<CoordError> for CliError {
    fn from(e: CoordError) -> Self {
        CliError::Coord(e)
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        CliError::Store(e)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Output(e)
    }
}
