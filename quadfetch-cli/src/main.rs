//! Quadfetch CLI - Command-line interface
//!
//! This binary provides a command-line interface to the quadfetch library:
//! prefetching tiles and partitions into the cache, and converting between
//! tile addresses and quadkeys.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use quadfetch::config::{config_file_path, ConfigFile};
use quadfetch::logging::{default_log_dir, default_log_file, init_logging};

use commands::prefetch::PrefetchCommand;
use commands::quadkey::QuadkeyAction;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "quadfetch")]
#[command(version, about = "Prefetch quadtree tiles and partitions into a local cache", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.quadfetch/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch tiles or partitions into the cache
    #[command(subcommand)]
    Prefetch(PrefetchCommand),

    /// Convert between tile addresses and quadkeys
    #[command(subcommand)]
    Quadkey(QuadkeyAction),
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        e.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Prefetch(command) => {
            let config = load_config(cli.config)?;

            // Guard flushes the file writer on drop
            let _logging = init_logging(&default_log_dir(), default_log_file())
                .map_err(|e| CliError::LoggingInit(e.to_string()))?;

            commands::prefetch::run(command, config, cli.json)
        }
        Commands::Quadkey(action) => commands::quadkey::run(action, cli.json),
    }
}

/// Loads `--config`, or the default config file if not given.
fn load_config(path: Option<PathBuf>) -> Result<ConfigFile, CliError> {
    let path = path.unwrap_or_else(config_file_path);
    Ok(ConfigFile::load_from(&path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quadfetch::config::AddressingMode;
    use tempfile::TempDir;

    #[test]
    fn test_parse_quadkey_encode() {
        let cli = Cli::try_parse_from(["quadfetch", "quadkey", "encode", "2", "1", "1"]).unwrap();
        assert!(!cli.json);
        assert!(matches!(
            cli.command,
            Commands::Quadkey(QuadkeyAction::Encode {
                level: 2,
                row: 1,
                column: 1
            })
        ));
    }

    #[test]
    fn test_parse_prefetch_tiles() {
        let cli = Cli::try_parse_from([
            "quadfetch",
            "--json",
            "prefetch",
            "tiles",
            "--bbox",
            "-10,-5,10,5",
            "--levels",
            "3,4",
            "--concurrency",
            "8",
        ])
        .unwrap();

        assert!(cli.json);
        match cli.command {
            Commands::Prefetch(PrefetchCommand::Tiles(args)) => {
                assert_eq!(args.levels, vec![3, 4]);
                assert_eq!(args.bbox.west, -10.0);
                assert_eq!(args.layer.concurrency, Some(8));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_prefetch_partitions_with_config() {
        let cli = Cli::try_parse_from([
            "quadfetch",
            "prefetch",
            "partitions",
            "p1",
            "p2",
            "--config",
            "/tmp/quadfetch.ini",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/quadfetch.ini")));
        match cli.command {
            Commands::Prefetch(PrefetchCommand::Partitions(args)) => {
                assert_eq!(args.ids, vec!["p1", "p2"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_missing_levels() {
        assert!(Cli::try_parse_from(["quadfetch", "prefetch", "tiles", "--bbox", "0,0,1,1"]).is_err());
        assert!(Cli::try_parse_from(["quadfetch", "prefetch", "partitions"]).is_err());
    }

    #[test]
    fn test_config_flag_is_loaded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(
            &path,
            "[prefetch]\nmax_concurrency = 12\n\n[layer]\nid = roads\naddressing = partitioned\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "quadfetch",
            "--config",
            path.to_str().unwrap(),
            "prefetch",
            "partitions",
            "p1",
        ])
        .unwrap();
        let config = load_config(cli.config).unwrap();

        assert_eq!(config.prefetch.max_concurrency, 12);
        assert_eq!(config.layer.id, "roads");
        assert_eq!(config.layer.addressing, AddressingMode::Partitioned);
    }

    #[test]
    fn test_invalid_config_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "[prefetch]\nmax_concurrency = many\n").unwrap();

        let err = load_config(Some(path)).unwrap_err();
        assert!(matches!(err, CliError::ConfigFile(_)));
    }
}
