//! Prefetch commands.
//!
//! Fetches tiles of an area, or a list of partitions, from the configured
//! layer into the cache. Ctrl-C cancels: fetches already running finish,
//! the rest are reported cancelled.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::info;

use quadfetch::cache::{CacheStore, DiskStore, ProtectedCache};
use quadfetch::config::{format_size, AddressingMode, ConfigFile};
use quadfetch::coord::GeoRectangle;
use quadfetch::prefetch::{
    ItemOutcome, PrefetchAggregateResult, PrefetchError, PrefetchItemResult, PrefetchRequest,
    PrefetchState, Prefetcher,
};
use quadfetch::provider::HttpFetcher;

use crate::error::CliError;

/// Prefetch subcommands.
#[derive(Debug, Subcommand)]
pub enum PrefetchCommand {
    /// Fetch the tiles covering an area
    Tiles(TilesArgs),
    /// Fetch partitions by id
    Partitions(PartitionsArgs),
}

/// Arguments for `prefetch tiles`.
#[derive(Debug, Args)]
pub struct TilesArgs {
    /// Area as west,south,east,north in degrees
    #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
    pub bbox: GeoRectangle,

    /// Comma-separated levels, e.g. 10,11,12
    #[arg(long, value_delimiter = ',', required = true)]
    pub levels: Vec<u8>,

    #[command(flatten)]
    pub layer: LayerArgs,
}

/// Arguments for `prefetch partitions`.
#[derive(Debug, Args)]
pub struct PartitionsArgs {
    /// Partition ids
    #[arg(required = true)]
    pub ids: Vec<String>,

    #[command(flatten)]
    pub layer: LayerArgs,
}

/// Overrides for the `[layer]`, `[prefetch]` and `[cache]` settings.
#[derive(Debug, Args, Default)]
pub struct LayerArgs {
    /// Layer id
    #[arg(long)]
    pub layer: Option<String>,

    /// URL template with {layer}, {level}, {row}, {column}, {quadkey} or {partition}
    #[arg(long)]
    pub url_template: Option<String>,

    /// Bearer token for the layer
    #[arg(long)]
    pub token: Option<String>,

    /// Number of concurrent fetches
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Disk cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
}

impl LayerArgs {
    fn apply(self, config: &mut ConfigFile) {
        if let Some(id) = self.layer {
            config.layer.id = id;
        }
        if let Some(template) = self.url_template {
            config.layer.url_template = Some(template);
        }
        if let Some(token) = self.token {
            config.layer.token = Some(token);
        }
        if let Some(concurrency) = self.concurrency {
            config.prefetch.max_concurrency = concurrency.max(1);
        }
        if let Some(dir) = self.cache_dir {
            config.cache.directory = Some(dir);
        }
    }
}

/// Parses `west,south,east,north`.
pub fn parse_bbox(s: &str) -> Result<GeoRectangle, String> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid number in '{s}': {e}"))?;

    match parts.as_slice() {
        [west, south, east, north] => {
            GeoRectangle::new(*west, *south, *east, *north).map_err(|e| e.to_string())
        }
        _ => Err(format!("expected 4 comma-separated values, got {}", parts.len())),
    }
}

/// Run a prefetch subcommand.
pub fn run(command: PrefetchCommand, mut config: ConfigFile, json: bool) -> Result<(), CliError> {
    let request = match command {
        PrefetchCommand::Tiles(args) => {
            args.layer.apply(&mut config);
            config.layer.addressing = AddressingMode::Tiled;
            PrefetchRequest::tiles(args.bbox, args.levels)
        }
        PrefetchCommand::Partitions(args) => {
            args.layer.apply(&mut config);
            config.layer.addressing = AddressingMode::Partitioned;
            PrefetchRequest::partitions(args.ids)
        }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    let result = runtime.block_on(execute(request, &config, json))?;
    report(&result, json)?;

    match (result.state, result.error) {
        (PrefetchState::Failed, Some(error)) => Err(CliError::PrefetchFailed(error)),
        _ => Ok(()),
    }
}

async fn execute(
    request: PrefetchRequest,
    config: &ConfigFile,
    json: bool,
) -> Result<PrefetchAggregateResult, CliError> {
    let layer = config.layer_config();
    let template = config.layer.url_template.clone().ok_or_else(|| {
        CliError::Config("no url_template set in [layer] and no --url-template given".to_string())
    })?;

    let mut fetcher = HttpFetcher::with_timeout(
        template,
        layer.id.clone(),
        Duration::from_secs(config.layer.timeout_secs),
    )
    .map_err(CliError::Fetcher)?;
    if let Some(token) = &config.layer.token {
        fetcher = fetcher.with_bearer_token(token.clone());
    }

    let cache = match &config.cache.directory {
        Some(dir) => {
            let store: Arc<dyn CacheStore> = Arc::new(DiskStore::open(dir).await?);
            info!(directory = %dir.display(), "Using disk cache");
            ProtectedCache::with_store(config.cache_config(), store)
        }
        None => ProtectedCache::new(config.cache_config()),
    };
    let cache = Arc::new(cache);

    let shutdown = CancellationToken::new();
    let sweeper = cache.spawn_sweeper(config.sweep_interval(), shutdown.clone());

    let prefetcher = Prefetcher::new(
        Arc::clone(&cache),
        Arc::new(fetcher),
        layer,
        config.prefetch_config(),
    );

    let progress = if json {
        ProgressBar::hidden()
    } else {
        progress_bar()
    };

    let (tx, rx) = oneshot::channel();
    let on_item = {
        let progress = progress.clone();
        move |item: &PrefetchItemResult| {
            if let ItemOutcome::Failed(error) = &item.outcome {
                progress.println(format!("{} {}: {}", style("failed").red(), item.target, error));
            }
            progress.inc(1);
        }
    };
    let handle = prefetcher.prefetch(
        request,
        Some(Box::new(on_item)),
        Box::new(move |result| {
            let _ = tx.send(result);
        }),
    )?;

    for warning in handle.warnings() {
        eprintln!("{} {}", style("Warning:").yellow(), warning);
    }
    progress.set_length(handle.status().total);

    let signal_handle = handle.clone();
    ctrlc::set_handler(move || {
        if !signal_handle.is_cancelled() {
            eprintln!();
            eprintln!("Cancelling, waiting for running fetches...");
            signal_handle.cancel();
        }
    })
    .map_err(|e| CliError::Signal(e.to_string()))?;

    let result = rx.await;
    progress.finish_and_clear();

    shutdown.cancel();
    let _ = sweeper.await;

    let stats = cache.stats();
    info!(
        entries = stats.entries,
        size = %format_size(stats.size_bytes),
        protected = stats.protected_keys,
        "Cache state after prefetch"
    );

    result.map_err(|_| CliError::Request(PrefetchError::Aborted(handle.operation_id())))
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})",
    ) {
        bar.set_style(style);
    }
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn report(result: &PrefetchAggregateResult, json: bool) -> Result<(), CliError> {
    if json {
        println!("{}", serde_json::to_string_pretty(&result.summary())?);
        return Ok(());
    }

    let counts = &result.counts;
    let state = match result.state {
        PrefetchState::Completed if counts.failed == 0 => style(result.state.to_string()).green(),
        PrefetchState::Completed | PrefetchState::Cancelled => {
            style(result.state.to_string()).yellow()
        }
        _ => style(result.state.to_string()).red(),
    };

    println!("Prefetch {}", state);
    println!("  Succeeded: {}", counts.succeeded);
    println!("  Failed:    {}", counts.failed);
    println!("  Cancelled: {}", counts.cancelled);
    if let Some(error) = &result.error {
        println!("  Error:     {}", error);
    }
    Ok(())
}
