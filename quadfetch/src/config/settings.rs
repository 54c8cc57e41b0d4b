//! Settings structs for each configuration section.
//!
//! Each struct represents one `[section]` of the INI config file. These are
//! pure data types; parsing lives in [`super::parser`].

use std::path::PathBuf;
use std::time::Duration;

use crate::cache::{ProtectedCacheConfig, DEFAULT_MAX_MEMORY_BYTES};
use crate::coord::TilingScheme;
use crate::executor::{RetryPolicy, DEFAULT_INITIAL_DELAY_MS};
use crate::prefetch::{
    LayerConfig, PrefetchConfig, DEFAULT_MAX_CONCURRENCY, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_RETRY_ATTEMPTS,
};
use crate::provider::DEFAULT_TIMEOUT_SECS;

/// Default interval between background expiry sweeps.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Default deepest level of a tiled layer.
pub const DEFAULT_LAYER_MAX_LEVEL: u8 = 18;

/// Default layer id.
pub const DEFAULT_LAYER_ID: &str = "default";

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub prefetch: PrefetchSettings,
    pub cache: CacheSettings,
    pub layer: LayerSettings,
}

/// `[prefetch]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct PrefetchSettings {
    pub max_concurrency: usize,
    pub queue_capacity: usize,
    /// Attempts per target, including the first; 1 disables retries
    pub retry_attempts: u32,
    pub retry_initial_delay_ms: u64,
}

impl Default for PrefetchSettings {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
        }
    }
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    /// Memory budget in bytes
    pub memory_size: u64,
    /// Disk store directory; no disk tier when unset
    pub directory: Option<PathBuf>,
    /// Lifetime of fetched payloads; never expire when unset
    pub expiry_secs: Option<u64>,
    pub sweep_interval_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            memory_size: DEFAULT_MAX_MEMORY_BYTES,
            directory: None,
            expiry_secs: None,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

/// Addressing mode named in `[layer] addressing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressingMode {
    #[default]
    Tiled,
    Partitioned,
}

/// `[layer]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSettings {
    pub id: String,
    pub addressing: AddressingMode,
    pub min_level: u8,
    pub max_level: u8,
    pub scheme: TilingScheme,
    /// URL template for the HTTP fetcher
    pub url_template: Option<String>,
    /// Bearer token sent with every request
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for LayerSettings {
    fn default() -> Self {
        Self {
            id: DEFAULT_LAYER_ID.to_string(),
            addressing: AddressingMode::Tiled,
            min_level: 0,
            max_level: DEFAULT_LAYER_MAX_LEVEL,
            scheme: TilingScheme::Geographic,
            url_template: None,
            token: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ConfigFile {
    /// Orchestrator settings.
    pub fn prefetch_config(&self) -> PrefetchConfig {
        let retry = RetryPolicy::exponential_from(
            self.prefetch.retry_attempts,
            Duration::from_millis(self.prefetch.retry_initial_delay_ms),
        );
        PrefetchConfig::default()
            .with_max_concurrency(self.prefetch.max_concurrency)
            .with_queue_capacity(self.prefetch.queue_capacity)
            .with_retry(retry)
    }

    /// Memory cache settings.
    pub fn cache_config(&self) -> ProtectedCacheConfig {
        ProtectedCacheConfig::default().with_max_memory_bytes(self.cache.memory_size)
    }

    /// Interval of the background expiry sweeper.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache.sweep_interval_secs)
    }

    /// The configured layer.
    pub fn layer_config(&self) -> LayerConfig {
        let layer = &self.layer;
        let config = match layer.addressing {
            AddressingMode::Tiled => {
                LayerConfig::tiled(layer.id.clone(), layer.min_level, layer.max_level, layer.scheme)
            }
            AddressingMode::Partitioned => LayerConfig::partitioned(layer.id.clone()),
        };
        match self.cache.expiry_secs {
            Some(secs) => config.with_expiry(Duration::from_secs(secs)),
            None => config,
        }
    }
}
