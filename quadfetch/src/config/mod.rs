//! User configuration.
//!
//! Settings are read from `~/.quadfetch/config.ini`:
//!
//! ```ini
//! [prefetch]
//! max_concurrency = 4
//! queue_capacity = 16
//! retry_attempts = 3
//! retry_initial_delay_ms = 100
//!
//! [cache]
//! memory_size = 256MB
//! directory = ~/.quadfetch/cache
//! expiry_secs = 86400
//! sweep_interval_secs = 300
//!
//! [layer]
//! id = terrain
//! addressing = tiled
//! min_level = 0
//! max_level = 18
//! scheme = geographic
//! url_template = https://tiles.example.com/{layer}/{level}/{row}/{column}
//! token =
//! ```
//!
//! Every key is optional. [`ConfigFile`] converts the sections into
//! [`PrefetchConfig`](crate::prefetch::PrefetchConfig),
//! [`ProtectedCacheConfig`](crate::cache::ProtectedCacheConfig) and
//! [`LayerConfig`](crate::prefetch::LayerConfig).

mod file;
mod parser;
mod settings;
mod size;

pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{
    AddressingMode, CacheSettings, ConfigFile, LayerSettings, PrefetchSettings,
    DEFAULT_LAYER_ID, DEFAULT_LAYER_MAX_LEVEL, DEFAULT_SWEEP_INTERVAL_SECS,
};
pub use size::{format_size, parse_size, Size, SizeParseError};
