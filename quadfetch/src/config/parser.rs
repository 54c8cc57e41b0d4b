//! INI parsing: `Ini` → [`ConfigFile`].
//!
//! The single place where INI key names are mapped to struct fields.

use ini::{Ini, Properties};
use std::path::PathBuf;
use std::str::FromStr;

use super::file::ConfigFileError;
use super::settings::{AddressingMode, ConfigFile};
use super::size::parse_size;
use crate::coord::{TilingScheme, MAX_LEVEL};

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [prefetch] section
    if let Some(section) = ini.section(Some("prefetch")) {
        let s = "prefetch";
        if let Some(v) = positive(section, s, "max_concurrency")? {
            config.prefetch.max_concurrency = v;
        }
        if let Some(v) = positive(section, s, "queue_capacity")? {
            config.prefetch.queue_capacity = v;
        }
        if let Some(v) = positive::<u32>(section, s, "retry_attempts")? {
            config.prefetch.retry_attempts = v;
        }
        if let Some(v) = number(section, s, "retry_initial_delay_ms", "must be an integer (milliseconds)")? {
            config.prefetch.retry_initial_delay_ms = v;
        }
    }

    // [cache] section
    if let Some(section) = ini.section(Some("cache")) {
        let s = "cache";
        if let Some(v) = section.get("memory_size") {
            config.cache.memory_size = parse_size(v).map_err(|_| {
                ConfigFileError::invalid(s, "memory_size", v, "expected format like '2GB', '256MB', or '1024KB'")
            })?;
        }
        if let Some(v) = non_empty(section, "directory") {
            config.cache.directory = Some(expand_tilde(v));
        }
        if let Some(v) = number(section, s, "expiry_secs", "must be an integer (seconds)")? {
            // 0 means no expiry
            config.cache.expiry_secs = (v > 0).then_some(v);
        }
        if let Some(v) = positive(section, s, "sweep_interval_secs")? {
            config.cache.sweep_interval_secs = v;
        }
    }

    // [layer] section
    if let Some(section) = ini.section(Some("layer")) {
        let s = "layer";
        if let Some(v) = section.get("id") {
            let v = v.trim();
            if v.is_empty() || v.contains("::") {
                return Err(ConfigFileError::invalid(s, "id", v, "must be non-empty and not contain '::'"));
            }
            config.layer.id = v.to_string();
        }
        if let Some(v) = section.get("addressing") {
            config.layer.addressing = match v.trim().to_lowercase().as_str() {
                "tiled" => AddressingMode::Tiled,
                "partitioned" => AddressingMode::Partitioned,
                _ => {
                    return Err(ConfigFileError::invalid(s, "addressing", v, "must be 'tiled' or 'partitioned'"));
                }
            };
        }
        if let Some(v) = level(section, "min_level")? {
            config.layer.min_level = v;
        }
        if let Some(v) = level(section, "max_level")? {
            config.layer.max_level = v;
        }
        if let Some(v) = section.get("scheme") {
            config.layer.scheme = TilingScheme::from_name(v).ok_or_else(|| {
                ConfigFileError::invalid(s, "scheme", v, "must be 'geographic' or 'web_mercator'")
            })?;
        }
        if let Some(v) = non_empty(section, "url_template") {
            config.layer.url_template = Some(v.to_string());
        }
        if let Some(v) = non_empty(section, "token") {
            config.layer.token = Some(v.to_string());
        }
        if let Some(v) = positive(section, s, "timeout_secs")? {
            config.layer.timeout_secs = v;
        }

        if config.layer.min_level > config.layer.max_level {
            return Err(ConfigFileError::invalid(
                s,
                "min_level",
                &config.layer.min_level.to_string(),
                format!("must not exceed max_level ({})", config.layer.max_level),
            ));
        }
    }

    Ok(config)
}

fn non_empty<'a>(section: &'a Properties, key: &str) -> Option<&'a str> {
    section.get(key).map(str::trim).filter(|v| !v.is_empty())
}

fn number<T: FromStr>(
    section: &Properties,
    name: &str,
    key: &str,
    reason: &str,
) -> Result<Option<T>, ConfigFileError> {
    match section.get(key) {
        Some(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigFileError::invalid(name, key, v, reason)),
        None => Ok(None),
    }
}

fn positive<T: FromStr + PartialOrd + Default>(
    section: &Properties,
    name: &str,
    key: &str,
) -> Result<Option<T>, ConfigFileError> {
    const REASON: &str = "must be a positive integer";
    match number::<T>(section, name, key, REASON)? {
        Some(v) if v <= T::default() => {
            let raw = section.get(key).unwrap_or_default();
            Err(ConfigFileError::invalid(name, key, raw, REASON))
        }
        other => Ok(other),
    }
}

fn level(section: &Properties, key: &str) -> Result<Option<u8>, ConfigFileError> {
    let reason = format!("must be a level between 0 and {}", MAX_LEVEL);
    match number::<u8>(section, "layer", key, &reason)? {
        Some(v) if v > MAX_LEVEL => {
            let raw = section.get(key).unwrap_or_default();
            Err(ConfigFileError::invalid("layer", key, raw, reason))
        }
        other => Ok(other),
    }
}

/// Expands a leading `~/` to the home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
