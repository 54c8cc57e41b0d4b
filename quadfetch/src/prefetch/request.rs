//! Prefetch requests and layer descriptions.

use std::time::Duration;

use crate::coord::{GeoRectangle, TilingScheme, MAX_LEVEL};

/// How a layer addresses its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    /// Quadtree tiles between `min_level` and `max_level` (inclusive).
    Tiled {
        min_level: u8,
        max_level: u8,
        scheme: TilingScheme,
    },
    /// Opaque partition ids.
    Partitioned,
}

impl Addressing {
    /// Name used in configuration and error messages.
    pub fn mode_name(&self) -> &'static str {
        match self {
            Addressing::Tiled { .. } => "tiled",
            Addressing::Partitioned => "partitioned",
        }
    }
}

/// The remote layer a prefetch reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerConfig {
    /// Layer id; also the cache key namespace
    pub id: String,
    pub addressing: Addressing,
    /// Lifetime of fetched payloads in the cache, `None` for no expiry
    pub expiry: Option<Duration>,
}

impl LayerConfig {
    /// A tiled layer. `max_level` is capped at [`MAX_LEVEL`].
    pub fn tiled(id: impl Into<String>, min_level: u8, max_level: u8, scheme: TilingScheme) -> Self {
        Self {
            id: id.into(),
            addressing: Addressing::Tiled {
                min_level,
                max_level: max_level.min(MAX_LEVEL),
                scheme,
            },
            expiry: None,
        }
    }

    /// A partitioned layer.
    pub fn partitioned(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            addressing: Addressing::Partitioned,
            expiry: None,
        }
    }

    /// Set the cache lifetime of fetched payloads.
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = Some(expiry);
        self
    }
}

/// Tiles of an area at a set of levels.
#[derive(Debug, Clone, PartialEq)]
pub struct TileRequest {
    pub area: GeoRectangle,
    /// Requested levels; order and duplicates do not matter
    pub levels: Vec<u8>,
    /// Optional lower clamp on `levels`
    pub min_level: Option<u8>,
    /// Optional upper clamp on `levels`
    pub max_level: Option<u8>,
}

impl TileRequest {
    /// Restrict the requested levels to `min..=max`.
    pub fn with_level_clamp(mut self, min: u8, max: u8) -> Self {
        self.min_level = Some(min);
        self.max_level = Some(max);
        self
    }
}

/// What to prefetch.
#[derive(Debug, Clone, PartialEq)]
pub enum PrefetchRequest {
    Tiles(TileRequest),
    Partitions(Vec<String>),
}

impl PrefetchRequest {
    /// Tiles covering `area` at each of `levels`.
    pub fn tiles(area: GeoRectangle, levels: impl IntoIterator<Item = u8>) -> Self {
        PrefetchRequest::Tiles(TileRequest {
            area,
            levels: levels.into_iter().collect(),
            min_level: None,
            max_level: None,
        })
    }

    /// The given partitions; duplicates are fetched once.
    pub fn partitions<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PrefetchRequest::Partitions(ids.into_iter().map(Into::into).collect())
    }

    /// Addressing mode this request needs from the layer.
    pub fn mode_name(&self) -> &'static str {
        match self {
            PrefetchRequest::Tiles(_) => "tiled",
            PrefetchRequest::Partitions(_) => "partitioned",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiled_layer_caps_max_level() {
        let layer = LayerConfig::tiled("t", 0, 40, TilingScheme::Geographic);
        match layer.addressing {
            Addressing::Tiled { max_level, .. } => assert_eq!(max_level, MAX_LEVEL),
            Addressing::Partitioned => panic!("expected tiled layer"),
        }
    }

    #[test]
    fn test_request_builders() {
        let request = PrefetchRequest::tiles(GeoRectangle::world(), [3, 1, 2]);
        assert_eq!(request.mode_name(), "tiled");

        let request = PrefetchRequest::partitions(["a", "b"]);
        assert_eq!(
            request,
            PrefetchRequest::Partitions(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(request.mode_name(), "partitioned");
    }

    #[test]
    fn test_layer_expiry() {
        let layer = LayerConfig::partitioned("p").with_expiry(Duration::from_secs(60));
        assert_eq!(layer.expiry, Some(Duration::from_secs(60)));
        assert_eq!(layer.addressing.mode_name(), "partitioned");
    }
}
