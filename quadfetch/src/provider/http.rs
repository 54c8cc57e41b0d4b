//! HTTP fetcher built on reqwest.
//!
//! Targets are turned into URLs by filling a template:
//!
//! | Placeholder   | Value                                  |
//! |---------------|----------------------------------------|
//! | `{layer}`     | layer id                               |
//! | `{level}`     | tile level                             |
//! | `{row}`       | tile row                               |
//! | `{column}`    | tile column                            |
//! | `{quadkey}`   | decimal 64-bit quadkey                 |
//! | `{partition}` | partition id                           |
//!
//! Example: `https://tiles.example.com/{layer}/{level}/{column}/{row}`

use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use super::types::{FetchError, FetchErrorKind, Fetcher};
use crate::cache::BoxFuture;
use crate::prefetch::PrefetchTarget;

/// Default request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// User agent sent with every request.
const DEFAULT_USER_AGENT: &str = concat!("quadfetch/", env!("CARGO_PKG_VERSION"));

const TILE_PLACEHOLDERS: [&str; 4] = ["{level}", "{row}", "{column}", "{quadkey}"];
const PARTITION_PLACEHOLDER: &str = "{partition}";

/// [`Fetcher`] issuing one GET per target against a URL template.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    url_template: String,
    layer_id: String,
    bearer_token: Option<String>,
}

impl HttpFetcher {
    /// Creates a fetcher for `layer_id`.
    ///
    /// # Arguments
    ///
    /// * `url_template` - URL with placeholders (see module docs)
    /// * `layer_id` - Value for `{layer}`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        url_template: impl Into<String>,
        layer_id: impl Into<String>,
    ) -> Result<Self, FetchError> {
        Self::with_timeout(url_template, layer_id, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Creates a fetcher with a custom request timeout.
    pub fn with_timeout(
        url_template: impl Into<String>,
        layer_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            // Keep connections warm for parallel workers
            .pool_max_idle_per_host(32)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| {
                FetchError::new(
                    FetchErrorKind::Other,
                    format!("Failed to create HTTP client: {}", e),
                )
            })?;

        Ok(Self {
            client,
            url_template: url_template.into(),
            layer_id: layer_id.into(),
            bearer_token: None,
        })
    }

    /// Sends `Authorization: Bearer <token>` with every request.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Builds the request URL for a target.
    ///
    /// # Errors
    ///
    /// Returns `InvalidLayer` if the template has no placeholder for the
    /// target's addressing mode, or uses one that cannot be filled.
    pub fn url_for(&self, target: &PrefetchTarget) -> Result<String, FetchError> {
        let url = self.url_template.replace("{layer}", &self.layer_id);

        let (url, unfilled): (String, &[&str]) = match target {
            PrefetchTarget::Tile(tile) => {
                if !TILE_PLACEHOLDERS.iter().any(|p| url.contains(p)) {
                    return Err(template_error("has no tile placeholder"));
                }
                let url = url
                    .replace("{level}", &tile.level().to_string())
                    .replace("{row}", &tile.row().to_string())
                    .replace("{column}", &tile.column().to_string())
                    .replace("{quadkey}", &tile.quadkey().to_string());
                (url, &[PARTITION_PLACEHOLDER])
            }
            PrefetchTarget::Partition(id) => {
                if !url.contains(PARTITION_PLACEHOLDER) {
                    return Err(template_error("has no {partition} placeholder"));
                }
                (url.replace(PARTITION_PLACEHOLDER, id), &TILE_PLACEHOLDERS)
            }
        };

        if let Some(p) = unfilled.iter().find(|p| url.contains(*p)) {
            return Err(template_error(&format!("uses {} for this target", p)));
        }
        Ok(url)
    }

    async fn get(&self, url: String) -> Result<Bytes, FetchError> {
        trace!(url = %url, "HTTP GET request starting");

        let mut request = self.client.get(&url);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(resp) => {
                debug!(url = %url, status = resp.status().as_u16(), "HTTP response received");
                resp
            }
            Err(e) => {
                warn!(
                    url = %url,
                    error = %e,
                    is_connect = e.is_connect(),
                    is_timeout = e.is_timeout(),
                    "HTTP request failed"
                );
                let kind = if e.is_timeout() {
                    FetchErrorKind::Timeout
                } else {
                    FetchErrorKind::Network
                };
                return Err(FetchError::new(kind, format!("Request failed: {}", e)));
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "HTTP error status");
            return Err(FetchError::from_http_status(
                status.as_u16(),
                format!("HTTP {} from {}", status, url),
            ));
        }

        response.bytes().await.map_err(|e| {
            warn!(url = %url, error = %e, "Failed to read response body");
            FetchError::new(
                FetchErrorKind::Decode,
                format!("Failed to read response: {}", e),
            )
        })
    }
}

fn template_error(reason: &str) -> FetchError {
    FetchError::new(
        FetchErrorKind::InvalidLayer,
        format!("URL template {}", reason),
    )
}

impl Fetcher for HttpFetcher {
    fn fetch<'a>(&'a self, target: &'a PrefetchTarget) -> BoxFuture<'a, Result<Bytes, FetchError>> {
        Box::pin(async move {
            let url = self.url_for(target)?;
            self.get(url).await
        })
    }
}
