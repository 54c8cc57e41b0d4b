//! Remote data layer access.
//!
//! The prefetch engine only sees the [`Fetcher`] trait. [`HttpFetcher`] is
//! the stock implementation, filling a URL template per target.
//!
//! ```ignore
//! use quadfetch::provider::HttpFetcher;
//!
//! let fetcher = HttpFetcher::new("https://tiles.example.com/{layer}/{quadkey}", "terrain")?
//!     .with_bearer_token(token);
//! ```

mod http;
mod types;

pub use http::{HttpFetcher, DEFAULT_TIMEOUT_SECS};
pub use types::{FetchError, FetchErrorKind, Fetcher};
