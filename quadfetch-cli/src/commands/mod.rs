//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! # Command Modules
//!
//! - [`prefetch`] - Fill the cache with tiles or partitions
//! - [`quadkey`] - Convert between tile addresses and quadkeys

pub mod prefetch;
pub mod quadkey;
