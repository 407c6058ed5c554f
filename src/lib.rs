//! Media Sorter - copies photos and other files into a date-partitioned tree
//!
//! This library provides the concurrent sorting pipeline:
//! - Recursive source scanning with cooperative cancellation
//! - A bounded worker pool draining a shared work queue
//! - EXIF capture time and GPS extraction, with file system time fallback
//! - Cached, rate-limited reverse geocoding of GPS positions
//! - Collision-safe destination names with size-based duplicate detection
//! - Inline expansion of archives found in the source tree

pub mod archive;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod error;
pub mod geocode;
pub mod metadata;
pub mod path;
pub mod pool;
pub mod process;
pub mod queue;
pub mod scan;

#[cfg(test)]
mod testutil;

pub use cancel::CancellationToken;
pub use cli::Cli;
pub use config::{Config, ConfigError, GeocodeConfig};
pub use error::{Error, Result};
pub use pool::{SortHandle, Sorter, start_sort};
pub use process::{ProgressListener, Summary};
