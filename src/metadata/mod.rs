//! Per-file metadata extraction
//!
//! The capture timestamp is taken from, in priority order:
//! - EXIF `DateTimeOriginal` (images only)
//! - File system modification time
//!
//! When the image also carries a GPS position, it is reverse geocoded into a
//! place name.

pub mod exif;

use crate::config::Config;
use crate::geocode::GeocodeResolver;
use chrono::NaiveDateTime;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Best-effort metadata of one source file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileMetadata {
    /// Capture time, or `None` if the file could not even be stat'ed
    pub timestamp: Option<NaiveDateTime>,
    /// `true` when `timestamp` came from EXIF rather than the file system
    pub has_precise_date: bool,
    /// Place name of the GPS position, empty if unknown
    pub location: String,
}

/// Extract metadata for a file. Never fails; missing pieces stay empty.
pub fn extract(path: &Path, config: &Config, geocoder: Option<&GeocodeResolver>) -> FileMetadata {
    let mut meta = FileMetadata {
        timestamp: modified_time(path),
        ..FileMetadata::default()
    };

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if !config.is_image(ext) {
        return meta;
    }

    let exif = match exif::read_exif(path) {
        Ok(exif) => exif,
        Err(e) => {
            debug!(?path, error = %e, "No EXIF data, keeping file system time");
            return meta;
        }
    };

    if let Some(taken) = exif::capture_time(&exif) {
        debug!(?path, %taken, "Extracted time from EXIF");
        meta.timestamp = Some(taken);
        meta.has_precise_date = true;
    }

    if let Some(geocoder) = geocoder
        && let Some((lat, lon)) = exif::gps_position(&exif)
    {
        meta.location = geocoder.resolve(lat, lon);
        debug!(?path, lat, lon, location = %meta.location, "Resolved GPS position");
    }

    meta
}

/// Last-write time as a UTC wall clock
fn modified_time(path: &Path) -> Option<NaiveDateTime> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    let datetime: chrono::DateTime<chrono::Utc> = modified.into();
    Some(datetime.naive_utc())
}
