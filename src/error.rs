//! Error types for the media sorter

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for media sorter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the media sorter
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Source directory {path} cannot be read: {message}")]
    SourceUnreadable { path: PathBuf, message: String },

    #[error("Failed to read EXIF data from {path}: {message}")]
    ExifRead { path: PathBuf, message: String },

    #[error("No usable date for {path}")]
    UnknownDate { path: PathBuf },

    #[error("Reverse geocoding failed: {0}")]
    Geocode(String),

    #[error("Failed to extract archive {path}: {message}")]
    ArchiveExtract { path: PathBuf, message: String },

    #[error("Invalid file name: {path}")]
    InvalidFilename { path: PathBuf },

    #[error("Failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Sort thread panicked")]
    WorkerPanicked,

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}
