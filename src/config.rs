//! Configuration types for the media sorter

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Lower and upper bound of the automatic worker count
const MIN_WORKERS: usize = 2;
const MAX_WORKERS: usize = 8;

/// Reverse geocoding settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocodeConfig {
    /// Resolve GPS coordinates to place names
    pub enabled: bool,

    /// Reverse geocoding endpoint (Nominatim-compatible)
    pub endpoint: String,

    /// User-Agent sent with every request (required by Nominatim's policy)
    pub user_agent: String,

    /// Zoom level passed to the endpoint (10 = city)
    pub zoom: u8,

    /// Pause after each request while holding the network lock, in milliseconds
    pub request_delay_ms: u64,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://nominatim.openstreetmap.org/reverse".into(),
            user_agent: concat!("media-sorter/", env!("CARGO_PKG_VERSION")).into(),
            zoom: 10,
            request_delay_ms: 1100,
            timeout_secs: 20,
        }
    }
}

/// Configuration for the media sorter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory tree to read media from
    pub source_dir: PathBuf,

    /// Root of the date-partitioned output tree
    pub target_dir: PathBuf,

    /// Number of worker threads (0 = auto)
    pub threads: usize,

    /// Extensions probed for embedded EXIF data
    pub image_extensions: Vec<String>,

    /// Extensions expanded as archives
    pub archive_extensions: Vec<String>,

    /// External extraction program, invoked as `<cmd> -xf <archive> -C <dir>`.
    /// When unset the built-in zip extractor is used.
    #[serde(default)]
    pub extract_command: Option<String>,

    /// Nesting depth up to which archives inside archives are expanded
    pub max_archive_depth: usize,

    /// Reverse geocoding settings
    #[serde(default)]
    pub geocode: GeocodeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::new(),
            target_dir: PathBuf::new(),
            threads: 0, // Auto-detect
            image_extensions: vec![
                "jpg".into(), "jpeg".into(), "png".into(), "webp".into(),
                "heic".into(), "heif".into(), "avif".into(), "tiff".into(),
                "tif".into(), "dng".into(), "nef".into(), "cr2".into(),
                "arw".into(), "orf".into(), "rw2".into(), "raf".into(),
            ],
            archive_extensions: vec!["zip".into()],
            extract_command: None,
            max_archive_depth: 4,
            geocode: GeocodeConfig::default(),
        }
    }
}

impl Config {
    /// Check if a file extension may carry EXIF data
    pub fn is_image(&self, ext: &str) -> bool {
        let ext_lower = ext.to_lowercase();
        self.image_extensions.iter().any(|e| e == &ext_lower)
    }

    /// Check if a file extension is an archive to expand
    pub fn is_archive(&self, ext: &str) -> bool {
        let ext_lower = ext.to_lowercase();
        self.archive_extensions.iter().any(|e| e == &ext_lower)
    }

    /// Worker count: the configured value, or the available parallelism
    /// clamped to 2..=8
    pub fn worker_count(&self) -> usize {
        if self.threads > 0 {
            return self.threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(MIN_WORKERS)
            .clamp(MIN_WORKERS, MAX_WORKERS)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError {
            source: e,
        })?;

        fs::write(path, content).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }

    /// Generate a sample configuration file content
    pub fn sample_config() -> String {
        r#"# Media Sorter Configuration File
# This file uses TOML format (https://toml.io)

# Directory tree to read media from
source_dir = "D:/Camera"

# Output root; files land in <target_dir>/YYYY/YYYY-MM/
target_dir = "D:/Sorted"

# Number of worker threads (0 = auto, between 2 and 8)
threads = 0

# Extensions probed for EXIF capture date and GPS position
image_extensions = ["jpg", "jpeg", "png", "webp", "heic", "heif", "avif", "tiff", "tif", "dng", "nef", "cr2", "arw", "orf", "rw2", "raf"]

# Archives are unpacked into a scratch folder under target_dir and sorted too
archive_extensions = ["zip"]

# Optional external extractor, called as `<cmd> -xf <archive> -C <dir>`
# extract_command = "tar"

# Archives nested deeper than this are copied as plain files
max_archive_depth = 4

[geocode]
# Append the city/town/village name of the GPS position to the file name
enabled = true
endpoint = "https://nominatim.openstreetmap.org/reverse"
user_agent = "media-sorter/1.0"
zoom = 10
# Nominatim allows at most one request per second
request_delay_ms = 1100
timeout_secs = 20
"#
        .to_string()
    }
}

/// Errors that can occur when loading or saving configuration
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read configuration file
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to parse configuration file
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// Failed to write configuration file
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to serialize configuration
    SerializeError {
        source: toml::ser::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError { path, source } => {
                write!(f, "Failed to read config file '{}': {}", path.display(), source)
            }
            ConfigError::ParseError { path, source } => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), source)
            }
            ConfigError::WriteError { path, source } => {
                write!(f, "Failed to write config file '{}': {}", path.display(), source)
            }
            ConfigError::SerializeError { source } => {
                write!(f, "Failed to serialize config: {}", source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
            ConfigError::WriteError { source, .. } => Some(source),
            ConfigError::SerializeError { source } => Some(source),
        }
    }
}
