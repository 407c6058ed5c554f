//! CLI argument parsing with clap

use crate::config::Config;
use clap::Parser;
use std::path::PathBuf;

/// Media Sorter - copy photos and files into a date-partitioned tree
///
/// Every file below the source folder is copied to
/// `<target>/YYYY/YYYY-MM/YYYY-MM-DD HH-MM-SS[ Place].ext`, using the EXIF
/// capture date when present and the modification time otherwise.
#[derive(Parser, Debug)]
#[command(name = "media-sorter")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file (TOML format)
    ///
    /// When specified, settings from the config file are used as defaults.
    /// CLI arguments will override config file settings.
    #[arg(short = 'C', long)]
    pub config: Option<PathBuf>,

    /// Folder to read media from
    #[arg(short, long, env = "MEDIA_SORTER_SOURCE")]
    pub source: Option<PathBuf>,

    /// Folder to sort into
    #[arg(short, long, env = "MEDIA_SORTER_TARGET")]
    pub target: Option<PathBuf>,

    /// Number of worker threads (0 = auto, between 2 and 8)
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,

    /// Do not look up place names for GPS positions
    #[arg(long)]
    pub no_geocode: bool,

    /// External extractor, called as `<cmd> -xf <archive> -C <dir>`
    #[arg(long)]
    pub extract_command: Option<String>,

    /// Write the merged settings back to the config file
    #[arg(long, requires = "config")]
    pub save: bool,

    /// Print a sample configuration file and exit
    #[arg(long)]
    pub print_config: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Output log format as JSON
    #[arg(long)]
    pub json_log: bool,
}

impl Cli {
    /// Get config file name (without extension) for log naming
    pub fn config_name(&self) -> Option<String> {
        self.config.as_ref().and_then(|p| {
            p.file_stem()
                .and_then(|s| s.to_str())
                .map(|s| s.to_string())
        })
    }

    /// Merge CLI arguments with config from file.
    /// CLI arguments take precedence over config file settings.
    pub fn merge_with_config(&self, mut config: Config) -> Config {
        if let Some(ref source) = self.source {
            config.source_dir = source.clone();
        }
        if let Some(ref target) = self.target {
            config.target_dir = target.clone();
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if self.no_geocode {
            config.geocode.enabled = false;
        }
        if let Some(ref command) = self.extract_command {
            config.extract_command = Some(command.clone());
        }

        config
    }

    /// Convert CLI arguments to Config (when no config file is used)
    pub fn to_config(&self) -> Config {
        self.merge_with_config(Config::default())
    }
}
