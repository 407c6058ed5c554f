//! Media Sorter - copies photos and files into a date-partitioned tree
//!
//! Command-line front end: parses arguments, sets up logging, starts the
//! sort and renders its progress.

use anyhow::Result;
use chrono::Local;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use media_sorter::{Cli, Config, ProgressListener, Sorter, Summary};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cli_output {
    //! Colored terminal output for the final report

    use crossterm::{
        ExecutableCommand,
        style::{Color, Print, Stylize, style},
    };
    use std::io::stdout;

    pub struct CliTheme;

    impl CliTheme {
        pub const SUCCESS: Color = Color::Green;
        pub const WARNING: Color = Color::Yellow;
        pub const HINT: Color = Color::DarkGrey;
        pub const ACCENT: Color = Color::Cyan;
    }

    pub fn print_separator() {
        let _ = stdout().execute(Print(format!("{}\n", "─".repeat(60))));
    }

    pub fn print_title(title: &str) {
        let padding = (60usize.saturating_sub(title.len())) / 2;
        let _ = stdout().execute(Print(" ".repeat(padding)));
        let _ = stdout().execute(Print(style(title).bold()));
        let _ = stdout().execute(Print("\n"));
    }

    pub fn print_warning(msg: &str) {
        let _ = stdout().execute(Print(style("⚠ ").with(CliTheme::WARNING).bold()));
        let _ = stdout().execute(Print(format!("{}\n", msg)));
    }

    pub fn print_stat(key: &str, value: &str, color: Color) {
        let _ = stdout().execute(Print("  "));
        let _ = stdout().execute(Print(style(key).with(CliTheme::HINT)));
        let _ = stdout().execute(Print(": "));
        let _ = stdout().execute(Print(style(value).with(color).bold()));
        let _ = stdout().execute(Print("\n"));
    }

    pub fn print_log_path(path: &str) {
        let _ = stdout().execute(Print("\n"));
        let _ = stdout().execute(Print(style("  Log file: ").with(CliTheme::HINT)));
        let _ = stdout().execute(Print(format!("{}\n", path)));
    }

    pub fn print_blank() {
        let _ = stdout().execute(Print("\n"));
    }
}

/// Renders progress callbacks on a terminal progress bar
struct BarListener {
    bar: ProgressBar,
}

impl BarListener {
    fn new() -> Result<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {wide_msg}")?
                .progress_chars("##-"),
        );
        bar.set_message("Starting...");
        Ok(Self { bar })
    }
}

impl ProgressListener for BarListener {
    fn on_progress(&self, processed: usize, total: usize, status: &str) {
        self.bar.set_length(total as u64);
        self.bar.set_position(processed as u64);
        self.bar.set_message(status.to_string());
    }

    fn on_complete(&self, _summary: &Summary) {
        self.bar.finish_and_clear();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_config {
        print!("{}", Config::sample_config());
        return Ok(());
    }

    let exe_dir = get_executable_dir()?;
    let log_path = get_log_path(&exe_dir, &cli);
    let _guard = setup_logging(&cli, &log_path)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Media Sorter starting");

    let config = load_config(&cli, &exe_dir)?;
    if cli.verbose {
        info!(?config, "Configuration loaded");
    }
    info!(log_file = %log_path.display(), "Log file location");

    validate_config(&config)?;

    if cli.save
        && let Some(ref config_path) = cli.config
    {
        let path = resolve_config_path(&exe_dir, config_path);
        config.save_to_file(&path)?;
        info!(config_file = %path.display(), "Configuration saved");
    }

    let listener = Arc::new(BarListener::new()?);
    let sorter = Sorter::new(config)?.with_listener(Arc::clone(&listener) as Arc<dyn ProgressListener>);

    let token = sorter.cancellation_token();
    ctrlc::set_handler(move || {
        info!("Ctrl+C received, stopping after the current files");
        token.cancel();
    })?;

    let handle = sorter.start()?;
    match handle.join() {
        Ok(summary) => {
            listener.bar.finish_and_clear();
            print_summary(&summary, &log_path);
            info!(log_file = %log_path.display(), "Processing complete. Log saved to");
            Ok(())
        }
        Err(e) => {
            listener.bar.abandon();
            error!(error = %e, "Processing failed");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_summary(summary: &Summary, log_path: &Path) {
    use cli_output::*;

    print_separator();
    print_title("Sorting complete");
    print_separator();

    print_blank();
    print_stat("Total files", &summary.total_files.to_string(), CliTheme::ACCENT);
    print_stat("Copied", &summary.succeeded.to_string(), CliTheme::SUCCESS);
    print_stat("Skipped", &summary.skipped.to_string(), CliTheme::WARNING);
    print_blank();

    if summary.processed < summary.total_files {
        print_separator();
        print_warning(&format!(
            "Stopped early: {} of {} files were processed",
            summary.processed, summary.total_files
        ));
    }

    print_separator();
    print_log_path(&log_path.display().to_string());
}

/// Get the directory where the executable is located
fn get_executable_dir() -> Result<PathBuf> {
    let exe_path = std::env::current_exe()?;
    Ok(exe_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".")))
}

/// Determine the log file path based on config file or timestamp
fn get_log_path(exe_dir: &Path, cli: &Cli) -> PathBuf {
    let log_dir = exe_dir.join("Log");
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");

    if let Some(config_name) = cli.config_name() {
        log_dir
            .join(&config_name)
            .join(format!("{}_{}.log", config_name, timestamp))
    } else {
        log_dir.join(format!("Sort_{}.log", timestamp))
    }
}

/// Resolve config path - `-C holiday` finds `holiday.toml` here or in `<exe>/Config/`
fn resolve_config_path(exe_dir: &Path, config_path: &Path) -> PathBuf {
    if config_path.exists() {
        return config_path.to_path_buf();
    }

    let with_extension = if config_path.extension().is_none() {
        config_path.with_extension("toml")
    } else {
        config_path.to_path_buf()
    };

    if with_extension.exists() {
        return with_extension;
    }

    let filename = with_extension
        .file_name()
        .unwrap_or(with_extension.as_os_str());
    let in_config_dir = exe_dir.join("Config").join(filename);

    if in_config_dir.exists() {
        return in_config_dir;
    }

    with_extension
}

/// Load configuration from file or CLI arguments
fn load_config(cli: &Cli, exe_dir: &Path) -> Result<Config> {
    let Some(ref config_path) = cli.config else {
        return Ok(cli.to_config());
    };

    let resolved_path = resolve_config_path(exe_dir, config_path);
    if !resolved_path.exists() && cli.save {
        // First `--save` creates the file
        info!(config_file = %resolved_path.display(), "Config file not found, starting from defaults");
        return Ok(cli.to_config());
    }

    info!(config_file = %resolved_path.display(), "Loading configuration from file");
    let file_config = Config::load_from_file(&resolved_path)?;
    Ok(cli.merge_with_config(file_config))
}

/// File log with everything at the chosen level, console with warnings only
fn setup_logging(cli: &Cli, log_path: &Path) -> Result<WorkerGuard> {
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(log_path)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(LevelFilter::WARN);
    let subscriber = tracing_subscriber::registry().with(env_filter).with(console);

    if cli.json_log {
        subscriber
            .with(fmt::layer().json().with_ansi(false).with_writer(non_blocking))
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
            .init();
    }

    Ok(guard)
}

/// Validate the roots before anything is started
fn validate_config(config: &Config) -> Result<()> {
    if config.source_dir.as_os_str().is_empty() {
        anyhow::bail!("No source folder given (use --source or set source_dir in the config file)");
    }
    if config.target_dir.as_os_str().is_empty() {
        anyhow::bail!("No target folder given (use --target or set target_dir in the config file)");
    }
    if !config.source_dir.is_dir() {
        anyhow::bail!("Source folder does not exist: {}", config.source_dir.display());
    }

    let source = config.source_dir.canonicalize()?;
    let target = absolute_target(&config.target_dir)?;
    if target.starts_with(&source) {
        anyhow::bail!(
            "Target folder {} is inside the source folder {}",
            config.target_dir.display(),
            config.source_dir.display()
        );
    }

    Ok(())
}

/// Canonical form of the target, which may not exist yet
fn absolute_target(target: &Path) -> Result<PathBuf> {
    if target.exists() {
        return Ok(target.canonicalize()?);
    }
    Ok(std::path::absolute(target)?)
}
