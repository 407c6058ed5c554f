//! Per-file pipeline
//!
//! Handles, for one source file:
//! - Archive expansion (members are processed inline by the same worker)
//! - Metadata extraction and reverse geocoding
//! - Destination resolution with duplicate detection
//! - Copying into the target tree

use crate::archive::{self, Extractor};
use crate::cancel::CancellationToken;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::geocode::GeocodeResolver;
use crate::metadata;
use crate::path::{Outcome, resolve as resolve_destination};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{Level, debug, info, span, warn};

/// How often a copy is re-resolved after losing a race for the destination name
const COPY_RETRIES: usize = 3;

/// Counters shared by all workers of a run
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub total_files: AtomicUsize,
    pub processed: AtomicUsize,
    pub succeeded: AtomicUsize,
    pub skipped: AtomicUsize,
}

/// Final (or intermediate) view of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub total_files: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub processed: usize,
}

impl ProcessingStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one finished file. `processed` is bumped last so that it never
    /// runs ahead of `succeeded + skipped`.
    pub fn record(&self, copied: bool) {
        if copied {
            self.succeeded.fetch_add(1, Ordering::SeqCst);
        } else {
            self.skipped.fetch_add(1, Ordering::SeqCst);
        }
        self.processed.fetch_add(1, Ordering::SeqCst);
    }

    /// An expanded archive stops counting as one file and counts as its members
    fn replace_with_members(&self, members: usize) {
        self.total_files.fetch_add(members, Ordering::SeqCst);
        self.total_files.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Summary {
        Summary {
            total_files: self.total_files.load(Ordering::SeqCst),
            succeeded: self.succeeded.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            processed: self.processed.load(Ordering::SeqCst),
        }
    }

    pub fn summary(&self) -> String {
        let s = self.snapshot();
        format!(
            "Total: {}, Copied: {}, Skipped: {}, Processed: {}",
            s.total_files, s.succeeded, s.skipped, s.processed
        )
    }
}

/// Receives progress of a sort run. Called from worker threads.
pub trait ProgressListener: Send + Sync {
    /// `status` names the file or operation currently in progress
    fn on_progress(&self, _processed: usize, _total: usize, _status: &str) {}

    /// Called once after all workers have exited
    fn on_complete(&self, _summary: &Summary) {}
}

/// Listener that ignores everything
#[derive(Debug, Default)]
pub struct NoopListener;

impl ProgressListener for NoopListener {}

/// Everything a worker needs, shared by the whole pool
pub struct SortContext {
    pub config: Config,
    pub stats: Arc<ProcessingStats>,
    pub cancel: CancellationToken,
    pub geocoder: Option<Arc<GeocodeResolver>>,
    pub extractor: Arc<dyn Extractor>,
    pub listener: Arc<dyn ProgressListener>,
}

impl SortContext {
    pub(crate) fn report(&self, status: &str) {
        let s = self.stats.snapshot();
        self.listener.on_progress(s.processed, s.total_files, status);
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Run the full pipeline for one file and update the counters.
///
/// Never fails: any error counts the file as skipped. `depth` is the archive
/// nesting level (0 for files from the source tree).
pub fn process_file(path: &Path, ctx: &SortContext, depth: usize) {
    let _file_span = span!(Level::DEBUG, "process_file", ?path).entered();
    let name = display_name(path);

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if ctx.config.is_archive(ext) && depth < ctx.config.max_archive_depth {
        process_archive(path, ctx, depth);
        return;
    }

    ctx.report(&format!("Processing: {}", name));

    match sort_file(path, ctx) {
        Ok((dest, Outcome::Copy)) => {
            info!(source = ?path, destination = ?dest, "Copied file");
            ctx.stats.record(true);
        }
        Ok((dest, Outcome::SkipDuplicate)) => {
            debug!(source = ?path, existing = ?dest, "Skipping duplicate");
            ctx.stats.record(false);
        }
        Err(e) => {
            warn!(?path, error = %e, "Failed to process file");
            ctx.stats.record(false);
            ctx.report(&format!("Error: {}: {}", name, e));
        }
    }

    ctx.report(&format!("Processed: {}", name));
}

/// Extract, resolve and copy. Re-resolves if another worker claimed the
/// destination name between the existence check and the copy.
fn sort_file(path: &Path, ctx: &SortContext) -> Result<(PathBuf, Outcome)> {
    let meta = metadata::extract(path, &ctx.config, ctx.geocoder.as_deref());

    let mut retries = 0;
    loop {
        let (dest, outcome) = resolve_destination(&ctx.config.target_dir, &meta, path)?;
        if outcome == Outcome::SkipDuplicate {
            return Ok((dest, outcome));
        }

        match copy_file(path, &dest) {
            Ok(()) => return Ok((dest, Outcome::Copy)),
            Err(Error::Io(e)) if e.kind() == ErrorKind::AlreadyExists && retries < COPY_RETRIES => {
                debug!(?dest, "Destination appeared concurrently, resolving again");
                retries += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn process_archive(path: &Path, ctx: &SortContext, depth: usize) {
    let name = display_name(path);
    ctx.report(&format!("Extracting archive: {}", name));

    let result = archive::expand(
        path,
        &ctx.config.target_dir,
        ctx.extractor.as_ref(),
        &ctx.cancel,
        |members| {
            ctx.stats.replace_with_members(members.len());
            for member in &members {
                if ctx.cancel.is_cancelled() {
                    break;
                }
                process_file(member, ctx, depth + 1);
            }
        },
    );

    if let Err(e) = result {
        warn!(?path, error = %e, "Skipping archive");
        ctx.stats.record(false);
        ctx.report(&format!("Failed to extract archive: {}", name));
    }
}

/// Copy `source` to a not-yet-existing `dest`, creating parent directories
/// and preserving the modification time.
///
/// Fails with `AlreadyExists` instead of overwriting. A partially written
/// destination is removed.
pub fn copy_file(source: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let src_file = File::open(source)?;
    let dest_file = OpenOptions::new().write(true).create_new(true).open(dest)?;

    if let Err(e) = copy_contents(src_file, dest_file) {
        let _ = fs::remove_file(dest);
        return Err(e.into());
    }

    if let Ok(metadata) = fs::metadata(source)
        && let Ok(mtime) = metadata.modified()
    {
        let _ = filetime::set_file_mtime(dest, filetime::FileTime::from_system_time(mtime));
    }

    Ok(())
}

/// Buffered copy
fn copy_contents(src: File, dest: File) -> std::io::Result<()> {
    let mut reader = BufReader::with_capacity(256 * 1024, src);
    let mut writer = BufWriter::with_capacity(256 * 1024, dest);

    let mut buffer = vec![0u8; 256 * 1024];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        writer.write_all(&buffer[..bytes_read])?;
    }

    writer.flush()
}
