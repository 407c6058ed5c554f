//! Sort runs: scanner thread, worker pool and the handle used to stop them

use crate::archive::{Extractor, extractor_for};
use crate::cancel::CancellationToken;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::geocode::GeocodeResolver;
use crate::process::{
    NoopListener, ProcessingStats, ProgressListener, SortContext, Summary, process_file,
};
use crate::queue::WorkQueue;
use crate::scan::scan;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Builder for one sort run
pub struct Sorter {
    config: Config,
    geocoder: Option<Arc<GeocodeResolver>>,
    extractor: Arc<dyn Extractor>,
    listener: Arc<dyn ProgressListener>,
    cancel: CancellationToken,
}

impl Sorter {
    /// Create a sorter with the collaborators the configuration asks for
    pub fn new(config: Config) -> Result<Self> {
        let geocoder = if config.geocode.enabled {
            Some(Arc::new(GeocodeResolver::from_config(&config.geocode)?))
        } else {
            None
        };
        let extractor = extractor_for(&config);

        Ok(Self {
            config,
            geocoder,
            extractor,
            listener: Arc::new(NoopListener),
            cancel: CancellationToken::new(),
        })
    }

    /// Replace the geocoder (`None` disables place names)
    pub fn with_geocoder(mut self, geocoder: Option<GeocodeResolver>) -> Self {
        self.geocoder = geocoder.map(Arc::new);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Token that stops this run once cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Validate the roots and start sorting in the background.
    ///
    /// An unreadable source root fails here, before any thread is started.
    pub fn start(self) -> Result<SortHandle> {
        let source = &self.config.source_dir;
        fs::read_dir(source).map_err(|e| Error::SourceUnreadable {
            path: source.clone(),
            message: e.to_string(),
        })?;
        fs::create_dir_all(&self.config.target_dir)?;

        let workers = self.config.worker_count();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("sort-worker-{}", i))
            .build()?;

        let stats = Arc::new(ProcessingStats::new());
        let ctx = Arc::new(SortContext {
            config: self.config,
            stats: Arc::clone(&stats),
            cancel: self.cancel.clone(),
            geocoder: self.geocoder,
            extractor: self.extractor,
            listener: self.listener,
        });

        info!(
            source = ?ctx.config.source_dir,
            target = ?ctx.config.target_dir,
            workers,
            geocode = ctx.geocoder.is_some(),
            "Starting sort"
        );

        let thread = thread::Builder::new()
            .name("sort-scanner".into())
            .spawn(move || run(&pool, &ctx, workers))?;

        Ok(SortHandle {
            stats,
            cancel: self.cancel,
            thread,
        })
    }
}

/// Start sorting `config.source_dir` into `config.target_dir`
pub fn start_sort(config: Config) -> Result<SortHandle> {
    Sorter::new(config)?.start()
}

/// A running sort
pub struct SortHandle {
    stats: Arc<ProcessingStats>,
    cancel: CancellationToken,
    thread: JoinHandle<Result<Summary>>,
}

impl SortHandle {
    /// Ask the run to stop. Files already being processed are finished and
    /// counted; no new file is started.
    pub fn request_stop(&self) {
        info!("Stop requested");
        self.cancel.cancel();
    }

    /// Current counters
    pub fn stats(&self) -> Summary {
        self.stats.snapshot()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for every worker to exit and return the final counters
    pub fn join(self) -> Result<Summary> {
        self.thread.join().map_err(|_| Error::WorkerPanicked)?
    }
}

/// Scanner side of a run: enumerate, feed the workers, wait for them
fn run(pool: &rayon::ThreadPool, ctx: &SortContext, workers: usize) -> Result<Summary> {
    ctx.report("Counting files...");

    let files = match scan(&ctx.config.source_dir, &ctx.cancel) {
        Ok(files) => files,
        Err(e) => {
            warn!(error = %e, "Scan failed");
            ctx.listener.on_complete(&ctx.stats.snapshot());
            return Err(e);
        }
    };
    ctx.stats.total_files.store(files.len(), Ordering::SeqCst);
    info!(total = files.len(), "Found files");
    ctx.report(&format!("Found {} files", files.len()));

    let queue = WorkQueue::new();
    pool.in_place_scope(|s| {
        for _ in 0..workers {
            s.spawn(|_| worker_loop(&queue, ctx));
        }

        for file in files {
            if ctx.cancel.is_cancelled() {
                debug!(queued = queue.len(), "Cancelled while queueing");
                break;
            }
            queue.push(file);
        }
        queue.mark_finished();
    });

    let summary = ctx.stats.snapshot();
    if ctx.cancel.is_cancelled() {
        info!(?summary, "Sort stopped");
    } else {
        info!(?summary, "Sort complete");
    }
    ctx.listener.on_complete(&summary);
    Ok(summary)
}

fn worker_loop(queue: &WorkQueue<PathBuf>, ctx: &SortContext) {
    while let Some(path) = queue.pop() {
        if ctx.cancel.is_cancelled() {
            break;
        }
        process_file(&path, ctx, 0);
    }
    debug!(thread = ?thread::current().name(), "Worker exiting");
}
