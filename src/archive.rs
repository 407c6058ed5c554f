//! Archive expansion into a scratch directory under the target root

use crate::cancel::CancellationToken;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::scan::scan;
use rand::Rng;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, warn};

/// Characters used for the random scratch directory suffix
const SCRATCH_CHARSET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Unpacks an archive into a directory
pub trait Extractor: Send + Sync {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()>;
}

/// Built-in extractor for zip archives
#[derive(Debug, Default)]
pub struct ZipExtractor;

impl Extractor for ZipExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        let file = File::open(archive)?;
        let mut zip = zip::ZipArchive::new(BufReader::new(file))?;
        zip.extract(dest)?;
        Ok(())
    }
}

/// Shells out to an external tool: `<program> -xf <archive> -C <dest>`
#[derive(Debug, Clone)]
pub struct CommandExtractor {
    program: String,
}

impl CommandExtractor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Extractor for CommandExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        let output = Command::new(&self.program)
            .arg("-xf")
            .arg(archive)
            .arg("-C")
            .arg(dest)
            .output()
            .map_err(|e| Error::ArchiveExtract {
                path: archive.to_path_buf(),
                message: format!("Failed to execute {}: {}", self.program, e),
            })?;

        if !output.status.success() {
            return Err(Error::ArchiveExtract {
                path: archive.to_path_buf(),
                message: format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(())
    }
}

/// Extractor selected by the configuration
pub fn extractor_for(config: &Config) -> Arc<dyn Extractor> {
    match &config.extract_command {
        Some(program) => Arc::new(CommandExtractor::new(program.clone())),
        None => Arc::new(ZipExtractor),
    }
}

/// Scratch directory that is removed when dropped
struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    fn create(parent: &Path) -> Result<Self> {
        let path = parent.join(scratch_name());
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            warn!(path = ?self.path, error = %e, "Failed to remove scratch directory");
        }
    }
}

/// `_temp_` followed by 8 random characters
fn scratch_name() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..8)
        .map(|_| SCRATCH_CHARSET[rng.gen_range(0..SCRATCH_CHARSET.len())] as char)
        .collect();
    format!("_temp_{}", suffix)
}

/// Extract `archive` under `target_root` and hand the extracted files to
/// `visit`.
///
/// The scratch directory is removed afterwards whether extraction succeeded,
/// failed or only partly completed. `visit` is not called on failure.
pub fn expand<F>(
    archive: &Path,
    target_root: &Path,
    extractor: &dyn Extractor,
    cancel: &CancellationToken,
    visit: F,
) -> Result<()>
where
    F: FnOnce(Vec<PathBuf>),
{
    let scratch = ScratchDir::create(target_root)?;
    debug!(?archive, scratch = ?scratch.path, "Extracting archive");

    extractor.extract(archive, &scratch.path)?;

    let members = scan(&scratch.path, cancel)?;
    debug!(?archive, members = members.len(), "Archive extracted");
    visit(members);
    Ok(())
}
