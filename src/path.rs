//! Destination path derivation and collision handling
//!
//! Layout: `<target>/<YYYY>/<YYYY>-<MM>/<YYYY>-<MM>-<DD> <HH>-<mm>-<ss>[ <Location>].<ext>`
//! with `_1`, `_2`, ... inserted before the extension when the name is taken
//! by a file of a different size.

use crate::error::{Error, Result};
use crate::metadata::FileMetadata;
use chrono::{Datelike, NaiveDateTime};
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Upper bound of the numeric suffix probe
const MAX_SUFFIX: u32 = 10_000;

/// What to do with a source file once its destination is known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The destination is free
    Copy,
    /// A file of the same size already sits at the destination
    SkipDuplicate,
}

/// `<target>/<YYYY>/<YYYY>-<MM>`
pub fn destination_dir(target_root: &Path, timestamp: &NaiveDateTime) -> PathBuf {
    target_root
        .join(format!("{:04}", timestamp.year()))
        .join(format!("{:04}-{:02}", timestamp.year(), timestamp.month()))
}

/// `YYYY-MM-DD HH-mm-ss` followed by ` <location>` when known
pub fn base_name(timestamp: &NaiveDateTime, location: &str) -> String {
    let mut name = timestamp.format("%Y-%m-%d %H-%M-%S").to_string();
    if !location.is_empty() {
        name.push(' ');
        name.push_str(&sanitize(location));
    }
    name
}

/// Replace characters that cannot appear in a file name component
fn sanitize(location: &str) -> String {
    location
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

fn file_name(base: &str, suffix: u32, ext: Option<&std::ffi::OsStr>) -> OsString {
    let mut name = OsString::from(base);
    if suffix > 0 {
        name.push(format!("_{}", suffix));
    }
    if let Some(ext) = ext {
        name.push(".");
        name.push(ext);
    }
    name
}

/// Pick the destination for `source`.
///
/// Probes `base.ext`, `base_1.ext`, `base_2.ext`, ... and stops at the first
/// free name (`Copy`) or at the first existing file with the same byte size
/// as the source (`SkipDuplicate`). Content is never compared.
pub fn resolve(target_root: &Path, meta: &FileMetadata, source: &Path) -> Result<(PathBuf, Outcome)> {
    let timestamp = meta.timestamp.as_ref().ok_or_else(|| Error::UnknownDate {
        path: source.to_path_buf(),
    })?;

    let dir = destination_dir(target_root, timestamp);
    let base = base_name(timestamp, &meta.location);
    let ext = source.extension();
    let source_len = fs::metadata(source)?.len();

    for suffix in 0..MAX_SUFFIX {
        let candidate = dir.join(file_name(&base, suffix, ext));
        match fs::metadata(&candidate) {
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok((candidate, Outcome::Copy));
            }
            Err(e) => return Err(e.into()),
            Ok(existing) if existing.is_file() && existing.len() == source_len => {
                trace!(?source, ?candidate, "Same-size file already at destination");
                return Ok((candidate, Outcome::SkipDuplicate));
            }
            Ok(_) => trace!(?candidate, "Destination taken, probing next suffix"),
        }
    }

    Err(Error::InvalidFilename {
        path: dir.join(base),
    })
}
