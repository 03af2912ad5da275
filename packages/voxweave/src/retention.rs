//! Bounded-count retention over the output directory.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};
use voxweave_domain::VoiceError;

use crate::Result;

/// What a sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub kept: usize,
    pub deleted: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ArtifactRetention {
    keep_latest: usize,
}

impl ArtifactRetention {
    pub fn new(keep_latest: usize) -> Self {
        Self { keep_latest }
    }

    pub fn keep_latest(&self) -> usize {
        self.keep_latest
    }

    /// Delete every regular file in `dir` beyond the `keep_latest` most
    /// recently modified. Subdirectories and symlinks are never touched.
    /// A file that cannot be removed is logged and skipped.
    pub fn sweep(&self, dir: &Path) -> Result<SweepReport> {
        let entries = std::fs::read_dir(dir).map_err(|e| VoiceError::storage(dir, e))?;

        let mut files: Vec<(SystemTime, PathBuf)> = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "unreadable directory entry");
                    continue;
                }
            };
            // DirEntry::file_type does not follow symlinks.
            match entry.file_type() {
                Ok(t) if t.is_file() => {}
                _ => continue,
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            files.push((modified, entry.path()));
        }

        files.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

        let mut report = SweepReport {
            kept: files.len().min(self.keep_latest),
            ..SweepReport::default()
        };
        for (_, path) in files.into_iter().skip(self.keep_latest) {
            match std::fs::remove_file(&path) {
                Ok(()) => report.deleted.push(path),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "could not delete old artifact");
                    report.failed.push(path);
                }
            }
        }
        debug!(
            dir = %dir.display(),
            kept = report.kept,
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "retention sweep"
        );
        Ok(report)
    }
}
