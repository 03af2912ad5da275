//! Scratch area for in-flight files.
//!
//! Everything not yet final lives in `<output_dir>/.staging/`. Retention only
//! sweeps regular files directly inside the output directory, so staged files
//! are never collected while a request still needs them.

use std::fs::File;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use voxweave_domain::VoiceError;

use crate::Result;

pub const STAGING_DIR: &str = ".staging";

/// `<dir>/.staging`, created on demand.
pub fn staging_dir(dir: &Path) -> Result<PathBuf> {
    let staging = dir.join(STAGING_DIR);
    std::fs::create_dir_all(&staging).map_err(|e| VoiceError::storage(&staging, e))?;
    Ok(staging)
}

/// Write `dest` through a temporary file in the sibling staging directory and
/// rename it into place. A `dest` that is itself staged is written through a
/// temporary file next to it. On any failure `dest` is left untouched.
///
/// Returns the size of the written file.
pub fn write_atomic<F>(dest: &Path, write: F) -> Result<u64>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let staging = if parent.file_name() == Some(std::ffi::OsStr::new(STAGING_DIR)) {
        parent.to_path_buf()
    } else {
        staging_dir(parent)?
    };
    let mut tmp = NamedTempFile::new_in(&staging).map_err(|e| VoiceError::storage(&staging, e))?;

    write(tmp.as_file_mut())?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| VoiceError::storage(dest, e))?;
    let size = tmp
        .as_file()
        .metadata()
        .map_err(|e| VoiceError::storage(dest, e))?
        .len();

    tmp.persist(dest)
        .map_err(|e| VoiceError::storage(dest, e.error))?;
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn failed_write_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.wav");
        let err = write_atomic(&dest, |f| {
            f.write_all(b"partial")
                .map_err(|e| VoiceError::storage("partial", e))?;
            Err(VoiceError::AudioDecode("encoder exploded".into()))
        })
        .unwrap_err();
        assert!(matches!(err, VoiceError::AudioDecode(_)));
        assert!(!dest.exists());
        let leftovers = std::fs::read_dir(dir.path().join(STAGING_DIR)).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn staged_destination_does_not_nest() {
        let dir = tempfile::tempdir().unwrap();
        let staging = staging_dir(dir.path()).unwrap();
        let dest = staging.join("segment.wav");
        let size = write_atomic(&dest, |f| {
            f.write_all(b"pcm").map_err(|e| VoiceError::storage("pcm", e))
        })
        .unwrap();

        assert_eq!(size, 3);
        assert!(dest.is_file());
        assert!(!staging.join(STAGING_DIR).exists());
        let entries: Vec<_> = std::fs::read_dir(&staging).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
