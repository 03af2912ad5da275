//! Resolves voice identifiers to reference audio or precomputed embeddings.
//!
//! Three sources, checked in order: the in-memory voice library (loaded
//! from a JSON file of embeddings), `http(s)` URLs (downloaded once into the
//! voices directory), and plain file names inside the voices directory.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};
use voxweave_domain::{VoiceError, VoiceId};

use crate::Result;
use crate::staging;
use crate::voice::embedding::{EmbeddingPayload, VoiceEmbeddingPair};

/// What a voice identifier resolved to.
#[derive(Debug, Clone)]
pub enum ResolvedVoice {
    /// Ready-made conditioning; no engine call needed.
    Embedding(VoiceEmbeddingPair),
    /// Reference clip the engine must derive conditioning from.
    ReferenceAudio(PathBuf),
}

#[derive(Debug, Clone)]
pub struct VoiceStore {
    voices_dir: PathBuf,
    library: HashMap<String, VoiceEmbeddingPair>,
    http: reqwest::Client,
}

impl VoiceStore {
    pub fn new(voices_dir: impl Into<PathBuf>) -> Self {
        Self {
            voices_dir: voices_dir.into(),
            library: HashMap::new(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VoiceError::Configuration(format!("http client: {e}")))?;
        Ok(self)
    }

    /// Load a voice library: a JSON object mapping names to embedding pairs.
    pub fn with_library_file(mut self, path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| VoiceError::storage(path, e))?;
        let entries: HashMap<String, EmbeddingPayload> =
            serde_json::from_str(&raw).map_err(|e| {
                VoiceError::Configuration(format!("voice library {}: {e}", path.display()))
            })?;
        for (name, payload) in entries {
            let pair = VoiceEmbeddingPair::from_payload(&payload).map_err(|e| {
                VoiceError::Configuration(format!("voice library entry {name:?}: {e}"))
            })?;
            self.library.insert(name, pair);
        }
        info!(
            voices = self.library.len(),
            path = %path.display(),
            "loaded voice library"
        );
        Ok(self)
    }

    /// Register a precomputed embedding under `name`.
    pub fn insert_embedding(&mut self, name: impl Into<String>, pair: VoiceEmbeddingPair) {
        self.library.insert(name.into(), pair);
    }

    pub fn voices_dir(&self) -> &Path {
        &self.voices_dir
    }

    pub fn library_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.library.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn resolve(&self, id: &VoiceId) -> Result<ResolvedVoice> {
        if let Some(pair) = self.library.get(id.id()) {
            debug!(voice = %id, "resolved from voice library");
            return Ok(ResolvedVoice::Embedding(pair.clone()));
        }
        if id.is_url() {
            return self
                .download_if_missing(id.id())
                .await
                .map(ResolvedVoice::ReferenceAudio);
        }
        self.local_reference(id.id()).map(ResolvedVoice::ReferenceAudio)
    }

    /// Path of a reference clip in the voices directory.
    pub fn local_reference(&self, name: &str) -> Result<PathBuf> {
        let file = safe_file_name(name)
            .ok_or_else(|| VoiceError::VoiceNotFound(format!("invalid voice name: {name:?}")))?;
        let path = self.voices_dir.join(file);
        if path.is_file() {
            Ok(path)
        } else {
            Err(VoiceError::VoiceNotFound(name.to_string()))
        }
    }

    /// Fetch `url` into the voices directory unless a file with the same
    /// name is already there. The cache key is the last URL path segment.
    pub async fn download_if_missing(&self, url: &str) -> Result<PathBuf> {
        let parsed = reqwest::Url::parse(url).map_err(|e| VoiceError::Download {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let name = parsed
            .path_segments()
            .and_then(|mut segs| segs.next_back())
            .and_then(safe_file_name)
            .ok_or_else(|| VoiceError::Download {
                url: url.to_string(),
                reason: "URL path has no usable file name".into(),
            })?
            .to_string();

        let dest = self.voices_dir.join(&name);
        if dest.is_file() {
            debug!(%url, path = %dest.display(), "voice already cached");
            return Ok(dest);
        }

        info!(%url, "downloading voice");
        let download_err = |e: reqwest::Error| VoiceError::Download {
            url: url.to_string(),
            reason: e.to_string(),
        };
        let bytes = self
            .http
            .get(parsed)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(download_err)?
            .bytes()
            .await
            .map_err(download_err)?;

        tokio::fs::create_dir_all(&self.voices_dir)
            .await
            .map_err(|e| VoiceError::storage(&self.voices_dir, e))?;
        let target = dest.clone();
        tokio::task::spawn_blocking(move || {
            staging::write_atomic(&target, |f| {
                f.write_all(&bytes)
                    .map_err(|e| VoiceError::storage(&target, e))
            })
        })
        .await
        .map_err(|e| VoiceError::storage(&dest, e))??;

        info!(path = %dest.display(), "voice cached");
        Ok(dest)
    }

    /// Reference clips (`*.wav`) in the voices directory, sorted by name.
    pub fn list_reference_voices(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.voices_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(dir = %self.voices_dir.display(), "voices directory missing");
                return Ok(Vec::new());
            }
            Err(e) => return Err(VoiceError::storage(&self.voices_dir, e)),
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.ends_with(".wav"))
            .collect();
        names.sort();
        Ok(names)
    }
}

/// A bare file name with no directory components.
fn safe_file_name(name: &str) -> Option<&str> {
    let ok = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
        && !name.starts_with('.');
    ok.then_some(name)
}
