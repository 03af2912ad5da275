//! Finished audio files and the descriptor handed back to clients.
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputArtifact {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
}

impl OutputArtifact {
    /// File name component, lossily converted.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

pub const GENERATE_SUCCESS: &str = "generate-success";
pub const GENERATE_FAILURE: &str = "generate-failure";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub status: String,
    pub output_file_path: String,
    pub output_file_url: String,
    pub output_cache_url: String,
}

impl ArtifactDescriptor {
    /// Build the descriptor for `artifact` served under `base_url`
    /// (for example `http://127.0.0.1:7851`).
    pub fn for_artifact(artifact: &OutputArtifact, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        let name = artifact.file_name();
        Self {
            status: GENERATE_SUCCESS.to_string(),
            output_file_path: artifact.path.display().to_string(),
            output_file_url: format!("{base}/audio/{name}"),
            output_cache_url: format!("{base}/audiocache/{name}"),
        }
    }
}
