//! Service configuration, loaded once from TOML and validated at startup.
//!
//! Every section and field has a default, so an empty file is a valid
//! configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use voxweave_domain::{BlendMode, PitchMode, ResidencyPolicy, VoiceError};

use crate::Result;
use crate::engine::InferenceParams;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub paths: PathsConfig,
    pub synthesis: SynthesisConfig,
    pub narration: NarrationConfig,
    pub stream: StreamConfig,
    pub retention: RetentionConfig,
    pub residency: ResidencyConfig,
    pub blend: BlendConfig,
    pub pitch: PitchConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Base for artifact URLs when clients reach the server through a
    /// different address than it binds.
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7851,
            public_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub output_dir: PathBuf,
    pub voices_dir: PathBuf,
    /// JSON file of precomputed voice embeddings.
    pub voice_library: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("outputs"),
            voices_dir: PathBuf::from("voices"),
            voice_library: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub temperature: f32,
    pub repetition_penalty: f32,
    pub length_penalty: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub enable_text_splitting: bool,
    pub stream_chunk_size: u32,
    /// Upper bound on a batch synthesis, and on the gap between streamed
    /// frames.
    pub timeout_secs: u64,
    pub max_text_chars: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            temperature: 0.75,
            repetition_penalty: 10.0,
            length_penalty: 1.0,
            top_k: 50,
            top_p: 0.85,
            enable_text_splitting: true,
            stream_chunk_size: 20,
            timeout_secs: 120,
            max_text_chars: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrationConfig {
    /// Segments shorter than this (after trimming) are not voiced.
    pub min_segment_chars: usize,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            min_segment_chars: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Frames buffered between the engine and a slow client.
    pub buffer_frames: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { buffer_frames: 2 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub keep_latest: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { keep_latest: 10 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResidencyConfig {
    pub low_resource: bool,
}

impl ResidencyConfig {
    pub fn policy(&self) -> ResidencyPolicy {
        ResidencyPolicy::from_low_resource(self.low_resource)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendConfig {
    pub mode: BlendMode,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchConfig {
    pub default_mode: PitchMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    /// Samples per chunk when re-blocking a streamed engine response.
    pub stream_block_samples: usize,
    pub download_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8020/".to_string(),
            request_timeout_secs: 300,
            stream_block_samples: 4800,
            download_timeout_secs: 60,
        }
    }
}

fn invalid(field: &str, reason: &str) -> VoiceError {
    VoiceError::Configuration(format!("{field}: {reason}"))
}

impl ServiceConfig {
    /// `$XDG_CONFIG_HOME/voxweave/voxweave.toml` or the platform equivalent.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("voxweave").join("voxweave.toml"))
    }

    /// Load `path` when given, else the default location if it exists,
    /// else built-in defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(path) => Self::load(&path),
                None => Ok(Self::default()),
            },
        }
    }

    /// Read and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| VoiceError::storage(path, e))?;
        let config = Self::from_toml_str(&raw)
            .map_err(|e| VoiceError::Configuration(format!("{}: {e}", path.display())))?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| VoiceError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(invalid("server.host", "cannot be empty"));
        }
        if self.paths.output_dir.as_os_str().is_empty() {
            return Err(invalid("paths.output_dir", "cannot be empty"));
        }
        if self.paths.voices_dir.as_os_str().is_empty() {
            return Err(invalid("paths.voices_dir", "cannot be empty"));
        }
        let s = &self.synthesis;
        if !(s.temperature.is_finite() && s.temperature > 0.0) {
            return Err(invalid("synthesis.temperature", "must be positive"));
        }
        if !(s.top_p > 0.0 && s.top_p <= 1.0) {
            return Err(invalid("synthesis.top_p", "must be in (0, 1]"));
        }
        if s.timeout_secs == 0 {
            return Err(invalid("synthesis.timeout_secs", "must be greater than 0"));
        }
        if s.max_text_chars == 0 {
            return Err(invalid("synthesis.max_text_chars", "must be greater than 0"));
        }
        if s.stream_chunk_size == 0 {
            return Err(invalid("synthesis.stream_chunk_size", "must be greater than 0"));
        }
        if self.stream.buffer_frames == 0 {
            return Err(invalid("stream.buffer_frames", "must be greater than 0"));
        }
        if self.retention.keep_latest == 0 {
            return Err(invalid("retention.keep_latest", "must keep at least one file"));
        }
        if self.engine.stream_block_samples == 0 {
            return Err(invalid("engine.stream_block_samples", "must be greater than 0"));
        }
        reqwest::Url::parse(&self.engine.base_url)
            .map_err(|e| invalid("engine.base_url", &e.to_string()))?;
        if let Some(url) = &self.server.public_url {
            reqwest::Url::parse(url).map_err(|e| invalid("server.public_url", &e.to_string()))?;
        }
        Ok(())
    }

    /// Base URL artifact links are built on.
    pub fn public_base_url(&self) -> String {
        match &self.server.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.server.host, self.server.port),
        }
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_secs(self.synthesis.timeout_secs)
    }

    pub fn inference_defaults(&self) -> InferenceParams {
        let s = &self.synthesis;
        InferenceParams {
            temperature: s.temperature,
            length_penalty: s.length_penalty,
            repetition_penalty: s.repetition_penalty,
            top_k: s.top_k,
            top_p: s.top_p,
            enable_text_splitting: s.enable_text_splitting,
            stream_chunk_size: s.stream_chunk_size,
            ..InferenceParams::default()
        }
    }
}
