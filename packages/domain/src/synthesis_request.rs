//! A single synthesis job and its decoding knobs.
use serde::{Deserialize, Serialize};

use crate::{Language, PitchShift, VocalSpeedMod, VoiceError, VoiceIdentity};

/// Clean-up applied to free text before it reaches the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextFiltering {
    None,
    #[default]
    Standard,
    Html,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: VoiceIdentity,
    #[serde(default)]
    pub language: Language,
    /// Falls back to the service's configured value when unset.
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub repetition_penalty: Option<f32>,
    #[serde(default)]
    pub speed: VocalSpeedMod,
    #[serde(default)]
    pub pitch: PitchShift,
    #[serde(default)]
    pub streaming: bool,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>, voice: VoiceIdentity) -> Self {
        Self {
            text: text.into(),
            voice,
            language: Language::default(),
            temperature: None,
            repetition_penalty: None,
            speed: VocalSpeedMod::NORMAL,
            pitch: PitchShift::NONE,
            streaming: false,
        }
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_repetition_penalty(mut self, penalty: f32) -> Self {
        self.repetition_penalty = Some(penalty);
        self
    }

    pub fn with_pitch(mut self, pitch: PitchShift) -> Self {
        self.pitch = pitch;
        self
    }

    pub fn with_speed(mut self, speed: VocalSpeedMod) -> Self {
        self.speed = speed.normalized();
        self
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Checks that need no engine or filesystem access.
    pub fn validate(&self, max_chars: usize) -> Result<(), VoiceError> {
        if self.text.trim().is_empty() {
            return Err(VoiceError::InvalidRequest("text is empty".into()));
        }
        let len = self.text.chars().count();
        if len > max_chars {
            return Err(VoiceError::InvalidRequest(format!(
                "text is {len} characters, limit is {max_chars}"
            )));
        }
        for (name, value) in [
            ("temperature", self.temperature),
            ("repetition_penalty", self.repetition_penalty),
        ] {
            if let Some(v) = value {
                if !(v.is_finite() && v > 0.0) {
                    return Err(VoiceError::InvalidRequest(format!(
                        "{name} must be positive, got {v}"
                    )));
                }
            }
        }
        if !self.pitch.in_range() {
            return Err(VoiceError::InvalidRequest(format!(
                "pitch must be within ±{} semitones, got {}",
                PitchShift::MAX_SEMITONES,
                self.pitch.semitones
            )));
        }
        if let VoiceIdentity::Blended(parts) = &self.voice {
            if parts.is_empty() {
                return Err(VoiceError::ArityMismatch {
                    voices: 0,
                    weights: 0,
                });
            }
        }
        Ok(())
    }
}
