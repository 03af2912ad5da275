//! Mixed narration/dialogue generation request, as submitted by form clients.
use serde::{Deserialize, Serialize};

use crate::{AmbiguousVoice, Language, TextFiltering, VoiceError, VoiceId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationRequest {
    pub text: String,
    pub text_filtering: TextFiltering,
    pub character_voice: VoiceId,
    /// When false the whole text is voiced by `character_voice` without
    /// segmentation.
    pub narrator_enabled: bool,
    pub narrator_voice: VoiceId,
    pub ambiguous_voice: AmbiguousVoice,
    pub language: Language,
    pub output_file_name: String,
    pub output_file_timestamp: bool,
}

impl NarrationRequest {
    pub fn validate(&self, max_chars: usize) -> Result<(), VoiceError> {
        let len = self.text.chars().count();
        if self.text.trim().is_empty() {
            return Err(VoiceError::InvalidRequest("text_input is empty".into()));
        }
        if len > max_chars {
            return Err(VoiceError::InvalidRequest(format!(
                "text_input is {len} characters, limit is {max_chars}"
            )));
        }
        for voice in [&self.character_voice, &self.narrator_voice] {
            if !voice.id().ends_with(".wav") {
                return Err(VoiceError::InvalidRequest(format!(
                    "voice must name a .wav file: {voice}"
                )));
            }
        }
        validate_output_name(&self.output_file_name)
    }
}

/// Output base names are restricted to `[A-Za-z0-9_]+`.
pub fn validate_output_name(name: &str) -> Result<(), VoiceError> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(VoiceError::InvalidRequest(format!(
            "output_file_name must match [A-Za-z0-9_]+: {name:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> NarrationRequest {
        NarrationRequest {
            text: "*It was late.* \"Who's there?\"".into(),
            text_filtering: TextFiltering::Standard,
            character_voice: VoiceId::new("female_01.wav"),
            narrator_enabled: true,
            narrator_voice: VoiceId::new("male_01.wav"),
            ambiguous_voice: AmbiguousVoice::Character,
            language: Language::ENGLISH,
            output_file_name: "story_1".into(),
            output_file_timestamp: true,
        }
    }

    #[test]
    fn accepts_well_formed() {
        assert!(request().validate(2000).is_ok());
    }

    #[test]
    fn rejects_bad_fields() {
        let mut r = request();
        r.output_file_name = "../escape".into();
        assert!(r.validate(2000).is_err());

        let mut r = request();
        r.narrator_voice = VoiceId::new("male_01.mp3");
        assert!(r.validate(2000).is_err());

        let mut r = request();
        r.text = "x".repeat(2001);
        assert!(r.validate(2000).is_err());
    }
}
