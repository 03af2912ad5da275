//! Synthesis language code, restricted to the set the engine was trained on.
use serde::{Deserialize, Deserializer, Serialize};

use crate::VoiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Language(&'static str);

impl Language {
    /// Get the underlying language code.
    pub const fn code(&self) -> &'static str {
        self.0
    }

    pub const ARABIC: Self = Self("ar");
    pub const CHINESE: Self = Self("zh-cn");
    pub const CZECH: Self = Self("cs");
    pub const DUTCH: Self = Self("nl");
    pub const ENGLISH: Self = Self("en");
    pub const FRENCH: Self = Self("fr");
    pub const GERMAN: Self = Self("de");
    pub const HUNGARIAN: Self = Self("hu");
    pub const ITALIAN: Self = Self("it");
    pub const JAPANESE: Self = Self("ja");
    pub const KOREAN: Self = Self("ko");
    pub const POLISH: Self = Self("pl");
    pub const PORTUGUESE: Self = Self("pt");
    pub const RUSSIAN: Self = Self("ru");
    pub const SPANISH: Self = Self("es");
    pub const TURKISH: Self = Self("tr");

    /// Every accepted language.
    pub const SUPPORTED: [Self; 16] = [
        Self::ARABIC,
        Self::CHINESE,
        Self::CZECH,
        Self::DUTCH,
        Self::ENGLISH,
        Self::FRENCH,
        Self::GERMAN,
        Self::HUNGARIAN,
        Self::ITALIAN,
        Self::JAPANESE,
        Self::KOREAN,
        Self::POLISH,
        Self::PORTUGUESE,
        Self::RUSSIAN,
        Self::SPANISH,
        Self::TURKISH,
    ];

    /// Look up a code, case-insensitively.
    pub fn parse(code: &str) -> Result<Self, VoiceError> {
        let wanted = code.trim().to_ascii_lowercase();
        Self::SUPPORTED
            .iter()
            .copied()
            .find(|lang| lang.0 == wanted)
            .ok_or_else(|| VoiceError::InvalidRequest(format!("unsupported language: {code}")))
    }
}

impl Default for Language {
    fn default() -> Self {
        Self::ENGLISH
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

impl std::str::FromStr for Language {
    type Err = VoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for Language {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        Self::parse(&code).map_err(serde::de::Error::custom)
    }
}
