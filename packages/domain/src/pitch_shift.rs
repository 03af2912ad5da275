//! Semitone pitch shift applied after synthesis.
use serde::{Deserialize, Serialize};

/// What happens to duration when pitch moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PitchMode {
    /// Resample only; duration scales by `2^(-semitones/12)`.
    Drift,
    /// Resample, then time-stretch back to the original duration.
    #[default]
    PreserveDuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PitchShift {
    pub semitones: i32,
    #[serde(default)]
    pub mode: PitchMode,
}

impl PitchShift {
    pub const NONE: Self = Self {
        semitones: 0,
        mode: PitchMode::PreserveDuration,
    };

    /// Largest accepted shift in either direction, two octaves.
    pub const MAX_SEMITONES: i32 = 24;

    pub const fn new(semitones: i32, mode: PitchMode) -> Self {
        Self { semitones, mode }
    }

    /// `2^(semitones/12)`.
    pub fn ratio(&self) -> f64 {
        2f64.powf(self.semitones as f64 / 12.0)
    }

    pub fn in_range(&self) -> bool {
        (-Self::MAX_SEMITONES..=Self::MAX_SEMITONES).contains(&self.semitones)
    }

    pub fn is_identity(&self) -> bool {
        self.semitones == 0
    }
}
