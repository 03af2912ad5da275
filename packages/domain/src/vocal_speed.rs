//! Speaking rate multiplier (1.0 = normal).
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VocalSpeedMod(pub f32);

impl VocalSpeedMod {
    pub const NORMAL: Self = Self(1.0);

    /// A zero, negative or non-finite rate means "unset" and maps to normal.
    pub fn normalized(self) -> Self {
        if self.0.is_finite() && self.0 > 0.0 {
            self
        } else {
            Self::NORMAL
        }
    }
}

impl Default for VocalSpeedMod {
    fn default() -> Self {
        Self::NORMAL
    }
}
