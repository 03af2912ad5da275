//! Model placement and the policy that drives it.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Residency {
    Gpu,
    Cpu,
}

impl std::fmt::Display for Residency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Gpu => "gpu",
            Self::Cpu => "cpu",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidencyPolicy {
    /// Model stays wherever it was loaded.
    #[default]
    Standard,
    /// Model idles on CPU and visits the GPU only for the span of a request.
    LowResource,
}

impl ResidencyPolicy {
    pub fn from_low_resource(enabled: bool) -> Self {
        if enabled {
            Self::LowResource
        } else {
            Self::Standard
        }
    }

    pub fn is_low_resource(self) -> bool {
        matches!(self, Self::LowResource)
    }
}
