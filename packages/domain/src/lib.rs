//! # voxweave domain
//!
//! Value types shared by the voxweave core and its HTTP surface: spans,
//! voice identities, requests, artifacts, residency and the error taxonomy.

pub mod language;
pub mod narration_request;
pub mod output_artifact;
pub mod pitch_shift;
pub mod residency;
pub mod synthesis_request;
pub mod text_span;
pub mod vocal_speed;
pub mod voice_error;
pub mod voice_id;

pub use language::Language;
pub use narration_request::{NarrationRequest, validate_output_name};
pub use output_artifact::{ArtifactDescriptor, GENERATE_FAILURE, GENERATE_SUCCESS, OutputArtifact};
pub use pitch_shift::{PitchMode, PitchShift};
pub use residency::{Residency, ResidencyPolicy};
pub use synthesis_request::{SynthesisRequest, TextFiltering};
pub use text_span::{AmbiguousVoice, SpanKind, TextSpan};
pub use vocal_speed::VocalSpeedMod;
pub use voice_error::{ErrorKind, VoiceError};
pub use voice_id::{BlendMode, VoiceId, VoiceIdentity, WeightedVoice};

/// Prelude module containing commonly used types.
pub mod prelude {
    pub use crate::{
        AmbiguousVoice, ArtifactDescriptor, BlendMode, ErrorKind, Language, NarrationRequest,
        OutputArtifact, PitchMode, PitchShift, Residency, ResidencyPolicy, SpanKind,
        SynthesisRequest, TextFiltering, TextSpan, VocalSpeedMod, VoiceError, VoiceId,
        VoiceIdentity, WeightedVoice,
    };
}
