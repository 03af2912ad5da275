//! Voice identities: conditioning embeddings, weighted blending and the
//! store that resolves voice identifiers.

pub mod blend;
pub mod embedding;
pub mod store;

pub use blend::{VoiceBlender, blend};
pub use embedding::{EmbeddingPayload, VoiceEmbeddingPair};
pub use store::{ResolvedVoice, VoiceStore};
