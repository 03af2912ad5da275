//! `audio/mod.rs` – low-level audio helpers shared by the framer, the
//! post-processor and the stitcher.
//!
//! After `use crate::audio::*` you get:
//!   * WAV header framing and PCM16 quantisation → `empty_stream_header()`,
//!     `quantize_pcm16()`
//!   * WAV file I/O → `read_wav()`, `write_pcm16_wav()`
//!   * Mono resampling → `resample_mono()`
//!   * Duration-preserving time-stretch → `time_stretch()`

pub mod resample;
pub mod stretch;
pub mod wav;

pub use resample::resample_mono;
pub use stretch::time_stretch;
pub use wav::{
    DecodedWav, HEADER_LEN, decode_wav_bytes, empty_stream_header, pcm16_bytes, quantize_pcm16,
    read_wav, write_pcm16_wav,
};

/// Canonical delivery rate of every artifact and stream (24 kHz mono).
pub const SAMPLE_RATE: u32 = 24_000;
