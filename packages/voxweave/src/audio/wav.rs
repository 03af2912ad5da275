//! WAV framing and file I/O. Streamed headers are written by hand with
//! `byteorder`; whole files go through `hound`.

use std::io::Write;
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use hound::{SampleFormat, WavReader, WavSpec};
use voxweave_domain::VoiceError;

use crate::Result;
use crate::staging;

/// Size of the canonical RIFF/WAVE header for 16-bit PCM.
pub const HEADER_LEN: usize = 44;

/// Header announcing a mono 16-bit PCM stream whose length is not yet known.
///
/// Sizes are those of an empty file (RIFF size 36, data size 0). Streaming
/// clients read until end of body and ignore the declared length.
pub fn empty_stream_header(sample_rate: u32) -> Vec<u8> {
    let mut header = Vec::with_capacity(HEADER_LEN);
    // Writes into a Vec never fail.
    let _ = write_header(&mut header, sample_rate, 0);
    header
}

fn write_header<W: Write>(w: &mut W, sample_rate_hz: u32, data_size: u32) -> std::io::Result<()> {
    w.write_all(b"RIFF")?;
    w.write_u32::<LittleEndian>(36 + data_size)?;
    w.write_all(b"WAVE")?;

    // fmt  sub-chunk
    w.write_all(b"fmt ")?;
    w.write_u32::<LittleEndian>(16)?; // PCM header size
    w.write_u16::<LittleEndian>(1)?; // PCM = 1
    w.write_u16::<LittleEndian>(1)?; // mono
    w.write_u32::<LittleEndian>(sample_rate_hz)?;
    w.write_u32::<LittleEndian>(sample_rate_hz * 2)?; // byte rate
    w.write_u16::<LittleEndian>(2)?; // block align
    w.write_u16::<LittleEndian>(16)?; // bits per sample

    w.write_all(b"data")?;
    w.write_u32::<LittleEndian>(data_size)
}

/// Clip to [-1, 1] and scale to signed 16-bit.
pub fn quantize_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| {
            let s = if s.is_nan() { 0.0 } else { s.clamp(-1.0, 1.0) };
            (s * 32767.0).round() as i16
        })
        .collect()
}

/// Little-endian byte image of [`quantize_pcm16`].
pub fn pcm16_bytes(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in quantize_pcm16(samples) {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

/// A decoded file, down-mixed to mono.
#[derive(Debug, Clone)]
pub struct DecodedWav {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub spec: WavSpec,
}

impl DecodedWav {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decode any integer (8–32 bit) or 32-bit float WAV to mono f32.
pub fn read_wav(path: &Path) -> Result<DecodedWav> {
    let reader = WavReader::open(path)
        .map_err(|e| VoiceError::AudioDecode(format!("{}: {e}", path.display())))?;
    decode(reader).map_err(|e| VoiceError::AudioDecode(format!("{}: {e}", path.display())))
}

/// [`read_wav`] for an in-memory file.
pub fn decode_wav_bytes(bytes: &[u8]) -> Result<DecodedWav> {
    let reader = WavReader::new(std::io::Cursor::new(bytes))
        .map_err(|e| VoiceError::AudioDecode(e.to_string()))?;
    decode(reader).map_err(VoiceError::AudioDecode)
}

fn decode<R: std::io::Read>(reader: WavReader<R>) -> std::result::Result<DecodedWav, String> {
    let spec = reader.spec();
    let interleaved = decode_samples(reader, spec)?;

    let channels = spec.channels.max(1) as usize;
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok(DecodedWav {
        samples,
        sample_rate: spec.sample_rate,
        spec,
    })
}

fn decode_samples<R: std::io::Read>(
    mut reader: WavReader<R>,
    spec: WavSpec,
) -> std::result::Result<Vec<f32>, String> {
    match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| e.to_string()),
        (SampleFormat::Int, bits @ 8..=32) => {
            let scale = (1i64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| e.to_string())
        }
        (format, bits) => Err(format!("unsupported sample format {format:?}/{bits}-bit")),
    }
}

/// Write mono f32 audio as a 16-bit PCM WAV, atomically.
pub fn write_pcm16_wav(dest: &Path, samples: &[f32], sample_rate: u32) -> Result<u64> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let write_err = |e: hound::Error| VoiceError::storage(dest, e);
    staging::write_atomic(dest, |file| {
        let mut writer =
            hound::WavWriter::new(std::io::BufWriter::new(file), spec).map_err(write_err)?;
        for s in quantize_pcm16(samples) {
            writer.write_sample(s).map_err(write_err)?;
        }
        writer.finalize().map_err(write_err)
    })
}
