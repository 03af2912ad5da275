//! Single-point audio resampler. Host-side only (rubato is pure-CPU);
//! callers feed and consume plain `Vec<f32>`.

use rubato::{FftFixedIn, Resampler};
use voxweave_domain::VoiceError;

use crate::Result;

const CHUNK: usize = 1024;
const SUB_CHUNKS: usize = 2;

fn resample_err(e: impl std::fmt::Display) -> VoiceError {
    VoiceError::AudioDecode(format!("resample: {e}"))
}

/// Resample a mono buffer from `sr_in` to `sr_out`.
///
/// The output holds exactly `round(len * sr_out / sr_in)` frames: the
/// resampler's start-up delay is trimmed and its tail flushed.
pub fn resample_mono(input: &[f32], sr_in: u32, sr_out: u32) -> Result<Vec<f32>> {
    if sr_in == 0 || sr_out == 0 {
        return Err(VoiceError::AudioDecode(format!(
            "invalid sample rate {sr_in} -> {sr_out}"
        )));
    }
    if sr_in == sr_out || input.is_empty() {
        return Ok(input.to_vec());
    }

    let mut resampler =
        FftFixedIn::<f32>::new(sr_in as usize, sr_out as usize, CHUNK, SUB_CHUNKS, 1)
            .map_err(resample_err)?;
    let delay = resampler.output_delay();
    let expected = (input.len() as f64 * sr_out as f64 / sr_in as f64).round() as usize;
    let mut out = Vec::with_capacity(expected + delay + CHUNK);

    let mut chunks = input.chunks_exact(CHUNK);
    for chunk in &mut chunks {
        let frames = resampler
            .process(std::slice::from_ref(&chunk), None)
            .map_err(resample_err)?;
        out.extend_from_slice(&frames[0]);
    }
    let tail = chunks.remainder();
    if !tail.is_empty() {
        let frames = resampler
            .process_partial(Some(std::slice::from_ref(&tail)), None)
            .map_err(resample_err)?;
        out.extend_from_slice(&frames[0]);
    }

    // Flush with silence until the delayed signal has fully come out.
    while out.len() < expected + delay {
        let frames = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(resample_err)?;
        if frames[0].is_empty() {
            break;
        }
        out.extend_from_slice(&frames[0]);
    }

    out.drain(..delay.min(out.len()));
    out.resize(expected, 0.0);
    Ok(out)
}
