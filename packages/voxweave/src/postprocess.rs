//! Pitch shifting and re-encoding of finished waveforms.
//!
//! A shift of `s` semitones reinterprets the samples at
//! `floor(rate * 2^(s/12))` Hz and resamples to the canonical rate, which
//! moves pitch and duration together. [`PitchMode::PreserveDuration`] then
//! time-stretches by `2^(-s/12)` to restore the original duration.

use std::path::Path;

use chrono::Utc;
use tracing::debug;
use voxweave_domain::{OutputArtifact, PitchMode, PitchShift, VoiceError};

use crate::Result;
use crate::audio::{self, SAMPLE_RATE};

/// Shift `samples` (at `sample_rate`) and return canonical-rate audio.
///
/// Shifts beyond [`PitchShift::MAX_SEMITONES`] are refused: the output grows
/// with `2^(-s/12)`, so extreme downward shifts exhaust memory.
pub fn shift_pitch(samples: &[f32], sample_rate: u32, shift: PitchShift) -> Result<Vec<f32>> {
    if !shift.in_range() {
        return Err(VoiceError::InvalidRequest(format!(
            "pitch shift of {} semitones is out of range",
            shift.semitones
        )));
    }
    let ratio = shift.ratio();
    let reinterpreted = (sample_rate as f64 * ratio).floor() as u32;
    let shifted = audio::resample_mono(samples, reinterpreted, SAMPLE_RATE)?;
    Ok(match shift.mode {
        PitchMode::Drift => shifted,
        PitchMode::PreserveDuration => audio::time_stretch(&shifted, 1.0 / ratio),
    })
}

/// Decode `source`, apply `shift` and write a 16-bit PCM WAV to `dest`.
///
/// With no shift the audio is only re-encoded at its own rate. `dest` is
/// written atomically.
pub fn apply(source: &Path, dest: &Path, shift: PitchShift) -> Result<OutputArtifact> {
    let decoded = audio::read_wav(source)?;
    if decoded.samples.is_empty() {
        return Err(VoiceError::AudioDecode(format!(
            "{}: no samples",
            source.display()
        )));
    }
    render(&decoded.samples, decoded.sample_rate, dest, shift)
}

/// [`apply`] for audio already in memory.
pub fn render(
    samples: &[f32],
    sample_rate: u32,
    dest: &Path,
    shift: PitchShift,
) -> Result<OutputArtifact> {
    if samples.is_empty() {
        return Err(VoiceError::AudioDecode("engine returned no samples".into()));
    }
    let shifted;
    let (samples, rate) = if shift.is_identity() {
        (samples, sample_rate)
    } else {
        shifted = shift_pitch(samples, sample_rate, shift)?;
        (shifted.as_slice(), SAMPLE_RATE)
    };
    debug!(
        dest = %dest.display(),
        semitones = shift.semitones,
        mode = ?shift.mode,
        samples = samples.len(),
        "post-processed"
    );

    let size_bytes = audio::write_pcm16_wav(dest, samples, rate)?;
    Ok(OutputArtifact {
        path: dest.to_path_buf(),
        created_at: Utc::now(),
        size_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn float_wav(dir: &Path, name: &str, samples: &[f32], rate: u32) -> PathBuf {
        let path = dir.join(name);
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut w = hound::WavWriter::create(&path, spec).unwrap();
        for &s in samples {
            w.write_sample(s).unwrap();
        }
        w.finalize().unwrap();
        path
    }

    fn tone(n: usize) -> Vec<f32> {
        (0..n).map(|i| (i as f32 * 0.03).sin() * 0.4).collect()
    }

    #[test]
    fn zero_shift_reencodes_pcm16() {
        let dir = tempfile::tempdir().unwrap();
        let src = float_wav(dir.path(), "raw.wav", &tone(4800), 24_000);
        let dest = dir.path().join("out.wav");
        let artifact = apply(&src, &dest, PitchShift::NONE).unwrap();

        let reader = hound::WavReader::open(&dest).unwrap();
        assert_eq!(reader.spec().bits_per_sample, 16);
        assert_eq!(reader.spec().sample_format, hound::SampleFormat::Int);
        assert_eq!(reader.len(), 4800);
        assert_eq!(artifact.size_bytes, 44 + 4800 * 2);
    }

    #[test]
    fn drift_shortens_by_ratio() {
        let dir = tempfile::tempdir().unwrap();
        let src = float_wav(dir.path(), "raw.wav", &tone(24_000), 24_000);
        let dest = dir.path().join("up.wav");
        apply(&src, &dest, PitchShift::new(12, PitchMode::Drift)).unwrap();
        let out = audio::read_wav(&dest).unwrap();
        assert_eq!(out.sample_rate, SAMPLE_RATE);
        assert_eq!(out.samples.len(), 12_000);
    }

    #[test]
    fn preserve_duration_keeps_length() {
        let dir = tempfile::tempdir().unwrap();
        let src = float_wav(dir.path(), "raw.wav", &tone(24_000), 24_000);
        let dest = dir.path().join("down.wav");
        apply(&src, &dest, PitchShift::new(-3, PitchMode::PreserveDuration)).unwrap();
        let out = audio::read_wav(&dest).unwrap();
        let diff = out.samples.len() as i64 - 24_000;
        assert!(diff.abs() <= 2, "length drifted by {diff}");
    }

    #[test]
    fn extreme_shifts_are_refused() {
        let samples = tone(240);
        for semitones in [-170, 25, i32::MAX] {
            let err = shift_pitch(&samples, 24_000, PitchShift::new(semitones, PitchMode::Drift))
                .unwrap_err();
            assert!(matches!(err, VoiceError::InvalidRequest(_)), "{semitones}");
        }
        let out = shift_pitch(&samples, 24_000, PitchShift::new(-24, PitchMode::Drift)).unwrap();
        assert_eq!(out.len(), 960);
    }

    #[test]
    fn empty_or_garbage_input_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let empty = float_wav(dir.path(), "empty.wav", &[], 24_000);
        let garbage = dir.path().join("garbage.wav");
        std::fs::write(&garbage, b"definitely not riff").unwrap();
        for src in [empty, garbage] {
            let dest = dir.path().join("never.wav");
            let err = apply(&src, &dest, PitchShift::NONE).unwrap_err();
            assert!(matches!(err, VoiceError::AudioDecode(_)), "{err}");
            assert!(!dest.exists());
        }
    }
}
