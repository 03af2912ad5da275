//! Lossless concatenation of per-segment WAV files.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::Utc;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing::{info, warn};
use voxweave_domain::{OutputArtifact, VoiceError};

use crate::Result;
use crate::staging;

#[derive(Debug, Clone)]
pub struct SegmentStitcher {
    output_dir: PathBuf,
}

impl SegmentStitcher {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// `{name}_{unix_ts}_combined.wav` or `{name}_combined.wav`.
    pub fn output_path(&self, name: &str, timestamp: bool) -> PathBuf {
        let file = if timestamp {
            format!("{name}_{}_combined.wav", Utc::now().timestamp())
        } else {
            format!("{name}_combined.wav")
        };
        self.output_dir.join(file)
    }

    /// Concatenate `inputs` in order into `{output_dir}/{name}…_combined.wav`.
    /// See [`stitch`].
    pub fn stitch(
        &self,
        inputs: &[PathBuf],
        name: &str,
        timestamp: bool,
    ) -> Result<OutputArtifact> {
        stitch(inputs, &self.output_path(name, timestamp))
    }
}

/// Concatenate `inputs` in order into `dest` without re-encoding.
///
/// Every input must share one sample format; a differing sample rate is
/// reported as [`VoiceError::SampleRateMismatch`]. Inputs are deleted only
/// after `dest` is fully written; on any failure no output exists and the
/// inputs are left alone.
pub fn stitch(inputs: &[PathBuf], dest: &Path) -> Result<OutputArtifact> {
    let Some(first) = inputs.first() else {
        return Err(VoiceError::InvalidRequest("nothing to stitch".into()));
    };

    let mut readers = Vec::with_capacity(inputs.len());
    let reference = open(first)?;
    let spec = reference.spec();
    readers.push(reference);
    for path in &inputs[1..] {
        let reader = open(path)?;
        check_spec(spec, reader.spec(), path)?;
        readers.push(reader);
    }

    let mut frames = 0u64;
    let size_bytes = staging::write_atomic(dest, |file| {
        let write_err = |e: hound::Error| VoiceError::storage(dest, e);
        let mut writer =
            WavWriter::new(std::io::BufWriter::new(file), spec).map_err(write_err)?;
        for (reader, path) in readers.into_iter().zip(inputs) {
            frames += copy_samples(reader, &mut writer, spec, path)?;
        }
        writer.finalize().map_err(write_err)
    })?;

    for path in inputs {
        if let Err(e) = std::fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "could not remove stitched segment");
        }
    }
    info!(
        segments = inputs.len(),
        samples = frames,
        path = %dest.display(),
        "stitched segments"
    );

    Ok(OutputArtifact {
        path: dest.to_path_buf(),
        created_at: Utc::now(),
        size_bytes,
    })
}

fn open(path: &Path) -> Result<WavReader<BufReader<File>>> {
    WavReader::open(path)
        .map_err(|e| VoiceError::AudioDecode(format!("{}: {e}", path.display())))
}

fn check_spec(expected: WavSpec, found: WavSpec, path: &Path) -> Result<()> {
    if found.sample_rate != expected.sample_rate {
        return Err(VoiceError::SampleRateMismatch {
            expected: expected.sample_rate,
            found: found.sample_rate,
            path: path.to_path_buf(),
        });
    }
    if found != expected {
        return Err(VoiceError::AudioDecode(format!(
            "{}: {} ch {}-bit {:?}, expected {} ch {}-bit {:?}",
            path.display(),
            found.channels,
            found.bits_per_sample,
            found.sample_format,
            expected.channels,
            expected.bits_per_sample,
            expected.sample_format,
        )));
    }
    Ok(())
}

fn copy_samples<W>(
    mut reader: WavReader<BufReader<File>>,
    writer: &mut WavWriter<W>,
    spec: WavSpec,
    path: &Path,
) -> Result<u64>
where
    W: std::io::Write + std::io::Seek,
{
    let decode_err =
        |e: hound::Error| VoiceError::AudioDecode(format!("{}: {e}", path.display()));
    let mut count = 0u64;
    match spec.sample_format {
        SampleFormat::Float => {
            for s in reader.samples::<f32>() {
                writer.write_sample(s.map_err(decode_err)?).map_err(decode_err)?;
                count += 1;
            }
        }
        SampleFormat::Int => {
            for s in reader.samples::<i32>() {
                writer.write_sample(s.map_err(decode_err)?).map_err(decode_err)?;
                count += 1;
            }
        }
    }
    Ok(count / spec.channels.max(1) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm16(dir: &Path, name: &str, samples: &[i16], rate: u32) -> PathBuf {
        let path = dir.join(name);
        let spec = WavSpec {
            channels: 1,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut w = WavWriter::create(&path, spec).unwrap();
        for &s in samples {
            w.write_sample(s).unwrap();
        }
        w.finalize().unwrap();
        path
    }

    #[test]
    fn concatenates_in_order_and_removes_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let a = pcm16(dir.path(), "a.wav", &[1, 2, 3], 24_000);
        let b = pcm16(dir.path(), "b.wav", &[-4, 5], 24_000);
        let stitcher = SegmentStitcher::new(dir.path());
        let artifact = stitcher.stitch(&[a.clone(), b.clone()], "story", false).unwrap();

        assert_eq!(artifact.path, dir.path().join("story_combined.wav"));
        let mut reader = WavReader::open(&artifact.path).unwrap();
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![1, 2, 3, -4, 5]);
        assert!(!a.exists() && !b.exists());
    }

    #[test]
    fn rate_mismatch_leaves_no_output_and_keeps_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let a = pcm16(dir.path(), "a.wav", &[1; 240], 24_000);
        let b = pcm16(dir.path(), "b.wav", &[1; 220], 22_050);
        let dest = dir.path().join("out_combined.wav");
        let err = stitch(&[a.clone(), b.clone()], &dest).unwrap_err();
        match err {
            VoiceError::SampleRateMismatch {
                expected,
                found,
                path,
            } => {
                assert_eq!((expected, found), (24_000, 22_050));
                assert_eq!(path, b);
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(!dest.exists());
        assert!(a.exists() && b.exists());
    }

    #[test]
    fn format_mismatch_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let a = pcm16(dir.path(), "a.wav", &[1, 2], 24_000);
        let b = dir.path().join("b.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 24_000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut w = WavWriter::create(&b, spec).unwrap();
        w.write_sample(0.5f32).unwrap();
        w.finalize().unwrap();

        let err = stitch(&[a, b], &dir.path().join("x.wav")).unwrap_err();
        assert!(matches!(err, VoiceError::AudioDecode(_)));
    }

    #[test]
    fn timestamped_name() {
        let stitcher = SegmentStitcher::new("/out");
        let name = stitcher.output_path("tale", true);
        let file = name.file_name().unwrap().to_string_lossy().into_owned();
        assert!(file.starts_with("tale_") && file.ends_with("_combined.wav"), "{file}");
    }
}
