//! WSOLA (waveform-similarity overlap-add) time-stretch. Changes duration
//! without touching pitch; paired with resampling it yields a
//! duration-preserving pitch shift.

use std::f32::consts::PI;

/// Analysis frame for inputs long enough to afford it.
const FRAME: usize = 1024;
/// Below this frame size the signal is too short to search for similarity.
const MIN_FRAME: usize = 64;
/// Correlation is evaluated on every `STRIDE`-th sample.
const STRIDE: usize = 2;

/// Stretch `input` for playback at `rate`: the output holds
/// `round(len / rate)` samples. `rate > 1` shortens, `rate < 1` lengthens.
pub fn time_stretch(input: &[f32], rate: f64) -> Vec<f32> {
    if !(rate.is_finite() && rate > 0.0) || (rate - 1.0).abs() < 1e-9 {
        return input.to_vec();
    }
    let target = (input.len() as f64 / rate).round() as usize;
    if input.is_empty() || target == 0 {
        return Vec::new();
    }

    let frame = frame_len(input.len());
    if frame < MIN_FRAME {
        return linear_resize(input, target);
    }

    let synth_hop = frame / 2;
    let analysis_hop = synth_hop as f64 * rate;
    let tolerance = (frame / 4) as isize;
    let window = hann(frame);

    let mut out = vec![0.0f32; target + frame];
    let mut norm = vec![0.0f32; target + frame];
    let mut prev_start: Option<isize> = None;

    let mut k = 0usize;
    while k * synth_hop < target {
        let out_pos = k * synth_hop;
        let nominal = (k as f64 * analysis_hop).round() as isize;
        let start = match prev_start {
            None => nominal,
            Some(prev) => {
                let natural = prev + synth_hop as isize;
                best_start(input, natural, nominal, tolerance, synth_hop)
            }
        };

        for (i, w) in window.iter().enumerate() {
            out[out_pos + i] += sample(input, start + i as isize) * w;
            norm[out_pos + i] += w;
        }
        prev_start = Some(start);
        k += 1;
    }

    for (o, n) in out.iter_mut().zip(&norm) {
        if *n > 1e-3 {
            *o /= *n;
        }
    }
    out.truncate(target);
    out
}

fn frame_len(len: usize) -> usize {
    if len >= 4 * FRAME {
        FRAME
    } else {
        let quarter = len / 4;
        if quarter == 0 {
            0
        } else {
            1 << (usize::BITS - 1 - quarter.leading_zeros())
        }
    }
}

/// Periodic Hann window; overlapping at half its length it sums to one.
fn hann(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / len as f32).cos())
        .collect()
}

#[inline]
fn sample(input: &[f32], idx: isize) -> f32 {
    if idx < 0 {
        0.0
    } else {
        input.get(idx as usize).copied().unwrap_or(0.0)
    }
}

/// Start position near `nominal` whose waveform best continues the natural
/// successor of the previous frame, beginning at `natural`.
fn best_start(
    input: &[f32],
    natural: isize,
    nominal: isize,
    tolerance: isize,
    overlap: usize,
) -> isize {
    let last = input.len() as isize - 1;
    let lo = (nominal - tolerance).max(0);
    let hi = (nominal + tolerance).min(last.max(0));
    if lo > hi {
        return nominal.max(0);
    }

    let mut best = nominal.clamp(lo, hi);
    let mut best_score = f32::NEG_INFINITY;
    for candidate in lo..=hi {
        let score: f32 = (0..overlap)
            .step_by(STRIDE)
            .map(|i| sample(input, natural + i as isize) * sample(input, candidate + i as isize))
            .sum();
        if score > best_score {
            best_score = score;
            best = candidate;
        }
    }
    best
}

fn linear_resize(input: &[f32], target: usize) -> Vec<f32> {
    if target == 1 || input.len() == 1 {
        return vec![input[0]; target];
    }
    let step = (input.len() - 1) as f64 / (target - 1) as f64;
    (0..target)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = pos.floor() as usize;
            let frac = (pos - idx as f64) as f32;
            let a = input[idx];
            let b = input.get(idx + 1).copied().unwrap_or(a);
            a + (b - a) * frac
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, secs: f32) -> Vec<f32> {
        let n = (24_000.0 * secs) as usize;
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / 24_000.0).sin() * 0.6)
            .collect()
    }

    fn zero_crossings(x: &[f32]) -> usize {
        x.windows(2)
            .filter(|w| (w[0] < 0.0) != (w[1] < 0.0))
            .count()
    }

    #[test]
    fn output_length_follows_rate() {
        let input = sine(220.0, 1.0);
        for rate in [0.5, 0.8, 1.25, 2.0] {
            let out = time_stretch(&input, rate);
            let expected = (input.len() as f64 / rate).round() as usize;
            assert_eq!(out.len(), expected, "rate {rate}");
        }
    }

    #[test]
    fn unit_rate_is_identity() {
        let input = sine(220.0, 0.1);
        assert_eq!(time_stretch(&input, 1.0), input);
    }

    #[test]
    fn pitch_survives_stretch() {
        let input = sine(300.0, 1.0);
        let out = time_stretch(&input, 1.25);
        let in_rate = zero_crossings(&input) as f64 / input.len() as f64;
        let out_rate = zero_crossings(&out) as f64 / out.len() as f64;
        let drift = (out_rate - in_rate).abs() / in_rate;
        assert!(drift < 0.05, "zero-crossing rate drifted by {drift}");
    }

    #[test]
    fn tiny_inputs_are_interpolated() {
        let out = time_stretch(&[0.0, 1.0, 0.0], 0.5);
        assert_eq!(out.len(), 6);
        assert!(time_stretch(&[], 2.0).is_empty());
    }
}
