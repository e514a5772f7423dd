//! EBU R128 integrated loudness, loudness range and sample peak.

use crate::audio::buffer::SampleBuffer;
use crate::audio::frames::Frames;
use crate::error::Result;

use super::deadline::Deadline;

const DESCRIPTOR: &str = "loudness";

/// Absolute gate, and the value reported when nothing passes it.
pub const ABSOLUTE_GATE_LUFS: f64 = -70.0;
const RELATIVE_GATE_LU: f64 = -10.0;
const LRA_RELATIVE_GATE_LU: f64 = -20.0;

const BLOCK_SECS: f64 = 0.4;
const SHORT_TERM_SECS: f64 = 3.0;
const STEP_SECS: f64 = 0.1;

/// Reported when the buffer is digital silence.
pub const SILENT_PEAK_DB: f32 = -100.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoudnessDescriptors {
    pub integrated_lufs: f32,
    pub loudness_range: f32,
    pub true_peak: f32,
}

pub fn extract(buffer: &SampleBuffer, deadline: &Deadline) -> Result<LoudnessDescriptors> {
    buffer.require_signal()?;

    let rate = buffer.sample_rate() as f64;
    let (left, right) = buffer.stereo_pair();

    // Prefix sums of K-weighted energy per channel.
    let left_energy = weighted_energy_prefix(left, rate);
    deadline.check(DESCRIPTOR)?;
    let right_energy = if buffer.channel_count() == 1 {
        left_energy.clone()
    } else {
        weighted_energy_prefix(right, rate)
    };
    deadline.check(DESCRIPTOR)?;

    let step = ((STEP_SECS * rate).round() as usize).max(1);
    let momentary = block_energies(
        &left_energy,
        &right_energy,
        ((BLOCK_SECS * rate).round() as usize).max(1),
        step,
    );
    let short_term = block_energies(
        &left_energy,
        &right_energy,
        ((SHORT_TERM_SECS * rate).round() as usize).max(1),
        step,
    );
    deadline.check(DESCRIPTOR)?;

    let integrated_lufs = integrated_loudness(&momentary);
    let loudness_range = loudness_range(&short_term);
    let true_peak = peak_db(buffer);

    log::debug!(
        "loudness: integrated={:.2} LUFS, range={:.2} LU, peak={:.2} dB ({} blocks)",
        integrated_lufs,
        loudness_range,
        true_peak,
        momentary.len()
    );

    Ok(LoudnessDescriptors {
        integrated_lufs: integrated_lufs as f32,
        loudness_range: loudness_range as f32,
        true_peak,
    })
}

/// `20·log10(max |sample|)` over every channel, or -100 dB for silence.
pub fn peak_db(buffer: &SampleBuffer) -> f32 {
    let peak = buffer
        .channels()
        .iter()
        .flat_map(|c| c.iter())
        .map(|s| s.abs())
        .fold(0.0f32, f32::max);
    if peak > 0.0 {
        20.0 * peak.log10()
    } else {
        SILENT_PEAK_DB
    }
}

fn block_loudness(energy: f64) -> f64 {
    -0.691 + 10.0 * energy.log10()
}

fn integrated_loudness(blocks: &[f64]) -> f64 {
    let above_absolute: Vec<f64> = blocks
        .iter()
        .copied()
        .filter(|&e| e > 0.0 && block_loudness(e) > ABSOLUTE_GATE_LUFS)
        .collect();
    if above_absolute.is_empty() {
        return ABSOLUTE_GATE_LUFS;
    }

    let relative_gate = block_loudness(mean(&above_absolute)) + RELATIVE_GATE_LU;
    let gated: Vec<f64> = above_absolute
        .into_iter()
        .filter(|&e| block_loudness(e) > relative_gate)
        .collect();
    if gated.is_empty() {
        return ABSOLUTE_GATE_LUFS;
    }

    block_loudness(mean(&gated)).max(ABSOLUTE_GATE_LUFS)
}

/// EBU Tech 3342: spread between the 10th and 95th percentile of gated
/// short-term loudness.
fn loudness_range(blocks: &[f64]) -> f64 {
    let above_absolute: Vec<f64> = blocks
        .iter()
        .copied()
        .filter(|&e| e > 0.0 && block_loudness(e) > ABSOLUTE_GATE_LUFS)
        .collect();
    if above_absolute.len() < 2 {
        return 0.0;
    }

    let relative_gate = block_loudness(mean(&above_absolute)) + LRA_RELATIVE_GATE_LU;
    let mut levels: Vec<f64> = above_absolute
        .into_iter()
        .map(block_loudness)
        .filter(|&l| l > relative_gate)
        .collect();
    if levels.len() < 2 {
        return 0.0;
    }

    levels.sort_by(|a, b| a.total_cmp(b));
    let low = percentile(&levels, 0.10);
    let high = percentile(&levels, 0.95);
    (high - low).max(0.0)
}

/// Nearest-rank percentile of an ascending slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let idx = ((sorted.len() - 1) as f64 * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Mean-square energy (L + R) of every full block.
fn block_energies(left: &[f64], right: &[f64], block: usize, step: usize) -> Vec<f64> {
    let len = left.len() - 1;
    let count = Frames::count_for(len, block, step);
    (0..count)
        .map(|i| {
            let start = i * step;
            let end = start + block;
            let l = (left[end] - left[start]) / block as f64;
            let r = (right[end] - right[start]) / block as f64;
            (l + r).max(0.0)
        })
        .collect()
}

/// Prefix sum of squared K-weighted samples, length `samples.len() + 1`.
fn weighted_energy_prefix(samples: &[f32], rate: f64) -> Vec<f64> {
    let (mut shelf, mut highpass) = k_weighting(rate);
    let mut prefix = Vec::with_capacity(samples.len() + 1);
    let mut acc = 0.0f64;
    prefix.push(acc);
    for &s in samples {
        let y = highpass.process(shelf.process(s as f64));
        acc += y * y;
        prefix.push(acc);
    }
    prefix
}

/// BS.1770 pre-filter (high shelf) and RLB high-pass, derived for `rate`.
fn k_weighting(rate: f64) -> (Biquad, Biquad) {
    use std::f64::consts::PI;

    let f0 = 1681.974450955533;
    let gain_db = 3.999843853973347;
    let q = 0.7071752369554196;
    let k = (PI * f0 / rate).tan();
    let vh = 10f64.powf(gain_db / 20.0);
    let vb = vh.powf(0.4996667741545416);
    let a0 = 1.0 + k / q + k * k;
    let shelf = Biquad::new(
        [
            (vh + vb * k / q + k * k) / a0,
            2.0 * (k * k - vh) / a0,
            (vh - vb * k / q + k * k) / a0,
        ],
        [2.0 * (k * k - 1.0) / a0, (1.0 - k / q + k * k) / a0],
    );

    let f0 = 38.13547087602444;
    let q = 0.5003270373238773;
    let k = (PI * f0 / rate).tan();
    let a0 = 1.0 + k / q + k * k;
    let highpass = Biquad::new(
        [1.0, -2.0, 1.0],
        [2.0 * (k * k - 1.0) / a0, (1.0 - k / q + k * k) / a0],
    );

    (shelf, highpass)
}

/// Transposed direct form II, `a0` normalised to 1.
struct Biquad {
    b: [f64; 3],
    a: [f64; 2],
    z1: f64,
    z2: f64,
}

impl Biquad {
    fn new(b: [f64; 3], a: [f64; 2]) -> Self {
        Self {
            b,
            a,
            z1: 0.0,
            z2: 0.0,
        }
    }

    fn process(&mut self, x: f64) -> f64 {
        let y = self.b[0] * x + self.z1;
        self.z1 = self.b[1] * x - self.a[0] * y + self.z2;
        self.z2 = self.b[2] * x - self.a[1] * y;
        y
    }
}
