//! Tempo, beat confidence and danceability from a spectral-flux onset curve.

use crate::audio::buffer::SampleBuffer;
use crate::audio::frames::Frames;
use crate::audio::spectrum::SpectralTransform;
use crate::error::Result;

use super::deadline::Deadline;

const DESCRIPTOR: &str = "rhythm";

const FFT_SIZE: usize = 2048;
const HOP_SIZE: usize = 512;

const MIN_BPM: f32 = 40.0;
const MAX_BPM: f32 = 208.0;
const PRIOR_BPM: f32 = 120.0;
/// Width of the tempo prior, in octaves.
const PRIOR_OCTAVES: f32 = 1.0;
/// Half-width of the moving average removed from the onset curve.
const DETREND_RADIUS: usize = 8;
/// Onset curves whose peak stays below this carry no rhythm.
const ONSET_FLOOR: f32 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RhythmDescriptors {
    pub bpm: f32,
    pub beat_confidence: f32,
    pub danceability: f32,
}

impl RhythmDescriptors {
    /// Reported for silence and for signals without onsets.
    pub const NONE: RhythmDescriptors = RhythmDescriptors {
        bpm: 0.0,
        beat_confidence: 0.0,
        danceability: 0.0,
    };
}

pub fn extract(buffer: &SampleBuffer, deadline: &Deadline) -> Result<RhythmDescriptors> {
    buffer.require_signal()?;

    let mono = buffer.mono_mix();
    let sr = buffer.sample_rate();
    let frame_rate = sr as f32 / HOP_SIZE as f32;

    let flux = onset_strength(&mono, sr, deadline)?;
    let onset = detrend(&flux);

    let peak = onset.iter().copied().fold(0.0f32, f32::max);
    if peak < ONSET_FLOOR {
        log::debug!("rhythm: no onsets (peak flux {:.4})", peak);
        return Ok(RhythmDescriptors::NONE);
    }
    deadline.check(DESCRIPTOR)?;

    let Some(tempo) = estimate_tempo(&onset, frame_rate) else {
        log::debug!("rhythm: onset curve too short for tempo range");
        return Ok(RhythmDescriptors::NONE);
    };
    deadline.check(DESCRIPTOR)?;

    let pulse = pulse_clarity(&onset, tempo.lag);
    let beat_times = pick_onsets(&onset, frame_rate);
    let regularity = onset_regularity(&beat_times);
    let danceability = (0.5 * (pulse + regularity)).clamp(0.0, 1.0);

    log::debug!(
        "rhythm: bpm={:.2}, confidence={:.3}, pulse={:.3}, regularity={:.3}, beats={}",
        tempo.bpm,
        tempo.confidence,
        pulse,
        regularity,
        beat_times.len()
    );

    Ok(RhythmDescriptors {
        bpm: tempo.bpm,
        beat_confidence: tempo.confidence,
        danceability,
    })
}

/// Half-wave-rectified log-magnitude spectral flux, one value per hop.
/// The first frame has no predecessor and scores zero.
fn onset_strength(samples: &[f32], sample_rate: u32, deadline: &Deadline) -> Result<Vec<f32>> {
    let mut transform = SpectralTransform::new(FFT_SIZE, sample_rate)?;
    let mut prev: Option<Vec<f32>> = None;
    let mut flux_values = Vec::with_capacity(Frames::count_for(samples.len(), FFT_SIZE, HOP_SIZE));

    for (i, frame) in Frames::new(samples, FFT_SIZE, HOP_SIZE)?.enumerate() {
        if i % 512 == 0 {
            deadline.check(DESCRIPTOR)?;
        }
        let log_mags: Vec<f32> = transform
            .process(frame)?
            .magnitudes()
            .iter()
            .map(|m| m.ln_1p())
            .collect();

        let flux = match &prev {
            Some(prev) => log_mags
                .iter()
                .zip(prev.iter())
                .map(|(cur, prev)| (cur - prev).max(0.0))
                .sum::<f32>(),
            None => 0.0,
        };
        flux_values.push(flux);
        prev = Some(log_mags);
    }

    Ok(flux_values)
}

/// Subtract a centred moving average and clip at zero.
fn detrend(flux: &[f32]) -> Vec<f32> {
    let n = flux.len();
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0f64);
    for &f in flux {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + f as f64);
    }
    (0..n)
        .map(|i| {
            let start = i.saturating_sub(DETREND_RADIUS);
            let end = (i + DETREND_RADIUS + 1).min(n);
            let local_mean = (prefix[end] - prefix[start]) / (end - start) as f64;
            (flux[i] - local_mean as f32).max(0.0)
        })
        .collect()
}

struct Tempo {
    bpm: f32,
    confidence: f32,
    /// Beat period in onset frames (fractional)
    lag: f32,
}

fn estimate_tempo(onset: &[f32], frame_rate: f32) -> Option<Tempo> {
    let n = onset.len();
    let min_lag = ((60.0 * frame_rate / MAX_BPM).floor() as usize).max(1);
    let max_lag = ((60.0 * frame_rate / MIN_BPM).ceil() as usize).min(n.saturating_sub(1));
    if min_lag + 2 > max_lag {
        return None;
    }

    let energy = autocorrelation(onset, 0);
    if energy <= 0.0 {
        return None;
    }

    // Score neighbours too, so the winner can be refined.
    let lags: Vec<usize> = (min_lag.saturating_sub(1).max(1)..=(max_lag + 1).min(n - 1)).collect();
    let scores: Vec<f32> = lags
        .iter()
        .map(|&lag| {
            let bpm = 60.0 * frame_rate / lag as f32;
            autocorrelation(onset, lag) / energy * tempo_prior(bpm)
        })
        .collect();

    let mut best = None::<usize>;
    for (i, &lag) in lags.iter().enumerate() {
        if lag < min_lag || lag > max_lag {
            continue;
        }
        if best.map_or(true, |b| scores[i] > scores[b]) {
            best = Some(i);
        }
    }
    let best = best?;

    let mut lag = lags[best] as f32;
    if best > 0 && best + 1 < scores.len() {
        let (a, b, c) = (scores[best - 1], scores[best], scores[best + 1]);
        let denom = a - 2.0 * b + c;
        if denom.abs() > f32::EPSILON {
            lag += (0.5 * (a - c) / denom).clamp(-0.5, 0.5);
        }
    }

    let confidence = (autocorrelation(onset, lags[best]) / energy).clamp(0.0, 1.0);
    Some(Tempo {
        bpm: 60.0 * frame_rate / lag,
        confidence,
        lag,
    })
}

/// Mean lagged product, normalised by overlap length.
fn autocorrelation(onset: &[f32], lag: usize) -> f32 {
    let n = onset.len();
    if lag >= n {
        return 0.0;
    }
    let sum: f64 = onset[..n - lag]
        .iter()
        .zip(&onset[lag..])
        .map(|(&a, &b)| a as f64 * b as f64)
        .sum();
    (sum / (n - lag) as f64) as f32
}

/// Log-normal weight centred on `PRIOR_BPM`.
fn tempo_prior(bpm: f32) -> f32 {
    let octaves = (bpm / PRIOR_BPM).log2() / PRIOR_OCTAVES;
    (-0.5 * octaves * octaves).exp()
}

/// Mean normalised autocorrelation at 1x, 2x and 4x the beat period.
fn pulse_clarity(onset: &[f32], lag: f32) -> f32 {
    let energy = autocorrelation(onset, 0);
    if energy <= 0.0 {
        return 0.0;
    }
    let values: Vec<f32> = [1.0f32, 2.0, 4.0]
        .iter()
        .map(|m| (m * lag).round() as usize)
        .filter(|&l| l > 0 && l < onset.len())
        .map(|l| (autocorrelation(onset, l) / energy).clamp(0.0, 1.0))
        .collect();
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

/// `1 - cv` of inter-onset intervals, 0 with fewer than three onsets.
fn onset_regularity(beat_times: &[f32]) -> f32 {
    if beat_times.len() < 3 {
        return 0.0;
    }
    let intervals: Vec<f32> = beat_times.windows(2).map(|w| w[1] - w[0]).collect();
    let n = intervals.len() as f32;
    let mean = intervals.iter().sum::<f32>() / n;
    if mean <= 0.0 {
        return 0.0;
    }
    let variance = intervals.iter().map(|i| (i - mean).powi(2)).sum::<f32>() / n;
    (1.0 - variance.sqrt() / mean).clamp(0.0, 1.0)
}

/// Onset times (seconds) from the detrended curve: local maxima above
/// mean + one standard deviation of the curve, never below `ONSET_FLOOR`,
/// at least 100ms apart.
fn pick_onsets(onset: &[f32], frame_rate: f32) -> Vec<f32> {
    if onset.is_empty() || frame_rate <= 0.0 {
        return Vec::new();
    }

    let n = onset.len() as f32;
    let mean = onset.iter().sum::<f32>() / n;
    let std = (onset.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n).sqrt();
    let threshold = (mean + std).max(ONSET_FLOOR);
    let min_gap = (0.1 * frame_rate).ceil() as usize;

    let mut onsets: Vec<usize> = Vec::new();
    for (i, &v) in onset.iter().enumerate() {
        if v <= threshold {
            continue;
        }
        let left = i == 0 || v >= onset[i - 1];
        let right = i + 1 == onset.len() || v >= onset[i + 1];
        let far_enough = onsets.last().map_or(true, |&last| i - last >= min_gap);
        if left && right && far_enough {
            onsets.push(i);
        }
    }

    onsets.into_iter().map(|i| i as f32 / frame_rate).collect()
}
