//! Key/scale detection and tuning-frequency estimation from spectral peaks.

use serde::{Deserialize, Serialize};

use crate::audio::buffer::SampleBuffer;
use crate::audio::frames::Frames;
use crate::audio::peaks::{pick_peaks, Peak, PeakParams};
use crate::audio::spectrum::SpectralTransform;
use crate::error::Result;

use super::deadline::Deadline;

const DESCRIPTOR: &str = "tonal";

const FRAME_SIZE: usize = 4096;
const HOP_SIZE: usize = 2048;

/// Reference pitch of the semitone grid, and the fallback estimate.
pub const REFERENCE_TUNING_HZ: f32 = 440.0;
/// Length of the centred segment the tuning estimate looks at.
pub const TUNING_SEGMENT_LEN: usize = FRAME_SIZE * 4;

const TUNING_PEAKS: PeakParams = PeakParams {
    min_frequency: 20.0,
    max_frequency: 5000.0,
    magnitude_threshold: 1e-5,
    max_peaks: 100,
};

const KEY_PEAKS: PeakParams = PeakParams {
    min_frequency: 25.0,
    max_frequency: 3500.0,
    magnitude_threshold: 1e-5,
    max_peaks: 60,
};

// Krumhansl-Kessler probe-tone profiles, tonic first.
const MAJOR_PROFILE: [f32; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];
const MINOR_PROFILE: [f32; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

/// Pitch classes in canonical order, C first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    #[serde(rename = "C#")]
    CSharp,
    D,
    #[serde(rename = "Eb")]
    EFlat,
    E,
    F,
    #[serde(rename = "F#")]
    FSharp,
    G,
    #[serde(rename = "Ab")]
    AFlat,
    A,
    #[serde(rename = "Bb")]
    BFlat,
    B,
}

impl PitchClass {
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::EFlat,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::AFlat,
        PitchClass::A,
        PitchClass::BFlat,
        PitchClass::B,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::CSharp => "C#",
            PitchClass::D => "D",
            PitchClass::EFlat => "Eb",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::FSharp => "F#",
            PitchClass::G => "G",
            PitchClass::AFlat => "Ab",
            PitchClass::A => "A",
            PitchClass::BFlat => "Bb",
            PitchClass::B => "B",
        }
    }

    /// Nearest pitch class on a 12-TET grid anchored at `reference_hz` for A.
    pub fn from_frequency(frequency: f32, reference_hz: f32) -> PitchClass {
        let semitones_from_a = (12.0 * (frequency / reference_hz).log2()).round() as i32;
        let idx = (semitones_from_a + PitchClass::A.index() as i32).rem_euclid(12);
        PitchClass::ALL[idx as usize]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    Major,
    Minor,
}

impl Scale {
    pub fn as_str(self) -> &'static str {
        match self {
            Scale::Major => "major",
            Scale::Minor => "minor",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KeyEstimate {
    pub key: PitchClass,
    pub scale: Scale,
    /// Pearson correlation of the winning template
    pub strength: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TonalDescriptors {
    pub key: PitchClass,
    pub scale: Scale,
    pub key_strength: f32,
    pub tuning_frequency: f32,
}

pub fn extract(buffer: &SampleBuffer, deadline: &Deadline) -> Result<TonalDescriptors> {
    buffer.require_signal()?;

    let mono = buffer.mono_mix();
    let sr = buffer.sample_rate();

    let key = detect_key(&mono, sr, deadline)?;
    let tuning_frequency = estimate_tuning(&mono, sr, deadline)?;

    log::debug!(
        "tonal: key={} {} (r={:.3}), tuning={:.2}Hz",
        key.key.name(),
        key.scale.as_str(),
        key.strength,
        tuning_frequency
    );

    Ok(TonalDescriptors {
        key: key.key,
        scale: key.scale,
        key_strength: key.strength,
        tuning_frequency,
    })
}

/// Correlate a peak-based pitch-class histogram against major and minor
/// templates in every rotation.
pub fn detect_key(samples: &[f32], sample_rate: u32, deadline: &Deadline) -> Result<KeyEstimate> {
    let mut chroma = [0.0f32; 12];
    let mut transform = SpectralTransform::new(FRAME_SIZE, sample_rate)?;

    for (i, frame) in Frames::new(samples, FRAME_SIZE, HOP_SIZE)?.enumerate() {
        if i % 64 == 0 {
            deadline.check(DESCRIPTOR)?;
        }
        let spectrum = transform.process(frame)?;
        for peak in pick_peaks(&spectrum, &KEY_PEAKS)? {
            let pc = PitchClass::from_frequency(peak.frequency, REFERENCE_TUNING_HZ);
            chroma[pc.index()] += peak.magnitude * peak.magnitude;
        }
    }

    Ok(best_key(&chroma))
}

/// Visits C major, C minor, C# major, ... and keeps the first strictly best.
fn best_key(chroma: &[f32; 12]) -> KeyEstimate {
    let mut best = KeyEstimate {
        key: PitchClass::C,
        scale: Scale::Major,
        strength: f32::NEG_INFINITY,
    };
    for tonic in PitchClass::ALL {
        for (scale, profile) in [(Scale::Major, &MAJOR_PROFILE), (Scale::Minor, &MINOR_PROFILE)] {
            let r = rotated_correlation(chroma, profile, tonic.index());
            if r > best.strength {
                best = KeyEstimate {
                    key: tonic,
                    scale,
                    strength: r,
                };
            }
        }
    }
    best
}

/// Pearson correlation of `chroma` with `profile` rotated to start at `tonic`.
/// Zero when either side has no variance.
fn rotated_correlation(chroma: &[f32; 12], profile: &[f32; 12], tonic: usize) -> f32 {
    let chroma_mean = chroma.iter().sum::<f32>() / 12.0;
    let profile_mean = profile.iter().sum::<f32>() / 12.0;

    let mut cov = 0.0f32;
    let mut chroma_var = 0.0f32;
    let mut profile_var = 0.0f32;
    for (degree, &p) in profile.iter().enumerate() {
        let c = chroma[(tonic + degree) % 12] - chroma_mean;
        let p = p - profile_mean;
        cov += c * p;
        chroma_var += c * c;
        profile_var += p * p;
    }

    let denom = (chroma_var * profile_var).sqrt();
    if denom <= f32::EPSILON {
        0.0
    } else {
        cov / denom
    }
}

/// Average per-frame tuning estimate over the centred representative segment.
///
/// Falls back to exactly 440 Hz when no frame of the segment has a peak
/// (silence, or a segment shorter than one frame).
pub fn estimate_tuning(samples: &[f32], sample_rate: u32, deadline: &Deadline) -> Result<f32> {
    let segment = representative_segment(samples);
    let mut transform = SpectralTransform::new(FRAME_SIZE, sample_rate)?;

    let mut estimates = Vec::new();
    for frame in Frames::new(segment, FRAME_SIZE, HOP_SIZE)? {
        deadline.check(DESCRIPTOR)?;
        let spectrum = transform.process(frame)?;
        let peaks = pick_peaks(&spectrum, &TUNING_PEAKS)?;
        if let Some(hz) = frame_tuning(&peaks) {
            estimates.push(hz);
        }
    }

    if estimates.is_empty() {
        return Ok(REFERENCE_TUNING_HZ);
    }
    Ok(estimates.iter().sum::<f32>() / estimates.len() as f32)
}

/// The centred `TUNING_SEGMENT_LEN` samples, or everything if shorter.
fn representative_segment(samples: &[f32]) -> &[f32] {
    if samples.len() > TUNING_SEGMENT_LEN {
        let start = (samples.len() - TUNING_SEGMENT_LEN) / 2;
        &samples[start..start + TUNING_SEGMENT_LEN]
    } else {
        samples
    }
}

const CENT_BINS: usize = 100;

/// Magnitude-weighted histogram of each peak's offset (in cents) from the
/// nearest semitone; the strongest one-cent bin is refined with its
/// neighbours and converted back to a reference frequency.
fn frame_tuning(peaks: &[Peak]) -> Option<f32> {
    if peaks.is_empty() {
        return None;
    }

    let mut weight = [0.0f64; CENT_BINS];
    let mut weighted_dev = [0.0f64; CENT_BINS];
    for peak in peaks {
        if peak.frequency <= 0.0 || peak.magnitude <= 0.0 {
            continue;
        }
        let cents = 1200.0 * (peak.frequency as f64 / REFERENCE_TUNING_HZ as f64).log2();
        let dev = cents - 100.0 * (cents / 100.0).round();
        let bin = ((dev + 50.0).floor() as usize).min(CENT_BINS - 1);
        weight[bin] += peak.magnitude as f64;
        weighted_dev[bin] += dev * peak.magnitude as f64;
    }

    let mut winner = 0;
    for (i, &w) in weight.iter().enumerate() {
        if w > weight[winner] {
            winner = i;
        }
    }
    if weight[winner] <= 0.0 {
        return None;
    }

    // Neighbours wrap around +-50 cents; shift them onto the winner's side.
    let mut total_weight = 0.0;
    let mut total_dev = 0.0;
    for offset in [-1i32, 0, 1] {
        let raw = winner as i32 + offset;
        let bin = raw.rem_euclid(CENT_BINS as i32) as usize;
        let shift = if raw < 0 {
            -100.0
        } else if raw >= CENT_BINS as i32 {
            100.0
        } else {
            0.0
        };
        total_weight += weight[bin];
        total_dev += weighted_dev[bin] + shift * weight[bin];
    }

    let cents = total_dev / total_weight;
    Some((REFERENCE_TUNING_HZ as f64 * 2f64.powf(cents / 1200.0)) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn chord(freqs: &[f32], secs: f32, sr: u32) -> Vec<f32> {
        (0..(secs * sr as f32) as usize)
            .map(|i| {
                let t = i as f32 / sr as f32;
                freqs.iter().map(|f| 0.25 * (2.0 * PI * f * t).sin()).sum()
            })
            .collect()
    }

    #[test]
    fn pitch_class_from_frequency() {
        assert_eq!(PitchClass::from_frequency(440.0, 440.0), PitchClass::A);
        assert_eq!(PitchClass::from_frequency(261.63, 440.0), PitchClass::C);
        assert_eq!(PitchClass::from_frequency(466.16, 440.0), PitchClass::BFlat);
        assert_eq!(PitchClass::from_frequency(55.0, 440.0), PitchClass::A);
    }

    #[test]
    fn c_major_triad() {
        let samples = chord(&[261.63, 329.63, 392.0], 3.0, 44100);
        let key = detect_key(&samples, 44100, &Deadline::unbounded()).unwrap();
        assert_eq!((key.key, key.scale), (PitchClass::C, Scale::Major));
    }

    #[test]
    fn a_minor_triad() {
        let samples = chord(&[220.0, 261.63, 329.63], 3.0, 44100);
        let key = detect_key(&samples, 44100, &Deadline::unbounded()).unwrap();
        assert_eq!((key.key, key.scale), (PitchClass::A, Scale::Minor));
    }

    #[test]
    fn flat_chroma_resolves_to_c_major() {
        let key = best_key(&[0.0; 12]);
        assert_eq!((key.key, key.scale), (PitchClass::C, Scale::Major));
        assert_eq!(key.strength, 0.0);
    }

    #[test]
    fn tuning_of_a440_sine() {
        let samples = chord(&[440.0], 10.0, 44100);
        let hz = estimate_tuning(&samples, 44100, &Deadline::unbounded()).unwrap();
        assert!((hz - 440.0).abs() < 2.0, "got {hz}");
    }

    #[test]
    fn tuning_follows_a_detuned_reference() {
        // A4 at 445 Hz is about +19.6 cents sharp.
        let samples = chord(&[445.0], 5.0, 44100);
        let hz = estimate_tuning(&samples, 44100, &Deadline::unbounded()).unwrap();
        assert!((hz - 445.0).abs() < 2.0, "got {hz}");
    }

    #[test]
    fn tuning_defaults_for_silence_and_short_input() {
        let silence = vec![0.0f32; TUNING_SEGMENT_LEN * 2];
        let hz = estimate_tuning(&silence, 44100, &Deadline::unbounded()).unwrap();
        assert_eq!(hz, 440.0);

        let short = chord(&[440.0], 0.05, 44100);
        assert!(short.len() < FRAME_SIZE);
        let hz = estimate_tuning(&short, 44100, &Deadline::unbounded()).unwrap();
        assert_eq!(hz, 440.0);
    }

    #[test]
    fn segment_is_centred() {
        let samples: Vec<f32> = (0..TUNING_SEGMENT_LEN + 100).map(|i| i as f32).collect();
        let seg = representative_segment(&samples);
        assert_eq!(seg.len(), TUNING_SEGMENT_LEN);
        assert_eq!(seg[0], 50.0);
    }

    #[test]
    fn wrapped_neighbour_stays_near_the_edge() {
        // Two peaks straddling the +-50 cent seam.
        let sharp = REFERENCE_TUNING_HZ * 2f32.powf(49.6 / 1200.0);
        let flat = REFERENCE_TUNING_HZ * 2f32.powf(-49.8 / 1200.0) * 2.0;
        let hz = frame_tuning(&[
            Peak {
                frequency: sharp,
                magnitude: 1.0,
            },
            Peak {
                frequency: flat,
                magnitude: 0.5,
            },
        ])
        .unwrap();
        let cents = 1200.0 * (hz / REFERENCE_TUNING_HZ).log2();
        assert!(cents > 49.0 && cents < 51.0, "got {cents}");
    }
}
