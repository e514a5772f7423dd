//! Frame-averaged spectral centroid, rolloff and flux.

use crate::audio::buffer::SampleBuffer;
use crate::audio::frames::Frames;
use crate::audio::spectrum::{SpectralTransform, Spectrum};
use crate::error::Result;

use super::deadline::Deadline;

const DESCRIPTOR: &str = "spectral";

const FRAME_SIZE: usize = 4096;
const HOP_SIZE: usize = 2048;
const ROLLOFF_FRACTION: f32 = 0.85;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SpectralShape {
    /// Hz
    pub centroid: f32,
    /// Hz
    pub rolloff: f32,
    pub flux: f32,
}

/// Means of the per-frame series; all zero when the track is shorter than one frame.
pub fn extract(buffer: &SampleBuffer, deadline: &Deadline) -> Result<SpectralShape> {
    buffer.require_signal()?;

    let mono = buffer.mono_mix();
    let mut transform = SpectralTransform::new(FRAME_SIZE, buffer.sample_rate())?;

    let mut centroid_sum = 0.0f64;
    let mut rolloff_sum = 0.0f64;
    let mut flux_sum = 0.0f64;
    let mut count = 0usize;
    let mut prev: Option<Vec<f32>> = None;

    for frame in Frames::new(&mono, FRAME_SIZE, HOP_SIZE)? {
        if count % 128 == 0 {
            deadline.check(DESCRIPTOR)?;
        }
        let spectrum = transform.process(frame)?;

        centroid_sum += centroid(&spectrum) as f64;
        rolloff_sum += rolloff(&spectrum, ROLLOFF_FRACTION) as f64;
        if let Some(prev) = &prev {
            flux_sum += flux(prev, spectrum.magnitudes()) as f64;
        }
        count += 1;
        prev = Some(spectrum.into_magnitudes());
    }

    if count == 0 {
        log::debug!("spectral: track shorter than one frame, reporting zeros");
        return Ok(SpectralShape::default());
    }

    let n = count as f64;
    let shape = SpectralShape {
        centroid: (centroid_sum / n) as f32,
        rolloff: (rolloff_sum / n) as f32,
        flux: (flux_sum / n) as f32,
    };
    log::debug!(
        "spectral: centroid={:.1}Hz, rolloff={:.1}Hz, flux={:.3} over {} frames",
        shape.centroid,
        shape.rolloff,
        shape.flux,
        count
    );
    Ok(shape)
}

/// Magnitude-weighted mean bin, scaled so the last bin maps to Nyquist.
pub fn centroid(spectrum: &Spectrum) -> f32 {
    let mags = spectrum.magnitudes();
    let total: f64 = mags.iter().map(|&m| m as f64).sum();
    if total <= 1e-10 || mags.len() < 2 {
        return 0.0;
    }
    let weighted: f64 = mags
        .iter()
        .enumerate()
        .map(|(i, &m)| i as f64 * m as f64)
        .sum();
    let bin_hz = spectrum.nyquist() as f64 / (mags.len() - 1) as f64;
    (weighted / total * bin_hz) as f32
}

/// Frequency below which `fraction` of the spectral energy lies.
pub fn rolloff(spectrum: &Spectrum, fraction: f32) -> f32 {
    let mags = spectrum.magnitudes();
    let total: f64 = mags.iter().map(|&m| m as f64 * m as f64).sum();
    if total <= 1e-20 || mags.len() < 2 {
        return 0.0;
    }
    let cutoff = total * fraction as f64;
    let mut acc = 0.0f64;
    let mut bin = mags.len() - 1;
    for (i, &m) in mags.iter().enumerate() {
        acc += m as f64 * m as f64;
        if acc >= cutoff {
            bin = i;
            break;
        }
    }
    bin as f32 * spectrum.nyquist() / (mags.len() - 1) as f32
}

/// Sum of positive magnitude differences from the previous frame.
pub fn flux(prev: &[f32], current: &[f32]) -> f32 {
    current
        .iter()
        .zip(prev.iter())
        .map(|(cur, prev)| (cur - prev).max(0.0))
        .sum()
}
