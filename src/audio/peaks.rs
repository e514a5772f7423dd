use crate::error::{ComputationFault, Result};

use super::spectrum::Spectrum;

/// Floor used when taking the log of a zero magnitude during interpolation.
const MIN_MAGNITUDE: f32 = 1e-20;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Peak {
    /// Interpolated frequency in Hz
    pub frequency: f32,
    /// Interpolated linear magnitude
    pub magnitude: f32,
}

/// Peaks ordered by descending magnitude.
pub type PeakSet = Vec<Peak>;

#[derive(Clone, Copy, Debug)]
pub struct PeakParams {
    pub min_frequency: f32,
    pub max_frequency: f32,
    pub magnitude_threshold: f32,
    pub max_peaks: usize,
}

impl PeakParams {
    fn validate(&self) -> Result<()> {
        if !(self.min_frequency >= 0.0 && self.max_frequency > self.min_frequency) {
            return Err(ComputationFault::InvalidParameter(format!(
                "peak frequency range [{}, {}] is empty",
                self.min_frequency, self.max_frequency
            )));
        }
        Ok(())
    }
}

/// Local maxima of `spectrum` inside `[min_frequency, max_frequency]` whose bin
/// magnitude exceeds `magnitude_threshold`, strongest first, at most `max_peaks`.
///
/// Positions are refined with a parabola through the dB magnitudes of the peak
/// bin and its two neighbours. Edge bins are never reported.
pub fn pick_peaks(spectrum: &Spectrum, params: &PeakParams) -> Result<PeakSet> {
    params.validate()?;

    let mags = spectrum.magnitudes();
    let mut peaks: PeakSet = Vec::new();
    if mags.len() < 3 || params.max_peaks == 0 {
        return Ok(peaks);
    }

    let bin_width = spectrum.bin_width();
    // Only bins whose neighbourhood can reach the range need checking.
    let first = ((params.min_frequency / bin_width).floor() as usize).max(1);
    let last = ((params.max_frequency / bin_width).ceil() as usize).min(mags.len() - 2);

    for k in first..=last {
        let (left, centre, right) = (mags[k - 1], mags[k], mags[k + 1]);
        if !(centre > params.magnitude_threshold && centre > left && centre >= right) {
            continue;
        }

        let (offset, magnitude) = interpolate(left, centre, right);
        let frequency = (k as f32 + offset) * bin_width;
        if frequency < params.min_frequency || frequency > params.max_frequency {
            continue;
        }
        peaks.push(Peak {
            frequency,
            magnitude,
        });
    }

    // Stable: equal magnitudes keep ascending frequency order.
    peaks.sort_by(|a, b| b.magnitude.total_cmp(&a.magnitude));
    peaks.truncate(params.max_peaks);
    Ok(peaks)
}

/// Returns (bin offset in [-0.5, 0.5], linear magnitude at the vertex).
fn interpolate(left: f32, centre: f32, right: f32) -> (f32, f32) {
    let a = to_db(left);
    let b = to_db(centre);
    let c = to_db(right);
    let denom = a - 2.0 * b + c;
    if denom.abs() < f32::EPSILON {
        return (0.0, centre);
    }
    let offset = (0.5 * (a - c) / denom).clamp(-0.5, 0.5);
    let peak_db = b - 0.25 * (a - c) * offset;
    (offset, 10f32.powf(peak_db / 20.0))
}

fn to_db(magnitude: f32) -> f32 {
    20.0 * magnitude.max(MIN_MAGNITUDE).log10()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::spectrum::SpectralTransform;

    fn params() -> PeakParams {
        PeakParams {
            min_frequency: 20.0,
            max_frequency: 5000.0,
            magnitude_threshold: 1e-5,
            max_peaks: 100,
        }
    }

    fn sine_spectrum(freqs: &[(f32, f32)], n: usize, sr: u32) -> Spectrum {
        let frame: Vec<f32> = (0..n)
            .map(|i| {
                let t = i as f32 / sr as f32;
                freqs
                    .iter()
                    .map(|&(f, a)| a * (2.0 * std::f32::consts::PI * f * t).sin())
                    .sum()
            })
            .collect();
        SpectralTransform::new(n, sr).unwrap().process(&frame).unwrap()
    }

    #[test]
    fn interpolates_off_bin_sine() {
        let spec = sine_spectrum(&[(440.0, 0.5)], 4096, 44100);
        let peaks = pick_peaks(&spec, &params()).unwrap();
        assert!(!peaks.is_empty());
        assert!(
            (peaks[0].frequency - 440.0).abs() < 1.0,
            "got {}",
            peaks[0].frequency
        );
    }

    #[test]
    fn orders_by_descending_magnitude_and_truncates() {
        let spec = sine_spectrum(&[(300.0, 0.2), (1000.0, 0.8), (2500.0, 0.5)], 4096, 44100);
        let peaks = pick_peaks(&spec, &params()).unwrap();
        assert!(peaks.windows(2).all(|w| w[0].magnitude >= w[1].magnitude));
        assert!((peaks[0].frequency - 1000.0).abs() < 2.0);

        let limited = pick_peaks(&spec, &PeakParams { max_peaks: 2, ..params() }).unwrap();
        assert_eq!(limited.len(), 2);
        assert!((limited[1].frequency - 2500.0).abs() < 2.0);
    }

    #[test]
    fn respects_frequency_range() {
        let spec = sine_spectrum(&[(100.0, 0.5), (6000.0, 0.5)], 4096, 44100);
        let peaks = pick_peaks(&spec, &params()).unwrap();
        assert!(peaks.iter().all(|p| p.frequency >= 20.0 && p.frequency <= 5000.0));
        assert!(peaks.iter().all(|p| (p.frequency - 6000.0).abs() > 50.0));
    }

    #[test]
    fn silence_has_no_peaks() {
        let spec = sine_spectrum(&[], 4096, 44100);
        assert!(pick_peaks(&spec, &params()).unwrap().is_empty());
    }

    #[test]
    fn empty_range_is_rejected() {
        let spec = sine_spectrum(&[], 256, 44100);
        let bad = PeakParams {
            min_frequency: 500.0,
            max_frequency: 100.0,
            ..params()
        };
        assert!(pick_peaks(&spec, &bad).is_err());
    }
}
