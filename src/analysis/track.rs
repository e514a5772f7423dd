//! Runs every descriptor extractor over one sample buffer.

use std::path::Path;
use std::time::Duration;

use crate::audio::buffer::SampleBuffer;
use crate::audio::decode::decode_audio;
use crate::error::{ComputationFault, LoadError, Result, TrackError};

use super::deadline::Deadline;
use super::dynamics;
use super::loudness::{self, LoudnessDescriptors};
use super::metrics::{PartialTrackMetrics, TrackMetrics};
use super::rhythm::{self, RhythmDescriptors};
use super::spectral::{self, SpectralShape};
use super::tonal::{self, TonalDescriptors};

#[derive(Clone, Copy, Debug)]
pub struct AnalysisOptions {
    /// Wall-clock budget per track; `None` for no limit
    pub deadline: Option<Duration>,
    /// Run extractors (and the two tracks of a comparison) on the rayon pool
    pub parallel: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            deadline: Some(Duration::from_secs(120)),
            parallel: true,
        }
    }
}

/// Independent outcome of each extractor for one track.
#[derive(Clone, Debug)]
pub struct TrackAnalysis {
    pub loudness: Result<LoudnessDescriptors>,
    pub dynamic_complexity: Result<f32>,
    pub rhythm: Result<RhythmDescriptors>,
    pub tonal: Result<TonalDescriptors>,
    pub spectral: Result<SpectralShape>,
}

impl TrackAnalysis {
    /// All-or-nothing: the first fault, in descriptor order, fails the track.
    pub fn into_metrics(self) -> Result<TrackMetrics> {
        let loudness = self.loudness?;
        let dynamic_complexity = self.dynamic_complexity?;
        let rhythm = self.rhythm?;
        let tonal = self.tonal?;
        let spectral = self.spectral?;

        Ok(TrackMetrics {
            integrated_lufs: loudness.integrated_lufs,
            loudness_range: loudness.loudness_range,
            true_peak: loudness.true_peak,
            dynamic_complexity,
            bpm: rhythm.bpm,
            beat_confidence: rhythm.beat_confidence,
            danceability: rhythm.danceability,
            key: tonal.key,
            scale: tonal.scale,
            tuning_frequency: tonal.tuning_frequency,
            spectral_centroid: spectral.centroid,
            spectral_rolloff: spectral.rolloff,
            spectral_flux: spectral.flux,
        })
    }

    /// Keeps whatever succeeded and records the rest in `faults`.
    pub fn into_partial(self) -> PartialTrackMetrics {
        let mut out = PartialTrackMetrics::default();

        match self.loudness {
            Ok(l) => {
                out.integrated_lufs = Some(l.integrated_lufs);
                out.loudness_range = Some(l.loudness_range);
                out.true_peak = Some(l.true_peak);
            }
            Err(e) => {
                out.faults.insert("loudness".into(), e.to_string());
            }
        }
        match self.dynamic_complexity {
            Ok(d) => out.dynamic_complexity = Some(d),
            Err(e) => {
                out.faults.insert("dynamic_complexity".into(), e.to_string());
            }
        }
        match self.rhythm {
            Ok(r) => {
                out.bpm = Some(r.bpm);
                out.beat_confidence = Some(r.beat_confidence);
                out.danceability = Some(r.danceability);
            }
            Err(e) => {
                out.faults.insert("rhythm".into(), e.to_string());
            }
        }
        match self.tonal {
            Ok(t) => {
                out.key = Some(t.key);
                out.scale = Some(t.scale);
                out.tuning_frequency = Some(t.tuning_frequency);
            }
            Err(e) => {
                out.faults.insert("tonal".into(), e.to_string());
            }
        }
        match self.spectral {
            Ok(s) => {
                out.spectral_centroid = Some(s.centroid);
                out.spectral_rolloff = Some(s.rolloff);
                out.spectral_flux = Some(s.flux);
            }
            Err(e) => {
                out.faults.insert("spectral".into(), e.to_string());
            }
        }

        out
    }
}

/// Run all five extractors. Never fails as a whole; see [`TrackAnalysis`].
pub fn analyze_buffer(buffer: &SampleBuffer, options: &AnalysisOptions) -> TrackAnalysis {
    let deadline = Deadline::new(options.deadline);
    let d = &deadline;

    log::info!(
        "Analyzing {:.1}s @ {}Hz, {} channel(s)",
        buffer.duration_secs(),
        buffer.sample_rate(),
        buffer.channel_count()
    );

    let run_loudness = || {
        loudness::extract(buffer, d).and_then(|l| {
            finite("loudness", &[l.integrated_lufs, l.loudness_range, l.true_peak])?;
            Ok(l)
        })
    };
    let run_dynamics = || {
        dynamics::extract(buffer, d).and_then(|c| {
            finite("dynamic_complexity", &[c])?;
            Ok(c)
        })
    };
    let run_rhythm = || {
        rhythm::extract(buffer, d).and_then(|r| {
            finite("rhythm", &[r.bpm, r.beat_confidence, r.danceability])?;
            Ok(r)
        })
    };
    let run_tonal = || {
        tonal::extract(buffer, d).and_then(|t| {
            finite("tonal", &[t.tuning_frequency])?;
            Ok(t)
        })
    };
    let run_spectral = || {
        spectral::extract(buffer, d).and_then(|s| {
            finite("spectral", &[s.centroid, s.rolloff, s.flux])?;
            Ok(s)
        })
    };

    let analysis = if options.parallel {
        let ((loudness, dynamic_complexity), (rhythm, (tonal, spectral))) = rayon::join(
            || rayon::join(run_loudness, run_dynamics),
            || rayon::join(run_rhythm, || rayon::join(run_tonal, run_spectral)),
        );
        TrackAnalysis {
            loudness,
            dynamic_complexity,
            rhythm,
            tonal,
            spectral,
        }
    } else {
        TrackAnalysis {
            loudness: run_loudness(),
            dynamic_complexity: run_dynamics(),
            rhythm: run_rhythm(),
            tonal: run_tonal(),
            spectral: run_spectral(),
        }
    };

    log::info!("Track analysis finished in {:.2}s", deadline.elapsed().as_secs_f64());
    analysis
}

/// All-or-nothing analysis of an in-memory buffer.
pub fn analyze(buffer: &SampleBuffer, options: &AnalysisOptions) -> Result<TrackMetrics> {
    analyze_buffer(buffer, options).into_metrics().map_err(|fault| {
        log::warn!("Track analysis aborted: {}", fault);
        fault
    })
}

/// Decode `path` and analyse it, all-or-nothing.
pub fn analyze_file(
    path: &Path,
    options: &AnalysisOptions,
) -> std::result::Result<TrackMetrics, TrackError> {
    let buffer = decode_audio(path).map_err(|e| {
        log::warn!("{}", e);
        e
    })?;
    Ok(analyze(&buffer, options)?)
}

/// Decode `path` and analyse it, keeping descriptors that succeeded.
/// A decode failure still fails the whole track.
pub fn analyze_file_partial(
    path: &Path,
    options: &AnalysisOptions,
) -> std::result::Result<PartialTrackMetrics, LoadError> {
    let buffer = decode_audio(path).map_err(|e| {
        log::warn!("{}", e);
        e
    })?;
    let partial = analyze_buffer(&buffer, options).into_partial();
    for (descriptor, fault) in &partial.faults {
        log::warn!("{} failed: {}", descriptor, fault);
    }
    Ok(partial)
}

fn finite(descriptor: &'static str, values: &[f32]) -> Result<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(ComputationFault::DegenerateResult {
            descriptor,
            reason: "non-finite value".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tonal::{PitchClass, Scale};

    fn sine(freq: f32, amp: f32, secs: f32, sr: u32) -> Vec<f32> {
        (0..(secs * sr as f32) as usize)
            .map(|i| amp * (2.0 * std::f32::consts::PI * freq * i as f32 / sr as f32).sin())
            .collect()
    }

    fn sequential() -> AnalysisOptions {
        AnalysisOptions {
            deadline: None,
            parallel: false,
        }
    }

    #[test]
    fn a440_sine_scenario() {
        let buf = SampleBuffer::mono(sine(440.0, 0.5, 10.0, 44100), 44100).unwrap();
        let m = analyze(&buf, &AnalysisOptions::default()).unwrap();
        assert!((m.true_peak - 20.0 * 0.5f32.log10()).abs() < 0.05, "peak {}", m.true_peak);
        assert!((m.tuning_frequency - 440.0).abs() < 2.0, "tuning {}", m.tuning_frequency);
        assert!(m.integrated_lufs >= -70.0 && m.integrated_lufs <= 0.0);
        assert_eq!(m.key, PitchClass::A);
    }

    #[test]
    fn silence_scenario() {
        let buf = SampleBuffer::mono(vec![0.0; 44100 * 5], 44100).unwrap();
        let m = analyze(&buf, &sequential()).unwrap();
        assert_eq!(m.true_peak, -100.0);
        assert_eq!(m.tuning_frequency, 440.0);
        assert_eq!(m.spectral_centroid, 0.0);
        assert_eq!(m.spectral_rolloff, 0.0);
        assert_eq!(m.spectral_flux, 0.0);
        assert!(m.dynamic_complexity.abs() < 1e-6);
        assert_eq!((m.key, m.scale), (PitchClass::C, Scale::Major));
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let mut samples = sine(330.0, 0.4, 3.0, 22050);
        samples.extend(sine(660.0, 0.1, 3.0, 22050));
        let buf = SampleBuffer::mono(samples, 22050).unwrap();
        let parallel = AnalysisOptions {
            deadline: None,
            parallel: true,
        };
        let a = analyze(&buf, &parallel).unwrap();
        let b = analyze(&buf, &sequential()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, analyze(&buf, &sequential()).unwrap());
    }

    #[test]
    fn empty_buffer_yields_no_metrics() {
        let buf = SampleBuffer::mono(Vec::new(), 44100).unwrap();
        assert_eq!(analyze(&buf, &sequential()), Err(ComputationFault::EmptyBuffer));
    }

    #[test]
    fn partial_keeps_successful_descriptors() {
        let analysis = TrackAnalysis {
            loudness: Ok(LoudnessDescriptors {
                integrated_lufs: -12.0,
                loudness_range: 4.0,
                true_peak: -0.5,
            }),
            dynamic_complexity: Ok(2.0),
            rhythm: Err(ComputationFault::DeadlineExceeded {
                descriptor: "rhythm",
                elapsed: Duration::from_secs(3),
            }),
            tonal: Ok(TonalDescriptors {
                key: PitchClass::D,
                scale: Scale::Minor,
                key_strength: 0.7,
                tuning_frequency: 441.0,
            }),
            spectral: Ok(SpectralShape::default()),
        };

        let all_or_nothing = analysis.clone().into_metrics();
        assert!(matches!(
            all_or_nothing,
            Err(ComputationFault::DeadlineExceeded { .. })
        ));

        let partial = analysis.into_partial();
        assert_eq!(partial.integrated_lufs, Some(-12.0));
        assert_eq!(partial.bpm, None);
        assert_eq!(partial.key, Some(PitchClass::D));
        assert_eq!(partial.faults.len(), 1);
        assert!(partial.faults["rhythm"].contains("deadline"));
    }

    #[test]
    fn expired_deadline_faults_the_track() {
        let buf = SampleBuffer::mono(sine(440.0, 0.5, 2.0, 44100), 44100).unwrap();
        let options = AnalysisOptions {
            deadline: Some(Duration::ZERO),
            parallel: false,
        };
        assert!(matches!(
            analyze(&buf, &options),
            Err(ComputationFault::DeadlineExceeded { .. })
        ));
    }
}
