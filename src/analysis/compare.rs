//! Analyses a mix and a reference track and pairs the results.

use std::path::Path;

use crate::error::{CompareError, TrackError, TrackRole};

use super::metrics::{ComparisonResult, PartialComparison};
use super::track::{analyze_file, analyze_file_partial, AnalysisOptions};

/// Both tracks must succeed; otherwise the error names the track that failed
/// (the mix, if both did).
pub fn compare_files(
    mix: &Path,
    reference: &Path,
    options: &AnalysisOptions,
) -> Result<ComparisonResult, CompareError> {
    let (mix, reference) = run_pair(
        options.parallel,
        || analyze_file(mix, options),
        || analyze_file(reference, options),
    );
    Ok(ComparisonResult {
        mix: mix.map_err(|e| CompareError::new(TrackRole::Mix, e))?,
        reference: reference.map_err(|e| CompareError::new(TrackRole::Reference, e))?,
    })
}

/// Like [`compare_files`], but descriptor faults are reported per field.
/// Only a decode failure fails the comparison.
pub fn compare_files_partial(
    mix: &Path,
    reference: &Path,
    options: &AnalysisOptions,
) -> Result<PartialComparison, CompareError> {
    let (mix, reference) = run_pair(
        options.parallel,
        || analyze_file_partial(mix, options),
        || analyze_file_partial(reference, options),
    );
    Ok(PartialComparison {
        mix: mix.map_err(|e| CompareError::new(TrackRole::Mix, TrackError::Load(e)))?,
        reference: reference
            .map_err(|e| CompareError::new(TrackRole::Reference, TrackError::Load(e)))?,
    })
}

fn run_pair<A, B, RA, RB>(parallel: bool, mix: A, reference: B) -> (RA, RB)
where
    A: FnOnce() -> RA + Send,
    B: FnOnce() -> RB + Send,
    RA: Send,
    RB: Send,
{
    if parallel {
        rayon::join(mix, reference)
    } else {
        let mix = mix();
        (mix, reference())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadError;
    use std::path::PathBuf;

    fn options() -> AnalysisOptions {
        AnalysisOptions {
            deadline: None,
            parallel: false,
        }
    }

    #[test]
    fn missing_reference_names_the_reference() {
        let dir = tempfile::tempdir().unwrap();
        let mix = dir.path().join("mix.wav");
        write_tone(&mix);
        let reference = PathBuf::from("/nope/reference.wav");

        let err = compare_files(&mix, &reference, &options()).unwrap_err();
        assert_eq!(err.role, TrackRole::Reference);
        assert!(matches!(err.source, TrackError::Load(LoadError::NotFound(_))));
    }

    #[test]
    fn mix_is_reported_when_both_fail() {
        let err = compare_files(
            Path::new("/nope/mix.wav"),
            Path::new("/nope/reference.wav"),
            &AnalysisOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.role, TrackRole::Mix);
    }

    #[test]
    fn partial_mode_still_fails_on_load_errors() {
        let err = compare_files_partial(
            Path::new("/nope/mix.wav"),
            Path::new("/nope/reference.wav"),
            &options(),
        )
        .unwrap_err();
        assert_eq!(err.role, TrackRole::Mix);
    }

    fn write_tone(path: &Path) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..22050 {
            let s = 0.3 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 22050.0).sin();
            writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
}
