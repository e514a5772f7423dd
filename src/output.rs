//! JSON documents printed on stdout.
//!
//! Success is the serialized result itself; any failure is an object with a
//! single `error` key. The two shapes never mix.

use serde::Serialize;
use std::io::{self, Write};

#[derive(Debug, Serialize)]
struct ErrorReport<'a> {
    error: &'a str,
}

/// `{"error": "<message>"}`
pub fn render_error(message: &str) -> String {
    serde_json::to_string(&ErrorReport { error: message })
        .unwrap_or_else(|_| r#"{"error":"unrenderable error message"}"#.to_string())
}

/// Serialize a result document, or an error document if that fails.
pub fn render<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        log::warn!("Failed to serialize result: {}", e);
        render_error(&format!("failed to serialize result: {e}"))
    })
}

/// Write one document plus a newline to stdout.
pub fn emit(document: &str) -> io::Result<()> {
    let mut out = io::stdout().lock();
    writeln!(out, "{}", document)?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::metrics::{ComparisonResult, TrackMetrics};
    use crate::analysis::tonal::{PitchClass, Scale};
    use crate::error::{CompareError, LoadError, TrackError, TrackRole};
    use std::path::PathBuf;

    fn metrics(bpm: f32) -> TrackMetrics {
        TrackMetrics {
            integrated_lufs: -9.5,
            loudness_range: 5.0,
            true_peak: -0.3,
            dynamic_complexity: 2.4,
            bpm,
            beat_confidence: 0.9,
            danceability: 0.8,
            key: PitchClass::G,
            scale: Scale::Major,
            tuning_frequency: 440.0,
            spectral_centroid: 1800.0,
            spectral_rolloff: 4200.0,
            spectral_flux: 9.0,
        }
    }

    #[test]
    fn comparison_has_exactly_mix_and_reference() {
        let doc = render(&ComparisonResult {
            mix: metrics(126.0),
            reference: metrics(128.0),
        });
        let value: serde_json::Value = serde_json::from_str(&doc).unwrap();
        let obj = value.as_object().unwrap();
        let keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["mix", "reference"]);
        assert_eq!(value["mix"]["bpm"], 126.0);
        assert_eq!(value["reference"]["key"], "G");
        assert!(value.get("error").is_none());
    }

    #[test]
    fn error_document_has_only_the_message() {
        let err = CompareError::new(
            TrackRole::Reference,
            TrackError::Load(LoadError::NotFound(PathBuf::from("ref.mp3"))),
        );
        let value: serde_json::Value =
            serde_json::from_str(&render_error(&err.to_string())).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 1);
        assert!(obj["error"].as_str().unwrap().starts_with("reference track:"));
    }

    #[test]
    fn error_messages_are_escaped() {
        let doc = render_error("bad \"quote\"\nline");
        let value: serde_json::Value = serde_json::from_str(&doc).unwrap();
        assert_eq!(value["error"], "bad \"quote\"\nline");
    }
}
