use std::collections::BTreeMap;

use serde::Serialize;

use super::tonal::{PitchClass, Scale};

/// Scalar descriptors for one track. Every numeric field is finite.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackMetrics {
    // Loudness & dynamics
    /// EBU R128 integrated loudness (LUFS)
    pub integrated_lufs: f32,
    /// EBU Tech 3342 loudness range (LU)
    pub loudness_range: f32,
    /// Sample peak (dBFS); positive when the signal clips
    pub true_peak: f32,
    pub dynamic_complexity: f32,

    // Rhythm
    pub bpm: f32,
    /// 0.0-1.0
    pub beat_confidence: f32,
    /// 0.0-1.0
    pub danceability: f32,

    // Tonal
    pub key: PitchClass,
    pub scale: Scale,
    /// Hz
    pub tuning_frequency: f32,

    // Spectral
    /// Hz
    pub spectral_centroid: f32,
    /// Hz
    pub spectral_rolloff: f32,
    pub spectral_flux: f32,
}

/// Same fields as [`TrackMetrics`], `None` where that descriptor failed.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PartialTrackMetrics {
    pub integrated_lufs: Option<f32>,
    pub loudness_range: Option<f32>,
    pub true_peak: Option<f32>,
    pub dynamic_complexity: Option<f32>,

    pub bpm: Option<f32>,
    pub beat_confidence: Option<f32>,
    pub danceability: Option<f32>,

    pub key: Option<PitchClass>,
    pub scale: Option<Scale>,
    pub tuning_frequency: Option<f32>,

    pub spectral_centroid: Option<f32>,
    pub spectral_rolloff: Option<f32>,
    pub spectral_flux: Option<f32>,

    /// Descriptor name -> failure message
    pub faults: BTreeMap<String, String>,
}

impl PartialTrackMetrics {
    pub fn is_complete(&self) -> bool {
        self.faults.is_empty()
    }
}

/// Exists only when both tracks were analysed successfully.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub mix: TrackMetrics,
    pub reference: TrackMetrics,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PartialComparison {
    pub mix: PartialTrackMetrics,
    pub reference: PartialTrackMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_metrics_serialise_with_plain_field_names() {
        let metrics = TrackMetrics {
            integrated_lufs: -14.0,
            loudness_range: 6.5,
            true_peak: -1.0,
            dynamic_complexity: 3.2,
            bpm: 124.0,
            beat_confidence: 0.8,
            danceability: 0.7,
            key: PitchClass::FSharp,
            scale: Scale::Minor,
            tuning_frequency: 440.0,
            spectral_centroid: 2100.0,
            spectral_rolloff: 5400.0,
            spectral_flux: 12.0,
        };
        let value = serde_json::to_value(&metrics).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 13);
        assert_eq!(obj["key"], "F#");
        assert_eq!(obj["scale"], "minor");
        assert!(obj["bpm"].is_number());
    }

    #[test]
    fn partial_metrics_serialise_missing_fields_as_null() {
        let mut partial = PartialTrackMetrics {
            bpm: Some(120.0),
            ..Default::default()
        };
        partial
            .faults
            .insert("loudness".into(), "empty sample buffer".into());
        let value = serde_json::to_value(&partial).unwrap();
        assert!(value["integrated_lufs"].is_null());
        assert_eq!(value["bpm"], 120.0);
        assert_eq!(value["faults"]["loudness"], "empty sample buffer");
        assert!(!partial.is_complete());
    }
}
