use std::borrow::Cow;

use crate::error::{ComputationFault, LoadError};

/// Decoded audio for one track. Channels are kept separate, never interleaved.
#[derive(Clone, Debug)]
pub struct SampleBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Build a buffer from one (mono) or two (stereo) equal-length channels.
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self, LoadError> {
        if channels.is_empty() || channels.len() > 2 {
            return Err(LoadError::Malformed(format!(
                "expected 1 or 2 channels, got {}",
                channels.len()
            )));
        }
        if sample_rate == 0 {
            return Err(LoadError::Malformed("sample rate must be positive".into()));
        }
        let len = channels[0].len();
        if channels.iter().any(|c| c.len() != len) {
            return Err(LoadError::Malformed(
                "channels have different lengths".into(),
            ));
        }
        Ok(Self {
            channels,
            sample_rate,
        })
    }

    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self, LoadError> {
        Self::new(vec![samples], sample_rate)
    }

    pub fn stereo(left: Vec<f32>, right: Vec<f32>, sample_rate: u32) -> Result<Self, LoadError> {
        Self::new(vec![left, right], sample_rate)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration_secs(&self) -> f64 {
        self.len() as f64 / self.sample_rate as f64
    }

    /// Channel average. Borrows when the buffer is already mono.
    pub fn mono_mix(&self) -> Cow<'_, [f32]> {
        match self.channels.as_slice() {
            [only] => Cow::Borrowed(only.as_slice()),
            [left, right] => Cow::Owned(
                left.iter()
                    .zip(right.iter())
                    .map(|(l, r)| (l + r) * 0.5)
                    .collect(),
            ),
            _ => unreachable!("SampleBuffer holds one or two channels"),
        }
    }

    /// Left/right pair. A mono buffer is duplicated into both sides.
    pub fn stereo_pair(&self) -> (&[f32], &[f32]) {
        match self.channels.as_slice() {
            [only] => (only.as_slice(), only.as_slice()),
            [left, right] => (left.as_slice(), right.as_slice()),
            _ => unreachable!("SampleBuffer holds one or two channels"),
        }
    }

    /// Every extractor calls this before touching the samples.
    pub fn require_signal(&self) -> Result<(), ComputationFault> {
        if self.is_empty() {
            return Err(ComputationFault::EmptyBuffer);
        }
        for channel in &self.channels {
            if let Some(index) = channel.iter().position(|s| !s.is_finite()) {
                return Err(ComputationFault::NonFiniteSample { index });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_channels() {
        let err = SampleBuffer::stereo(vec![0.0; 4], vec![0.0; 3], 44100).unwrap_err();
        assert!(matches!(err, LoadError::Malformed(_)));
    }

    #[test]
    fn rejects_zero_sample_rate_and_surround() {
        assert!(SampleBuffer::mono(vec![0.0; 4], 0).is_err());
        assert!(SampleBuffer::new(vec![vec![0.0; 4]; 6], 48000).is_err());
    }

    #[test]
    fn mono_mix_averages_channels() {
        let buf = SampleBuffer::stereo(vec![1.0, 0.0], vec![0.0, -1.0], 8000).unwrap();
        assert_eq!(buf.mono_mix().as_ref(), &[0.5, -0.5]);
    }

    #[test]
    fn mono_is_duplicated_into_a_stereo_pair() {
        let buf = SampleBuffer::mono(vec![0.25, 0.5], 8000).unwrap();
        let (l, r) = buf.stereo_pair();
        assert_eq!(l, r);
        assert!(matches!(buf.mono_mix(), Cow::Borrowed(_)));
    }

    #[test]
    fn require_signal_flags_empty_and_nan() {
        let empty = SampleBuffer::mono(Vec::new(), 44100).unwrap();
        assert_eq!(empty.require_signal(), Err(ComputationFault::EmptyBuffer));

        let nan = SampleBuffer::mono(vec![0.0, f32::NAN, 0.0], 44100).unwrap();
        assert_eq!(
            nan.require_signal(),
            Err(ComputationFault::NonFiniteSample { index: 1 })
        );
    }
}
