use crate::error::{ComputationFault, Result};

/// Overlapping fixed-size windows over a slice, starting at sample 0.
///
/// A trailing partial frame is dropped, never padded. The iterator is `Clone`,
/// so a pass can be restarted from the beginning without re-slicing.
#[derive(Clone, Debug)]
pub struct Frames<'a> {
    samples: &'a [f32],
    frame_size: usize,
    hop_size: usize,
    pos: usize,
}

impl<'a> Frames<'a> {
    pub fn new(samples: &'a [f32], frame_size: usize, hop_size: usize) -> Result<Self> {
        if frame_size == 0 || hop_size == 0 {
            return Err(ComputationFault::InvalidParameter(format!(
                "frame_size ({}) and hop_size ({}) must be positive",
                frame_size, hop_size
            )));
        }
        Ok(Self {
            samples,
            frame_size,
            hop_size,
            pos: 0,
        })
    }

    /// `floor((L - F) / H) + 1` when `L >= F`, otherwise zero.
    pub fn count_for(len: usize, frame_size: usize, hop_size: usize) -> usize {
        if frame_size == 0 || hop_size == 0 || len < frame_size {
            0
        } else {
            (len - frame_size) / hop_size + 1
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Offset of the next frame to be produced.
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl<'a> Iterator for Frames<'a> {
    type Item = &'a [f32];

    fn next(&mut self) -> Option<Self::Item> {
        let end = self.pos.checked_add(self.frame_size)?;
        if end > self.samples.len() {
            return None;
        }
        let frame = &self.samples[self.pos..end];
        self.pos += self.hop_size;
        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = Frames::count_for(
            self.samples.len().saturating_sub(self.pos),
            self.frame_size,
            self.hop_size,
        );
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Frames<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_count_matches_formula() {
        for &(len, f, h) in &[(10, 4, 2), (4096, 4096, 2048), (16384, 4096, 2048), (9, 4, 3)] {
            let samples = vec![0.0f32; len];
            let frames = Frames::new(&samples, f, h).unwrap();
            assert_eq!(frames.len(), (len - f) / h + 1);
            assert_eq!(frames.count(), (len - f) / h + 1);
        }
    }

    #[test]
    fn short_input_yields_nothing() {
        let samples = vec![0.0f32; 4095];
        assert_eq!(Frames::new(&samples, 4096, 2048).unwrap().count(), 0);
        assert_eq!(Frames::count_for(4095, 4096, 2048), 0);
    }

    #[test]
    fn trailing_partial_frame_is_dropped() {
        let samples: Vec<f32> = (0..7).map(|i| i as f32).collect();
        let frames: Vec<&[f32]> = Frames::new(&samples, 3, 2).unwrap().collect();
        let expected: Vec<&[f32]> = vec![&[0.0, 1.0, 2.0], &[2.0, 3.0, 4.0], &[4.0, 5.0, 6.0]];
        assert_eq!(frames, expected);

        let samples: Vec<f32> = (0..6).map(|i| i as f32).collect();
        let last = Frames::new(&samples, 3, 2).unwrap().last().unwrap();
        assert_eq!(last, &[2.0f32, 3.0, 4.0][..]);
    }

    #[test]
    fn clone_restarts_the_sequence() {
        let samples: Vec<f32> = (0..8).map(|i| i as f32).collect();
        let frames = Frames::new(&samples, 4, 4).unwrap();
        let first: Vec<_> = frames.clone().collect();
        let second: Vec<_> = frames.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let samples = [0.0f32; 8];
        assert!(Frames::new(&samples, 0, 1).is_err());
        assert!(Frames::new(&samples, 4, 0).is_err());
    }
}
