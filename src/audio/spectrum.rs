use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::error::{ComputationFault, Result};

/// Magnitudes of the non-negative-frequency DFT bins of one windowed frame.
/// Length is `frame_size / 2 + 1`.
#[derive(Clone, Debug)]
pub struct Spectrum {
    magnitudes: Vec<f32>,
    sample_rate: u32,
    frame_size: usize,
}

impl Spectrum {
    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Width of one bin in Hz.
    pub fn bin_width(&self) -> f32 {
        self.sample_rate as f32 / self.frame_size as f32
    }

    pub fn bin_frequency(&self, bin: f32) -> f32 {
        bin * self.bin_width()
    }

    pub fn nyquist(&self) -> f32 {
        self.sample_rate as f32 / 2.0
    }

    pub fn into_magnitudes(self) -> Vec<f32> {
        self.magnitudes
    }
}

/// Hann window + forward FFT for a fixed frame size.
///
/// Holds its own plan and scratch space; build one per extractor pass rather
/// than sharing it between threads.
pub struct SpectralTransform {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    sample_rate: u32,
}

impl SpectralTransform {
    pub fn new(frame_size: usize, sample_rate: u32) -> Result<Self> {
        if frame_size < 2 {
            return Err(ComputationFault::InvalidParameter(format!(
                "frame_size must be at least 2, got {}",
                frame_size
            )));
        }
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(frame_size);
        Ok(Self {
            fft,
            window: hann_window(frame_size),
            buffer: vec![Complex::new(0.0, 0.0); frame_size],
            sample_rate,
        })
    }

    pub fn frame_size(&self) -> usize {
        self.window.len()
    }

    pub fn process(&mut self, frame: &[f32]) -> Result<Spectrum> {
        let n = self.window.len();
        if frame.len() != n {
            return Err(ComputationFault::InvalidParameter(format!(
                "frame length {} does not match transform size {}",
                frame.len(),
                n
            )));
        }

        for ((slot, &s), &w) in self.buffer.iter_mut().zip(frame).zip(&self.window) {
            *slot = Complex::new(s * w, 0.0);
        }
        self.fft.process(&mut self.buffer);

        let magnitudes = self.buffer[..n / 2 + 1].iter().map(|c| c.norm()).collect();

        Ok(Spectrum {
            magnitudes,
            sample_rate: self.sample_rate,
            frame_size: n,
        })
    }
}

/// `0.5 - 0.5 cos(2πn / (N - 1))`
pub fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}
