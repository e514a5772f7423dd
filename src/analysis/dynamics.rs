//! Dynamic complexity: mean absolute deviation of short-term level from the
//! track's average level, in dB.

use crate::audio::buffer::SampleBuffer;
use crate::audio::frames::Frames;
use crate::error::Result;

use super::deadline::Deadline;

const DESCRIPTOR: &str = "dynamic_complexity";
const FRAME_SECS: f64 = 0.2;
const LEVEL_FLOOR_DB: f32 = -90.0;

pub fn extract(buffer: &SampleBuffer, deadline: &Deadline) -> Result<f32> {
    buffer.require_signal()?;

    let mono = buffer.mono_mix();
    let frame_size = ((FRAME_SECS * buffer.sample_rate() as f64).round() as usize).max(1);

    let mut levels = Vec::with_capacity(Frames::count_for(mono.len(), frame_size, frame_size));
    for (i, frame) in Frames::new(&mono, frame_size, frame_size)?.enumerate() {
        if i % 256 == 0 {
            deadline.check(DESCRIPTOR)?;
        }
        let level = frame_level_db(frame);
        // Frames at the floor are silence and say nothing about dynamics.
        if level > LEVEL_FLOOR_DB {
            levels.push(level);
        }
    }

    let complexity = mean_absolute_deviation(&levels);
    log::debug!(
        "dynamic_complexity: {:.3} dB over {} active frames",
        complexity,
        levels.len()
    );
    Ok(complexity)
}

fn frame_level_db(frame: &[f32]) -> f32 {
    let mean_square =
        frame.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>() / frame.len() as f64;
    if mean_square <= 0.0 {
        return LEVEL_FLOOR_DB;
    }
    ((10.0 * mean_square.log10()) as f32).max(LEVEL_FLOOR_DB)
}

fn mean_absolute_deviation(levels: &[f32]) -> f32 {
    if levels.is_empty() {
        return 0.0;
    }
    let n = levels.len() as f32;
    let mean = levels.iter().sum::<f32>() / n;
    levels.iter().map(|l| (l - mean).abs()).sum::<f32>() / n
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(amp: f32, secs: f32, sr: u32) -> Vec<f32> {
        (0..(secs * sr as f32) as usize)
            .map(|i| amp * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / sr as f32).sin())
            .collect()
    }

    #[test]
    fn silence_is_zero() {
        let buf = SampleBuffer::mono(vec![0.0; 44100 * 5], 44100).unwrap();
        assert_eq!(extract(&buf, &Deadline::unbounded()).unwrap(), 0.0);
    }

    #[test]
    fn constant_tone_is_near_zero() {
        let buf = SampleBuffer::mono(tone(0.5, 4.0, 44100), 44100).unwrap();
        let c = extract(&buf, &Deadline::unbounded()).unwrap();
        assert!(c < 0.1, "got {c}");
    }

    #[test]
    fn alternating_levels_are_more_complex() {
        let mut samples = Vec::new();
        for i in 0..8 {
            let amp = if i % 2 == 0 { 0.8 } else { 0.08 };
            samples.extend(tone(amp, 0.6, 44100));
        }
        let buf = SampleBuffer::mono(samples, 44100).unwrap();
        let c = extract(&buf, &Deadline::unbounded()).unwrap();
        // Levels alternate 20 dB apart, so the deviation is close to 10 dB.
        assert!(c > 7.0 && c < 12.0, "got {c}");
    }

    #[test]
    fn shorter_than_one_frame_is_zero() {
        let buf = SampleBuffer::mono(tone(0.5, 0.1, 44100), 44100).unwrap();
        assert_eq!(extract(&buf, &Deadline::unbounded()).unwrap(), 0.0);
    }
}
