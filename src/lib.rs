//! mixscope - mix-vs-reference audio descriptor analysis
//!
//! Decodes a mix and a reference track, computes the same set of scalar
//! descriptors for each (loudness, dynamics, rhythm, key, tuning and
//! spectral shape) and reports them side by side as JSON.
//!
//! - `audio`: sample buffers, decoding, framing, FFT and peak picking
//! - `analysis`: descriptor extractors, the per-track analyzer and the comparison
//! - `stems`: driving an external stem separator
//! - `output`: JSON documents for results and errors
//!
//! ```no_run
//! use mixscope::analysis::{compare_files, AnalysisOptions};
//! use std::path::Path;
//!
//! let options = AnalysisOptions::default();
//! let result = compare_files(Path::new("mix.wav"), Path::new("ref.wav"), &options)?;
//! println!("{}", mixscope::output::render(&result));
//! # Ok::<(), mixscope::error::CompareError>(())
//! ```

pub mod analysis;
pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod output;
pub mod stems;

pub use analysis::{ComparisonResult, TrackMetrics};
pub use audio::SampleBuffer;
pub use error::{CompareError, ComputationFault, LoadError, TrackError};
