//! Error types shared by the analysis pipeline.
//!
//! - `LoadError`: the decoder could not produce a sample buffer. Fatal for that track.
//! - `ComputationFault`: a descriptor algorithm rejected its input or ran out of time.
//! - `TrackError` / `CompareError`: what the Track Analyzer and the Comparison
//!   Aggregator hand back to callers.
//! - `StemError`: the external stem separator could not be run or reported failure.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Audio could not be decoded into a sample buffer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Audio file not found: '{0}'")]
    NotFound(PathBuf),

    #[error("Failed to open audio file '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to probe audio format of '{path}': {reason}")]
    Probe { path: PathBuf, reason: String },

    #[error("No audio tracks found in '{0}'")]
    NoTrack(PathBuf),

    #[error("Unknown sample rate in '{0}'")]
    UnknownSampleRate(PathBuf),

    #[error("Unsupported channel layout in '{path}': {channels} channels (mono or stereo only)")]
    UnsupportedChannels { path: PathBuf, channels: usize },

    #[error("Failed to decode '{path}': {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Decoded no samples from '{0}'")]
    Empty(PathBuf),

    #[error("Malformed sample buffer: {0}")]
    Malformed(String),
}

/// A descriptor algorithm could not produce a value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComputationFault {
    #[error("empty sample buffer")]
    EmptyBuffer,

    #[error("non-finite sample at index {index}")]
    NonFiniteSample { index: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("{descriptor}: {reason}")]
    DegenerateResult {
        descriptor: &'static str,
        reason: String,
    },

    #[error("{descriptor}: deadline exceeded after {:.1}s", .elapsed.as_secs_f64())]
    DeadlineExceeded {
        descriptor: &'static str,
        elapsed: Duration,
    },
}

/// Why a single track produced no metrics.
#[derive(Debug, Error)]
pub enum TrackError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("analysis failed: {0}")]
    Computation(#[from] ComputationFault),
}

/// Which side of a comparison a track plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackRole {
    Mix,
    Reference,
}

impl TrackRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackRole::Mix => "mix",
            TrackRole::Reference => "reference",
        }
    }
}

impl fmt::Display for TrackRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A comparison failed because one of its tracks failed.
#[derive(Debug, Error)]
#[error("{role} track: {source}")]
pub struct CompareError {
    pub role: TrackRole,
    #[source]
    pub source: TrackError,
}

impl CompareError {
    pub fn new(role: TrackRole, source: TrackError) -> Self {
        Self { role, source }
    }
}

/// Missing or invalid arguments, detected before any analysis starts.
#[derive(Debug, Error)]
#[error("Usage error: {0}")]
pub struct UsageError(pub String);

/// The stem-separation child process failed.
#[derive(Debug, Error)]
pub enum StemError {
    #[error("Audio file not found: '{0}'")]
    InputNotFound(PathBuf),

    #[error("Failed to start stem separator '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Stem separator I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stem separator exited with {}", .code.map_or("a signal".to_string(), |c| format!("code {c}")))]
    NonZeroExit { code: Option<i32> },

    #[error("Malformed stem separator output: {reason} (output: {output})")]
    MalformedOutput { reason: String, output: String },

    #[error("Stem separation failed: {0}")]
    Reported(String),
}

/// Result type for descriptor computations.
pub type Result<T> = std::result::Result<T, ComputationFault>;
