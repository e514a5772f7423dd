pub mod compare;
pub mod deadline;
pub mod dynamics;
pub mod loudness;
pub mod metrics;
pub mod rhythm;
pub mod spectral;
pub mod tonal;
pub mod track;

pub use compare::{compare_files, compare_files_partial};
pub use metrics::{ComparisonResult, PartialComparison, PartialTrackMetrics, TrackMetrics};
pub use track::{analyze, analyze_file, AnalysisOptions};
