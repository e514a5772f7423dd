//! Stem separation collaborator.
//!
//! Separation itself happens outside this crate. [`ProcessSeparator`] drives
//! an external separator script, turns its stderr into [`StemProgress`]
//! events and its stdout JSON into a [`StemSeparation`].

pub mod process;
pub mod progress;

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::StemError;

pub use process::ProcessSeparator;
pub use progress::{parse_progress_line, Heartbeat};

/// One progress update from a running separation.
#[derive(Debug, Clone, PartialEq)]
pub struct StemProgress {
    /// 0-100
    pub percent: u8,
    pub stage: String,
    /// Time since the separator was started
    pub elapsed: Duration,
}

/// Stem name (e.g. "vocals") -> written file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StemSeparation {
    pub stems: BTreeMap<String, PathBuf>,
    pub sample_rate: u32,
}

/// Stem separation backend
pub trait StemSeparator: Send + Sync {
    /// Split `input` into stems written under `output_dir`, reporting
    /// progress on `progress` until the call returns.
    fn separate(
        &self,
        input: &Path,
        output_dir: &Path,
        progress: &Sender<StemProgress>,
    ) -> Result<StemSeparation, StemError>;

    /// Get the name of this separator (for logging)
    fn name(&self) -> &'static str;
}

/// Run `separator` on a worker thread. Progress arrives on the receiver; the
/// channel closes once the separation has finished.
pub fn spawn_separation<S>(
    separator: S,
    input: PathBuf,
    output_dir: PathBuf,
) -> (Receiver<StemProgress>, JoinHandle<Result<StemSeparation, StemError>>)
where
    S: StemSeparator + 'static,
{
    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        log::info!("Separating {} with {}", input.display(), separator.name());
        separator.separate(&input, &output_dir, &tx)
    });
    (rx, handle)
}
