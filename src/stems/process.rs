use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::StemError;

use super::progress::{parse_progress_line, Heartbeat};
use super::{StemProgress, StemSeparation, StemSeparator};

/// Runs `<python> <script> <input> <output_dir>` as a child process.
#[derive(Debug, Clone)]
pub struct ProcessSeparator {
    python: String,
    script: PathBuf,
    ca_bundle: Option<PathBuf>,
    heartbeat: Duration,
}

/// What the separator script prints on stdout when it finishes.
#[derive(Debug, Deserialize)]
struct SeparatorReport {
    success: bool,
    #[serde(default)]
    stems: Option<BTreeMap<String, PathBuf>>,
    #[serde(default)]
    sample_rate: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

impl ProcessSeparator {
    pub fn new(python: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
            script: script.into(),
            ca_bundle: None,
            heartbeat: Duration::from_secs(2),
        }
    }

    /// CA certificates handed to the child as `SSL_CERT_FILE` and
    /// `REQUESTS_CA_BUNDLE`. This process's environment is left alone.
    pub fn with_ca_bundle(mut self, ca_bundle: Option<PathBuf>) -> Self {
        self.ca_bundle = ca_bundle;
        self
    }

    pub fn with_heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat = interval;
        self
    }

    fn command(&self, input: &Path, output_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.python);
        cmd.arg(&self.script)
            .arg(input)
            .arg(output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref ca) = self.ca_bundle {
            cmd.env("SSL_CERT_FILE", ca).env("REQUESTS_CA_BUNDLE", ca);
        }
        cmd
    }
}

impl StemSeparator for ProcessSeparator {
    fn separate(
        &self,
        input: &Path,
        output_dir: &Path,
        progress: &Sender<StemProgress>,
    ) -> Result<StemSeparation, StemError> {
        if !input.exists() {
            return Err(StemError::InputNotFound(input.to_path_buf()));
        }

        let started = Instant::now();
        let mut child = self
            .command(input, output_dir)
            .spawn()
            .map_err(|source| StemError::Spawn {
                program: self.python.clone(),
                source,
            })?;
        log::info!(
            "Stem separator started: {} {}",
            self.python,
            self.script.display()
        );

        let latest: Arc<Mutex<Option<StemProgress>>> = Arc::new(Mutex::new(None));

        let stderr = child.stderr.take();
        let reader = {
            let latest = Arc::clone(&latest);
            let events = progress.clone();
            thread::spawn(move || -> io::Result<()> {
                let Some(stderr) = stderr else {
                    return Ok(());
                };
                for line in BufReader::new(stderr).lines() {
                    let line = line?;
                    match parse_progress_line(&line) {
                        Some((percent, stage)) => {
                            let update = StemProgress {
                                percent,
                                stage,
                                elapsed: started.elapsed(),
                            };
                            if let Ok(mut guard) = latest.lock() {
                                *guard = Some(update.clone());
                            }
                            let _ = events.send(update);
                        }
                        None => log::debug!("[separator] {}", line),
                    }
                }
                Ok(())
            })
        };

        let heartbeat = Heartbeat::start(self.heartbeat, latest, progress.clone(), started);

        let mut stdout = String::new();
        let read = match child.stdout.take() {
            Some(mut out) => out.read_to_string(&mut stdout).map(|_| ()),
            None => Ok(()),
        };
        let status = child.wait();

        heartbeat.stop();
        let drained = reader
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("stderr reader panicked")));

        let status = status?;
        read?;
        drained?;

        log::info!(
            "Stem separator finished in {:.1}s ({})",
            started.elapsed().as_secs_f64(),
            status
        );
        parse_report(&stdout, status)
    }

    fn name(&self) -> &'static str {
        "external process"
    }
}

/// The script may log to stdout before its report, so only the last
/// non-empty line is taken as JSON.
fn parse_report(stdout: &str, status: ExitStatus) -> Result<StemSeparation, StemError> {
    let last_line = stdout.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");

    let report: SeparatorReport = match serde_json::from_str(last_line) {
        Ok(report) => report,
        Err(_) if !status.success() => {
            return Err(StemError::NonZeroExit {
                code: status.code(),
            })
        }
        Err(e) => {
            return Err(StemError::MalformedOutput {
                reason: e.to_string(),
                output: stdout.trim().to_string(),
            })
        }
    };

    if !report.success {
        return Err(StemError::Reported(
            report.error.unwrap_or_else(|| "Unknown error".to_string()),
        ));
    }
    if !status.success() {
        return Err(StemError::NonZeroExit {
            code: status.code(),
        });
    }

    let malformed = |reason: &str| StemError::MalformedOutput {
        reason: reason.to_string(),
        output: last_line.to_string(),
    };
    Ok(StemSeparation {
        stems: report.stems.ok_or_else(|| malformed("missing stems"))?,
        sample_rate: report.sample_rate.ok_or_else(|| malformed("missing sample_rate"))?,
    })
}
