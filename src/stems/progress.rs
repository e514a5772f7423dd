use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::StemProgress;

const PROGRESS_PREFIX: &str = "PROGRESS:";

/// Parse a `PROGRESS:<percent>:<stage>` line. Percentages above 100 are clamped.
pub fn parse_progress_line(line: &str) -> Option<(u8, String)> {
    let rest = line.trim_end().strip_prefix(PROGRESS_PREFIX)?;
    let (percent, stage) = rest.split_once(':')?;
    let percent: u32 = percent.trim().parse().ok()?;
    Some((percent.min(100) as u8, stage.trim().to_string()))
}

/// Re-emits the latest progress with a fresh elapsed time at a fixed interval,
/// so long silent stages still show signs of life.
pub struct Heartbeat {
    worker: Option<(Sender<()>, JoinHandle<()>)>,
}

impl Heartbeat {
    /// A zero interval disables the heartbeat.
    pub fn start(
        interval: Duration,
        latest: Arc<Mutex<Option<StemProgress>>>,
        events: Sender<StemProgress>,
        started: Instant,
    ) -> Self {
        if interval.is_zero() {
            return Self { worker: None };
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = thread::spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    let snapshot = latest.lock().ok().and_then(|guard| guard.clone());
                    if let Some(mut beat) = snapshot {
                        beat.elapsed = started.elapsed();
                        if events.send(beat).is_err() {
                            break;
                        }
                    }
                }
                // stop signal, or the owner went away
                _ => break,
            }
        });

        Self {
            worker: Some((stop_tx, handle)),
        }
    }

    /// Signal the thread and wait for it to exit.
    pub fn stop(mut self) {
        if let Some((stop, handle)) = self.worker.take() {
            let _ = stop.send(());
            if handle.join().is_err() {
                log::warn!("Heartbeat thread panicked");
            }
        }
    }
}
