use std::time::{Duration, Instant};

use crate::error::{ComputationFault, Result};

/// Wall-clock budget for one track. Extractors poll it between frames.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    start: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    pub fn new(budget: Option<Duration>) -> Self {
        Self {
            start: Instant::now(),
            budget,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn check(&self, descriptor: &'static str) -> Result<()> {
        match self.budget {
            Some(budget) => {
                let elapsed = self.start.elapsed();
                if elapsed > budget {
                    Err(ComputationFault::DeadlineExceeded {
                        descriptor,
                        elapsed,
                    })
                } else {
                    Ok(())
                }
            }
            None => Ok(()),
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::unbounded()
    }
}
