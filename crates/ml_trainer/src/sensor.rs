//! File-presence sensor
//!
//! Polls for a file at a fixed interval and gives up once the timeout has
//! elapsed, failing the run.

use mlpipe_core::{PipelineError, Result};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// `timeout` from now, saturating for durations `Instant` cannot represent
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
    const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

#[derive(Debug, Clone)]
pub struct FileSensor {
    task_id: String,
    path: PathBuf,
    poke_interval: Duration,
    timeout: Duration,
}

impl FileSensor {
    pub fn new(
        task_id: impl Into<String>,
        path: impl Into<PathBuf>,
        poke_interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            path: path.into(),
            poke_interval,
            timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Single check: does the file exist right now
    pub fn poke(&self) -> bool {
        self.path.is_file()
    }

    /// Block until the file exists, returning the number of pokes made
    pub fn wait(&self) -> Result<u32> {
        self.wait_until(deadline_after(self.timeout))
    }

    /// Like [`FileSensor::wait`], but against an externally chosen deadline
    pub fn wait_until(&self, deadline: Instant) -> Result<u32> {
        let mut pokes = 0u32;

        loop {
            pokes += 1;
            if self.poke() {
                info!(
                    "{}: found {} after {} poke(s)",
                    self.task_id,
                    self.path.display(),
                    pokes
                );
                return Ok(pokes);
            }

            let next_poke = Instant::now().checked_add(self.poke_interval);
            if next_poke.map_or(true, |next| next > deadline) {
                return Err(PipelineError::Timeout(format!(
                    "{}: {} did not appear within {:?} ({} pokes)",
                    self.task_id,
                    self.path.display(),
                    self.timeout,
                    pokes
                )));
            }

            debug!("{}: waiting for {}", self.task_id, self.path.display());
            thread::sleep(self.poke_interval);
        }
    }
}
