//! Log tailer: a lazy sequence of lines from a spec's log file. Waits for
//! file creation, then either emits current contents and closes, or in
//! follow mode blocks for new lines until cancelled.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct LogTailer {
    path: PathBuf,
}

impl LogTailer {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Wait for the log file to be created, polling at a fixed interval.
    /// Returns early if `cancel` is set.
    fn wait_for_creation(&self, cancel: &Arc<AtomicBool>) -> bool {
        while !self.path.exists() {
            if cancel.load(Ordering::SeqCst) {
                return false;
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        }
        true
    }

    /// Emit the file's current contents and return (non-follow mode).
    pub fn read_once(&self, cancel: &Arc<AtomicBool>) -> Result<Vec<String>> {
        if !self.wait_for_creation(cancel) {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path)
            .with_context(|| format!("failed to open log file {}", self.path.display()))?;
        BufReader::new(file).lines().collect::<std::io::Result<Vec<_>>>().context("failed to read log lines")
    }

    /// Stream lines as they are appended, calling `on_line` for each one,
    /// until `cancel` is set. With `latest`, existing content (e.g. from an
    /// earlier `--force` retry appended to the same log file) is skipped
    /// first, so only output produced after this call starts is emitted.
    pub fn follow(&self, cancel: &Arc<AtomicBool>, latest: bool, mut on_line: impl FnMut(&str)) -> Result<()> {
        if !self.wait_for_creation(cancel) {
            return Ok(());
        }
        let file = File::open(&self.path)
            .with_context(|| format!("failed to open log file {}", self.path.display()))?;
        let mut reader = BufReader::new(file);

        if latest {
            let mut discard = String::new();
            while reader.read_line(&mut discard)? > 0 {
                discard.clear();
            }
        }

        loop {
            if cancel.load(Ordering::SeqCst) {
                return Ok(());
            }
            let mut line = String::new();
            let bytes_read = reader.read_line(&mut line)?;
            if bytes_read == 0 {
                thread::sleep(WAIT_POLL_INTERVAL);
                continue;
            }
            on_line(line.trim_end_matches('\n'));
        }
    }
}
