//! Reading recorded traces back to count events.

use std::path::{Path, PathBuf};
use std::process::Command;

use log::debug;
use walkdir::WalkDir;

use crate::command::checked_output;
use crate::error::{Error, Result};

pub trait TraceReader {
    fn count_events(&mut self, trace_path: &Path) -> Result<u64>;
}

/// A trace can be decoded once every stream directory has its `metadata`
/// file. Sessions are always stopped (which waits for the consumer to flush)
/// before being read, so a missing file means the trace is genuinely absent.
pub fn check_trace_ready(trace_path: &Path) -> Result<()> {
    let not_ready = |reason: String| Error::TraceNotReady {
        path: trace_path.display().to_string(),
        reason,
    };

    if !trace_path.is_dir() {
        return Err(not_ready("no trace directory".to_string()));
    }

    let mut found = 0usize;
    for entry in WalkDir::new(trace_path) {
        let entry = entry.map_err(|e| not_ready(e.to_string()))?;
        if entry.file_type().is_file() && entry.file_name() == "metadata" {
            let len = entry.metadata().map_err(|e| not_ready(e.to_string()))?.len();
            if len == 0 {
                return Err(not_ready(format!("{} is empty", entry.path().display())));
            }
            found += 1;
        }
    }

    if found == 0 {
        return Err(not_ready("no metadata file".to_string()));
    }
    debug!("{found} metadata file(s) under {}", trace_path.display());
    Ok(())
}

/// Counts events by pretty-printing the trace with babeltrace, one event per
/// output line.
pub struct Babeltrace {
    program: PathBuf,
}

impl Babeltrace {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for Babeltrace {
    fn default() -> Self {
        Self::new("babeltrace2")
    }
}

impl TraceReader for Babeltrace {
    fn count_events(&mut self, trace_path: &Path) -> Result<u64> {
        check_trace_ready(trace_path)?;
        let out = checked_output(Command::new(&self.program).arg(trace_path))?;
        let count = out
            .split(|&b| b == b'\n')
            .filter(|line| !line.is_empty())
            .count() as u64;
        debug!("{count} events in {}", trace_path.display());
        Ok(count)
    }
}
