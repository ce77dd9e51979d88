//! Invocation of the benchmark runner binary.

use std::path::PathBuf;
use std::process::Command;

use log::debug;

use crate::command::checked_output;
use crate::error::Result;
use crate::schema::{RunnerOutput, TimingRecord};
use crate::session::{Session, SessionConfig, TracingController};
use crate::trace_reader::TraceReader;

/// Result of one (possibly traced) invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    pub records: Vec<TimingRecord>,
    pub event_count: Option<u64>,
}

/// The runner binary: execs `args[0]` once per online CPU and prints the
/// children's timestamps as JSON.
#[derive(Clone, Debug)]
pub struct BenchmarkTool {
    program: PathBuf,
}

impl BenchmarkTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn run(&self, args: &[String]) -> Result<Vec<TimingRecord>> {
        let stdout = checked_output(Command::new(&self.program).args(args))?;
        let output: RunnerOutput = serde_json::from_slice(&stdout)?;
        let records = output.into_records();
        debug!("{:?}: {} timing record(s)", args, records.len());
        Ok(records)
    }

    /// Run `args` inside a tracing session described by `config`. The session
    /// is torn down even if the run fails. With a `reader`, the recorded
    /// trace is read back and its events counted.
    pub fn run_traced<C: TracingController + ?Sized>(
        &self,
        args: &[String],
        controller: &mut C,
        config: SessionConfig,
        reader: Option<&mut dyn TraceReader>,
    ) -> Result<Invocation> {
        let session = Session::begin(controller, config)?;
        let records = self.run(args)?;
        let config = session.finish()?;

        let event_count = match reader {
            Some(reader) => Some(reader.count_events(&config.trace_path)?),
            None => None,
        };
        Ok(Invocation {
            records,
            event_count,
        })
    }
}
