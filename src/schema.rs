use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{Error, Result};

/// One benchmark pair: an uninstrumented binary and its instrumented twin.
///
/// Argument lists are passed to the runner binary, which execs `args[0]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkSpec {
    pub baseline: Vec<String>,
    pub ust: Vec<String>,

    /// Iteration count; passed as the last argument and used as the divisor
    /// for per-event overhead. Without it only start-up cost is measured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nr_loops: Option<u64>,

    #[serde(default = "default_tp_per_loop")]
    pub tp_per_loop: u64,
}

fn default_tp_per_loop() -> u64 {
    1
}

impl BenchmarkSpec {
    pub fn new(baseline: &str, ust: &str) -> Self {
        Self {
            baseline: vec![baseline.to_string()],
            ust: vec![ust.to_string()],
            nr_loops: None,
            tp_per_loop: default_tp_per_loop(),
        }
    }

    pub fn with_loops(mut self, nr_loops: u64) -> Self {
        self.nr_loops = Some(nr_loops);
        self
    }

    pub fn with_tp_per_loop(mut self, tp_per_loop: u64) -> Self {
        self.tp_per_loop = tp_per_loop;
        self
    }

    fn loop_args(&self) -> Vec<String> {
        self.nr_loops.map(|n| n.to_string()).into_iter().collect()
    }

    pub fn baseline_args(&self) -> Vec<String> {
        let mut args = self.baseline.clone();
        args.extend(self.loop_args());
        args
    }

    pub fn ust_args(&self) -> Vec<String> {
        let mut args = self.ust.clone();
        args.extend(self.loop_args());
        args
    }

    /// Number of tracepoints fired by one run, if the run loops at all.
    pub fn nr_events(&self) -> Option<u64> {
        self.nr_loops.map(|n| n.saturating_mul(self.tp_per_loop))
    }
}

/// Timestamps (seconds) printed by one benchmarked process.
///
/// `start`/`end` only exist when the binary ran its loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingRecord {
    pub exec: Option<f64>,
    pub main: Option<f64>,
    pub start: Option<f64>,
    pub end: Option<f64>,
}

fn field(value: Option<f64>, field: &'static str) -> Result<f64> {
    value.ok_or(Error::MissingField { field })
}

impl TimingRecord {
    /// Time between `exec()` and entering `main()`.
    pub fn startup(&self) -> Result<f64> {
        Ok(field(self.main, "main")? - field(self.exec, "exec")?)
    }

    /// Time spent in the benchmark loop.
    pub fn run(&self) -> Result<f64> {
        Ok(field(self.end, "end")? - field(self.start, "start")?)
    }
}

/// The runner prints one record per child it spawned (one per online CPU).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RunnerOutput {
    Many(Vec<TimingRecord>),
    One(TimingRecord),
}

impl RunnerOutput {
    pub fn into_records(self) -> Vec<TimingRecord> {
        match self {
            RunnerOutput::Many(records) => records,
            RunnerOutput::One(record) => vec![record],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaselineResult {
    pub args: Vec<String>,
    pub start_time: f64,
    pub run_time: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UstResult {
    pub args: Vec<String>,
    pub start_time: f64,
    pub run_time: Option<f64>,
    pub ns_per_event: Option<f64>,
    pub start_overhead_s: f64,
    pub start_overhead_pct: Option<f64>,

    /// Events found in the trace, when traces are read back.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UstMeasurement {
    pub baseline: BaselineResult,
    pub tracing_disabled: UstResult,
    pub tracing_enabled: UstResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KernelBaseline {
    pub run_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KernelTraced {
    pub run_time: f64,
    pub ns_per_event: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KernelMeasurement {
    pub baseline: KernelBaseline,
    pub tracing_enabled: KernelTraced,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PassResult {
    Ust(UstMeasurement),
    Kernel(KernelMeasurement),
}

/// One repetition of one named benchmark. Serializes as `{name: result}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Pass {
    pub name: String,
    pub result: PassResult,
}

impl Serialize for Pass {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.name, &self.result)?;
        map.end()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub schema_version: u32,
    pub bench_version: String,
    pub profile: String,
    pub full_passes: usize,
    pub fast_passes: usize,
    pub timestamp_utc: String,
    pub git_sha: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub system: String,
    pub node: String,
    pub release: String,
    pub version: String,
    pub machine: String,
    pub processor: String,
}

/// Everything written to the structured dump, keyed by `"<n>_cpus"`.
#[derive(Debug, Clone, Serialize)]
pub struct BenchReport {
    pub run: RunMeta,
    pub data: BTreeMap<String, Vec<Pass>>,
    pub average: BTreeMap<String, BTreeMap<String, f64>>,
    pub platform: PlatformInfo,
}
