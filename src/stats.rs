//! Overhead arithmetic for one pass and averaging across passes.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::error::Result;
use crate::flatten::{flatten, FlatMap};
use crate::schema::{
    BaselineResult, BenchmarkSpec, KernelBaseline, KernelMeasurement, KernelTraced, Pass,
    TimingRecord, UstMeasurement, UstResult,
};

/// Summed start-up and loop times over all records of one invocation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Totals {
    start: f64,
    run: Option<f64>,
}

fn totals(records: &[TimingRecord], with_run: bool) -> Result<Totals> {
    let mut start = 0.0;
    let mut run = 0.0;
    for record in records {
        start += record.startup()?;
        if with_run {
            run += record.run()?;
        }
    }
    Ok(Totals {
        start,
        run: with_run.then_some(run),
    })
}

fn pct_of(delta: f64, base: f64) -> Option<f64> {
    (base != 0.0).then(|| delta * 100.0 / base)
}

fn ust_result(
    args: Vec<String>,
    t: Totals,
    base: Totals,
    nr_events: Option<u64>,
    event_count: Option<u64>,
) -> UstResult {
    let start_overhead_s = t.start - base.start;
    let ns_per_event = match (t.run, base.run, nr_events) {
        (Some(run), Some(base_run), Some(n)) if n > 0 => Some((run - base_run) * 1e9 / n as f64),
        _ => None,
    };
    UstResult {
        args,
        start_time: t.start,
        run_time: t.run,
        ns_per_event,
        start_overhead_s,
        start_overhead_pct: pct_of(start_overhead_s, base.start),
        event_count,
    }
}

/// Build the baseline / tracing-disabled / tracing-enabled comparison for one
/// pass of `spec` from the three invocations' timing records.
pub fn ust_measurement(
    spec: &BenchmarkSpec,
    base: &[TimingRecord],
    ust: &[TimingRecord],
    ust_en: &[TimingRecord],
    event_count: Option<u64>,
) -> Result<UstMeasurement> {
    let with_run = spec.nr_loops.is_some();
    let nr_events = spec.nr_events();

    let base_t = totals(base, with_run)?;
    let ust_t = totals(ust, with_run)?;
    let ust_en_t = totals(ust_en, with_run)?;

    Ok(UstMeasurement {
        baseline: BaselineResult {
            args: spec.baseline_args(),
            start_time: base_t.start,
            run_time: base_t.run,
        },
        tracing_disabled: ust_result(spec.ust_args(), ust_t, base_t, nr_events, None),
        tracing_enabled: ust_result(spec.ust_args(), ust_en_t, base_t, nr_events, event_count),
    })
}

/// `base_run`/`traced_run` are in seconds.
pub fn kernel_measurement(base_run: f64, traced_run: f64, nr_loops: u64) -> KernelMeasurement {
    KernelMeasurement {
        baseline: KernelBaseline { run_time: base_run },
        tracing_enabled: KernelTraced {
            run_time: traced_run,
            ns_per_event: (traced_run - base_run) * 1e9 / nr_loops.max(1) as f64,
        },
    }
}

/// Mean of every numeric leaf across passes.
///
/// Each key is averaged over the passes where it is present *and numeric*;
/// other passes count in neither numerator nor denominator. A key that is
/// never numeric produces no entry. Booleans are not numeric here; no result
/// field is a boolean today.
pub fn aggregate(passes: &[FlatMap]) -> BTreeMap<String, f64> {
    let all_keys: BTreeSet<&String> = passes.iter().flat_map(|p| p.keys()).collect();

    let mut avg = BTreeMap::new();
    for key in all_keys {
        let mut total = 0.0;
        let mut count = 0usize;
        for pass in passes {
            if let Some(Value::Number(n)) = pass.get(key) {
                if let Some(v) = n.as_f64() {
                    total += v;
                    count += 1;
                }
            }
        }
        if count > 0 {
            avg.insert(key.clone(), total / count as f64);
        }
    }
    avg
}

/// Flatten each pass and average them.
pub fn average_passes(passes: &[Pass]) -> serde_json::Result<BTreeMap<String, f64>> {
    let flat = passes
        .iter()
        .map(|p| serde_json::to_value(p).map(|v| flatten(&v)))
        .collect::<serde_json::Result<Vec<_>>>()?;
    Ok(aggregate(&flat))
}
