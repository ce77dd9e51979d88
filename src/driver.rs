//! The benchmark driver: runs a suite of benchmark pairs, optionally the
//! kernel benchmark, and sweeps the whole thing across online CPU counts.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::cpu::CpuHotplug;
use crate::error::{Error, Result};
use crate::harness::{BenchConfig, PassGroup, SuiteEntry};
use crate::kernel::KernelBench;
use crate::runner::BenchmarkTool;
use crate::schema::{Pass, PassResult};
use crate::session::{Domain, Session, TracingController, Workspace};
use crate::stats;
use crate::trace_reader::TraceReader;

/// Raw passes and their averages, keyed by `"<n>_cpus"`.
#[derive(Debug, Default)]
pub struct SweepResults {
    pub data: BTreeMap<String, Vec<Pass>>,
    pub average: BTreeMap<String, BTreeMap<String, f64>>,
}

pub fn cpu_key(cpus: usize) -> String {
    format!("{cpus}_cpus")
}

pub struct Driver<C: TracingController, R: TraceReader> {
    // Field order is drop order: the controller (and the daemon it started)
    // must go before the workspace directory holding the pidfile.
    controller: C,
    kernel: Option<KernelBench>,
    workspace: Workspace,
    tool: BenchmarkTool,
    reader: Option<R>,
    suite: Vec<SuiteEntry>,
    config: BenchConfig,
    interrupted: Arc<AtomicBool>,
}

impl<C: TracingController, R: TraceReader> Driver<C, R> {
    pub fn new(
        tool: BenchmarkTool,
        controller: C,
        workspace: Workspace,
        suite: Vec<SuiteEntry>,
        config: BenchConfig,
    ) -> Self {
        Self {
            controller,
            kernel: None,
            workspace,
            tool,
            reader: None,
            suite,
            config,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Read traces back and record event counts.
    pub fn with_reader(mut self, reader: R) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn with_kernel(mut self, kernel: KernelBench) -> Self {
        self.kernel = Some(kernel);
        self
    }

    pub fn with_interrupt_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupted = flag;
        self
    }

    /// Flag checked between passes; set it from a signal handler.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    fn check_interrupted(&self) -> Result<()> {
        if self.interrupted.load(Ordering::SeqCst) {
            return Err(Error::Interrupted);
        }
        Ok(())
    }

    /// Baseline, instrumented with tracing disabled, instrumented inside an
    /// active session.
    pub fn ust_pass(&mut self, entry: &SuiteEntry) -> Result<Pass> {
        let spec = &entry.spec;
        let base = self.tool.run(&spec.baseline_args())?;
        let ust = self.tool.run(&spec.ust_args())?;

        let session = self.workspace.session_config(
            Domain::Ust,
            vec!["*".to_string()],
            self.reader.is_none(),
        );
        let reader = self.reader.as_mut().map(|r| r as &mut dyn TraceReader);
        let ust_en = self
            .tool
            .run_traced(&spec.ust_args(), &mut self.controller, session, reader)?;

        let measurement =
            stats::ust_measurement(spec, &base, &ust, &ust_en.records, ust_en.event_count)?;
        Ok(Pass {
            name: entry.name.clone(),
            result: PassResult::Ust(measurement),
        })
    }

    /// Every suite entry for its group's pass count, then the kernel
    /// benchmark. A failing kernel benchmark (typically: not root) is logged
    /// and skipped.
    pub fn run_suite(&mut self) -> Result<Vec<Pass>> {
        let suite = self.suite.clone();
        let mut passes = Vec::new();

        for group in [PassGroup::Full, PassGroup::Fast] {
            let count = self.config.passes(group);
            for entry in suite.iter().filter(|e| e.group == group) {
                for i in 0..count {
                    self.check_interrupted()?;
                    info!("{} ({group:?} pass {}/{count})", entry.name, i + 1);
                    passes.push(self.ust_pass(entry)?);
                }
            }
        }

        if let (Some(loops), Some(kernel)) = (self.config.kernel_loops, self.kernel.as_mut()) {
            for _ in 0..self.config.full_passes {
                if self.interrupted.load(Ordering::SeqCst) {
                    return Err(Error::Interrupted);
                }
                match kernel_pass(kernel, &mut self.controller, &mut self.workspace, loops) {
                    Ok(pass) => passes.push(pass),
                    Err(Error::Interrupted) => return Err(Error::Interrupted),
                    Err(e) => {
                        warn!("failed to run kernel benchmark, skipping: {e}");
                        break;
                    }
                }
            }
        }

        Ok(passes)
    }

    fn record(&mut self, cpus: usize, results: &mut SweepResults) -> Result<()> {
        let passes = self.run_suite()?;
        let average = stats::average_passes(&passes)?;
        results.data.insert(cpu_key(cpus), passes);
        results.average.insert(cpu_key(cpus), average);
        Ok(())
    }

    /// Run the suite at every online CPU count from the current one down to
    /// one, or only at the current count when the sweep is disabled. The
    /// original online set is restored afterwards, also on error.
    pub fn sweep(&mut self, cpu: &CpuHotplug) -> Result<SweepResults> {
        let mut results = SweepResults::default();

        if !self.config.cpu_sweep {
            let count = cpu.online_count().unwrap_or_else(|e| {
                warn!("cannot read online CPUs ({e}), using available parallelism");
                std::thread::available_parallelism().map_or(1, |n| n.get())
            });
            self.record(count, &mut results)?;
            return Ok(results);
        }

        let restore = cpu.save_online()?;
        let max = restore.saved().len();
        for count in (1..=max).rev() {
            if let Err(e) = cpu.set_online_count(count) {
                warn!("failed to set CPU count to {count}, skipping: {e}");
                break;
            }
            self.record(count, &mut results)?;
        }
        Ok(results)
    }
}

impl<C: TracingController, R: TraceReader> Drop for Driver<C, R> {
    /// Destroy the run's session by name in case a failure left one behind,
    /// and remove the kernel modules we inserted.
    fn drop(&mut self) {
        let name = self.workspace.session_name().to_string();
        if let Err(e) = self.controller.destroy(&name) {
            debug!("no session {name} left to destroy: {e}");
        }
        if let Some(kernel) = self.kernel.as_mut() {
            if let Err(e) = kernel.unload_modules() {
                warn!("failed to unload kernel modules: {e}");
            }
        }
    }
}

/// Kernel benchmark without tracing, then inside a kernel-domain session
/// enabling the module's tracepoints.
pub fn kernel_pass<C: TracingController + ?Sized>(
    kernel: &mut KernelBench,
    controller: &mut C,
    workspace: &mut Workspace,
    loops: u64,
) -> Result<Pass> {
    let base = kernel.benchmark(loops)?;

    let config = workspace.session_config(Domain::Kernel, kernel.events()?, true);
    let session = Session::begin(controller, config)?;
    let traced = kernel.benchmark(loops)?;
    session.finish()?;

    Ok(Pass {
        name: "kernel".to_string(),
        result: PassResult::Kernel(stats::kernel_measurement(base, traced, loops)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::Profile;
    use crate::kernel::KernelModule;
    use crate::runner::tests::fake_runner;
    use crate::schema::BenchmarkSpec;
    use crate::session::tests::FakeController;
    use crate::trace_reader::Babeltrace;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::{tempdir, TempDir};

    const RUNNER_JSON: &str =
        r#"[{"exec": 0.0, "main": 0.001, "start": 0.001, "end": 0.002}]"#;

    fn config() -> BenchConfig {
        BenchConfig {
            full_passes: 1,
            fast_passes: 2,
            kernel_loops: None,
            ..BenchConfig::new(Profile::Quick)
        }
    }

    fn suite() -> Vec<SuiteEntry> {
        let spec = BenchmarkSpec::new("basic-benchmark", "basic-benchmark-ust");
        vec![
            SuiteEntry::new("basic", PassGroup::Fast, spec.clone()),
            SuiteEntry::new("basic", PassGroup::Full, spec.with_loops(1000)),
        ]
    }

    fn driver(dir: &TempDir, config: BenchConfig) -> Driver<FakeController, Babeltrace> {
        Driver::new(
            fake_runner(dir, RUNNER_JSON),
            FakeController::default(),
            Workspace::new(1).unwrap(),
            suite(),
            config,
        )
    }

    fn fake_kernel(root: &Path, with_time: bool) -> KernelBench {
        let modules = root.join("module");
        fs::create_dir_all(modules.join("lttng_benchmark")).unwrap();
        fs::create_dir_all(modules.join("lttng_benchmark_probe")).unwrap();
        let sysfs = root.join("lttng_benchmark");
        fs::create_dir_all(&sysfs).unwrap();
        if with_time {
            fs::write(sysfs.join("time"), "2000000\n").unwrap();
        }
        fs::write(sysfs.join("events"), "lttng_benchmark_trivial\n").unwrap();
        KernelBench::with_modules(
            KernelModule::new("k/lttng_benchmark.ko").with_sys_module_root(&modules),
            KernelModule::new("k/lttng_benchmark_probe.ko").with_sys_module_root(&modules),
            sysfs,
        )
    }

    fn fake_cpus(online: &str, offline: &str) -> TempDir {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("online"), online).unwrap();
        fs::write(dir.path().join("offline"), offline).unwrap();
        dir
    }

    #[test]
    fn suite_runs_full_group_first_then_fast() {
        let dir = tempdir().unwrap();
        let mut d = driver(&dir, config());

        let passes = d.run_suite().unwrap();

        assert_eq!(passes.len(), 3);
        let PassResult::Ust(first) = &passes[0].result else {
            panic!("expected a UST pass");
        };
        assert_eq!(first.baseline.args, vec!["basic-benchmark", "1000"]);
        assert!(first.tracing_enabled.ns_per_event.is_some());
        let PassResult::Ust(fast) = &passes[2].result else {
            panic!("expected a UST pass");
        };
        assert_eq!(fast.baseline.run_time, None);

        // One traced invocation per pass.
        let creates = d.controller.calls.iter().filter(|c| c.starts_with("create")).count();
        let destroys = d.controller.calls.iter().filter(|c| c.starts_with("destroy")).count();
        assert_eq!((creates, destroys), (3, 3));
        assert_eq!(d.controller.snapshots, vec![true; 3]);
    }

    #[derive(Default)]
    struct CountingReader {
        paths: Vec<PathBuf>,
    }

    impl TraceReader for CountingReader {
        fn count_events(&mut self, trace_path: &Path) -> Result<u64> {
            self.paths.push(trace_path.to_path_buf());
            Ok(1000)
        }
    }

    #[test]
    fn counted_passes_record_to_disk_and_report_events() {
        let dir = tempdir().unwrap();
        let mut d: Driver<FakeController, CountingReader> = Driver::new(
            fake_runner(&dir, RUNNER_JSON),
            FakeController::default(),
            Workspace::new(1).unwrap(),
            suite(),
            config(),
        )
        .with_reader(CountingReader::default());

        let pass = d.ust_pass(&suite()[1]).unwrap();

        assert_eq!(d.controller.snapshots, vec![false]);
        let reader = d.reader.as_ref().unwrap();
        assert_eq!(reader.paths.len(), 1);
        assert!(reader.paths[0].starts_with(d.workspace().path()));

        let PassResult::Ust(m) = &pass.result else {
            panic!("expected a UST pass");
        };
        assert_eq!(m.tracing_enabled.event_count, Some(1000));
        assert_eq!(m.tracing_disabled.event_count, None);

        let avg = stats::average_passes(&[pass]).unwrap();
        assert_eq!(avg["basic.tracing_enabled.event_count"], 1000.0);
        assert!(!avg.contains_key("basic.tracing_disabled.event_count"));
    }

    #[test]
    fn dropping_the_driver_destroys_the_run_session() {
        let dir = tempdir().unwrap();
        let mut ctl = FakeController::default();
        let name = {
            let mut d: Driver<&mut FakeController, Babeltrace> = Driver::new(
                fake_runner(&dir, RUNNER_JSON),
                &mut ctl,
                Workspace::new(1).unwrap(),
                suite(),
                config(),
            );
            d.run_suite().unwrap();
            d.workspace().session_name().to_string()
        };

        let destroys = ctl.calls.iter().filter(|c| c.starts_with("destroy")).count();
        assert_eq!(destroys, 4);
        assert_eq!(ctl.calls.last(), Some(&format!("destroy {name}")));
    }

    #[test]
    fn failed_session_setup_is_cleaned_up_at_the_end_of_the_run() {
        let dir = tempdir().unwrap();
        let mut ctl = FakeController {
            fail_on: Some("create"),
            ..Default::default()
        };
        {
            let mut d: Driver<&mut FakeController, Babeltrace> = Driver::new(
                fake_runner(&dir, RUNNER_JSON),
                &mut ctl,
                Workspace::new(1).unwrap(),
                suite(),
                config(),
            );
            assert!(d.run_suite().is_err());
        }
        assert_eq!(ctl.calls.len(), 2);
        assert!(ctl.calls[0].starts_with("create "));
        assert!(ctl.calls[1].starts_with("destroy "));
    }

    #[test]
    fn interrupted_suite_stops_before_the_next_pass() {
        let dir = tempdir().unwrap();
        let mut d = driver(&dir, config());
        d.interrupt_flag().store(true, Ordering::SeqCst);

        assert!(matches!(d.run_suite(), Err(Error::Interrupted)));
        assert!(d.controller.calls.is_empty());
    }

    #[test]
    fn kernel_pass_traces_module_events() {
        let dir = tempdir().unwrap();
        let mut kernel = fake_kernel(dir.path(), true);
        let mut ctl = FakeController::default();
        let mut ws = Workspace::new(1).unwrap();

        let pass = kernel_pass(&mut kernel, &mut ctl, &mut ws, 1000).unwrap();

        assert_eq!(pass.name, "kernel");
        let PassResult::Kernel(m) = pass.result else {
            panic!("expected a kernel pass");
        };
        assert_eq!(m.baseline.run_time, 2.0);
        assert_eq!(m.tracing_enabled.ns_per_event, 0.0);
        assert_eq!(ctl.calls.len(), 4);
    }

    #[test]
    fn failing_kernel_benchmark_is_skipped() {
        let dir = tempdir().unwrap();
        let cfg = BenchConfig {
            kernel_loops: Some(1000),
            ..config()
        };
        let mut d = driver(&dir, cfg).with_kernel(fake_kernel(dir.path(), false));

        let passes = d.run_suite().unwrap();
        assert_eq!(passes.len(), 3);
        assert!(passes.iter().all(|p| p.name == "basic"));
    }

    #[test]
    fn kernel_passes_follow_the_suite() {
        let dir = tempdir().unwrap();
        let cfg = BenchConfig {
            kernel_loops: Some(1000),
            ..config()
        };
        let mut d = driver(&dir, cfg).with_kernel(fake_kernel(dir.path(), true));

        let passes = d.run_suite().unwrap();
        assert_eq!(passes.len(), 4);
        assert_eq!(passes[3].name, "kernel");
    }

    #[test]
    fn without_sweep_results_are_keyed_by_current_count() {
        let dir = tempdir().unwrap();
        let cpus = fake_cpus("0-1\n", "\n");
        let cfg = BenchConfig {
            cpu_sweep: false,
            ..config()
        };
        let mut d = driver(&dir, cfg);

        let results = d.sweep(&CpuHotplug::with_root(cpus.path())).unwrap();

        assert_eq!(results.data.keys().collect::<Vec<_>>(), vec!["2_cpus"]);
        let avg = &results.average["2_cpus"];
        assert!(avg.contains_key("basic.baseline.start_time"));
        assert!(avg.contains_key("basic.tracing_enabled.ns_per_event"));
    }

    #[test]
    fn sweep_stops_at_first_count_that_cannot_be_set() {
        let dir = tempdir().unwrap();
        // No cpuN directories: taking CPU 1 offline fails.
        let cpus = fake_cpus("0-1\n", "\n");
        let mut d = driver(&dir, config());

        let results = d.sweep(&CpuHotplug::with_root(cpus.path())).unwrap();

        assert_eq!(results.data.keys().collect::<Vec<_>>(), vec!["2_cpus"]);
        assert_eq!(results.data["2_cpus"].len(), 3);
    }
}
