use clap::{Parser, ValueEnum};
use log::{error, info, warn};
use lttng_ust_bench::cpu::CpuHotplug;
use lttng_ust_bench::driver::Driver;
use lttng_ust_bench::flatten::{flatten_serialize, IndexStyle};
use lttng_ust_bench::harness::{default_suite, load_suite, BenchConfig, Profile};
use lttng_ust_bench::kernel::KernelBench;
use lttng_ust_bench::output::{write_json, write_plot_properties, write_properties_text};
use lttng_ust_bench::platform::platform_info;
use lttng_ust_bench::runner::BenchmarkTool;
use lttng_ust_bench::schema::{BenchReport, RunMeta};
use lttng_ust_bench::session::{LttngCli, SessionDaemon, Workspace};
use lttng_ust_bench::trace_reader::Babeltrace;
use lttng_ust_bench::{Error, Result};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProfileArg {
    Quick,
    Full,
}

impl From<ProfileArg> for Profile {
    fn from(v: ProfileArg) -> Self {
        match v {
            ProfileArg::Quick => Profile::Quick,
            ProfileArg::Full => Profile::Full,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "lttng-ust-bench")]
#[command(about = "Measure LTTng-UST tracing overhead (JSON + plot property output)")]
struct Args {
    /// Pass counts preset (quick: 1 looping / 2 start-up passes).
    #[arg(long, value_enum, default_value_t = ProfileArg::Quick)]
    profile: ProfileArg,

    /// Override the number of passes of looping benchmarks.
    #[arg(long)]
    full_passes: Option<usize>,

    /// Override the number of passes of start-up-only benchmarks.
    #[arg(long)]
    fast_passes: Option<usize>,

    /// Runner binary spawning the benchmark programs.
    #[arg(long, value_name = "PATH", default_value = "./lttng-ust-benchmarks")]
    runner: PathBuf,

    /// JSON suite definition replacing the built-in benchmarks.
    #[arg(long, value_name = "FILE")]
    suite: Option<PathBuf>,

    /// Directory receiving one `<key>.properties` file per averaged value.
    #[arg(long, value_name = "DIR", default_value = "./jenkins_plot_data")]
    props_dir: PathBuf,

    /// Where to write the full JSON results.
    #[arg(long, value_name = "FILE", default_value = "./benchmarks.json")]
    json_out: PathBuf,

    /// Also write every result as `path = value` lines to this file.
    #[arg(long, value_name = "FILE")]
    properties_file: Option<PathBuf>,

    /// Only benchmark at the current online CPU count.
    #[arg(long, default_value_t = false)]
    no_cpu_sweep: bool,

    /// Skip the kernel tracer benchmark.
    #[arg(long, default_value_t = false)]
    no_kernel: bool,

    #[arg(long, value_name = "DIR", default_value = "kernel-benchmark")]
    kernel_module_dir: PathBuf,

    #[arg(long, default_value_t = 1_000_000)]
    kernel_loops: u64,

    /// Record traces to disk and count their events after each traced run.
    #[arg(long, default_value_t = false)]
    count_events: bool,

    #[arg(long, value_name = "PATH", default_value = "babeltrace2")]
    babeltrace: PathBuf,

    #[arg(long, value_name = "PATH", default_value = "lttng")]
    lttng: PathBuf,

    #[arg(long, value_name = "PATH", default_value = "lttng-sessiond")]
    sessiond: PathBuf,

    /// Seed for the session name; 0 picks one at random.
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn now_utc() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("unix:{secs}")
}

fn git_sha_short() -> Option<String> {
    std::env::var("GIT_SHA")
        .ok()
        .or_else(|| std::env::var("GITHUB_SHA").ok())
        .map(|s| s.chars().take(12).collect())
}

fn bench_config(args: &Args) -> BenchConfig {
    let mut cfg = BenchConfig::new(args.profile.into());
    if let Some(n) = args.full_passes {
        cfg.full_passes = n;
    }
    if let Some(n) = args.fast_passes {
        cfg.fast_passes = n;
    }
    cfg.kernel_loops = (!args.no_kernel).then_some(args.kernel_loops);
    cfg.cpu_sweep = !args.no_cpu_sweep;
    cfg.count_events = args.count_events;
    cfg.seed = args.seed;
    cfg
}

fn run(args: &Args, interrupted: Arc<AtomicBool>) -> Result<()> {
    let cfg = bench_config(args);
    let suite = match &args.suite {
        Some(path) => load_suite(path)?,
        None => default_suite(),
    };

    let workspace = Workspace::new(cfg.seed)?;
    info!(
        "session {} in {}",
        workspace.session_name(),
        workspace.path().display()
    );
    let daemon = SessionDaemon::new(&args.lttng, &args.sessiond, workspace.pidfile());
    let controller = LttngCli::new(&args.lttng, daemon);

    let mut driver: Driver<LttngCli, Babeltrace> = Driver::new(
        BenchmarkTool::new(&args.runner),
        controller,
        workspace,
        suite,
        cfg.clone(),
    )
    .with_interrupt_flag(interrupted);
    if cfg.count_events {
        driver = driver.with_reader(Babeltrace::new(&args.babeltrace));
    }
    if cfg.kernel_loops.is_some() {
        driver = driver.with_kernel(KernelBench::new(&args.kernel_module_dir));
    }

    let results = driver.sweep(&CpuHotplug::default())?;
    // Stop the daemon and remove traces before writing results.
    drop(driver);

    let report = BenchReport {
        run: RunMeta {
            schema_version: 1,
            bench_version: env!("CARGO_PKG_VERSION").to_string(),
            profile: cfg.profile.as_str().to_string(),
            full_passes: cfg.full_passes,
            fast_passes: cfg.fast_passes,
            timestamp_utc: now_utc(),
            git_sha: git_sha_short(),
        },
        data: results.data,
        average: results.average,
        platform: platform_info(),
    };

    write_plot_properties(
        &flatten_serialize(&report.average, IndexStyle::Dotted)?,
        &args.props_dir,
    )?;
    write_json(&report, &args.json_out)?;
    if let Some(path) = &args.properties_file {
        write_properties_text(&flatten_serialize(&report, IndexStyle::Bracketed)?, path)?;
    }
    info!("results written to {}", args.json_out.display());
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        error!("failed to install Ctrl-C handler: {e}");
        return ExitCode::FAILURE;
    }

    match run(&args, Arc::clone(&interrupted)) {
        Ok(()) => ExitCode::SUCCESS,
        // SIGINT also reaches the benchmark child, so whatever failed first
        // is a consequence of the interrupt.
        Err(e) if matches!(e, Error::Interrupted) || interrupted.load(Ordering::SeqCst) => {
            warn!("interrupted ({e}), results discarded");
            ExitCode::from(130)
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
