use clap::error::ErrorKind;
use clap::Parser;
use log::error;
use lttng_ust_bench::tpgen::{self, DEFAULT_SEED, HEADER_FILE};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "tpgen")]
#[command(about = "Generate random LTTng-UST tracepoint definitions")]
struct Args {
    /// Number of tracepoints to generate.
    num_tp: usize,

    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// Directory receiving the `.tp` files and the aggregating header.
    #[arg(long, short = 'o', value_name = "DIR", default_value = ".")]
    out_dir: PathBuf,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(1);
        }
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let tracepoints = tpgen::generate(args.num_tp, args.seed);
    if let Err(e) = tpgen::write_all(&args.out_dir, &tracepoints) {
        error!("writing to {}: {e}", args.out_dir.display());
        return ExitCode::FAILURE;
    }

    eprintln!(
        "Wrote {} tracepoint definitions and {} to {}",
        tracepoints.len(),
        HEADER_FILE,
        args.out_dir.display()
    );
    ExitCode::SUCCESS
}
