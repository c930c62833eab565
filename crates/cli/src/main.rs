//! Regression-run CLI for hardware simulators.
//!
//! This binary is the single entry point for batch simulation runs. It performs:
//! 1. **Testlist loading:** Parse a JSON testlist into run descriptors.
//! 2. **Backend selection:** Pick a simulator backend and skip tests that exclude it.
//! 3. **Scheduling:** Run everything with bounded parallelism; the exit code is the
//!    number of failed tests (clamped to 255).

use clap::Parser;
use std::path::PathBuf;
use std::process;

use simrun_core::config::SchedulerConfig;
use simrun_core::sched::{RunReport, Scheduler};
use simrun_core::sim::Simulator;
use simrun_core::testlist::Testlist;

#[derive(Parser, Debug)]
#[command(
    name = "simrun",
    author,
    version,
    about = "Run simulator regression testlists with bounded parallelism",
    long_about = "Run every test in a JSON testlist on a simulator backend and report\npass/fail against each test's expected return code.\n\nThe exit code is the number of failed tests, clamped to 255, so the harness\ncomposes with make and shell conditionals.\n\nExamples:\n  simrun testlists/smoke.json\n  simrun testlists/nightly.json --simulator spike -j 8\n  simrun testlists/nightly.json -j --early-exit --verbose\n  simrun testlists/smoke.json --dry-run"
)]
struct Cli {
    /// Testlist describing the runs (JSON).
    testlist: PathBuf,

    /// Simulator backend to run the tests on.
    #[arg(short, long, default_value = "verilator")]
    simulator: String,

    /// Simulator executable; defaults to bin/sim.<simulator>.
    #[arg(long)]
    sim_bin: Option<PathBuf>,

    /// Directory that receives one run directory per test.
    #[arg(long, default_value = "runs")]
    run_dir: PathBuf,

    /// Print each command without launching anything.
    #[arg(long)]
    dry_run: bool,

    /// Abandon pending tests after the first failure.
    #[arg(long)]
    early_exit: bool,

    /// Dump the simulator log of every failing test.
    #[arg(short, long)]
    verbose: bool,

    /// Simulations to keep in flight; bare -j uses every core.
    #[arg(
        short = 'j',
        long = "jobs",
        num_args = 0..=1,
        default_missing_value = "0",
        default_value_t = 1
    )]
    jobs: usize,
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    match run(cli) {
        Ok(report) => process::exit(report.failure_count().min(255) as i32),
        Err(err) => {
            eprintln!("[!] {err}");
            process::exit(2);
        }
    }
}

fn run(cli: Cli) -> simrun_core::Result<RunReport> {
    let testlist = Testlist::load(&cli.testlist)?;
    let simulator = Simulator::by_name(&cli.simulator, cli.sim_bin.clone())?;

    let mut queue = Vec::new();
    let mut skipped = 0usize;
    for test in &testlist.runs {
        if !simulator.supports(test) {
            println!(
                "[*] skipping {}: not listed for {}",
                test.display_name(),
                simulator.name()
            );
            skipped += 1;
            continue;
        }
        queue.push(simulator.get_simulation(test, &cli.run_dir));
    }
    if queue.is_empty() {
        println!("[*] nothing to run ({skipped} skipped)");
        return Ok(RunReport {
            skipped,
            ..RunReport::default()
        });
    }

    let parallelism = if cli.jobs == 0 {
        num_cpus::get()
    } else {
        cli.jobs
    };
    let config = SchedulerConfig {
        parallelism,
        early_exit: cli.early_exit,
        dry_run: cli.dry_run,
        verbose: cli.verbose,
        ..SchedulerConfig::default()
    };

    let mut report = Scheduler::new(config).run(queue)?;
    report.skipped = skipped;
    Ok(report)
}

/// Routes log records to stderr so stdout stays machine-readable.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
