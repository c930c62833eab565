//! Bounded-parallelism scheduling of simulations.
//!
//! The scheduler drives an ordered queue of [`Simulation`]s to completion.
//! It provides:
//! 1. **Control loop:** a single thread launches up to P simulations,
//!    retires completed ones, and sleeps a short fixed interval in between;
//!    parallelism comes from the live subprocesses, never from scheduler
//!    threads.
//! 2. **Failure policy:** a failed simulation never aborts its siblings
//!    unless `early_exit` is set, in which case pending simulations are
//!    abandoned while running ones finish naturally.
//! 3. **Interruption and cleanup:** SIGINT/SIGTERM cancel the run through a
//!    run-scoped guard; any cut-short run ends with a sweep that kills every
//!    process left in the scheduler's process group.

/// Cancellation flag and run-scoped signal registration.
pub mod interrupt;

/// Process-group leadership and the cleanup sweep.
pub mod pgroup;

pub use interrupt::{CancelFlag, SignalGuard};

use std::collections::VecDeque;
use std::fs;
use std::io::IsTerminal;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::error::{FailReason, Failure, Result};
use crate::sim::Simulation;

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Outcome of one scheduler run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Number of simulations queued.
    pub total: usize,
    /// Simulations that completed successfully.
    pub passed: usize,
    /// Simulations abandoned before launch (early exit or interrupt).
    pub abandoned: usize,
    /// Descriptors excluded before the run (unsupported backend). Recorded
    /// by the caller that did the filtering; the scheduler starts it at
    /// zero. Skips are not failures.
    pub skipped: usize,
    /// One record per unsuccessful simulation.
    pub failures: Vec<Failure>,
    /// True when the run stopped on an external interrupt.
    pub interrupted: bool,
    /// Wall-clock duration of the whole run.
    pub duration: Duration,
}

impl RunReport {
    /// Number of failed simulations; becomes the process exit code.
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// True when every queued simulation ran and passed.
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty() && self.abandoned == 0
    }
}

/// The bounded-concurrency driver.
#[derive(Debug)]
pub struct Scheduler {
    config: SchedulerConfig,
}

impl Scheduler {
    /// Creates a scheduler with the given policy.
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    /// Runs the queue with SIGINT/SIGTERM wired to cancellation.
    ///
    /// Signal registration lasts exactly as long as this call; previous
    /// dispositions are restored on return.
    pub fn run(&self, queue: Vec<Simulation>) -> Result<RunReport> {
        let cancel = CancelFlag::new();
        let _guard = SignalGuard::install(&cancel)?;
        self.run_with_cancel(queue, &cancel)
    }

    /// Runs the queue under an externally controlled cancellation flag.
    pub fn run_with_cancel(
        &self,
        queue: Vec<Simulation>,
        cancel: &CancelFlag,
    ) -> Result<RunReport> {
        if self.config.sweep_process_group {
            pgroup::ensure_group_leader()?;
        }
        let started = Instant::now();
        let color = std::io::stdout().is_terminal();
        let bound = self.config.bound();
        let total = queue.len();
        info!(
            total,
            parallelism = bound,
            dry_run = self.config.dry_run,
            "run starting"
        );

        let mut pending: VecDeque<Simulation> = queue.into();
        let mut running: Vec<Simulation> = Vec::new();
        let mut passed = 0usize;
        let mut abandoned = 0usize;
        let mut failures: Vec<Failure> = Vec::new();
        let mut launching = true;

        while (!pending.is_empty() || !running.is_empty()) && !cancel.is_cancelled() {
            while launching && running.len() < bound {
                let Some(mut sim) = pending.pop_front() else {
                    break;
                };
                if let Err(err) = sim.launch(self.config.dry_run) {
                    // A spawn failure aborts the run; take the group down
                    // with us so running simulations are not orphaned.
                    for live in &mut running {
                        live.interrupt();
                    }
                    if self.config.sweep_process_group {
                        let _ = pgroup::kill_group_members_except_self();
                    }
                    return Err(err);
                }
                if self.config.dry_run {
                    println!("[*] would run {}: {}", sim.name(), sim.argv().join(" "));
                }
                running.push(sim);
            }

            let mut retired = 0usize;
            let mut index = 0;
            while index < running.len() {
                if running[index].completed() {
                    let sim = running.swap_remove(index);
                    retired += 1;
                    let failed = self.retire(&sim, color, &mut passed, &mut failures);
                    if failed && self.config.early_exit && launching {
                        launching = false;
                        abandoned += pending.len();
                        pending.clear();
                        info!("early exit: abandoning pending simulations");
                    }
                } else {
                    index += 1;
                }
            }

            if pending.is_empty() && running.is_empty() {
                break;
            }
            if retired == 0 {
                thread::sleep(self.config.poll_interval());
            }
        }

        let interrupted = cancel.is_cancelled();
        if interrupted {
            warn!(
                running = running.len(),
                pending = pending.len(),
                "interrupted, aborting run"
            );
            abandoned += pending.len();
            pending.clear();
            for mut sim in running.drain(..) {
                sim.interrupt();
                let reason = FailReason::Aborted;
                println!("[!] {}  {}: {}", colored("FAILED", RED, color), sim.name(), reason);
                failures.push(Failure {
                    name: sim.name().to_owned(),
                    reason,
                });
            }
        }

        if (interrupted || !launching) && self.config.sweep_process_group {
            let swept = pgroup::kill_group_members_except_self();
            if swept > 0 {
                info!(swept, "killed leftover processes in the group");
            }
        }

        let report = RunReport {
            total,
            passed,
            abandoned,
            skipped: 0,
            failures,
            interrupted,
            duration: started.elapsed(),
        };
        self.print_summary(&report, color);
        Ok(report)
    }

    /// Prints one status line for a completed simulation and records it.
    /// Returns true when the simulation failed.
    fn retire(
        &self,
        sim: &Simulation,
        color: bool,
        passed: &mut usize,
        failures: &mut Vec<Failure>,
    ) -> bool {
        if sim.successful() {
            *passed += 1;
            let mut parts = Vec::new();
            if let Some(ns) = sim.simulation_time() {
                parts.push(format!("sim {}", format_sim_time(ns)));
            }
            if let Some(secs) = sim.cpu_time() {
                parts.push(format!("cpu {secs:.1} s"));
            }
            let timing = if parts.is_empty() {
                String::new()
            } else {
                format!("  ({})", parts.join(", "))
            };
            println!(
                "[*] {}  {}{}",
                colored("PASSED", GREEN, color),
                sim.name(),
                timing
            );
            debug!(name = %sim.name(), "retired");
            false
        } else {
            let reason = sim.failure_reason();
            println!(
                "[!] {}  {}: {}",
                colored("FAILED", RED, color),
                sim.name(),
                reason
            );
            if self.config.verbose {
                dump_log(sim);
            }
            failures.push(Failure {
                name: sim.name().to_owned(),
                reason,
            });
            true
        }
    }

    fn print_summary(&self, report: &RunReport, color: bool) {
        println!("==================================================");
        if report.all_passed() && !report.interrupted {
            println!(
                "[*] {}: {}/{} simulations passed in {:.1} s",
                colored("PASSED", GREEN, color),
                report.passed,
                report.total,
                report.duration.as_secs_f64()
            );
        } else {
            println!(
                "[!] {}: {} of {} simulations failed ({} passed, {} abandoned) in {:.1} s",
                colored("FAILED", RED, color),
                report.failure_count(),
                report.total,
                report.passed,
                report.abandoned,
                report.duration.as_secs_f64()
            );
            for failure in &report.failures {
                println!("[!]   {failure}");
            }
        }
        println!("==================================================");
    }
}

fn dump_log(sim: &Simulation) {
    match fs::read_to_string(sim.log_path()) {
        Ok(text) => {
            println!("----- {} -----", sim.log_path().display());
            print!("{text}");
            if !text.ends_with('\n') {
                println!();
            }
            println!("-----");
        }
        Err(err) => warn!(log = %sim.log_path().display(), %err, "cannot read log"),
    }
}

fn colored(label: &str, color: &str, enable: bool) -> String {
    if enable {
        format!("{color}{label}{RESET}")
    } else {
        label.to_owned()
    }
}

fn format_sim_time(ns: f64) -> String {
    if ns >= 1e9 {
        format!("{:.2} s", ns / 1e9)
    } else if ns >= 1e6 {
        format!("{:.2} ms", ns / 1e6)
    } else if ns >= 1e3 {
        format!("{:.2} us", ns / 1e3)
    } else {
        format!("{ns:.0} ns")
    }
}
