//! Simulation lifecycle and backend-specific status rules.
//!
//! One [`Simulation`] is one execution of a tested binary under a simulator
//! backend. This module provides:
//! 1. **Lifecycle:** NotLaunched → Launched → Completed, with an orthogonal
//!    "interrupted" flag that pins `completed()` to false until teardown.
//! 2. **Status rules:** how the application exit code is resolved per
//!    backend family (process exit vs log scraping, with custom-command
//!    external verification).
//! 3. **Timing:** extraction of simulated time and CPU time from
//!    vendor-specific log lines.
//!
//! Log-scraping sentinels follow the testbench convention: a line containing
//! `[SUCCESS]` means the program exited 0; a line containing `[FAILURE]`
//! carries the real code after `exit code`. A nonzero exit of the simulator
//! process itself always overrides whatever the log says.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::defaults;
use crate::error::{FailReason, HarnessError, Result};

/// How a simulation's application exit code is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetcodeSource {
    /// The simulator forwards the program's exit code as its own.
    ProcessExit,
    /// The program's code only appears in the log; scrape the sentinels.
    LogScrape,
}

/// Which vendor's log carries the timing lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFormat {
    /// `Time: <n> <unit>` plus `Elapsed time: H:M:S`.
    Questa,
    /// `Time: <n> <unit>` plus `CPU Time: <secs> seconds`.
    Vcs,
}

/// One test execution instance.
#[derive(Debug)]
pub struct Simulation {
    name: String,
    argv: Vec<String>,
    run_dir: PathBuf,
    log_path: PathBuf,
    env: Vec<(String, String)>,
    expected_retcode: i32,
    retcode_source: RetcodeSource,
    time_format: Option<TimeFormat>,
    external_verification: bool,
    child: Option<Child>,
    exit_status: Option<ExitStatus>,
    interrupted: bool,
    dry_run: bool,
    launched: bool,
    started_at: Option<Instant>,
}

impl Simulation {
    /// Creates a not-yet-launched simulation.
    ///
    /// `argv` is fully resolved; `launch` substitutes nothing.
    pub fn new(
        name: String,
        argv: Vec<String>,
        run_dir: PathBuf,
        expected_retcode: i32,
        retcode_source: RetcodeSource,
    ) -> Self {
        let log_path = run_dir.join(defaults::LOG_FILE);
        Self {
            name,
            argv,
            run_dir,
            log_path,
            env: Vec::new(),
            expected_retcode,
            retcode_source,
            time_format: None,
            external_verification: false,
            child: None,
            exit_status: None,
            interrupted: false,
            dry_run: false,
            launched: false,
            started_at: None,
        }
    }

    /// Selects the vendor timing format scraped from the log.
    pub fn with_time_format(mut self, format: TimeFormat) -> Self {
        self.time_format = Some(format);
        self
    }

    /// Marks the command as carrying its own verification logic.
    ///
    /// Only meaningful for the log-scraping family: the command's exit code
    /// becomes authoritative and the sentinels are ignored.
    pub fn with_external_verification(mut self) -> Self {
        self.external_verification = true;
        self
    }

    /// Adds an environment override for the subprocess.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Launches the simulation.
    ///
    /// With `dry_run` the simulation moves straight to a successful no-op
    /// state and nothing is spawned. Otherwise the run directory is created,
    /// the log file opened, and the subprocess spawned inside the run
    /// directory with stdout and stderr merged into the log. Spawn failures
    /// abort the whole run.
    pub fn launch(&mut self, dry_run: bool) -> Result<()> {
        if self.launched || self.dry_run {
            return Ok(());
        }
        self.started_at = Some(Instant::now());
        if dry_run {
            self.dry_run = true;
            debug!(name = %self.name, argv = ?self.argv, "dry run, not spawning");
            return Ok(());
        }

        fs::create_dir_all(&self.run_dir).map_err(|source| self.launch_error(source))?;
        let log = File::create(&self.log_path).map_err(|source| self.launch_error(source))?;
        let log_err = log.try_clone().map_err(|source| self.launch_error(source))?;

        let Some((program, args)) = self.argv.split_first() else {
            return Err(self.launch_error(io::Error::new(
                io::ErrorKind::InvalidInput,
                "empty command line",
            )));
        };
        let mut command = Command::new(program);
        let _ = command
            .args(args)
            // Anything the simulator writes with a relative path (waveforms,
            // coverage databases) lands in the run directory.
            .current_dir(&self.run_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));
        for (key, value) in &self.env {
            let _ = command.env(key, value);
        }

        let child = command.spawn().map_err(|source| self.launch_error(source))?;
        debug!(name = %self.name, pid = child.id(), "launched");
        self.child = Some(child);
        self.launched = true;
        Ok(())
    }

    fn launch_error(&self, source: io::Error) -> HarnessError {
        HarnessError::Launch {
            name: self.name.clone(),
            source,
        }
    }

    /// True once the subprocess has exited and the simulation was not
    /// interrupted. Dry runs complete immediately. Non-blocking.
    pub fn completed(&mut self) -> bool {
        if self.dry_run {
            return true;
        }
        if self.interrupted {
            return false;
        }
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        if self.exit_status.is_none() {
            match child.try_wait() {
                Ok(Some(status)) => self.exit_status = Some(status),
                Ok(None) => {}
                Err(err) => warn!(name = %self.name, %err, "try_wait failed"),
            }
        }
        self.exit_status.is_some()
    }

    /// Marks the simulation interrupted.
    ///
    /// An interrupted simulation never reports completion; the scheduler
    /// records it as aborted and relies on the process-group sweep for the
    /// subprocess itself. No-op before launch.
    pub fn interrupt(&mut self) {
        if self.launched {
            self.interrupted = true;
        }
    }

    /// Resolved application exit code.
    ///
    /// `None` until the simulation completes, when the process died to a
    /// signal, or when a log-scraping run produced no sentinel.
    pub fn retcode(&self) -> Option<i32> {
        if self.dry_run {
            return Some(0);
        }
        let status = self.exit_status?;
        match self.retcode_source {
            RetcodeSource::ProcessExit => status.code(),
            RetcodeSource::LogScrape => {
                if self.external_verification {
                    return status.code();
                }
                match status.code() {
                    // Simulator exited cleanly; the application code is in the log.
                    Some(0) => self.scrape_retcode(),
                    // A nonzero simulator exit overrides anything scraped.
                    Some(code) => Some(code),
                    None => None,
                }
            }
        }
    }

    /// Backend-specific success rule.
    ///
    /// Dry runs are successful. Otherwise the resolved code must match the
    /// expectation, and a log-scraping run without external verification
    /// additionally requires the simulator process itself to have exited 0.
    pub fn successful(&self) -> bool {
        if self.dry_run {
            return true;
        }
        if self.interrupted {
            return false;
        }
        let matches = self.retcode() == Some(self.expected_retcode);
        match self.retcode_source {
            RetcodeSource::ProcessExit => matches,
            RetcodeSource::LogScrape => {
                if self.external_verification {
                    matches
                } else {
                    matches && self.simulator_status() == Some(0)
                }
            }
        }
    }

    /// Why this simulation failed; meaningful only when `successful()` is
    /// false.
    pub fn failure_reason(&self) -> FailReason {
        if self.interrupted {
            return FailReason::Aborted;
        }
        if let Some(status) = self.simulator_status() {
            let crashed_but_matching = status != 0
                && self.retcode_source == RetcodeSource::LogScrape
                && !self.external_verification
                && self.retcode() == Some(self.expected_retcode);
            if crashed_but_matching {
                return FailReason::SimulatorExit { status };
            }
        }
        FailReason::Retcode {
            got: self.retcode(),
            expected: self.expected_retcode,
        }
    }

    /// Simulated time in nanoseconds, scraped from the log.
    ///
    /// Scans from the end so that the final report line wins over earlier
    /// warnings that happen to mention a time.
    pub fn simulation_time(&self) -> Option<f64> {
        let _ = self.time_format?;
        let text = fs::read_to_string(&self.log_path).ok()?;
        text.lines().rev().find_map(parse_time_ns)
    }

    /// Host CPU time in seconds, scraped from the log.
    pub fn cpu_time(&self) -> Option<f64> {
        let format = self.time_format?;
        let text = fs::read_to_string(&self.log_path).ok()?;
        match format {
            TimeFormat::Questa => text.lines().rev().find_map(parse_elapsed_seconds),
            TimeFormat::Vcs => text.lines().rev().find_map(parse_cpu_seconds),
        }
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully resolved command line.
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Run directory holding the log and artifacts.
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Path of the merged stdout/stderr log.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Expected application exit code.
    pub fn expected_retcode(&self) -> i32 {
        self.expected_retcode
    }

    /// How this simulation's application exit code is resolved.
    pub fn retcode_source(&self) -> RetcodeSource {
        self.retcode_source
    }

    /// Vendor timing format scraped from the log, if any.
    pub fn time_format(&self) -> Option<TimeFormat> {
        self.time_format
    }

    /// True when the command carries its own verification logic.
    pub fn externally_verified(&self) -> bool {
        self.external_verification
    }

    /// Wall-clock time since launch.
    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at.map(|at| at.elapsed())
    }

    /// The simulator process's own exit code, if it exited normally.
    fn simulator_status(&self) -> Option<i32> {
        self.exit_status.and_then(|status| status.code())
    }

    /// First sentinel in the log, if any.
    fn scrape_retcode(&self) -> Option<i32> {
        let text = fs::read_to_string(&self.log_path).ok()?;
        text.lines().find_map(parse_sentinel)
    }
}

/// Parses a testbench result sentinel out of one log line.
///
/// `[SUCCESS]` resolves to 0; `[FAILURE] ... exit code <n>` resolves to `n`.
pub fn parse_sentinel(line: &str) -> Option<i32> {
    if line.contains("[SUCCESS]") {
        return Some(0);
    }
    if line.contains("[FAILURE]") {
        let rest = line.split("exit code").nth(1)?;
        return rest.split_whitespace().next()?.parse().ok();
    }
    None
}

/// Parses a `Time: <n> <unit>` line into nanoseconds.
///
/// Accepts ps, ns and us; any other unit (including the "seconds" of a CPU
/// time line) does not match.
pub fn parse_time_ns(line: &str) -> Option<f64> {
    let rest = line.split("Time:").nth(1)?;
    let mut fields = rest.split_whitespace();
    let value: f64 = fields.next()?.parse().ok()?;
    let scale = match fields.next()? {
        "ps" => 1e-3,
        "ns" => 1.0,
        "us" => 1e3,
        _ => return None,
    };
    Some(value * scale)
}

/// Parses a Questa `Elapsed time: H:M:S` line into seconds.
pub fn parse_elapsed_seconds(line: &str) -> Option<f64> {
    let rest = line.split("Elapsed time:").nth(1)?;
    let clock = rest.split_whitespace().next()?;
    let mut parts = clock.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Parses a VCS `CPU Time: <secs> seconds` line into seconds.
pub fn parse_cpu_seconds(line: &str) -> Option<f64> {
    let rest = line.split("CPU Time:").nth(1)?;
    rest.split_whitespace().next()?.parse().ok()
}
