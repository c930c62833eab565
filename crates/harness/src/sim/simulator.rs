//! Simulator backends and descriptor resolution.
//!
//! A [`Simulator`] is a named factory that turns a [`TestDescriptor`] into a
//! concrete [`Simulation`]. The backend set is closed and small:
//!
//! * `verilator`, `spike` — direct invocation; the simulator's exit code is
//!   the program's exit code.
//! * `questa`, `vcs` — log scraping; the program's code only appears in the
//!   log, each with its own timing-line flavor.
//!
//! A descriptor's custom command replaces the default two-argument
//! invocation; on the log-scraping family it is taken to perform its own
//! verification.

use std::path::{Path, PathBuf};

use crate::error::{HarnessError, Result};
use crate::sim::simulation::{RetcodeSource, Simulation, TimeFormat};
use crate::testlist::TestDescriptor;

/// Placeholder replaced by the simulator binary path in command templates.
pub const PLACEHOLDER_SIM_BIN: &str = "{sim_bin}";
/// Placeholder replaced by the program binary path in command templates.
pub const PLACEHOLDER_ELF: &str = "{elf}";
/// Placeholder replaced by the run directory in command templates.
pub const PLACEHOLDER_RUN_DIR: &str = "{run_dir}";

/// The closed set of known backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatorKind {
    /// Verilated testbench binary.
    Verilator,
    /// Instruction-set simulator.
    Spike,
    /// Questa `vsim` in batch mode.
    Questa,
    /// Synopsys VCS simv.
    Vcs,
}

impl SimulatorKind {
    /// Every registered backend, in preference order.
    pub const ALL: [Self; 4] = [Self::Verilator, Self::Spike, Self::Questa, Self::Vcs];

    /// Backend name as used in testlists and on the CLI.
    pub fn name(self) -> &'static str {
        match self {
            Self::Verilator => "verilator",
            Self::Spike => "spike",
            Self::Questa => "questa",
            Self::Vcs => "vcs",
        }
    }

    /// Looks a backend up by name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    fn retcode_source(self) -> RetcodeSource {
        match self {
            Self::Verilator | Self::Spike => RetcodeSource::ProcessExit,
            Self::Questa | Self::Vcs => RetcodeSource::LogScrape,
        }
    }

    fn time_format(self) -> Option<TimeFormat> {
        match self {
            Self::Verilator | Self::Spike => None,
            Self::Questa => Some(TimeFormat::Questa),
            Self::Vcs => Some(TimeFormat::Vcs),
        }
    }
}

/// A named factory building [`Simulation`]s for one backend.
#[derive(Debug, Clone)]
pub struct Simulator {
    kind: SimulatorKind,
    sim_bin: PathBuf,
}

impl Simulator {
    /// Creates a factory for `kind` driving the given simulator binary.
    pub fn new(kind: SimulatorKind, sim_bin: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            sim_bin: sim_bin.into(),
        }
    }

    /// Resolves a factory by backend name.
    ///
    /// Without an explicit binary the backend's conventional path under
    /// `bin/` is used. Unknown names list the registered backends.
    pub fn by_name(name: &str, sim_bin: Option<PathBuf>) -> Result<Self> {
        let Some(kind) = SimulatorKind::from_name(name) else {
            let known: Vec<&str> = SimulatorKind::ALL.iter().map(|kind| kind.name()).collect();
            return Err(HarnessError::UnknownSimulator {
                name: name.to_owned(),
                known: known.join(", "),
            });
        };
        let sim_bin = sim_bin.unwrap_or_else(|| Self::default_bin(kind));
        Ok(Self::new(kind, sim_bin))
    }

    /// Conventional binary path for a backend, `bin/sim.<name>`.
    pub fn default_bin(kind: SimulatorKind) -> PathBuf {
        PathBuf::from(format!("bin/sim.{}", kind.name()))
    }

    /// This factory's backend.
    pub fn kind(&self) -> SimulatorKind {
        self.kind
    }

    /// This factory's backend name.
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Path of the simulator binary this factory drives.
    pub fn sim_bin(&self) -> &Path {
        &self.sim_bin
    }

    /// True if the descriptor may run on this backend.
    ///
    /// A descriptor without an allow-list runs anywhere.
    pub fn supports(&self, test: &TestDescriptor) -> bool {
        test.simulators
            .as_ref()
            .is_none_or(|list| list.iter().any(|name| name == self.name()))
    }

    /// Builds the concrete simulation for a descriptor.
    ///
    /// The run directory is the descriptor's override or
    /// `<run_root>/<display name>`. Argv comes from the descriptor's command
    /// template with placeholders substituted, or from the default
    /// two-argument invocation `sim_bin elf`.
    ///
    /// The simulation executes inside its run directory, so the binary,
    /// program, and run-directory paths are anchored to the harness working
    /// directory here, before the substitution. Literal template tokens are
    /// left untouched.
    pub fn get_simulation(&self, test: &TestDescriptor, run_root: &Path) -> Simulation {
        let name = test.display_name();
        let run_dir = absolutize(
            &test
                .run_dir
                .clone()
                .unwrap_or_else(|| run_root.join(&name)),
        );

        let sim_bin = absolutize(&self.sim_bin).to_string_lossy().into_owned();
        let elf = absolutize(&test.elf).to_string_lossy().into_owned();
        let run_dir_text = run_dir.to_string_lossy();

        let argv = match &test.cmd {
            Some(template) => template
                .iter()
                .map(|token| {
                    token
                        .replace(PLACEHOLDER_SIM_BIN, &sim_bin)
                        .replace(PLACEHOLDER_ELF, &elf)
                        .replace(PLACEHOLDER_RUN_DIR, &run_dir_text)
                })
                .collect(),
            None => vec![sim_bin, elf],
        };

        let mut sim = Simulation::new(
            name,
            argv,
            run_dir,
            test.expected_retcode(),
            self.kind.retcode_source(),
        );
        if let Some(format) = self.kind.time_format() {
            sim = sim.with_time_format(format);
        }
        if test.cmd.is_some() && self.kind.retcode_source() == RetcodeSource::LogScrape {
            sim = sim.with_external_verification();
        }
        sim
    }
}

/// Anchors a relative path to the harness working directory.
///
/// If the working directory cannot be read the path is returned as given;
/// the launch will surface the underlying error.
fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}
