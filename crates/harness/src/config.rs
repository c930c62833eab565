//! Configuration for the harness.
//!
//! This module defines the configuration structures that parameterize a run.
//! It provides:
//! 1. **Defaults:** Baseline timing and filesystem constants (poll intervals,
//!    kill grace period, run-directory root, log and FIFO names).
//! 2. **Structures:** Hierarchical config for the scheduler and the
//!    memory-access channel.
//! 3. **Helpers:** `Duration` accessors for the raw millisecond fields.
//!
//! The CLI builds a [`HarnessConfig`] from its flags; embedders may also
//! deserialize one from JSON.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Default configuration constants for the harness.
///
/// These values define the baseline behavior when not explicitly overridden
/// by the CLI or an embedding caller.
pub(crate) mod defaults {
    /// Scheduler retire-poll interval in milliseconds.
    ///
    /// The scheduler sleeps this long between sweeps of the running set.
    /// Short enough that a finished simulation is retired promptly, long
    /// enough that an idle scheduler costs nothing measurable.
    pub const POLL_INTERVAL_MS: u64 = 50;

    /// Channel monitor-thread interval in milliseconds.
    ///
    /// The monitor checks the simulation process this often; it bounds how
    /// long a blocked channel operation can outlive a dead peer.
    pub const MONITOR_INTERVAL_MS: u64 = 50;

    /// Sleep between non-blocking pipe retries in milliseconds.
    ///
    /// Applied when a FIFO read or write returns `WouldBlock` (or a
    /// zero-length read while the peer is still connecting).
    pub const IO_RETRY_INTERVAL_MS: u64 = 5;

    /// Grace period before a torn-down simulation is killed, in milliseconds.
    ///
    /// After the channel closes its pipe ends the simulation is expected to
    /// exit on EOF; a process still alive after this period is killed.
    pub const KILL_GRACE_MS: u64 = 2000;

    /// Number of simulations allowed to run concurrently.
    pub const PARALLELISM: usize = 1;

    /// Root directory under which per-simulation run directories are created.
    pub const RUN_ROOT: &str = "runs";

    /// Log file name inside each run directory (stdout and stderr merged).
    pub const LOG_FILE: &str = "sim.log";

    /// Name of the driver-to-simulation FIFO inside a channel's directory.
    pub const TX_FIFO: &str = "tx.fifo";

    /// Name of the simulation-to-driver FIFO inside a channel's directory.
    pub const RX_FIFO: &str = "rx.fifo";
}

/// Top-level harness configuration.
///
/// # Example
///
/// ```
/// use simrun_core::config::HarnessConfig;
///
/// let json = r#"{
///     "run_root": "work/runs",
///     "scheduler": {
///         "parallelism": 4,
///         "early_exit": true
///     },
///     "channel": {
///         "kill_grace_ms": 500
///     }
/// }"#;
///
/// let config: HarnessConfig = serde_json::from_str(json).unwrap();
/// assert_eq!(config.scheduler.parallelism, 4);
/// assert!(config.scheduler.early_exit);
/// assert_eq!(config.scheduler.poll_interval_ms, 50);
/// assert_eq!(config.channel.kill_grace_ms, 500);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct HarnessConfig {
    /// Root directory for per-simulation run directories
    #[serde(default = "HarnessConfig::default_run_root")]
    pub run_root: PathBuf,
    /// Scheduler loop settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Memory-access channel settings
    #[serde(default)]
    pub channel: ChannelConfig,
}

impl HarnessConfig {
    /// Returns the default run-directory root.
    fn default_run_root() -> PathBuf {
        PathBuf::from(defaults::RUN_ROOT)
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            run_root: Self::default_run_root(),
            scheduler: SchedulerConfig::default(),
            channel: ChannelConfig::default(),
        }
    }
}

/// Scheduler loop settings.
///
/// Controls how many simulations run at once and what happens when one
/// fails or the operator interrupts the run.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of concurrently running simulations (at least 1)
    #[serde(default = "SchedulerConfig::default_parallelism")]
    pub parallelism: usize,

    /// Stop launching new simulations after the first failure
    #[serde(default)]
    pub early_exit: bool,

    /// Report resolved commands without spawning anything
    #[serde(default)]
    pub dry_run: bool,

    /// Print the log of every failing simulation to stdout
    #[serde(default)]
    pub verbose: bool,

    /// Milliseconds between sweeps of the running set
    #[serde(default = "SchedulerConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Kill every process left in the scheduler's process group after an
    /// aborted run. Disabled only by embedders that share the group with
    /// processes the harness must not touch.
    #[serde(default = "SchedulerConfig::default_sweep_process_group")]
    pub sweep_process_group: bool,
}

impl SchedulerConfig {
    /// Returns the default parallelism bound.
    fn default_parallelism() -> usize {
        defaults::PARALLELISM
    }

    /// Returns the default retire-poll interval.
    fn default_poll_interval_ms() -> u64 {
        defaults::POLL_INTERVAL_MS
    }

    /// Group cleanup is on unless an embedder opts out.
    fn default_sweep_process_group() -> bool {
        true
    }

    /// Parallelism bound with the floor applied.
    pub fn bound(&self) -> usize {
        self.parallelism.max(1)
    }

    /// Retire-poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            parallelism: defaults::PARALLELISM,
            early_exit: false,
            dry_run: false,
            verbose: false,
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            sweep_process_group: true,
        }
    }
}

/// Memory-access channel settings.
///
/// All three intervals trade latency against idle wakeups; the defaults suit
/// simulations that run for seconds or longer.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    /// Milliseconds between monitor-thread liveness checks
    #[serde(default = "ChannelConfig::default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,

    /// Milliseconds between non-blocking pipe retries
    #[serde(default = "ChannelConfig::default_io_retry_interval_ms")]
    pub io_retry_interval_ms: u64,

    /// Milliseconds a finished channel waits for its simulation to exit on
    /// EOF before killing it
    #[serde(default = "ChannelConfig::default_kill_grace_ms")]
    pub kill_grace_ms: u64,
}

impl ChannelConfig {
    /// Returns the default monitor interval.
    fn default_monitor_interval_ms() -> u64 {
        defaults::MONITOR_INTERVAL_MS
    }

    /// Returns the default pipe-retry interval.
    fn default_io_retry_interval_ms() -> u64 {
        defaults::IO_RETRY_INTERVAL_MS
    }

    /// Returns the default kill grace period.
    fn default_kill_grace_ms() -> u64 {
        defaults::KILL_GRACE_MS
    }

    /// Monitor interval as a [`Duration`].
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    /// Pipe-retry interval as a [`Duration`].
    pub fn io_retry_interval(&self) -> Duration {
        Duration::from_millis(self.io_retry_interval_ms)
    }

    /// Kill grace period as a [`Duration`].
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            monitor_interval_ms: defaults::MONITOR_INTERVAL_MS,
            io_retry_interval_ms: defaults::IO_RETRY_INTERVAL_MS,
            kill_grace_ms: defaults::KILL_GRACE_MS,
        }
    }
}
