//! Regression harness for hardware simulators.
//!
//! This crate runs batches of simulator jobs with bounded parallelism and
//! judges each one against an expected return code. It provides:
//! 1. **Testlists:** JSON descriptions of what to run, per-test expectations,
//!    and per-test overrides (command templates, run directories, backends).
//! 2. **Backends:** Verilator, Spike, Questa, and VCS, differing in how the
//!    test's return code is recovered (process exit versus log scraping).
//! 3. **Scheduling:** a single-threaded cooperative loop that keeps up to P
//!    simulations alive, with early exit, dry runs, and interrupt handling.
//! 4. **Channels:** a FIFO-based peek/poke protocol for driving a simulated
//!    device's memory from the harness side.

/// Harness, scheduler, and channel configuration.
pub mod config;
/// Error taxonomy and per-test failure records.
pub mod error;
/// Bounded-parallelism scheduling, cancellation, and group cleanup.
pub mod sched;
/// Simulator backends, subprocess lifecycle, and peek/poke channels.
pub mod sim;
/// Testlist loading and test descriptors.
pub mod testlist;

/// Crate-wide result type; all fallible operations return this.
pub use crate::error::Result;
pub use crate::error::{ChannelError, FailReason, Failure, HarnessError};

pub use crate::config::{ChannelConfig, HarnessConfig, SchedulerConfig};
/// Scheduler entry point; construct with `Scheduler::new` and call `run`.
pub use crate::sched::{RunReport, Scheduler};
pub use crate::sim::{ChannelSession, Simulation, Simulator, SimulatorKind};
pub use crate::testlist::{TestDescriptor, Testlist};
