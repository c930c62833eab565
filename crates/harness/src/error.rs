//! Failure taxonomy for the harness.
//!
//! This module defines every way a run can go wrong. It provides:
//! 1. **Fatal errors:** [`HarnessError`], raised before or during a run and
//!    never recovered (spawn failures, bad testlists, process-group setup).
//! 2. **Channel errors:** [`ChannelError`], raised by the memory-access
//!    channel; callers must treat these as a failure of the attached
//!    simulation, not of the harness.
//! 3. **Recorded failures:** [`Failure`] and [`FailReason`], one per
//!    unsuccessful simulation. These are report entries, not `Err` values;
//!    a failed simulation never aborts its siblings.
//!
//! A simulation that never completes and has no channel monitor watching it
//! is a hang. The harness deliberately carries no timeout for that case; the
//! operator's recourse is an interrupt, which tears down the whole process
//! group.

use std::fmt;
use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

/// Convenience alias for harness-level results.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Fatal, run-aborting errors.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A simulator subprocess could not be spawned.
    ///
    /// Launch failures are not caught locally: if the simulator binary is
    /// missing or not executable, every remaining descriptor would fail the
    /// same way, so the whole run aborts.
    #[error("failed to launch `{name}`: {source}")]
    Launch {
        /// Display name of the simulation that failed to start.
        name: String,
        /// The underlying spawn error.
        #[source]
        source: io::Error,
    },

    /// The testlist file could not be read.
    #[error("cannot read testlist `{path}`: {source}")]
    Testlist {
        /// Path handed to the loader.
        path: PathBuf,
        /// The underlying read error.
        #[source]
        source: io::Error,
    },

    /// The testlist file is not valid JSON of the expected shape.
    #[error("cannot parse testlist `{path}`: {source}")]
    TestlistParse {
        /// Path handed to the loader.
        path: PathBuf,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The requested simulator backend does not exist.
    #[error("unknown simulator `{name}` (known backends: {known})")]
    UnknownSimulator {
        /// The name that failed to resolve.
        name: String,
        /// Comma-separated list of registered backend names.
        known: String,
    },

    /// The scheduler could not become the leader of its own process group.
    ///
    /// Without group leadership the cleanup sweep on early exit would target
    /// the wrong set of processes, so this is fatal before any launch.
    #[error("cannot take process group leadership: {0}")]
    ProcessGroup(#[source] Errno),

    /// Installing the run's signal handlers failed.
    #[error("cannot install signal handlers: {0}")]
    Signal(#[source] Errno),

    /// A channel error escalated by a caller that could not continue.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Errors raised by the memory-access channel.
///
/// Every variant must be treated as a failure of the simulation the channel
/// is attached to. The channel makes no attempt to distinguish "the
/// simulation crashed" from "the simulation closed its end of a pipe"; both
/// mean the session is over.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The session was used after [`finish`](crate::sim::ChannelSession::finish).
    #[error("channel is closed")]
    Closed,

    /// The simulation process exited while an operation was in flight.
    #[error("simulation exited during a channel operation")]
    PeerExited,

    /// A frame on the wire did not decode.
    #[error("bad protocol frame: {0}")]
    Protocol(String),

    /// Creating the FIFO pair failed.
    #[error("fifo setup failed: {0}")]
    Fifo(#[source] Errno),

    /// An underlying pipe read or write failed.
    #[error("channel i/o failed: {0}")]
    Io(#[from] io::Error),
}

/// Why a recorded simulation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailReason {
    /// The resolved exit code did not match the expectation.
    ///
    /// `got` is `None` when no code resolved at all, e.g. the process died
    /// to a signal.
    Retcode {
        /// Code the simulation resolved to, if any.
        got: Option<i32>,
        /// Code the descriptor expected.
        expected: i32,
    },

    /// A log-scraping simulator exited nonzero.
    ///
    /// The scraped application code may even have matched the expectation;
    /// a crashed simulator still fails the run.
    SimulatorExit {
        /// The simulator process's own exit status.
        status: i32,
    },

    /// The run was interrupted before the simulation completed.
    Aborted,
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retcode {
                got: Some(got),
                expected,
            } => write!(f, "exit code {got} (expected {expected})"),
            Self::Retcode {
                got: None,
                expected,
            } => write!(f, "no exit code (expected {expected})"),
            Self::SimulatorExit { status } => {
                write!(f, "simulator exited with status {status}")
            }
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// One unsuccessful simulation in the final report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Display name of the simulation.
    pub name: String,
    /// Why it failed.
    pub reason: FailReason,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.reason)
    }
}
