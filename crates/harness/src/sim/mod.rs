//! Simulator subprocesses and the channels that talk to them.
//!
//! This module owns everything that happens between "we have a test
//! descriptor" and "the subprocess is gone". It includes:
//! 1. **Backends:** the closed set of supported simulators and how each one
//!    reports results (process exit code versus log scraping).
//! 2. **Lifecycle:** launching a simulation, polling it for completion, and
//!    judging the outcome against the expected return code.
//! 3. **Wire Protocol:** the fixed-size request encoding used for memory
//!    peek/poke over FIFO pairs.
//! 4. **Channels:** a session type that spawns a peer simulator, exchanges
//!    requests over named pipes, and tears everything down exactly once.

/// FIFO-based peek/poke sessions with a spawned simulator.
pub mod channel;

/// Request encoding for the peek/poke wire protocol.
pub mod protocol;

/// One simulator subprocess from launch to verdict.
pub mod simulation;

/// Known simulator backends and simulation construction.
pub mod simulator;

pub use channel::ChannelSession;
pub use protocol::Request;
pub use simulation::{RetcodeSource, Simulation, TimeFormat};
pub use simulator::{Simulator, SimulatorKind};
