//! Memory-access channel to a live simulation.
//!
//! A [`ChannelSession`] spawns one simulation subprocess and connects to it
//! through a pair of named pipes in a session-private temporary directory:
//! `tx.fifo` carries request headers and WRITE payloads driver→simulation,
//! `rx.fifo` carries READ/POLL responses back. The subprocess receives the
//! pipe paths as trailing `--ipc <tx> <rx>` arguments.
//!
//! A blocked FIFO read has no portable timeout, so all driver-side pipe I/O
//! is non-blocking and cooperative: on `WouldBlock`, and on the zero-length
//! reads a FIFO yields while the peer is connecting or after it is gone, the
//! operation sleeps briefly and re-checks a flag maintained by a monitor
//! thread. The monitor's only job is to notice that the simulation process
//! exited and convert that into [`ChannelError::PeerExited`] for whichever
//! operation is in flight.
//!
//! One operation at a time: every operation takes `&mut self`, so a second
//! in-flight operation on the same session does not compile. After
//! [`finish`](ChannelSession::finish) every operation returns
//! [`ChannelError::Closed`]; a second `finish` is a no-op.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::process::{Child, Command};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use nix::sys::stat::Mode;
use nix::unistd;
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::config::{ChannelConfig, defaults};
use crate::error::ChannelError;
use crate::sim::protocol::{POLL_RESPONSE_LEN, Request};

/// An open peek/poke session with one live simulation.
///
/// The session owns the simulation's process handle for its whole lifetime:
/// teardown closes both pipes (the peer is expected to exit on EOF), waits a
/// bounded grace period, kills on overrun, and removes the pipe directory.
///
/// ```no_run
/// use simrun_core::sim::ChannelSession;
///
/// # fn main() -> Result<(), simrun_core::error::ChannelError> {
/// let mut chan = ChannelSession::start("bin/sim.verilator".as_ref(), "sw/build/alive.elf".as_ref())?;
/// chan.write(0x8000_0000, b"hello")?;
/// assert_eq!(chan.read(0x8000_0000, 5)?, b"hello");
/// let status = chan.poll(0x9000_0000, 0xffff_ffff, 1)?;
/// chan.finish()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ChannelSession {
    dir: Option<TempDir>,
    tx: Option<File>,
    rx: Option<File>,
    child: Arc<Mutex<Child>>,
    peer_dead: Arc<AtomicBool>,
    monitor_stop: Arc<AtomicBool>,
    monitor: Option<JoinHandle<()>>,
    config: ChannelConfig,
    closed: bool,
}

impl ChannelSession {
    /// Starts a simulation and connects the channel, with default timing.
    pub fn start(sim_bin: &Path, elf: &Path) -> Result<Self, ChannelError> {
        Self::start_with_config(sim_bin, elf, ChannelConfig::default())
    }

    /// Starts a simulation and connects the channel.
    ///
    /// Creates the FIFO pair, spawns `sim_bin elf --ipc <tx> <rx>`, starts
    /// the monitor thread, then opens the pipes: the response pipe first
    /// (a non-blocking read end always opens), then the request pipe,
    /// retrying `ENXIO` until the peer has its read end open or dies.
    pub fn start_with_config(
        sim_bin: &Path,
        elf: &Path,
        config: ChannelConfig,
    ) -> Result<Self, ChannelError> {
        let dir = tempfile::Builder::new().prefix("simrun-ipc-").tempdir()?;
        let tx_path = dir.path().join(defaults::TX_FIFO);
        let rx_path = dir.path().join(defaults::RX_FIFO);
        let mode = Mode::S_IRUSR | Mode::S_IWUSR;
        unistd::mkfifo(&tx_path, mode).map_err(ChannelError::Fifo)?;
        unistd::mkfifo(&rx_path, mode).map_err(ChannelError::Fifo)?;

        let child = Command::new(sim_bin)
            .arg(elf)
            .arg("--ipc")
            .arg(&tx_path)
            .arg(&rx_path)
            .spawn()?;
        debug!(pid = child.id(), dir = %dir.path().display(), "channel peer launched");

        let child = Arc::new(Mutex::new(child));
        let peer_dead = Arc::new(AtomicBool::new(false));
        let monitor_stop = Arc::new(AtomicBool::new(false));
        let monitor = spawn_monitor(
            Arc::clone(&child),
            Arc::clone(&peer_dead),
            Arc::clone(&monitor_stop),
            config.monitor_interval(),
        );

        // The session owns the child, monitor, and pipe directory from here
        // on, so a pipe-open failure tears all three down rather than
        // leaving the peer blocked in its own FIFO open with no opener.
        let mut session = Self {
            dir: Some(dir),
            tx: None,
            rx: None,
            child,
            peer_dead,
            monitor_stop,
            monitor: Some(monitor),
            config,
            closed: false,
        };
        if let Err(err) = session.open_pipes(&tx_path, &rx_path) {
            session.abort_start();
            return Err(err);
        }
        Ok(session)
    }

    /// Opens the response pipe, then the request pipe.
    fn open_pipes(&mut self, tx_path: &Path, rx_path: &Path) -> Result<(), ChannelError> {
        let rx = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(rx_path)?;
        let tx = open_tx(tx_path, &self.peer_dead, &self.config)?;
        self.rx = Some(rx);
        self.tx = Some(tx);
        Ok(())
    }

    /// Teardown for a handshake that never completed.
    ///
    /// The peer may be blocked opening a FIFO that will never gain another
    /// opener, so EOF cannot release it; kill outright instead of waiting
    /// the grace period.
    fn abort_start(&mut self) {
        self.closed = true;
        self.monitor_stop.store(true, Ordering::Release);
        if let Some(handle) = self.monitor.take() {
            let _ = handle.join();
        }
        if let Ok(mut child) = self.child.lock() {
            let _ = child.kill();
            let _ = child.wait();
        }
        drop(self.dir.take());
    }

    /// Reads `len` bytes of simulated memory starting at `addr`.
    pub fn read(&mut self, addr: u64, len: usize) -> Result<Vec<u8>, ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        let header = Request::Read {
            addr,
            len: len as u64,
        }
        .encode();
        let tx = self.tx.as_mut().ok_or(ChannelError::Closed)?;
        write_full(tx, &header, &self.peer_dead, &self.config)?;
        let rx = self.rx.as_mut().ok_or(ChannelError::Closed)?;
        let mut data = vec![0u8; len];
        read_full(rx, &mut data, &self.peer_dead, &self.config)?;
        Ok(data)
    }

    /// Writes `data` into simulated memory starting at `addr`. No response.
    pub fn write(&mut self, addr: u64, data: &[u8]) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        let header = Request::Write {
            addr,
            len: data.len() as u64,
        }
        .encode();
        let tx = self.tx.as_mut().ok_or(ChannelError::Closed)?;
        write_full(tx, &header, &self.peer_dead, &self.config)?;
        write_full(tx, data, &self.peer_dead, &self.config)?;
        Ok(())
    }

    /// Blocks until the simulation observes
    /// `(value_at(addr) & mask) == expected`, returning the final masked
    /// word. Resolves as [`ChannelError::PeerExited`] if the simulation
    /// exits first; never hangs past that.
    pub fn poll(&mut self, addr: u64, mask: u32, expected: u32) -> Result<u32, ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        let header = Request::Poll {
            addr,
            mask,
            expected,
        }
        .encode();
        let tx = self.tx.as_mut().ok_or(ChannelError::Closed)?;
        write_full(tx, &header, &self.peer_dead, &self.config)?;
        let rx = self.rx.as_mut().ok_or(ChannelError::Closed)?;
        let mut word = [0u8; POLL_RESPONSE_LEN];
        read_full(rx, &mut word, &self.peer_dead, &self.config)?;
        Ok(u32::from_le_bytes(word))
    }

    /// Tears the session down. Idempotent.
    ///
    /// Closes both pipe ends (EOF tells the peer to exit), stops the
    /// monitor, waits up to the kill grace period for a natural exit, kills
    /// on overrun, then removes the pipe directory.
    pub fn finish(&mut self) -> Result<(), ChannelError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        drop(self.tx.take());
        drop(self.rx.take());
        // Stop the monitor before reaping so the two cannot race over wait.
        self.monitor_stop.store(true, Ordering::Release);
        if let Some(handle) = self.monitor.take() {
            let _ = handle.join();
        }
        self.reap();
        drop(self.dir.take());
        Ok(())
    }

    /// Directory holding the session's FIFOs; `None` once finished.
    pub fn ipc_dir(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    fn reap(&self) {
        let Ok(mut child) = self.child.lock() else {
            return;
        };
        let deadline = Instant::now() + self.config.kill_grace();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!(%status, "channel peer exited");
                    return;
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        warn!("channel peer ignored EOF, killing");
                        let _ = child.kill();
                        let _ = child.wait();
                        return;
                    }
                    thread::sleep(self.config.io_retry_interval());
                }
                Err(err) => {
                    warn!(%err, "reaping channel peer failed");
                    return;
                }
            }
        }
    }
}

impl Drop for ChannelSession {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

fn spawn_monitor(
    child: Arc<Mutex<Child>>,
    peer_dead: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    interval: Duration,
) -> JoinHandle<()> {
    thread::spawn(move || {
        while !stop.load(Ordering::Acquire) {
            let exited = child
                .lock()
                .map_or(true, |mut guard| matches!(guard.try_wait(), Ok(Some(_))));
            if exited {
                peer_dead.store(true, Ordering::Release);
                break;
            }
            thread::sleep(interval);
        }
    })
}

/// Opens the request pipe for writing.
///
/// `ENXIO` means the peer has not opened its read end yet; retry until it
/// does or the monitor reports it dead.
fn open_tx(
    path: &Path,
    peer_dead: &AtomicBool,
    config: &ChannelConfig,
) -> Result<File, ChannelError> {
    loop {
        match OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
        {
            Ok(file) => return Ok(file),
            Err(err) if err.raw_os_error() == Some(libc::ENXIO) => {
                if peer_dead.load(Ordering::Acquire) {
                    return Err(ChannelError::PeerExited);
                }
                thread::sleep(config.io_retry_interval());
            }
            Err(err) => return Err(ChannelError::Io(err)),
        }
    }
}

fn read_full(
    file: &mut File,
    buf: &mut [u8],
    peer_dead: &AtomicBool,
    config: &ChannelConfig,
) -> Result<(), ChannelError> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            // A zero-length FIFO read can mean the peer has not opened its
            // end yet or that it is gone; the monitor flag disambiguates.
            Ok(0) => stall(peer_dead, config)?,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => stall(peer_dead, config)?,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(ChannelError::Io(err)),
        }
    }
    Ok(())
}

fn write_full(
    file: &mut File,
    buf: &[u8],
    peer_dead: &AtomicBool,
    config: &ChannelConfig,
) -> Result<(), ChannelError> {
    let mut written = 0;
    while written < buf.len() {
        match file.write(&buf[written..]) {
            Ok(0) => stall(peer_dead, config)?,
            Ok(n) => written += n,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => stall(peer_dead, config)?,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                return Err(ChannelError::PeerExited);
            }
            Err(err) => return Err(ChannelError::Io(err)),
        }
    }
    Ok(())
}

fn stall(peer_dead: &AtomicBool, config: &ChannelConfig) -> Result<(), ChannelError> {
    if peer_dead.load(Ordering::Acquire) {
        return Err(ChannelError::PeerExited);
    }
    thread::sleep(config.io_retry_interval());
    Ok(())
}
