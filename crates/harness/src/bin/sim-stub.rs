//! In-process stand-in for a simulator with an IPC channel.
//!
//! Speaks the peek/poke wire protocol over the FIFO pair the harness
//! creates, backed by a sparse byte memory. Used by the integration tests
//! as a scriptable peer:
//!
//! ```text
//! sim-stub <elf> [--exit-code N] [--die-on-poll] --ipc <tx> <rx>
//! ```
//!
//! `<tx>` and `<rx>` are named from the harness side, so the stub reads
//! requests from `<tx>` and writes responses to `<rx>`. The `<elf>`
//! argument is accepted for argv compatibility and otherwise ignored.
//! When the harness closes its end, the stub exits with `--exit-code`
//! (default 0). `--die-on-poll` makes the stub exit without responding to
//! the first poll request, exercising the peer-death path.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::Duration;

use simrun_core::sim::protocol::{Request, HEADER_LEN, POLL_RESPONSE_LEN};

struct Options {
    tx: PathBuf,
    rx: PathBuf,
    exit_code: i32,
    die_on_poll: bool,
}

fn parse_args() -> Result<Options, String> {
    let mut args = std::env::args().skip(1);
    let mut ipc: Option<(PathBuf, PathBuf)> = None;
    let mut exit_code = 0;
    let mut die_on_poll = false;
    let mut positional = 0usize;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--ipc" => {
                let tx = args.next().ok_or("--ipc needs two paths")?;
                let rx = args.next().ok_or("--ipc needs two paths")?;
                ipc = Some((PathBuf::from(tx), PathBuf::from(rx)));
            }
            "--exit-code" => {
                let value = args.next().ok_or("--exit-code needs a value")?;
                exit_code = value
                    .parse()
                    .map_err(|_| format!("bad exit code: {value}"))?;
            }
            "--die-on-poll" => die_on_poll = true,
            _ if !arg.starts_with('-') => positional += 1,
            _ => return Err(format!("unknown flag: {arg}")),
        }
    }

    if positional != 1 {
        return Err("expected exactly one elf argument".to_owned());
    }
    let (tx, rx) = ipc.ok_or("missing --ipc <tx> <rx>")?;
    Ok(Options {
        tx,
        rx,
        exit_code,
        die_on_poll,
    })
}

/// Reads one request header, or `None` on a clean end-of-stream.
///
/// `read_exact` folds "no bytes at all" and "stream cut mid-header" into
/// one error, so this reads manually to tell the two apart.
fn read_header(reader: &mut File) -> io::Result<Option<[u8; HEADER_LEN]>> {
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream ended mid-request",
                ));
            }
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(Some(header))
}

fn load_word(memory: &HashMap<u64, u8>, addr: u64) -> u32 {
    let mut bytes = [0u8; POLL_RESPONSE_LEN];
    for (offset, byte) in bytes.iter_mut().enumerate() {
        *byte = memory
            .get(&addr.wrapping_add(offset as u64))
            .copied()
            .unwrap_or(0);
    }
    u32::from_le_bytes(bytes)
}

fn store_word(memory: &mut HashMap<u64, u8>, addr: u64, word: u32) {
    for (offset, byte) in word.to_le_bytes().into_iter().enumerate() {
        let _ = memory.insert(addr.wrapping_add(offset as u64), byte);
    }
}

fn serve(options: &Options) -> io::Result<i32> {
    // Blocking open for read sleeps until the harness opens its write end;
    // the in-flight open is what lets the harness's nonblocking open
    // succeed. The response pipe already has a reader by then.
    let mut requests = File::open(&options.tx)?;
    let mut responses = OpenOptions::new().write(true).open(&options.rx)?;

    let mut memory: HashMap<u64, u8> = HashMap::new();

    while let Some(header) = read_header(&mut requests)? {
        let request = Request::decode(&header)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
        match request {
            Request::Read { addr, len } => {
                let mut payload = Vec::with_capacity(len as usize);
                for offset in 0..len {
                    payload.push(
                        memory
                            .get(&addr.wrapping_add(offset))
                            .copied()
                            .unwrap_or(0),
                    );
                }
                responses.write_all(&payload)?;
            }
            Request::Write { addr, len } => {
                let mut payload = vec![0u8; len as usize];
                requests.read_exact(&mut payload)?;
                for (offset, byte) in payload.into_iter().enumerate() {
                    let _ = memory.insert(addr.wrapping_add(offset as u64), byte);
                }
            }
            Request::Poll {
                addr,
                mask,
                expected,
            } => {
                if options.die_on_poll {
                    return Ok(1);
                }
                let mut word = load_word(&memory, addr);
                if word & mask != expected & mask {
                    // Model a device that reaches the polled state shortly
                    // after the request arrives.
                    thread::sleep(Duration::from_millis(10));
                    word = (word & !mask) | (expected & mask);
                    store_word(&mut memory, addr, word);
                }
                // The response carries only the bits the driver polled for.
                responses.write_all(&(word & mask).to_le_bytes())?;
            }
        }
    }

    Ok(options.exit_code)
}

fn main() {
    let options = match parse_args() {
        Ok(options) => options,
        Err(message) => {
            eprintln!("sim-stub: {message}");
            process::exit(2);
        }
    };
    match serve(&options) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("sim-stub: {err}");
            process::exit(2);
        }
    }
}
