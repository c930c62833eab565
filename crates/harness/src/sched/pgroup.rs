//! Process-group leadership and the cleanup sweep.
//!
//! A simulation's subprocess may spawn descendants the harness holds no
//! handle for (simulator wrappers routinely exec shells and license
//! daemons). The scheduler therefore runs as the leader of its own process
//! group, and cleanup after an aborted run is "kill everyone left in this
//! group except me". Group membership is enumerated from `/proc`, because a
//! plain `killpg` would take the scheduler down with its children.

use std::fs;

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::{Pid, getpgrp, getpid, setpgid};
use tracing::{debug, warn};

use crate::error::{HarnessError, Result};

/// Makes this process the leader of a fresh process group.
///
/// No-op when it already leads its group (including the session-leader
/// case, where `setpgid` would be refused anyway).
pub fn ensure_group_leader() -> Result<()> {
    if getpgrp() == getpid() {
        return Ok(());
    }
    setpgid(Pid::from_raw(0), Pid::from_raw(0)).map_err(HarnessError::ProcessGroup)?;
    Ok(())
}

/// SIGKILLs every process in this process's group except itself.
///
/// Best effort: processes that vanish mid-sweep are skipped silently,
/// other refusals are logged. Returns the number of processes signalled.
pub fn kill_group_members_except_self() -> usize {
    let me = getpid();
    let group = getpgrp();
    let Ok(entries) = fs::read_dir("/proc") else {
        warn!("cannot enumerate /proc, skipping group sweep");
        return 0;
    };

    let mut killed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(pid) = name.to_str().and_then(|text| text.parse::<i32>().ok()) else {
            continue;
        };
        if pid == me.as_raw() {
            continue;
        }
        let Ok(stat) = fs::read_to_string(format!("/proc/{pid}/stat")) else {
            continue;
        };
        if parse_stat_pgrp(&stat) != Some(group.as_raw()) {
            continue;
        }
        match kill(Pid::from_raw(pid), Signal::SIGKILL) {
            Ok(()) => {
                debug!(pid, "killed leftover group member");
                killed += 1;
            }
            Err(Errno::ESRCH) => {}
            Err(err) => warn!(pid, %err, "could not kill group member"),
        }
    }
    killed
}

/// Extracts the process-group field from a `/proc/<pid>/stat` line.
///
/// The comm field may contain spaces and parentheses, so fields are counted
/// from the last `)`: state, ppid, then pgrp.
pub fn parse_stat_pgrp(stat: &str) -> Option<i32> {
    let after = stat.get(stat.rfind(')')? + 1..)?;
    let mut fields = after.split_whitespace();
    let _state = fields.next()?;
    let _ppid = fields.next()?;
    fields.next()?.parse().ok()
}
