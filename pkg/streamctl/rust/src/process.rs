// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! OS-level helpers: spawning into a fresh session, liveness checks and
//! process-group signaling.

use crate::command::TranscodeCommand;
use log::{debug, info, warn};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::{self, Pid};
use std::fs::File;
use std::io;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio::time::{Duration, Instant, sleep};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub const DEFAULT_STOP_GRACE: Duration = Duration::from_millis(1500);
pub const DEFAULT_KILL_WAIT: Duration = Duration::from_millis(500);

/// How long a stop waits after SIGTERM, and after the SIGKILL escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopTimeouts {
    pub grace: Duration,
    pub kill_wait: Duration,
}

impl Default for StopTimeouts {
    fn default() -> Self {
        Self {
            grace: DEFAULT_STOP_GRACE,
            kill_wait: DEFAULT_KILL_WAIT,
        }
    }
}

/// How a group termination ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited within the grace period after SIGTERM.
    Terminated,
    /// Needed SIGKILL.
    Killed,
    /// Still alive after SIGKILL and the kill wait.
    Lingering,
    /// Gone before we could signal it.
    AlreadyGone,
}

fn to_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid)
        .ok()
        .filter(|raw| *raw > 0)
        .map(Pid::from_raw)
}

/// Zero-signal check. Any failure, including EPERM, counts as not running.
pub fn is_alive(pid: u32) -> bool {
    to_pid(pid).is_some_and(|p| signal::kill(p, None).is_ok())
}

/// Spawn `command` as the leader of a new session so that the whole group
/// (including anything the transcoder forks) can be signaled at once.
/// stdout and stderr both go to `log`.
pub fn spawn_in_new_session(command: &TranscodeCommand, log: &File) -> io::Result<Child> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log.try_clone()?))
        .stderr(Stdio::from(log.try_clone()?));

    // SAFETY: setsid(2) is async-signal-safe and does not touch memory
    // shared with the parent.
    unsafe {
        cmd.pre_exec(|| unistd::setsid().map(drop).map_err(io::Error::from));
    }

    cmd.spawn()
}

/// Send `sig` to the process group of `pid`.
///
/// A record that resolves to the supervisor's own group only gets the pid
/// itself signaled, never the group.
pub fn signal_group(pid: u32, sig: Signal) -> Result<(), Errno> {
    let target = to_pid(pid).ok_or(Errno::ESRCH)?;
    let pgid = unistd::getpgid(Some(target))?;
    if pgid == unistd::getpgrp() {
        warn!("pid {pid} shares the supervisor's process group, signaling it alone");
        return signal::kill(target, sig);
    }
    debug!("sending {sig} to process group {pgid} (pid={pid})");
    signal::killpg(pgid, sig)
}

/// SIGTERM the group, wait up to `timeouts.grace`, then SIGKILL the group
/// and wait up to `timeouts.kill_wait`.
///
/// `alive` decides liveness between steps so that the caller can reap its
/// own children. ESRCH at any point means the process is already gone and is
/// not an error; other signal failures are returned.
pub async fn terminate_group<F>(
    pid: u32,
    timeouts: StopTimeouts,
    mut alive: F,
) -> Result<Termination, Errno>
where
    F: FnMut() -> bool,
{
    match signal_group(pid, Signal::SIGTERM) {
        Ok(()) => {}
        Err(Errno::ESRCH) => return Ok(Termination::AlreadyGone),
        Err(e) => return Err(e),
    }

    if wait_for_exit(timeouts.grace, &mut alive).await {
        return Ok(Termination::Terminated);
    }

    info!(
        "pid {pid} still running after {}ms, sending SIGKILL",
        timeouts.grace.as_millis()
    );
    match signal_group(pid, Signal::SIGKILL) {
        Ok(()) => {}
        Err(Errno::ESRCH) => return Ok(Termination::Terminated),
        Err(e) => return Err(e),
    }

    if wait_for_exit(timeouts.kill_wait, &mut alive).await {
        Ok(Termination::Killed)
    } else {
        Ok(Termination::Lingering)
    }
}

async fn wait_for_exit<F>(limit: Duration, alive: &mut F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + limit;
    loop {
        if !alive() {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        sleep(POLL_INTERVAL.min(deadline - now)).await;
    }
}

/// Result of checking a pid's command line against the transcoder name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandLineCheck {
    Matches,
    Mismatch,
    /// The host offers no way to inspect it (no procfs, permission denied,
    /// process vanished).
    Unavailable,
}

/// Best-effort `/proc/<pid>/cmdline` inspection, case-insensitive.
pub fn check_command_line(pid: u32, needle: &str) -> CommandLineCheck {
    match std::fs::read(format!("/proc/{pid}/cmdline")) {
        Ok(raw) => {
            let cmdline = String::from_utf8_lossy(&raw).replace('\0', " ");
            if cmdline.to_lowercase().contains(&needle.to_lowercase()) {
                CommandLineCheck::Matches
            } else {
                CommandLineCheck::Mismatch
            }
        }
        Err(e) => {
            debug!("cannot inspect command line of pid {pid}: {e}");
            CommandLineCheck::Unavailable
        }
    }
}
