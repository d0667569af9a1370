// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Start, stop and reconcile relay processes.
//!
//! Every operation that changes state for an identifier runs under that
//! identifier's lock, so a start and a stop for the same stream never
//! interleave. Different identifiers proceed independently.

use crate::command::CommandBuilder;
use crate::config::Config;
use crate::errors::{Error, Result};
use crate::logs::LogStore;
use crate::pidfile::{PidFileStore, RecordedPid};
use crate::process::{self, CommandLineCheck, StopTimeouts, Termination};
use crate::registry::{ProcessRegistry, RunningProcess};
use crate::request::ValidatedStart;
use crate::stream_id::StreamId;
use log::{debug, error, info, warn};
use nix::sys::signal::Signal;
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamStatus {
    pub running: bool,
    pub id: StreamId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamInfo {
    pub id: StreamId,
    pub pid: Option<u32>,
    pub running: bool,
    #[serde(rename = "log")]
    pub log_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupAction {
    RemovedStalePidfile,
    RemovedInvalidPidfile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanedRecord {
    pub id: StreamId,
    pub action: CleanupAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KilledProcess {
    pub id: StreamId,
    pub pid: u32,
}

/// Per-identifier result of a bulk stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopOutcome {
    pub id: StreamId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KillAndCleanup {
    pub id: StreamId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub cleaned: Vec<CleanedRecord>,
}

#[derive(Debug, Default)]
struct StreamLocks {
    locks: Mutex<HashMap<StreamId, Arc<AsyncMutex<()>>>>,
}

impl StreamLocks {
    async fn acquire(&self, id: &StreamId) -> StreamGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(id.clone()).or_default())
        };
        StreamGuard {
            locks: self,
            id: id.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Holds one identifier's lock. The map entry is dropped with the last
/// holder or waiter.
struct StreamGuard<'a> {
    locks: &'a StreamLocks,
    id: StreamId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for StreamGuard<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.locks.lock().unwrap_or_else(|e| e.into_inner());
        drop(self.guard.take());
        // Waiters clone the entry under the map lock, so a count of one
        // means nobody else is queued on it.
        if locks
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.id);
        }
    }
}

#[derive(Debug)]
pub struct Supervisor {
    pids: PidFileStore,
    logs: LogStore,
    commands: CommandBuilder,
    registry: ProcessRegistry,
    locks: StreamLocks,
    stop_timeouts: StopTimeouts,
    /// Matched against `/proc/<pid>/cmdline` before a bulk kill.
    binary_name: String,
}

impl Supervisor {
    /// Build a supervisor from `config`, creating the PID and log
    /// directories if needed.
    pub fn new(config: &Config) -> io::Result<Self> {
        let pids = PidFileStore::open(config.pid_dir())?;
        let logs = LogStore::open(config.log_dir())?;
        let commands = CommandBuilder::new(
            config.transcoder_bin.clone(),
            config.video.clone(),
            config.audio.clone(),
            config.output_format.clone(),
        );
        let binary_name = config
            .transcoder_bin
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| config.transcoder_bin.to_string_lossy().into_owned());

        Ok(Self {
            pids,
            logs,
            commands,
            registry: ProcessRegistry::new(),
            locks: StreamLocks::default(),
            stop_timeouts: config.stop_timeouts(),
            binary_name,
        })
    }

    pub fn pid_store(&self) -> &PidFileStore {
        &self.pids
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Our own children are reaped through their handle first so an exited
    /// child is never mistaken for a live one.
    fn is_alive(&self, id: &StreamId, pid: u32) -> bool {
        if self.registry.reap_if_exited(id, pid) {
            return false;
        }
        process::is_alive(pid)
    }

    fn read_record(&self, id: &StreamId) -> Option<RecordedPid> {
        match self.pids.read(id) {
            Ok(record) => record,
            Err(e) => {
                warn!("[{id}] unreadable pid record, treating as invalid: {e}");
                Some(RecordedPid::Invalid)
            }
        }
    }

    /// Spawn a relay for `request.id` and return its pid.
    ///
    /// A live record fails with [`Error::AlreadyRunning`]; a stale or
    /// corrupt one is removed first. On spawn failure no log handle or
    /// record is left behind.
    pub async fn start(&self, request: &ValidatedStart) -> Result<u32> {
        let id = &request.id;
        let _guard = self.locks.acquire(id).await;

        match self.read_record(id) {
            Some(RecordedPid::Valid(pid)) if self.is_alive(id, pid) => {
                return Err(Error::AlreadyRunning {
                    id: id.to_string(),
                    pid,
                });
            }
            Some(record) => {
                info!("[{id}] removing stale pid record ({record:?})");
                self.pids.delete(id)?;
            }
            None => {}
        }

        let command = self.commands.build(&request.source, &request.sink, &request.extra_args)?;
        let log = self.logs.open_append(id)?;

        let child = match process::spawn_in_new_session(&command, &log) {
            Ok(child) => child,
            Err(source) => {
                drop(log);
                if let Err(e) = self.pids.delete(id) {
                    warn!("[{id}] failed to remove pid record after spawn failure: {e}");
                }
                return Err(Error::Spawn {
                    id: id.to_string(),
                    source,
                });
            }
        };
        let Some(pid) = child.id() else {
            drop(log);
            return Err(Error::Spawn {
                id: id.to_string(),
                source: io::Error::other("child exited before its pid was read"),
            });
        };

        if let Err(e) = self.pids.write(id, pid) {
            error!("[{id}] failed to record pid {pid}, killing it: {e}");
            if let Err(kill_err) = process::signal_group(pid, Signal::SIGKILL) {
                warn!("[{id}] failed to kill pid {pid}: {kill_err}");
            }
            drop(child);
            drop(log);
            if let Err(delete_err) = self.pids.delete(id) {
                warn!("[{id}] failed to remove pid record after write failure: {delete_err}");
            }
            return Err(e.into());
        }

        let argv = command.argv();
        info!("[{id}] spawned (pid={pid}, cmd={})", argv.join(" "));
        self.registry
            .insert(id.clone(), RunningProcess::new(child, log, pid, argv));
        Ok(pid)
    }

    /// Terminate the recorded process group and forget the stream.
    ///
    /// Works from the pid record alone, so streams started by an earlier
    /// supervisor instance can be stopped too. Returns the recorded pid.
    pub async fn stop(&self, id: &StreamId) -> Result<u32> {
        let _guard = self.locks.acquire(id).await;
        self.stop_locked(id).await
    }

    async fn stop_locked(&self, id: &StreamId) -> Result<u32> {
        let pid = match self.read_record(id) {
            None => return Err(Error::NotRunning(id.to_string())),
            Some(RecordedPid::Invalid) => {
                warn!("[{id}] pid record is corrupt, removing it");
                self.forget(id)?;
                return Err(Error::NotRunning(id.to_string()));
            }
            Some(RecordedPid::Valid(pid)) => pid,
        };

        info!("[{id}] stopping (pid={pid})");
        if let Some(argv) = self.registry.argv(id) {
            debug!("[{id}] stopping owned child: {}", argv.join(" "));
        }
        match process::terminate_group(pid, self.stop_timeouts, || self.is_alive(id, pid)).await {
            Ok(Termination::Terminated) => info!("[{id}] stopped (pid={pid})"),
            Ok(Termination::Killed) => info!("[{id}] killed after grace period (pid={pid})"),
            Ok(Termination::Lingering) => warn!("[{id}] pid {pid} still present after SIGKILL"),
            Ok(Termination::AlreadyGone) => info!("[{id}] pid {pid} had already exited"),
            Err(e) => warn!("[{id}] failed to signal pid {pid}: {e}"),
        }

        self.forget(id)?;
        Ok(pid)
    }

    /// Release the registry entry (closing its log handle) and delete the record.
    fn forget(&self, id: &StreamId) -> Result<()> {
        self.registry.release(id);
        self.pids.delete(id)?;
        Ok(())
    }

    /// Liveness of `id` according to its record. The record is left alone
    /// even when it turns out to be stale.
    pub fn status(&self, id: &StreamId) -> StreamStatus {
        match self.read_record(id) {
            Some(RecordedPid::Valid(pid)) => StreamStatus {
                running: self.is_alive(id, pid),
                id: id.clone(),
                pid: Some(pid),
            },
            _ => StreamStatus {
                running: false,
                id: id.clone(),
                pid: None,
            },
        }
    }

    /// One entry per record on disk, whoever started it.
    pub fn list(&self) -> Result<Vec<StreamInfo>> {
        let records = self.pids.list_all()?;
        Ok(records
            .into_iter()
            .map(|(id, recorded)| {
                let pid = recorded.pid();
                let running = pid.is_some_and(|pid| self.is_alive(&id, pid));
                let log_path = self.logs.path(&id);
                StreamInfo {
                    id,
                    pid,
                    running,
                    log_path,
                }
            })
            .collect())
    }

    pub fn logs(&self, id: &StreamId, max_lines: usize) -> Result<String> {
        self.logs.tail(id, max_lines)
    }

    /// Delete every record whose process is gone or whose content is corrupt.
    pub async fn cleanup_stale_pids(&self) -> Result<Vec<CleanedRecord>> {
        let mut cleaned = Vec::new();
        for (id, _) in self.pids.list_all()? {
            let _guard = self.locks.acquire(&id).await;
            if let Some(record) = self.cleanup_record(&id) {
                cleaned.push(record);
            }
        }
        Ok(cleaned)
    }

    fn cleanup_record(&self, id: &StreamId) -> Option<CleanedRecord> {
        let (action, pid) = match self.read_record(id)? {
            RecordedPid::Valid(pid) if self.is_alive(id, pid) => return None,
            RecordedPid::Valid(pid) => (CleanupAction::RemovedStalePidfile, Some(pid)),
            RecordedPid::Invalid => (CleanupAction::RemovedInvalidPidfile, None),
        };
        if let Err(e) = self.forget(id) {
            warn!("[{id}] failed to remove pid record: {e}");
            return None;
        }
        info!("[{id}] cleanup: {action:?}");
        Some(CleanedRecord {
            id: id.clone(),
            action,
            pid,
        })
    }

    /// Stop every recorded stream. One failure does not abort the rest.
    pub async fn stop_all(&self) -> Result<Vec<StopOutcome>> {
        let mut stopped = Vec::new();
        for (id, _) in self.pids.list_all()? {
            let outcome = match self.stop(&id).await {
                Ok(pid) => StopOutcome {
                    id,
                    pid: Some(pid),
                    error: None,
                },
                Err(e) => StopOutcome {
                    id,
                    pid: None,
                    error: Some(e.to_string()),
                },
            };
            stopped.push(outcome);
        }
        Ok(stopped)
    }

    /// Best-effort stop of `id` followed by a cleanup limited to `id`.
    pub async fn kill_and_cleanup(&self, id: &StreamId) -> KillAndCleanup {
        let _guard = self.locks.acquire(id).await;

        let pid = match self.read_record(id) {
            Some(RecordedPid::Valid(_)) => match self.stop_locked(id).await {
                Ok(pid) => Some(pid),
                Err(e) => {
                    warn!("[{id}] stop during kill failed: {e}");
                    None
                }
            },
            _ => None,
        };

        KillAndCleanup {
            id: id.clone(),
            pid,
            cleaned: self.cleanup_record(id).into_iter().collect(),
        }
    }

    /// Kill every live process named in the PID directory.
    ///
    /// Candidates come only from our own records. A candidate whose command
    /// line is readable and does not mention the transcoder is skipped; when
    /// the command line cannot be read the record is trusted.
    pub async fn kill_all_managed(&self) -> Result<Vec<KilledProcess>> {
        let mut killed = Vec::new();

        for (id, _) in self.pids.list_all()? {
            let _guard = self.locks.acquire(&id).await;

            let pid = match self.read_record(&id) {
                None => continue,
                Some(RecordedPid::Invalid) => {
                    info!("[{id}] removing invalid pid record");
                    if let Err(e) = self.forget(&id) {
                        warn!("[{id}] failed to remove pid record: {e}");
                    }
                    continue;
                }
                Some(RecordedPid::Valid(pid)) => pid,
            };

            if !self.is_alive(&id, pid) {
                debug!("[{id}] pid {pid} not running, skipping");
                continue;
            }

            match process::check_command_line(pid, &self.binary_name) {
                CommandLineCheck::Matches => {}
                CommandLineCheck::Mismatch => {
                    warn!(
                        "[{id}] pid {pid} is not a {} process, leaving it alone",
                        self.binary_name
                    );
                    continue;
                }
                CommandLineCheck::Unavailable => {
                    debug!("[{id}] cannot verify command line of pid {pid}, trusting the record");
                }
            }

            info!("[{id}] killing pid {pid}");
            let signaled =
                process::terminate_group(pid, self.stop_timeouts, || self.is_alive(&id, pid)).await;
            if let Err(e) = self.forget(&id) {
                warn!("[{id}] failed to remove pid record: {e}");
            }
            match signaled {
                Ok(_) => killed.push(KilledProcess { id: id.clone(), pid }),
                Err(e) => warn!("[{id}] failed to signal pid {pid}: {e}"),
            }
        }

        Ok(killed)
    }
}
