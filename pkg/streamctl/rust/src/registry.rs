// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Children owned by this supervisor instance.
//!
//! The registry is a cache over the PID directory: it is empty after a
//! restart while records on disk still describe running relays, and every
//! caller must cope with a missing entry.

use crate::stream_id::StreamId;
use log::{info, warn};
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::process::ExitStatus;
use std::sync::{Mutex, MutexGuard};
use tokio::process::Child;

/// A spawned relay together with the log handle its output goes to.
#[derive(Debug)]
pub struct RunningProcess {
    child: Child,
    log: File,
    pid: u32,
    argv: Vec<String>,
}

impl RunningProcess {
    pub fn new(child: Child, log: File, pid: u32, argv: Vec<String>) -> Self {
        Self {
            child,
            log,
            pid,
            argv,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Non-blocking reap. `Some` once the child has exited.
    fn try_exit_status(&mut self, id: &StreamId) -> Option<ExitStatus> {
        match self.child.try_wait() {
            Ok(status) => status,
            Err(e) => {
                warn!("[{id}] failed to poll child {}: {e}", self.pid);
                None
            }
        }
    }

    /// Flush and close the log handle. The child handle is dropped without
    /// killing it; tokio reaps it in the background if it is still running.
    pub fn close(mut self, id: &StreamId) {
        if let Err(e) = self.log.flush() {
            warn!("[{id}] failed to flush log handle: {e}");
        }
    }
}

#[derive(Debug, Default)]
pub struct ProcessRegistry {
    entries: Mutex<HashMap<StreamId, RunningProcess>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<StreamId, RunningProcess>> {
        // A panic while holding the lock leaves the map itself consistent.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `process`, closing any entry it replaces.
    pub fn insert(&self, id: StreamId, process: RunningProcess) {
        let previous = self.lock().insert(id.clone(), process);
        if let Some(previous) = previous {
            warn!("[{id}] replacing registry entry for pid {}", previous.pid);
            previous.close(&id);
        }
    }

    /// Remove the entry for `id` and close its log handle.
    pub fn release(&self, id: &StreamId) -> bool {
        let removed = self.lock().remove(id);
        match removed {
            Some(process) => {
                process.close(id);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &StreamId) -> bool {
        self.lock().contains_key(id)
    }

    pub fn pid(&self, id: &StreamId) -> Option<u32> {
        self.lock().get(id).map(RunningProcess::pid)
    }

    /// Command line the entry for `id` was spawned with.
    pub fn argv(&self, id: &StreamId) -> Option<Vec<String>> {
        self.lock().get(id).map(|p| p.argv.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// If we own the child recorded as `pid` for `id` and it has exited, reap
    /// it, drop the entry and return `true`.
    pub fn reap_if_exited(&self, id: &StreamId, pid: u32) -> bool {
        let mut entries = self.lock();
        let Some(process) = entries.get_mut(id) else {
            return false;
        };
        if process.pid != pid {
            return false;
        }
        let Some(status) = process.try_exit_status(id) else {
            return false;
        };
        let removed = entries.remove(id);
        drop(entries);
        if let Some(process) = removed {
            info!("[{id}] child {pid} exited with {status}");
            process.close(id);
        }
        true
    }
}
