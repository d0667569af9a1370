// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Durable `stream id -> pid` records, one `<id>.pid` file per stream.
//!
//! The PID directory is the source of truth for "is this stream believed to
//! be running". It survives supervisor restarts, so every bulk operation scans
//! it instead of the in-memory registry.

use crate::stream_id::StreamId;
use log::{debug, warn};
use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

const PID_EXTENSION: &str = "pid";

/// Content of a record file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordedPid {
    Valid(u32),
    /// Unparsable, zero, negative or out of `pid_t` range.
    Invalid,
}

impl RecordedPid {
    pub fn pid(self) -> Option<u32> {
        match self {
            RecordedPid::Valid(pid) => Some(pid),
            RecordedPid::Invalid => None,
        }
    }
}

/// Parse the trimmed file content. Only `1..=i32::MAX` is a usable pid:
/// `0` or a negative value would address a whole process group.
pub fn parse_pid(contents: &str) -> RecordedPid {
    match contents.trim().parse::<u32>() {
        Ok(pid) if pid > 0 && i32::try_from(pid).is_ok() => RecordedPid::Valid(pid),
        _ => RecordedPid::Invalid,
    }
}

#[derive(Debug)]
pub struct PidFileStore {
    dir: PathBuf,
}

impl PidFileStore {
    /// Use `dir` as the PID directory, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, id: &StreamId) -> PathBuf {
        self.dir.join(format!("{id}.{PID_EXTENSION}"))
    }

    /// Returns `Ok(None)` when no record exists for `id`.
    pub fn read(&self, id: &StreamId) -> io::Result<Option<RecordedPid>> {
        match fs::read_to_string(self.path(id)) {
            Ok(contents) => Ok(Some(parse_pid(&contents))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Replace the record for `id`. The value is written to a hidden sibling
    /// and renamed into place so readers never observe a partial write.
    pub fn write(&self, id: &StreamId, pid: u32) -> io::Result<()> {
        let tmp = self.dir.join(format!(".{id}.{PID_EXTENSION}.tmp"));
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(pid.to_string().as_bytes())?;
        file.sync_all()?;
        drop(file);
        if let Err(e) = fs::rename(&tmp, self.path(id)) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        debug!("[{id}] wrote pid record ({pid})");
        Ok(())
    }

    /// Remove the record for `id`. Returns whether a file was removed;
    /// a missing record is not an error.
    pub fn delete(&self, id: &StreamId) -> io::Result<bool> {
        match fs::remove_file(self.path(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Enumerate every record, sorted by identifier. A record that cannot be
    /// read is reported as [`RecordedPid::Invalid`]. Files whose stem is not a
    /// valid identifier were not written by us and are skipped.
    pub fn list_all(&self) -> io::Result<Vec<(StreamId, RecordedPid)>> {
        let mut records = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("skipping unreadable entry in {}: {e}", self.dir.display());
                    continue;
                }
            };
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != PID_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                warn!("skipping non UTF-8 record name: {}", path.display());
                continue;
            };
            let id = match StreamId::new(stem) {
                Ok(id) => id,
                Err(e) => {
                    warn!("skipping foreign record {}: {e}", path.display());
                    continue;
                }
            };
            let pid = match fs::read_to_string(&path) {
                Ok(contents) => parse_pid(&contents),
                Err(e) => {
                    warn!("[{id}] unreadable pid record: {e}");
                    RecordedPid::Invalid
                }
            };
            records.push((id, pid));
        }

        records.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(records)
    }
}
