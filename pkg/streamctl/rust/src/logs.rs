// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Per-stream append-only log files and bounded tail reads.

use crate::errors::{Error, Result};
use crate::stream_id::StreamId;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

const INITIAL_CHUNK: u64 = 1024;
const MAX_CHUNK: u64 = 10 * 1024 * 1024;

pub const DEFAULT_TAIL_LINES: usize = 200;
pub const MAX_TAIL_LINES: usize = 10_000;

/// Clamp a caller-supplied line count to `1..=MAX_TAIL_LINES`.
pub fn clamp_tail_lines(requested: i64) -> usize {
    let max = i64::try_from(MAX_TAIL_LINES).unwrap_or(i64::MAX);
    usize::try_from(requested.clamp(1, max)).unwrap_or(DEFAULT_TAIL_LINES)
}

#[derive(Debug)]
pub struct LogStore {
    dir: PathBuf,
}

impl LogStore {
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path(&self, id: &StreamId) -> PathBuf {
        self.dir.join(format!("{id}.log"))
    }

    /// Open (creating if absent) the stream's log for appending.
    pub fn open_append(&self, id: &StreamId) -> io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(id))
    }

    /// Last `max_lines` lines of the stream's log.
    pub fn tail(&self, id: &StreamId, max_lines: usize) -> Result<String> {
        match read_tail(&self.path(id), max_lines) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::LogNotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

/// Return the last `max_lines` newline-delimited lines of `path`, joined with
/// `\n` and without a trailing newline.
///
/// The file is read backwards in chunks that double from 1 KiB up to 10 MiB,
/// stopping once enough line boundaries have been seen. Invalid UTF-8 is
/// replaced rather than rejected.
pub fn read_tail(path: &Path, max_lines: usize) -> io::Result<String> {
    let mut file = File::open(path)?;
    let size = file.seek(SeekFrom::End(0))?;
    if size == 0 || max_lines == 0 {
        return Ok(String::new());
    }

    let mut data: Vec<u8> = Vec::new();
    let mut position = size;
    let mut chunk_size = INITIAL_CHUNK;
    let mut newlines = 0usize;

    while position > 0 {
        let read_size = chunk_size.min(position);
        position -= read_size;
        file.seek(SeekFrom::Start(position))?;

        let mut chunk = vec![0u8; usize::try_from(read_size).map_err(io::Error::other)?];
        file.read_exact(&mut chunk)?;
        newlines += chunk.iter().filter(|&&b| b == b'\n').count();
        chunk.extend_from_slice(&data);
        data = chunk;

        // A newline ending the file terminates the last line; it is not a
        // boundary before one.
        let boundaries = newlines - usize::from(data.last() == Some(&b'\n'));
        if boundaries >= max_lines {
            break;
        }
        chunk_size = (chunk_size * 2).min(MAX_CHUNK);
    }

    let text = String::from_utf8_lossy(&data);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    Ok(lines.get(start..).unwrap_or_default().join("\n"))
}
