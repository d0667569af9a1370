// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("stream '{id}' already running (PID: {pid})")]
    AlreadyRunning { id: String, pid: u32 },

    #[error("stream '{0}' is not running")]
    NotRunning(String),

    #[error("transcoder binary not found at {}", .0.display())]
    BinaryNotFound(PathBuf),

    #[error("log file not found for stream '{0}'")]
    LogNotFound(String),

    #[error("invalid stream id: {0}")]
    InvalidStreamId(String),

    #[error("{0}")]
    Validation(String),

    #[error("failed to spawn stream '{id}': {source}")]
    Spawn {
        id: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Coarse classification used by callers to pick a response code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Conflict,
    NotFound,
    Precondition,
    Invalid,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::AlreadyRunning { .. } => ErrorKind::Conflict,
            Error::NotRunning(_) | Error::LogNotFound(_) => ErrorKind::NotFound,
            Error::BinaryNotFound(_) => ErrorKind::Precondition,
            Error::InvalidStreamId(_) | Error::Validation(_) => ErrorKind::Invalid,
            Error::Spawn { .. } | Error::Io(_) => ErrorKind::Internal,
        }
    }
}
