// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::errors::{Error, Result};
use serde::Serialize;
use std::fmt;

pub const DEFAULT_STREAM_ID: &str = "stream";
const MAX_LEN: usize = 128;

/// Caller-chosen key for one supervised relay.
///
/// Identifiers are used verbatim as file names in the PID and log
/// directories, so only `[A-Za-z0-9_.-]` is accepted and a leading `.` is
/// rejected. This rules out path separators, `..` and hidden files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    pub fn new(raw: &str) -> Result<Self> {
        if raw.is_empty() || raw.len() > MAX_LEN {
            return Err(Error::InvalidStreamId(format!(
                "'{raw}' must be 1 to {MAX_LEN} characters"
            )));
        }
        if raw.starts_with('.') {
            return Err(Error::InvalidStreamId(format!(
                "'{raw}' must not start with '.'"
            )));
        }
        if let Some(bad) = raw.chars().find(|c| !is_allowed(*c)) {
            return Err(Error::InvalidStreamId(format!(
                "'{raw}' contains disallowed character {bad:?}"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    /// Trim the caller's value and fall back to `"stream"` when absent or blank.
    pub fn from_request(raw: Option<&str>) -> Result<Self> {
        match raw.map(str::trim) {
            Some(s) if !s.is_empty() => Self::new(s),
            _ => Ok(Self(DEFAULT_STREAM_ID.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StreamId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
