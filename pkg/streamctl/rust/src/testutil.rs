// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Stand-in transcoder scripts and per-test supervisor state.

use crate::config::{Config, StopConfig};
use crate::supervisor::Supervisor;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tempfile::TempDir;

/// Behaviour of the fake `ffmpeg`. Each variant lives in its own directory
/// so the executable is always called `ffmpeg`.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Script {
    /// Logs its arguments, then waits on a background sleep so the group
    /// has two members.
    Relay,
    IgnoresTerm,
    ExitsImmediately,
}

impl Script {
    fn dir_name(self) -> &'static str {
        match self {
            Script::Relay => "relay",
            Script::IgnoresTerm => "stubborn",
            Script::ExitsImmediately => "exits",
        }
    }

    fn body(self) -> &'static str {
        match self {
            Script::Relay => "#!/bin/sh\necho \"relay $*\"\nsleep 300 &\nwait\n",
            Script::IgnoresTerm => "#!/bin/sh\ntrap '' TERM\nsleep 300 &\nwait\n",
            Script::ExitsImmediately => "#!/bin/sh\necho \"bad input\" >&2\nexit 1\n",
        }
    }
}

/// Scripts are written once per test binary. Writing an executable while
/// other threads fork can make exec fail with ETXTBSY.
fn scripts_dir() -> &'static Path {
    static SCRIPTS: OnceLock<TempDir> = OnceLock::new();
    SCRIPTS
        .get_or_init(|| {
            let dir = tempfile::tempdir().unwrap();
            for script in [Script::Relay, Script::IgnoresTerm, Script::ExitsImmediately] {
                let sub = dir.path().join(script.dir_name());
                fs::create_dir(&sub).unwrap();
                let path = sub.join("ffmpeg");
                fs::write(&path, script.body()).unwrap();
                fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            }
            dir
        })
        .path()
}

pub(crate) fn script_path(script: Script) -> PathBuf {
    scripts_dir().join(script.dir_name()).join("ffmpeg")
}

pub(crate) struct Fixture {
    dir: TempDir,
    script: Script,
}

impl Fixture {
    pub(crate) fn new(script: Script) -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            script,
        }
    }

    pub(crate) fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub(crate) fn pid_dir(&self) -> PathBuf {
        self.dir().join("pids")
    }

    pub(crate) fn log_dir(&self) -> PathBuf {
        self.dir().join("logs")
    }

    pub(crate) fn config(&self) -> Config {
        Config {
            base_dir: self.dir().to_path_buf(),
            transcoder_bin: script_path(self.script),
            stop: StopConfig {
                grace_ms: 500,
                kill_wait_ms: 1000,
            },
            ..Config::default()
        }
    }

    pub(crate) fn supervisor(&self) -> Supervisor {
        Supervisor::new(&self.config()).unwrap()
    }

    /// Pid of a process that has already exited and been reaped.
    pub(crate) async fn dead_pid(&self) -> u32 {
        let mut child = tokio::process::Command::new("/bin/true").spawn().unwrap();
        let pid = child.id().unwrap();
        child.wait().await.unwrap();
        pid
    }
}
