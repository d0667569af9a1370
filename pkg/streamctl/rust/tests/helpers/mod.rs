// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

#![allow(dead_code)]

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::io::{BufRead, BufReader, Read};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub const TOKEN: &str = "test-token";

/// Environment variables that would override the test config.
const OVERRIDES: &[&str] = &[
    "STREAM_CTL_DIR",
    "FFMPEG_BIN",
    "PORT",
    "WEBHOOK_TOKEN",
    "STREAMCTL_LOG_LEVEL",
];

/// Handle to a running streamctld process.
pub struct DaemonHandle {
    child: Child,
    log_lines: Arc<Mutex<Vec<String>>>,
    _reader_thread: std::thread::JoinHandle<()>,
    _stderr_thread: std::thread::JoinHandle<()>,
}

fn forward_lines<R: Read + Send + 'static>(
    source: R,
    tag: &'static str,
    lines: Arc<Mutex<Vec<String>>>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        for line in BufReader::new(source).lines() {
            match line {
                Ok(l) => {
                    eprintln!("[{tag}] {l}");
                    lines.lock().unwrap().push(l);
                }
                Err(_) => break,
            }
        }
    })
}

impl DaemonHandle {
    /// Start the daemon with `--config <config>`.
    pub fn start(config: &Path) -> Self {
        let bin = env!("CARGO_BIN_EXE_streamctld");
        let mut cmd = Command::new(bin);
        cmd.arg("--config").arg(config);
        for key in OVERRIDES {
            cmd.env_remove(key);
        }
        let mut child = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("failed to start streamctld");

        let stdout = child.stdout.take().expect("failed to capture stdout");
        let stderr = child.stderr.take().expect("failed to capture stderr");
        let log_lines = Arc::new(Mutex::new(Vec::<String>::new()));

        Self {
            _reader_thread: forward_lines(stdout, "daemon", Arc::clone(&log_lines)),
            _stderr_thread: forward_lines(stderr, "daemon:err", Arc::clone(&log_lines)),
            child,
            log_lines,
        }
    }

    /// Wait until a log line containing `pattern` appears, or timeout.
    pub fn wait_for_log(&self, pattern: &str, timeout: Duration) -> bool {
        self.find_log(pattern, timeout).is_some()
    }

    pub fn wait_for_log_default(&self, pattern: &str) -> bool {
        self.wait_for_log(pattern, DEFAULT_TIMEOUT)
    }

    fn find_log(&self, pattern: &str, timeout: Duration) -> Option<String> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let lines = self.log_lines.lock().unwrap();
                if let Some(line) = lines.iter().find(|l| l.contains(pattern)) {
                    return Some(line.clone());
                }
            }
            if Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    /// Address scraped from the "listening on <addr>" log line.
    pub fn addr(&self) -> String {
        let marker = "listening on ";
        let line = self
            .find_log(marker, DEFAULT_TIMEOUT)
            .expect("daemon never logged its listen address");
        let start = line.find(marker).unwrap() + marker.len();
        line[start..]
            .split_whitespace()
            .next()
            .expect("empty listen address")
            .to_string()
    }

    pub fn send_signal(&self, sig: Signal) {
        let pid = self.child.id() as i32;
        signal::kill(Pid::from_raw(pid), sig).expect("failed to send signal to daemon");
    }

    /// Send SIGTERM and wait for the daemon to exit. Returns the exit status.
    pub fn stop(&mut self) -> std::process::ExitStatus {
        self.send_signal(Signal::SIGTERM);
        self.wait_with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn wait_with_timeout(&mut self, timeout: Duration) -> std::process::ExitStatus {
        let deadline = Instant::now() + timeout;
        loop {
            match self
                .child
                .try_wait()
                .expect("failed to check daemon status")
            {
                Some(status) => return status,
                None => {
                    if Instant::now() >= deadline {
                        self.child.kill().ok();
                        return self.child.wait().expect("failed to wait on killed daemon");
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
            }
        }
    }
}

impl Drop for DaemonHandle {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl HttpResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body)
            .unwrap_or_else(|e| panic!("response is not JSON ({e}): {}", self.body))
    }
}

fn client() -> &'static reqwest::blocking::Client {
    static CLIENT: OnceLock<reqwest::blocking::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .no_proxy()
            .build()
            .expect("failed to build HTTP client")
    })
}

/// One request against the daemon at `addr`.
pub fn http(addr: &str, method: &str, path: &str, token: Option<&str>, body: &str) -> HttpResponse {
    let method = reqwest::Method::from_bytes(method.as_bytes()).expect("invalid HTTP method");
    let mut request = client()
        .request(method, format!("http://{addr}{path}"))
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(body.to_string());
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }

    let response = request.send().expect("request to daemon failed");
    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.text().expect("failed to read response body");
    HttpResponse {
        status,
        content_type,
        body,
    }
}

pub fn get(addr: &str, path: &str) -> HttpResponse {
    http(addr, "GET", path, Some(TOKEN), "")
}

pub fn post(addr: &str, path: &str, body: &str) -> HttpResponse {
    http(addr, "POST", path, Some(TOKEN), body)
}

/// A stand-in `ffmpeg` that logs its arguments and keeps a child `sleep`
/// in its process group. Written once per test binary.
pub fn fake_ffmpeg() -> PathBuf {
    static SCRIPT: OnceLock<tempfile::TempDir> = OnceLock::new();
    SCRIPT
        .get_or_init(|| {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("ffmpeg");
            std::fs::write(&path, "#!/bin/sh\necho \"relay $*\"\nsleep 300 &\nwait\n").unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            dir
        })
        .path()
        .join("ffmpeg")
}

/// Write a config for a daemon on an ephemeral local port, keeping its
/// state under `dir`. Returns the config path.
pub fn write_config(dir: &Path, extra_yaml: &str) -> PathBuf {
    let path = dir.join("streamctl.yaml");
    let yaml = format!(
        "base_dir: {base}\ntranscoder_bin: {bin}\nserver:\n  host: 127.0.0.1\n  port: 0\n  auth_token: {TOKEN}\nstop:\n  grace_ms: 500\n  kill_wait_ms: 1000\n{extra_yaml}",
        base = dir.join("state").display(),
        bin = fake_ffmpeg().display(),
    );
    std::fs::write(&path, yaml)
        .unwrap_or_else(|e| panic!("failed to write {}: {e}", path.display()));
    path
}

pub fn pid_is_alive(pid: u32) -> bool {
    signal::kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Gone, or a zombie waiting for a reaper we do not control.
pub fn pid_is_gone(pid: u32) -> bool {
    if !pid_is_alive(pid) {
        return true;
    }
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            let (_, rest) = stat.rsplit_once(')')?;
            rest.trim_start().chars().next()
        })
        .is_some_and(|state| state == 'Z')
}

pub fn wait_for_pid_gone(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if pid_is_gone(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

/// Kill a leftover process group so a failed test does not leak sleepers.
pub fn kill_group(pid: u32) {
    let _ = signal::killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
}
