// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::process::StopTimeouts;
use anyhow::{Context, Result};
use log::{LevelFilter, warn};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/streamctl/streamctl.yaml";
pub const DEFAULT_AUTH_TOKEN: &str = "CHANGE_ME";

const DEFAULT_BASE_DIR: &str = "/var/streamctl";
const DEFAULT_TRANSCODER_BIN: &str = "/usr/bin/ffmpeg";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VideoEncoding {
    pub codec: String,
    pub preset: String,
    pub tune: String,
    pub bitrate: String,
}

impl Default for VideoEncoding {
    fn default() -> Self {
        Self {
            codec: "libx264".to_string(),
            preset: "veryfast".to_string(),
            tune: "zerolatency".to_string(),
            bitrate: "2000k".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AudioEncoding {
    pub codec: String,
    pub sample_rate: String,
    pub bitrate: String,
}

impl Default for AudioEncoding {
    fn default() -> Self {
        Self {
            codec: "aac".to_string(),
            sample_rate: "44100".to_string(),
            bitrate: "128k".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StopConfig {
    pub grace_ms: u64,
    pub kill_wait_ms: u64,
}

impl Default for StopConfig {
    fn default() -> Self {
        let defaults = StopTimeouts::default();
        Self {
            grace_ms: u64::try_from(defaults.grace.as_millis()).unwrap_or(1500),
            kill_wait_ms: u64::try_from(defaults.kill_wait.as_millis()).unwrap_or(500),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub auth_token: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            auth_token: DEFAULT_AUTH_TOKEN.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Parent of `pids/` and `logs/` unless those are set explicitly.
    pub base_dir: PathBuf,
    pub pid_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub transcoder_bin: PathBuf,
    pub video: VideoEncoding,
    pub audio: AudioEncoding,
    /// Output container passed to `-f`.
    pub output_format: String,
    pub stop: StopConfig,
    pub server: ServerConfig,
    pub log_level: String,
    /// Stop every recorded stream when the daemon exits. Off by default so
    /// relays survive a daemon restart.
    pub stop_streams_on_exit: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            pid_dir: None,
            log_dir: None,
            transcoder_bin: PathBuf::from(DEFAULT_TRANSCODER_BIN),
            video: VideoEncoding::default(),
            audio: AudioEncoding::default(),
            output_format: "flv".to_string(),
            stop: StopConfig::default(),
            server: ServerConfig::default(),
            log_level: "info".to_string(),
            stop_streams_on_exit: false,
        }
    }
}

impl Config {
    pub fn pid_dir(&self) -> PathBuf {
        self.pid_dir
            .clone()
            .unwrap_or_else(|| self.base_dir.join("pids"))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| self.base_dir.join("logs"))
    }

    pub fn stop_timeouts(&self) -> StopTimeouts {
        StopTimeouts {
            grace: Duration::from_millis(self.stop.grace_ms),
            kill_wait: Duration::from_millis(self.stop.kill_wait_ms),
        }
    }

    /// Unknown level names fall back to `info`.
    pub fn log_level(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or_else(|_| {
            warn!("unknown log_level '{}', using info", self.log_level);
            LevelFilter::Info
        })
    }

    /// Apply `STREAM_CTL_DIR`, `FFMPEG_BIN`, `PORT`, `WEBHOOK_TOKEN` and
    /// `STREAMCTL_LOG_LEVEL` from `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("STREAM_CTL_DIR") {
            self.base_dir = PathBuf::from(dir);
        }
        if let Some(bin) = lookup("FFMPEG_BIN") {
            self.transcoder_bin = PathBuf::from(bin);
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("invalid PORT: {port}"))?;
        }
        if let Some(token) = lookup("WEBHOOK_TOKEN") {
            self.server.auth_token = token;
        }
        if let Some(level) = lookup("STREAMCTL_LOG_LEVEL") {
            self.log_level = level;
        }
        Ok(())
    }
}

/// Read `path` if it exists (a missing file means defaults), then apply
/// environment overrides.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        parse_config(path)?
    } else {
        warn!(
            "config file not found at {}, using defaults and environment",
            path.display()
        );
        Config::default()
    };
    config.apply_env(|key| std::env::var(key).ok())?;
    Ok(config)
}

fn parse_config(path: &Path) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config: Config =
        serde_yaml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
    Ok(config)
}
