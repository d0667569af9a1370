// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info, warn};
use simple_logger::SimpleLogger;
use std::path::PathBuf;
use std::sync::Arc;
use streamctl::config::{DEFAULT_AUTH_TOKEN, DEFAULT_CONFIG_PATH};
use streamctl::http::{self, ApiState};
use streamctl::{Supervisor, load_config};
use tokio::net::TcpListener;
use tokio::signal::unix::{SignalKind, signal};

/// HTTP control plane for transcoder relay processes
#[derive(Parser, Debug)]
#[command(name = "streamctld")]
struct Args {
    /// YAML configuration file. Missing means defaults plus environment.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The configured level is only known after the config is loaded.
    SimpleLogger::new().with_level(LevelFilter::Trace).init()?;
    log::set_max_level(LevelFilter::Info);

    let config = load_config(&args.config)?;
    log::set_max_level(config.log_level());
    info!(
        "streamctld starting (version {})",
        env!("CARGO_PKG_VERSION")
    );
    info!(
        "pid dir: {}, log dir: {}, transcoder: {}",
        config.pid_dir().display(),
        config.log_dir().display(),
        config.transcoder_bin.display()
    );
    if config.server.auth_token == DEFAULT_AUTH_TOKEN {
        warn!("auth token is left at its default, set WEBHOOK_TOKEN or server.auth_token");
    }

    let supervisor =
        Arc::new(Supervisor::new(&config).context("Failed to prepare state directories")?);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("listening on {}", listener.local_addr()?);

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;
    let shutdown = async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    };

    let state = ApiState::new(Arc::clone(&supervisor), &config.server.auth_token);
    http::serve(listener, state, shutdown).await;

    if config.stop_streams_on_exit {
        let stopped = supervisor.stop_all().await?;
        info!("stopped {} stream(s) before exit", stopped.len());
    } else {
        let remaining = supervisor.registry().len();
        if remaining > 0 {
            info!("leaving {remaining} stream(s) running");
        }
    }

    info!("streamctld shutting down");
    Ok(())
}
