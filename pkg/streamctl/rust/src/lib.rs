// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

// Correctness
#![deny(clippy::indexing_slicing)]
#![deny(clippy::string_slice)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::undocumented_unsafe_blocks)]
// Panicking code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unimplemented)]
#![deny(clippy::todo)]
// Debug code that shouldn't be in production
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![cfg_attr(
    test,
    allow(
        clippy::indexing_slicing,
        clippy::cast_possible_wrap,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic
    )
)]

//! Supervisor for transcoder relay processes.
//!
//! Each stream is one child process relaying an HLS source to an RTMP sink.
//! Durable state is a directory of `<id>.pid` files, so streams survive a
//! restart of the supervisor and can be stopped by the next instance.

pub mod command;
pub mod config;
pub mod errors;
pub mod http;
pub mod logs;
pub mod overlay;
pub mod pidfile;
pub mod process;
pub mod registry;
pub mod request;
pub mod stream_id;
pub mod supervisor;

#[cfg(test)]
mod testutil;

pub use config::{Config, load_config};
pub use errors::{Error, ErrorKind, Result};
pub use request::{StartRequest, ValidatedStart};
pub use stream_id::StreamId;
pub use supervisor::Supervisor;
