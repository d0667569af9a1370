// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Builds the transcoder invocation for one relay: paced HLS input, optional
//! caller arguments, then video copy or re-encode, audio always re-encoded.

use crate::config::{AudioEncoding, VideoEncoding};
use crate::errors::{Error, Result};
use std::path::PathBuf;

/// Substrings of the joined extra arguments that imply the video stream is
/// being filtered and therefore cannot be copied.
///
/// This is a plain substring heuristic: an unrelated argument (say, a file
/// path containing "scale") also triggers re-encoding.
pub const REENCODE_KEYWORDS: &[&str] = &[
    "-filter_complex",
    "-vf",
    "drawtext",
    "overlay",
    "format=",
    "scale",
    "crop",
];

/// Program plus arguments, ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl TranscodeCommand {
    /// Full argument vector including the program, for logging and display.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.program.to_string_lossy().into_owned());
        argv.extend(self.args.iter().cloned());
        argv
    }
}

#[derive(Debug, Clone)]
pub struct CommandBuilder {
    binary: PathBuf,
    video: VideoEncoding,
    audio: AudioEncoding,
    output_format: String,
}

impl CommandBuilder {
    pub fn new(
        binary: PathBuf,
        video: VideoEncoding,
        audio: AudioEncoding,
        output_format: String,
    ) -> Self {
        Self {
            binary,
            video,
            audio,
            output_format,
        }
    }

    /// Build the command relaying `source` to `sink`.
    ///
    /// Fails with [`Error::BinaryNotFound`] before anything else if the
    /// configured transcoder is missing. Same inputs, same output.
    pub fn build(&self, source: &str, sink: &str, extra_args: &[String]) -> Result<TranscodeCommand> {
        if !self.binary.exists() {
            return Err(Error::BinaryNotFound(self.binary.clone()));
        }

        let mut args: Vec<String> = vec!["-re".into(), "-i".into(), source.into()];
        args.extend(extra_args.iter().cloned());

        if should_reencode(extra_args) {
            args.extend([
                "-c:v".into(),
                self.video.codec.clone(),
                "-preset".into(),
                self.video.preset.clone(),
                "-tune".into(),
                self.video.tune.clone(),
                "-b:v".into(),
                self.video.bitrate.clone(),
            ]);
        } else {
            args.extend(["-c:v".into(), "copy".into()]);
        }

        args.extend([
            "-c:a".into(),
            self.audio.codec.clone(),
            "-ar".into(),
            self.audio.sample_rate.clone(),
            "-b:a".into(),
            self.audio.bitrate.clone(),
            "-f".into(),
            self.output_format.clone(),
            sink.into(),
        ]);

        Ok(TranscodeCommand {
            program: self.binary.clone(),
            args,
        })
    }
}

/// True if any [`REENCODE_KEYWORDS`] entry occurs in the space-joined,
/// lowercased `extra_args`.
pub fn should_reencode(extra_args: &[String]) -> bool {
    contains_any_keyword(extra_args, REENCODE_KEYWORDS)
}

pub(crate) fn contains_any_keyword(args: &[String], keywords: &[&str]) -> bool {
    if args.is_empty() {
        return false;
    }
    let joined = args.join(" ").to_lowercase();
    keywords.iter().any(|k| joined.contains(k))
}
