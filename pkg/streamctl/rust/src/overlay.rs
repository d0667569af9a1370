// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::command::contains_any_keyword;

pub const FULL_OVERLAY_MODE: &str = "full";

/// Centers input 1 over input 0.
pub const CENTERED_OVERLAY_FILTER: &str = "[0:v][1:v]overlay=(W-w)/2:(H-h)/2:format=auto";

const FILTER_KEYWORDS: &[&str] = &["-filter_complex", "overlay"];

/// Add `image` as a second input and, for the `full` mode, a filter graph
/// that centers it over the video. Applying it twice with the same inputs
/// changes nothing the second time.
pub fn apply_overlay(image: &str, overlay_mode: Option<&str>, existing: &[String]) -> Vec<String> {
    let mut args = existing.to_vec();

    let has_input_flag = args.iter().any(|a| a == "-i");
    let has_image = args.iter().any(|a| a == image);
    if !has_input_flag || !has_image {
        // After the first `-i <value>` pair, or at the front.
        let at = args
            .iter()
            .position(|a| a == "-i")
            .map_or(0, |i| (i + 2).min(args.len()));
        args.splice(at..at, ["-i".to_string(), image.to_string()]);
    }

    if overlay_mode == Some(FULL_OVERLAY_MODE) && !contains_any_keyword(&args, FILTER_KEYWORDS) {
        args.extend([
            "-filter_complex".to_string(),
            CENTERED_OVERLAY_FILTER.to_string(),
        ]);
    }

    args
}
