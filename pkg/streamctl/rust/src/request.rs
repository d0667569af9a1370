// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::errors::{Error, Result};
use crate::overlay::apply_overlay;
use crate::stream_id::StreamId;
use serde::Deserialize;
use serde_json::Value;

/// Body of a start request as sent by clients.
#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub hls: Option<String>,
    #[serde(default)]
    pub rtmp: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    /// Kept loose so a non-array value can be reported as a validation error.
    #[serde(default)]
    pub extra_args: Option<Value>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub overlay_mode: Option<String>,
}

/// Inputs for [`crate::Supervisor::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedStart {
    pub source: String,
    pub sink: String,
    pub id: StreamId,
    pub extra_args: Vec<String>,
}

impl StartRequest {
    pub fn validate(&self) -> Result<ValidatedStart> {
        let source = trimmed(&self.hls);
        if source.is_empty() {
            return Err(Error::Validation("HLS URL is required".to_string()));
        }
        let sink = trimmed(&self.rtmp);
        if sink.is_empty() {
            return Err(Error::Validation("RTMP URL is required".to_string()));
        }
        let id = StreamId::from_request(self.id.as_deref())?;

        let mut extra_args = match &self.extra_args {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(arg_to_string)
                .collect::<Result<Vec<_>>>()?,
            Some(_) => return Err(Error::Validation("extra_args must be a list".to_string())),
        };

        let image = trimmed(&self.image);
        if !image.is_empty() {
            extra_args = apply_overlay(&image, self.overlay_mode.as_deref(), &extra_args);
        }

        Ok(ValidatedStart {
            source,
            sink,
            id,
            extra_args,
        })
    }
}

fn trimmed(value: &Option<String>) -> String {
    value.as_deref().map(str::trim).unwrap_or_default().to_string()
}

fn arg_to_string(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(Error::Validation(format!(
            "extra_args entries must be strings or numbers, got {other}"
        ))),
    }
}
