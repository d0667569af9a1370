// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! JSON control API over HTTP/1.1.

use crate::errors::{Error, ErrorKind};
use crate::logs::{DEFAULT_TAIL_LINES, clamp_tail_lines};
use crate::request::StartRequest;
use crate::stream_id::StreamId;
use crate::supervisor::Supervisor;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes};
use hyper::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use log::{debug, error, info, warn};
use serde::{Deserialize, Deserializer};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::convert::Infallible;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

pub type ResponseBody = BoxBody<Bytes, std::io::Error>;

const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";

/// Shared by every connection.
#[derive(Debug, Clone)]
pub struct ApiState {
    supervisor: Arc<Supervisor>,
    auth_token: Arc<str>,
}

impl ApiState {
    pub fn new(supervisor: Arc<Supervisor>, auth_token: &str) -> Self {
        Self {
            supervisor,
            auth_token: Arc::from(auth_token),
        }
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }
}

#[derive(Debug, Default, Deserialize)]
struct IdRequest {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CleanupRequest {
    #[serde(default, deserialize_with = "truthy")]
    kill_all_ffmpeg: bool,
}

/// JSON truthiness: `false`, `null`, zero and empty values are false.
fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => false,
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    })
}

/// Accept connections on `listener` until `shutdown` resolves. Each
/// connection is served on its own task.
pub async fn serve<F>(listener: TcpListener, state: ApiState, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("failed to accept connection: {e}");
                        continue;
                    }
                };
                debug!("connection from {peer}");
                let state = state.clone();

                tokio::task::spawn(async move {
                    let service = service_fn(move |req| {
                        let state = state.clone();
                        async move { Ok::<_, Infallible>(handle_request(&state, req).await) }
                    });
                    if let Err(err) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        error!("Error serving connection: {err}");
                    }
                });
            }
            _ = &mut shutdown => {
                info!("no longer accepting connections");
                return;
            }
        }
    }
}

/// Route one request. Never fails: every error becomes a response.
pub async fn handle_request<B>(state: &ApiState, req: Request<B>) -> Response<ResponseBody>
where
    B: Body,
    B::Error: Display,
{
    if !authorized(&req, &state.auth_token) {
        warn!("{} {} rejected: bad credentials", req.method(), req.uri().path());
        return json_response(
            StatusCode::UNAUTHORIZED,
            &json!({
                "error": "Unauthorized",
                "message": "Invalid or missing Bearer token",
            }),
        );
    }

    let (parts, body) = req.into_parts();
    let query = parts.uri.query().unwrap_or_default();
    let sup = state.supervisor();

    match (&parts.method, parts.uri.path()) {
        (&Method::POST, "/start") => {
            let request: StartRequest = match read_json(body).await {
                Ok(r) => r,
                Err(resp) => return resp,
            };
            let validated = match request.validate() {
                Ok(v) => v,
                Err(e) => return error_response(&e),
            };
            match sup.start(&validated).await {
                Ok(pid) => json_response(
                    StatusCode::OK,
                    &json!({"status": "started", "id": validated.id, "pid": pid}),
                ),
                Err(e) => error_response(&e),
            }
        }
        (&Method::POST, "/stop") => {
            let id = match read_id(body).await {
                Ok(id) => id,
                Err(resp) => return resp,
            };
            match sup.stop(&id).await {
                Ok(pid) => json_response(
                    StatusCode::OK,
                    &json!({"status": "stopped", "id": id, "pid": pid}),
                ),
                Err(e) => error_response(&e),
            }
        }
        (&Method::POST, "/kill") => {
            let id = match read_id(body).await {
                Ok(id) => id,
                Err(resp) => return resp,
            };
            json_response(StatusCode::OK, &sup.kill_and_cleanup(&id).await)
        }
        (&Method::GET, "/status") => {
            match StreamId::from_request(query_param(query, "id").as_deref()) {
                Ok(id) => json_response(StatusCode::OK, &sup.status(&id)),
                Err(e) => error_response(&e),
            }
        }
        (&Method::GET, "/list") => match sup.list() {
            Ok(streams) => json_response(StatusCode::OK, &streams),
            Err(e) => error_response(&e),
        },
        (&Method::GET, "/logs") => handle_logs(sup, query),
        (&Method::POST, "/cleanup") => {
            let request: CleanupRequest = read_json(body).await.unwrap_or_else(|_| {
                debug!("Ignoring unusable /cleanup body");
                CleanupRequest::default()
            });
            handle_cleanup(sup, request.kill_all_ffmpeg).await
        }
        (&Method::POST, "/stop-all") => match sup.stop_all().await {
            Ok(stopped) => json_response(StatusCode::OK, &json!({ "stopped": stopped })),
            Err(e) => error_response(&e),
        },
        (method, path) => {
            info!("{method} Request to unknown endpoint: {path}");
            json_response(
                StatusCode::NOT_FOUND,
                &json!({
                    "error": "Not Found",
                    "message": format!("no route for {method} {path}"),
                }),
            )
        }
    }
}

fn handle_logs(sup: &Supervisor, query: &str) -> Response<ResponseBody> {
    let raw_id = query_param(query, "id").unwrap_or_default();
    if raw_id.trim().is_empty() {
        return json_response(
            StatusCode::BAD_REQUEST,
            &json!({"error": "Stream ID is required"}),
        );
    }
    let id = match StreamId::new(raw_id.trim()) {
        Ok(id) => id,
        Err(e) => return error_response(&e),
    };
    let lines = query_param(query, "lines")
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .map_or(DEFAULT_TAIL_LINES, clamp_tail_lines);

    match sup.logs(&id, lines) {
        Ok(text) => respond(StatusCode::OK, TEXT, text.into_bytes()),
        Err(e) => error_response(&e),
    }
}

async fn handle_cleanup(sup: &Supervisor, kill_all: bool) -> Response<ResponseBody> {
    let cleaned = match sup.cleanup_stale_pids().await {
        Ok(cleaned) => cleaned,
        Err(e) => return error_response(&e),
    };
    if !kill_all {
        return json_response(StatusCode::OK, &json!({ "cleaned": cleaned }));
    }
    match sup.kill_all_managed().await {
        Ok(killed) => json_response(
            StatusCode::OK,
            &json!({"cleaned": cleaned, "killed_ffmpeg": killed}),
        ),
        Err(e) => error_response(&e),
    }
}

fn authorized<B>(req: &Request<B>, token: &str) -> bool {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|presented| presented == token)
}

fn query_param(query: &str, key: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Deserialize a JSON body. An empty body yields `T::default()`.
async fn read_json<T, B>(body: B) -> Result<T, Response<ResponseBody>>
where
    T: DeserializeOwned + Default,
    B: Body,
    B::Error: Display,
{
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            error!("Failed to read request body: {e}");
            return Err(bad_request("Failed to read request body"));
        }
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(&bytes).map_err(|e| {
        debug!("Failed to parse JSON body: {e}");
        bad_request(&format!("Invalid JSON body: {e}"))
    })
}

async fn read_id<B>(body: B) -> Result<StreamId, Response<ResponseBody>>
where
    B: Body,
    B::Error: Display,
{
    let request: IdRequest = read_json(body).await?;
    StreamId::from_request(request.id.as_deref()).map_err(|e| error_response(&e))
}

fn error_response(err: &Error) -> Response<ResponseBody> {
    let status = match err.kind() {
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::NotFound | ErrorKind::Precondition => StatusCode::NOT_FOUND,
        ErrorKind::Invalid => StatusCode::BAD_REQUEST,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Request handling failed: {err}");
        format!("Internal server error: {err}")
    } else {
        err.to_string()
    };
    json_response(status, &json!({ "error": message }))
}

fn bad_request(message: &str) -> Response<ResponseBody> {
    json_response(StatusCode::BAD_REQUEST, &json!({ "error": message }))
}

fn json_response<T: serde::Serialize>(status: StatusCode, value: &T) -> Response<ResponseBody> {
    match serde_json::to_vec(value) {
        Ok(body) => respond(status, JSON, body),
        Err(e) => {
            error!("Failed to serialize response: {e}");
            respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                JSON,
                br#"{"error":"Internal server error"}"#.to_vec(),
            )
        }
    }
}

fn respond(status: StatusCode, content_type: &'static str, body: Vec<u8>) -> Response<ResponseBody> {
    let mut resp = Response::new(full(body));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    resp
}

fn full(body: Vec<u8>) -> ResponseBody {
    Full::new(Bytes::from(body)).map_err(|e| match e {}).boxed()
}
