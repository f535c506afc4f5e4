//! HTTP receiver.
//!
//! One hyper HTTP/1 connection task per accepted socket. Ingest requests are
//! validated, their body is read up to `max_body_bytes`, and the resulting
//! event is submitted to the shared [`Ingest`].

use std::convert::Infallible;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use logship_core::metrics as m;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::CollectorError;
use crate::event::InboundEvent;
use crate::ingest::{Ingest, Submission};
use crate::origin::OriginPath;

pub const FILENAME_HEADER: &str = "filename";
pub const TIMESTAMP_HEADER: &str = "timestamp";

const ALLOWED_METHODS: &str = "GET, HEAD, POST, PUT, PATCH";

pub type HttpResponse = Response<Full<Bytes>>;

/// State shared by every connection.
pub struct ServerState {
    pub ingest: Ingest,
    pub max_body_bytes: usize,
    pub origin_marker: String,
}

/// Accept connections until `cancel` fires, then drop the open ones.
pub async fn serve(
    listener: TcpListener,
    state: Arc<ServerState>,
    cancel: CancellationToken,
) -> Result<(), CollectorError> {
    let server = hyper::server::conn::http1::Builder::new();
    let mut connections = JoinSet::new();

    loop {
        let stream = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionAborted
                            | io::ErrorKind::ConnectionReset
                            | io::ErrorKind::ConnectionRefused
                    ) =>
                {
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "accept failed");
                    connections.shutdown().await;
                    return Err(CollectorError::Listener(e));
                }
                Ok((stream, peer)) => {
                    debug!(%peer, "connection accepted");
                    stream
                }
            },
            finished = async {
                match connections.join_next().await {
                    Some(finished) => finished,
                    None => std::future::pending().await,
                }
            } => {
                if let Err(e) = finished {
                    if e.is_panic() {
                        error!(error = %e, "connection handler panicked");
                    }
                }
                continue;
            }
        };

        let io = TokioIo::new(stream);
        let server = server.clone();
        let state = Arc::clone(&state);
        connections.spawn(async move {
            let service = service_fn(move |req| handle(req, Arc::clone(&state)));
            if let Err(e) = server.serve_connection(io, service).await {
                debug!(error = %e, "connection error");
            }
        });
    }

    connections.shutdown().await;
    debug!("listener stopped");
    Ok(())
}

/// Route one request.
pub async fn handle(
    req: Request<Incoming>,
    state: Arc<ServerState>,
) -> Result<HttpResponse, Infallible> {
    let method = req.method().clone();
    let response = match method {
        Method::GET | Method::HEAD => status_response(&state, method == Method::HEAD),
        Method::POST | Method::PUT | Method::PATCH => match ingest(req, &state).await {
            Ok(submission) => json_response(
                StatusCode::OK,
                json!({
                    "accepted": submission.accepted,
                    "flush_queued": submission.flush_queued,
                }),
            ),
            Err(e) => error_response(&e),
        },
        _ => {
            metrics::counter!(m::COLLECTOR_BAD_REQUESTS_TOTAL).increment(1);
            let mut response = json_response(
                StatusCode::METHOD_NOT_ALLOWED,
                json!({ "message": format!("method {method} not allowed") }),
            );
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
            response
        }
    };
    Ok(response)
}

async fn ingest(req: Request<Incoming>, state: &ServerState) -> Result<Submission, CollectorError> {
    let (parts, body) = req.into_parts();

    let origin_file = header_str(&parts.headers, FILENAME_HEADER)?.to_owned();
    OriginPath::derive(&origin_file, &state.origin_marker)?;
    let timestamp = parse_timestamp(header_str(&parts.headers, TIMESTAMP_HEADER)?)?;

    if let Some(length) = content_length(&parts.headers) {
        if length > state.max_body_bytes as u64 {
            return Err(CollectorError::BodyTooLarge {
                limit: state.max_body_bytes,
            });
        }
    }

    let data = Limited::new(body, state.max_body_bytes)
        .collect()
        .await
        .map_err(|e| {
            if e.is::<LengthLimitError>() {
                CollectorError::BodyTooLarge {
                    limit: state.max_body_bytes,
                }
            } else {
                CollectorError::Body(e.to_string())
            }
        })?
        .to_bytes();

    debug!(origin = %origin_file, timestamp, bytes = data.len(), "event received");
    state
        .ingest
        .submit(InboundEvent::new(origin_file, data, timestamp))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, CollectorError> {
    let value = headers
        .get(name)
        .ok_or(CollectorError::MissingHeader(name))?;
    // file names may carry any UTF-8, not only visible ASCII
    let value = std::str::from_utf8(value.as_bytes()).map_err(|e| {
        CollectorError::InvalidHeader {
            name,
            reason: e.to_string(),
        }
    })?;
    if value.is_empty() {
        return Err(CollectorError::InvalidHeader {
            name,
            reason: "empty value".to_owned(),
        });
    }
    Ok(value)
}

/// A non-empty run of ASCII digits that fits in a `u64`.
pub fn parse_timestamp(raw: &str) -> Result<u64, CollectorError> {
    let invalid = |reason: String| CollectorError::InvalidHeader {
        name: TIMESTAMP_HEADER,
        reason,
    };
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(format!("'{raw}' is not a decimal integer")));
    }
    raw.parse::<u64>()
        .map_err(|e| invalid(format!("'{raw}': {e}")))
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

fn status_response(state: &ServerState, head: bool) -> HttpResponse {
    if head {
        return Response::new(Full::new(Bytes::new()));
    }
    json_response(
        StatusCode::OK,
        json!({
            "status": "ok",
            "buffered": state.ingest.buffered(),
            "flush_threshold": state.ingest.threshold(),
            "accepted": state.ingest.accepted_total(),
            "duplicates": state.ingest.duplicates_total(),
            "flushes": state.ingest.flushes_queued(),
        }),
    )
}

fn error_response(err: &CollectorError) -> HttpResponse {
    let status = match err {
        CollectorError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        CollectorError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_client_error() {
        metrics::counter!(m::COLLECTOR_BAD_REQUESTS_TOTAL).increment(1);
        warn!(status = status.as_u16(), error = %err, "request rejected");
    } else {
        error!(status = status.as_u16(), error = %err, "request failed");
    }
    json_response(status, json!({ "message": err.to_string() }))
}

fn json_response(status: StatusCode, body: serde_json::Value) -> HttpResponse {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}
