//! Resource routes
//!
//! Every request path is a resource ID. Plain requests get the current
//! body; `Subscribe: true` requests get a 209 and an open stream of
//! update frames, starting with the full current body.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use bytes::Bytes;
use futures::{future, StreamExt};
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{AppError, Result};
use crate::protocol::{encode, UpdateFrame};
use crate::resource::ResourceId;
use crate::state::AppState;
use crate::subscription::{ChannelSink, FrameSink};
use crate::version::Version;

/// Status code confirming a subscription
pub const SUBSCRIBE_STATUS: u16 = 209;

/// Serve a resource, subscribe to it, or proxy it upstream
pub async fn serve_resource(State(state): State<AppState>, request: Request) -> Result<Response> {
    let path = request.uri().path().to_string();
    let decoded = urlencoding::decode(&path)
        .map_err(|e| AppError::BadRequest(format!("Invalid resource path {}: {}", path, e)))?;
    let resource_id = ResourceId::new(&decoded);

    if !state.store().exists(&resource_id).await {
        return match state.proxy() {
            Some(proxy) => {
                tracing::info!(
                    resource = %resource_id,
                    method = %request.method(),
                    upstream = %proxy.target(),
                    "Resource not found locally, forwarding"
                );
                Ok(proxy.forward(request).await?)
            }
            None => Err(AppError::NotFound(format!(
                "Resource {} not found",
                resource_id
            ))),
        };
    }

    let subscribing = wants_subscription(request.headers());

    // Held from the read until the subscription is registered, so no change
    // can slip between the body sent first and the first dispatch.
    let gate = if subscribing {
        Some(state.change_gate().enter().await)
    } else {
        None
    };

    let body = state.store().read(&resource_id).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            AppError::NotFound(format!("Resource {} not found", resource_id))
        } else {
            AppError::Io(e)
        }
    })?;
    let version = Version::of(&body);

    if !subscribing {
        return with_resource_headers(Response::builder().status(StatusCode::OK))
            .header("Version", version.to_string())
            .header("Parents", "")
            .body(Body::from(body))
            .map_err(|e| AppError::Internal(e.to_string()));
    }

    // HTTP/1.0 has no chunked encoding, so the stream could never be framed.
    if request.version() < axum::http::Version::HTTP_11 {
        tracing::warn!(
            resource = %resource_id,
            version = ?request.version(),
            "Subscription refused: connection cannot stream"
        );
        return Err(AppError::StreamingUnsupported);
    }

    let response = subscribe(state, resource_id, body, version);
    drop(gate);
    response
}

/// Open a subscription stream for `resource_id`
fn subscribe(
    state: AppState,
    resource_id: ResourceId,
    body: Bytes,
    version: Version,
) -> Result<Response> {
    let (sink, rx) = ChannelSink::channel(state.config().subscriptions.buffer);

    // Queued before registration, so it always precedes dispatched frames.
    sink.send_frame(encode(&UpdateFrame::full(version, body.clone())))
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let registry = state.registry().clone();
    let id = registry.add(resource_id.clone(), Arc::new(sink.clone()), body);

    tracing::debug!(
        resource = %resource_id,
        subscription = %id,
        version = %version,
        "Subscription confirmed"
    );

    let closing = sink.closing();
    tokio::spawn(async move {
        sink.closed().await;
        if registry.remove(&resource_id, &id) {
            tracing::debug!(
                resource = %resource_id,
                subscription = %id,
                "Subscriber disconnected"
            );
        }
    });

    let frames = ReceiverStream::new(rx)
        .map(Ok::<_, Infallible>)
        .take_until(future::select(
            Box::pin(state.shutdown_signal()),
            Box::pin(closing),
        ));

    with_resource_headers(Response::builder().status(SUBSCRIBE_STATUS))
        .header("subscribe", "true")
        .header(header::CACHE_CONTROL, "no-cache, no-transform")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(frames))
        .map_err(|e| AppError::Internal(e.to_string()))
}

fn with_resource_headers(builder: axum::http::response::Builder) -> axum::http::response::Builder {
    builder
        .header("Range-Request-Allow-Methods", "PATCH, PUT")
        .header("Range-Request-Allow-Units", "json")
        .header(header::CONTENT_TYPE, "application/json")
}

/// Whether the request carries `Subscribe: true`
fn wants_subscription(headers: &HeaderMap) -> bool {
    headers
        .get("subscribe")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim().eq_ignore_ascii_case("true"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_subscribe_header_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        assert!(!wants_subscription(&headers));

        headers.insert("Subscribe", HeaderValue::from_static("TRUE"));
        assert!(wants_subscription(&headers));

        headers.insert("subscribe", HeaderValue::from_static("false"));
        assert!(!wants_subscription(&headers));

        headers.insert("subscribe", HeaderValue::from_static("keep-alive"));
        assert!(!wants_subscription(&headers));
    }
}
