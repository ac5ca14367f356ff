//! Upstream proxy for resources with no local file
//!
//! The request keeps its method, path, headers and body. The upstream
//! status, headers and body are streamed back as-is, minus hop-by-hop
//! headers that the local connection manages itself.

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderName, HeaderValue, StatusCode, Uri},
    response::Response,
};
use reqwest::Url;
use thiserror::Error;

use crate::config::ProxyConfig;

/// Headers that describe a single connection and are never forwarded
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Proxy errors
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("Unsupported method: {0}")]
    InvalidMethod(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Failed to read request body: {0}")]
    Body(String),

    #[error("Invalid upstream status: {0}")]
    InvalidStatus(u16),
}

/// Forwards requests to the configured upstream
#[derive(Clone)]
pub struct ProxyClient {
    client: reqwest::Client,
    target: Url,
}

impl ProxyClient {
    /// Build a client for `target`
    pub fn new(target: Url, insecure: bool) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(insecure)
            .build()?;

        tracing::info!(
            target = %target,
            "Proxy mode enabled: requests not found locally will be forwarded"
        );
        if insecure {
            tracing::warn!("SSL certificate verification disabled for proxy requests");
        }

        Ok(Self { client, target })
    }

    /// Build a client if a proxy target is configured
    pub fn from_config(config: &ProxyConfig) -> Result<Option<Self>, ProxyError> {
        config
            .url
            .clone()
            .map(|target| Self::new(target, config.insecure))
            .transpose()
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    /// Upstream URL for a local request URI
    ///
    /// The target's query string, if any, comes before the request's own.
    pub fn upstream_url(&self, uri: &Uri) -> Url {
        let mut url = self.target.clone();
        url.set_path(uri.path());

        let query = match (self.target.query().filter(|q| !q.is_empty()), uri.query()) {
            (Some(target), Some(request)) if !request.is_empty() => {
                Some(format!("{}&{}", target, request))
            }
            (Some(target), _) => Some(target.to_string()),
            (None, request) => request.map(str::to_string),
        };
        url.set_query(query.as_deref());

        url
    }

    /// Forward a request upstream and stream the response back
    pub async fn forward(&self, request: Request) -> Result<Response, ProxyError> {
        let (parts, body) = request.into_parts();
        let url = self.upstream_url(&parts.uri);

        let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes())
            .map_err(|_| ProxyError::InvalidMethod(parts.method.to_string()))?;

        let mut headers = reqwest::header::HeaderMap::new();
        for (name, value) in parts.headers.iter() {
            if name == axum::http::header::HOST || is_hop_by_hop(name.as_str()) {
                continue;
            }
            let name = reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes())
                .map_err(|_| ProxyError::InvalidHeader(name.to_string()))?;
            let value = reqwest::header::HeaderValue::from_bytes(value.as_bytes())
                .map_err(|_| ProxyError::InvalidHeader(name.to_string()))?;
            headers.append(name, value);
        }

        let body = axum::body::to_bytes(body, usize::MAX)
            .await
            .map_err(|e| ProxyError::Body(e.to_string()))?;

        tracing::debug!(method = %parts.method, url = %url, "Forwarding request upstream");

        // reqwest derives the Host header from the upstream URL.
        let upstream = self
            .client
            .request(method, url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = StatusCode::from_u16(upstream.status().as_u16())
            .map_err(|_| ProxyError::InvalidStatus(upstream.status().as_u16()))?;

        let mut response = Response::builder().status(status);
        for (name, value) in upstream.headers().iter() {
            if is_hop_by_hop(name.as_str()) {
                continue;
            }
            let name = HeaderName::from_bytes(name.as_str().as_bytes())
                .map_err(|_| ProxyError::InvalidHeader(name.to_string()))?;
            let value = HeaderValue::from_bytes(value.as_bytes())
                .map_err(|_| ProxyError::InvalidHeader(name.to_string()))?;
            response = response.header(name, value);
        }

        response
            .body(Body::from_stream(upstream.bytes_stream()))
            .map_err(|e| ProxyError::InvalidHeader(e.to_string()))
    }
}

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|hop| name.eq_ignore_ascii_case(hop))
}
