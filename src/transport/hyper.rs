//! Hyper-based transport.
//!
//! [`HyperTransport`] performs real HTTP exchanges using hyper-util's
//! legacy client with HTTP/1.1 and HTTP/2 support and TLS via rustls.
//! Connection pooling is owned entirely by the underlying client.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use http_body_util::{BodyExt, Full};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::time::Duration;

use super::{Payload, ReplyBody, Transport, TransportReply, WireRequest};
use crate::error::Error;
use crate::headers::HeaderStore;

type HyperClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Real-network transport backed by hyper.
#[derive(Clone)]
pub struct HyperTransport {
    client: HyperClient,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport").finish_non_exhaustive()
    }
}

impl HyperTransport {
    /// Create a transport builder.
    pub fn builder() -> HyperTransportBuilder {
        HyperTransportBuilder::new()
    }

    /// Create a transport with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&self, request: &WireRequest) -> Result<TransportReply, Error> {
        let body = match &request.body {
            Payload::Empty => Bytes::new(),
            Payload::Bytes(bytes) => bytes.clone(),
            Payload::File(path) => tokio::fs::read(path)
                .await
                .map(Bytes::from)
                .map_err(|e| Error::BuildRequest(format!("body file unreadable: {e}")))?,
        };

        let mut builder = http::Request::builder()
            .method(request.method.clone())
            .uri(request.url.as_str());
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        let req = builder
            .body(Full::new(body))
            .map_err(|e| Error::BuildRequest(e.to_string()))?;

        let response = self
            .client
            .request(req)
            .await
            .map_err(|e| Error::network(format!("request failed: {e}")))?;

        let status = response.status().as_u16();
        let mut headers = HeaderStore::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.set(name.as_str(), value);
            }
        }
        let content_length = headers
            .value("content-length")
            .and_then(|v| v.parse::<u64>().ok());

        let body: ReplyBody = Box::pin(
            response
                .into_body()
                .into_data_stream()
                .map(|frame| frame.map_err(|e| Error::network(format!("body stream: {e}")))),
        );

        Ok(TransportReply {
            status,
            headers,
            content_length,
            body,
        })
    }
}

/// Builder for [`HyperTransport`].
#[derive(Debug)]
pub struct HyperTransportBuilder {
    pool_idle_timeout: Option<Duration>,
    pool_max_idle_per_host: usize,
    http2_only: bool,
}

impl Default for HyperTransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperTransportBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self {
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
            http2_only: false,
        }
    }

    /// Close pooled connections idle for longer than this. Default 90s.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    /// Maximum idle connections kept per host. Default 32.
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = max;
        self
    }

    /// Speak HTTP/2 without the HTTP/1.1 upgrade handshake.
    pub fn http2_only(mut self, enabled: bool) -> Self {
        self.http2_only = enabled;
        self
    }

    /// Build the transport.
    pub fn build(self) -> HyperTransport {
        let connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_all_versions()
            .build();

        let mut builder = Client::builder(TokioExecutor::new());
        builder.pool_timer(TokioTimer::new());
        if let Some(timeout) = self.pool_idle_timeout {
            builder.pool_idle_timeout(timeout);
        }
        builder.pool_max_idle_per_host(self.pool_max_idle_per_host);
        if self.http2_only {
            builder.http2_only(true);
        }

        HyperTransport {
            client: builder.build(connector),
        }
    }
}
