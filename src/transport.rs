//! The transport seam.
//!
//! [`Transport`] is the boundary between the pipeline and the wire. The
//! loader drives a transport; the stub shim
//! ([`StubTransport`](crate::stub::StubTransport)) is itself a transport
//! that either synthesizes a reply or delegates to the real one.
//!
//! The transport performs exactly one exchange: it does not follow
//! redirects (the loader chases them) and does not retry.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use http::Method;
use url::Url;

use crate::error::Error;
use crate::headers::HeaderStore;

mod hyper;

pub use self::hyper::{HyperTransport, HyperTransportBuilder};

/// An encoded request body ready for the wire.
#[derive(Debug, Clone)]
pub enum Payload {
    /// No body.
    Empty,
    /// In-memory bytes.
    Bytes(Bytes),
    /// Streamed from a file path.
    File(PathBuf),
}

impl Payload {
    /// Body length, when knowable without I/O.
    pub fn len(&self) -> Option<u64> {
        match self {
            Payload::Empty => Some(0),
            Payload::Bytes(bytes) => Some(bytes.len() as u64),
            Payload::File(_) => None,
        }
    }

    /// Whether there is no body.
    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }

    /// The in-memory bytes, when the payload is not file-backed.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Payload::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// The wire-form request handed to a transport: fully resolved URL, merged
/// headers, encoded body.
#[derive(Debug, Clone)]
pub struct WireRequest {
    /// HTTP method.
    pub method: Method,
    /// Fully resolved URL.
    pub url: Url,
    /// Merged headers in store order.
    pub headers: HeaderStore,
    /// Encoded body.
    pub body: Payload,
    /// Per-attempt wall-clock timeout.
    pub timeout: Option<Duration>,
}

impl WireRequest {
    pub(crate) fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderStore::new(),
            body: Payload::Empty,
            timeout: None,
        }
    }
}

/// Streamed body of a transport reply.
pub type ReplyBody = BoxStream<'static, Result<Bytes, Error>>;

/// One response from a transport: status line, headers, and a body stream.
pub struct TransportReply {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderStore,
    /// Announced body length, when the transport knows it.
    pub content_length: Option<u64>,
    /// Body bytes as they arrive.
    pub body: ReplyBody,
}

impl std::fmt::Debug for TransportReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportReply")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

impl TransportReply {
    /// Build a reply whose body is already fully in memory.
    pub fn from_bytes(status: u16, headers: HeaderStore, body: Bytes) -> Self {
        let content_length = Some(body.len() as u64);
        let body: ReplyBody = if body.is_empty() {
            Box::pin(futures::stream::empty())
        } else {
            Box::pin(futures::stream::once(async move { Ok(body) }))
        };
        Self {
            status,
            headers,
            content_length,
            body,
        }
    }
}

/// A single-exchange HTTP transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one request/response exchange.
    async fn send(&self, request: &WireRequest) -> Result<TransportReply, Error>;
}
