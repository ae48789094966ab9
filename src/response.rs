//! The delivered response.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::error::{Error, StatusClass};
use crate::headers::HeaderStore;
use crate::metrics::Metrics;
use crate::transport::WireRequest;

/// A completed response.
///
/// Delivered by [`Client::fetch`](crate::Client::fetch) after the
/// validator chain ran. Transport errors and validator failures are
/// carried in [`error`](Self::error) so partial data stays reachable;
/// [`ensure`](Self::ensure) converts a carried error into a `Result`.
///
/// In large-data mode the body lives in the file at
/// [`data_file`](Self::data_file) and is read into memory only when
/// [`data`](Self::data) is explicitly called. Deleting the spill file is
/// the caller's responsibility.
#[derive(Debug)]
pub struct Response {
    pub(crate) status: u16,
    pub(crate) headers: HeaderStore,
    pub(crate) data: Option<Bytes>,
    pub(crate) data_file: Option<PathBuf>,
    pub(crate) error: Option<Error>,
    pub(crate) metrics: Metrics,
    pub(crate) original_request: WireRequest,
    pub(crate) current_request: WireRequest,
    pub(crate) retry_count: u32,
    pub(crate) request_id: u64,
    spilled: OnceLock<Option<Bytes>>,
}

impl Response {
    pub(crate) fn new(
        status: u16,
        headers: HeaderStore,
        data: Option<Bytes>,
        data_file: Option<PathBuf>,
        metrics: Metrics,
        original_request: WireRequest,
        current_request: WireRequest,
        retry_count: u32,
        request_id: u64,
    ) -> Self {
        Self {
            status,
            headers,
            data,
            data_file,
            error: None,
            metrics,
            original_request,
            current_request,
            retry_count,
            request_id,
            spilled: OnceLock::new(),
        }
    }

    /// HTTP status code; 0 when no response arrived.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Classification of the status code.
    pub fn status_class(&self) -> StatusClass {
        StatusClass::of(self.status)
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderStore {
        &self.headers
    }

    /// The body bytes. In large-data mode this reads the spill file on
    /// first access and caches the result.
    pub fn data(&self) -> Option<Bytes> {
        if let Some(data) = &self.data {
            return Some(data.clone());
        }
        let path = self.data_file.as_deref()?;
        self.spilled
            .get_or_init(|| std::fs::read(path).ok().map(Bytes::from))
            .clone()
    }

    /// Path of the spill file holding the body, in large-data mode.
    /// Deleting the file is the caller's responsibility.
    pub fn data_file(&self) -> Option<&Path> {
        self.data_file.as_deref()
    }

    /// Body length without materializing spilled bytes.
    pub fn body_len(&self) -> u64 {
        if let Some(data) = &self.data {
            return data.len() as u64;
        }
        self.data_file
            .as_deref()
            .and_then(|path| std::fs::metadata(path).ok())
            .map(|meta| meta.len())
            .unwrap_or(0)
    }

    /// The error attached by the transport or the validator chain.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Convert a carried error into a `Result`.
    pub fn ensure(&self) -> Result<&Self, Error> {
        match &self.error {
            Some(error) => Err(error.clone()),
            None => Ok(self),
        }
    }

    /// The body decoded as UTF-8 text.
    pub fn text(&self) -> Result<String, Error> {
        let data = self.data().unwrap_or_default();
        String::from_utf8(data.to_vec()).map_err(|e| Error::Decode(e.to_string()))
    }

    /// The body decoded as JSON into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let data = self.data().unwrap_or_default();
        serde_json::from_slice(&data).map_err(|e| Error::Decode(e.to_string()))
    }

    /// Collected timing metrics.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// The wire request as originally composed.
    pub fn original_request(&self) -> &WireRequest {
        &self.original_request
    }

    /// The wire request actually answered; differs from the original when
    /// a redirect was chased.
    pub fn current_request(&self) -> &WireRequest {
        &self.current_request
    }

    /// Retries observed before this response was delivered.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Identifier of the originating [`Request`](crate::Request).
    pub fn request_id(&self) -> u64 {
        self.request_id
    }
}
