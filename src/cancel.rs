//! Cooperative cancellation and resumable-transfer state.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::Notify;
use url::Url;

/// Opaque state of a partially completed transfer, produced when a
/// download is cancelled with resume requested. Reissue the request with
/// [`RequestBuilder::resume_from`](crate::RequestBuilder::resume_from) to
/// continue from where it stopped.
#[derive(Debug, Clone)]
pub struct ResumeData {
    pub(crate) url: Url,
    pub(crate) bytes_received: u64,
    pub(crate) expected: Option<u64>,
    /// Spill file holding the partial body (large-data mode).
    pub(crate) file: Option<PathBuf>,
    /// In-memory partial body (buffered mode).
    pub(crate) partial: Option<Bytes>,
    /// Entity validator for `If-Range`, when the server sent one.
    pub(crate) etag: Option<String>,
}

impl ResumeData {
    /// Bytes already received.
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// The URL the partial transfer was fetched from.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    produce_resume: AtomicBool,
    notify: Notify,
    resume: Mutex<Option<ResumeData>>,
}

/// Handle for cancelling an in-flight request.
///
/// Attach a clone to a request via
/// [`RequestBuilder::cancel_handle`](crate::RequestBuilder::cancel_handle).
/// Cancellation is cooperative: the signal propagates to the current wait
/// point (transport I/O, retry delay, stub delay timer) and the fetch
/// returns [`Error::Cancelled`](crate::Error::Cancelled) promptly.
#[derive(Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelInner>,
}

impl CancelHandle {
    /// Create a fresh handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the request. Any partial transfer state is discarded.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Cancel the request, asking the loader to capture resumable state.
    /// After the fetch returns, the state is available from
    /// [`take_resume_data`](Self::take_resume_data).
    pub fn cancel_with_resume(&self) {
        self.inner.produce_resume.store(true, Ordering::SeqCst);
        self.cancel();
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn wants_resume_data(&self) -> bool {
        self.inner.produce_resume.load(Ordering::SeqCst)
    }

    /// Take the resumable state captured at cancellation, if any.
    pub fn take_resume_data(&self) -> Option<ResumeData> {
        self.inner.resume.lock().expect("resume lock poisoned").take()
    }

    pub(crate) fn stash_resume_data(&self, data: ResumeData) {
        *self.inner.resume.lock().expect("resume lock poisoned") = Some(data);
    }

    /// Resolve once cancellation is requested. Returns immediately if it
    /// already was.
    pub(crate) async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
