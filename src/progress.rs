//! Progress events for uploads and downloads.
//!
//! A request carries at most one [`ProgressSink`]; the loader publishes
//! [`Progress`] updates to it as bytes move. Updates may be coalesced.

use std::sync::Arc;

use bytes::Bytes;

/// The kind of a progress update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Request body bytes sent.
    Upload,
    /// Response body bytes received.
    Download,
    /// First event after a successful resume of a partial transfer.
    Resumed,
    /// Final event when the transfer aborted with partial bytes.
    Failed,
}

/// A single progress update.
#[derive(Debug, Clone)]
pub struct Progress {
    /// What happened.
    pub event: ProgressEvent,
    /// Bytes transferred so far.
    pub current: u64,
    /// Expected total, when the transport announced one.
    pub expected: Option<u64>,
    /// Partial body bytes; populated on [`ProgressEvent::Failed`].
    pub partial_data: Option<Bytes>,
}

impl Progress {
    pub(crate) fn new(event: ProgressEvent, current: u64, expected: Option<u64>) -> Self {
        Self {
            event,
            current,
            expected,
            partial_data: None,
        }
    }

    /// Completion percentage in `0.0..=100.0`, when the expected length
    /// is known and non-zero.
    pub fn percentage(&self) -> Option<f64> {
        match self.expected {
            Some(expected) if expected > 0 => {
                Some((self.current as f64 / expected as f64) * 100.0)
            }
            _ => None,
        }
    }
}

/// Receiver for progress updates. One sink per request.
pub type ProgressSink = Arc<dyn Fn(Progress) + Send + Sync>;
