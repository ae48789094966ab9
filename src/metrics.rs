//! Per-transfer timing metrics.
//!
//! The loader records one [`TransactionMetrics`] block per redirect hop and
//! an envelope interval for the whole task. Collected metrics are delivered
//! to the client delegate and carried on the response.

use std::time::{Duration, Instant};

/// A closed time window.
#[derive(Debug, Clone, Copy)]
pub struct TimeWindow {
    start: Instant,
    end: Instant,
}

impl TimeWindow {
    pub(crate) fn new(start: Instant, end: Instant) -> Self {
        Self { start, end }
    }

    /// Window start.
    pub fn start(&self) -> Instant {
        self.start
    }

    /// Window end.
    pub fn end(&self) -> Instant {
        self.end
    }

    /// Elapsed time between start and end.
    pub fn duration(&self) -> Duration {
        self.end.saturating_duration_since(self.start)
    }
}

/// Timing stages of a single transaction (one request/response exchange,
/// i.e. one redirect hop).
///
/// Stages the transport does not expose individually (name resolution, TCP
/// connect, TLS handshake) are `None`.
#[derive(Debug, Clone, Default)]
pub struct TransactionMetrics {
    /// DNS resolution window.
    pub domain_lookup: Option<TimeWindow>,
    /// TCP connect window.
    pub connect: Option<TimeWindow>,
    /// TLS handshake window.
    pub secure_connection: Option<TimeWindow>,
    /// Sending the request.
    pub request: Option<TimeWindow>,
    /// Waiting for the first response byte.
    pub server: Option<TimeWindow>,
    /// Receiving the response body.
    pub response: Option<TimeWindow>,
    /// The whole exchange.
    pub total: Option<TimeWindow>,
}

/// Metrics for one logical transfer: envelope interval, redirect count,
/// and one transaction block per hop.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    /// Envelope interval covering the entire task, including redirects.
    pub task_interval: Option<TimeWindow>,
    /// Number of redirects chased.
    pub redirect_count: u32,
    /// One entry per request/response exchange, in order.
    pub transactions: Vec<TransactionMetrics>,
}

impl Metrics {
    /// Total wall-clock duration of the task, if recorded.
    pub fn total_duration(&self) -> Option<Duration> {
        self.task_interval.map(|window| window.duration())
    }
}
