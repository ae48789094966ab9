//! Client lifecycle observation.

use crate::metrics::Metrics;
use crate::request::Request;
use crate::response::Response;
use crate::retry::RetryStrategy;
use crate::transport::WireRequest;

/// An authentication challenge surfaced by a response.
#[derive(Debug, Clone)]
pub struct AuthChallenge {
    /// The challenging status code (401 or 407).
    pub status: u16,
    /// The `WWW-Authenticate` (or `Proxy-Authenticate`) header value.
    pub scheme: Option<String>,
}

/// Observer of request lifecycle events on a client.
///
/// Every method has a no-op default so implementations override only what
/// they care about. For a single request the callbacks arrive in order:
/// `did_enqueue`, then per attempt any `will_perform_redirect` /
/// `did_receive_auth_challenge`, then `will_retry` when an attempt is
/// retried, and finally `did_collect_metrics` followed by `did_finish`.
/// No ordering holds across distinct requests.
#[allow(unused_variables)]
pub trait ClientDelegate: Send + Sync {
    /// The executor accepted the request and is about to compose it.
    fn did_enqueue(&self, request: &Request) {}

    /// The transport is waiting for connectivity.
    fn task_waiting_for_connectivity(&self, request_id: u64) {}

    /// A redirect is about to be chased with the given next request.
    fn will_perform_redirect(&self, request_id: u64, next: &WireRequest) {}

    /// The response carried an authentication challenge.
    fn did_receive_auth_challenge(&self, request_id: u64, challenge: &AuthChallenge) {}

    /// Metrics were collected for the finished transfer.
    fn did_collect_metrics(&self, request_id: u64, metrics: &Metrics) {}

    /// The response is about to be delivered.
    fn did_finish(&self, request_id: u64, response: &Response) {}

    /// An attempt will be retried with the given strategy.
    fn will_retry(&self, request_id: u64, strategy: &RetryStrategy, prior: &Response) {}
}

/// The delegate used when none is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDelegate;

impl ClientDelegate for NoopDelegate {}
