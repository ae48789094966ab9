//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use tracing_subscriber::EnvFilter;
use wireline::{ClientDelegate, Metrics, Request, Response, RetryStrategy};

/// Install the env-filtered test subscriber. Repeated calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// The stub registry is process-wide; tests that touch it take this lock
/// and reset the registry on both sides.
pub fn stub_lock() -> MutexGuard<'static, ()> {
    init_tracing();
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Delegate that records lifecycle callbacks for assertions.
#[derive(Clone, Default)]
pub struct RecordingDelegate {
    inner: Arc<RecordingInner>,
}

#[derive(Default)]
struct RecordingInner {
    events: Mutex<Vec<String>>,
    retries: AtomicUsize,
}

impl RecordingDelegate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.inner.events.lock().unwrap().clone()
    }

    pub fn retry_count(&self) -> usize {
        self.inner.retries.load(Ordering::SeqCst)
    }

    fn record(&self, event: &str) {
        self.inner.events.lock().unwrap().push(event.to_string());
    }
}

impl ClientDelegate for RecordingDelegate {
    fn did_enqueue(&self, _request: &Request) {
        self.record("did_enqueue");
    }

    fn will_retry(&self, _request_id: u64, _strategy: &RetryStrategy, _prior: &Response) {
        self.inner.retries.fetch_add(1, Ordering::SeqCst);
        self.record("will_retry");
    }

    fn did_collect_metrics(&self, _request_id: u64, _metrics: &Metrics) {
        self.record("did_collect_metrics");
    }

    fn did_finish(&self, _request_id: u64, _response: &Response) {
        self.record("did_finish");
    }
}
