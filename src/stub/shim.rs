//! The interceptor transport shim.
//!
//! [`StubTransport`] wraps the real transport. When the registry is
//! enabled and claims a request, the shim synthesizes the reply locally:
//! rule selection, per-method responder, cookie merging, optional delay,
//! optional synthetic failure. Everything else delegates to the inner
//! transport.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{find_match, is_enabled, should_handle};
use crate::cookies::SharedCookieJar;
use crate::error::Error;
use crate::transport::{Transport, TransportReply, WireRequest};

/// Transport layer that consults the stub registry before the wire.
pub struct StubTransport {
    inner: Arc<dyn Transport>,
    cookies: Option<SharedCookieJar>,
}

impl StubTransport {
    /// Wrap a real transport.
    pub fn new(inner: Arc<dyn Transport>) -> Self {
        Self {
            inner,
            cookies: None,
        }
    }

    /// Share the session cookie jar so stub responders see request
    /// cookies and stub responses can install new ones.
    pub fn with_cookies(mut self, jar: SharedCookieJar) -> Self {
        self.cookies = Some(jar);
        self
    }

    async fn synthesize(&self, request: &WireRequest) -> Result<TransportReply, Error> {
        let not_found = || {
            Error::StubNotFound(format!("{} {}", request.method, request.url))
        };
        let rule = find_match(request).ok_or_else(not_found)?;
        debug!(rule = rule.id, url = %request.url, "request claimed by stub rule");

        // The producer sees the request as the wire would: with session
        // cookies injected.
        let mut seen = request.clone();
        if let Some(jar) = &self.cookies {
            let header = jar
                .lock()
                .expect("cookie jar lock poisoned")
                .header_for(&seen.url);
            if let Some(header) = header {
                seen.headers.set("Cookie", header);
            }
        }

        let stub = rule.respond_to(&seen).ok_or_else(not_found)?;

        if let Some(delay) = stub.delay {
            // The loader races this send against the cancel handle, so
            // cancelling the request also cancels this timer.
            tokio::time::sleep(delay).await;
        }

        if let Some(jar) = &self.cookies {
            jar.lock()
                .expect("cookie jar lock poisoned")
                .store_from_headers(
                    &request.url,
                    stub.headers
                        .iter()
                        .filter(|(name, _)| name.eq_ignore_ascii_case("set-cookie"))
                        .map(|(_, value)| value),
                );
        }

        if let Some(error) = stub.fail_error {
            return Err(error);
        }

        let mut headers = stub.headers.clone();
        if let Some(content_type) = &stub.content_type {
            headers.set("Content-Type", content_type.clone());
        }
        headers.set("Content-Length", stub.body.len().to_string());

        Ok(TransportReply::from_bytes(stub.status, headers, stub.body))
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn send(&self, request: &WireRequest) -> Result<TransportReply, Error> {
        if is_enabled() && should_handle(request) {
            self.synthesize(request).await
        } else {
            self.inner.send(request).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::shared_jar;
    use crate::headers::HeaderStore;
    use crate::stub::{self, StubResponse, StubRule, UnhandledMode};
    use crate::transport::Payload;
    use bytes::Bytes;
    use futures::StreamExt;
    use http::Method;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    struct RecordingTransport {
        hits: AtomicUsize,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, _request: &WireRequest) -> Result<TransportReply, Error> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(TransportReply::from_bytes(
                404,
                HeaderStore::new(),
                Bytes::from_static(b"real"),
            ))
        }
    }

    fn request(method: Method, url: &str) -> WireRequest {
        WireRequest::new(method, Url::parse(url).unwrap())
    }

    async fn collect(reply: TransportReply) -> Vec<u8> {
        let mut out = Vec::new();
        let mut body = reply.body;
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    // The registry is process-wide; the guard serializes tests that touch
    // it and brackets each with a reset. Current-thread runtime, so the
    // guard may be held across awaits.
    async fn with_clean_registry<F, Fut>(test: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        let _guard = stub::test_guard();
        stub::reset();
        test().await;
        stub::reset();
    }

    fn shim() -> (StubTransport, Arc<RecordingTransport>) {
        let real = Arc::new(RecordingTransport {
            hits: AtomicUsize::new(0),
        });
        (StubTransport::new(real.clone()), real)
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_disabled_registry_delegates() {
        with_clean_registry(|| async {
            let (shim, real) = shim();
            let req = request(Method::GET, "http://real.example/");
            let reply = shim.send(&req).await.unwrap();
            assert_eq!(reply.status, 404);
            assert_eq!(real.hits.load(Ordering::SeqCst), 1);
        })
        .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_stubbed_request_never_reaches_real_transport() {
        with_clean_registry(|| async {
            stub::enable();
            stub::add(
                StubRule::new()
                    .url_regex("stubbed")
                    .unwrap()
                    .response(Method::GET, StubResponse::new(200).body("synthetic")),
            );
            let (shim, real) = shim();
            let req = request(Method::GET, "http://stubbed.example/");
            let reply = shim.send(&req).await.unwrap();
            assert_eq!(reply.status, 200);
            assert_eq!(collect(reply).await, b"synthetic");
            assert_eq!(real.hits.load(Ordering::SeqCst), 0);
        })
        .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_opt_out_unmatched_fails() {
        with_clean_registry(|| async {
            stub::enable();
            stub::set_unhandled_mode(UnhandledMode::OptOut);
            let (shim, _real) = shim();
            let req = request(Method::GET, "http://unmatched.example/");
            let result = shim.send(&req).await;
            assert!(matches!(result, Err(Error::StubNotFound(_))));
        })
        .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_opt_in_unmatched_passes_through() {
        with_clean_registry(|| async {
            stub::enable();
            stub::set_unhandled_mode(UnhandledMode::OptIn);
            let (shim, real) = shim();
            let req = request(Method::GET, "http://unmatched.example/");
            shim.send(&req).await.unwrap();
            assert_eq!(real.hits.load(Ordering::SeqCst), 1);
        })
        .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_synthetic_failure() {
        with_clean_registry(|| async {
            stub::enable();
            stub::add(StubRule::new().any().response(
                Method::GET,
                StubResponse::new(200).fail(Error::Timeout),
            ));
            let (shim, _real) = shim();
            let req = request(Method::GET, "http://x/");
            let result = shim.send(&req).await;
            assert!(matches!(result, Err(Error::Timeout)));
        })
        .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_cookie_merge_both_directions() {
        with_clean_registry(|| async {
            stub::enable();
            stub::add(StubRule::new().any().produces(Method::GET, |req, _| {
                // The producer must observe the injected session cookie.
                let seen = req.headers.value("cookie").unwrap_or("").to_string();
                StubResponse::new(200)
                    .body(seen)
                    .header("Set-Cookie", "fresh=baked; Path=/")
            }));

            let jar = shared_jar();
            let source = Url::parse("http://cookies.example/").unwrap();
            jar.lock()
                .unwrap()
                .store_from_headers(&source, ["existing=1"].into_iter());

            let real = Arc::new(RecordingTransport {
                hits: AtomicUsize::new(0),
            });
            let shim = StubTransport::new(real).with_cookies(jar.clone());
            let req = request(Method::GET, "http://cookies.example/");

            let reply = shim.send(&req).await.unwrap();
            assert_eq!(collect(reply).await, b"existing=1");

            let harvested = jar.lock().unwrap().header_for(&source).unwrap();
            assert!(harvested.contains("fresh=baked"));
        })
        .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_echo_stub_mirrors_request() {
        with_clean_registry(|| async {
            stub::enable();
            stub::add(StubRule::new().any().echo(Method::POST));
            let (shim, _real) = shim();
            let mut req = request(Method::POST, "http://x/y");
            req.body = Payload::Bytes(Bytes::from_static(br#"{"a":1}"#));

            let reply = shim.send(&req).await.unwrap();
            assert_eq!(reply.status, 200);
            assert_eq!(collect(reply).await, br#"{"a":1}"#);
        })
        .await;
    }
}
