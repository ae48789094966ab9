//! End-to-end pipeline scenarios driven through the stub registry.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use http::Method;
use wireline::stub::{self, StubResponse, StubRule, UnhandledMode};
use wireline::{AltRequest, CancelHandle, Client, Error, Request};

use common::{stub_lock, RecordingDelegate};

#[tokio::test]
async fn echo_stub_mirrors_posted_body() {
    let _lock = stub_lock();
    stub::reset();
    stub::enable();
    stub::add(StubRule::new().any().echo(Method::POST));

    let client = Client::builder().build().unwrap();
    let response = client
        .fetch(
            Request::post("http://x/y")
                .body_bytes(&br#"{"a":1}"#[..], "application/json")
                .build(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert!(response.error().is_none());
    assert_eq!(response.data().unwrap().as_ref(), br#"{"a":1}"#);
    stub::reset();
}

#[tokio::test]
async fn silent_login_retries_once_with_token() {
    let _lock = stub_lock();
    stub::reset();
    stub::enable();

    // The protected resource rejects until the token header shows up.
    stub::add(
        StubRule::new()
            .url_regex("service/secret")
            .unwrap()
            .produces(Method::GET, |request, _| {
                match request.headers.value("x-token") {
                    Some("T") => StubResponse::json(serde_json::json!({"ok": true})),
                    _ => StubResponse::new(401).body("denied"),
                }
            }),
    );
    stub::add(
        StubRule::new()
            .url_regex("auth/login")
            .unwrap()
            .response(
                Method::POST,
                StubResponse::json(serde_json::json!({"token": "T"})),
            ),
    );

    let delegate = RecordingDelegate::new();
    let client = Client::builder()
        .delegate(delegate.clone())
        .alt_request(
            AltRequest::new(|_, _| Request::post("http://auth/login").build())
                .trigger_statuses([401])
                .on_response(|request, alt| {
                    let body: serde_json::Value = alt.json().unwrap();
                    let token = body["token"].as_str().unwrap().to_string();
                    request.headers_mut().set("X-Token", token);
                }),
        )
        .build()
        .unwrap();

    let response = client
        .fetch(Request::get("http://service/secret").build())
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert!(response.error().is_none());
    assert_eq!(response.retry_count(), 1);
    assert_eq!(
        response.current_request().headers.value("x-token"),
        Some("T")
    );

    // Exactly one will_retry: the original request's retry. The nested
    // alternate request finishes without retrying.
    assert_eq!(delegate.retry_count(), 1);
    stub::reset();
}

#[tokio::test]
async fn empty_response_fails_without_retry() {
    let _lock = stub_lock();
    stub::reset();
    stub::enable();

    let hits = Arc::new(AtomicUsize::new(0));
    let hits_in_stub = hits.clone();
    stub::add(StubRule::new().any().produces(Method::GET, move |_, _| {
        hits_in_stub.fetch_add(1, Ordering::SeqCst);
        StubResponse::new(200)
    }));

    let client = Client::builder()
        .allows_empty_responses(false)
        .build()
        .unwrap();
    let response = client
        .fetch(Request::get("http://empty/").build())
        .await
        .unwrap();

    assert!(matches!(response.error(), Some(Error::EmptyResponse)));
    assert_eq!(response.retry_count(), 0);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    stub::reset();
}

#[tokio::test]
async fn exponential_backoff_spends_the_whole_budget() {
    let _lock = stub_lock();
    stub::reset();
    stub::enable();

    let instants: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
    let instants_in_stub = instants.clone();
    stub::add(StubRule::new().any().produces(Method::GET, move |_, _| {
        instants_in_stub.lock().unwrap().push(Instant::now());
        StubResponse::new(503).body("unavailable")
    }));

    let delegate = RecordingDelegate::new();
    let client = Client::builder()
        .delegate(delegate.clone())
        .max_retries(3)
        .retry_backoff(Duration::from_millis(100), Duration::from_secs(1))
        .build()
        .unwrap();

    let response = client
        .fetch(Request::get("http://flaky/").build())
        .await
        .unwrap();

    assert!(matches!(response.error(), Some(Error::RetryAttemptsReached)));
    assert_eq!(delegate.retry_count(), 3);

    // maxRetries = 3 means at most 4 transfer attempts.
    let instants = instants.lock().unwrap();
    assert_eq!(instants.len(), 4);

    // Gaps follow base * 2^(n-1), non-decreasing. Lower bounds are firm;
    // upper bounds leave scheduling slack.
    let gaps: Vec<Duration> = instants.windows(2).map(|pair| pair[1] - pair[0]).collect();
    assert!(gaps[0] >= Duration::from_millis(95), "first gap {gaps:?}");
    assert!(gaps[1] >= Duration::from_millis(190), "second gap {gaps:?}");
    assert!(gaps[2] >= Duration::from_millis(380), "third gap {gaps:?}");
    assert!(gaps[2] < Duration::from_millis(2000), "third gap {gaps:?}");
    assert!(gaps[0] <= gaps[1] && gaps[1] <= gaps[2]);
    stub::reset();
}

#[tokio::test]
async fn opt_out_unmatched_request_fails() {
    let _lock = stub_lock();
    stub::reset();
    stub::enable();
    stub::set_unhandled_mode(UnhandledMode::OptOut);

    let client = Client::builder().build().unwrap();
    let result = client
        .fetch(Request::get("http://nothing-matches/").build())
        .await;
    assert!(matches!(result, Err(Error::StubNotFound(_))));
    stub::reset();
}

#[tokio::test]
async fn cancellation_during_stub_delay_is_prompt() {
    let _lock = stub_lock();
    stub::reset();
    stub::enable();
    stub::add(StubRule::new().any().response(
        Method::GET,
        StubResponse::new(200)
            .body("slow")
            .delay(Duration::from_secs(30)),
    ));

    let cancel = CancelHandle::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let client = Client::builder().build().unwrap();
    let started = Instant::now();
    let result = client
        .fetch(
            Request::get("http://slow/")
                .cancel_handle(cancel)
                .build(),
        )
        .await;

    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "cancel must abort the pending stub timer promptly"
    );
    stub::reset();
}

#[tokio::test]
async fn delegate_callbacks_arrive_in_order() {
    let _lock = stub_lock();
    stub::reset();
    stub::enable();
    stub::add(
        StubRule::new()
            .any()
            .response(Method::GET, StubResponse::new(200).body("ok")),
    );

    let delegate = RecordingDelegate::new();
    let client = Client::builder()
        .delegate(delegate.clone())
        .build()
        .unwrap();
    client
        .fetch(Request::get("http://ordered/").build())
        .await
        .unwrap();

    assert_eq!(
        delegate.events(),
        ["did_enqueue", "did_collect_metrics", "did_finish"]
    );
    stub::reset();
}

#[tokio::test]
async fn stub_redirect_location_is_chased() {
    let _lock = stub_lock();
    stub::reset();
    stub::enable();
    stub::add(
        StubRule::new()
            .url_regex("/start$")
            .unwrap()
            .response(
                Method::GET,
                StubResponse::new(302).header("Location", "/moved"),
            ),
    );
    stub::add(
        StubRule::new()
            .url_regex("/moved$")
            .unwrap()
            .response(Method::GET, StubResponse::new(200).body("landed")),
    );

    let client = Client::builder().build().unwrap();
    let response = client
        .fetch(Request::get("http://hops/start").build())
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.data().unwrap().as_ref(), b"landed");
    assert_eq!(response.metrics().redirect_count, 1);
    assert_eq!(response.original_request().url.path(), "/start");
    assert_eq!(response.current_request().url.path(), "/moved");
    stub::reset();
}

#[tokio::test]
async fn json_body_matcher_routes_by_payload() {
    let _lock = stub_lock();
    stub::reset();
    stub::enable();
    stub::add(
        StubRule::new()
            .json_body(serde_json::json!({"kind": "a"}))
            .response(Method::POST, StubResponse::new(200).body("route-a")),
    );
    stub::add(
        StubRule::new()
            .any()
            .response(Method::POST, StubResponse::new(200).body("fallback")),
    );

    let client = Client::builder().build().unwrap();

    let matched = client
        .fetch(
            Request::post("http://router/")
                .json(serde_json::json!({"kind": "a"}))
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(matched.data().unwrap().as_ref(), b"route-a");

    let fallback = client
        .fetch(
            Request::post("http://router/")
                .json(serde_json::json!({"kind": "b"}))
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(fallback.data().unwrap().as_ref(), b"fallback");
    stub::reset();
}
