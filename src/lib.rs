//! Async client-side HTTP request pipeline.
//!
//! Wireline takes a structured request description, drives it to
//! completion through a configured transport, applies a chain of response
//! validators, and implements the resulting retry strategies. A
//! process-wide request stubber can short-circuit the transport with
//! locally synthesized responses selected by configurable matchers.
//!
//! ## Features
//!
//! - Request builder with URI-template paths, ordered query items, and
//!   form / JSON / multipart bodies
//! - Validator chain deciding each response's fate: accept, replace,
//!   fail, or retry
//! - Retry strategies: immediate, fixed delay, exponential backoff,
//!   Fibonacci backoff, and alternate-request retries (silent
//!   re-authentication)
//! - Buffered and large-data transfer modes; large downloads spill to a
//!   file and support cancel/resume
//! - Progress events and per-transaction timing metrics
//! - Request stubbing with URL-regex, URI-template, URL, JSON, body,
//!   custom, and echo matchers
//! - Lifecycle delegate for observation
//!
//! ## Example
//!
//! ```no_run
//! use wireline::{Client, Request};
//!
//! # async fn run() -> Result<(), wireline::Error> {
//! let client = Client::builder()
//!     .base_url("https://api.example.com/v1/")
//!     .header("X-Api-Key", "secret")
//!     .max_retries(3)
//!     .build()?;
//!
//! let response = client
//!     .fetch(
//!         Request::builder(http::Method::GET)
//!             .path("users/{id}")
//!             .template_var("id", 42)
//!             .build(),
//!     )
//!     .await?;
//!
//! let user: serde_json::Value = response.ensure()?.json()?;
//! println!("{user}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Stubbing
//!
//! While the registry is enabled, claimed requests never reach the real
//! transport:
//!
//! ```no_run
//! use wireline::stub::{self, StubRule, StubResponse};
//! use http::Method;
//!
//! stub::add(
//!     StubRule::new()
//!         .url_regex(r"example\.com/users").unwrap()
//!         .response(Method::GET, StubResponse::json(serde_json::json!({"id": 1}))),
//! );
//! stub::enable();
//! ```
//!
//! ## Error model
//!
//! [`Client::fetch`] returns `Err` only for terminal conditions: request
//! construction failures, cancellation, and unmatched stubs in opt-out
//! mode. Transport errors and validator failures are delivered on the
//! [`Response`] with [`Response::error`] populated, so partial data stays
//! reachable; [`Response::ensure`] converts a carried error into a
//! `Result`.

mod cancel;
mod client;
pub mod cookies;
mod delegate;
mod error;
mod executor;
mod headers;
mod loader;
mod metrics;
mod progress;
mod request;
mod response;
mod retry;
pub mod stub;
pub mod transport;
mod validate;

pub use cancel::{CancelHandle, ResumeData};
pub use client::{Client, ClientBuilder, Config, NetworkServiceType};
pub use delegate::{AuthChallenge, ClientDelegate, NoopDelegate};
pub use error::{Error, StatusClass, NO_STATUS};
pub use headers::HeaderStore;
pub use metrics::{Metrics, TimeWindow, TransactionMetrics};
pub use progress::{Progress, ProgressEvent, ProgressSink};
pub use request::{
    Body, MultipartForm, Part, RedirectPolicy, Request, RequestBuilder, TransferMode,
};
pub use response::Response;
pub use retry::{AltResponseHook, RetryStrategy};
pub use validate::{AltRequest, Validator, ValidatorOutcome};

// Re-export the HTTP types users need to drive the API.
pub use bytes::Bytes;
pub use http::Method;
pub use url::Url;
