//! Request description and builder.
//!
//! A [`Request`] is a structured description of one HTTP call: method,
//! target, query items, headers, body, transfer settings, and per-request
//! hooks. It stays mutable until the executor begins an attempt; between
//! attempts the `After` retry callback may mutate it again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::Method;
use serde::Serialize;

use crate::cancel::{CancelHandle, ResumeData};
use crate::error::Error;
use crate::headers::HeaderStore;
use crate::progress::{Progress, ProgressSink};
use crate::transport::WireRequest;

pub(crate) mod body;
pub(crate) mod curl;
pub(crate) mod template;

pub use body::{Body, MultipartForm, Part};

/// How response bytes are materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    /// Accumulate the body in memory.
    #[default]
    Buffered,
    /// Spill the body to a temporary file; bytes are never held in memory
    /// unless the consumer explicitly reads them.
    LargeData,
}

/// What to do when the server redirects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedirectPolicy {
    /// Chase the redirect, adjusting method and body per HTTP semantics
    /// (303 downgrades to GET and drops the body).
    #[default]
    Follow,
    /// Deliver the redirect response as-is.
    Refuse,
    /// Chase the redirect reusing the original method, headers, and body.
    FollowWithOriginalSettings,
}

/// Where the request points.
#[derive(Debug, Clone)]
pub(crate) enum Target {
    /// A complete URL; parsed at compose time.
    Absolute(String),
    /// A path (possibly a URI template) resolved against the client's
    /// base URL with the given template variables.
    Relative {
        path: String,
        vars: HashMap<String, String>,
    },
}

/// Mutator applied to the wire-form request as the final composition step.
pub type RequestMutator = Arc<dyn Fn(&mut WireRequest) + Send + Sync>;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// A structured description of one HTTP call.
#[derive(Clone)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) target: Target,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) headers: HeaderStore,
    pub(crate) body: Body,
    pub(crate) timeout: Option<Duration>,
    pub(crate) max_retries: Option<u32>,
    pub(crate) transfer_mode: TransferMode,
    pub(crate) redirect_policy: Option<RedirectPolicy>,
    pub(crate) resume_from: Option<ResumeData>,
    pub(crate) mutator: Option<RequestMutator>,
    pub(crate) progress: Option<ProgressSink>,
    pub(crate) cancel: Option<CancelHandle>,
    pub(crate) id: u64,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("target", &self.target)
            .field("query", &self.query)
            .field("transfer_mode", &self.transfer_mode)
            .finish_non_exhaustive()
    }
}

impl Request {
    /// Start building a request with an explicit method.
    pub fn builder(method: Method) -> RequestBuilder {
        RequestBuilder::new(method)
    }

    /// GET request builder.
    pub fn get(url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Method::GET).url(url)
    }

    /// POST request builder.
    pub fn post(url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Method::POST).url(url)
    }

    /// PUT request builder.
    pub fn put(url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Method::PUT).url(url)
    }

    /// PATCH request builder.
    pub fn patch(url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Method::PATCH).url(url)
    }

    /// DELETE request builder.
    pub fn delete(url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Method::DELETE).url(url)
    }

    /// Stable numeric identifier, unique within the process.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderStore {
        &self.headers
    }

    /// Mutable request headers. The `After` retry callback typically uses
    /// this to install an authorization header between attempts.
    pub fn headers_mut(&mut self) -> &mut HeaderStore {
        &mut self.headers
    }

    /// The transfer mode.
    pub fn transfer_mode(&self) -> TransferMode {
        self.transfer_mode
    }

    /// The per-request retry budget, when set.
    pub fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }

    /// The cancel handle attached to this request, if any.
    pub fn cancel_handle(&self) -> Option<&CancelHandle> {
        self.cancel.as_ref()
    }
}

/// Fluent builder for [`Request`].
#[derive(Clone)]
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    /// Create a builder for the given method pointing nowhere yet.
    pub fn new(method: Method) -> Self {
        Self {
            request: Request {
                method,
                target: Target::Relative {
                    path: String::new(),
                    vars: HashMap::new(),
                },
                query: Vec::new(),
                headers: HeaderStore::new(),
                body: Body::Empty,
                timeout: None,
                max_retries: None,
                transfer_mode: TransferMode::Buffered,
                redirect_policy: None,
                resume_from: None,
                mutator: None,
                progress: None,
                cancel: None,
                id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            },
        }
    }

    /// Point at an absolute URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.request.target = Target::Absolute(url.into());
        self
    }

    /// Point at a path resolved against the client's base URL. The path
    /// may be a URI template; bind variables with
    /// [`template_var`](Self::template_var).
    pub fn path(mut self, path: impl Into<String>) -> Self {
        let vars = match self.request.target {
            Target::Relative { vars, .. } => vars,
            Target::Absolute(_) => HashMap::new(),
        };
        self.request.target = Target::Relative {
            path: path.into(),
            vars,
        };
        self
    }

    /// Bind a URI-template variable for the path.
    pub fn template_var(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        if let Target::Relative { vars, .. } = &mut self.request.target {
            vars.insert(name.into(), value.to_string());
        }
        self
    }

    /// Append a query item. Order is preserved.
    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.request.query.push((name.into(), value.to_string()));
        self
    }

    /// Set a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.set(name, value);
        self
    }

    /// Merge a whole header store; entries here win over earlier ones.
    pub fn headers(mut self, headers: &HeaderStore) -> Self {
        self.request.headers.merge(headers);
        self
    }

    /// Raw bytes body with an explicit content type.
    pub fn body_bytes(mut self, content: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        self.request.body = Body::Bytes {
            content: content.into(),
            content_type: content_type.into(),
        };
        self
    }

    /// Body streamed from a file path with an explicit content type.
    pub fn body_file(
        mut self,
        path: impl Into<std::path::PathBuf>,
        content_type: impl Into<String>,
    ) -> Self {
        self.request.body = Body::File {
            path: path.into(),
            content_type: content_type.into(),
        };
        self
    }

    /// Form-url-encoded body from ordered pairs.
    pub fn form<N: Into<String>, V: Into<String>>(
        mut self,
        pairs: impl IntoIterator<Item = (N, V)>,
    ) -> Self {
        self.request.body = Body::Form(
            pairs
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        );
        self
    }

    /// JSON body. The value is serialized lazily when the body is encoded,
    /// so serialization failures surface as
    /// [`Error::JsonEncoding`](crate::Error::JsonEncoding) at fetch time.
    pub fn json<T: Serialize + Send + Sync + 'static>(mut self, value: T) -> Self {
        self.request.body = Body::Json(Arc::new(move || {
            serde_json::to_vec(&value).map_err(|e| Error::JsonEncoding(e.to_string()))
        }));
        self
    }

    /// Multipart/form-data body.
    pub fn multipart(mut self, form: MultipartForm) -> Self {
        self.request.body = Body::Multipart(form);
        self
    }

    /// Per-attempt wall-clock timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.request.timeout = Some(timeout);
        self
    }

    /// Retry budget for this request, overriding the client default.
    /// Excludes the initial attempt.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.request.max_retries = Some(retries);
        self
    }

    /// Transfer mode for the response body.
    pub fn transfer_mode(mut self, mode: TransferMode) -> Self {
        self.request.transfer_mode = mode;
        self
    }

    /// Redirect policy, overriding the client default.
    pub fn redirect_policy(mut self, policy: RedirectPolicy) -> Self {
        self.request.redirect_policy = Some(policy);
        self
    }

    /// Resume a previously cancelled transfer from its captured state.
    pub fn resume_from(mut self, resume: ResumeData) -> Self {
        self.request.resume_from = Some(resume);
        self
    }

    /// Pure function applied to the wire-form request as the last
    /// composition step.
    pub fn mutate_request(
        mut self,
        mutator: impl Fn(&mut WireRequest) + Send + Sync + 'static,
    ) -> Self {
        self.request.mutator = Some(Arc::new(mutator));
        self
    }

    /// Install the progress sink for this request.
    pub fn progress(mut self, sink: impl Fn(Progress) + Send + Sync + 'static) -> Self {
        self.request.progress = Some(Arc::new(sink));
        self
    }

    /// Attach a cancel handle.
    pub fn cancel_handle(mut self, handle: CancelHandle) -> Self {
        self.request.cancel = Some(handle);
        self
    }

    /// Finish building.
    pub fn build(self) -> Request {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let request = Request::get("http://example.com/a").build();
        assert_eq!(request.method(), &Method::GET);
        assert_eq!(request.transfer_mode(), TransferMode::Buffered);
        assert!(request.max_retries().is_none());
        assert!(request.headers().is_empty());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Request::get("http://example.com").build();
        let b = Request::get("http://example.com").build();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_template_vars_survive_path_change() {
        let request = Request::builder(Method::GET)
            .template_var("id", 7)
            .path("/users/{id}")
            .build();
        match &request.target {
            Target::Relative { path, vars } => {
                assert_eq!(path, "/users/{id}");
                assert_eq!(vars.get("id").map(String::as_str), Some("7"));
            }
            Target::Absolute(_) => panic!("expected relative target"),
        }
    }

    #[test]
    fn test_query_preserves_order() {
        let request = Request::get("http://example.com")
            .query("b", 2)
            .query("a", 1)
            .query("b", 3)
            .build();
        let keys: Vec<_> = request.query.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["b", "a", "b"]);
    }
}
