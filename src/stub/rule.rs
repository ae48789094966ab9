//! Stub rules, responses, and ignore rules.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::Method;

use super::matcher::{
    BodyMatcher, CustomMatcher, EchoMatcher, JsonMatcher, Matcher, UriTemplateMatcher,
    UrlMatchOptions, UrlMatcher, UrlRegexMatcher,
};
use crate::error::Error;
use crate::headers::HeaderStore;
use crate::transport::WireRequest;

/// Cache behavior advertised by a synthesized response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StubCachePolicy {
    /// Let protocol headers decide.
    #[default]
    Protocol,
    /// Mark the response uncacheable.
    NoStore,
}

/// A locally synthesized response.
#[derive(Debug, Clone)]
pub struct StubResponse {
    pub(crate) status: u16,
    pub(crate) content_type: Option<String>,
    pub(crate) headers: HeaderStore,
    pub(crate) body: Bytes,
    pub(crate) fail_error: Option<Error>,
    pub(crate) delay: Option<Duration>,
    pub(crate) cache_policy: StubCachePolicy,
}

impl StubResponse {
    /// A response with the given status and no body.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            headers: HeaderStore::new(),
            body: Bytes::new(),
            fail_error: None,
            delay: None,
            cache_policy: StubCachePolicy::default(),
        }
    }

    /// 200 with a JSON body.
    pub fn json(value: serde_json::Value) -> Self {
        Self::new(200)
            .body(value.to_string())
            .content_type("application/json")
    }

    /// Set the body bytes.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Set the content type.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Set a response header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Delay finalization by this much; cancellation of the request also
    /// cancels the pending timer.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the transfer with a synthetic transport error instead of
    /// delivering the response.
    pub fn fail(mut self, error: Error) -> Self {
        self.fail_error = Some(error);
        self
    }

    /// Set the cache policy.
    pub fn cache_policy(mut self, policy: StubCachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    /// The status code.
    pub fn status(&self) -> u16 {
        self.status
    }
}

/// Dynamic response factory; wins over a static response for the method.
pub type ResponseProducer = Arc<dyn Fn(&WireRequest, &StubRule) -> StubResponse + Send + Sync>;

/// How a rule answers one method.
#[derive(Clone)]
pub(crate) enum Responder {
    Fixed(StubResponse),
    Producer(ResponseProducer),
    /// Mirror the request: 200, request body and content type echoed back.
    Echo,
}

/// A stub rule: AND-combined matchers plus a per-method response table.
///
/// A rule with no matchers accepts every request.
#[derive(Clone)]
pub struct StubRule {
    pub(crate) id: u64,
    pub(crate) matchers: Vec<Arc<dyn Matcher>>,
    pub(crate) responses: HashMap<Method, Responder>,
}

impl std::fmt::Debug for StubRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StubRule")
            .field("id", &self.id)
            .field("matchers", &self.matchers.len())
            .field("methods", &self.responses.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for StubRule {
    fn default() -> Self {
        Self::new()
    }
}

impl StubRule {
    /// An empty rule; add matchers and responses fluently.
    pub fn new() -> Self {
        Self {
            id: 0,
            matchers: Vec::new(),
            responses: HashMap::new(),
        }
    }

    /// Add an arbitrary matcher.
    pub fn matcher(mut self, matcher: impl Matcher + 'static) -> Self {
        self.matchers.push(Arc::new(matcher));
        self
    }

    /// Add a full-URL regex matcher.
    pub fn url_regex(self, pattern: &str) -> Result<Self, Error> {
        Ok(self.matcher(UrlRegexMatcher::new(pattern)?))
    }

    /// Add a URI-template matcher.
    pub fn uri_template(self, template: &str) -> Result<Self, Error> {
        Ok(self.matcher(UriTemplateMatcher::new(template)?))
    }

    /// Add a URL matcher with component-ignoring options.
    pub fn url(self, url: &str, options: UrlMatchOptions) -> Result<Self, Error> {
        Ok(self.matcher(UrlMatcher::new(url, options)?))
    }

    /// Add a JSON body matcher.
    pub fn json_body(self, expected: serde_json::Value) -> Self {
        self.matcher(JsonMatcher::new(expected))
    }

    /// Add a raw-body matcher.
    pub fn body(self, expected: impl Into<Bytes>) -> Self {
        self.matcher(BodyMatcher::new(expected))
    }

    /// Add a custom predicate matcher.
    pub fn custom(self, predicate: impl Fn(&WireRequest) -> bool + Send + Sync + 'static) -> Self {
        self.matcher(CustomMatcher::new(predicate))
    }

    /// Add the always-true echo matcher.
    pub fn any(self) -> Self {
        self.matcher(EchoMatcher)
    }

    /// Answer `method` with a fixed response.
    pub fn response(mut self, method: Method, response: StubResponse) -> Self {
        self.responses.insert(method, Responder::Fixed(response));
        self
    }

    /// Answer `method` with a dynamically produced response.
    pub fn produces(
        mut self,
        method: Method,
        producer: impl Fn(&WireRequest, &StubRule) -> StubResponse + Send + Sync + 'static,
    ) -> Self {
        self.responses
            .insert(method, Responder::Producer(Arc::new(producer)));
        self
    }

    /// Answer `method` by mirroring the request.
    pub fn echo(mut self, method: Method) -> Self {
        self.responses.insert(method, Responder::Echo);
        self
    }

    /// Whether every matcher accepts the request.
    pub fn matches(&self, request: &WireRequest) -> bool {
        self.matchers.iter().all(|matcher| matcher.matches(request))
    }

    /// Produce the response for this request, if the rule covers its
    /// method.
    pub fn respond_to(&self, request: &WireRequest) -> Option<StubResponse> {
        match self.responses.get(&request.method)? {
            Responder::Fixed(response) => Some(response.clone()),
            Responder::Producer(producer) => Some(producer(request, self)),
            Responder::Echo => {
                let mut response = StubResponse::new(200).body(
                    request.body.as_bytes().cloned().unwrap_or_default(),
                );
                if let Some(content_type) = request.headers.value("content-type") {
                    response = response.content_type(content_type);
                }
                Some(response)
            }
        }
    }
}

/// Matchers only; a matching ignore rule always passes the request
/// through to the real transport.
#[derive(Clone, Default)]
pub struct IgnoreRule {
    pub(crate) id: u64,
    pub(crate) matchers: Vec<Arc<dyn Matcher>>,
}

impl std::fmt::Debug for IgnoreRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IgnoreRule")
            .field("id", &self.id)
            .field("matchers", &self.matchers.len())
            .finish()
    }
}

impl IgnoreRule {
    /// An empty ignore rule; a rule with no matchers ignores everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an arbitrary matcher.
    pub fn matcher(mut self, matcher: impl Matcher + 'static) -> Self {
        self.matchers.push(Arc::new(matcher));
        self
    }

    /// Add a full-URL regex matcher.
    pub fn url_regex(self, pattern: &str) -> Result<Self, Error> {
        Ok(self.matcher(UrlRegexMatcher::new(pattern)?))
    }

    /// Whether every matcher accepts the request.
    pub fn matches(&self, request: &WireRequest) -> bool {
        self.matchers.iter().all(|matcher| matcher.matches(request))
    }
}
