//! Predicates that select stub rules.
//!
//! A [`Matcher`] examines the wire-form request; every matcher of a rule
//! must accept for the rule to be selected.

use std::sync::Arc;

use bytes::Bytes;
use regex::Regex;
use serde_json::Value;
use url::Url;

use crate::error::Error;
use crate::request::template::UriTemplate;
use crate::transport::WireRequest;

/// A predicate over the wire-form request.
pub trait Matcher: Send + Sync {
    /// Whether the request is accepted.
    fn matches(&self, request: &WireRequest) -> bool;
}

/// Matches when the regex accepts the full request URL.
pub struct UrlRegexMatcher {
    regex: Regex,
}

impl UrlRegexMatcher {
    /// Compile the pattern.
    pub fn new(pattern: &str) -> Result<Self, Error> {
        Ok(Self {
            regex: Regex::new(pattern)
                .map_err(|e| Error::BuildRequest(format!("invalid URL pattern: {e}")))?,
        })
    }
}

impl Matcher for UrlRegexMatcher {
    fn matches(&self, request: &WireRequest) -> bool {
        self.regex.is_match(request.url.as_str())
    }
}

/// Matches when the URL fits an RFC-6570 template; template variables
/// absorb any expansion.
pub struct UriTemplateMatcher {
    template: UriTemplate,
}

impl UriTemplateMatcher {
    /// Parse the template.
    pub fn new(template: &str) -> Result<Self, Error> {
        Ok(Self {
            template: UriTemplate::parse(template)?,
        })
    }
}

impl Matcher for UriTemplateMatcher {
    fn matches(&self, request: &WireRequest) -> bool {
        self.template.matches(&request.url)
    }
}

/// Components excluded from [`UrlMatcher`] comparison.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlMatchOptions {
    /// Ignore the query string.
    pub ignore_query: bool,
    /// Ignore the path.
    pub ignore_path: bool,
    /// Ignore the scheme.
    pub ignore_scheme: bool,
    /// Ignore the host.
    pub ignore_host: bool,
    /// Ignore the port.
    pub ignore_port: bool,
    /// Ignore the fragment.
    pub ignore_fragment: bool,
}

/// Matches on exact URL equality after dropping the ignored components.
pub struct UrlMatcher {
    url: Url,
    options: UrlMatchOptions,
}

impl UrlMatcher {
    /// Match against this URL with the given options.
    pub fn new(url: &str, options: UrlMatchOptions) -> Result<Self, Error> {
        Ok(Self {
            url: Url::parse(url).map_err(|e| Error::InvalidUrl(e.to_string()))?,
            options,
        })
    }
}

impl Matcher for UrlMatcher {
    fn matches(&self, request: &WireRequest) -> bool {
        let (expected, actual, opts) = (&self.url, &request.url, self.options);
        (opts.ignore_scheme || expected.scheme() == actual.scheme())
            && (opts.ignore_host || expected.host_str() == actual.host_str())
            && (opts.ignore_port
                || expected.port_or_known_default() == actual.port_or_known_default())
            && (opts.ignore_path || expected.path() == actual.path())
            && (opts.ignore_query || expected.query() == actual.query())
            && (opts.ignore_fragment || expected.fragment() == actual.fragment())
    }
}

/// Matches when the request body deserializes to JSON deep-equal to the
/// expected value.
pub struct JsonMatcher {
    expected: Value,
}

impl JsonMatcher {
    /// Expect this canonical JSON value.
    pub fn new(expected: Value) -> Self {
        Self { expected }
    }
}

impl Matcher for JsonMatcher {
    fn matches(&self, request: &WireRequest) -> bool {
        let Some(bytes) = request.body.as_bytes() else {
            return false;
        };
        match serde_json::from_slice::<Value>(bytes) {
            Ok(actual) => actual == self.expected,
            Err(_) => false,
        }
    }
}

/// Matches on byte equality of the request body.
pub struct BodyMatcher {
    expected: Bytes,
}

impl BodyMatcher {
    /// Expect exactly these bytes.
    pub fn new(expected: impl Into<Bytes>) -> Self {
        Self {
            expected: expected.into(),
        }
    }
}

impl Matcher for BodyMatcher {
    fn matches(&self, request: &WireRequest) -> bool {
        match request.body.as_bytes() {
            Some(bytes) => *bytes == self.expected,
            None => self.expected.is_empty() && request.body.is_empty(),
        }
    }
}

/// Matches with a user predicate.
pub struct CustomMatcher {
    predicate: Arc<dyn Fn(&WireRequest) -> bool + Send + Sync>,
}

impl CustomMatcher {
    /// Wrap a predicate.
    pub fn new(predicate: impl Fn(&WireRequest) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Arc::new(predicate),
        }
    }
}

impl Matcher for CustomMatcher {
    fn matches(&self, request: &WireRequest) -> bool {
        (self.predicate)(request)
    }
}

/// Accepts every request. Pairs with the echo responder that mirrors the
/// request back.
pub struct EchoMatcher;

impl Matcher for EchoMatcher {
    fn matches(&self, _request: &WireRequest) -> bool {
        true
    }
}
