//! Request stubbing.
//!
//! A process-wide registry of [`StubRule`]s and [`IgnoreRule`]s consulted
//! by the [`StubTransport`] shim. While the registry is enabled, requests
//! it claims never reach the real transport: the shim synthesizes the
//! response locally.
//!
//! The registry is a module-owned value behind a mutex; mutations made
//! while requests are in flight take effect on subsequent matchings.
//!
//! # Example
//!
//! ```no_run
//! use wireline::stub::{self, StubRule, StubResponse};
//! use http::Method;
//!
//! let rule = StubRule::new()
//!     .url_regex(r"example\.com/users/\d+").unwrap()
//!     .response(Method::GET, StubResponse::json(serde_json::json!({"id": 1})));
//! stub::add(rule);
//! stub::enable();
//! ```

use once_cell::sync::Lazy;
use std::sync::Mutex;

use crate::transport::WireRequest;

pub(crate) mod matcher;
pub(crate) mod rule;
mod shim;

pub use matcher::{
    BodyMatcher, CustomMatcher, EchoMatcher, JsonMatcher, Matcher, UriTemplateMatcher,
    UrlMatchOptions, UrlMatcher, UrlRegexMatcher,
};
pub use rule::{IgnoreRule, ResponseProducer, StubCachePolicy, StubResponse, StubRule};
pub use shim::StubTransport;

/// What happens to a request no rule and no ignore rule matches while the
/// registry is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnhandledMode {
    /// Pass the request through to the real transport.
    OptIn,
    /// Fail the request with
    /// [`Error::StubNotFound`](crate::Error::StubNotFound).
    #[default]
    OptOut,
}

/// Handle for removing a previously added rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StubId(u64);

#[derive(Default)]
struct Registry {
    enabled: bool,
    mode: UnhandledMode,
    rules: Vec<StubRule>,
    ignores: Vec<IgnoreRule>,
    next_id: u64,
}

impl Registry {
    fn assign_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

static REGISTRY: Lazy<Mutex<Registry>> = Lazy::new(|| Mutex::new(Registry::default()));

fn with_registry<T>(f: impl FnOnce(&mut Registry) -> T) -> T {
    f(&mut REGISTRY.lock().expect("stub registry lock poisoned"))
}

/// Start intercepting requests.
pub fn enable() {
    with_registry(|registry| registry.enabled = true);
}

/// Stop intercepting; every request reaches the real transport again.
pub fn disable() {
    with_registry(|registry| registry.enabled = false);
}

/// Whether the registry is currently enabled.
pub fn is_enabled() -> bool {
    with_registry(|registry| registry.enabled)
}

/// Configure the fate of unmatched requests.
pub fn set_unhandled_mode(mode: UnhandledMode) {
    with_registry(|registry| registry.mode = mode);
}

/// The configured fate of unmatched requests.
pub fn unhandled_mode() -> UnhandledMode {
    with_registry(|registry| registry.mode)
}

/// Register a stub rule. Rules match in insertion order.
pub fn add(rule: StubRule) -> StubId {
    with_registry(|registry| {
        let mut rule = rule;
        rule.id = registry.assign_id();
        let id = StubId(rule.id);
        registry.rules.push(rule);
        id
    })
}

/// Remove a rule by its handle. Returns whether anything was removed.
pub fn remove(id: StubId) -> bool {
    with_registry(|registry| {
        let before = registry.rules.len();
        registry.rules.retain(|rule| rule.id != id.0);
        registry.rules.len() != before
    })
}

/// Register an ignore rule; matching requests always pass through.
pub fn add_ignore(rule: IgnoreRule) -> StubId {
    with_registry(|registry| {
        let mut rule = rule;
        rule.id = registry.assign_id();
        let id = StubId(rule.id);
        registry.ignores.push(rule);
        id
    })
}

/// Remove an ignore rule by its handle.
pub fn remove_ignore(id: StubId) -> bool {
    with_registry(|registry| {
        let before = registry.ignores.len();
        registry.ignores.retain(|rule| rule.id != id.0);
        registry.ignores.len() != before
    })
}

/// Drop every rule and ignore rule.
pub fn remove_all() {
    with_registry(|registry| {
        registry.rules.clear();
        registry.ignores.clear();
    });
}

/// Tear the registry down to its initial state: disabled, default
/// unhandled mode, no rules.
pub fn reset() {
    with_registry(|registry| *registry = Registry::default());
}

/// Whether the shim should claim this request instead of passing it to
/// the real transport.
///
/// A matching ignore rule always passes through. Otherwise a matching
/// stub rule claims the request; with no match the unhandled mode
/// decides: opt-out claims it (and the shim fails it), opt-in passes it
/// through.
pub fn should_handle(request: &WireRequest) -> bool {
    with_registry(|registry| {
        if !registry.enabled {
            return false;
        }
        if registry.ignores.iter().any(|rule| rule.matches(request)) {
            return false;
        }
        if registry.rules.iter().any(|rule| rule.matches(request)) {
            return true;
        }
        registry.mode == UnhandledMode::OptOut
    })
}

/// The first rule, in insertion order, whose every matcher accepts the
/// request. The returned rule is a cheap clone; producers run outside the
/// registry lock.
pub fn find_match(request: &WireRequest) -> Option<StubRule> {
    with_registry(|registry| {
        if !registry.enabled {
            return None;
        }
        registry
            .rules
            .iter()
            .find(|rule| rule.matches(request))
            .cloned()
    })
}

/// Serializes tests that touch the process-wide registry. Used by every
/// test module in the crate that enables stubbing.
#[cfg(test)]
pub(crate) fn test_guard() -> std::sync::MutexGuard<'static, ()> {
    static GUARD: Mutex<()> = Mutex::new(());
    GUARD.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
