//! Response validation.
//!
//! A validator is a function deciding a completed response's fate. The
//! chain runs strictly in order; the first non-`Next`/`Replace` outcome
//! terminates the pass. Every client carries the default validator unless
//! it is explicitly removed.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, NO_STATUS};
use crate::request::Request;
use crate::response::Response;
use crate::retry::{AltResponseHook, RetryStrategy};

/// The fate a validator assigns to a response.
pub enum ValidatorOutcome {
    /// Move on to the next validator.
    Next,
    /// Move on, substituting this response for the original.
    Replace(Response),
    /// Terminate the pass and fail the request with this error.
    Fail(Error),
    /// Terminate the pass and retry with this strategy.
    Retry(RetryStrategy),
}

/// A validator: first-class function plus whatever configuration it
/// captured.
pub type Validator = Arc<dyn Fn(&Response, &Request) -> ValidatorOutcome + Send + Sync>;

/// Result of running a whole chain.
pub(crate) enum ChainResult {
    Deliver(Response),
    Fail(Response, Error),
    Retry(Response, RetryStrategy),
}

/// Run the chain in order over a response.
pub(crate) fn run_chain(
    validators: &[Validator],
    response: Response,
    request: &Request,
) -> ChainResult {
    let mut current = response;
    for validator in validators {
        match validator(&current, request) {
            ValidatorOutcome::Next => {}
            ValidatorOutcome::Replace(replacement) => current = replacement,
            ValidatorOutcome::Fail(error) => return ChainResult::Fail(current, error),
            ValidatorOutcome::Retry(strategy) => return ChainResult::Retry(current, strategy),
        }
    }
    ChainResult::Deliver(current)
}

/// Configuration captured by the default validator.
#[derive(Debug, Clone)]
pub(crate) struct DefaultValidatorConfig {
    pub allows_empty_responses: bool,
    pub retriable_status_codes: BTreeSet<u16>,
    pub retry_base: Duration,
    pub retry_cap: Duration,
    pub max_retries: u32,
}

/// The always-present default validator.
///
/// Rejects empty bodies when the client forbids them (unless the status
/// is a non-content one), and turns error statuses and transport
/// failures into an exponential retry while the status is retriable and
/// budget remains, or into a failure otherwise. The synthetic status 0
/// ([`NO_STATUS`]) stands for "no response arrived".
pub(crate) fn default_validator(config: DefaultValidatorConfig) -> Validator {
    Arc::new(move |response, request| {
        let status = response.status();
        let failed = response.error().is_some() || response.status_class().is_error();

        if !failed {
            if !config.allows_empty_responses
                && response.body_len() == 0
                && !matches!(status, 204 | 205 | 304)
            {
                return ValidatorOutcome::Fail(Error::EmptyResponse);
            }
            return ValidatorOutcome::Next;
        }

        if let Some(error) = response.error() {
            if error.is_terminal() {
                return ValidatorOutcome::Fail(error.clone());
            }
        }

        // The executor owns the authoritative budget check and converts
        // an over-budget strategy into `RetryAttemptsReached`; the
        // validator only stops proposing retries once the budget is
        // visibly blown.
        let code = if status == 0 { NO_STATUS } else { status };
        let budget = request.max_retries().unwrap_or(config.max_retries);
        if config.retriable_status_codes.contains(&code) && response.retry_count() <= budget {
            return ValidatorOutcome::Retry(RetryStrategy::Exponential {
                base: config.retry_base,
                cap: config.retry_cap,
            });
        }

        let error = response
            .error()
            .cloned()
            .unwrap_or_else(|| Error::status(status, "error status"));
        ValidatorOutcome::Fail(error)
    })
}

/// Builds the alternate request run before a retry.
pub type AltRequestFactory = Arc<dyn Fn(&Request, &Response) -> Request + Send + Sync>;

/// Configuration for the alternate-request validator: when a trigger
/// status arrives, derive an alternate request, run it (outside the outer
/// retry budget), let its response mutate the original request, then
/// retry.
///
/// The typical use is silent re-authentication: trigger on 401, fetch a
/// token, install it as a header on the original request.
#[derive(Clone)]
pub struct AltRequest {
    trigger_statuses: BTreeSet<u16>,
    delay: Duration,
    factory: AltRequestFactory,
    on_response: Option<AltResponseHook>,
}

impl AltRequest {
    /// Trigger on the default statuses {401, 403} with no extra delay.
    pub fn new(factory: impl Fn(&Request, &Response) -> Request + Send + Sync + 'static) -> Self {
        Self {
            trigger_statuses: [401, 403].into_iter().collect(),
            delay: Duration::ZERO,
            factory: Arc::new(factory),
            on_response: None,
        }
    }

    /// Replace the trigger set.
    pub fn trigger_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.trigger_statuses = statuses.into_iter().collect();
        self
    }

    /// Also trigger when no response arrived at all.
    pub fn include_transport_failures(mut self) -> Self {
        self.trigger_statuses.insert(NO_STATUS);
        self
    }

    /// Wait this long after the alternate request before retrying.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Mutate the original request from the alternate response.
    pub fn on_response(
        mut self,
        hook: impl Fn(&mut Request, &Response) + Send + Sync + 'static,
    ) -> Self {
        self.on_response = Some(Arc::new(hook));
        self
    }

    /// Turn the configuration into a chain validator.
    pub fn validator(self) -> Validator {
        Arc::new(move |response, request| {
            if !self.trigger_statuses.contains(&response.status()) {
                return ValidatorOutcome::Next;
            }
            let alt = (self.factory)(request, response);
            ValidatorOutcome::Retry(RetryStrategy::After {
                request: Box::new(alt),
                delay: self.delay,
                on_response: self.on_response.clone(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::HeaderStore;
    use crate::metrics::Metrics;
    use crate::transport::WireRequest;
    use bytes::Bytes;
    use http::Method;
    use url::Url;

    fn config() -> DefaultValidatorConfig {
        DefaultValidatorConfig {
            allows_empty_responses: false,
            retriable_status_codes: [500, 503, NO_STATUS].into_iter().collect(),
            retry_base: Duration::from_millis(100),
            retry_cap: Duration::from_secs(2),
            max_retries: 3,
        }
    }

    fn response(status: u16, body: &'static [u8], retry_count: u32) -> Response {
        let wire = WireRequest::new(Method::GET, Url::parse("http://x/").unwrap());
        Response::new(
            status,
            HeaderStore::new(),
            Some(Bytes::from_static(body)),
            None,
            Metrics::default(),
            wire.clone(),
            wire,
            retry_count,
            1,
        )
    }

    fn request() -> Request {
        Request::get("http://x/").build()
    }

    #[test]
    fn test_success_passes() {
        let validator = default_validator(config());
        assert!(matches!(
            validator(&response(200, b"ok", 0), &request()),
            ValidatorOutcome::Next
        ));
    }

    #[test]
    fn test_empty_body_fails_when_forbidden() {
        let validator = default_validator(config());
        assert!(matches!(
            validator(&response(200, b"", 0), &request()),
            ValidatorOutcome::Fail(Error::EmptyResponse)
        ));
    }

    #[test]
    fn test_empty_body_allowed_for_non_content_statuses() {
        let validator = default_validator(config());
        for status in [204, 205, 304] {
            assert!(matches!(
                validator(&response(status, b"", 0), &request()),
                ValidatorOutcome::Next
            ));
        }
    }

    #[test]
    fn test_empty_body_allowed_when_configured() {
        let mut cfg = config();
        cfg.allows_empty_responses = true;
        let validator = default_validator(cfg);
        assert!(matches!(
            validator(&response(200, b"", 0), &request()),
            ValidatorOutcome::Next
        ));
    }

    #[test]
    fn test_retriable_status_retries_exponentially() {
        let validator = default_validator(config());
        match validator(&response(503, b"busy", 0), &request()) {
            ValidatorOutcome::Retry(RetryStrategy::Exponential { base, cap }) => {
                assert_eq!(base, Duration::from_millis(100));
                assert_eq!(cap, Duration::from_secs(2));
            }
            _ => panic!("expected exponential retry"),
        }
    }

    #[test]
    fn test_non_retriable_status_fails() {
        let validator = default_validator(config());
        match validator(&response(404, b"nope", 0), &request()) {
            ValidatorOutcome::Fail(error) => assert_eq!(error.status_code(), Some(404)),
            _ => panic!("expected failure"),
        }
    }

    #[test]
    fn test_final_in_budget_attempt_still_proposes_retry() {
        // The executor converts this into RetryAttemptsReached.
        let validator = default_validator(config());
        assert!(matches!(
            validator(&response(503, b"busy", 3), &request()),
            ValidatorOutcome::Retry(_)
        ));
    }

    #[test]
    fn test_blown_budget_fails() {
        let validator = default_validator(config());
        assert!(matches!(
            validator(&response(503, b"busy", 4), &request()),
            ValidatorOutcome::Fail(_)
        ));
    }

    #[test]
    fn test_transport_failure_uses_sentinel_code() {
        let validator = default_validator(config());
        let mut failed = response(0, b"", 0);
        failed.error = Some(Error::network("connection reset"));
        assert!(matches!(
            validator(&failed, &request()),
            ValidatorOutcome::Retry(_)
        ));

        let mut cfg = config();
        cfg.retriable_status_codes.remove(&NO_STATUS);
        let validator = default_validator(cfg);
        let mut failed = response(0, b"", 0);
        failed.error = Some(Error::network("connection reset"));
        assert!(matches!(
            validator(&failed, &request()),
            ValidatorOutcome::Fail(Error::Network { .. })
        ));
    }

    #[test]
    fn test_terminal_errors_never_retry() {
        let validator = default_validator(config());
        let mut cancelled = response(0, b"", 0);
        cancelled.error = Some(Error::Cancelled);
        assert!(matches!(
            validator(&cancelled, &request()),
            ValidatorOutcome::Fail(Error::Cancelled)
        ));
    }

    #[test]
    fn test_chain_runs_in_order_and_replacement_flows() {
        let order: Arc<std::sync::Mutex<Vec<&'static str>>> =
            Arc::new(std::sync::Mutex::new(Vec::new()));

        let first_order = order.clone();
        let first: Validator = Arc::new(move |_, _| {
            first_order.lock().unwrap().push("first");
            ValidatorOutcome::Replace(response(201, b"replaced", 0))
        });
        let second_order = order.clone();
        let second: Validator = Arc::new(move |current, _| {
            second_order.lock().unwrap().push("second");
            assert_eq!(current.status(), 201);
            ValidatorOutcome::Next
        });

        match run_chain(&[first, second], response(200, b"orig", 0), &request()) {
            ChainResult::Deliver(delivered) => {
                assert_eq!(delivered.status(), 201);
                assert_eq!(delivered.data().unwrap().as_ref(), b"replaced");
            }
            _ => panic!("expected delivery"),
        }
        assert_eq!(*order.lock().unwrap(), ["first", "second"]);
    }

    #[test]
    fn test_chain_terminates_on_first_non_next() {
        let reached: Arc<std::sync::Mutex<bool>> = Arc::new(std::sync::Mutex::new(false));

        let failing: Validator =
            Arc::new(|_, _| ValidatorOutcome::Fail(Error::Validator("stop".into())));
        let reached_flag = reached.clone();
        let never: Validator = Arc::new(move |_, _| {
            *reached_flag.lock().unwrap() = true;
            ValidatorOutcome::Next
        });

        assert!(matches!(
            run_chain(&[failing, never], response(200, b"x", 0), &request()),
            ChainResult::Fail(_, Error::Validator(_))
        ));
        assert!(!*reached.lock().unwrap());
    }

    #[test]
    fn test_alt_request_validator_triggers_on_configured_statuses() {
        let alt = AltRequest::new(|_, _| Request::get("http://auth/token").build())
            .delay(Duration::from_millis(10))
            .on_response(|request, _| {
                request.headers_mut().set("X-Token", "t");
            });
        let validator = alt.validator();

        assert!(matches!(
            validator(&response(200, b"fine", 0), &request()),
            ValidatorOutcome::Next
        ));

        match validator(&response(401, b"denied", 0), &request()) {
            ValidatorOutcome::Retry(RetryStrategy::After { delay, on_response, .. }) => {
                assert_eq!(delay, Duration::from_millis(10));
                assert!(on_response.is_some());
            }
            _ => panic!("expected alternate-request retry"),
        }
    }

    #[test]
    fn test_alt_request_transport_failure_sentinel() {
        let alt = AltRequest::new(|_, _| Request::get("http://auth/token").build())
            .include_transport_failures();
        let validator = alt.validator();
        assert!(matches!(
            validator(&response(0, b"", 0), &request()),
            ValidatorOutcome::Retry(_)
        ));
    }
}
