//! The client context.
//!
//! A [`Client`] holds everything requests share: base URL, default
//! headers, the validator chain, transport configuration, cookie storage,
//! and the lifecycle delegate. Clients are cheap to clone; a process-wide
//! default instance is available from [`Client::default_shared`].

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use once_cell::sync::Lazy;
use url::Url;

use crate::cookies::{shared_jar, SharedCookieJar};
use crate::delegate::{ClientDelegate, NoopDelegate};
use crate::error::{Error, NO_STATUS};
use crate::executor;
use crate::headers::HeaderStore;
use crate::loader::DataLoader;
use crate::request::{curl, RedirectPolicy, Request};
use crate::response::Response;
use crate::stub::StubTransport;
use crate::transport::{HyperTransport, Transport};
use crate::validate::{default_validator, AltRequest, DefaultValidatorConfig, Validator};

/// Traffic class hint handed to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkServiceType {
    /// Ordinary traffic.
    #[default]
    Default,
    /// Throughput-insensitive background transfers.
    Background,
    /// Latency-sensitive interactive traffic.
    Interactive,
}

/// Per-client transport and pipeline configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Default per-attempt timeout.
    pub timeout: Option<Duration>,
    /// Whether cellular interfaces may be used (advisory; surfaced to the
    /// transport).
    pub allows_cellular_access: bool,
    /// Default redirect policy.
    pub redirect_policy: RedirectPolicy,
    /// Default retry budget, excluding the initial attempt.
    pub max_retries: u32,
    /// Whether zero-length bodies are acceptable.
    pub allows_empty_responses: bool,
    /// Statuses the default validator converts into a retry.
    /// [`NO_STATUS`] stands for transport failure with no response.
    pub retriable_status_codes: BTreeSet<u16>,
    /// Whether session cookies are injected into outgoing requests.
    pub http_should_set_cookies: bool,
    /// Traffic class hint.
    pub network_service_type: NetworkServiceType,
    /// Base delay of the default validator's exponential backoff.
    pub retry_base: Duration,
    /// Cap on any single backoff delay.
    pub retry_cap: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: None,
            allows_cellular_access: true,
            redirect_policy: RedirectPolicy::Follow,
            max_retries: 3,
            allows_empty_responses: true,
            retriable_status_codes: [408, 429, 500, 502, 503, 504, NO_STATUS]
                .into_iter()
                .collect(),
            http_should_set_cookies: true,
            network_service_type: NetworkServiceType::Default,
            retry_base: Duration::from_secs(1),
            retry_cap: Duration::from_secs(120),
        }
    }
}

struct ClientInner {
    base_url: Option<Url>,
    default_headers: Mutex<HeaderStore>,
    validators: Vec<Validator>,
    config: Config,
    delegate: Arc<dyn ClientDelegate>,
    loader: DataLoader,
    cookies: SharedCookieJar,
}

/// The request pipeline entry point.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.inner.base_url.as_ref().map(Url::as_str))
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// A client with default configuration and no base URL.
    pub fn new() -> Self {
        Self::builder().build().expect("default client must build")
    }

    /// Start configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The process-wide shared instance with default configuration.
    pub fn default_shared() -> &'static Client {
        static SHARED: Lazy<Client> = Lazy::new(Client::new);
        &SHARED
    }

    /// Execute a request to completion: compose, transfer (through the
    /// stub shim), validate, retry within budget, deliver.
    ///
    /// `Err` covers construction failures, cancellation, and unmatched
    /// stubs in opt-out mode; transport errors and validator failures are
    /// delivered on the response with its
    /// [`error`](crate::Response::error) populated.
    pub async fn fetch(&self, request: Request) -> Result<Response, Error> {
        executor::execute(self, request).await
    }

    /// Render the request as a `curl -v` command line with its URL fully
    /// resolved against this client.
    pub fn curl(&self, request: &Request) -> Result<String, Error> {
        let wire = executor::compose(self, request)?;
        Ok(curl::render(&wire))
    }

    /// The configured base URL.
    pub fn base_url(&self) -> Option<&Url> {
        self.inner.base_url.as_ref()
    }

    /// Snapshot of the default headers.
    pub fn default_headers(&self) -> HeaderStore {
        self.inner
            .default_headers
            .lock()
            .expect("default headers lock poisoned")
            .clone()
    }

    /// Set a default header. Takes effect for requests composed after
    /// this call.
    pub fn set_default_header(&self, name: impl Into<String>, value: impl Into<String>) {
        self.inner
            .default_headers
            .lock()
            .expect("default headers lock poisoned")
            .set(name, value);
    }

    /// The session cookie jar.
    pub fn cookie_jar(&self) -> SharedCookieJar {
        self.inner.cookies.clone()
    }

    pub(crate) fn config(&self) -> &Config {
        &self.inner.config
    }

    pub(crate) fn validators(&self) -> &[Validator] {
        &self.inner.validators
    }

    pub(crate) fn delegate(&self) -> &Arc<dyn ClientDelegate> {
        &self.inner.delegate
    }

    pub(crate) fn loader(&self) -> &DataLoader {
        &self.inner.loader
    }
}

/// Fluent configuration for [`Client`].
pub struct ClientBuilder {
    base_url: Option<String>,
    headers: HeaderStore,
    config: Config,
    pre_validators: Vec<Validator>,
    custom_validators: Vec<Validator>,
    with_default_validator: bool,
    delegate: Arc<dyn ClientDelegate>,
    transport: Option<Arc<dyn Transport>>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    /// A builder with default headers and configuration.
    pub fn new() -> Self {
        Self {
            base_url: None,
            headers: HeaderStore::with_defaults(),
            config: Config::default(),
            pre_validators: Vec::new(),
            custom_validators: Vec::new(),
            with_default_validator: true,
            delegate: Arc::new(NoopDelegate),
            transport: None,
        }
    }

    /// Resolve relative request paths against this URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set a default header sent with every request unless the request
    /// overrides it.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Default per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Whether cellular interfaces may be used.
    pub fn allows_cellular_access(mut self, allowed: bool) -> Self {
        self.config.allows_cellular_access = allowed;
        self
    }

    /// Default redirect policy.
    pub fn redirect_policy(mut self, policy: RedirectPolicy) -> Self {
        self.config.redirect_policy = policy;
        self
    }

    /// Default retry budget, excluding the initial attempt.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Whether zero-length response bodies are acceptable.
    pub fn allows_empty_responses(mut self, allowed: bool) -> Self {
        self.config.allows_empty_responses = allowed;
        self
    }

    /// Replace the set of statuses the default validator retries.
    /// Include [`NO_STATUS`] to retry transport failures.
    pub fn retriable_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.config.retriable_status_codes = codes.into_iter().collect();
        self
    }

    /// Whether session cookies are injected into outgoing requests.
    pub fn http_should_set_cookies(mut self, enabled: bool) -> Self {
        self.config.http_should_set_cookies = enabled;
        self
    }

    /// Traffic class hint.
    pub fn network_service_type(mut self, service_type: NetworkServiceType) -> Self {
        self.config.network_service_type = service_type;
        self
    }

    /// Base and cap of the default validator's exponential backoff.
    pub fn retry_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.config.retry_base = base;
        self.config.retry_cap = cap;
        self
    }

    /// Append a custom validator; custom validators run after the
    /// default one in the order added.
    pub fn validator(mut self, validator: Validator) -> Self {
        self.custom_validators.push(validator);
        self
    }

    /// Install an alternate-request validator. It runs before the
    /// default validator so its trigger statuses reach it instead of
    /// being converted to failures first.
    pub fn alt_request(mut self, alt: AltRequest) -> Self {
        self.pre_validators.push(alt.validator());
        self
    }

    /// Remove the always-present default validator.
    pub fn without_default_validator(mut self) -> Self {
        self.with_default_validator = false;
        self
    }

    /// Observe request lifecycle events.
    pub fn delegate(mut self, delegate: impl ClientDelegate + 'static) -> Self {
        self.delegate = Arc::new(delegate);
        self
    }

    /// Use a custom transport instead of the hyper-based default. The
    /// stub shim always wraps the transport; it is inert while the
    /// registry is disabled.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<Client, Error> {
        let base_url = match self.base_url {
            Some(raw) => {
                Some(Url::parse(&raw).map_err(|e| Error::InvalidUrl(format!("{raw}: {e}")))?)
            }
            None => None,
        };

        let mut validators = self.pre_validators;
        if self.with_default_validator {
            validators.push(default_validator(DefaultValidatorConfig {
                allows_empty_responses: self.config.allows_empty_responses,
                retriable_status_codes: self.config.retriable_status_codes.clone(),
                retry_base: self.config.retry_base,
                retry_cap: self.config.retry_cap,
                max_retries: self.config.max_retries,
            }));
        }
        validators.extend(self.custom_validators);

        let cookies = shared_jar();
        let real: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HyperTransport::new()),
        };
        let shim: Arc<dyn Transport> =
            Arc::new(StubTransport::new(real).with_cookies(cookies.clone()));
        let loader = DataLoader::new(shim, Some(cookies.clone()));

        Ok(Client {
            inner: Arc::new(ClientInner {
                base_url,
                default_headers: Mutex::new(self.headers),
                validators,
                config: self.config,
                delegate: self.delegate,
                loader,
                cookies,
            }),
        })
    }
}
