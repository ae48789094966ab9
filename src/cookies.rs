//! Session cookie storage.
//!
//! A minimal jar shared per client: `Set-Cookie` headers are harvested
//! from responses (real or stubbed) keyed by the request URL, and matching
//! cookies are injected into outgoing requests when the client's cookie
//! policy allows it.

use std::sync::{Arc, Mutex};

use url::Url;

/// One stored cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Host the cookie applies to.
    pub domain: String,
    /// Path prefix the cookie applies to.
    pub path: String,
}

impl Cookie {
    /// Parse a `Set-Cookie` header value in the context of the URL it
    /// arrived from. Attributes other than `Domain` and `Path` are
    /// accepted and ignored.
    pub fn parse(header: &str, url: &Url) -> Option<Self> {
        let mut pieces = header.split(';').map(str::trim);
        let (name, value) = pieces.next()?.split_once('=')?;
        if name.is_empty() {
            return None;
        }

        let mut domain = url.host_str()?.to_string();
        let mut path = "/".to_string();
        for attribute in pieces {
            let (key, attr_value) = match attribute.split_once('=') {
                Some((key, attr_value)) => (key.trim(), attr_value.trim()),
                None => continue,
            };
            if key.eq_ignore_ascii_case("domain") {
                domain = attr_value.trim_start_matches('.').to_string();
            } else if key.eq_ignore_ascii_case("path") {
                path = attr_value.to_string();
            }
        }

        Some(Self {
            name: name.trim().to_string(),
            value: value.trim().to_string(),
            domain,
            path,
        })
    }

    fn applies_to(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let domain_ok =
            host == self.domain || host.ends_with(&format!(".{}", self.domain));
        domain_ok && url.path().starts_with(&self.path)
    }
}

/// In-memory cookie jar.
#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
}

impl CookieJar {
    /// Create an empty jar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a cookie, replacing any existing cookie with the same name,
    /// domain, and path.
    pub fn store(&mut self, cookie: Cookie) {
        match self.cookies.iter_mut().find(|existing| {
            existing.name == cookie.name
                && existing.domain == cookie.domain
                && existing.path == cookie.path
        }) {
            Some(existing) => *existing = cookie,
            None => self.cookies.push(cookie),
        }
    }

    /// Harvest every `Set-Cookie` value for the given source URL.
    pub fn store_from_headers<'a>(
        &mut self,
        url: &Url,
        set_cookie_values: impl Iterator<Item = &'a str>,
    ) {
        for value in set_cookie_values {
            if let Some(cookie) = Cookie::parse(value, url) {
                self.store(cookie);
            }
        }
    }

    /// Cookies applicable to a request URL, in storage order.
    pub fn cookies_for(&self, url: &Url) -> Vec<&Cookie> {
        self.cookies
            .iter()
            .filter(|cookie| cookie.applies_to(url))
            .collect()
    }

    /// The `Cookie` header value for a request URL, if any cookie applies.
    pub fn header_for(&self, url: &Url) -> Option<String> {
        let cookies = self.cookies_for(url);
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(|cookie| format!("{}={}", cookie.name, cookie.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Remove every stored cookie.
    pub fn clear(&mut self) {
        self.cookies.clear();
    }
}

/// Jar shared between the executor, loader, and stub shim.
pub type SharedCookieJar = Arc<Mutex<CookieJar>>;

/// Create a fresh shared jar.
pub fn shared_jar() -> SharedCookieJar {
    Arc::new(Mutex::new(CookieJar::new()))
}
