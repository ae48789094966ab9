//! URI-template expansion and matching.
//!
//! Implements the simple-expansion subset of RFC 6570: `{var}` expands a
//! percent-encoded value, `{+var}` expands a reserved (unencoded) value.
//! A compiled [`UriTemplate`] can also run the other direction, matching a
//! URL and recovering the variable bindings — template variables absorb
//! any expansion.

use std::collections::HashMap;

use percent_encoding::{percent_decode_str, percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use url::Url;

use crate::error::Error;

/// Unreserved characters stay literal in simple expansion.
const SIMPLE_EXPAND_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    /// `{var}`: percent-encoded expansion.
    Simple(String),
    /// `{+var}`: reserved expansion.
    Reserved(String),
}

/// A parsed URI template.
#[derive(Debug, Clone)]
pub struct UriTemplate {
    raw: String,
    segments: Vec<Segment>,
    matcher: Regex,
}

impl UriTemplate {
    /// Parse a template string.
    pub fn parse(template: &str) -> Result<Self, Error> {
        let segments = parse_segments(template)?;

        let mut pattern = String::from("^");
        for segment in &segments {
            match segment {
                Segment::Literal(text) => pattern.push_str(&regex::escape(text)),
                Segment::Simple(name) => {
                    pattern.push_str(&format!("(?P<{name}>[^/?#&]+)"));
                }
                Segment::Reserved(name) => {
                    pattern.push_str(&format!("(?P<{name}>[^?#]+)"));
                }
            }
        }
        pattern.push('$');
        let matcher = Regex::new(&pattern)
            .map_err(|e| Error::InvalidUrl(format!("template {template:?}: {e}")))?;

        Ok(Self {
            raw: template.to_string(),
            segments,
            matcher,
        })
    }

    /// The template source text.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Expand the template with the given variables. Every variable the
    /// template names must be bound.
    pub fn expand(&self, vars: &HashMap<String, String>) -> Result<String, Error> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Simple(name) => {
                    let value = vars.get(name).ok_or_else(|| {
                        Error::InvalidUrl(format!("unbound template variable {name:?}"))
                    })?;
                    out.push_str(&percent_encode(value.as_bytes(), SIMPLE_EXPAND_SET).to_string());
                }
                Segment::Reserved(name) => {
                    let value = vars.get(name).ok_or_else(|| {
                        Error::InvalidUrl(format!("unbound template variable {name:?}"))
                    })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }

    /// Whether the URL matches this template.
    pub fn matches(&self, url: &Url) -> bool {
        self.matcher.is_match(self.subject(url))
    }

    /// Match the URL and recover the variable bindings, percent-decoded.
    pub fn captures(&self, url: &Url) -> Option<HashMap<String, String>> {
        let captures = self.matcher.captures(self.subject(url))?;
        let mut vars = HashMap::new();
        for name in self.matcher.capture_names().flatten() {
            let value = captures.name(name)?.as_str();
            let decoded = percent_decode_str(value)
                .decode_utf8()
                .ok()?
                .into_owned();
            vars.insert(name.to_string(), decoded);
        }
        Some(vars)
    }

    /// A full-URL template matches the whole URL; a path template matches
    /// the URL's path only.
    fn subject<'a>(&self, url: &'a Url) -> &'a str {
        if self.raw.contains("://") {
            url.as_str()
        } else {
            url.path()
        }
    }
}

fn parse_segments(template: &str) -> Result<Vec<Segment>, Error> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '{' {
            literal.push(ch);
            continue;
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        let reserved = chars.peek() == Some(&'+');
        if reserved {
            chars.next();
        }
        let mut name = String::new();
        loop {
            match chars.next() {
                Some('}') => break,
                Some(ch) if ch.is_ascii_alphanumeric() || ch == '_' => name.push(ch),
                Some(ch) => {
                    return Err(Error::InvalidUrl(format!(
                        "invalid character {ch:?} in template variable of {template:?}"
                    )))
                }
                None => {
                    return Err(Error::InvalidUrl(format!(
                        "unterminated template expression in {template:?}"
                    )))
                }
            }
        }
        if name.is_empty() {
            return Err(Error::InvalidUrl(format!(
                "empty template expression in {template:?}"
            )));
        }
        segments.push(if reserved {
            Segment::Reserved(name)
        } else {
            Segment::Simple(name)
        });
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// Expand a template string in one call.
pub fn expand(template: &str, vars: &HashMap<String, String>) -> Result<String, Error> {
    UriTemplate::parse(template)?.expand(vars)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn test_expand_simple() {
        let expanded = expand("/users/{id}/posts/{post}", &vars(&[("id", "42"), ("post", "7")]))
            .unwrap();
        assert_eq!(expanded, "/users/42/posts/7");
    }

    #[test]
    fn test_expand_percent_encodes() {
        let expanded = expand("/search/{term}", &vars(&[("term", "hello world/x")])).unwrap();
        assert_eq!(expanded, "/search/hello%20world%2Fx");
    }

    #[test]
    fn test_expand_reserved_keeps_slashes() {
        let expanded = expand("{+base}/tail", &vars(&[("base", "http://h/p")])).unwrap();
        assert_eq!(expanded, "http://h/p/tail");
    }

    #[test]
    fn test_expand_unbound_variable_fails() {
        assert!(matches!(
            expand("/users/{id}", &vars(&[])),
            Err(Error::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_parse_rejects_bad_expressions() {
        assert!(UriTemplate::parse("/a/{").is_err());
        assert!(UriTemplate::parse("/a/{}").is_err());
        assert!(UriTemplate::parse("/a/{bad name}").is_err());
    }

    #[test]
    fn test_match_recovers_variables() {
        let template = UriTemplate::parse("/users/{id}/posts/{post}").unwrap();
        let bindings = vars(&[("id", "42"), ("post", "hello world")]);
        let expanded = template.expand(&bindings).unwrap();

        let url = Url::parse(&format!("http://example.com{expanded}")).unwrap();
        assert!(template.matches(&url));
        assert_eq!(template.captures(&url).unwrap(), bindings);
    }

    #[test]
    fn test_full_url_template_matches_whole_url() {
        let template = UriTemplate::parse("http://example.com/v1/{resource}").unwrap();
        let url = Url::parse("http://example.com/v1/users").unwrap();
        assert!(template.matches(&url));
        assert_eq!(
            template.captures(&url).unwrap().get("resource").map(String::as_str),
            Some("users")
        );

        let other = Url::parse("http://other.com/v1/users").unwrap();
        assert!(!template.matches(&other));
    }

    #[test]
    fn test_path_template_ignores_host_and_query() {
        let template = UriTemplate::parse("/v1/{resource}").unwrap();
        let url = Url::parse("http://anywhere.test/v1/items?page=2").unwrap();
        assert!(template.matches(&url));
    }

    #[test]
    fn test_non_matching_url() {
        let template = UriTemplate::parse("/users/{id}").unwrap();
        let url = Url::parse("http://example.com/orders/42").unwrap();
        assert!(!template.matches(&url));
        assert!(template.captures(&url).is_none());
    }
}
