//! cURL rendering of a wire-form request.

use crate::transport::{Payload, WireRequest};

/// Render the request as an equivalent `curl -v` invocation: the method,
/// one `-H` per header in store order, the body, and the resolved URL,
/// with continuations joined by a backslash, newline, and tab.
pub fn render(request: &WireRequest) -> String {
    let mut parts: Vec<String> = vec!["curl -v".to_string()];
    parts.push(format!("-X {}", request.method));

    for (name, value) in request.headers.iter() {
        parts.push(format!("-H \"{name}: {value}\""));
    }

    match &request.body {
        Payload::Empty => {}
        Payload::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => parts.push(format!("--data \"{}\"", text.replace('"', "\\\""))),
            Err(_) => parts.push(format!("--data-binary \"<{} bytes>\"", bytes.len())),
        },
        Payload::File(path) => parts.push(format!("--data-binary @{}", path.display())),
    }

    parts.push(format!("\"{}\"", request.url));
    parts.join(" \\\n\t")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::HeaderStore;
    use bytes::Bytes;
    use http::Method;
    use url::Url;

    fn wire(method: Method, url: &str) -> WireRequest {
        WireRequest::new(method, Url::parse(url).unwrap())
    }

    #[test]
    fn test_render_get() {
        let mut request = wire(Method::GET, "http://example.com/a?b=1");
        request.headers.set("Accept", "application/json");

        let rendered = render(&request);
        assert_eq!(
            rendered,
            "curl -v \\\n\t-X GET \\\n\t-H \"Accept: application/json\" \\\n\t\"http://example.com/a?b=1\""
        );
    }

    #[test]
    fn test_render_post_with_text_body() {
        let mut request = wire(Method::POST, "http://example.com/submit");
        request.headers.set("Content-Type", "application/json");
        request.body = Payload::Bytes(Bytes::from_static(br#"{"a":1}"#));

        let rendered = render(&request);
        assert!(rendered.contains("-X POST"));
        assert!(rendered.contains("--data \"{\\\"a\\\":1}\""));
        assert!(rendered.ends_with("\"http://example.com/submit\""));
    }

    #[test]
    fn test_render_file_body() {
        let mut request = wire(Method::PUT, "http://example.com/upload");
        request.body = Payload::File("/tmp/payload.bin".into());
        assert!(render(&request).contains("--data-binary @/tmp/payload.bin"));
    }

    #[test]
    fn test_headers_render_in_store_order() {
        let mut request = wire(Method::GET, "http://example.com/");
        request.headers.set("B-Second", "2");
        request.headers.set("A-First", "1");

        let rendered = render(&request);
        let b = rendered.find("B-Second").unwrap();
        let a = rendered.find("A-First").unwrap();
        assert!(b < a);
    }
}
