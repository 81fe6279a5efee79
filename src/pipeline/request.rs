//! Per-request context handed to every stage.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method};
use serde_json::{Map, Value};

/// Everything a stage may read about the incoming request, plus scratch
/// space for stages to share data with later stages.
///
/// Built once per request by the serving fallback before dispatch; stages
/// receive it by mutable reference and run one after another.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// HTTP method.
    pub method: Method,
    /// Path inside the endpoint namespace, always starting with `/`.
    pub path: String,
    /// Raw query string, without the leading `?`.
    pub query: Option<String>,
    /// Request headers.
    pub headers: HeaderMap,
    /// Buffered request body.
    pub body: Bytes,
    /// Path parameters captured by the matching stage's pattern.
    pub params: HashMap<String, String>,
    /// Scheme and authority the request was addressed to.
    pub base_url: String,
    /// Base URL plus the original path and query.
    pub full_url: String,
    /// Values stored by earlier stages.
    pub locals: Map<String, Value>,
}

impl RequestContext {
    /// Creates a context for `method` on `path` with everything else empty.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        Self {
            method,
            full_url: path.clone(),
            path,
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            params: HashMap::new(),
            base_url: String::new(),
            locals: Map::new(),
        }
    }

    /// Decodes the query string into key/value pairs. Pairs without `=`
    /// get an empty value; no percent-decoding is applied.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&str, &str)> {
        self.query
            .as_deref()
            .unwrap_or_default()
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
            .collect()
    }

    /// A header value as text, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_normalizes_leading_slash() {
        let ctx = RequestContext::new(Method::GET, "echo");
        assert_eq!(ctx.path, "/echo");
        assert!(ctx.params.is_empty());
    }

    #[test]
    fn query_pairs_split_on_ampersand() {
        let mut ctx = RequestContext::new(Method::GET, "/");
        ctx.query = Some("a=1&flag&b=two".into());
        assert_eq!(ctx.query_pairs(), vec![("a", "1"), ("flag", ""), ("b", "two")]);
    }
}
