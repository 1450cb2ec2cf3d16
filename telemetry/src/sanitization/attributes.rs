//! Span attribute sanitization
//!
//! Rewrites a span's attribute list in place so that nothing resembling a
//! credential survives: sensitive header attributes are dropped, sensitive
//! query parameters in URL attributes are replaced, and every other string
//! value goes through the pattern redactor.

use http::HeaderMap;
use opentelemetry::{KeyValue, Value};
use std::borrow::Cow;
use std::sync::Arc;
use url::Url;

use super::patterns::{default_redactor, Redactor};

/// Placeholder written over sensitive query parameter and header values
pub const REDACTED: &str = "[REDACTED]";

/// Header names (lower-case) whose values are credentials
pub const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
    "api-key",
    "apikey",
    "x-auth-token",
    "plaid-secret",
];

/// Query parameters whose values are replaced in URL attributes
pub const SENSITIVE_QUERY_PARAMS: &[&str] = &[
    "token",
    "access_token",
    "public_token",
    "refresh_token",
    "api_key",
    "key",
];

/// Attribute keys carrying a URL, full or path-only
pub const URL_ATTRIBUTE_KEYS: &[&str] = &["http.url", "url.full", "http.target"];

/// Header values shorter than this are not scrubbed from other attributes
const MIN_ECHOED_SECRET_LEN: usize = 8;

/// Whether `key` names a sensitive header, either bare (`authorization`) or
/// as the last segment of a dotted attribute key
/// (`http.request.header.authorization`)
pub fn is_sensitive_header_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    let last_segment = key.rsplit('.').next().unwrap_or(&key);
    let normalized = last_segment.replace('_', "-");
    SENSITIVE_HEADERS.contains(&normalized.as_str())
}

pub fn is_url_attribute_key(key: &str) -> bool {
    URL_ATTRIBUTE_KEYS.contains(&key)
}

/// Redact a URL attribute value with the built-in redactor
pub fn redact_url(raw: &str) -> Cow<'_, str> {
    redact_url_with(default_redactor(), raw)
}

/// Replace sensitive query parameter values in `raw`, keeping the rest of the
/// URL as written, then pattern-redact the result. Path-only values such as
/// `http.target` are accepted. If the value does not parse as a URL at all,
/// only pattern redaction is applied.
pub fn redact_url_with<'a>(redactor: &Redactor, raw: &'a str) -> Cow<'a, str> {
    let rewritten = match rewrite_query(raw) {
        Some(rewritten) => rewritten,
        None => return redactor.redact(raw),
    };

    let redacted = match redactor.redact(&rewritten) {
        Cow::Owned(redacted) => Some(redacted),
        Cow::Borrowed(_) => None,
    };

    match redacted {
        Some(redacted) => Cow::Owned(redacted),
        None if rewritten == raw => Cow::Borrowed(raw),
        None => Cow::Owned(rewritten),
    }
}

/// `None` when the value cannot be parsed as an absolute or relative URL
fn rewrite_query(raw: &str) -> Option<String> {
    match Url::parse(raw) {
        Ok(_) | Err(url::ParseError::RelativeUrlWithoutBase) => {}
        Err(_) => return None,
    }

    let (head, query, fragment) = split_url(raw);
    let Some(query) = query else {
        return Some(raw.to_string());
    };

    let rewritten_query = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((name, _)) if is_sensitive_query_param(name) => format!("{name}={REDACTED}"),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&");

    let mut result = format!("{head}?{rewritten_query}");
    if let Some(fragment) = fragment {
        result.push('#');
        result.push_str(fragment);
    }
    Some(result)
}

fn split_url(raw: &str) -> (&str, Option<&str>, Option<&str>) {
    let (rest, fragment) = match raw.split_once('#') {
        Some((rest, fragment)) => (rest, Some(fragment)),
        None => (raw, None),
    };
    match rest.split_once('?') {
        Some((head, query)) => (head, Some(query), fragment),
        None => (rest, None, fragment),
    }
}

fn is_sensitive_query_param(name: &str) -> bool {
    let decoded = url::form_urlencoded::parse(name.as_bytes())
        .next()
        .map(|(key, _)| key.into_owned())
        .unwrap_or_else(|| name.to_string());
    SENSITIVE_QUERY_PARAMS
        .iter()
        .any(|param| param.eq_ignore_ascii_case(&decoded))
}

/// Attribute sanitizer bound to a redactor
#[derive(Debug, Clone)]
pub struct AttributeSanitizer {
    redactor: Arc<Redactor>,
}

impl AttributeSanitizer {
    pub fn new(redactor: Arc<Redactor>) -> Self {
        Self { redactor }
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    /// Sanitize `attributes` in place.
    ///
    /// When the originating request or response headers are available, the
    /// values of their sensitive headers are also scrubbed from any string
    /// attribute that echoes them. Non-string values are never touched and a
    /// value is only written back when it changed.
    pub fn sanitize(
        &self,
        attributes: &mut Vec<KeyValue>,
        request_headers: Option<&HeaderMap>,
        response_headers: Option<&HeaderMap>,
    ) {
        attributes.retain(|kv| !is_sensitive_header_key(kv.key.as_str()));

        let echoed = echoed_secrets(request_headers, response_headers);

        for kv in attributes.iter_mut() {
            let Value::String(current) = &kv.value else {
                continue;
            };
            let current = current.as_str();

            let mut updated = if is_url_attribute_key(kv.key.as_str()) {
                redact_url_with(&self.redactor, current)
            } else {
                self.redactor.redact(current)
            };

            for secret in &echoed {
                if updated.contains(secret.as_str()) {
                    updated = Cow::Owned(updated.replace(secret.as_str(), REDACTED));
                }
            }

            if updated != current {
                let updated = updated.into_owned();
                kv.value = Value::from(updated);
            }
        }
    }
}

impl Default for AttributeSanitizer {
    fn default() -> Self {
        Self::new(Arc::new(Redactor::new()))
    }
}

fn echoed_secrets(request: Option<&HeaderMap>, response: Option<&HeaderMap>) -> Vec<String> {
    let mut secrets = Vec::new();

    for headers in [request, response].into_iter().flatten() {
        for name in SENSITIVE_HEADERS {
            for value in headers.get_all(*name) {
                let Ok(value) = value.to_str() else {
                    continue;
                };
                let value = value.trim();
                if value.len() >= MIN_ECHOED_SECRET_LEN {
                    secrets.push(value.to_string());
                }
                // `Bearer <token>` is often echoed without the scheme
                if let Some((_, credential)) = value.split_once(' ') {
                    let credential = credential.trim();
                    if credential.len() >= MIN_ECHOED_SECRET_LEN {
                        secrets.push(credential.to_string());
                    }
                }
            }
        }
    }

    // Longest first so a full header value is replaced before its credential part
    secrets.sort_by_key(|secret| std::cmp::Reverse(secret.len()));
    secrets.dedup();
    secrets
}
