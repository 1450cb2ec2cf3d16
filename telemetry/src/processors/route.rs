//! Span naming from HTTP method and route
//!
//! Spans end up named `"<METHOD> <route>"`, e.g. `GET /api/transactions`.
//! The route comes from `http.route` when instrumentation recorded one;
//! otherwise it is the path of the request target or URL. Derived paths can
//! have id-like segments templated so that `/api/accounts/42` and
//! `/api/accounts/43` share a name.
//!
//! The processor also attaches the session correlation hash when it is
//! already known and starts computing it otherwise. The span being ended
//! never waits for the hash.

use opentelemetry::KeyValue;
use opentelemetry_sdk::export::trace::SpanData;
use std::borrow::Cow;
use std::sync::{Arc, OnceLock};
use url::Url;
use uuid::Uuid;

use super::{first_string_attribute, keys, upsert_attribute, SanitizingProcessor, SpanDecision};
use crate::error::Result;
use crate::sanitization::strip_query_and_fragment;
use crate::session::SessionContext;

/// Placeholder for templated path segments
pub const ID_SEGMENT: &str = "{id}";

static BASE_ORIGIN: OnceLock<Url> = OnceLock::new();

fn base_origin() -> &'static Url {
    BASE_ORIGIN
        .get_or_init(|| Url::parse("http://localhost/").expect("static base origin must parse"))
}

#[derive(Debug, Clone, Default)]
pub struct RouteNamingProcessor {
    session: Option<Arc<SessionContext>>,
    template_ids: bool,
}

impl RouteNamingProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, session: Arc<SessionContext>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_id_templating(mut self, enabled: bool) -> Self {
        self.template_ids = enabled;
        self
    }

    /// Method of the span, upper-cased
    pub fn method(attributes: &[KeyValue]) -> Option<String> {
        first_string_attribute(attributes, &[keys::HTTP_METHOD, keys::HTTP_REQUEST_METHOD])
            .map(|method| method.trim().to_ascii_uppercase())
            .filter(|method| !method.is_empty())
    }

    /// Normalized route of the span
    pub fn route(&self, attributes: &[KeyValue]) -> Option<String> {
        if let Some(route) = first_string_attribute(attributes, &[keys::HTTP_ROUTE]) {
            return Some(with_leading_slash(route.trim()).into_owned());
        }

        let raw = first_string_attribute(
            attributes,
            &[keys::HTTP_TARGET, keys::HTTP_URL, keys::URL_FULL],
        )?;
        let path = path_of(raw);
        let path = with_leading_slash(&path);

        Some(if self.template_ids {
            template_id_segments(&path)
        } else {
            path.into_owned()
        })
    }

    /// Rename the span to `"<METHOD> <route>"`.
    ///
    /// Returns whether the name changed. Spans missing a method or a route
    /// keep their name.
    pub fn rename(&self, span: &mut SpanData) -> bool {
        let (Some(method), Some(route)) =
            (Self::method(&span.attributes), self.route(&span.attributes))
        else {
            return false;
        };

        let name = format!("{method} {route}");
        if span.name == name {
            return false;
        }
        span.name = Cow::Owned(name);
        true
    }

    fn attach_correlation_hash(&self, span: &mut SpanData) {
        let Some(session) = &self.session else {
            return;
        };

        match session.cached_hash() {
            Some(hash) => {
                upsert_attribute(&mut span.attributes, KeyValue::new(keys::CORRELATION_HASH, hash))
            }
            None => session.prefetch(),
        }
    }
}

impl SanitizingProcessor for RouteNamingProcessor {
    fn name(&self) -> &'static str {
        "route-naming"
    }

    fn on_end(&self, span: &mut SpanData) -> Result<SpanDecision> {
        self.rename(span);
        self.attach_correlation_hash(span);
        Ok(SpanDecision::Export)
    }
}

/// Path of a target or URL, resolved against a fixed origin. Values that do
/// not resolve are taken as a path with query and fragment cut off.
fn path_of(raw: &str) -> String {
    match base_origin().join(raw.trim()) {
        Ok(url) => url.path().to_string(),
        Err(_) => strip_query_and_fragment(raw.trim()).to_string(),
    }
}

fn with_leading_slash(route: &str) -> Cow<'_, str> {
    if route.starts_with('/') {
        Cow::Borrowed(route)
    } else {
        Cow::Owned(format!("/{route}"))
    }
}

fn is_id_segment(segment: &str) -> bool {
    (!segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()))
        || Uuid::parse_str(segment).is_ok()
}

fn template_id_segments(path: &str) -> String {
    path.split('/')
        .map(|segment| if is_id_segment(segment) { ID_SEGMENT } else { segment })
        .collect::<Vec<_>>()
        .join("/")
}
