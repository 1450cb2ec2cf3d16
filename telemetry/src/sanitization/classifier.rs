//! Endpoint classification for outgoing HTTP spans
//!
//! Two rule sets are checked against the path of a request URL:
//!
//! - **Sensitive** endpoints carry credential-exchange payloads for a bank
//!   data aggregator. Spans for them are never exported.
//! - **Auth-related** endpoints (session, login, token and link-token
//!   issuance) may be exported once their attributes are stripped.
//!
//! Matching is a case-sensitive suffix test on the path, after the query
//! string and fragment are removed, ignoring one trailing slash.
//! `/api/PLAID/EXCHANGE-TOKEN` is therefore *not* sensitive. This is a known
//! limitation kept on purpose: matching case-insensitively changes what gets
//! blocked and needs a product decision.

use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

/// Bank data aggregator a sensitive endpoint belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Plaid,
    Teller,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Plaid => "plaid",
            Provider::Teller => "teller",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generic name for a sensitive endpoint, safe to export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndpointKey {
    ExchangeToken,
    AccessToken,
    Enrollment,
}

impl EndpointKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointKey::ExchangeToken => "exchange-token",
            EndpointKey::AccessToken => "access-token",
            EndpointKey::Enrollment => "enrollment",
        }
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointClass {
    Sensitive { provider: Provider, endpoint: EndpointKey },
    AuthRelated,
}

/// A path suffix tagged with its classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointRule {
    pub suffix: String,
    pub class: EndpointClass,
}

impl EndpointRule {
    pub fn sensitive(suffix: &str, provider: Provider, endpoint: EndpointKey) -> Self {
        Self {
            suffix: suffix.to_string(),
            class: EndpointClass::Sensitive { provider, endpoint },
        }
    }

    pub fn auth_related(suffix: &str) -> Self {
        Self {
            suffix: suffix.to_string(),
            class: EndpointClass::AuthRelated,
        }
    }

    /// Suffix test tolerating one trailing slash on `path`
    fn matches(&self, path: &str) -> bool {
        let suffix = self.suffix.as_str();
        path.ends_with(suffix) || path.strip_suffix('/').is_some_and(|p| p.ends_with(suffix))
    }
}

/// Immutable, ordered set of endpoint rules
#[derive(Debug, Clone)]
pub struct EndpointClassifier {
    rules: Vec<EndpointRule>,
}

static DEFAULT_CLASSIFIER: OnceLock<EndpointClassifier> = OnceLock::new();

pub fn default_classifier() -> &'static EndpointClassifier {
    DEFAULT_CLASSIFIER.get_or_init(EndpointClassifier::new)
}

/// Whether `url` targets a credential-exchange endpoint
pub fn is_sensitive(url: &str) -> bool {
    default_classifier().is_sensitive(url)
}

/// Whether `url` targets a session, login or token-issuance endpoint
pub fn is_auth_related(url: &str) -> bool {
    default_classifier().is_auth_related(url)
}

/// Cut `url` at the first `?` or `#`
pub fn strip_query_and_fragment(url: &str) -> &str {
    match url.find(['?', '#']) {
        Some(idx) => &url[..idx],
        None => url,
    }
}

impl EndpointClassifier {
    pub fn new() -> Self {
        Self {
            rules: vec![
                EndpointRule::sensitive(
                    "/api/plaid/exchange-token",
                    Provider::Plaid,
                    EndpointKey::ExchangeToken,
                ),
                EndpointRule::sensitive(
                    "/item/public_token/exchange",
                    Provider::Plaid,
                    EndpointKey::ExchangeToken,
                ),
                EndpointRule::sensitive(
                    "/api/plaid/access-token",
                    Provider::Plaid,
                    EndpointKey::AccessToken,
                ),
                EndpointRule::sensitive(
                    "/api/teller/exchange-token",
                    Provider::Teller,
                    EndpointKey::ExchangeToken,
                ),
                EndpointRule::sensitive(
                    "/api/teller/enrollment",
                    Provider::Teller,
                    EndpointKey::Enrollment,
                ),
                EndpointRule::auth_related("/api/auth/login"),
                EndpointRule::auth_related("/api/auth/register"),
                EndpointRule::auth_related("/api/auth/logout"),
                EndpointRule::auth_related("/api/auth/refresh"),
                EndpointRule::auth_related("/api/auth/session"),
                EndpointRule::auth_related("/api/auth/token"),
                EndpointRule::auth_related("/api/plaid/create-link-token"),
                EndpointRule::auth_related("/api/plaid/link-token"),
                EndpointRule::auth_related("/link/token/create"),
                EndpointRule::auth_related("/api/teller/connect-token"),
            ],
        }
    }

    /// Default rules plus extra auth-related suffixes
    pub fn with_auth_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut classifier = Self::new();
        classifier
            .rules
            .extend(paths.into_iter().map(|p| EndpointRule::auth_related(p.as_ref())));
        classifier
    }

    pub fn from_rules(rules: Vec<EndpointRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[EndpointRule] {
        &self.rules
    }

    /// First matching rule's class, sensitive rules taking precedence
    pub fn classify(&self, url: &str) -> Option<EndpointClass> {
        let path = strip_query_and_fragment(url);
        let mut auth_related = false;

        for rule in self.rules.iter().filter(|rule| rule.matches(path)) {
            match rule.class {
                class @ EndpointClass::Sensitive { .. } => return Some(class),
                EndpointClass::AuthRelated => auth_related = true,
            }
        }

        auth_related.then_some(EndpointClass::AuthRelated)
    }

    /// Provider and endpoint key when `url` is sensitive
    pub fn sensitive_endpoint(&self, url: &str) -> Option<(Provider, EndpointKey)> {
        match self.classify(url) {
            Some(EndpointClass::Sensitive { provider, endpoint }) => Some((provider, endpoint)),
            _ => None,
        }
    }

    pub fn is_sensitive(&self, url: &str) -> bool {
        self.sensitive_endpoint(url).is_some()
    }

    pub fn is_auth_related(&self, url: &str) -> bool {
        let path = strip_query_and_fragment(url);
        self.rules
            .iter()
            .any(|rule| rule.class == EndpointClass::AuthRelated && rule.matches(path))
    }
}

impl Default for EndpointClassifier {
    fn default() -> Self {
        Self::new()
    }
}
