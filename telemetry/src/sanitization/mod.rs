//! Pure sanitization helpers used by the span processors
//!
//! - [`patterns`]: regex-based redaction of secrets inside arbitrary strings
//! - [`classifier`]: sensitive and auth-related endpoint detection
//! - [`attributes`]: in-place sanitization of span attribute lists
//! - [`interaction`]: suppression predicate for interaction spans

pub mod attributes;
pub mod classifier;
pub mod interaction;
pub mod patterns;

pub use attributes::{is_sensitive_header_key, redact_url, AttributeSanitizer, REDACTED};
pub use classifier::{
    default_classifier, is_auth_related, is_sensitive, strip_query_and_fragment, EndpointClass,
    EndpointClassifier, EndpointKey, EndpointRule, Provider,
};
pub use interaction::{should_suppress_interaction, InteractionTarget};
pub use patterns::{default_redactor, redact, RedactionRule, Redactor};
